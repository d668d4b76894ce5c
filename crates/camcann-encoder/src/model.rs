//! Graph convolutional encoder.
//!
//! Each layer computes `H' = act(Â H W + b)` with `Â` the normalised
//! adjacency (Kipf & Welling, 2017). A pooling readout and a linear
//! projection map the final atom embeddings to the latent vector.

use candle_core::{DType, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder, VarMap};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::graph::GraphTensors;
use crate::pooling::l2_normalize;
use crate::{Activation, EncoderConfig, EncoderError, PoolingStrategy, Result};

/// One graph convolution.
pub struct GraphConv {
    linear: Linear,
}

impl GraphConv {
    pub fn new(in_dim: usize, out_dim: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self { linear: linear(in_dim, out_dim, vb)? })
    }

    /// `Â (H W + b)`; atoms: (n, in), adjacency: (n, n) → (n, out)
    pub fn forward(&self, atoms: &Tensor, adjacency: &Tensor) -> candle_core::Result<Tensor> {
        adjacency.matmul(&self.linear.forward(atoms)?)
    }
}

/// Graph → latent vector.
pub struct GnnEncoder {
    convs: Vec<GraphConv>,
    readout: Linear,
    pooling: PoolingStrategy,
    activation: Activation,
    normalize: bool,
    latent_dim: usize,
}

impl GnnEncoder {
    /// Build the layer stack. Parameter names are `conv{i}.*` and `readout.*`.
    pub fn new(config: &EncoderConfig, atom_dim: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let mut convs = Vec::with_capacity(config.depth);
        let mut in_dim = atom_dim;
        for i in 0..config.depth {
            convs.push(GraphConv::new(in_dim, config.hidden_dim, vb.pp(format!("conv{i}")))?);
            in_dim = config.hidden_dim;
        }
        let readout = linear(config.hidden_dim, config.latent_dim, vb.pp("readout"))?;

        Ok(Self {
            convs,
            readout,
            pooling: config.pooling,
            activation: config.activation,
            normalize: config.normalize,
            latent_dim: config.latent_dim,
        })
    }

    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    /// Encode one molecule: (1, latent_dim).
    pub fn forward(&self, graph: &GraphTensors) -> candle_core::Result<Tensor> {
        let mut h = graph.atoms.clone();
        for conv in &self.convs {
            h = self.activate(&conv.forward(&h, &graph.adjacency)?)?;
        }
        let pooled = self.pooling.apply(&h)?;
        let latent = self.readout.forward(&pooled)?;
        if self.normalize {
            l2_normalize(&latent)
        } else {
            Ok(latent)
        }
    }

    /// Encode a batch of molecules: (batch, latent_dim).
    pub fn forward_batch(&self, graphs: &[&GraphTensors]) -> candle_core::Result<Tensor> {
        let latents = graphs
            .iter()
            .map(|g| self.forward(g))
            .collect::<candle_core::Result<Vec<_>>>()?;
        Tensor::cat(&latents, 0)
    }

    fn activate(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        match self.activation {
            Activation::Relu => x.relu(),
            Activation::Silu => x.silu(),
            Activation::Tanh => x.tanh(),
        }
    }
}

/// Overwrite every variable in `varmap` with seeded values: weights uniform
/// in ±1/sqrt(fan_in), biases zero. Candle cannot seed its CPU generator,
/// so reproducible runs depend on this.
pub fn seed_parameters(varmap: &VarMap, seed: u64) -> Result<()> {
    let data = varmap
        .data()
        .lock()
        .map_err(|_| EncoderError::Training("parameter store lock poisoned".to_string()))?;

    // HashMap order is random; sort for a stable draw sequence.
    let mut names: Vec<&String> = data.keys().collect();
    names.sort();

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    for name in names {
        let var = &data[name];
        let dims = var.dims().to_vec();
        let count = var.elem_count();
        let values: Vec<f32> = if name.ends_with("bias") {
            vec![0.0; count]
        } else {
            let fan_in = dims.last().copied().unwrap_or(1).max(1);
            let bound = 1.0 / (fan_in as f32).sqrt();
            (0..count).map(|_| rng.gen_range(-bound..bound)).collect()
        };
        let init = Tensor::from_vec(values, dims, var.device())?.to_dtype(DType::F32)?;
        var.set(&init)?;
    }
    Ok(())
}
