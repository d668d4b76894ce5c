//! Frozen encoder: the fixed feature extractor handed to the GP stage.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use camcann_common::{LatentVector, Molecule};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::graph::GraphTensors;
use crate::model::GnnEncoder;
use crate::{EncoderConfig, EncoderError, LatentEncoder, Result};

/// Everything besides the weights needed to rebuild a frozen encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FrozenEncoderMeta {
    config: EncoderConfig,
    atom_dim: usize,
}

/// Read-only GNN encoder. Its weights are detached from any optimiser, and
/// its latent cache lives and dies with it, so vectors never leak across
/// retraining.
pub struct FrozenEncoder {
    encoder: GnnEncoder,
    tensors: HashMap<String, Tensor>,
    device: Device,
    config: EncoderConfig,
    atom_dim: usize,
    cache: Option<Mutex<LruCache<Uuid, LatentVector>>>,
}

impl FrozenEncoder {
    /// Build from named weight tensors (`conv{i}.*`, `readout.*`).
    pub fn from_tensors(
        tensors: HashMap<String, Tensor>,
        config: EncoderConfig,
        atom_dim: usize,
        device: Device,
    ) -> Result<Self> {
        let vb = VarBuilder::from_tensors(tensors.clone(), DType::F32, &device);
        let encoder = GnnEncoder::new(&config, atom_dim, vb)
            .map_err(|e| EncoderError::ModelLoad(e.to_string()))?;

        let cache = NonZeroUsize::new(config.cache_size).map(|size| Mutex::new(LruCache::new(size)));

        Ok(Self {
            encoder,
            tensors,
            device,
            config,
            atom_dim,
            cache,
        })
    }

    /// Write weights as safetensors plus a JSON sidecar (`.json`) holding the
    /// architecture.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        candle_core::safetensors::save(&self.tensors, path)?;
        let meta = FrozenEncoderMeta {
            config: self.config.clone(),
            atom_dim: self.atom_dim,
        };
        std::fs::write(path.with_extension("json"), serde_json::to_string_pretty(&meta)?)?;
        info!("Saved frozen encoder to {:?}", path);
        Ok(())
    }

    /// Load an encoder written by [`FrozenEncoder::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let meta: FrozenEncoderMeta =
            serde_json::from_str(&std::fs::read_to_string(path.with_extension("json"))?)?;
        let device = select_device(&meta.config)?;
        let tensors = candle_core::safetensors::load(path, &device)
            .map_err(|e| EncoderError::ModelLoad(format!("{}: {}", path.display(), e)))?;
        info!("Loaded frozen encoder from {:?} ({} tensors)", path, tensors.len());
        Self::from_tensors(tensors, meta.config, meta.atom_dim, device)
    }

    pub fn latent_dim(&self) -> usize {
        self.encoder.latent_dim()
    }

    pub fn atom_dim(&self) -> usize {
        self.atom_dim
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn tensor_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tensors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if GPU is being used.
    pub fn is_gpu(&self) -> bool {
        matches!(self.device, Device::Cuda(_) | Device::Metal(_))
    }

    /// Clear the latent cache.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            if let Ok(mut guard) = cache.lock() {
                guard.clear();
            }
        }
    }

    fn encode_uncached(&self, molecule: &Molecule) -> Result<LatentVector> {
        let graph = GraphTensors::from_graph(molecule.graph(), self.atom_dim, &self.device)?;
        let values = self
            .encoder
            .forward(&graph)?
            .flatten_all()?
            .to_dtype(DType::F64)?
            .to_vec1::<f64>()?;
        Ok(LatentVector::new(molecule.id(), values))
    }

    fn cached(&self, id: &Uuid) -> Option<LatentVector> {
        let cache = self.cache.as_ref()?;
        cache.lock().ok()?.get(id).cloned()
    }

    fn remember(&self, latent: &LatentVector) {
        if let Some(cache) = &self.cache {
            if let Ok(mut guard) = cache.lock() {
                guard.put(latent.molecule_id(), latent.clone());
            }
        }
    }
}

impl LatentEncoder for FrozenEncoder {
    fn dim(&self) -> usize {
        self.latent_dim()
    }

    fn encode(&self, molecule: &Molecule) -> camcann_common::Result<LatentVector> {
        if let Some(hit) = self.cached(&molecule.id()) {
            return Ok(hit);
        }
        let latent = self.encode_uncached(molecule)?;
        self.remember(&latent);
        Ok(latent)
    }

    fn encode_batch(&self, molecules: &[&Molecule]) -> camcann_common::Result<Vec<LatentVector>> {
        let latents = molecules
            .iter()
            .map(|m| self.encode(m))
            .collect::<camcann_common::Result<Vec<_>>>()?;
        debug!("Encoded {} molecules", latents.len());
        Ok(latents)
    }
}

/// Select the best available device.
pub(crate) fn select_device(config: &EncoderConfig) -> Result<Device> {
    if !config.use_gpu {
        return Ok(Device::Cpu);
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                info!("CUDA device available");
                return Ok(device);
            }
            Err(e) => {
                debug!("CUDA not available: {}, falling back to CPU", e);
            }
        }
    }

    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                info!("Metal device available");
                return Ok(device);
            }
            Err(e) => {
                debug!("Metal not available: {}, falling back to CPU", e);
            }
        }
    }

    Ok(Device::Cpu)
}
