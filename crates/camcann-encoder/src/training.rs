//! Phase 1: train the encoder jointly with a linear head on log-CMC.

use std::collections::HashMap;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::optim::{AdamW, Optimizer, ParamsAdamW};
use candle_nn::{linear, loss, Linear, Module, VarBuilder, VarMap};
use camcann_common::{Dataset, Molecule};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::batch::epoch_batches;
use crate::frozen::{select_device, FrozenEncoder};
use crate::graph::GraphTensors;
use crate::model::{seed_parameters, GnnEncoder};
use crate::{EncoderConfig, EncoderError, Result};

/// Outcome of pretraining.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Mean MSE per epoch on standardised targets
    pub epoch_losses: Vec<f64>,
    /// RMSE of the head's predictions on the training set, in log-CMC units
    pub train_rmse: f64,
    pub epochs_run: usize,
    pub converged: bool,
    pub duration_ms: u64,
}

/// Encoder + output head, trainable end to end.
pub struct CmcRegressor {
    varmap: VarMap,
    encoder: GnnEncoder,
    head: Linear,
    config: EncoderConfig,
    atom_dim: usize,
    device: Device,
    target_mean: f64,
    target_std: f64,
}

impl CmcRegressor {
    /// Build a freshly initialised regressor for atoms with `atom_dim` features.
    pub fn new(config: EncoderConfig, atom_dim: usize) -> Result<Self> {
        config.validate()?;
        if atom_dim == 0 {
            return Err(EncoderError::InvalidInput("atom_dim must be positive".to_string()));
        }
        let device = select_device(&config)?;
        debug!("Using device: {:?}", device);

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let encoder = GnnEncoder::new(&config, atom_dim, vb.clone())?;
        let head = linear(config.latent_dim, 1, vb.pp("head"))?;
        seed_parameters(&varmap, config.seed)?;

        Ok(Self {
            varmap,
            encoder,
            head,
            config,
            atom_dim,
            device,
            target_mean: 0.0,
            target_std: 1.0,
        })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Minimise MSE between head output and standardised log-CMC.
    #[instrument(skip_all, fields(dataset = %train.name(), n = train.len()))]
    pub fn train(&mut self, train: &Dataset) -> Result<TrainingReport> {
        if train.is_empty() {
            return Err(EncoderError::InvalidInput("training set is empty".to_string()));
        }
        let start = Instant::now();

        let targets = train.targets();
        let n = targets.len() as f64;
        self.target_mean = targets.iter().sum::<f64>() / n;
        let var = targets.iter().map(|y| (y - self.target_mean).powi(2)).sum::<f64>() / n;
        self.target_std = if var > 1e-12 { var.sqrt() } else { 1.0 };

        let graphs = train
            .molecules()
            .map(|m| GraphTensors::from_graph(m.graph(), self.atom_dim, &self.device))
            .collect::<Result<Vec<_>>>()?;
        let standardised: Vec<f32> = targets
            .iter()
            .map(|y| ((y - self.target_mean) / self.target_std) as f32)
            .collect();

        let params = ParamsAdamW {
            lr: self.config.learning_rate,
            weight_decay: self.config.weight_decay,
            ..Default::default()
        };
        let mut optimizer = AdamW::new(self.varmap.all_vars(), params)?;

        info!(
            "Pretraining encoder: {} molecules, latent_dim={}, depth={}, epochs<={}",
            train.len(),
            self.config.latent_dim,
            self.config.depth,
            self.config.epochs
        );

        let mut epoch_losses = Vec::with_capacity(self.config.epochs);
        let mut converged = false;
        for epoch in 0..self.config.epochs {
            let mut total = 0.0f64;
            for batch in epoch_batches(graphs.len(), self.config.batch_size, self.config.seed, epoch) {
                let batch_graphs: Vec<&GraphTensors> = batch.iter().map(|&i| &graphs[i]).collect();
                let batch_targets: Vec<f32> = batch.iter().map(|&i| standardised[i]).collect();
                let target = Tensor::from_vec(batch_targets, batch.len(), &self.device)?;

                let pred = self.forward_head(&batch_graphs)?;
                let batch_loss = loss::mse(&pred, &target)?;
                optimizer.backward_step(&batch_loss)?;
                total += batch_loss.to_scalar::<f32>()? as f64 * batch.len() as f64;
            }
            let epoch_loss = total / graphs.len() as f64;
            if !epoch_loss.is_finite() {
                return Err(EncoderError::Training(format!("loss diverged at epoch {epoch}")));
            }
            debug!(epoch, loss = epoch_loss, "epoch finished");
            epoch_losses.push(epoch_loss);

            if epoch_loss < self.config.loss_tolerance {
                converged = true;
                break;
            }
        }
        if !converged {
            debug!("Epoch budget exhausted before loss tolerance was reached");
        }

        let predictions = self.predict_graphs(&graphs.iter().collect::<Vec<_>>())?;
        let train_rmse = (predictions
            .iter()
            .zip(&targets)
            .map(|(p, y)| (p - y).powi(2))
            .sum::<f64>()
            / n)
            .sqrt();
        if train_rmse > self.target_std {
            warn!(train_rmse, target_std = self.target_std, "Encoder does not beat the mean predictor on its own training set");
        }

        let report = TrainingReport {
            epochs_run: epoch_losses.len(),
            epoch_losses,
            train_rmse,
            converged,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Pretraining finished in {:.2}s: {} epochs, train RMSE {:.3}",
            start.elapsed().as_secs_f32(),
            report.epochs_run,
            report.train_rmse
        );
        Ok(report)
    }

    /// Direct log-CMC predictions of the phase-1 head.
    pub fn predict(&self, molecules: &[&Molecule]) -> Result<Vec<f64>> {
        let graphs = molecules
            .iter()
            .map(|m| GraphTensors::from_graph(m.graph(), self.atom_dim, &self.device))
            .collect::<Result<Vec<_>>>()?;
        self.predict_graphs(&graphs.iter().collect::<Vec<_>>())
    }

    /// Phase 2 handover: drop the head, keep detached copies of the encoder weights.
    pub fn freeze(self) -> Result<FrozenEncoder> {
        let tensors: HashMap<String, Tensor> = {
            let data = self
                .varmap
                .data()
                .lock()
                .map_err(|_| EncoderError::Training("parameter store lock poisoned".to_string()))?;
            data.iter()
                .filter(|(name, _)| !name.starts_with("head."))
                .map(|(name, var)| (name.clone(), var.as_tensor().detach()))
                .collect()
        };
        info!("Freezing encoder ({} tensors)", tensors.len());
        FrozenEncoder::from_tensors(tensors, self.config, self.atom_dim, self.device)
    }

    fn forward_head(&self, graphs: &[&GraphTensors]) -> candle_core::Result<Tensor> {
        let latent = self.encoder.forward_batch(graphs)?;
        self.head.forward(&latent)?.squeeze(1)
    }

    fn predict_graphs(&self, graphs: &[&GraphTensors]) -> Result<Vec<f64>> {
        if graphs.is_empty() {
            return Ok(Vec::new());
        }
        let out = self.forward_head(graphs)?.to_vec1::<f32>()?;
        Ok(out
            .into_iter()
            .map(|p| p as f64 * self.target_std + self.target_mean)
            .collect())
    }
}
