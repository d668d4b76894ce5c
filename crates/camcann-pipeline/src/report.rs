//! JSON run report.

use std::path::Path;

use anyhow::Context;
use camcann_cartography::{MapPoint, NeighbourhoodDiagnostic};
use camcann_common::{DatasetKind, SurfactantClass};
use camcann_encoder::TrainingReport;
use camcann_gp::{Hyperparameters, KernelFamily};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::evaluation::{CalibrationPoint, Metrics};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: Uuid,
    pub name: String,
    pub smiles: String,
    pub class: SurfactantClass,
    pub observed: f64,
    pub mean: f64,
    /// Includes the fitted observation noise
    pub std_dev: f64,
    pub support_distance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetEvaluation {
    pub name: String,
    pub kind: DatasetKind,
    pub metrics: Metrics,
    pub mean_std_dev: f64,
    pub calibration: Vec<CalibrationPoint>,
    pub miscalibration_area: f64,
    /// Fraction of observations above the one-sided 95% bound
    pub fraction_above_95: f64,
    pub predictions: Vec<PredictionRecord>,
}

impl DatasetEvaluation {
    /// Mean predictive standard deviation over molecules of one class.
    pub fn mean_std_dev_for(&self, class: SurfactantClass) -> Option<f64> {
        let values: Vec<f64> = self
            .predictions
            .iter()
            .filter(|p| p.class == class)
            .map(|p| p.std_dev)
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpSummary {
    pub family: KernelFamily,
    pub hyperparameters: Hyperparameters,
    pub prior_mean: f64,
    pub log_marginal_likelihood: f64,
    pub jitter: f64,
    pub optimiser_iterations: usize,
    pub optimiser_converged: bool,
    pub n_support: usize,
    /// RMSE of closed-form leave-one-out predictions on the support set
    pub loo_rmse: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartogramSummary {
    pub stress: f64,
    pub iterations: usize,
    pub converged: bool,
    pub triplet_agreement: f64,
    pub points: Vec<MapPoint>,
    pub flagged: Vec<NeighbourhoodDiagnostic>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub version: String,
    pub config: PipelineConfig,
    pub training: Option<TrainingReport>,
    pub gp: GpSummary,
    pub evaluations: Vec<DatasetEvaluation>,
    pub cartogram: Option<CartogramSummary>,
}

impl PipelineReport {
    pub fn evaluation(&self, name: &str) -> Option<&DatasetEvaluation> {
        self.evaluations.iter().find(|e| e.name == name)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
        info!("Report written to {}", path.display());
        Ok(())
    }

    pub fn read_json(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Ok(serde_json::from_str(&content)?)
    }
}
