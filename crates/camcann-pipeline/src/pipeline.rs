//! Orchestration: pretrain → freeze → encode → GP → evaluate → cartogram.

use std::collections::HashSet;
use std::time::Instant;

use anyhow::Context;
use camcann_cartography::{Cartographer, MapEntry};
use camcann_common::{Dataset, DatasetKind, Molecule};
use camcann_encoder::{CmcRegressor, FingerprintEncoder, FrozenEncoder, LatentEncoder, TrainingReport};
use camcann_gp::{GaussianProcess, Prediction, TrainedGp};
use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::{DataConfig, LatentSource, PipelineConfig};
use crate::evaluation::{
    calibration_curve, fraction_above_ci, miscalibration_area, normalised_residuals, Metrics,
};
use crate::report::{CartogramSummary, DatasetEvaluation, GpSummary, PipelineReport, PredictionRecord};

/// Training set plus every set to evaluate on.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub train: Dataset,
    pub evaluations: Vec<Dataset>,
}

/// Read the configured datasets, splitting and filtering as requested.
pub fn load_datasets(config: &DataConfig) -> anyhow::Result<PreparedData> {
    let full = Dataset::from_json_file(&config.train)
        .with_context(|| format!("loading training set {}", config.train.display()))?;

    let (mut train, test) = match &config.test {
        Some(path) => {
            let test = Dataset::from_json_file(path)
                .with_context(|| format!("loading test set {}", path.display()))?;
            (full, test)
        }
        None => full.split(config.test_fraction, config.split_seed)?,
    };

    if let Some(class) = config.train_class {
        let before = train.len();
        train = train.only_class(class);
        info!("Training on {} molecules only ({} dropped)", class, before - train.len());
    }
    if let Some(class) = config.exclude_class {
        let before = train.len();
        train = train.without_class(class);
        info!("Removed {} {} molecules from the training set", before - train.len(), class);
    }

    let mut evaluations = Vec::new();
    if config.nonionic_subset && test.kind().is_primary() {
        evaluations.push(test.nonionic_subset()?);
    }
    evaluations.insert(0, test);
    if let Some(path) = &config.external {
        let external = Dataset::from_json_file(path)
            .with_context(|| format!("loading external set {}", path.display()))?;
        if external.kind() != DatasetKind::External {
            warn!(name = external.name(), kind = %external.kind(), "External set is not marked external");
        }
        evaluations.push(external);
    }

    Ok(PreparedData { train, evaluations })
}

/// The feature extractor in front of the GP.
pub enum SurrogateEncoder {
    Gnn(FrozenEncoder),
    Fingerprint(FingerprintEncoder),
}

impl SurrogateEncoder {
    pub fn as_latent(&self) -> &dyn LatentEncoder {
        match self {
            SurrogateEncoder::Gnn(e) => e,
            SurrogateEncoder::Fingerprint(e) => e,
        }
    }
}

/// Frozen encoder and the GP fitted on its latents.
pub struct Surrogate {
    encoder: SurrogateEncoder,
    gp: TrainedGp,
}

impl Surrogate {
    pub fn new(encoder: SurrogateEncoder, gp: TrainedGp) -> Self {
        Self { encoder, gp }
    }

    pub fn gp(&self) -> &TrainedGp {
        &self.gp
    }

    pub fn encoder(&self) -> &dyn LatentEncoder {
        self.encoder.as_latent()
    }

    /// The trained GNN, when latents come from one.
    pub fn frozen_encoder(&self) -> Option<&FrozenEncoder> {
        match &self.encoder {
            SurrogateEncoder::Gnn(e) => Some(e),
            SurrogateEncoder::Fingerprint(_) => None,
        }
    }

    /// Observation predictive (latent variance plus noise) and the kernel
    /// distance to the nearest support molecule.
    pub fn predict(&self, molecule: &Molecule) -> camcann_common::Result<(Prediction, f64)> {
        let latent = self.encoder().encode(molecule)?;
        let prediction = self.gp.predict_observed(&latent)?;
        let distance = self.gp.support_distance(&latent)?;
        Ok((prediction, distance))
    }

    /// Latent-function posterior (no observation noise).
    pub fn predict_latent(&self, molecule: &Molecule) -> camcann_common::Result<Prediction> {
        let latent = self.encoder().encode(molecule)?;
        self.gp.predict(&latent)
    }
}

/// Everything a run produces.
pub struct PipelineOutcome {
    pub surrogate: Surrogate,
    pub training: Option<TrainingReport>,
    pub evaluations: Vec<DatasetEvaluation>,
    pub cartogram: Option<CartogramSummary>,
}

pub struct SurrogatePipeline {
    config: PipelineConfig,
}

impl SurrogatePipeline {
    pub fn new(config: PipelineConfig) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load data, run every stage and write the report (plus encoder weights
    /// when configured).
    pub fn run(&self) -> anyhow::Result<PipelineReport> {
        let data = load_datasets(&self.config.data)?;
        let outcome = self.run_on(&data.train, &data.evaluations)?;

        std::fs::create_dir_all(&self.config.output.dir)
            .with_context(|| format!("creating {}", self.config.output.dir.display()))?;
        if self.config.output.save_encoder {
            if let Some(encoder) = outcome.surrogate.frozen_encoder() {
                encoder.save(self.config.output.encoder_path())?;
            }
        }

        let report = self.report(outcome);
        report.write_json(self.config.output.report_path())?;
        Ok(report)
    }

    /// Run every stage on in-memory datasets.
    #[instrument(skip_all, fields(train = %train.name(), n = train.len()))]
    pub fn run_on(&self, train: &Dataset, eval_sets: &[Dataset]) -> anyhow::Result<PipelineOutcome> {
        let start = Instant::now();
        if train.is_empty() {
            anyhow::bail!("training set {} is empty", train.name());
        }

        let (encoder, training) = self.fit_encoder(train)?;
        let molecules: Vec<&Molecule> = train.molecules().collect();
        let latents = encoder.as_latent().encode_batch(&molecules)?;
        info!(
            "Encoded {} training molecules to {}-d latents",
            latents.len(),
            encoder.as_latent().dim()
        );

        let gp = GaussianProcess::fit(&self.config.gp, latents, &train.targets())
            .context("fitting Gaussian process")?;
        let surrogate = Surrogate::new(encoder, gp);

        let mut evaluations = Vec::with_capacity(eval_sets.len());
        for dataset in eval_sets {
            if dataset.is_empty() {
                warn!(name = dataset.name(), "Skipping empty evaluation set");
                continue;
            }
            evaluations.push(evaluate(&surrogate, dataset, self.config.output.calibration_points)?);
        }
        for e in &evaluations {
            info!(
                "{}: RMSE {:.3}, MAE {:.3}, R² {:.3}, mean σ {:.3}, above 95% CI {:.1}%",
                e.name,
                e.metrics.rmse,
                e.metrics.mae,
                e.metrics.r2,
                e.mean_std_dev,
                100.0 * e.fraction_above_95
            );
        }

        let cartogram = if self.config.output.cartogram {
            let extra = eval_sets.iter().flat_map(|d| d.molecules()).collect();
            Some(self.cartogram(&surrogate, train, extra)?)
        } else {
            None
        };

        info!("Pipeline finished in {:.2}s", start.elapsed().as_secs_f32());
        Ok(PipelineOutcome {
            surrogate,
            training,
            evaluations,
            cartogram,
        })
    }

    fn fit_encoder(&self, train: &Dataset) -> anyhow::Result<(SurrogateEncoder, Option<TrainingReport>)> {
        match self.config.latent {
            LatentSource::Gnn => {
                let atom_dim = train
                    .atom_feature_dim()
                    .context("training set has no molecules")?;
                let mut regressor = CmcRegressor::new(self.config.encoder.clone(), atom_dim)?;
                let report = regressor.train(train).context("pretraining encoder")?;
                Ok((SurrogateEncoder::Gnn(regressor.freeze()?), Some(report)))
            }
            LatentSource::Fingerprint => {
                let dim = train
                    .molecules()
                    .find_map(|m| m.fingerprint().map(|f| f.len()))
                    .context("fingerprint latents requested but no molecule has a fingerprint")?;
                info!("Using {}-bit fingerprints as latents", dim);
                Ok((SurrogateEncoder::Fingerprint(FingerprintEncoder::new(dim)), None))
            }
        }
    }

    fn cartogram(
        &self,
        surrogate: &Surrogate,
        train: &Dataset,
        extra: Vec<&Molecule>,
    ) -> anyhow::Result<CartogramSummary> {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for molecule in train.molecules().chain(extra) {
            if seen.insert(molecule.id()) {
                let latent = surrogate.encoder().encode(molecule)?;
                entries.push(MapEntry::new(molecule.name(), latent));
            }
        }

        let cartographer = Cartographer::new(self.config.cartogram.clone())?;
        let map = cartographer.embed(&surrogate.gp, entries)?;
        let flagged = map.poorly_represented(self.config.cartogram.neighbours);
        if !flagged.is_empty() {
            warn!("{} molecules are poorly represented on the cartogram", flagged.len());
        }
        Ok(CartogramSummary {
            stress: map.stress(),
            iterations: map.iterations(),
            converged: map.converged(),
            triplet_agreement: map
                .triplet_agreement(self.config.cartogram.triplet_samples, self.config.cartogram.seed),
            points: map.points(),
            flagged,
        })
    }

    fn report(&self, outcome: PipelineOutcome) -> PipelineReport {
        let gp = outcome.surrogate.gp();
        let loo = gp.loo_predictions();
        let loo_means: Vec<f64> = loo.iter().map(|p| p.mean).collect();
        PipelineReport {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            config: self.config.clone(),
            training: outcome.training,
            gp: GpSummary {
                family: gp.kernel().family(),
                hyperparameters: gp.hyperparameters(),
                prior_mean: gp.mean(),
                log_marginal_likelihood: gp.log_marginal_likelihood(),
                jitter: gp.jitter(),
                optimiser_iterations: gp.optimisation().iterations,
                optimiser_converged: gp.optimisation().converged,
                n_support: gp.len(),
                loo_rmse: Metrics::compute(gp.targets(), &loo_means).rmse,
            },
            evaluations: outcome.evaluations,
            cartogram: outcome.cartogram,
        }
    }
}

/// Predict every molecule in `dataset` and score the predictions.
pub fn evaluate(surrogate: &Surrogate, dataset: &Dataset, calibration_points: usize) -> anyhow::Result<DatasetEvaluation> {
    let mut predictions = Vec::with_capacity(dataset.len());
    for record in dataset.records() {
        let m = &record.molecule;
        let (p, support_distance) = surrogate
            .predict(m)
            .with_context(|| format!("predicting {}", m.name()))?;
        predictions.push(PredictionRecord {
            id: m.id(),
            name: m.name().to_string(),
            smiles: m.smiles().to_string(),
            class: m.class(),
            observed: record.log_cmc,
            mean: p.mean,
            std_dev: p.std_dev(),
            support_distance,
        });
    }

    let observed: Vec<f64> = predictions.iter().map(|p| p.observed).collect();
    let means: Vec<f64> = predictions.iter().map(|p| p.mean).collect();
    let std_devs: Vec<f64> = predictions.iter().map(|p| p.std_dev).collect();
    let normalised = normalised_residuals(&observed, &means, &std_devs);
    let calibration = calibration_curve(&normalised, calibration_points);

    Ok(DatasetEvaluation {
        name: dataset.name().to_string(),
        kind: dataset.kind(),
        metrics: Metrics::compute(&observed, &means),
        mean_std_dev: if std_devs.is_empty() {
            0.0
        } else {
            std_devs.iter().sum::<f64>() / std_devs.len() as f64
        },
        miscalibration_area: miscalibration_area(&calibration),
        calibration,
        fraction_above_95: fraction_above_ci(&normalised, 0.95),
        predictions,
    })
}
