//! CamCann pipeline: learned-representation CMC surrogate with calibrated
//! uncertainty and a cartogram of the learned kernel space.

pub mod config;
pub mod evaluation;
pub mod pipeline;
pub mod report;

pub use config::{DataConfig, LatentSource, OutputConfig, PipelineConfig};
pub use evaluation::{calibration_curve, fraction_above_ci, normal_cdf, normalised_residuals, CalibrationPoint, Metrics};
pub use pipeline::{evaluate, load_datasets, PipelineOutcome, PreparedData, Surrogate, SurrogateEncoder, SurrogatePipeline};
pub use report::{CartogramSummary, DatasetEvaluation, GpSummary, PipelineReport, PredictionRecord};
