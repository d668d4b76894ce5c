//! Configuration loading for CamCann.
//! Reads camcann.toml from the current directory or the path in CAMCANN_CONFIG.

use std::path::{Path, PathBuf};

use anyhow::Context;
use camcann_cartography::CartogramConfig;
use camcann_common::SurfactantClass;
use camcann_encoder::EncoderConfig;
use camcann_gp::GpConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub latent: LatentSource,
    pub data: DataConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub gp: GpConfig,
    #[serde(default)]
    pub cartogram: CartogramConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Where the GP's input vectors come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LatentSource {
    /// Pretrained, frozen graph encoder
    #[default]
    Gnn,
    /// Precomputed fingerprints stored on each molecule
    Fingerprint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Primary training set (JSON `Dataset`)
    pub train: PathBuf,
    /// Primary test set; split from `train` when absent
    #[serde(default)]
    pub test: Option<PathBuf>,
    /// Out-of-distribution evaluation set
    #[serde(default)]
    pub external: Option<PathBuf>,
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    #[serde(default = "default_split_seed")]
    pub split_seed: u64,
    /// Also evaluate on the nonionic part of the primary test set
    #[serde(default = "bool_true")]
    pub nonionic_subset: bool,
    /// Drop this class from the training data (class-removal experiments)
    #[serde(default)]
    pub exclude_class: Option<SurfactantClass>,
    /// Train on this class only (e.g. a nonionic-only task); evaluation sets
    /// are left untouched
    #[serde(default)]
    pub train_class: Option<SurfactantClass>,
}

fn default_test_fraction() -> f64 { 0.2 }
fn default_split_seed() -> u64 { 0 }
fn bool_true() -> bool { true }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_report_name")]
    pub report_name: String,
    /// Write the frozen encoder weights next to the report
    #[serde(default = "bool_true")]
    pub save_encoder: bool,
    #[serde(default = "bool_true")]
    pub cartogram: bool,
    /// Points on each calibration curve
    #[serde(default = "default_calibration_points")]
    pub calibration_points: usize,
}

fn default_output_dir() -> PathBuf { PathBuf::from("results") }
fn default_report_name() -> String { "report.json".to_string() }
fn default_calibration_points() -> usize { 101 }

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            report_name: default_report_name(),
            save_encoder: true,
            cartogram: true,
            calibration_points: default_calibration_points(),
        }
    }
}

impl OutputConfig {
    pub fn report_path(&self) -> PathBuf {
        self.dir.join(&self.report_name)
    }

    pub fn encoder_path(&self) -> PathBuf {
        self.dir.join("encoder.safetensors")
    }
}


impl PipelineConfig {
    /// Minimal configuration around one training file.
    pub fn for_training_file(train: impl Into<PathBuf>) -> Self {
        Self {
            data: DataConfig {
                train: train.into(),
                test: None,
                external: None,
                test_fraction: default_test_fraction(),
                split_seed: default_split_seed(),
                nonionic_subset: true,
                exclude_class: None,
                train_class: None,
            },
            latent: LatentSource::default(),
            encoder: EncoderConfig::default(),
            gp: GpConfig::default(),
            cartogram: CartogramConfig::default(),
            output: OutputConfig::default(),
        }
    }

    /// Load configuration from camcann.toml.
    /// Checks CAMCANN_CONFIG env var first, then current directory.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CAMCANN_CONFIG").unwrap_or_else(|_| "camcann.toml".to_string());

        if !Path::new(&path).exists() {
            anyhow::bail!(
                "Config file not found: {}\n\
                 Copy camcann.example.toml to camcann.toml and edit it.",
                path
            );
        }
        Self::from_file(&path)
    }

    /// Load from a file, picking the format from its extension
    /// (`.yaml`/`.yml`, `.json`, anything else is TOML).
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content)?,
            Some("json") => Self::from_json_str(&content)?,
            _ => Self::from_toml_str(&content)?,
        };
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content).context("parsing TOML config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("parsing YAML config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(content).context("parsing JSON config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.data.test.is_none() && !(self.data.test_fraction > 0.0 && self.data.test_fraction < 1.0) {
            anyhow::bail!(
                "data.test_fraction must be in (0, 1) when no test set is given, got {}",
                self.data.test_fraction
            );
        }
        if let (Some(only), Some(excluded)) = (self.data.train_class, self.data.exclude_class) {
            if only == excluded {
                anyhow::bail!("data.train_class and data.exclude_class are both {only}; nothing left to train on");
            }
        }
        if self.output.calibration_points < 2 {
            anyhow::bail!("output.calibration_points must be at least 2");
        }
        self.encoder.validate().context("invalid [encoder] section")?;
        self.gp.validate().context("invalid [gp] section")?;
        self.cartogram.validate().context("invalid [cartogram] section")?;
        Ok(())
    }
}
