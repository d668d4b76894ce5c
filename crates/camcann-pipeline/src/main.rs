//! CamCann — critical micelle concentration surrogate
//! Entry point for the pipeline binary.

use anyhow::Context;
use camcann_pipeline::{PipelineConfig, SurrogatePipeline};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("camcann=debug,info")),
        )
        .init();

    info!("CamCann starting up...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match PipelineConfig::load() {
        Ok(c) => {
            info!(
                "Configuration loaded. Latents: {:?}, kernel: {:?}, train: {}",
                c.latent,
                c.gp.family,
                c.data.train.display()
            );
            c
        }
        Err(e) => {
            warn!("Could not load camcann.toml: {e:#}");
            warn!("Copy camcann.example.toml to camcann.toml and edit it.");
            return Ok(());
        }
    };

    let pipeline = SurrogatePipeline::new(config)?;
    // training, hyperparameter search and layout are all CPU-bound
    let report = tokio::task::spawn_blocking(move || pipeline.run())
        .await
        .context("pipeline task panicked")??;

    for e in &report.evaluations {
        info!(
            "{:<28} n={:<4} RMSE {:.3}  R² {:.3}  mean σ {:.3}",
            e.name, e.metrics.n, e.metrics.rmse, e.metrics.r2, e.mean_std_dev
        );
    }
    if let Some(map) = &report.cartogram {
        info!(
            "Cartogram: {} points, stress-1 {:.3}, triplet agreement {:.3}, {} flagged",
            map.points.len(),
            map.stress,
            map.triplet_agreement,
            map.flagged.len()
        );
    }
    info!("Run {} complete.", report.run_id);
    Ok(())
}
