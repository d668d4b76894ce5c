//! Full runs from dataset files on disk to the written report.

use camcann_common::{Dataset, DatasetKind, Record, SurfactantClass};
use camcann_encoder::{Activation, EncoderConfig, FrozenEncoder, LatentEncoder};
use camcann_pipeline::{LatentSource, PipelineConfig, PipelineReport, SurrogatePipeline};
use camcann_test_utils::{class_series, surfactant_dataset};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn write_training_set(dir: &TempDir) -> (std::path::PathBuf, Dataset) {
    let data = surfactant_dataset(40, 7);
    let path = dir.path().join("train.json");
    data.to_json_file(&path).unwrap();
    (path, data)
}

fn quick_config(train: std::path::PathBuf, out: &TempDir) -> PipelineConfig {
    let mut config = PipelineConfig::for_training_file(train);
    config.encoder = EncoderConfig {
        latent_dim: 4,
        hidden_dim: 16,
        depth: 2,
        activation: Activation::Tanh,
        epochs: 30,
        batch_size: 8,
        learning_rate: 1e-2,
        ..EncoderConfig::default()
    };
    config.gp.max_iterations = 40;
    config.cartogram.max_iterations = 100;
    config.cartogram.triplet_samples = 200;
    config.output.dir = out.path().join("results");
    config.output.calibration_points = 21;
    config
}

#[test]
fn run_writes_report_and_encoder() {
    let data_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let (train_path, full) = write_training_set(&data_dir);
    let config = quick_config(train_path, &out_dir);

    let pipeline = SurrogatePipeline::new(config.clone()).unwrap();
    let report = pipeline.run().unwrap();

    assert!(config.output.report_path().exists());
    assert!(config.output.encoder_path().exists());

    let reread = PipelineReport::read_json(config.output.report_path()).unwrap();
    assert_eq!(reread.run_id, report.run_id);
    assert_eq!(reread.evaluations.len(), report.evaluations.len());

    let test = report.evaluation("synthetic-test").expect("primary test evaluation");
    assert_eq!(test.kind, DatasetKind::PrimaryTest);
    assert_eq!(test.metrics.n, 8);
    assert_eq!(test.calibration.len(), 21);
    assert!(test.predictions.iter().all(|p| p.std_dev > 0.0 && p.mean.is_finite()));

    let n_nonionic = test
        .predictions
        .iter()
        .filter(|p| p.class == SurfactantClass::Nonionic)
        .count();
    match report.evaluation("synthetic-test-nonionic") {
        Some(nonionic) => assert_eq!(nonionic.metrics.n, n_nonionic),
        None => assert_eq!(n_nonionic, 0),
    }

    let gp = &report.gp;
    assert_eq!(gp.n_support, full.len() - 8);
    assert!(gp.log_marginal_likelihood.is_finite());
    assert!(gp.loo_rmse.is_finite());
    assert!(report.training.is_some());

    let cartogram = report.cartogram.as_ref().expect("cartogram summary");
    assert_eq!(cartogram.points.len(), full.len());
    assert!((0.0..=1.0).contains(&cartogram.triplet_agreement));

    // the saved encoder reproduces latents for the training molecules
    let encoder = FrozenEncoder::load(config.output.encoder_path()).unwrap();
    assert_eq!(encoder.latent_dim(), 4);
    let latent = encoder.encode(&full.records()[0].molecule).unwrap();
    assert_eq!(latent.dim(), 4);
}

#[test]
fn explicit_test_and_external_sets_are_evaluated() {
    let data_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let (train_path, _) = write_training_set(&data_dir);

    let test = surfactant_dataset(8, 99);
    let test = Dataset::new("held-out", DatasetKind::PrimaryTest, test.records().to_vec());
    let test_path = data_dir.path().join("test.json");
    test.to_json_file(&test_path).unwrap();

    let external_records: Vec<Record> = surfactant_dataset(6, 123).records().to_vec();
    let external = Dataset::new("external", DatasetKind::External, external_records);
    let external_path = data_dir.path().join("external.json");
    external.to_json_file(&external_path).unwrap();

    let mut config = quick_config(train_path, &out_dir);
    config.data.test = Some(test_path);
    config.data.external = Some(external_path);
    config.output.cartogram = false;
    config.output.save_encoder = false;

    let report = SurrogatePipeline::new(config.clone()).unwrap().run().unwrap();
    let names: Vec<&str> = report.evaluations.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["held-out", "held-out-nonionic", "external"]);
    assert_eq!(report.gp.n_support, 40);
    assert!(report.cartogram.is_none());
    assert!(!config.output.encoder_path().exists());
}

#[test]
fn excluded_class_never_reaches_the_gp() {
    let data_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let (train_path, _) = write_training_set(&data_dir);

    let mut config = quick_config(train_path, &out_dir);
    config.data.exclude_class = Some(SurfactantClass::Cationic);
    config.output.cartogram = false;

    let pipeline = SurrogatePipeline::new(config.clone()).unwrap();
    let data = camcann_pipeline::load_datasets(&config.data).unwrap();
    assert_eq!(data.train.count_class(SurfactantClass::Cationic), 0);

    let outcome = pipeline.run_on(&data.train, &data.evaluations).unwrap();
    assert_eq!(outcome.surrogate.gp().len(), data.train.len());
}

#[test]
fn fingerprint_latents_skip_encoder_training() {
    let data_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();

    // 8-bit toy fingerprints: tail length in binary plus a class one-hot
    let records: Vec<Record> = surfactant_dataset(30, 3)
        .records()
        .iter()
        .map(|r| {
            let atoms = r.molecule.graph().num_atoms();
            let mut bits: Vec<f32> = (0..4).map(|b| ((atoms >> b) & 1) as f32).collect();
            let class = SurfactantClass::ALL
                .iter()
                .position(|c| *c == r.molecule.class())
                .unwrap_or(0);
            bits.extend((0..4).map(|c| if c == class { 1.0 } else { 0.0 }));
            Record::new(r.molecule.clone().with_fingerprint(bits), r.log_cmc)
        })
        .collect();
    let data = Dataset::new("fingerprints", DatasetKind::PrimaryTrain, records);
    let path = data_dir.path().join("fp.json");
    data.to_json_file(&path).unwrap();

    let mut config = quick_config(path, &out_dir);
    config.latent = LatentSource::Fingerprint;
    config.output.cartogram = false;

    let pipeline = SurrogatePipeline::new(config.clone()).unwrap();
    let report = pipeline.run().unwrap();
    assert!(report.training.is_none());
    assert!(!config.output.encoder_path().exists());
    assert_eq!(report.gp.hyperparameters.length_scales.len(), 1);
    assert!(report.evaluation("fingerprints-test").is_some());
}

#[test]
fn fingerprint_latents_require_fingerprints() {
    let data_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let (train_path, _) = write_training_set(&data_dir);

    let mut config = quick_config(train_path, &out_dir);
    config.latent = LatentSource::Fingerprint;
    let err = SurrogatePipeline::new(config).unwrap().run().unwrap_err();
    assert!(format!("{err:#}").contains("fingerprint"));
}

#[test]
fn empty_nonionic_subset_is_not_reported() {
    let data_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let (train_path, _) = write_training_set(&data_dir);

    let ionic = class_series(SurfactantClass::Anionic, [9, 11, 13], 0);
    let test = Dataset::new("anionic", DatasetKind::PrimaryTest, ionic.records().to_vec());
    let test_path = data_dir.path().join("anionic.json");
    test.to_json_file(&test_path).unwrap();

    let mut config = quick_config(train_path, &out_dir);
    config.data.test = Some(test_path);
    config.output.cartogram = false;

    let data = camcann_pipeline::load_datasets(&config.data).unwrap();
    assert_eq!(data.evaluations.len(), 2);
    assert!(data.evaluations[1].is_empty());

    let report = SurrogatePipeline::new(config).unwrap().run().unwrap();
    let names: Vec<&str> = report.evaluations.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["anionic"]);
    assert!(report.evaluations.iter().all(|e| e.metrics.n > 0));
}
