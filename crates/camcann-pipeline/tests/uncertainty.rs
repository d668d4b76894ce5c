//! Uncertainty behaviour of the full encoder → GP surrogate.

use camcann_common::{Dataset, DatasetKind, Molecule, Record, SurfactantClass};
use camcann_encoder::{Activation, EncoderConfig};
use camcann_pipeline::{evaluate, load_datasets, PipelineConfig, SurrogatePipeline};
use camcann_test_utils::{alkyl_ethoxylate, alkyl_sulfate, class_series, sulfobetaine, surfactant_record};

fn small_config() -> PipelineConfig {
    let mut config = PipelineConfig::for_training_file("unused.json");
    config.encoder = EncoderConfig {
        latent_dim: 6,
        hidden_dim: 16,
        depth: 2,
        activation: Activation::Tanh,
        epochs: 60,
        batch_size: 8,
        learning_rate: 1e-2,
        ..EncoderConfig::default()
    };
    config.gp.max_iterations = 60;
    config.output.cartogram = false;
    config
}

fn merge(name: &str, parts: Vec<Dataset>) -> Dataset {
    let records: Vec<Record> = parts.into_iter().flat_map(|d| d.records().to_vec()).collect();
    Dataset::new(name, DatasetKind::PrimaryTrain, records)
}

#[test]
fn held_out_analogue_is_more_certain_than_unseen_chemistry() {
    // ethoxylates around (but not including) C12E4, plus sulfates
    let ethoxylates: Vec<Record> = (8..=16)
        .filter(|&t| t != 12)
        .map(|t| surfactant_record(SurfactantClass::Nonionic, t, 4))
        .collect();
    let train = merge(
        "analogue-train",
        vec![
            Dataset::new("eo", DatasetKind::PrimaryTrain, ethoxylates),
            class_series(SurfactantClass::Anionic, 8..=16, 0),
        ],
    );

    let pipeline = SurrogatePipeline::new(small_config()).unwrap();
    let outcome = pipeline.run_on(&train, &[]).unwrap();
    let surrogate = &outcome.surrogate;

    let analogue: Molecule = alkyl_ethoxylate(12, 4);
    let unseen: Molecule = sulfobetaine(12);
    let p_analogue = surrogate.predict_latent(&analogue).unwrap();
    let p_unseen = surrogate.predict_latent(&unseen).unwrap();

    assert!(p_analogue.variance >= 0.0 && p_unseen.variance >= 0.0);
    assert!(
        p_unseen.variance > p_analogue.variance,
        "analogue σ² {} vs unseen σ² {}",
        p_analogue.variance,
        p_unseen.variance
    );
}

#[test]
fn removing_a_class_raises_its_uncertainty() {
    let full_train = merge(
        "all-classes",
        SurfactantClass::ALL
            .iter()
            .map(|&c| class_series(c, [8, 10, 12, 14, 16], 4))
            .collect(),
    );
    let probes: Vec<Molecule> = [9, 11, 13, 15].into_iter().map(sulfobetaine).collect();

    let mean_variance = |train: &Dataset| {
        let outcome = SurrogatePipeline::new(small_config()).unwrap().run_on(train, &[]).unwrap();
        probes
            .iter()
            .map(|m| outcome.surrogate.predict_latent(m).unwrap().variance)
            .sum::<f64>()
            / probes.len() as f64
    };

    let with_class = mean_variance(&full_train);
    let without_class = mean_variance(&full_train.without_class(SurfactantClass::Zwitterionic));
    assert!(
        without_class >= 1.5 * with_class,
        "zwitterionic σ² with class {with_class}, without {without_class}"
    );
}

#[test]
fn training_points_have_small_non_negative_variance() {
    let train = merge(
        "mixed",
        vec![
            class_series(SurfactantClass::Nonionic, 8..=14, 6),
            class_series(SurfactantClass::Anionic, 8..=14, 0),
        ],
    );
    let outcome = SurrogatePipeline::new(small_config()).unwrap().run_on(&train, &[]).unwrap();
    let gp = outcome.surrogate.gp();
    for record in train.records() {
        let p = outcome.surrogate.predict_latent(&record.molecule).unwrap();
        assert!(p.variance >= 0.0);
        assert!(p.variance <= gp.kernel().signal_variance() + 1e-9);
    }
    let far = alkyl_sulfate(30);
    assert!(outcome.surrogate.predict(&far).unwrap().1 >= 0.0);
}

#[test]
fn nonionic_only_training_degrades_on_ionic_surfactants() {
    let data_dir = tempfile::TempDir::new().unwrap();

    let mut parts: Vec<Dataset> = [2, 4, 6]
        .into_iter()
        .map(|eo| class_series(SurfactantClass::Nonionic, 8..=16, eo))
        .collect();
    for class in [SurfactantClass::Anionic, SurfactantClass::Cationic, SurfactantClass::Zwitterionic] {
        parts.push(class_series(class, [8, 10, 12, 14, 16], 0));
    }
    let train = merge("qin", parts);
    let ionic_records: Vec<Record> = [SurfactantClass::Anionic, SurfactantClass::Cationic, SurfactantClass::Zwitterionic]
        .into_iter()
        .flat_map(|c| [9, 11, 13, 15].into_iter().map(move |t| surfactant_record(c, t, 0)))
        .collect();
    let test = Dataset::new("ionic", DatasetKind::PrimaryTest, ionic_records);

    let train_path = data_dir.path().join("train.json");
    let test_path = data_dir.path().join("test.json");
    train.to_json_file(&train_path).unwrap();
    test.to_json_file(&test_path).unwrap();

    let mut config = small_config();
    config.data.train = train_path;
    config.data.test = Some(test_path);
    config.data.nonionic_subset = false;

    let full = load_datasets(&config.data).unwrap();
    config.data.train_class = Some(SurfactantClass::Nonionic);
    let nonionic = load_datasets(&config.data).unwrap();
    assert_eq!(nonionic.train.len(), 27);
    assert_eq!(nonionic.train.count_class(SurfactantClass::Nonionic), nonionic.train.len());
    assert_eq!(nonionic.evaluations[0].len(), test.len());

    let score = |data: &camcann_pipeline::PreparedData| {
        let outcome = SurrogatePipeline::new(small_config())
            .unwrap()
            .run_on(&data.train, &[])
            .unwrap();
        let eval = evaluate(&outcome.surrogate, &data.evaluations[0], 21).unwrap();
        let mean_variance = data.evaluations[0]
            .molecules()
            .map(|m| outcome.surrogate.predict_latent(m).unwrap().variance)
            .sum::<f64>()
            / data.evaluations[0].len() as f64;
        (eval.metrics.rmse, mean_variance)
    };

    let (full_rmse, full_variance) = score(&full);
    let (nonionic_rmse, nonionic_variance) = score(&nonionic);
    assert!(
        nonionic_rmse > 2.0 * full_rmse,
        "ionic RMSE: full {full_rmse}, nonionic-only {nonionic_rmse}"
    );
    assert!(
        nonionic_variance > full_variance,
        "ionic σ²: full {full_variance}, nonionic-only {nonionic_variance}"
    );
}
