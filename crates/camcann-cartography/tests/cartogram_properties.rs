//! Layout invariants on maps built from a fitted GP.

use camcann_cartography::{CartogramConfig, Cartographer, LayoutInit, MapEntry};
use camcann_gp::{GaussianProcess, GpConfig};
use camcann_test_utils::{latent_cluster, smooth_target};
use pretty_assertions::assert_eq;

fn entries(n: usize, seed: u64) -> Vec<MapEntry> {
    let mut points = latent_cluster(&[0.0, 0.0, 0.0], 1.5, n / 2, seed);
    points.extend(latent_cluster(&[3.0, -2.0, 1.0], 1.0, n - n / 2, seed + 1));
    points
        .into_iter()
        .enumerate()
        .map(|(i, z)| MapEntry::new(format!("mol-{i}"), z))
        .collect()
}

fn fitted_gp(entries: &[MapEntry]) -> camcann_gp::TrainedGp {
    let support: Vec<_> = entries.iter().map(|e| e.latent.clone()).collect();
    let y: Vec<f64> = support.iter().map(smooth_target).collect();
    GaussianProcess::fit(&GpConfig::default(), support, &y).unwrap()
}

fn pairwise(cartogram: &camcann_cartography::Cartogram, entries: &[MapEntry]) -> Vec<f64> {
    let mut out = Vec::new();
    for a in entries {
        for b in entries {
            out.push(cartogram.distance(&a.id, &b.id).unwrap());
        }
    }
    out
}

#[test]
fn kernel_distances_are_symmetric_with_zero_diagonal() {
    let entries = entries(30, 1);
    let gp = fitted_gp(&entries);
    let cartogram = Cartographer::default().embed(&gp, entries).unwrap();
    let d = cartogram.kernel_distances();
    for i in 0..d.len() {
        assert_eq!(d.get(i, i), 0.0);
        for j in 0..d.len() {
            assert_eq!(d.get(i, j), d.get(j, i));
        }
    }
}

#[test]
fn triplet_ordering_is_mostly_preserved() {
    let entries = entries(40, 5);
    let gp = fitted_gp(&entries);
    let cartogram = Cartographer::default().embed(&gp, entries).unwrap();
    let agreement = cartogram.triplet_agreement(3_000, 17);
    assert!(agreement > 0.75, "triplet agreement {agreement}");
    assert!(cartogram.stress() < 0.5);
}

#[test]
fn same_seed_gives_same_pairwise_distances() {
    for init in [LayoutInit::Random, LayoutInit::ClassicalMds] {
        let entries = entries(24, 9);
        let gp = fitted_gp(&entries);
        let config = CartogramConfig::default().with_init(init).with_seed(123);

        let first = Cartographer::new(config.clone()).unwrap().embed(&gp, entries.clone()).unwrap();
        let second = Cartographer::new(config).unwrap().embed(&gp, entries.clone()).unwrap();
        assert_eq!(pairwise(&first, &entries), pairwise(&second, &entries));
    }
}

#[test]
fn neighbours_report_both_distances() {
    let entries = entries(20, 3);
    let gp = fitted_gp(&entries);
    let id = entries[0].id;
    let cartogram = Cartographer::default().embed(&gp, entries).unwrap();
    let neighbours = cartogram.neighbours(&id, 5).unwrap();
    assert_eq!(neighbours.len(), 5);
    for n in &neighbours {
        assert!(n.kernel_distance >= 0.0);
        assert!(n.name.starts_with("mol-"));
    }
    let diag = cartogram.diagnose(&id, 5).unwrap();
    assert_eq!(diag.neighbours, neighbours);
    assert!((0.0..=1.0).contains(&diag.kernel_overlap));
    assert!((0.0..=1.0).contains(&diag.disagreement));
}
