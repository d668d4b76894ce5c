//! Synthetic surfactants and latent point clouds for tests.
//!
//! Molecules are built as graphs directly (no SMILES parsing); their SMILES
//! strings are written alongside so class inference still runs. Targets
//! follow Klevens-style linear laws in tail length with a little seeded
//! noise.

use camcann_common::{Bond, Dataset, DatasetKind, LatentVector, MolecularGraph, Molecule, Record, SurfactantClass};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

/// Atom feature layout: one-hot C, O, N, S, then formal charge and a
/// head-group flag.
pub const ATOM_DIM: usize = 6;

const C: usize = 0;
const O: usize = 1;
const N: usize = 2;
const S: usize = 3;

fn atom(element: usize, charge: f32, head: bool) -> Vec<f32> {
    let mut features = vec![0.0; ATOM_DIM];
    features[element] = 1.0;
    features[4] = charge;
    features[5] = if head { 1.0 } else { 0.0 };
    features
}

/// Incrementally assembled molecular graph.
struct GraphBuilder {
    atoms: Vec<Vec<f32>>,
    bonds: Vec<Bond>,
}

impl GraphBuilder {
    fn new() -> Self {
        Self { atoms: Vec::new(), bonds: Vec::new() }
    }

    /// Add an atom, bonded to `parent` when given; returns its index.
    fn add(&mut self, features: Vec<f32>, parent: Option<usize>, order: f32) -> usize {
        let idx = self.atoms.len();
        self.atoms.push(features);
        if let Some(p) = parent {
            // bond attributes: one-hot single / double
            let features = if order > 1.0 { vec![0.0, 1.0] } else { vec![1.0, 0.0] };
            self.bonds.push(Bond::new(p, idx, order).with_features(features));
        }
        idx
    }

    fn tail(&mut self, length: usize) -> usize {
        let mut last = self.add(atom(C, 0.0, false), None, 1.0);
        for _ in 1..length {
            last = self.add(atom(C, 0.0, false), Some(last), 1.0);
        }
        last
    }

    fn build(self) -> MolecularGraph {
        MolecularGraph::new(self.atoms, self.bonds).expect("synthetic graph is valid")
    }
}

/// CiEj nonionic: alkyl tail of `tail` carbons, `eo` ethylene-oxide units.
pub fn alkyl_ethoxylate(tail: usize, eo: usize) -> Molecule {
    let mut g = GraphBuilder::new();
    let mut last = g.tail(tail);
    for _ in 0..eo {
        last = g.add(atom(O, 0.0, true), Some(last), 1.0);
        last = g.add(atom(C, 0.0, true), Some(last), 1.0);
        last = g.add(atom(C, 0.0, true), Some(last), 1.0);
    }
    g.add(atom(O, 0.0, true), Some(last), 1.0);

    let smiles = format!("{}{}O", "C".repeat(tail), "OCC".repeat(eo));
    Molecule::new(format!("C{tail}E{eo}"), smiles, g.build())
}

/// Sodium alkyl sulfate (anionic).
pub fn alkyl_sulfate(tail: usize) -> Molecule {
    let mut g = GraphBuilder::new();
    let last = g.tail(tail);
    let bridge = g.add(atom(O, 0.0, true), Some(last), 1.0);
    let sulfur = g.add(atom(S, 0.0, true), Some(bridge), 1.0);
    g.add(atom(O, 0.0, true), Some(sulfur), 2.0);
    g.add(atom(O, 0.0, true), Some(sulfur), 2.0);
    g.add(atom(O, -1.0, true), Some(sulfur), 1.0);

    let smiles = format!("{}OS(=O)(=O)[O-].[Na+]", "C".repeat(tail));
    Molecule::new(format!("C{tail}SO4Na"), smiles, g.build())
}

/// Alkyl trimethylammonium bromide (cationic).
pub fn alkyl_trimethylammonium(tail: usize) -> Molecule {
    let mut g = GraphBuilder::new();
    let last = g.tail(tail);
    let nitrogen = g.add(atom(N, 1.0, true), Some(last), 1.0);
    for _ in 0..3 {
        g.add(atom(C, 0.0, true), Some(nitrogen), 1.0);
    }

    let smiles = format!("{}[N+](C)(C)C.[Br-]", "C".repeat(tail));
    Molecule::new(format!("C{tail}TAB"), smiles, g.build())
}

/// Alkyl dimethylammonio propanesulfonate (zwitterionic sulfobetaine).
pub fn sulfobetaine(tail: usize) -> Molecule {
    let mut g = GraphBuilder::new();
    let last = g.tail(tail);
    let nitrogen = g.add(atom(N, 1.0, true), Some(last), 1.0);
    g.add(atom(C, 0.0, true), Some(nitrogen), 1.0);
    g.add(atom(C, 0.0, true), Some(nitrogen), 1.0);
    let mut spacer = nitrogen;
    for _ in 0..3 {
        spacer = g.add(atom(C, 0.0, true), Some(spacer), 1.0);
    }
    let sulfur = g.add(atom(S, 0.0, true), Some(spacer), 1.0);
    g.add(atom(O, 0.0, true), Some(sulfur), 2.0);
    g.add(atom(O, 0.0, true), Some(sulfur), 2.0);
    g.add(atom(O, -1.0, true), Some(sulfur), 1.0);

    let smiles = format!("{}[N+](C)(C)CCCS(=O)(=O)[O-]", "C".repeat(tail));
    Molecule::new(format!("C{tail}SB3"), smiles, g.build())
}

/// Klevens-style log10(CMC / µM) for a synthetic surfactant.
pub fn klevens_log_cmc(class: SurfactantClass, tail: usize, eo: usize) -> f64 {
    let n = tail as f64;
    match class {
        SurfactantClass::Nonionic => 5.6 - 0.50 * n + 0.04 * eo as f64,
        SurfactantClass::Anionic => 7.1 - 0.30 * n,
        SurfactantClass::Cationic => 7.0 - 0.29 * n,
        SurfactantClass::Zwitterionic => 6.6 - 0.47 * n,
    }
}

/// Build one synthetic record of the given class.
pub fn surfactant_record(class: SurfactantClass, tail: usize, eo: usize) -> Record {
    let molecule = match class {
        SurfactantClass::Nonionic => alkyl_ethoxylate(tail, eo),
        SurfactantClass::Anionic => alkyl_sulfate(tail),
        SurfactantClass::Cationic => alkyl_trimethylammonium(tail),
        SurfactantClass::Zwitterionic => sulfobetaine(tail),
    };
    Record::new(molecule, klevens_log_cmc(class, tail, eo))
}

/// `n` surfactants cycling through all four classes, tails 8..=16,
/// 2..=8 EO units for nonionics, with ±0.05 seeded target noise.
pub fn surfactant_dataset(n: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let records = (0..n)
        .map(|i| {
            let class = SurfactantClass::ALL[i % SurfactantClass::ALL.len()];
            let tail = rng.gen_range(8..=16);
            let eo = rng.gen_range(2..=8);
            let mut record = surfactant_record(class, tail, eo);
            record.log_cmc += rng.gen_range(-0.05..0.05);
            record
        })
        .collect();
    Dataset::new("synthetic", DatasetKind::PrimaryTrain, records)
}

/// Dataset made of one class only, one record per tail length.
pub fn class_series(class: SurfactantClass, tails: impl IntoIterator<Item = usize>, eo: usize) -> Dataset {
    let records = tails.into_iter().map(|t| surfactant_record(class, t, eo)).collect();
    Dataset::new(format!("{class}-series"), DatasetKind::PrimaryTrain, records)
}

/// Gaussian-ish cloud of `n` latent vectors around `center` (uniform jitter
/// of ±`spread` per coordinate).
pub fn latent_cluster(center: &[f64], spread: f64, n: usize, seed: u64) -> Vec<LatentVector> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let values = center
                .iter()
                .map(|c| c + rng.gen_range(-spread..=spread))
                .collect();
            LatentVector::new(Uuid::new_v4(), values)
        })
        .collect()
}

/// Smooth test function over latent space: `sin(x0) + 0.5 x1`.
pub fn smooth_target(z: &LatentVector) -> f64 {
    let v = z.as_slice();
    v[0].sin() + 0.5 * v.get(1).copied().unwrap_or(0.0)
}
