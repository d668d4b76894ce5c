//! Named collections of surfactants with their measured CMC.
//!
//! Targets are stored as log10 of the CMC in µM: CMCs span several orders of
//! magnitude and every model in the workspace regresses in log space.

use std::fmt;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CamcannError, Result};
use crate::molecule::Molecule;
use crate::surfactant::SurfactantClass;

/// The evaluation sets the pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// Training partition of the primary dataset
    PrimaryTrain,
    /// Held-out partition of the primary dataset
    PrimaryTest,
    /// Nonionic surfactants filtered out of a primary partition
    PrimaryNonionic,
    /// Independently curated dataset, disjoint in source from the primary one
    External,
}

impl DatasetKind {
    pub fn is_primary(&self) -> bool {
        !matches!(self, DatasetKind::External)
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DatasetKind::PrimaryTrain => "primary-train",
            DatasetKind::PrimaryTest => "primary-test",
            DatasetKind::PrimaryNonionic => "primary-nonionic",
            DatasetKind::External => "external",
        };
        f.write_str(s)
    }
}

/// One labelled surfactant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub molecule: Molecule,
    /// log10(CMC / µM)
    pub log_cmc: f64,
}

impl Record {
    pub fn new(molecule: Molecule, log_cmc: f64) -> Self {
        Self { molecule, log_cmc }
    }

    /// Build a record from a CMC in µM.
    pub fn from_cmc_micromolar(molecule: Molecule, cmc_um: f64) -> Result<Self> {
        if !(cmc_um > 0.0 && cmc_um.is_finite()) {
            return Err(CamcannError::InvalidInput(format!(
                "CMC must be positive and finite, got {cmc_um}"
            )));
        }
        Ok(Self::new(molecule, cmc_um.log10()))
    }
}

/// A named, ordered collection of labelled surfactants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    name: String,
    kind: DatasetKind,
    records: Vec<Record>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, kind: DatasetKind, records: Vec<Record>) -> Self {
        Self { name: name.into(), kind, records }
    }

    /// Load a pre-featurised dataset written by the external featuriser.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let dataset: Self = serde_json::from_str(&content)?;
        dataset.validate()?;
        debug!(name = %dataset.name, kind = %dataset.kind, n = dataset.len(), "Loaded dataset");
        Ok(dataset)
    }

    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Targets finite, graphs well formed and one atom feature width across
    /// the whole set.
    pub fn validate(&self) -> Result<()> {
        let mut width = None;
        for record in &self.records {
            if !record.log_cmc.is_finite() {
                return Err(CamcannError::InvalidInput(format!(
                    "non-finite target for {}",
                    record.molecule.name()
                )));
            }
            let graph = record.molecule.graph();
            graph.validate()?;
            match width {
                None => width = Some(graph.atom_feature_dim()),
                Some(w) if w != graph.atom_feature_dim() => {
                    return Err(CamcannError::DimensionMismatch {
                        expected: w,
                        found: graph.atom_feature_dim(),
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DatasetKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn molecules(&self) -> impl Iterator<Item = &Molecule> {
        self.records.iter().map(|r| &r.molecule)
    }

    pub fn targets(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.log_cmc).collect()
    }

    pub fn atom_feature_dim(&self) -> Option<usize> {
        self.records.first().map(|r| r.molecule.graph().atom_feature_dim())
    }

    pub fn count_class(&self, class: SurfactantClass) -> usize {
        self.records.iter().filter(|r| r.molecule.class() == class).count()
    }

    /// The nonionic subset of a primary dataset.
    pub fn nonionic_subset(&self) -> Result<Dataset> {
        if !self.kind.is_primary() {
            return Err(CamcannError::InvalidInput(format!(
                "nonionic subset requires a primary dataset, got {}",
                self.kind
            )));
        }
        Ok(Dataset::new(
            format!("{}-nonionic", self.name),
            DatasetKind::PrimaryNonionic,
            self.filtered(|r| r.molecule.class() == SurfactantClass::Nonionic),
        ))
    }

    /// Copy of the dataset with every member of `class` removed.
    pub fn without_class(&self, class: SurfactantClass) -> Dataset {
        Dataset::new(
            format!("{}-without-{}", self.name, class),
            self.kind,
            self.filtered(|r| r.molecule.class() != class),
        )
    }

    /// Copy of the dataset restricted to `class`.
    pub fn only_class(&self, class: SurfactantClass) -> Dataset {
        Dataset::new(
            format!("{}-{}", self.name, class),
            self.kind,
            self.filtered(|r| r.molecule.class() == class),
        )
    }

    /// Seeded shuffle-split into (train, test) partitions.
    pub fn split(&self, test_fraction: f64, seed: u64) -> Result<(Dataset, Dataset)> {
        if !(0.0..1.0).contains(&test_fraction) {
            return Err(CamcannError::InvalidInput(format!(
                "test fraction must be in [0, 1), got {test_fraction}"
            )));
        }
        let mut order: Vec<usize> = (0..self.records.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        order.shuffle(&mut rng);

        let n_test = (self.records.len() as f64 * test_fraction).round() as usize;
        let (test_idx, train_idx) = order.split_at(n_test);
        let pick = |idx: &[usize]| idx.iter().map(|&i| self.records[i].clone()).collect::<Vec<_>>();

        Ok((
            Dataset::new(format!("{}-train", self.name), DatasetKind::PrimaryTrain, pick(train_idx)),
            Dataset::new(format!("{}-test", self.name), DatasetKind::PrimaryTest, pick(test_idx)),
        ))
    }

    fn filtered(&self, keep: impl Fn(&Record) -> bool) -> Vec<Record> {
        self.records.iter().filter(|r| keep(r)).cloned().collect()
    }
}
