//! Surfactant head-group classes and counterion extraction from SMILES.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Head-group charge class of a surfactant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfactantClass {
    Nonionic,
    Anionic,
    Cationic,
    Zwitterionic,
}

impl SurfactantClass {
    pub const ALL: [SurfactantClass; 4] = [
        SurfactantClass::Nonionic,
        SurfactantClass::Anionic,
        SurfactantClass::Cationic,
        SurfactantClass::Zwitterionic,
    ];

    /// Classify a surfactant from its (dot-disconnected) SMILES.
    ///
    /// A positively charged counterion means an anionic surfactant and vice
    /// versa. Without a counterion, a structure carrying both charges is
    /// zwitterionic and anything else is nonionic, including a lone charged
    /// ion written without its partner. Use [`Molecule::with_class`] when the
    /// SMILES is known to be incomplete.
    ///
    /// [`Molecule::with_class`]: crate::Molecule::with_class
    pub fn from_smiles(smiles: &str) -> Self {
        let main = smiles.split('.').next().unwrap_or(smiles);
        match counterion(smiles) {
            Some(ion) if ion == QUAT => SurfactantClass::Anionic,
            Some(ion) if ion.contains('+') => SurfactantClass::Anionic,
            Some(ion) if ion.contains('-') => SurfactantClass::Cationic,
            // Counterion written without an explicit charge: fall back to
            // the surfactant's own charge.
            Some(_) => charge_class(main),
            None if main.contains('+') && main.contains('-') => SurfactantClass::Zwitterionic,
            None => SurfactantClass::Nonionic,
        }
    }

    pub fn is_ionic(&self) -> bool {
        !matches!(self, SurfactantClass::Nonionic)
    }
}

impl fmt::Display for SurfactantClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SurfactantClass::Nonionic => "nonionic",
            SurfactantClass::Anionic => "anionic",
            SurfactantClass::Cationic => "cationic",
            SurfactantClass::Zwitterionic => "zwitterionic",
        };
        f.write_str(s)
    }
}

/// Label used for tetra-alkyl ammonium counterions.
pub const QUAT: &str = "Quat";

fn charge_class(component: &str) -> SurfactantClass {
    match (component.contains('+'), component.contains('-')) {
        (true, true) => SurfactantClass::Zwitterionic,
        (true, false) => SurfactantClass::Cationic,
        (false, true) => SurfactantClass::Anionic,
        (false, false) => SurfactantClass::Nonionic,
    }
}

fn is_bracketed_ion(part: &str) -> bool {
    part.starts_with('[') && part.ends_with(']') && (part.contains('+') || part.contains('-'))
}

/// Extract the counterion from a SMILES string, if there is one.
///
/// Everything after the first `.` is the counterion. When several fragments
/// follow, a repeated bracketed ion (`[Na+].[Na+]`) collapses to one copy,
/// otherwise the last fragment wins. Alkyl ammonium counterions are reported
/// as [`QUAT`].
pub fn counterion(smiles: &str) -> Option<String> {
    let (_, rest) = smiles.split_once('.')?;
    let rest = rest.trim();
    if rest.is_empty() {
        return None;
    }

    if rest.contains('.') {
        let parts: Vec<&str> = rest.split('.').filter(|p| !p.is_empty()).collect();
        let repeated = parts
            .windows(2)
            .find(|w| w[0] == w[1] && is_bracketed_ion(w[0]))
            .map(|w| w[0]);
        return match repeated {
            Some(ion) => Some(ion.to_string()),
            None => parts.last().map(|p| p.to_string()),
        };
    }

    if rest.contains("C[N+]") || rest.contains("CC") {
        Some(QUAT.to_string())
    } else {
        Some(rest.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sodium_salt_is_anionic() {
        let sds = "CCCCCCCCCCCCOS(=O)(=O)[O-].[Na+]";
        assert_eq!(counterion(sds).as_deref(), Some("[Na+]"));
        assert_eq!(SurfactantClass::from_smiles(sds), SurfactantClass::Anionic);
    }

    #[test]
    fn test_bromide_salt_is_cationic() {
        let ctab = "CCCCCCCCCCCCCCCC[N+](C)(C)C.[Br-]";
        assert_eq!(SurfactantClass::from_smiles(ctab), SurfactantClass::Cationic);
    }

    #[test]
    fn test_quaternary_counterion() {
        let smiles = "CCCCCCCCCCCC(=O)[O-].C[N+](C)(C)C";
        assert_eq!(counterion(smiles).as_deref(), Some(QUAT));
        assert_eq!(SurfactantClass::from_smiles(smiles), SurfactantClass::Anionic);
    }

    #[test]
    fn test_multivalent_counterion_collapses() {
        let smiles = "CCCCCCCCCCCCOP(=O)([O-])[O-].[Na+].[Na+]";
        assert_eq!(counterion(smiles).as_deref(), Some("[Na+]"));
    }

    #[test]
    fn test_multiple_fragments_take_last() {
        let smiles = "CCCCCCCCS(=O)(=O)[O-].CCCCCCCCS(=O)(=O)[O-].[Mg+2]";
        assert_eq!(counterion(smiles).as_deref(), Some("[Mg+2]"));
    }

    #[test]
    fn test_no_counterion() {
        let betaine = "CCCCCCCCCCCC[N+](C)(C)CC(=O)[O-]";
        assert_eq!(counterion(betaine), None);
        assert_eq!(SurfactantClass::from_smiles(betaine), SurfactantClass::Zwitterionic);

        let c12e4 = "CCCCCCCCCCCCOCCOCCOCCOCCO";
        assert_eq!(SurfactantClass::from_smiles(c12e4), SurfactantClass::Nonionic);
        assert!(!SurfactantClass::Nonionic.is_ionic());
    }

    #[test]
    fn test_lone_ion_without_counterion_is_nonionic() {
        let bare_sulfate = "CCCCCCCCCCCCOS(=O)(=O)[O-]";
        assert_eq!(counterion(bare_sulfate), None);
        assert_eq!(SurfactantClass::from_smiles(bare_sulfate), SurfactantClass::Nonionic);

        let bare_quat = "CCCCCCCCCCCC[N+](C)(C)C";
        assert_eq!(SurfactantClass::from_smiles(bare_quat), SurfactantClass::Nonionic);
    }
}
