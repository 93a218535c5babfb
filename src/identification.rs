//! Input identification records and run bookkeeping.
//!
//! `Identification` and `ProteinGroup` are the one piece of the data model
//! supplied by an external collaborator (the identification loader, spec
//! §1); this crate only adds the derived `peakfinding_mass` field once the
//! isotope model has been computed for a sequence, and stores both types in
//! per-run arenas so `ChromatographicPeak` can reference them by index
//! instead of holding a borrow across the cutting/merging passes.

use crate::formula::ElementComposition;
use crate::system::Mass;
use serde::{Deserialize, Serialize};

/// Stable index of an [`Identification`] within a [`RunData`] arena.
pub type IdentificationId = usize;

/// Stable index of a [`ProteinGroup`] within a [`RunData`] arena.
pub type ProteinGroupId = usize;

/// A protein group an identified peptide maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProteinGroup {
    pub accession: String,
    pub gene_name: Option<String>,
}

/// One MS/MS-identified peptide-spectrum match, as supplied by the
/// (external) identification loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identification {
    /// Which run this identification came from.
    pub file_ref: String,
    /// Unmodified one-letter-code sequence.
    pub base_sequence: String,
    /// Sequence including modification annotations, used as the identity
    /// key for cross-run matching and MBR.
    pub modified_sequence: String,
    /// Reported neutral monoisotopic mass.
    pub monoisotopic_mass: Mass,
    /// Observed precursor charge state.
    pub precursor_charge: i8,
    /// MS2 scan retention time, in minutes.
    pub ms2_retention_time: f64,
    /// Search engine PSM score (higher is better).
    pub psm_score: f64,
    /// Search engine q-value for this PSM.
    pub q_value: f64,
    /// Chemical formula, if the search engine/loader supplied one.
    pub optional_chemical_formula: Option<ElementComposition>,
    /// Protein groups this peptide was assigned to.
    pub protein_groups: Vec<ProteinGroupId>,
    /// Monoisotopic mass plus the most-abundant isotope shift, filled in
    /// once by the isotope model (spec §4.2). `None` until then.
    pub peakfinding_mass: Option<Mass>,
}

impl Identification {
    /// `true` once the isotope model has populated `peakfinding_mass`.
    pub fn has_isotope_model(&self) -> bool {
        self.peakfinding_mass.is_some()
    }

    /// Mass the XIC builder should search for: `peakfinding_mass` if the
    /// isotope model has run, else the raw monoisotopic mass as a
    /// conservative fallback.
    pub fn search_mass(&self) -> Mass {
        self.peakfinding_mass.unwrap_or(self.monoisotopic_mass)
    }
}

/// Which experimental condition/replicate/fraction a run belongs to, used
/// by the RT aligner (runs are aligned within the same study) and by
/// `require_msms_id_in_condition` (spec §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDescriptor {
    pub run_id: String,
    pub file_path: String,
    pub condition: String,
    pub bio_replicate: u32,
    pub fraction: u32,
    pub tech_replicate: u32,
}

/// Per-run arena of identifications and protein groups, plus the run's own
/// descriptor. `ChromatographicPeak` stores `IdentificationId`s into this
/// arena rather than owning `Identification`s directly, so identifications
/// shared between peaks (ambiguous peptides) and peaks referencing
/// identifications from a donor run (MBR) don't need shared ownership.
#[derive(Debug, Clone, Default)]
pub struct RunData {
    pub descriptor: Option<RunDescriptor>,
    identifications: Vec<Identification>,
    protein_groups: Vec<ProteinGroup>,
}

impl RunData {
    pub fn new(descriptor: RunDescriptor) -> Self {
        Self {
            descriptor: Some(descriptor),
            identifications: Vec::new(),
            protein_groups: Vec::new(),
        }
    }

    pub fn push_identification(&mut self, identification: Identification) -> IdentificationId {
        self.identifications.push(identification);
        self.identifications.len() - 1
    }

    pub fn push_protein_group(&mut self, group: ProteinGroup) -> ProteinGroupId {
        self.protein_groups.push(group);
        self.protein_groups.len() - 1
    }

    pub fn identification(&self, id: IdentificationId) -> &Identification {
        &self.identifications[id]
    }

    pub fn identification_mut(&mut self, id: IdentificationId) -> &mut Identification {
        &mut self.identifications[id]
    }

    pub fn protein_group(&self, id: ProteinGroupId) -> &ProteinGroup {
        &self.protein_groups[id]
    }

    pub fn identifications(&self) -> impl Iterator<Item = (IdentificationId, &Identification)> {
        self.identifications.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.identifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifications.is_empty()
    }

    /// Distinct modified sequences among this run's identifications, the
    /// grouping key the isotope model (spec §4.2) operates over.
    pub fn distinct_modified_sequences(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.identifications
            .iter()
            .map(|id| id.modified_sequence.as_str())
            .filter(|seq| seen.insert(*seq))
            .collect()
    }
}
