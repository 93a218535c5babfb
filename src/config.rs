//! Engine configuration.
//!
//! A plain `Default`-implementing struct, the same shape the teacher crate
//! uses for its own `Model` configuration: every knob the engine exposes,
//! collected in one place with the defaults named in this crate's design
//! document rather than scattered across function signatures.

use crate::system::{da, rt_min, Mass, Time};
use crate::tolerance::Tolerance;
use serde::{Deserialize, Serialize};

/// Which donor a peptide's retention-time alignment and MBR transfer should
/// prefer when more than one run could donate an identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DonorCriterion {
    /// Prefer the donor with the best PSM score.
    Score,
    /// Prefer the donor observed in the most other runs (highest neighbor
    /// count among acceptors).
    Neighbors,
    /// Prefer the donor with the highest precursor intensity.
    Intensity,
}

impl Default for DonorCriterion {
    fn default() -> Self {
        Self::Score
    }
}

/// Which modified sequences are eligible for match-between-runs transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceFilter {
    /// Every modified sequence is eligible.
    All,
    /// Only the listed modified sequences are eligible.
    Only(Vec<String>),
}

impl Default for SequenceFilter {
    fn default() -> Self {
        Self::All
    }
}

/// Every tunable parameter of the quantification engine, with the defaults
/// from this crate's design document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineParameters {
    /// MS1 precursor search tolerance.
    pub ppm_tolerance: Tolerance<Mass>,
    /// Tolerance used when validating isotope envelope peaks against the
    /// theoretical pattern.
    pub isotope_ppm_tolerance: Tolerance<Mass>,
    /// Tolerance used by the XIC builder's peakfinding query.
    pub peakfinding_ppm_tolerance: Tolerance<Mass>,
    /// Minimum number of isotopes an envelope/pattern must retain.
    pub num_isotopes_required: usize,
    /// Consecutive MS1 scans an XIC may miss before the walk stops.
    pub missed_scans_allowed: u32,
    /// Whether peak intensity is the integrated area under the XIC rather
    /// than the apex intensity.
    pub integrate: bool,
    /// Whether identifications are only matched against XICs at their own
    /// observed charge state, rather than across all observed charges.
    pub id_specific_charge_state: bool,
    /// Minimum relative intensity drop at a valley for the peak cutter to
    /// split a chromatographic peak there.
    pub discrimination_factor_to_cut_peak: f64,
    /// Whether match-between-runs is enabled at all.
    pub match_between_runs: bool,
    /// Precursor tolerance used specifically during MBR acceptor search.
    pub mbr_ppm_tolerance: Tolerance<Mass>,
    /// Retention-time window (minutes) searched around a donor's predicted
    /// RT in an acceptor run.
    pub mbr_rt_window: Time,
    /// Retention-time window (minutes) used when selecting anchor peptides
    /// for RT alignment between two runs.
    pub mbr_alignment_window: Time,
    /// Minimum number of anchor peptides required to align a donor/acceptor
    /// pair.
    pub num_anchor_peptides_for_mbr: usize,
    /// Which donor to prefer when more than one run could donate an
    /// identification.
    pub donor_criterion: DonorCriterion,
    /// Maximum q-value for an identification to be eligible as an MBR
    /// donor.
    pub donor_q_value_threshold: f64,
    /// Maximum q-value for an MBR-detected peak to be retained in results.
    pub mbr_detection_q_value_threshold: f64,
    /// Whether a modified sequence already MS2-identified anywhere in the
    /// acceptor's experimental condition is excluded from MBR in that run.
    pub require_msms_id_in_condition: bool,
    /// Whether peptides shared across multiple protein groups are eligible
    /// for MBR quantification.
    pub quantify_ambiguous_peptides: bool,
    /// Restrict MBR donation/acceptance to a subset of modified sequences.
    pub peptide_modified_sequences_to_quantify: SequenceFilter,
    /// Maximum worker threads used by the rayon-backed per-run and
    /// per-acceptor fan-out. `None` defers to `rayon`'s default (available
    /// cores).
    pub max_threads: Option<usize>,
    /// Seed for the deterministic decoy-selection pseudo-randomness.
    pub random_seed: u64,
    /// Fraction of double-decoy peaks withheld for validating the trained
    /// PEP classifier rather than used to train it.
    pub pep_training_fraction: f64,
}

impl Default for EngineParameters {
    fn default() -> Self {
        Self {
            ppm_tolerance: Tolerance::new_ppm(10.0),
            isotope_ppm_tolerance: Tolerance::new_ppm(5.0),
            peakfinding_ppm_tolerance: Tolerance::new_ppm(20.0),
            num_isotopes_required: 2,
            missed_scans_allowed: 1,
            integrate: false,
            id_specific_charge_state: false,
            discrimination_factor_to_cut_peak: 0.6,
            match_between_runs: false,
            mbr_ppm_tolerance: Tolerance::new_ppm(10.0),
            mbr_rt_window: rt_min(1.0),
            mbr_alignment_window: rt_min(2.5),
            num_anchor_peptides_for_mbr: 3,
            donor_criterion: DonorCriterion::Score,
            donor_q_value_threshold: 0.01,
            mbr_detection_q_value_threshold: 0.05,
            require_msms_id_in_condition: false,
            quantify_ambiguous_peptides: false,
            peptide_modified_sequences_to_quantify: SequenceFilter::All,
            max_threads: None,
            random_seed: 42,
            pep_training_fraction: 0.25,
        }
    }
}

impl EngineParameters {
    /// Reject parameter combinations that cannot produce a meaningful run,
    /// surfacing them as an [`crate::error::EngineError::InvalidParameter`]
    /// at `quantify()` entry rather than failing deep inside the pipeline.
    pub fn validate(&self) -> Result<(), crate::error::EngineError> {
        if self.num_isotopes_required == 0 {
            return Err(crate::error::EngineError::InvalidParameter {
                parameter: "num_isotopes_required".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.num_anchor_peptides_for_mbr == 0 && self.match_between_runs {
            return Err(crate::error::EngineError::InvalidParameter {
                parameter: "num_anchor_peptides_for_mbr".into(),
                reason: "must be at least 1 when match_between_runs is enabled".into(),
            });
        }
        if !(0.0..1.0).contains(&self.pep_training_fraction) {
            return Err(crate::error::EngineError::InvalidParameter {
                parameter: "pep_training_fraction".into(),
                reason: "must be in [0, 1)".into(),
            });
        }
        Ok(())
    }

    /// Convenience accessor mirroring the spec's `mbr_rt_window` in minutes,
    /// used by callers that need a bare `f64` (e.g. the alignment window
    /// used to bucket anchor peptides).
    pub fn mbr_rt_window_minutes(&self) -> f64 {
        self.mbr_rt_window.value
    }
}

/// A `Mass`-quantity constant occasionally useful to callers assembling
/// their own `EngineParameters`: the 20 Da threshold spec §4.2 uses to
/// decide whether a supplied/derived formula needs averagine top-up.
pub const MAX_FORMULA_MASS_DEVIATION: fn() -> Mass = || da(20.0);
