//! Engine-wide error types and non-fatal diagnostics.
//!
//! Only conditions that make it impossible to continue the whole engine
//! invocation (a bad parameter, I/O failure on the peak-index temp files)
//! become an [`EngineError`]. Everything scoped to a single run, pair, or
//! peak is instead recorded as a [`RunWarning`] in a [`Diagnostics`]
//! accumulator returned alongside the results, per the "isolated, logged,
//! continue" policy.

use std::fmt;
use std::path::PathBuf;

/// Fatal, engine-wide failures.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to write peak index for run {run_id} at {path}: {source}")]
    PeakIndexIo {
        run_id: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize peak index for run {run_id}: {source}")]
    PeakIndexSerialization {
        run_id: String,
        #[source]
        source: bincode::Error,
    },

    #[error("invalid engine parameter `{parameter}`: {reason}")]
    InvalidParameter { parameter: String, reason: String },

    #[error("no runs supplied to quantify()")]
    NoRuns,
}

/// A non-fatal condition scoped to one run, one donor/acceptor pair, or one
/// peak. Matches the error kinds enumerated by this crate's error-handling
/// design: each variant is handled by skipping the narrowest possible scope
/// and continuing.
#[derive(Debug, Clone)]
pub enum RunWarning {
    /// A run's MS file could not be read, or produced no scans.
    UnreadableRun { run_id: String, reason: String },
    /// A run had no identifications; it produces an empty result, not a
    /// warning-worthy failure, but is recorded for completeness.
    NoIdentifications { run_id: String },
    /// An MBR scorer could not be fit for an acceptor (fewer than 3 ppm
    /// samples); MBR is disabled for that acceptor only.
    InvalidScorer { run_id: String, reason: String },
    /// No anchor peptides were shared between a donor/acceptor pair; MBR is
    /// disabled for that pair only.
    NoAnchorPeptides { donor_run_id: String, acceptor_run_id: String },
    /// An isotope model could not be built from the supplied formula or
    /// base sequence; fell back to pure averagine from `monoisotopic_mass`.
    IsotopeModelFallback { modified_sequence: String, reason: String },
    /// PEP training was infeasible (too few peaks or random-RT decoys);
    /// PEP was skipped and double-decoy q-values retained.
    PepTrainingSkipped { reason: String },
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnreadableRun { run_id, reason } => {
                write!(f, "run {run_id}: unreadable, skipped ({reason})")
            }
            Self::NoIdentifications { run_id } => {
                write!(f, "run {run_id}: no identifications, empty result")
            }
            Self::InvalidScorer { run_id, reason } => {
                write!(f, "run {run_id}: MBR scorer invalid, MBR disabled ({reason})")
            }
            Self::NoAnchorPeptides {
                donor_run_id,
                acceptor_run_id,
            } => write!(
                f,
                "donor {donor_run_id} -> acceptor {acceptor_run_id}: no anchor peptides, MBR disabled for pair"
            ),
            Self::IsotopeModelFallback {
                modified_sequence,
                reason,
            } => write!(
                f,
                "{modified_sequence}: isotope model fallback to pure averagine ({reason})"
            ),
            Self::PepTrainingSkipped { reason } => {
                write!(f, "PEP training skipped, double-decoy q-values retained ({reason})")
            }
        }
    }
}

/// An accumulator of [`RunWarning`]s produced over the course of one
/// `quantify()` invocation. Every non-fatal condition is both logged (via
/// the `log` facade, at the point it occurs) and pushed here so a caller
/// can inspect what happened without parsing log output.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    warnings: Vec<RunWarning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning, logging it at the appropriate level.
    pub fn push(&mut self, warning: RunWarning) {
        match &warning {
            RunWarning::NoIdentifications { .. } => log::info!("{warning}"),
            _ => log::warn!("{warning}"),
        }
        self.warnings.push(warning);
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RunWarning> {
        self.warnings.iter()
    }

    pub fn into_vec(self) -> Vec<RunWarning> {
        self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_accumulate_in_order() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(RunWarning::NoIdentifications {
            run_id: "run-1".into(),
        });
        diagnostics.push(RunWarning::InvalidScorer {
            run_id: "run-2".into(),
            reason: "only 2 ppm samples".into(),
        });
        assert_eq!(diagnostics.into_vec().len(), 2);
    }

    #[test]
    fn warning_display_mentions_the_run() {
        let warning = RunWarning::UnreadableRun {
            run_id: "run-7".into(),
            reason: "truncated file".into(),
        };
        assert!(warning.to_string().contains("run-7"));
    }
}
