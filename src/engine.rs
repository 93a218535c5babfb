//! Top-level pipeline wiring (spec §2/§3): isotope modeling, per-run MS2
//! quantification, cross-run match-between-runs, and FDR/PEP filtering.

use crate::chromatographic_peak::ChromatographicPeak;
use crate::config::EngineParameters;
use crate::error::{Diagnostics, EngineError, RunWarning};
use crate::fdr;
use crate::identification::RunData;
use crate::isotope;
use crate::mbr_orchestrator::{self, DonorRun};
use crate::ms2_quant;
use crate::peak::{IndexedPeak, Ms1ScanInfo};
use crate::peak_index::PeakIndex;
use crate::pep_classifier;

/// Raw MS1 input for one run: its scan list and observed centroids, as
/// produced by the (external) streaming reader of spec §6.
pub struct RunMs1Data {
    pub scans: Vec<Ms1ScanInfo>,
    pub centroids: Vec<IndexedPeak>,
}

/// One run's identifications plus its MS1 data, as supplied by the caller.
pub struct RunInput {
    pub run: RunData,
    pub ms1: RunMs1Data,
}

/// A run's final combined (MS2 + MBR, collision-resolved, FDR-filtered)
/// result.
pub struct RunResult {
    pub run_id: String,
    pub run: RunData,
    pub peaks: Vec<ChromatographicPeak>,
}

/// The full output of one engine invocation.
pub struct QuantifyOutput {
    pub runs: Vec<RunResult>,
    pub diagnostics: Vec<RunWarning>,
}

struct PreparedRun {
    run_id: String,
    run: RunData,
    scans: Vec<Ms1ScanInfo>,
    index: PeakIndex,
    ms2_peaks: Vec<ChromatographicPeak>,
}

/// Run the full label-free quantification pipeline over every supplied run.
///
/// Runs are processed in the order given by the caller; spec §5's
/// deterministic run ordering (by condition, bio-replicate, fraction,
/// tech-replicate) is the caller's responsibility to establish before
/// calling in, the same way `RunDescriptor` fields are supplied rather than
/// derived here.
///
/// FDR and PEP are computed per acceptor run rather than pooled across the
/// whole engine invocation: once the orchestrator has routed its MBR peaks
/// back into an acceptor, that acceptor's peak list is the last point where
/// every peak unambiguously belongs to one run without extra bookkeeping.
/// Per-run scoring only costs PEP training feasibility in experiments with
/// very few runs or very few MBR transfers, which is already a handled,
/// diagnosed fallback ([`RunWarning::PepTrainingSkipped`]).
pub fn quantify(inputs: Vec<RunInput>, params: &EngineParameters) -> Result<QuantifyOutput, EngineError> {
    params.validate()?;
    if inputs.is_empty() {
        return Err(EngineError::NoRuns);
    }

    let mut diagnostics = Diagnostics::new();
    let mut prepared = Vec::with_capacity(inputs.len());

    for mut input in inputs {
        let run_id = input
            .run
            .descriptor
            .as_ref()
            .map(|d| d.run_id.clone())
            .unwrap_or_default();

        if input.run.is_empty() {
            diagnostics.push(RunWarning::NoIdentifications { run_id: run_id.clone() });
        }
        if input.ms1.scans.is_empty() {
            diagnostics.push(RunWarning::UnreadableRun {
                run_id: run_id.clone(),
                reason: "no MS1 scans".into(),
            });
        }

        build_isotope_models(&mut input.run, params, &mut diagnostics);

        let mut index = PeakIndex::new();
        for peak in input.ms1.centroids {
            index.insert(peak);
        }
        index.sort_buckets();

        let charges = run_wide_charges(&input.run);
        let ms2_peaks = ms2_quant::quantify_run(&input.run, &input.ms1.scans, &index, params, &charges);

        prepared.push(PreparedRun {
            run_id,
            run: input.run,
            scans: input.ms1.scans,
            index,
            ms2_peaks,
        });
    }

    let donors: Vec<DonorRun<'_>> = prepared
        .iter()
        .map(|r| DonorRun {
            run_id: &r.run_id,
            run: &r.run,
            peaks: &r.ms2_peaks,
        })
        .collect();

    let mut mbr_peaks_by_acceptor = Vec::with_capacity(prepared.len());
    for acceptor in &prepared {
        if params.match_between_runs {
            let (peaks, warnings) = mbr_orchestrator::quantify_mbr_for_acceptor(
                &acceptor.run_id,
                &acceptor.run,
                &acceptor.scans,
                &acceptor.index,
                &acceptor.ms2_peaks,
                &donors,
                params,
            );
            for warning in warnings {
                diagnostics.push(warning);
            }
            mbr_peaks_by_acceptor.push(peaks);
        } else {
            mbr_peaks_by_acceptor.push(Vec::new());
        }
    }
    drop(donors);

    let mut runs = Vec::with_capacity(prepared.len());
    for (run, mbr_peaks) in prepared.into_iter().zip(mbr_peaks_by_acceptor) {
        let mut combined =
            mbr_orchestrator::resolve_apex_collisions(run.ms2_peaks, mbr_peaks, &run.run, &params.peptide_modified_sequences_to_quantify);

        fdr::assign_q_values(&mut combined);

        let mbr_count = combined.iter().filter(|p| p.is_mbr).count();
        let decoy_count = combined.iter().filter(|p| p.is_mbr && p.random_rt).count();
        if pep_classifier::train_and_assign_pep(&mut combined, params) {
            combined = pep_classifier::keep_lowest_pep_per_identification(combined);
        } else if params.match_between_runs && mbr_count > 0 {
            diagnostics.push(RunWarning::PepTrainingSkipped {
                reason: format!("run {}: {mbr_count} MBR peaks, {decoy_count} random-RT decoys", run.run_id),
            });
        }

        let combined = fdr::filter_by_q_value(combined, params.mbr_detection_q_value_threshold);

        runs.push(RunResult {
            run_id: run.run_id,
            run: run.run,
            peaks: combined,
        });
    }

    Ok(QuantifyOutput {
        runs,
        diagnostics: diagnostics.into_vec(),
    })
}

/// Populate `peakfinding_mass` for every identification in a run (spec
/// §4.2 step 1), grouped by distinct modified sequence so repeated
/// identifications of the same peptide share one isotope model instead of
/// rebuilding it per PSM.
fn build_isotope_models(run: &mut RunData, params: &EngineParameters, diagnostics: &mut Diagnostics) {
    let sequences: Vec<String> = run
        .distinct_modified_sequences()
        .into_iter()
        .map(str::to_string)
        .collect();

    for sequence in sequences {
        let representative = run
            .identifications()
            .find(|(_, id)| id.modified_sequence == sequence)
            .map(|(id, _)| id)
            .expect("sequence came from this run's own identifications");

        let used_averagine_only = run.identification(representative).optional_chemical_formula.is_none();
        let pattern = isotope::pattern_for_identification(run.identification(representative), params.num_isotopes_required);
        if used_averagine_only {
            diagnostics.push(RunWarning::IsotopeModelFallback {
                modified_sequence: sequence.clone(),
                reason: "no chemical formula supplied, built from averagine".into(),
            });
        }

        let peakfinding_mass = pattern.peakfinding_mass();
        let ids: Vec<usize> = run
            .identifications()
            .filter(|(_, id)| id.modified_sequence == sequence)
            .map(|(id, _)| id)
            .collect();
        for id in ids {
            run.identification_mut(id).peakfinding_mass = Some(peakfinding_mass);
        }
    }
}

/// Every charge state observed anywhere among a run's identifications, used
/// when `id_specific_charge_state` is off so an XIC is searched across
/// every charge the run has seen rather than just one identification's own.
fn run_wide_charges(run: &RunData) -> Vec<i8> {
    let mut charges: Vec<i8> = run.identifications().map(|(_, id)| id.precursor_charge).collect();
    charges.sort_unstable();
    charges.dedup();
    charges
}
