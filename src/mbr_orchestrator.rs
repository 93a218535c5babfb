//! Match-between-runs orchestration: donor selection, target/decoy peak
//! search, and per-run conflict resolution (spec §4.9).

use crate::chromatographic_peak::ChromatographicPeak;
use crate::config::{EngineParameters, SequenceFilter};
use crate::envelope;
use crate::error::RunWarning;
use crate::identification::{Identification, RunData};
use crate::isotope::{self, IsotopePattern};
use crate::mbr_scorer::MbrScorer;
use crate::peak::Ms1ScanInfo;
use crate::peak_cutter;
use crate::peak_index::PeakIndex;
use crate::rand_source;
use crate::rt_align::{self, RtAlignment};
use crate::system::{Mass, NEUTRON_SPACING};
use crate::tolerance::Tolerance;
use crate::xic;
use rayon::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

const NUM_SHARDS: usize = 8;
const DECOY_MASS_WINDOW_MAX: f64 = 1.0e5;
const WIDEN_STEP_MINUTES: f64 = 0.5;

/// A fully quantified donor run: its identification arena and the
/// non-MBR chromatographic peaks produced by the MS2 quantifier.
pub struct DonorRun<'a> {
    pub run_id: &'a str,
    pub run: &'a RunData,
    pub peaks: &'a [ChromatographicPeak],
}

/// Sharded concurrent map from modified sequence to apex-peak-id to
/// candidate peaks, giving the atomic add-or-update semantics spec §5
/// requires of the cross-thread MBR candidate dictionary without a single
/// global lock.
struct CandidateTable {
    shards: Vec<Mutex<HashMap<String, HashMap<u64, Vec<ChromatographicPeak>>>>>,
}

impl CandidateTable {
    fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard_index(&self, sequence: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        sequence.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    fn upsert(&self, sequence: &str, apex_peak_id: u64, peak: ChromatographicPeak) {
        let mut shard = self.shards[self.shard_index(sequence)]
            .lock()
            .expect("candidate table mutex poisoned");
        shard
            .entry(sequence.to_string())
            .or_default()
            .entry(apex_peak_id)
            .or_default()
            .push(peak);
    }

    fn into_inner(self) -> HashMap<String, HashMap<u64, Vec<ChromatographicPeak>>> {
        let mut merged: HashMap<String, HashMap<u64, Vec<ChromatographicPeak>>> = HashMap::new();
        for shard in self.shards {
            let map = shard.into_inner().expect("candidate table mutex poisoned");
            for (sequence, by_apex) in map {
                merged.entry(sequence).or_default().extend(by_apex);
            }
        }
        merged
    }
}

/// Read a bare ppm number out of a `Tolerance<Mass>`. An absolute
/// tolerance has no natural ppm reading; its Da value is used as a
/// fallback sentinel rather than rejecting the configuration outright.
fn ppm_value(tolerance: &Tolerance<Mass>) -> f64 {
    match tolerance {
        Tolerance::Ppm(p) => p.into_inner(),
        Tolerance::Abs(mass) => mass.value,
    }
}

fn whitelisted(sequence: &str, whitelist: &SequenceFilter) -> bool {
    match whitelist {
        SequenceFilter::All => true,
        SequenceFilter::Only(list) => list.iter().any(|s| s == sequence),
    }
}

/// Run match-between-runs for one acceptor run against every other run's
/// donor peaks, producing the set of MBR target and random-RT decoy peaks
/// registered for this acceptor (spec §4.9).
#[allow(clippy::too_many_arguments)]
pub fn quantify_mbr_for_acceptor(
    acceptor_run_id: &str,
    acceptor_run: &RunData,
    acceptor_scans: &[Ms1ScanInfo],
    acceptor_index: &PeakIndex,
    acceptor_ms2_peaks: &[ChromatographicPeak],
    donors: &[DonorRun<'_>],
    params: &EngineParameters,
) -> (Vec<ChromatographicPeak>, Vec<RunWarning>) {
    let mut warnings = Vec::new();

    if !params.match_between_runs {
        return (Vec::new(), warnings);
    }

    let acceptor_anchor_candidates = rt_align::select_anchor_candidates(
        acceptor_run,
        acceptor_ms2_peaks,
        params.donor_criterion,
        params.donor_q_value_threshold,
        params.mbr_alignment_window.value,
    );

    let Some(scorer) = MbrScorer::fit(acceptor_run, acceptor_ms2_peaks, ppm_value(&params.mbr_ppm_tolerance)) else {
        warnings.push(RunWarning::InvalidScorer {
            run_id: acceptor_run_id.to_string(),
            reason: "fewer than 3 ppm samples among acceptor MS2 peaks".into(),
        });
        return (Vec::new(), warnings);
    };

    let ms2_apex_ids: HashSet<u64> = acceptor_ms2_peaks
        .iter()
        .filter_map(|p| p.apex_peak())
        .map(|p| p.peak_id)
        .collect();

    let table = CandidateTable::new();

    for donor in donors {
        if donor.run_id == acceptor_run_id {
            continue;
        }

        let donor_anchor_candidates = rt_align::select_anchor_candidates(
            donor.run,
            donor.peaks,
            params.donor_criterion,
            params.donor_q_value_threshold,
            params.mbr_alignment_window.value,
        );
        let alignment = rt_align::build_alignment(&donor_anchor_candidates, &acceptor_anchor_candidates);
        if alignment.anchors().is_empty() {
            warnings.push(RunWarning::NoAnchorPeptides {
                donor_run_id: donor.run_id.to_string(),
                acceptor_run_id: acceptor_run_id.to_string(),
            });
            continue;
        }

        let eligible: Vec<&ChromatographicPeak> = donor
            .peaks
            .iter()
            .filter(|peak| donor_peak_eligible(peak, donor.run, acceptor_run, params))
            .collect();

        eligible.par_iter().for_each(|&donor_peak| {
            process_donor_peak(
                donor_peak,
                donor,
                &alignment,
                &scorer,
                acceptor_scans,
                acceptor_index,
                params,
                &table,
            );
        });
    }

    let results = finalize(table.into_inner(), &ms2_apex_ids);
    (results, warnings)
}

/// Whether a donor peak is a candidate for transfer into `acceptor_run`:
/// not already MS2-identified there, whitelisted, non-ambiguous unless
/// ambiguous peptides are being quantified, and (optionally) backed by a
/// protein with at least one MS2 identification in the acceptor run.
fn donor_peak_eligible(
    donor_peak: &ChromatographicPeak,
    donor_run: &RunData,
    acceptor_run: &RunData,
    params: &EngineParameters,
) -> bool {
    let Some(&first_id) = donor_peak.identifications.first() else {
        return false;
    };
    let identification = donor_run.identification(first_id);

    if !params.quantify_ambiguous_peptides && identification.protein_groups.len() > 1 {
        return false;
    }
    if !whitelisted(&identification.modified_sequence, &params.peptide_modified_sequences_to_quantify) {
        return false;
    }

    let already_identified_in_acceptor = acceptor_run.identifications().any(|(_, id)| {
        id.modified_sequence == identification.modified_sequence && id.q_value < params.donor_q_value_threshold
    });
    if already_identified_in_acceptor {
        return false;
    }

    if params.require_msms_id_in_condition {
        let donor_accessions: HashSet<&str> = identification
            .protein_groups
            .iter()
            .map(|&pg| donor_run.protein_group(pg).accession.as_str())
            .collect();
        let protein_has_id = acceptor_run.identifications().any(|(_, aid)| {
            aid.protein_groups
                .iter()
                .any(|&pg| donor_accessions.contains(acceptor_run.protein_group(pg).accession.as_str()))
        });
        if !protein_has_id {
            return false;
        }
    }

    true
}

/// Search for a target transfer and a random-RT decoy for one donor peak,
/// widening the search window when both are absent, and register whatever
/// is found in `table`.
#[allow(clippy::too_many_arguments)]
fn process_donor_peak(
    donor_peak: &ChromatographicPeak,
    donor: &DonorRun<'_>,
    alignment: &RtAlignment,
    scorer: &MbrScorer,
    acceptor_scans: &[Ms1ScanInfo],
    acceptor_index: &PeakIndex,
    params: &EngineParameters,
    table: &CandidateTable,
) {
    let Some(apex) = donor_peak.apex() else { return };
    let Some(&id) = donor_peak.identifications.first() else {
        return;
    };
    let identification = donor.run.identification(id);
    let donor_rt = apex.indexed_peak.retention_time;
    let target_mass = identification.search_mass();
    let pattern = isotope::pattern_for_identification(identification, params.num_isotopes_required);

    let mut charges: Vec<i8> = donor_peak.charge_list.clone();
    if !charges.contains(&identification.precursor_charge) {
        charges.push(identification.precursor_charge);
    }

    let max_half_width = params.mbr_rt_window_minutes();
    let mut half_width = alignment.predict(donor_rt, params).half_width.min(max_half_width);

    loop {
        let predicted = alignment.predict(donor_rt, params);
        let target = best_candidate_across_charges(
            acceptor_scans,
            acceptor_index,
            predicted.predicted_rt,
            half_width,
            target_mass,
            &charges,
            &pattern,
            params,
            scorer,
            donor_peak.intensity,
        );
        let target_found = target.is_some();
        if let Some((mut peak, score)) = target {
            peak.is_mbr = true;
            peak.random_rt = false;
            peak.decoy_peptide = false;
            peak.identifications = donor_peak.identifications.clone();
            peak.mbr_score = Some(score);
            peak.mbr_source_sequence = Some(identification.modified_sequence.clone());
            if let Some(apex_peak) = peak.apex_peak() {
                table.upsert(&identification.modified_sequence, apex_peak.peak_id, peak);
            }
        }

        let decoy = pick_decoy_donor_peak(donor, donor_peak, identification, half_width, params).and_then(
            |decoy_donor_peak| {
                let decoy_apex_rt = decoy_donor_peak.apex()?.indexed_peak.retention_time;
                let random_predicted = alignment.predict(decoy_apex_rt, params);
                best_candidate_across_charges(
                    acceptor_scans,
                    acceptor_index,
                    random_predicted.predicted_rt,
                    random_predicted.half_width.min(max_half_width),
                    target_mass,
                    &charges,
                    &pattern,
                    params,
                    scorer,
                    donor_peak.intensity,
                )
            },
        );
        let decoy_found = decoy.is_some();
        if let Some((mut peak, score)) = decoy {
            peak.is_mbr = true;
            peak.random_rt = true;
            peak.decoy_peptide = false;
            peak.identifications = donor_peak.identifications.clone();
            peak.mbr_score = Some(score);
            peak.mbr_source_sequence = Some(identification.modified_sequence.clone());
            if let Some(apex_peak) = peak.apex_peak() {
                table.upsert(&identification.modified_sequence, apex_peak.peak_id, peak);
            }
        }

        if target_found || decoy_found || half_width >= max_half_width {
            break;
        }
        half_width = (half_width + WIDEN_STEP_MINUTES).min(max_half_width);
    }
}

/// Build a candidate chromatographic peak at each requested charge, score
/// each against `scorer`, and return the best-scoring one with any other
/// charge's candidate merged in if its RT span overlaps.
#[allow(clippy::too_many_arguments)]
fn best_candidate_across_charges(
    acceptor_scans: &[Ms1ScanInfo],
    acceptor_index: &PeakIndex,
    center_rt: f64,
    half_width: f64,
    target_mass: Mass,
    charges: &[i8],
    pattern: &IsotopePattern,
    params: &EngineParameters,
    scorer: &MbrScorer,
    donor_intensity: f64,
) -> Option<(ChromatographicPeak, f64)> {
    let search_tol = Tolerance::new_ppm(scorer.effective_mbr_ppm_tolerance());
    let mut candidates: Vec<(ChromatographicPeak, f64)> = charges
        .iter()
        .filter_map(|&charge| {
            let candidate_peak = build_candidate_peak(
                acceptor_scans,
                acceptor_index,
                center_rt,
                half_width,
                target_mass,
                charge,
                pattern,
                params,
                &search_tol,
            )?;
            let mut candidate_peak = candidate_peak;
            let score = score_candidate(&mut candidate_peak, target_mass, center_rt, half_width, scorer, donor_intensity);
            Some((candidate_peak, score))
        })
        .collect();

    if candidates.is_empty() {
        return None;
    }
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
    let (mut best_peak, best_score) = candidates.remove(0);

    let best_span = best_peak.rt_span();
    for (other_peak, _) in candidates {
        let overlaps = match (best_span, other_peak.rt_span()) {
            (Some((lo, hi)), Some((olo, ohi))) => olo <= hi && ohi >= lo,
            _ => false,
        };
        if overlaps {
            best_peak.merge(other_peak);
        }
    }
    Some((best_peak, best_score))
}

/// Build a candidate chromatographic peak from the acceptor's MS1 data: an
/// XIC at `target_mass`/`charge` clipped to `[center_rt - half_width,
/// center_rt + half_width]`, with envelopes validated and the result cut.
///
/// `search_tol` is the scorer's data-driven effective MBR ppm tolerance
/// (spec §4.8: `min(|median|+4*spread, mbr_ppm_tolerance)`), not the raw
/// configured `mbr_ppm_tolerance` — it bounds both the XIC search and the
/// envelope's mono-isotope match, so the empirically fit window is what
/// actually constrains a transfer candidate.
#[allow(clippy::too_many_arguments)]
fn build_candidate_peak(
    acceptor_scans: &[Ms1ScanInfo],
    acceptor_index: &PeakIndex,
    center_rt: f64,
    half_width: f64,
    target_mass: Mass,
    charge: i8,
    pattern: &IsotopePattern,
    params: &EngineParameters,
    search_tol: &Tolerance<Mass>,
) -> Option<ChromatographicPeak> {
    let xic = xic::peakfind(
        acceptor_scans,
        acceptor_index,
        center_rt,
        target_mass,
        charge,
        search_tol,
        params.missed_scans_allowed,
    );

    let mut peak = ChromatographicPeak::new(Vec::new());
    for candidate in xic {
        if candidate.retention_time < center_rt - half_width || candidate.retention_time > center_rt + half_width {
            continue;
        }
        if let Some(envelope) = envelope::validate(
            candidate,
            pattern,
            charge,
            acceptor_index,
            search_tol,
            &params.isotope_ppm_tolerance,
            params.num_isotopes_required,
        ) {
            peak.envelopes.push(envelope);
            if !peak.charge_list.contains(&charge) {
                peak.charge_list.push(charge);
            }
        }
    }
    if peak.envelopes.is_empty() {
        return None;
    }

    peak_cutter::cut(&mut peak, center_rt, params.discrimination_factor_to_cut_peak, params.integrate);
    if peak.envelopes.is_empty() {
        return None;
    }
    Some(peak)
}

fn score_candidate(
    peak: &mut ChromatographicPeak,
    target_mass: Mass,
    predicted_rt: f64,
    half_width: f64,
    scorer: &MbrScorer,
    donor_intensity: f64,
) -> f64 {
    let apex = peak.apex().expect("build_candidate_peak only returns non-empty peaks");
    let observed_mass = apex.indexed_peak.neutral_mass(apex.charge);
    let ppm_error = observed_mass.signed_ppm_error(target_mass).value;
    let observed_rt = apex.indexed_peak.retention_time;
    let pearson_correlation = apex.pearson_correlation;
    let rt_spread = (half_width / 6.0).max(1e-6);
    peak.mbr_ppm_error = Some(ppm_error);
    peak.mbr_rt_error = Some(observed_rt - predicted_rt);
    peak.mbr_donor_intensity = Some(donor_intensity);
    // The downstream fold-change model is an out-of-scope external
    // collaborator (spec §1); this orchestrator never has a fold-change
    // estimate to offer the scorer.
    scorer.score(
        ppm_error,
        predicted_rt,
        observed_rt,
        rt_spread,
        peak.intensity,
        donor_intensity,
        None,
        pearson_correlation,
    )
}

/// Pseudo-randomly pick another donor peak to serve as the random-RT
/// decoy's RT source: a different base sequence, a peakfinding mass at
/// least `5*NEUTRON_SPACING` and less than `11*NEUTRON_SPACING` away
/// (widened up to [`DECOY_MASS_WINDOW_MAX`] Da if nothing qualifies), with
/// an apex at least `2*half_width` away from the real donor's apex RT.
fn pick_decoy_donor_peak<'a>(
    donor: &DonorRun<'a>,
    donor_peak: &ChromatographicPeak,
    identification: &Identification,
    half_width: f64,
    params: &EngineParameters,
) -> Option<&'a ChromatographicPeak> {
    let donor_apex_rt = donor_peak.apex()?.indexed_peak.retention_time;
    let min_rt_distance = 2.0 * half_width;
    let own_mass = identification.peakfinding_mass?;

    let mut upper_bound = 11.0 * NEUTRON_SPACING;
    let candidates = loop {
        let found: Vec<&ChromatographicPeak> = donor
            .peaks
            .iter()
            .filter(|other| {
                let Some(&other_id) = other.identifications.first() else {
                    return false;
                };
                let other_identification = donor.run.identification(other_id);
                if other_identification.base_sequence == identification.base_sequence {
                    return false;
                }
                let Some(other_mass) = other_identification.peakfinding_mass else {
                    return false;
                };
                let mass_diff = (other_mass.value - own_mass.value).abs();
                if mass_diff < 5.0 * NEUTRON_SPACING || mass_diff >= upper_bound {
                    return false;
                }
                other
                    .apex()
                    .map(|other_apex| (other_apex.indexed_peak.retention_time - donor_apex_rt).abs() >= min_rt_distance)
                    .unwrap_or(false)
            })
            .collect();
        if !found.is_empty() || upper_bound >= DECOY_MASS_WINDOW_MAX {
            break found;
        }
        upper_bound = (upper_bound * 2.0).min(DECOY_MASS_WINDOW_MAX);
    };

    if candidates.is_empty() {
        return None;
    }
    let mut rng = rand_source::rng_for_donor(params.random_seed, &identification.modified_sequence);
    rand_source::choose_uniform(&mut rng, &candidates).copied()
}

/// Per modified sequence, per `random_rt` group, keep the highest-scoring
/// candidate that doesn't collide with an MS2-identified apex, merging in
/// any other same-group candidate whose RT span overlaps it.
fn finalize(
    table: HashMap<String, HashMap<u64, Vec<ChromatographicPeak>>>,
    ms2_apex_ids: &HashSet<u64>,
) -> Vec<ChromatographicPeak> {
    let mut results = Vec::new();
    for (_, by_apex) in table {
        let all: Vec<ChromatographicPeak> = by_apex.into_values().flatten().collect();
        let (target_candidates, decoy_candidates): (Vec<_>, Vec<_>) = all.into_iter().partition(|p| !p.random_rt);
        if let Some(peak) = select_best_with_merge(target_candidates, ms2_apex_ids) {
            results.push(peak);
        }
        if let Some(peak) = select_best_with_merge(decoy_candidates, ms2_apex_ids) {
            results.push(peak);
        }
    }
    results
}

fn select_best_with_merge(
    mut candidates: Vec<ChromatographicPeak>,
    ms2_apex_ids: &HashSet<u64>,
) -> Option<ChromatographicPeak> {
    candidates.sort_by(|a, b| b.mbr_score.unwrap_or(f64::MIN).total_cmp(&a.mbr_score.unwrap_or(f64::MIN)));
    let position = candidates.iter().position(|peak| {
        peak.apex_peak()
            .map(|apex| !ms2_apex_ids.contains(&apex.peak_id))
            .unwrap_or(false)
    })?;
    let mut chosen = candidates.remove(position);
    let chosen_span = chosen.rt_span();
    candidates.retain(|other| match (chosen_span, other.rt_span()) {
        (Some((lo, hi)), Some((olo, ohi))) => olo <= hi && ohi >= lo,
        _ => false,
    });
    for other in candidates {
        chosen.merge(other);
    }
    Some(chosen)
}

/// Resolve apex-IndexedPeak collisions across a run's combined MS2 and MBR
/// peak lists, restoring apex uniqueness (spec invariant 3) per the four
/// explicit merge rules of spec §4.9's error-checking pass.
pub fn resolve_apex_collisions(
    ms2_peaks: Vec<ChromatographicPeak>,
    mbr_peaks: Vec<ChromatographicPeak>,
    run: &RunData,
    whitelist: &SequenceFilter,
) -> Vec<ChromatographicPeak> {
    let mut by_apex: HashMap<u64, Vec<ChromatographicPeak>> = HashMap::new();
    for peak in ms2_peaks.into_iter().chain(mbr_peaks) {
        if let Some(apex) = peak.apex_peak() {
            by_apex.entry(apex.peak_id).or_default().push(peak);
        }
    }

    let mut resolved = Vec::new();
    for (_, mut group) in by_apex {
        while group.len() > 1 {
            let a = group.pop().expect("len > 1");
            let b = group.pop().expect("len > 1");
            group.push(resolve_pair(a, b, run, whitelist));
        }
        if let Some(peak) = group.pop() {
            resolved.push(peak);
        }
    }
    resolved
}

fn sequences_of<'a>(peak: &ChromatographicPeak, run: &'a RunData) -> Vec<&'a str> {
    peak.identifications
        .iter()
        .map(|&id| run.identification(id).modified_sequence.as_str())
        .collect()
}

fn resolve_pair(
    a: ChromatographicPeak,
    b: ChromatographicPeak,
    run: &RunData,
    whitelist: &SequenceFilter,
) -> ChromatographicPeak {
    match (a.is_mbr, b.is_mbr) {
        (false, false) => {
            let a_sequences = sequences_of(&a, run);
            let b_sequences = sequences_of(&b, run);
            let a_ok = a_sequences.iter().all(|s| whitelisted(s, whitelist));
            let b_ok = b_sequences.iter().all(|s| whitelisted(s, whitelist));
            if a_ok && b_ok {
                let mut merged = a;
                merged.merge(b);
                merged
            } else if a_ok {
                a
            } else {
                b
            }
        }
        (false, true) => pick_ms2_over_mbr(a, b, run, whitelist),
        (true, false) => pick_ms2_over_mbr(b, a, run, whitelist),
        (true, true) => {
            let a_sequences = sequences_of(&a, run);
            let b_sequences = sequences_of(&b, run);
            if a_sequences.iter().any(|s| b_sequences.contains(s)) {
                let mut merged = a;
                merged.merge(b);
                merged
            } else if a.mbr_score.unwrap_or(f64::MIN) >= b.mbr_score.unwrap_or(f64::MIN) {
                a
            } else {
                b
            }
        }
    }
}

/// `ms2` beats `mbr` unless `ms2` is itself a decoy peptide or not
/// whitelisted, in which case `mbr` is kept instead.
fn pick_ms2_over_mbr(
    ms2: ChromatographicPeak,
    mbr: ChromatographicPeak,
    run: &RunData,
    whitelist: &SequenceFilter,
) -> ChromatographicPeak {
    let ms2_sequences = sequences_of(&ms2, run);
    let ms2_ok = !ms2.decoy_peptide && ms2_sequences.iter().all(|s| whitelisted(s, whitelist));
    if ms2_ok {
        ms2
    } else {
        mbr
    }
}
