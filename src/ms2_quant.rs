//! Per-run MS2 quantification: one [`ChromatographicPeak`] per MS2
//! identification (spec §4.6).

use crate::chromatographic_peak::ChromatographicPeak;
use crate::config::EngineParameters;
use crate::envelope;
use crate::identification::{IdentificationId, RunData};
use crate::isotope::{self, IsotopePattern};
use crate::peak::Ms1ScanInfo;
use crate::peak_cutter;
use crate::peak_index::PeakIndex;
use crate::xic;
use rayon::prelude::*;
use std::collections::HashMap;

/// Quantify every identification in a run, producing one
/// [`ChromatographicPeak`] per identification that survives charge
/// filtering and peak cutting.
///
/// `run_wide_charges` is the set of charge states observed anywhere in the
/// run; when `id_specific_charge_state` is off, every identification's XIC
/// is searched at all of them, not just its own reported charge.
pub fn quantify_run(
    run: &RunData,
    scans: &[Ms1ScanInfo],
    index: &PeakIndex,
    params: &EngineParameters,
    run_wide_charges: &[i8],
) -> Vec<ChromatographicPeak> {
    let patterns: HashMap<&str, IsotopePattern> = run
        .distinct_modified_sequences()
        .into_iter()
        .map(|sequence| {
            let identification = run
                .identifications()
                .find(|(_, id)| id.modified_sequence == sequence)
                .map(|(_, id)| id)
                .expect("sequence came from this run's own identifications");
            let pattern = isotope::pattern_for_identification(identification, params.num_isotopes_required);
            (sequence, pattern)
        })
        .collect();

    let ids: Vec<(IdentificationId, &crate::identification::Identification)> = run.identifications().collect();

    ids.par_iter()
        .filter_map(|&(id, identification)| {
            let pattern = patterns.get(identification.modified_sequence.as_str())?;
            quantify_one(id, identification, pattern, scans, index, params, run_wide_charges)
        })
        .collect()
}

fn quantify_one(
    id: IdentificationId,
    identification: &crate::identification::Identification,
    pattern: &IsotopePattern,
    scans: &[Ms1ScanInfo],
    index: &PeakIndex,
    params: &EngineParameters,
    run_wide_charges: &[i8],
) -> Option<ChromatographicPeak> {
    let charges: Vec<i8> = if params.id_specific_charge_state {
        vec![identification.precursor_charge]
    } else {
        run_wide_charges.to_vec()
    };

    let mut peak = ChromatographicPeak::new(vec![id]);

    for &charge in &charges {
        let xic = xic::peakfind(
            scans,
            index,
            identification.ms2_retention_time,
            pattern.peakfinding_mass(),
            charge,
            &params.peakfinding_ppm_tolerance,
            params.missed_scans_allowed,
        );
        for candidate in xic {
            // The XIC itself was built at the wider peakfinding tolerance;
            // narrow to the default ppm tolerance before envelope validation.
            if !params
                .ppm_tolerance
                .contains(candidate.neutral_mass(charge), pattern.peakfinding_mass())
            {
                continue;
            }
            if let Some(envelope) = envelope::validate(
                candidate,
                pattern,
                charge,
                index,
                &params.ppm_tolerance,
                &params.isotope_ppm_tolerance,
                params.num_isotopes_required,
            ) {
                peak.envelopes.push(envelope);
                if !peak.charge_list.contains(&charge) {
                    peak.charge_list.push(charge);
                }
            }
        }
    }

    let own_charge = identification.precursor_charge;
    let own_charge_scans: Vec<u32> = peak
        .envelopes
        .iter()
        .filter(|e| e.charge == own_charge)
        .map(|e| e.indexed_peak.zero_based_ms1_index)
        .collect();
    let (min_scan, max_scan) = (
        own_charge_scans.iter().copied().min()?,
        own_charge_scans.iter().copied().max()?,
    );
    peak.envelopes
        .retain(|e| e.indexed_peak.zero_based_ms1_index >= min_scan && e.indexed_peak.zero_based_ms1_index <= max_scan);

    peak_cutter::cut(&mut peak, identification.ms2_retention_time, params.discrimination_factor_to_cut_peak, params.integrate);

    if peak.envelopes.is_empty() {
        return None;
    }
    Some(peak)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identification::{Identification, RunDescriptor};
    use crate::peak::IndexedPeak;

    fn run_with_one_identification() -> RunData {
        let mut run = RunData::new(RunDescriptor {
            run_id: "run-1".into(),
            file_path: "run-1.raw".into(),
            condition: "control".into(),
            bio_replicate: 1,
            fraction: 1,
            tech_replicate: 1,
        });
        run.push_identification(Identification {
            file_ref: "run-1".into(),
            base_sequence: "PEPTIDE".into(),
            modified_sequence: "PEPTIDE".into(),
            monoisotopic_mass: crate::formula::composition_from_base_sequence("PEPTIDE")
                .unwrap()
                .monoisotopic_mass(),
            precursor_charge: 2,
            ms2_retention_time: 1.0,
            psm_score: 50.0,
            q_value: 0.001,
            optional_chemical_formula: None,
            protein_groups: Vec::new(),
            peakfinding_mass: None,
        });
        run
    }

    fn scans(n: u32) -> Vec<Ms1ScanInfo> {
        (0..n)
            .map(|i| Ms1ScanInfo {
                zero_based_ms1_index: i,
                one_based_scan_number: i + 1,
                retention_time: f64::from(i) * 0.1,
            })
            .collect()
    }

    #[test]
    fn a_fully_synthetic_envelope_quantifies_to_one_peak() {
        let run = run_with_one_identification();
        let (_, identification) = run.identifications().next().unwrap();
        let composition = crate::formula::composition_from_base_sequence("PEPTIDE").unwrap();
        let params = EngineParameters::default();
        let pattern = isotope::build_isotope_pattern(&composition, identification.monoisotopic_mass, params.num_isotopes_required);

        let mut index = PeakIndex::new();
        for scan in 8..=12u32 {
            for peak in pattern.peaks() {
                let mz = peak.mass.to_mz(2).value;
                index.insert(IndexedPeak {
                    mz,
                    intensity: peak.normalized_abundance * 10_000.0,
                    zero_based_ms1_index: scan,
                    retention_time: f64::from(scan) * 0.1,
                    peak_id: 0,
                });
            }
        }
        index.sort_buckets();

        let scan_list = scans(20);
        let peaks = quantify_run(&run, &scan_list, &index, &params, &[2]);
        assert_eq!(peaks.len(), 1);
        assert!(peaks[0].intensity > 0.0);
    }
}
