//! Double-decoy q-value estimation for match-between-runs peaks (spec
//! §4.10).
//!
//! Every MBR peak carries two independent decoy axes: `decoy_peptide` (a
//! decoy identification transferred under the real donor's mass) and
//! `random_rt` (a real identification searched at a pseudo-random RT). A
//! peak bearing both is a "double decoy", used to correct the decoy-peptide
//! count the way target-decoy competition corrects for the decoy database
//! being only as large as the target search space.

use crate::chromatographic_peak::ChromatographicPeak;

/// Assign `mbr_q_value` to every MBR peak in `peaks`, leaving non-MBR peaks
/// untouched. Peaks are walked in descending MBR-score order; ties are
/// broken arbitrarily but stably (sort is stable, input order preserved).
pub fn assign_q_values(peaks: &mut [ChromatographicPeak]) {
    let mut order: Vec<usize> = (0..peaks.len()).filter(|&i| peaks[i].is_mbr).collect();
    order.sort_by(|&a, &b| {
        let score_a = peaks[a].mbr_score.unwrap_or(f64::MIN);
        let score_b = peaks[b].mbr_score.unwrap_or(f64::MIN);
        score_b.total_cmp(&score_a)
    });

    if order.is_empty() {
        return;
    }

    let mut target = 0u32;
    let mut decoy_peptide = 0u32;
    let mut random_rt = 0u32;
    let mut double_decoy = 0u32;
    let mut q_values = vec![0.0f64; order.len()];

    for (position, &index) in order.iter().enumerate() {
        let peak = &peaks[index];
        match (peak.decoy_peptide, peak.random_rt) {
            (true, true) => double_decoy += 1,
            (true, false) => decoy_peptide += 1,
            (false, true) => random_rt += 1,
            (false, false) => target += 1,
        }
        let estimated_decoy_peptide_errors = decoy_peptide.saturating_sub(double_decoy) as f64;
        q_values[position] =
            (1.0 + f64::from(random_rt) + estimated_decoy_peptide_errors) / f64::from(target.max(1));
    }

    // Monotonize high-index (lowest score) to low-index (highest score): a
    // running minimum walked backwards so q-values never increase as score
    // increases.
    for i in (0..q_values.len().saturating_sub(1)).rev() {
        q_values[i] = q_values[i].min(q_values[i + 1]);
    }

    for (position, &index) in order.iter().enumerate() {
        peaks[index].mbr_q_value = Some(q_values[position]);
    }
}

/// Drop MBR peaks whose `mbr_q_value` exceeds `threshold`; non-MBR peaks
/// always pass through. Peaks with no assigned q-value (e.g. an empty MBR
/// result set) are dropped defensively rather than silently kept.
pub fn filter_by_q_value(peaks: Vec<ChromatographicPeak>, threshold: f64) -> Vec<ChromatographicPeak> {
    peaks
        .into_iter()
        .filter(|peak| !peak.is_mbr || peak.mbr_q_value.map(|q| q <= threshold).unwrap_or(false))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chromatographic_peak::IsotopicEnvelope;
    use crate::peak::IndexedPeak;

    fn mbr_peak(score: f64, decoy_peptide: bool, random_rt: bool) -> ChromatographicPeak {
        let mut peak = ChromatographicPeak::new(Vec::new());
        peak.is_mbr = true;
        peak.decoy_peptide = decoy_peptide;
        peak.random_rt = random_rt;
        peak.mbr_score = Some(score);
        peak.envelopes.push(IsotopicEnvelope {
            indexed_peak: IndexedPeak {
                mz: 500.0,
                intensity: 100.0,
                zero_based_ms1_index: 0,
                retention_time: 0.0,
                peak_id: 0,
            },
            charge: 2,
            summed_intensity: 100.0,
            pearson_correlation: 0.9,
        });
        peak
    }

    #[test]
    fn q_values_are_monotonic_in_descending_score_order() {
        let mut peaks = vec![
            mbr_peak(10.0, false, false),
            mbr_peak(9.0, false, true),
            mbr_peak(8.0, false, false),
            mbr_peak(7.0, false, true),
            mbr_peak(6.0, false, false),
        ];
        assign_q_values(&mut peaks);

        let mut by_score: Vec<&ChromatographicPeak> = peaks.iter().collect();
        by_score.sort_by(|a, b| b.mbr_score.unwrap().total_cmp(&a.mbr_score.unwrap()));
        let q_values: Vec<f64> = by_score.iter().map(|p| p.mbr_q_value.unwrap()).collect();
        for window in q_values.windows(2) {
            assert!(window[0] <= window[1] + 1e-12);
        }
    }

    #[test]
    fn a_single_target_peak_gets_q_value_one() {
        let mut peaks = vec![mbr_peak(5.0, false, false)];
        assign_q_values(&mut peaks);
        assert!((peaks[0].mbr_q_value.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn random_rt_decoys_raise_the_q_value_of_worse_scoring_targets() {
        let mut peaks = vec![
            mbr_peak(10.0, false, false),
            mbr_peak(9.0, false, true),
            mbr_peak(8.0, false, true),
            mbr_peak(7.0, false, false),
        ];
        assign_q_values(&mut peaks);
        assert!(peaks[3].mbr_q_value.unwrap() > peaks[0].mbr_q_value.unwrap());
    }

    #[test]
    fn non_mbr_peaks_are_left_untouched() {
        let mut peaks = vec![ChromatographicPeak::new(Vec::new()), mbr_peak(5.0, false, false)];
        assign_q_values(&mut peaks);
        assert!(peaks[0].mbr_q_value.is_none());
    }

    #[test]
    fn filter_by_q_value_drops_high_q_mbr_peaks_but_keeps_non_mbr() {
        let mut peaks = vec![mbr_peak(5.0, false, false), ChromatographicPeak::new(Vec::new())];
        peaks[0].mbr_q_value = Some(0.2);
        let filtered = filter_by_q_value(peaks, 0.05);
        assert_eq!(filtered.len(), 1);
        assert!(!filtered[0].is_mbr);
    }
}
