//! Chromatographic peaks and the isotope envelopes that make them up.

use crate::identification::IdentificationId;
use crate::peak::IndexedPeak;

/// One (scan, charge) accepted isotope-pattern match (spec §4.4). Belongs
/// to exactly one [`ChromatographicPeak`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsotopicEnvelope {
    pub indexed_peak: IndexedPeak,
    pub charge: i8,
    pub summed_intensity: f64,
    pub pearson_correlation: f64,
}

/// An ordered sequence of envelopes for one peptide in one run.
#[derive(Debug, Clone)]
pub struct ChromatographicPeak {
    pub envelopes: Vec<IsotopicEnvelope>,
    pub identifications: Vec<IdentificationId>,
    pub intensity: f64,
    pub is_mbr: bool,
    /// `true` if this peak was searched at a pseudo-random decoy RT rather
    /// than the real (predicted) acceptor RT.
    pub random_rt: bool,
    /// `true` if this peak was transferred using a decoy identification
    /// (a different base sequence masquerading under the donor's mass).
    pub decoy_peptide: bool,
    pub mbr_score: Option<f64>,
    pub mbr_pep: Option<f64>,
    pub mbr_q_value: Option<f64>,
    /// ppm mass error of the apex against the donor's target mass, kept
    /// alongside the score for PEP classifier feature extraction.
    pub mbr_ppm_error: Option<f64>,
    /// Retention-time error: observed apex RT minus the RT aligner's
    /// prediction for this transfer.
    pub mbr_rt_error: Option<f64>,
    /// Donor run's peak intensity for this transfer, kept so a PEP
    /// classifier can derive a donor/acceptor intensity ratio feature.
    pub mbr_donor_intensity: Option<f64>,
    /// The donor identification's modified sequence, for MBR peaks. Kept
    /// directly rather than resolved through `identifications` because
    /// those ids index into the donor run's arena, not the acceptor's.
    pub mbr_source_sequence: Option<String>,
    /// Retention time at which the peak cutter last split this peak away
    /// from a neighbor, if any.
    pub split_rt: Option<f64>,
    pub charge_list: Vec<i8>,
}

impl ChromatographicPeak {
    pub fn new(identifications: Vec<IdentificationId>) -> Self {
        Self {
            envelopes: Vec::new(),
            identifications,
            intensity: 0.0,
            is_mbr: false,
            random_rt: false,
            decoy_peptide: false,
            mbr_score: None,
            mbr_pep: None,
            mbr_q_value: None,
            mbr_ppm_error: None,
            mbr_rt_error: None,
            mbr_donor_intensity: None,
            mbr_source_sequence: None,
            split_rt: None,
            charge_list: Vec::new(),
        }
    }

    /// The apex envelope: the one with the highest `summed_intensity`.
    pub fn apex(&self) -> Option<&IsotopicEnvelope> {
        self.envelopes
            .iter()
            .max_by(|a, b| a.summed_intensity.total_cmp(&b.summed_intensity))
    }

    /// Apex `IndexedPeak`, the identity used for collision/error checking
    /// (spec invariant 3).
    pub fn apex_peak(&self) -> Option<IndexedPeak> {
        self.apex().map(|e| e.indexed_peak)
    }

    /// Minimum and maximum scan index spanned by this peak's envelopes.
    pub fn scan_span(&self) -> Option<(u32, u32)> {
        let mut scans = self.envelopes.iter().map(|e| e.indexed_peak.zero_based_ms1_index);
        let first = scans.next()?;
        Some(scans.fold((first, first), |(lo, hi), s| (lo.min(s), hi.max(s))))
    }

    /// Minimum and maximum retention time spanned by this peak's envelopes.
    pub fn rt_span(&self) -> Option<(f64, f64)> {
        let mut rts = self.envelopes.iter().map(|e| e.indexed_peak.retention_time);
        let first = rts.next()?;
        Some(rts.fold((first, first), |(lo, hi), rt| (lo.min(rt), hi.max(rt))))
    }

    /// Recompute `intensity` from the current envelope list: apex intensity,
    /// or integrated area (trapezoidal over retention time) when
    /// `integrate` is set (spec §4.6).
    pub fn recalculate_intensity(&mut self, integrate: bool) {
        self.intensity = if integrate {
            self.integrated_area()
        } else {
            self.apex().map(|e| e.summed_intensity).unwrap_or(0.0)
        };
    }

    fn integrated_area(&self) -> f64 {
        if self.envelopes.len() < 2 {
            return self.apex().map(|e| e.summed_intensity).unwrap_or(0.0);
        }
        let mut ordered: Vec<&IsotopicEnvelope> = self.envelopes.iter().collect();
        ordered.sort_by(|a, b| {
            a.indexed_peak
                .zero_based_ms1_index
                .cmp(&b.indexed_peak.zero_based_ms1_index)
        });
        ordered
            .windows(2)
            .map(|pair| {
                let (a, b) = (pair[0], pair[1]);
                let dt = b.indexed_peak.retention_time - a.indexed_peak.retention_time;
                0.5 * (a.summed_intensity + b.summed_intensity) * dt
            })
            .sum()
    }

    /// Merge another peak's envelopes and identifications into this one
    /// (spec §4.9's "two MS2 peaks whose IDs are both whitelisted merge").
    pub fn merge(&mut self, other: ChromatographicPeak) {
        self.envelopes.extend(other.envelopes);
        for id in other.identifications {
            if !self.identifications.contains(&id) {
                self.identifications.push(id);
            }
        }
        for charge in other.charge_list {
            if !self.charge_list.contains(&charge) {
                self.charge_list.push(charge);
            }
        }
        self.is_mbr = self.is_mbr && other.is_mbr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(scan: u32, rt: f64, intensity: f64) -> IsotopicEnvelope {
        IsotopicEnvelope {
            indexed_peak: IndexedPeak {
                mz: 500.0,
                intensity,
                zero_based_ms1_index: scan,
                retention_time: rt,
                peak_id: u64::from(scan),
            },
            charge: 2,
            summed_intensity: intensity,
            pearson_correlation: 0.95,
        }
    }

    #[test]
    fn apex_is_the_most_intense_envelope() {
        let mut peak = ChromatographicPeak::new(vec![0]);
        peak.envelopes.push(envelope(0, 0.0, 100.0));
        peak.envelopes.push(envelope(1, 0.1, 500.0));
        peak.envelopes.push(envelope(2, 0.2, 200.0));
        assert_eq!(peak.apex().unwrap().indexed_peak.zero_based_ms1_index, 1);
    }

    #[test]
    fn recalculate_intensity_apex_mode_uses_apex_only() {
        let mut peak = ChromatographicPeak::new(vec![0]);
        peak.envelopes.push(envelope(0, 0.0, 100.0));
        peak.envelopes.push(envelope(1, 0.1, 500.0));
        peak.recalculate_intensity(false);
        assert!((peak.intensity - 500.0).abs() < 1e-9);
    }

    #[test]
    fn recalculate_intensity_integrate_mode_sums_trapezoids() {
        let mut peak = ChromatographicPeak::new(vec![0]);
        peak.envelopes.push(envelope(0, 0.0, 100.0));
        peak.envelopes.push(envelope(1, 1.0, 100.0));
        peak.recalculate_intensity(true);
        assert!((peak.intensity - 100.0).abs() < 1e-9);
    }

    #[test]
    fn merge_deduplicates_identifications_and_charges() {
        let mut a = ChromatographicPeak::new(vec![0]);
        a.charge_list.push(2);
        let mut b = ChromatographicPeak::new(vec![0, 1]);
        b.charge_list.push(2);
        b.charge_list.push(3);
        a.merge(b);
        assert_eq!(a.identifications, vec![0, 1]);
        assert_eq!(a.charge_list, vec![2, 3]);
    }
}
