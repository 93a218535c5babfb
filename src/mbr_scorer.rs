//! Composite match-between-runs scoring (spec §4.8).
//!
//! Fits simple per-acceptor statistical distributions (ppm error,
//! log-intensity, and a per-donor RT-prediction-error distribution from the
//! [`crate::rt_align`] anchors) and combines them into a single positive
//! score for a candidate acceptor peak against a donor.

use crate::chromatographic_peak::ChromatographicPeak;
use crate::identification::RunData;

const MIN_PPM_SAMPLES: usize = 3;

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn stddev(values: &[f64], mean_value: f64) -> f64 {
    if values.len() < 2 {
        return 1.0;
    }
    (values.iter().map(|v| (v - mean_value).powi(2)).sum::<f64>() / (values.len() - 1) as f64).sqrt()
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 0 {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    } else {
        values[n / 2]
    }
}

fn interquartile_range(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n < 4 {
        return 0.0;
    }
    let q1 = values[n / 4];
    let q3 = values[(3 * n) / 4];
    q3 - q1
}

/// Log-density of a normal distribution, used to combine independent score
/// components additively.
fn normal_log_density(x: f64, mean: f64, spread: f64) -> f64 {
    let spread = spread.max(1e-9);
    let z = (x - mean) / spread;
    -0.5 * z * z - spread.ln()
}

/// A fitted scorer for one acceptor run.
#[derive(Debug, Clone)]
pub struct MbrScorer {
    ppm_median: f64,
    ppm_spread: f64,
    effective_mbr_ppm_tolerance: f64,
    log_intensity_mean: f64,
    log_intensity_spread: f64,
}

impl MbrScorer {
    /// Fit ppm-error and log-intensity distributions from an acceptor run's
    /// MS2-identified peaks. Returns `None` if fewer than
    /// [`MIN_PPM_SAMPLES`] ppm samples are available (spec: "scorer is
    /// invalid").
    pub fn fit(run: &RunData, ms2_peaks: &[ChromatographicPeak], mbr_ppm_tolerance: f64) -> Option<Self> {
        let mut ppm_errors: Vec<f64> = Vec::new();
        let mut log_intensities: Vec<f64> = Vec::new();

        for peak in ms2_peaks {
            if peak.identifications.len() != 1 {
                continue;
            }
            let id = run.identification(peak.identifications[0]);
            let Some(apex) = peak.apex() else { continue };
            let observed = apex.indexed_peak.neutral_mass(apex.charge);
            let target = id.search_mass();
            ppm_errors.push(observed.signed_ppm_error(target).value);
            if peak.intensity > 0.0 {
                log_intensities.push(peak.intensity.log2());
            }
        }

        if ppm_errors.len() < MIN_PPM_SAMPLES {
            return None;
        }

        let ppm_median = median(&mut ppm_errors.clone());
        let iqr = interquartile_range(&mut ppm_errors.clone());
        let ppm_spread = if ppm_errors.len() < 30 || iqr <= 0.0 {
            stddev(&ppm_errors, mean(&ppm_errors))
        } else {
            iqr / 1.36
        };
        let effective_mbr_ppm_tolerance = (ppm_median.abs() + 4.0 * ppm_spread).min(mbr_ppm_tolerance);

        let log_intensity_mean = if log_intensities.is_empty() { 0.0 } else { mean(&log_intensities) };
        let log_intensity_spread = if log_intensities.len() < 2 {
            1.0
        } else {
            stddev(&log_intensities, log_intensity_mean)
        };

        Some(Self {
            ppm_median,
            ppm_spread,
            effective_mbr_ppm_tolerance,
            log_intensity_mean,
            log_intensity_spread,
        })
    }

    pub fn effective_mbr_ppm_tolerance(&self) -> f64 {
        self.effective_mbr_ppm_tolerance
    }

    /// Score a candidate acceptor peak against a donor transfer hypothesis.
    /// Higher is better; the sum of log-densities across every available
    /// component (spec §4.8).
    #[allow(clippy::too_many_arguments)]
    pub fn score(
        &self,
        observed_ppm_error: f64,
        predicted_rt: f64,
        observed_rt: f64,
        rt_prediction_spread: f64,
        observed_intensity: f64,
        donor_intensity: f64,
        fold_change_log2: Option<f64>,
        envelope_pearson: f64,
    ) -> f64 {
        let ppm_term = normal_log_density(observed_ppm_error, self.ppm_median, self.ppm_spread);
        let rt_term = normal_log_density(observed_rt, predicted_rt, rt_prediction_spread.max(1e-6));

        let expected_log_intensity = match fold_change_log2 {
            Some(fold_change) => donor_intensity.max(1.0).log2() + fold_change,
            None => self.log_intensity_mean,
        };
        let intensity_term = if observed_intensity > 0.0 {
            normal_log_density(observed_intensity.log2(), expected_log_intensity, self.log_intensity_spread)
        } else {
            normal_log_density(0.0, expected_log_intensity, self.log_intensity_spread)
        };

        let envelope_term = envelope_pearson.clamp(-1.0, 1.0);

        ppm_term + rt_term + intensity_term + envelope_term
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identification::{Identification, RunDescriptor};
    use crate::peak::IndexedPeak;
    use crate::system::da;

    fn sample_run_with_peaks(n: usize) -> (RunData, Vec<ChromatographicPeak>) {
        let mut run = RunData::new(RunDescriptor {
            run_id: "acceptor".into(),
            file_path: "acceptor.raw".into(),
            condition: "control".into(),
            bio_replicate: 1,
            fraction: 1,
            tech_replicate: 1,
        });
        let mut peaks = Vec::new();
        for i in 0..n {
            let id = run.push_identification(Identification {
                file_ref: "acceptor".into(),
                base_sequence: format!("PEPTIDE{i}"),
                modified_sequence: format!("PEPTIDE{i}"),
                monoisotopic_mass: da(1000.0 + i as f64),
                precursor_charge: 2,
                ms2_retention_time: 10.0,
                psm_score: 50.0,
                q_value: 0.001,
                optional_chemical_formula: None,
                protein_groups: Vec::new(),
                peakfinding_mass: Some(da(1000.0 + i as f64)),
            });
            let mut peak = ChromatographicPeak::new(vec![id]);
            peak.envelopes.push(crate::chromatographic_peak::IsotopicEnvelope {
                indexed_peak: IndexedPeak {
                    mz: da(1000.0 + i as f64).to_mz(2).value,
                    intensity: 10_000.0,
                    zero_based_ms1_index: 10,
                    retention_time: 10.0,
                    peak_id: i as u64,
                },
                charge: 2,
                summed_intensity: 10_000.0,
                pearson_correlation: 0.95,
            });
            peak.intensity = 10_000.0;
            peaks.push(peak);
        }
        (run, peaks)
    }

    #[test]
    fn fit_fails_with_too_few_ppm_samples() {
        let (run, peaks) = sample_run_with_peaks(2);
        assert!(MbrScorer::fit(&run, &peaks, 10.0).is_none());
    }

    #[test]
    fn fit_succeeds_with_enough_ppm_samples() {
        let (run, peaks) = sample_run_with_peaks(5);
        assert!(MbrScorer::fit(&run, &peaks, 10.0).is_some());
    }

    #[test]
    fn score_is_highest_for_a_perfect_match() {
        let (run, peaks) = sample_run_with_peaks(10);
        let scorer = MbrScorer::fit(&run, &peaks, 10.0).unwrap();
        let perfect = scorer.score(0.0, 10.0, 10.0, 0.2, 10_000.0, 10_000.0, None, 1.0);
        let worse = scorer.score(8.0, 10.0, 11.0, 0.2, 10.0, 10_000.0, None, 0.5);
        assert!(perfect > worse);
    }
}
