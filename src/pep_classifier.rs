//! Posterior error probability (PEP) estimation for match-between-runs
//! peaks (spec §4.10, §9).
//!
//! The PEP classifier is an external collaborator behind a narrow
//! interface: `train(features, labels) -> model`, `predict(features) ->
//! posterior_error_prob`. Any gradient-boosted or logistic implementation
//! satisfies it; this crate carries a logistic regression trained by
//! gradient descent, using random-RT decoys as known-incorrect examples and
//! non-decoy transfers as the presumed-correct class, in the same spirit
//! as the normal-log-density scoring already used by
//! [`crate::mbr_scorer::MbrScorer`].

use crate::chromatographic_peak::ChromatographicPeak;
use crate::config::EngineParameters;
use crate::rand_source;
use rand::seq::SliceRandom;
use std::collections::HashMap;

/// Minimum number of MBR peaks (target + decoy) required before training a
/// PEP classifier is attempted.
const MIN_MBR_PEAKS: usize = 100;
/// Minimum number of random-RT decoys required before training is attempted.
const MIN_RANDOM_RT_DECOYS: usize = 20;
const LEARNING_RATE: f64 = 0.1;
const ITERATIONS: usize = 500;
const NUM_FEATURES: usize = 7;

/// One MBR peak's feature vector, extracted from the fields the orchestrator
/// populated on it, plus its label for training (`true` = known-incorrect,
/// i.e. a random-RT decoy).
#[derive(Debug, Clone, Copy)]
struct Sample {
    features: [f64; NUM_FEATURES],
    is_decoy: bool,
}

/// Pull a feature vector out of a scored MBR peak: MBR score, ppm error, RT
/// error, log intensity, envelope correlation, charge, and the donor/
/// acceptor intensity ratio (log2), in that order. Returns `None` for peaks
/// missing the fields the orchestrator only fills in for MBR candidates.
fn extract_features(peak: &ChromatographicPeak) -> Option<[f64; NUM_FEATURES]> {
    let apex = peak.apex()?;
    let score = peak.mbr_score?;
    let ppm_error = peak.mbr_ppm_error?;
    let rt_error = peak.mbr_rt_error?;
    let donor_intensity = peak.mbr_donor_intensity?;
    let condition_delta = if donor_intensity > 0.0 && peak.intensity > 0.0 {
        (peak.intensity / donor_intensity).log2()
    } else {
        0.0
    };
    Some([
        score,
        ppm_error,
        rt_error,
        peak.intensity.max(1.0).ln(),
        apex.pearson_correlation,
        f64::from(apex.charge),
        condition_delta,
    ])
}

/// A trained (or untrained) logistic regression PEP model. Features are
/// standardized using the training set's mean/stddev before scoring, so
/// raw feature scales (ppm vs. minutes vs. intensity) don't dominate the
/// fit.
#[derive(Debug, Clone)]
pub struct LogisticPepClassifier {
    weights: [f64; NUM_FEATURES],
    bias: f64,
    feature_mean: [f64; NUM_FEATURES],
    feature_std: [f64; NUM_FEATURES],
}

impl LogisticPepClassifier {
    fn standardize(&self, features: &[f64; NUM_FEATURES]) -> [f64; NUM_FEATURES] {
        let mut out = [0.0; NUM_FEATURES];
        for i in 0..NUM_FEATURES {
            out[i] = (features[i] - self.feature_mean[i]) / self.feature_std[i].max(1e-9);
        }
        out
    }

    /// Fit via batch gradient descent on standardized features. `labels[i]
    /// == true` marks a known-incorrect (decoy) sample.
    fn train(samples: &[Sample]) -> Self {
        let n = samples.len() as f64;
        let mut feature_mean = [0.0; NUM_FEATURES];
        for sample in samples {
            for i in 0..NUM_FEATURES {
                feature_mean[i] += sample.features[i];
            }
        }
        for m in &mut feature_mean {
            *m /= n;
        }

        let mut feature_std = [0.0; NUM_FEATURES];
        for sample in samples {
            for i in 0..NUM_FEATURES {
                let d = sample.features[i] - feature_mean[i];
                feature_std[i] += d * d;
            }
        }
        for s in &mut feature_std {
            *s = (*s / n).sqrt();
        }

        let mut model = Self {
            weights: [0.0; NUM_FEATURES],
            bias: 0.0,
            feature_mean,
            feature_std,
        };

        for _ in 0..ITERATIONS {
            let mut gradient = [0.0; NUM_FEATURES];
            let mut bias_gradient = 0.0;
            for sample in samples {
                let x = model.standardize(&sample.features);
                let label = if sample.is_decoy { 1.0 } else { 0.0 };
                let prediction = model.predict_standardized(&x);
                let error = prediction - label;
                for i in 0..NUM_FEATURES {
                    gradient[i] += error * x[i];
                }
                bias_gradient += error;
            }
            for i in 0..NUM_FEATURES {
                model.weights[i] -= LEARNING_RATE * gradient[i] / n;
            }
            model.bias -= LEARNING_RATE * bias_gradient / n;
        }

        model
    }

    fn predict_standardized(&self, x: &[f64; NUM_FEATURES]) -> f64 {
        let z: f64 = self.bias + (0..NUM_FEATURES).map(|i| self.weights[i] * x[i]).sum::<f64>();
        1.0 / (1.0 + (-z).exp())
    }

    /// Posterior probability that a peak with these raw features is
    /// incorrect.
    pub fn predict(&self, features: &[f64; NUM_FEATURES]) -> f64 {
        self.predict_standardized(&self.standardize(features))
    }
}

/// Attempt to train a PEP classifier over `peaks` and assign `mbr_pep` to
/// every MBR peak with a complete feature vector. Returns `false` (no-op)
/// if the feasibility gate (spec §4.10: at least 100 MBR peaks and 20
/// random-RT decoys) isn't met.
pub fn train_and_assign_pep(peaks: &mut [ChromatographicPeak], params: &EngineParameters) -> bool {
    let samples: Vec<(usize, Sample)> = peaks
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_mbr)
        .filter_map(|(i, p)| {
            extract_features(p).map(|features| {
                (
                    i,
                    Sample {
                        features,
                        is_decoy: p.random_rt,
                    },
                )
            })
        })
        .collect();

    let decoy_count = samples.iter().filter(|(_, s)| s.is_decoy).count();
    if samples.len() < MIN_MBR_PEAKS || decoy_count < MIN_RANDOM_RT_DECOYS {
        return false;
    }

    let mut rng = rand_source::rng_for_donor(params.random_seed, "pep-classifier-training-split");
    let mut shuffled = samples.clone();
    shuffled.shuffle(&mut rng);
    let training_len = ((shuffled.len() as f64) * params.pep_training_fraction)
        .round()
        .max(1.0) as usize;
    let training_set: Vec<Sample> = shuffled.iter().take(training_len).map(|(_, s)| *s).collect();

    let model = LogisticPepClassifier::train(&training_set);

    for (index, sample) in samples {
        peaks[index].mbr_pep = Some(model.predict(&sample.features));
    }
    true
}

/// Keep only the lowest-PEP peak per donor identification, as spec §4.10
/// requires once PEP is available, before FDR filtering runs. Grouped by
/// the donor's modified sequence (`mbr_source_sequence`) rather than
/// `IdentificationId`, since that id indexes into the donor run's arena and
/// is not comparable across donors.
pub fn keep_lowest_pep_per_identification(peaks: Vec<ChromatographicPeak>) -> Vec<ChromatographicPeak> {
    let mut by_sequence: HashMap<String, ChromatographicPeak> = HashMap::new();
    let mut unattributed = Vec::new();

    for peak in peaks {
        if !peak.is_mbr || peak.mbr_pep.is_none() {
            unattributed.push(peak);
            continue;
        }
        let Some(sequence) = peak.mbr_source_sequence.clone() else {
            unattributed.push(peak);
            continue;
        };
        match by_sequence.get(&sequence) {
            Some(existing) if existing.mbr_pep.unwrap_or(f64::MAX) <= peak.mbr_pep.unwrap_or(f64::MAX) => {}
            _ => {
                by_sequence.insert(sequence, peak);
            }
        }
    }

    unattributed.extend(by_sequence.into_values());
    unattributed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chromatographic_peak::IsotopicEnvelope;
    use crate::peak::IndexedPeak;

    fn mbr_peak(
        score: f64,
        ppm_error: f64,
        rt_error: f64,
        intensity: f64,
        correlation: f64,
        random_rt: bool,
        source_sequence: &str,
    ) -> ChromatographicPeak {
        let mut peak = ChromatographicPeak::new(Vec::new());
        peak.is_mbr = true;
        peak.random_rt = random_rt;
        peak.mbr_score = Some(score);
        peak.mbr_ppm_error = Some(ppm_error);
        peak.mbr_rt_error = Some(rt_error);
        peak.mbr_donor_intensity = Some(intensity * 0.8);
        peak.mbr_source_sequence = Some(source_sequence.to_string());
        peak.intensity = intensity;
        peak.envelopes.push(IsotopicEnvelope {
            indexed_peak: IndexedPeak {
                mz: 500.0,
                intensity,
                zero_based_ms1_index: 0,
                retention_time: 0.0,
                peak_id: 0,
            },
            charge: 2,
            summed_intensity: intensity,
            pearson_correlation: correlation,
        });
        peak
    }

    fn synthetic_population(count: usize) -> Vec<ChromatographicPeak> {
        (0..count)
            .map(|i| {
                let is_decoy = i % 5 == 0;
                let (score, ppm, rt, correlation) = if is_decoy {
                    (1.0, 15.0, 0.6, 0.5)
                } else {
                    (10.0, 1.0, 0.02, 0.95)
                };
                mbr_peak(score, ppm, rt, 50_000.0, correlation, is_decoy, &format!("PEPTIDE{i}"))
            })
            .collect()
    }

    #[test]
    fn feasibility_gate_blocks_training_below_minimum_population() {
        let mut peaks = synthetic_population(30);
        let params = EngineParameters::default();
        assert!(!train_and_assign_pep(&mut peaks, &params));
        assert!(peaks.iter().all(|p| p.mbr_pep.is_none()));
    }

    #[test]
    fn well_separated_targets_and_decoys_train_a_discriminating_model() {
        let mut peaks = synthetic_population(200);
        let params = EngineParameters::default();
        assert!(train_and_assign_pep(&mut peaks, &params));

        let mean_target_pep: f64 = peaks.iter().filter(|p| !p.random_rt).map(|p| p.mbr_pep.unwrap()).sum::<f64>()
            / peaks.iter().filter(|p| !p.random_rt).count() as f64;
        let mean_decoy_pep: f64 = peaks.iter().filter(|p| p.random_rt).map(|p| p.mbr_pep.unwrap()).sum::<f64>()
            / peaks.iter().filter(|p| p.random_rt).count() as f64;
        assert!(mean_target_pep < mean_decoy_pep);
    }

    #[test]
    fn keep_lowest_pep_per_identification_drops_worse_duplicates() {
        let mut better = mbr_peak(10.0, 1.0, 0.01, 50_000.0, 0.95, false, "PEPTIDE0");
        better.mbr_pep = Some(0.01);
        let mut worse = mbr_peak(8.0, 2.0, 0.02, 40_000.0, 0.9, false, "PEPTIDE0");
        worse.mbr_pep = Some(0.4);

        let kept = keep_lowest_pep_per_identification(vec![better, worse]);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].mbr_pep.unwrap() - 0.01).abs() < 1e-9);
    }
}
