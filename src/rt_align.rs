//! Cross-run retention-time alignment via anchor peptides (spec §4.7).

use crate::chromatographic_peak::ChromatographicPeak;
use crate::config::{DonorCriterion, EngineParameters};
use crate::identification::RunData;
use std::collections::HashMap;

/// One sequence shared between donor and acceptor, used as an RT anchor.
#[derive(Debug, Clone, Copy)]
pub struct AnchorPair {
    pub donor_apex_rt: f64,
    pub acceptor_apex_rt: f64,
}

/// An alignment between one donor run and one acceptor run: a sorted list
/// of anchor pairs (by donor RT).
#[derive(Debug, Clone)]
pub struct RtAlignment {
    anchors: Vec<AnchorPair>,
}

/// Predicted retention time and search-window half-width for a donor peak
/// transferred through an [`RtAlignment`].
#[derive(Debug, Clone, Copy)]
pub struct PredictedRt {
    pub predicted_rt: f64,
    pub half_width: f64,
}

fn apex_rt(peak: &ChromatographicPeak) -> Option<f64> {
    peak.apex().map(|e| e.indexed_peak.retention_time)
}

fn score_for(run: &RunData, peak: &ChromatographicPeak) -> f64 {
    peak.identifications
        .iter()
        .fold(0.0_f64, |acc, &id| acc.max(run.identification(id).psm_score))
}

/// Select the best candidate peak per modified sequence for a run, per
/// `donor_criterion` (spec §4.7 step 1): among non-MBR peaks whose sole
/// identification has `q_value < donor_q_threshold` and whose envelope list
/// is non-empty, grouped by modified sequence where exactly one
/// identification in the run carries that sequence.
pub fn select_anchor_candidates<'a>(
    run: &'a RunData,
    peaks: &'a [ChromatographicPeak],
    donor_criterion: DonorCriterion,
    donor_q_threshold: f64,
    alignment_window: f64,
) -> HashMap<String, &'a ChromatographicPeak> {
    let sequence_occurrences: HashMap<&str, usize> =
        run.identifications().fold(HashMap::new(), |mut acc, (_, id)| {
            *acc.entry(id.modified_sequence.as_str()).or_insert(0) += 1;
            acc
        });

    let mut grouped: HashMap<String, Vec<&ChromatographicPeak>> = HashMap::new();
    for peak in peaks {
        if peak.is_mbr || peak.envelopes.is_empty() || peak.identifications.len() != 1 {
            continue;
        }
        let id = run.identification(peak.identifications[0]);
        if id.q_value >= donor_q_threshold {
            continue;
        }
        if sequence_occurrences.get(id.modified_sequence.as_str()).copied().unwrap_or(0) != 1 {
            continue;
        }
        if apex_rt(peak).is_none() {
            continue;
        }
        grouped.entry(id.modified_sequence.clone()).or_default().push(peak);
    }

    let all_apex_rts: Vec<f64> = grouped
        .values()
        .flat_map(|group| group.iter().filter_map(|p| apex_rt(p)))
        .collect();

    grouped
        .into_iter()
        .filter_map(|(sequence, candidates)| {
            let best = candidates.into_iter().max_by(|a, b| {
                let metric = |peak: &ChromatographicPeak| -> f64 {
                    match donor_criterion {
                        DonorCriterion::Score => {
                            let score = score_for(run, peak);
                            if score > 0.0 {
                                score
                            } else {
                                peak.intensity
                            }
                        }
                        DonorCriterion::Neighbors => {
                            let rt = apex_rt(peak).unwrap_or(0.0);
                            all_apex_rts
                                .iter()
                                .filter(|&&other_rt| (other_rt - rt).abs() <= alignment_window)
                                .count() as f64
                        }
                        DonorCriterion::Intensity => peak.intensity,
                    }
                };
                metric(a).total_cmp(&metric(b))
            })?;
            Some((sequence, best))
        })
        .collect()
}

/// Build an alignment between a donor and acceptor run's anchor candidates:
/// the intersection of their sequences, sorted by donor apex RT (spec §4.7
/// step 2).
pub fn build_alignment(
    donor_candidates: &HashMap<String, &ChromatographicPeak>,
    acceptor_candidates: &HashMap<String, &ChromatographicPeak>,
) -> RtAlignment {
    let mut anchors: Vec<AnchorPair> = donor_candidates
        .iter()
        .filter_map(|(sequence, donor_peak)| {
            let acceptor_peak = acceptor_candidates.get(sequence)?;
            Some(AnchorPair {
                donor_apex_rt: apex_rt(donor_peak)?,
                acceptor_apex_rt: apex_rt(acceptor_peak)?,
            })
        })
        .collect();
    anchors.sort_by(|a, b| a.donor_apex_rt.total_cmp(&b.donor_apex_rt));
    RtAlignment { anchors }
}

impl RtAlignment {
    pub fn anchors(&self) -> &[AnchorPair] {
        &self.anchors
    }

    /// All RT deltas (`donor_rt - acceptor_rt`) across every anchor, used by
    /// the MBR scorer's per-donor RT-prediction-error distribution.
    pub fn deltas(&self) -> Vec<f64> {
        self.anchors
            .iter()
            .map(|a| a.donor_apex_rt - a.acceptor_apex_rt)
            .collect()
    }

    /// Predict the acceptor RT (and search half-width) for a donor peak
    /// observed at `donor_rt` (spec §4.7 step 3).
    pub fn predict(&self, donor_rt: f64, params: &EngineParameters) -> PredictedRt {
        if self.anchors.is_empty() {
            return PredictedRt {
                predicted_rt: donor_rt,
                half_width: 0.25,
            };
        }

        let position = self.anchors.partition_point(|anchor| anchor.donor_apex_rt <= donor_rt);
        let limit = params.num_anchor_peptides_for_mbr.max(1);

        let mut left_deltas: Vec<f64> = Vec::new();
        let mut index = position;
        while left_deltas.len() < limit && index > 0 {
            index -= 1;
            let anchor = &self.anchors[index];
            if (donor_rt - anchor.donor_apex_rt).abs() > 0.5 {
                break;
            }
            left_deltas.push(anchor.donor_apex_rt - anchor.acceptor_apex_rt);
        }

        let mut right_deltas: Vec<f64> = Vec::new();
        let mut index = position;
        while right_deltas.len() < limit && index < self.anchors.len() {
            let anchor = &self.anchors[index];
            if (anchor.donor_apex_rt - donor_rt).abs() > 0.5 {
                break;
            }
            right_deltas.push(anchor.donor_apex_rt - anchor.acceptor_apex_rt);
            index += 1;
        }

        let mut deltas = left_deltas;
        deltas.extend(right_deltas);

        if deltas.is_empty() {
            return PredictedRt {
                predicted_rt: donor_rt,
                half_width: 0.25,
            };
        }
        if deltas.len() == 1 {
            return PredictedRt {
                predicted_rt: donor_rt - deltas[0],
                half_width: 0.25,
            };
        }

        let median = median(&mut deltas.clone());
        let stddev = stddev(&deltas);
        let half_width = (6.0 * stddev).min(params.mbr_rt_window_minutes());
        PredictedRt {
            predicted_rt: donor_rt - median,
            half_width,
        }
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 0 {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    } else {
        values[n / 2]
    }
}

fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_alignment_predicts_the_donor_rt_unchanged() {
        let alignment = RtAlignment { anchors: vec![] };
        let predicted = alignment.predict(10.0, &EngineParameters::default());
        assert!((predicted.predicted_rt - 10.0).abs() < 1e-9);
        assert!((predicted.half_width - 0.25).abs() < 1e-9);
    }

    #[test]
    fn single_anchor_shifts_by_its_delta() {
        let alignment = RtAlignment {
            anchors: vec![AnchorPair {
                donor_apex_rt: 10.0,
                acceptor_apex_rt: 10.3,
            }],
        };
        let predicted = alignment.predict(10.0, &EngineParameters::default());
        assert!((predicted.predicted_rt - (10.0 - (10.0 - 10.3))).abs() < 1e-9);
        assert!((predicted.half_width - 0.25).abs() < 1e-9);
    }

    #[test]
    fn median_of_even_length_averages_middle_two() {
        let mut values = vec![1.0, 2.0, 3.0, 4.0];
        assert!((median(&mut values) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn multiple_anchors_give_a_bounded_half_width() {
        let anchors = vec![
            AnchorPair {
                donor_apex_rt: 8.0,
                acceptor_apex_rt: 8.1,
            },
            AnchorPair {
                donor_apex_rt: 9.0,
                acceptor_apex_rt: 9.2,
            },
            AnchorPair {
                donor_apex_rt: 10.0,
                acceptor_apex_rt: 10.1,
            },
        ];
        let alignment = RtAlignment { anchors };
        let predicted = alignment.predict(9.5, &EngineParameters::default());
        assert!(predicted.half_width <= EngineParameters::default().mbr_rt_window_minutes());
    }
}
