//! Recursive valley-based chromatographic peak trimming (spec §4.5).

use crate::chromatographic_peak::ChromatographicPeak;

struct Point {
    scan: u32,
    rt: f64,
    intensity: f64,
}

/// Find a valley to cut at, walking away from `apex_index` in `step`
/// direction (+1 or -1). Returns the index (into `points`) of the valley.
fn find_cut(points: &[Point], apex_index: usize, step: isize, discrimination_factor: f64) -> Option<usize> {
    let mut valley_index = apex_index;
    let mut valley_intensity = points[apex_index].intensity;

    let mut i = apex_index as isize + step;
    while i >= 0 && (i as usize) < points.len() {
        let point = &points[i as usize];
        if point.intensity < valley_intensity {
            valley_intensity = point.intensity;
            valley_index = i as usize;
        } else {
            let ratio = (point.intensity - valley_intensity) / point.intensity;
            if ratio > discrimination_factor {
                let past_valley_index = valley_index as isize + step;
                let past_ok = if past_valley_index >= 0 && (past_valley_index as usize) < points.len() {
                    let past = &points[past_valley_index as usize];
                    let past_ratio = (point.intensity - past.intensity) / point.intensity;
                    past_ratio > discrimination_factor
                } else {
                    true // the scan past the valley is absent: condition is vacuously satisfied
                };
                if past_ok {
                    return Some(valley_index);
                }
            }
        }
        i += step;
    }
    None
}

/// Recursively cut `peak` around `identification_rt` until no further cut
/// is found, then recompute its intensity (spec §4.5).
pub fn cut(peak: &mut ChromatographicPeak, identification_rt: f64, discrimination_factor: f64, integrate: bool) {
    while let Some(apex_charge) = peak.apex().map(|e| e.charge) {
        let mut owned_points: Vec<Point> = peak
            .envelopes
            .iter()
            .filter(|e| e.charge == apex_charge)
            .map(|e| Point {
                scan: e.indexed_peak.zero_based_ms1_index,
                rt: e.indexed_peak.retention_time,
                intensity: e.summed_intensity,
            })
            .collect();
        owned_points.sort_by_key(|p| p.scan);

        if owned_points.len() < 5 {
            break;
        }

        let apex_index = owned_points
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.intensity.total_cmp(&b.intensity))
            .map(|(i, _)| i)
            .unwrap_or(0);

        let cut_index = find_cut(&owned_points, apex_index, 1, discrimination_factor)
            .or_else(|| find_cut(&owned_points, apex_index, -1, discrimination_factor));

        let Some(valley) = cut_index else {
            break;
        };
        let valley_rt = owned_points[valley].rt;

        let keep_before = identification_rt <= valley_rt;
        peak.envelopes.retain(|e| {
            if e.charge != apex_charge {
                return true;
            }
            if keep_before {
                e.indexed_peak.retention_time < valley_rt
            } else {
                e.indexed_peak.retention_time > valley_rt
            }
        });
        peak.split_rt = Some(valley_rt);
        // loop again: a peak can need more than one cut.
    }
    peak.recalculate_intensity(integrate);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chromatographic_peak::IsotopicEnvelope;
    use crate::peak::IndexedPeak;

    fn peak_with_intensities(intensities: &[f64]) -> ChromatographicPeak {
        let mut peak = ChromatographicPeak::new(vec![0]);
        for (i, &intensity) in intensities.iter().enumerate() {
            peak.envelopes.push(IsotopicEnvelope {
                indexed_peak: IndexedPeak {
                    mz: 500.0,
                    intensity,
                    zero_based_ms1_index: i as u32,
                    retention_time: i as f64 * 0.1,
                    peak_id: i as u64,
                },
                charge: 2,
                summed_intensity: intensity,
                pearson_correlation: 0.9,
            });
        }
        peak
    }

    #[test]
    fn short_peaks_are_left_untouched() {
        let mut peak = peak_with_intensities(&[10.0, 100.0, 10.0]);
        cut(&mut peak, 0.1, 0.6, false);
        assert_eq!(peak.envelopes.len(), 3);
    }

    #[test]
    fn a_clear_valley_after_the_apex_is_cut() {
        // apex at index 2 (rt 0.2), dips to near-zero at index 5, rises
        // again far past the discrimination threshold at index 7.
        let mut peak = peak_with_intensities(&[10.0, 50.0, 100.0, 40.0, 10.0, 2.0, 5.0, 90.0, 80.0]);
        cut(&mut peak, 0.2, 0.6, false);
        // identification RT (0.2) sits on the left side of the valley, so
        // the right-hand tail should have been trimmed away.
        assert!(peak.envelopes.iter().all(|e| e.indexed_peak.zero_based_ms1_index <= 5));
    }

    #[test]
    fn smooth_peaks_are_not_cut() {
        let mut peak = peak_with_intensities(&[5.0, 20.0, 60.0, 100.0, 60.0, 20.0, 5.0]);
        cut(&mut peak, 0.3, 0.6, false);
        assert_eq!(peak.envelopes.len(), 7);
    }
}
