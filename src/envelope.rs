//! Isotope-envelope validation.
//!
//! For a candidate peakfinding-mass peak, walks outward through the
//! theoretical isotope pattern (§[`crate::isotope`]) to assemble the
//! observed isotope envelope, checks it correlates with the theoretical
//! pattern, and rules out the "mono-isotope is actually one 13C too high or
//! too low" mis-assignment (spec §4.4).

use crate::chromatographic_peak::IsotopicEnvelope;
use crate::isotope::IsotopePattern;
use crate::peak::IndexedPeak;
use crate::peak_index::PeakIndex;
use crate::system::{da, Mass};
use crate::tolerance::Tolerance;

use crate::system::NEUTRON_SPACING;

const INTENSITY_RATIO_BOUNDS: (f64, f64) = (0.25, 4.0);
const MIN_CORRELATION: f64 = 0.7;
const MAX_OFF_BY_ONE_ADVANTAGE: f64 = 0.1;

struct HypothesisPoint {
    theoretical_abundance: f64,
    observed_intensity: f64,
    is_observed: bool,
}

/// Walk outward from `anchor_index` in the theoretical pattern, in both
/// directions, stopping on a missing or out-of-ratio isotope. The anchor
/// itself is looked up at `anchor_tol` (the precursor-level window the
/// candidate peak was already found under); sibling isotopes are looked up
/// at the tighter `isotope_tol`, since matching the envelope's shape should
/// be held to a stricter window than the precursor search that seeded it.
/// Missing siblings are imputed from the anchor's intensity scaled by the
/// theoretical abundance ratio, rather than truncating the walk, so a
/// single absent centroid doesn't silently shrink the envelope and its
/// correlation.
fn build_hypothesis(
    pattern: &IsotopePattern,
    anchor_index: i64,
    scan_index: u32,
    observed_mass_error: Mass,
    charge: i8,
    index: &PeakIndex,
    anchor_tol: &Tolerance<Mass>,
    isotope_tol: &Tolerance<Mass>,
) -> Option<Vec<HypothesisPoint>> {
    if anchor_index < 0 || anchor_index as usize >= pattern.peaks().len() {
        return None;
    }
    let peaks = pattern.peaks();
    let anchor = peaks[anchor_index as usize];
    let anchor_mass = da(anchor.mass.value + observed_mass_error.value);
    let anchor_peak = index.get(anchor_mass, scan_index, anchor_tol, charge)?;

    let mut points = vec![HypothesisPoint {
        theoretical_abundance: anchor.normalized_abundance,
        observed_intensity: anchor_peak.intensity,
        is_observed: true,
    }];

    for direction in [-1i64, 1i64] {
        let mut step = 1i64;
        loop {
            let idx = anchor_index + direction * step;
            if idx < 0 || idx as usize >= peaks.len() {
                break;
            }
            let theor = peaks[idx as usize];
            let expected_mass = da(theor.mass.value + observed_mass_error.value);
            let expected_intensity =
                anchor_peak.intensity * (theor.normalized_abundance / anchor.normalized_abundance);
            if expected_intensity <= 0.0 {
                break;
            }
            let (observed_intensity, is_observed) = match index.get(expected_mass, scan_index, isotope_tol, charge) {
                Some(observed) => {
                    let ratio = observed.intensity / expected_intensity;
                    if ratio < INTENSITY_RATIO_BOUNDS.0 || ratio > INTENSITY_RATIO_BOUNDS.1 {
                        break;
                    }
                    (observed.intensity, true)
                }
                None => (expected_intensity, false),
            };
            points.push(HypothesisPoint {
                theoretical_abundance: theor.normalized_abundance,
                observed_intensity,
                is_observed,
            });
            step += 1;
        }
    }

    Some(points)
}

fn pearson(points: &[HypothesisPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.theoretical_abundance).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.observed_intensity).sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for p in points {
        let dx = p.theoretical_abundance - mean_x;
        let dy = p.observed_intensity - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= 0.0 || var_y <= 0.0 {
        return 0.0;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

/// Probe for an unexpected peak one 13C-spacing below the lowest
/// theoretical mass in a hypothesis; used to penalize off-by-one
/// hypotheses that would otherwise correlate about as well as the true
/// mono-isotope assignment.
fn unexpected_peak_probe(
    lowest_mass: Mass,
    scan_index: u32,
    charge: i8,
    index: &PeakIndex,
    tol: &Tolerance<Mass>,
) -> HypothesisPoint {
    let probe_mass = da(lowest_mass.value - NEUTRON_SPACING);
    let observed = index.get(probe_mass, scan_index, tol, charge);
    HypothesisPoint {
        theoretical_abundance: 0.0,
        observed_intensity: observed.map(|p| p.intensity).unwrap_or(0.0),
        is_observed: observed.is_some(),
    }
}

/// Validate a candidate peakfinding-mass peak against the theoretical
/// isotope pattern, producing an [`IsotopicEnvelope`] if it passes the
/// correlation and off-by-one checks (spec §4.4).
///
/// `anchor_tol` bounds the mono-isotope (and off-by-one anchor) lookups,
/// matching the precursor-level tolerance the candidate was already found
/// under; `isotope_tol` is the tighter tolerance used for every sibling
/// isotope query within an envelope, so matching the pattern's shape is
/// held to a stricter window than the precursor search that seeded it.
pub fn validate(
    candidate: IndexedPeak,
    pattern: &IsotopePattern,
    charge: i8,
    index: &PeakIndex,
    anchor_tol: &Tolerance<Mass>,
    isotope_tol: &Tolerance<Mass>,
    num_isotopes_required: usize,
) -> Option<IsotopicEnvelope> {
    let observed_neutral_mass = candidate.neutral_mass(charge);
    let observed_mass_error = da(observed_neutral_mass.value - pattern.peakfinding_mass().value);

    let peakfinding_index = pattern.peakfinding_index() as i64;
    let mono_points = build_hypothesis(
        pattern,
        peakfinding_index,
        candidate.zero_based_ms1_index,
        observed_mass_error,
        charge,
        index,
        anchor_tol,
        isotope_tol,
    )?;

    let mono_observed_count = mono_points.iter().filter(|p| p.is_observed).count();
    if mono_observed_count < num_isotopes_required {
        return None;
    }
    let mono_correlation = pearson(&mono_points);
    if mono_correlation < MIN_CORRELATION {
        return None;
    }

    let lowest_mass = pattern.peaks()[peakfinding_index as usize].mass;
    for delta in [-1i64, 1i64] {
        let Some(mut alt_points) = build_hypothesis(
            pattern,
            peakfinding_index + delta,
            candidate.zero_based_ms1_index,
            observed_mass_error,
            charge,
            index,
            anchor_tol,
            isotope_tol,
        ) else {
            continue;
        };
        alt_points.push(unexpected_peak_probe(
            lowest_mass,
            candidate.zero_based_ms1_index,
            charge,
            index,
            isotope_tol,
        ));
        let alt_correlation = pearson(&alt_points);
        if alt_correlation - mono_correlation > MAX_OFF_BY_ONE_ADVANTAGE {
            return None;
        }
    }

    // Spec §4.4 step 5 sums "experimental_intensities"; imputed points stand
    // in for correlation purposes only and don't contribute a measured
    // intensity of their own.
    let summed_intensity: f64 = mono_points.iter().filter(|p| p.is_observed).map(|p| p.observed_intensity).sum();

    Some(IsotopicEnvelope {
        indexed_peak: candidate,
        charge,
        summed_intensity,
        pearson_correlation: mono_correlation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::composition_from_base_sequence;
    use crate::isotope::build_isotope_pattern;
    use crate::system::MassOverCharge;

    fn index_with_full_envelope(pattern: &IsotopePattern, charge: i8, scan: u32) -> PeakIndex {
        let mut index = PeakIndex::new();
        for (i, peak) in pattern.peaks().iter().enumerate() {
            let intensity = peak.normalized_abundance * 10_000.0;
            let mz = peak.mass.to_mz(charge).value;
            index.insert(IndexedPeak {
                mz,
                intensity,
                zero_based_ms1_index: scan,
                retention_time: 1.0,
                peak_id: i as u64,
            });
        }
        index.sort_buckets();
        index
    }

    #[test]
    fn well_formed_envelope_passes_validation() {
        let composition = composition_from_base_sequence(&"AGILVK".repeat(10)).unwrap();
        let mass = composition.monoisotopic_mass();
        let pattern = build_isotope_pattern(&composition, mass, 2);
        let charge = 2;
        let scan = 10;
        let index = index_with_full_envelope(&pattern, charge, scan);

        let peakfinding_mz = pattern.peakfinding_mass().to_mz(charge);
        let candidate = IndexedPeak {
            mz: peakfinding_mz.value,
            intensity: pattern.peaks()[pattern.peakfinding_index()].normalized_abundance * 10_000.0,
            zero_based_ms1_index: scan,
            retention_time: 1.0,
            peak_id: 999,
        };

        let tol = Tolerance::new_ppm(20.0);
        let envelope = validate(candidate, &pattern, charge, &index, &tol, &tol, 2)
            .expect("a clean synthetic envelope should validate");
        assert!(envelope.pearson_correlation > 0.99);
    }

    #[test]
    fn sparse_envelope_below_required_isotopes_is_rejected() {
        let composition = composition_from_base_sequence(&"AGILVK".repeat(10)).unwrap();
        let mass = composition.monoisotopic_mass();
        let pattern = build_isotope_pattern(&composition, mass, 2);
        let charge = 2;
        let scan = 10;

        let mut index = PeakIndex::new();
        let mono = pattern.peaks()[pattern.peakfinding_index()];
        let mz: MassOverCharge = mono.mass.to_mz(charge);
        index.insert(IndexedPeak {
            mz: mz.value,
            intensity: 10_000.0,
            zero_based_ms1_index: scan,
            retention_time: 1.0,
            peak_id: 1,
        });
        index.sort_buckets();

        let candidate = IndexedPeak {
            mz: mz.value,
            intensity: 10_000.0,
            zero_based_ms1_index: scan,
            retention_time: 1.0,
            peak_id: 999,
        };
        let tol = Tolerance::new_ppm(20.0);
        assert!(validate(candidate, &pattern, charge, &index, &tol, &tol, 3).is_none());
    }
}
