//! Theoretical isotope distributions.
//!
//! Builds the expected isotope envelope of an identification from its
//! elemental composition by convolving each element's per-atom isotope
//! probabilities across its atom count, following the same
//! `ndarray`/`probability`-backed binomial-convolution approach used
//! elsewhere in this crate family for computing isotopic fine structure.

use crate::element::Element;
use crate::formula::ElementComposition;
use crate::system::{da, Mass};
use probability::distribution::{Binomial, Discrete};
use std::collections::HashMap;

/// Mass resolution used when binning convolved isotope peaks, in Da.
pub const BIN_WIDTH: f64 = 0.125;

/// Isotope probabilities below this are dropped while convolving, matching
/// spec §4.2's "minimum probability 1e-8".
const MIN_PROBABILITY: f64 = 1e-8;

fn bin_index(mass_shift: f64) -> i64 {
    (mass_shift / BIN_WIDTH).round() as i64
}

/// Convolve two sparse mass-shift distributions, dropping entries below
/// `MIN_PROBABILITY`.
fn convolve(a: &HashMap<i64, f64>, b: &HashMap<i64, f64>) -> HashMap<i64, f64> {
    let mut out: HashMap<i64, f64> = HashMap::with_capacity(a.len() * b.len());
    for (&ka, &va) in a {
        for (&kb, &vb) in b {
            let p = va * vb;
            if p < MIN_PROBABILITY {
                continue;
            }
            *out.entry(ka + kb).or_insert(0.0) += p;
        }
    }
    out
}

/// Isotope shift distribution for `count` atoms of a single element,
/// expressed as `{bin -> probability}` relative to the all-light isotopologue.
///
/// Each heavy isotope of the element is modeled as an independent binomial
/// draw across the atom count (the number of atoms carrying that particular
/// heavy isotope), and the per-isotope binomials are convolved together.
/// This slightly overcounts the (vanishingly rare) case of a single atom
/// carrying two different heavy isotopes at once, which is immaterial at
/// the abundances this crate cuts off at.
fn element_distribution(element: Element, count: u32) -> HashMap<i64, f64> {
    let isotopes = element.isotopes();
    let base_mass = isotopes[0].1;
    let mut dist: HashMap<i64, f64> = HashMap::from([(0i64, 1.0)]);
    if count == 0 {
        return dist;
    }
    for &(_, mass, abundance) in &isotopes[1..] {
        if abundance <= 0.0 {
            continue;
        }
        let shift_bin = bin_index(mass - base_mass);
        let binomial = Binomial::new(count as usize, abundance);
        let mut contribution: HashMap<i64, f64> = HashMap::new();
        for k in 0..=count {
            let p = binomial.mass(k as usize);
            if p < MIN_PROBABILITY {
                if k > 0 && (binomial.mass((k - 1) as usize)) > p {
                    break; // past the mode, tail only keeps shrinking
                }
                continue;
            }
            contribution.insert(i64::from(k) * shift_bin, p);
        }
        dist = convolve(&dist, &contribution);
    }
    dist
}

/// A single resolved isotope peak: its absolute mass and abundance relative
/// to the tallest peak in the envelope (max abundance normalized to 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsotopePeak {
    pub mass: Mass,
    pub normalized_abundance: f64,
}

/// The theoretical isotope envelope of one identification: a short,
/// normalized, ascending-mass list of expected isotope peaks, plus the
/// index of the peakfinding (most abundant) entry.
#[derive(Debug, Clone)]
pub struct IsotopePattern {
    peaks: Vec<IsotopePeak>,
    peakfinding_index: usize,
}

impl IsotopePattern {
    /// The kept isotope peaks, ascending by mass. Index 0 is the
    /// monoisotopic (all-light) peak.
    pub fn peaks(&self) -> &[IsotopePeak] {
        &self.peaks
    }

    /// The mass the XIC builder should search for: the isotope peak with
    /// the highest theoretical abundance.
    pub fn peakfinding_mass(&self) -> Mass {
        self.peaks[self.peakfinding_index].mass
    }

    /// Index of the peakfinding peak within [`Self::peaks`].
    pub fn peakfinding_index(&self) -> usize {
        self.peakfinding_index
    }

    /// Theoretical abundance at isotope offset `delta` from the
    /// peakfinding index (`delta` may be negative), or `None` if that
    /// offset falls outside the kept envelope.
    pub fn abundance_at(&self, delta: i32) -> Option<f64> {
        let index = self.peakfinding_index as i64 + i64::from(delta);
        if index < 0 {
            return None;
        }
        self.peaks
            .get(index as usize)
            .map(|p| p.normalized_abundance)
    }
}

/// Build the theoretical isotope pattern for an identification, given its
/// elemental composition (spec §4.2). `id_mass` is the identification's
/// reported monoisotopic mass; `num_isotopes_required` is
/// [`crate::config::EngineParameters::num_isotopes_required`].
pub fn build_isotope_pattern(
    composition: &ElementComposition,
    id_mass: Mass,
    num_isotopes_required: usize,
) -> IsotopePattern {
    let formula_mass = composition.monoisotopic_mass();

    let mut raw: HashMap<i64, f64> = HashMap::from([(0i64, 1.0)]);
    for &element in &Element::ALL {
        let count = composition.count(element).round().max(0.0) as u32;
        if count == 0 {
            continue;
        }
        raw = convolve(&raw, &element_distribution(element, count));
    }

    // Step 3: shift all masses by id_mass - formula_mass, so the
    // monoisotopic bin lands exactly on the reported identification mass.
    let correction = id_mass.value - formula_mass.value;

    let mut bins: Vec<(i64, f64)> = raw.into_iter().collect();
    bins.sort_by_key(|&(bin, _)| bin);

    let max_abundance = bins
        .iter()
        .map(|&(_, p)| p)
        .fold(f64::MIN, f64::max)
        .max(f64::MIN_POSITIVE);

    let mut peaks: Vec<IsotopePeak> = bins
        .into_iter()
        .map(|(bin, p)| IsotopePeak {
            mass: da(formula_mass.value + bin as f64 * BIN_WIDTH + correction),
            normalized_abundance: p / max_abundance,
        })
        .collect();

    // Step 5: keep isotopes until num_isotopes_required are kept AND the
    // next isotope's abundance is <= 0.1.
    let required = num_isotopes_required.max(1);
    let mut cut = peaks.len();
    for kept in required..peaks.len() {
        if peaks[kept].normalized_abundance <= 0.1 {
            cut = kept;
            break;
        }
    }
    peaks.truncate(cut.max(1));

    let peakfinding_index = peaks
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.normalized_abundance.total_cmp(&b.normalized_abundance))
        .map(|(i, _)| i)
        .unwrap_or(0);

    IsotopePattern {
        peaks,
        peakfinding_index,
    }
}

/// Build the isotope pattern for an identification using its supplied
/// formula, a base-sequence-derived formula topped up with averagine, or
/// pure averagine, following the three-way precedence of spec §4.2 step 1.
/// Shared by the per-run MS2 quantifier and the MBR orchestrator so both
/// compute the same theoretical envelope for a given modified sequence.
pub fn pattern_for_identification(
    identification: &crate::identification::Identification,
    num_isotopes_required: usize,
) -> IsotopePattern {
    let composition = identification
        .optional_chemical_formula
        .clone()
        .or_else(|| crate::formula::composition_from_base_sequence(&identification.base_sequence));

    match composition {
        Some(composition)
            if (composition.monoisotopic_mass().value - identification.monoisotopic_mass.value).abs() <= 20.0 =>
        {
            build_isotope_pattern(&composition, identification.monoisotopic_mass, num_isotopes_required)
        }
        Some(composition) => {
            let residual = da(identification.monoisotopic_mass.value - composition.monoisotopic_mass().value);
            let topped_up = composition + crate::formula::averagine_scaled_to_mass(residual);
            build_isotope_pattern(&topped_up, identification.monoisotopic_mass, num_isotopes_required)
        }
        None => {
            let pure_averagine = crate::formula::averagine_scaled_to_mass(identification.monoisotopic_mass);
            build_isotope_pattern(&pure_averagine, identification.monoisotopic_mass, num_isotopes_required)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::composition_from_base_sequence;

    #[test]
    fn monoisotopic_peak_is_first_and_full_abundance_somewhere() {
        let composition = composition_from_base_sequence("PEPTIDE").unwrap();
        let mass = composition.monoisotopic_mass();
        let pattern = build_isotope_pattern(&composition, mass, 2);
        assert!(pattern.peaks().len() >= 2);
        assert!(pattern
            .peaks()
            .iter()
            .any(|p| (p.normalized_abundance - 1.0).abs() < 1e-9));
    }

    #[test]
    fn pattern_is_shifted_to_identification_mass() {
        let composition = composition_from_base_sequence("PEPTIDE").unwrap();
        let formula_mass = composition.monoisotopic_mass();
        let id_mass = da(formula_mass.value + 5.0);
        let pattern = build_isotope_pattern(&composition, id_mass, 2);
        assert!((pattern.peaks()[0].mass.value - id_mass.value).abs() < 1e-6);
    }

    #[test]
    fn larger_peptide_has_a_non_monoisotopic_peakfinding_mass() {
        let composition = composition_from_base_sequence(&"AGILVK".repeat(20)).unwrap();
        let mass = composition.monoisotopic_mass();
        let pattern = build_isotope_pattern(&composition, mass, 3);
        assert!(pattern.peakfinding_index() > 0);
    }
}
