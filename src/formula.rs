//! Elemental composition of peptides.
//!
//! Mirrors the teacher's `MolecularFormula`, but narrowed to the five
//! elements (`Element::ALL`) this crate's isotope model needs, and with
//! fractional element counts so that averagine top-up (spec step 4.2.1) can
//! scale a non-integer number of "average residues" onto a real composition.

use crate::element::Element;
use crate::system::{da, Mass};
use std::ops::{Add, AddAssign, Mul, Sub};

/// A bag of element counts: `H4 C2 O1` etc. Counts are `f64` so that
/// averagine contributions, which are themselves non-integer, can be added
/// directly onto an integer residue-derived composition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementComposition {
    counts: [f64; 5],
}

impl ElementComposition {
    /// The empty formula.
    pub const fn empty() -> Self {
        Self { counts: [0.0; 5] }
    }

    /// Build a composition from `(element, count)` pairs.
    pub fn new(parts: &[(Element, f64)]) -> Self {
        let mut composition = Self::empty();
        for &(element, count) in parts {
            composition.add_element(element, count);
        }
        composition
    }

    /// Add `count` atoms of `element` (may be fractional, may be negative).
    pub fn add_element(&mut self, element: Element, count: f64) {
        let index = Element::ALL
            .iter()
            .position(|&e| e == element)
            .expect("Element::ALL is exhaustive over every Element variant, so this always finds one");
        self.counts[index] += count;
    }

    /// The count of a single element in this composition.
    pub fn count(&self, element: Element) -> f64 {
        let index = Element::ALL
            .iter()
            .position(|&e| e == element)
            .expect("Element::ALL is exhaustive over every Element variant, so this always finds one");
        self.counts[index]
    }

    /// Monoisotopic mass of this composition (sum over elements of
    /// `count * monoisotopic_mass`).
    pub fn monoisotopic_mass(&self) -> Mass {
        let mut mass = da(0.0);
        for (index, &element) in Element::ALL.iter().enumerate() {
            mass += element.monoisotopic_mass() * self.counts[index];
        }
        mass
    }

    /// Scale every element count by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        let mut counts = self.counts;
        for c in &mut counts {
            *c *= factor;
        }
        Self { counts }
    }

    /// True if every element count is (numerically) zero.
    pub fn is_empty(&self) -> bool {
        self.counts.iter().all(|&c| c.abs() < 1e-9)
    }
}

impl Default for ElementComposition {
    fn default() -> Self {
        Self::empty()
    }
}

impl Add for ElementComposition {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        let mut counts = self.counts;
        for i in 0..counts.len() {
            counts[i] += rhs.counts[i];
        }
        Self { counts }
    }
}

impl AddAssign for ElementComposition {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for ElementComposition {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        let mut counts = self.counts;
        for i in 0..counts.len() {
            counts[i] -= rhs.counts[i];
        }
        Self { counts }
    }
}

impl Mul<f64> for ElementComposition {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        self.scaled(rhs)
    }
}

/// Water, `H2O`, added once per peptide bond closure (N- and C-termini).
pub fn water() -> ElementComposition {
    ElementComposition::new(&[(Element::H, 2.0), (Element::O, 1.0)])
}

/// Average elemental composition of a single "averagine" residue, fit to the
/// average amino acid composition of tryptic peptides.
pub fn averagine_unit() -> ElementComposition {
    ElementComposition::new(&[
        (Element::C, 4.9384),
        (Element::H, 7.7583),
        (Element::O, 1.4773),
        (Element::N, 1.3577),
        (Element::S, 0.0417),
    ])
}

/// Elemental composition of `n` averagine units, for topping up a partially
/// known formula to a target monoisotopic mass (spec step 4.2.1).
pub fn averagine_scaled_to_mass(target_residual: Mass) -> ElementComposition {
    let unit_mass = averagine_unit().monoisotopic_mass();
    if unit_mass.value <= 0.0 || target_residual.value <= 0.0 {
        return ElementComposition::empty();
    }
    let n_units = target_residual.value / unit_mass.value;
    averagine_unit().scaled(n_units)
}

/// Residue-level elemental composition for the 20 standard amino acids,
/// keyed by one-letter code. Each entry is the composition of the free
/// residue as it appears once incorporated into a chain (i.e. after loss of
/// one water per peptide bond), matching textbook residue masses.
fn residue_composition(one_letter: char) -> Option<ElementComposition> {
    use Element::{C, H, N, O, S};
    let parts: &[(Element, f64)] = match one_letter {
        'G' => &[(C, 2.0), (H, 3.0), (N, 1.0), (O, 1.0)],
        'A' => &[(C, 3.0), (H, 5.0), (N, 1.0), (O, 1.0)],
        'S' => &[(C, 3.0), (H, 5.0), (N, 1.0), (O, 2.0)],
        'P' => &[(C, 5.0), (H, 7.0), (N, 1.0), (O, 1.0)],
        'V' => &[(C, 5.0), (H, 9.0), (N, 1.0), (O, 1.0)],
        'T' => &[(C, 4.0), (H, 7.0), (N, 1.0), (O, 2.0)],
        'C' => &[(C, 3.0), (H, 5.0), (N, 1.0), (O, 1.0), (S, 1.0)],
        'L' => &[(C, 6.0), (H, 11.0), (N, 1.0), (O, 1.0)],
        'I' => &[(C, 6.0), (H, 11.0), (N, 1.0), (O, 1.0)],
        'N' => &[(C, 4.0), (H, 6.0), (N, 2.0), (O, 2.0)],
        'D' => &[(C, 4.0), (H, 5.0), (N, 1.0), (O, 3.0)],
        'Q' => &[(C, 5.0), (H, 8.0), (N, 2.0), (O, 2.0)],
        'K' => &[(C, 6.0), (H, 12.0), (N, 2.0), (O, 1.0)],
        'E' => &[(C, 5.0), (H, 7.0), (N, 1.0), (O, 3.0)],
        'M' => &[(C, 5.0), (H, 9.0), (N, 1.0), (O, 1.0), (S, 1.0)],
        'H' => &[(C, 6.0), (H, 7.0), (N, 3.0), (O, 1.0)],
        'F' => &[(C, 9.0), (H, 9.0), (N, 1.0), (O, 1.0)],
        'R' => &[(C, 6.0), (H, 12.0), (N, 4.0), (O, 1.0)],
        'Y' => &[(C, 9.0), (H, 9.0), (N, 1.0), (O, 2.0)],
        'W' => &[(C, 11.0), (H, 10.0), (N, 2.0), (O, 1.0)],
        _ => return None,
    };
    Some(ElementComposition::new(parts))
}

/// Derive the elemental composition of a peptide from its unmodified base
/// sequence (one-letter codes), including N-/C-terminal water. Returns
/// `None` if the sequence contains a residue this crate doesn't have a
/// composition table entry for (selenocysteine, pyrrolysine, ambiguity
/// codes), in which case the caller falls back to pure averagine per spec
/// §7.
pub fn composition_from_base_sequence(base_sequence: &str) -> Option<ElementComposition> {
    let mut composition = water();
    for residue in base_sequence.chars() {
        composition += residue_composition(residue)?;
    }
    Some(composition)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glycine_mass_matches_textbook_value() {
        let gly = composition_from_base_sequence("G").unwrap();
        // Glycine free amino acid monoisotopic mass is 75.032 Da.
        assert!((gly.monoisotopic_mass().value - 75.032).abs() < 0.01);
    }

    #[test]
    fn unknown_residue_falls_back_to_none() {
        assert!(composition_from_base_sequence("GAX").is_none());
    }

    #[test]
    fn averagine_unit_mass_is_about_111_da() {
        // Average residue mass of a tryptic peptide is ~111 Da.
        assert!((averagine_unit().monoisotopic_mass().value - 111.0).abs() < 2.0);
    }

    #[test]
    fn averagine_scales_to_requested_residual_mass() {
        let residual = da(1110.0);
        let topup = averagine_scaled_to_mass(residual);
        assert!((topup.monoisotopic_mass().value - residual.value).abs() < 1e-6);
    }

    #[test]
    fn composition_add_and_sub_round_trip() {
        let a = composition_from_base_sequence("GA").unwrap();
        let b = residue_composition('A').unwrap();
        let back = (a - b) + b;
        assert!((back.monoisotopic_mass().value - a.monoisotopic_mass().value).abs() < 1e-9);
    }
}
