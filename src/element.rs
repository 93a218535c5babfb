//! The handful of elements the peptide averagine/isotope model needs.
//!
//! Bottom-up proteomics only ever has to reason about carbon, hydrogen,
//! nitrogen, oxygen, and sulfur: every standard amino acid residue, and
//! averagine itself, is built from just those five. This narrows the much
//! larger periodic-table `Element` enum the wider `rustyms` family carries
//! down to what this crate actually needs.

use crate::system::{da, Mass};

/// An element relevant to peptide elemental composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Element {
    /// Hydrogen
    H,
    /// Carbon
    C,
    /// Nitrogen
    N,
    /// Oxygen
    O,
    /// Sulfur
    S,
}

impl Element {
    /// All elements this crate knows about, in a stable order.
    pub const ALL: [Element; 5] = [Element::H, Element::C, Element::N, Element::O, Element::S];

    /// `(isotope_number, monoisotopic_mass, natural_abundance)` for every
    /// isotope of this element with non-negligible natural abundance, the
    /// lightest (most abundant, "base") isotope first.
    ///
    /// Source: CIAAW (<https://www.ciaaw.org/atomic-weights.htm>).
    pub const fn isotopes(self) -> &'static [(u16, f64, f64)] {
        match self {
            Element::H => &[
                (1, 1.007_825_031_898, 0.999_885),
                (2, 2.014_101_777_844, 0.000_115),
            ],
            Element::C => &[(12, 12.0, 0.9893), (13, 13.003_354_835_07, 0.0107)],
            Element::N => &[
                (14, 14.003_074_004_25, 0.996_36),
                (15, 15.000_108_898_88, 0.003_64),
            ],
            Element::O => &[
                (16, 15.994_914_619_257, 0.997_57),
                (17, 16.999_131_755_94, 0.000_38),
                (18, 17.999_159_612_86, 0.002_05),
            ],
            Element::S => &[
                (32, 31.972_071_174_40, 0.9499),
                (33, 32.971_458_910_40, 0.0075),
                (34, 33.967_867_012_78, 0.0425),
                (36, 35.967_080_69, 0.0001),
            ],
        }
    }

    /// The monoisotopic mass of this element's most abundant isotope.
    pub fn monoisotopic_mass(self) -> Mass {
        da(self.isotopes()[0].1)
    }

    /// The CIAAW standard (average) atomic weight.
    pub fn average_weight(self) -> Mass {
        da(self
            .isotopes()
            .iter()
            .map(|(_, mass, abundance)| mass * abundance)
            .sum())
    }

    /// Single-letter element symbol.
    pub const fn symbol(self) -> &'static str {
        match self {
            Element::H => "H",
            Element::C => "C",
            Element::N => "N",
            Element::O => "O",
            Element::S => "S",
        }
    }
}

impl std::fmt::Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carbon_13_abundance() {
        let c = Element::C.isotopes();
        assert!((c[1].2 - 0.0107).abs() < 1e-9);
    }

    #[test]
    fn average_weight_close_to_standard_table() {
        // CIAAW gives 12.0106 Da for average carbon.
        assert!((Element::C.average_weight().value - 12.0106).abs() < 0.001);
    }
}
