//! Search tolerances.
//!
//! A [`Tolerance<T>`] is either a relative (ppm) or absolute window around a
//! quantity `T`, mirroring the `Tolerance` type used throughout this crate
//! family for mass searches, generalized here over both [`Mass`] and
//! [`MassOverCharge`] since the peak index and MBR scorer each search a
//! different quantity.

use std::{fmt::Display, str::FromStr};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::system::{Mass, MassOverCharge, Ratio};

/// A tolerance around a given quantity for searching purposes.
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum Tolerance<T> {
    /// A relative search tolerance in parts per million.
    Ppm(OrderedFloat<f64>),
    /// An absolute tolerance defined by a constant offset (bounds are
    /// `value - tolerance, value + tolerance`).
    Abs(T),
}

impl<T: Copy> Tolerance<T> {
    /// Create a new ppm tolerance.
    pub fn new_ppm(value: f64) -> Self {
        Self::Ppm(value.into())
    }

    /// Create a new absolute tolerance.
    pub fn new_absolute(value: T) -> Self {
        Self::Abs(value)
    }
}

impl Tolerance<Mass> {
    /// Find the `(low, high)` bounds around a given mass for this tolerance.
    pub fn bounds(&self, mass: Mass) -> (Mass, Mass) {
        match self {
            Self::Ppm(ppm) => {
                let delta = mass * (ppm.into_inner() * 1e-6);
                (mass - delta, mass + delta)
            }
            Self::Abs(tolerance) => (mass - *tolerance, mass + *tolerance),
        }
    }

    /// Whether `a` and `b` are within this tolerance of each other.
    pub fn contains(&self, a: Mass, b: Mass) -> bool {
        match self {
            Self::Abs(tol) => (a.value - b.value).abs() <= tol.value,
            Self::Ppm(ppm) => a.ppm_error(b).value <= ppm.into_inner(),
        }
    }
}

impl Tolerance<MassOverCharge> {
    /// Find the `(low, high)` bounds around a given m/z for this tolerance.
    pub fn bounds(&self, mz: MassOverCharge) -> (MassOverCharge, MassOverCharge) {
        match self {
            Self::Ppm(ppm) => {
                let delta = mz * (ppm.into_inner() * 1e-6);
                (mz - delta, mz + delta)
            }
            Self::Abs(tolerance) => (mz - *tolerance, mz + *tolerance),
        }
    }

    /// Whether `a` and `b` are within this tolerance of each other.
    pub fn contains(&self, a: MassOverCharge, b: MassOverCharge) -> bool {
        match self {
            Self::Abs(tol) => (a.value - b.value).abs() <= tol.value,
            Self::Ppm(ppm) => a.ppm_error(b).value <= ppm.into_inner(),
        }
    }
}

impl Display for Tolerance<Mass> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Abs(mass) => write!(f, "{} da", mass.value),
            Self::Ppm(ppm) => write!(f, "{ppm} ppm"),
        }
    }
}

impl FromStr for Tolerance<Mass> {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let num_str: String = s
            .bytes()
            .take_while(|c| {
                c.is_ascii_digit() || *c == b'.' || *c == b'-' || *c == b'+' || *c == b'e' || *c == b'E'
            })
            .map(char::from)
            .collect();
        let num = num_str.parse::<f64>().map_err(|_| ())?;
        match s[num_str.len()..].trim() {
            "ppm" => Ok(Self::Ppm(num.into())),
            "da" => Ok(Self::Abs(crate::system::da(num))),
            _ => Err(()),
        }
    }
}

impl TryFrom<&str> for Tolerance<Mass> {
    type Error = ();
    fn try_from(value: &str) -> Result<Self, ()> {
        value.parse()
    }
}

/// A bare ppm or percent width with no associated quantity, used where a
/// tolerance is reported as a plain [`Ratio`] rather than bounding a
/// specific measurement (for instance the MBR scorer's internal error
/// distributions).
pub fn ppm(value: f64) -> Ratio {
    Ratio::new::<crate::system::ppm>(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::da;

    #[test]
    fn ppm_bounds_are_symmetric_around_the_mass() {
        let tol = Tolerance::<Mass>::new_ppm(10.0);
        let (low, high) = tol.bounds(da(1000.0));
        assert!((1000.0 - low.value - (high.value - 1000.0)).abs() < 1e-9);
    }

    #[test]
    fn absolute_tolerance_contains_checks_plain_difference() {
        let tol = Tolerance::new_absolute(da(0.01));
        assert!(tol.contains(da(100.0), da(100.005)));
        assert!(!tol.contains(da(100.0), da(100.02)));
    }

    #[test]
    fn parses_ppm_and_da_strings() {
        assert_eq!(
            "10 ppm".parse::<Tolerance<Mass>>().unwrap(),
            Tolerance::new_ppm(10.0)
        );
        assert_eq!(
            "0.5 da".parse::<Tolerance<Mass>>().unwrap(),
            Tolerance::new_absolute(da(0.5))
        );
    }
}
