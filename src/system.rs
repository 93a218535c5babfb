//! The measurement system used by this crate.
//!
//! A small redefinition of the relevant SI-adjacent units, following the same
//! `uom`-based pattern the wider `rustyms` family uses for its own unit
//! system: each physical quantity (mass, retention time, mass-over-charge,
//! relative error) gets its own typed newtype instead of a bare `f64`, so a
//! retention time in minutes can never be silently added to a mass in
//! daltons.

use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use uom::num_traits::Zero;
use uom::*;

pub use self::f64::*;

/// The mass quantity in dalton.
#[macro_use]
pub mod mass {
    use uom::*;

    quantity! {
        /// Mass in dalton
        quantity: Mass; "mass";
        /// Mass
        dimension: Q<P1, Z0>;
        units {
            @millidalton: 0.001; "mDa", "millidalton", "millidaltons";
            @dalton: 1.0; "Da", "dalton", "daltons";
            @kilodalton: 1_000.0; "kDa", "kilodalton", "kilodaltons";
        }
    }
}

/// The time quantity, used here exclusively for chromatographic retention time.
#[macro_use]
pub mod time {
    use uom::*;

    quantity! {
        /// Time
        quantity: Time; "time";
        /// Time
        dimension: Q<Z0, P1>;
        units {
            @s: 1.0; "s", "second", "seconds";
            @min: 60.0; "min", "minute", "minutes";
        }
    }
}

/// The mass-over-charge quantity (m/z).
#[macro_use]
pub mod mass_over_charge {
    use uom::*;

    quantity! {
        /// Mass over charge (da/e)
        quantity: MassOverCharge; "mass_over_charge";
        /// Mass over charge (da/e)
        dimension: Q<P1, Z0>;
        units {
            @mz: 1.0; "m/z", "mass_over_charge", "mass_over_charge";
        }
    }
}

/// A unitless relative quantity, used for ppm tolerances and error reporting.
#[macro_use]
pub mod ratio {
    use uom::*;

    quantity! {
        /// Unitless quantity for general calculations
        quantity: Ratio; "ratio";
        /// Unitless quantity for general calculations
        dimension: Q<Z0, Z0>;
        units {
            @fraction: 1.0; "⅟", "fraction", "fraction";
            @percent: 0.01; "%", "percent", "percent";
            @ppm: 0.000_001; "ppm", "ppm", "ppm";
        }
    }
}

system! {
    /// Quantities
    #[doc(hidden)]
    quantities: Q {
        mass: dalton, M;
        time: s, T;
    }

    /// Units
    units: U {
        mod mass::Mass,
        mod time::Time,
        mod mass_over_charge::MassOverCharge,
        mod ratio::Ratio,
    }
}

/// The whole system with `f64` as storage type; this is what the rest of the
/// crate uses.
#[allow(unused_imports)]
pub mod f64 {
    mod mks {
        pub use super::super::*;
    }

    Q!(self::mks, f64);

    pub use super::mass::dalton;
    pub use super::mass_over_charge::mz;
    pub use super::ratio::{fraction, ppm};
    pub use super::time::{min, s};

    /// Annotate the given number as being in Da.
    pub fn da(v: f64) -> Mass {
        Mass::new::<super::mass::dalton>(v)
    }

    /// Annotate the given number as being in minutes.
    pub fn rt_min(v: f64) -> Time {
        Time::new::<super::time::min>(v)
    }
}

/// Mass of a proton, used to convert between neutral mass and observed m/z.
pub const PROTON_MASS: f64 = 1.007_276_466_8;

/// Average mass added per additional neutron (the 13C-12C spacing), used
/// wherever code needs to step by "one isotope" in absolute mass terms
/// rather than through a computed isotope pattern.
pub const NEUTRON_SPACING: f64 = 1.003_355;

impl MassOverCharge {
    /// Absolute ppm error between this m/z and another.
    pub fn ppm_error(self, b: Self) -> Ratio {
        Ratio::new::<ratio::ppm>(((self - b).abs() / self.abs()).value * 1e6)
    }

    /// Convert an observed m/z at the given charge back to a neutral mass.
    pub fn to_neutral_mass(self, charge: i8) -> Mass {
        Mass::new::<mass::dalton>(self.value * f64::from(charge) - f64::from(charge) * PROTON_MASS)
    }
}

impl Mass {
    /// Absolute ppm error between this mass and another.
    pub fn ppm_error(self, b: Self) -> Ratio {
        Ratio::new::<ratio::ppm>(((self - b).abs() / self.abs()).value * 1e6)
    }

    /// Signed ppm error between this mass and another: positive when `self` is heavier.
    pub fn signed_ppm_error(self, b: Self) -> Ratio {
        Ratio::new::<ratio::ppm>(((self - b) / self).value * 1e6)
    }

    /// Convert a neutral mass to the m/z of the given charge state (protonation).
    pub fn to_mz(self, charge: i8) -> MassOverCharge {
        MassOverCharge::new::<mass_over_charge::mz>(
            (self.value + f64::from(charge) * PROTON_MASS) / f64::from(charge),
        )
    }
}

/// A wrapper around [`Mass`] implementing `Eq`/`Ord`/`Hash`, for use as a map
/// key or in sorted collections where `f64`'s lack of a total order would
/// otherwise be in the way.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct OrderedMass(Mass);

impl OrderedMass {
    /// The zero mass.
    pub fn zero() -> Self {
        Self(Mass::zero())
    }

    /// Unwrap into a plain [`Mass`].
    pub fn into_inner(self) -> Mass {
        self.0
    }
}

impl Default for OrderedMass {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<Mass> for OrderedMass {
    fn from(value: Mass) -> Self {
        Self(value)
    }
}

impl Deref for OrderedMass {
    type Target = Mass;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for OrderedMass {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Ord for OrderedMass {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.value.total_cmp(&other.0.value)
    }
}

impl PartialOrd for OrderedMass {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for OrderedMass {}

impl PartialEq for OrderedMass {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl std::hash::Hash for OrderedMass {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.value.to_bits().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mz_round_trip() {
        let neutral = da(1000.5);
        let mz = neutral.to_mz(2);
        let back = mz.to_neutral_mass(2);
        assert!((back.value - neutral.value).abs() < 1e-9);
    }

    #[test]
    fn ppm_error_symmetry() {
        let a = da(1000.0);
        let b = da(1000.01);
        assert!(a.ppm_error(b).value > 0.0);
        assert!((a.ppm_error(b).value - 10.0).abs() < 1e-6);
    }
}
