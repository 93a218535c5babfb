//! Observed MS1 data: centroids and scan metadata.

use serde::{Deserialize, Serialize};

/// An observed, centroided MS1 peak. Immutable after indexing; `Copy` so it
/// can be handed out by value from the [`crate::peak_index::PeakIndex`]
/// rather than borrowed, letting the same centroid be a candidate for more
/// than one envelope/peak at once.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexedPeak {
    pub mz: f64,
    pub intensity: f64,
    pub zero_based_ms1_index: u32,
    pub retention_time: f64,
    /// Stable identity for this physical centroid within its run, used by
    /// apex-collision checks (spec invariant 3) that need to compare
    /// identity rather than float equality.
    pub peak_id: u64,
}

impl IndexedPeak {
    /// Neutral mass implied by this peak's m/z at the given charge.
    pub fn neutral_mass(&self, charge: i8) -> crate::system::Mass {
        crate::system::MassOverCharge::new::<crate::system::mz>(self.mz).to_neutral_mass(charge)
    }
}

/// One MS1 scan's position in the run, independent of its peaks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ms1ScanInfo {
    pub zero_based_ms1_index: u32,
    pub one_based_scan_number: u32,
    pub retention_time: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_mass_matches_hand_computed_value() {
        let peak = IndexedPeak {
            mz: 501.0,
            intensity: 1.0,
            zero_based_ms1_index: 0,
            retention_time: 0.0,
            peak_id: 0,
        };
        let mass = peak.neutral_mass(2);
        // 2 * 501.0 - 2 * 1.00727646 ~= 999.985
        assert!((mass.value - 999.985).abs() < 0.01);
    }
}
