//! Per-run bucketed lookup from (m/z, scan) to centroided peak.
//!
//! Peaks are bucketed by integer m/z so a ppm-window query only ever has to
//! inspect the few buckets the window can touch, then linearly scans the
//! (typically short) per-bucket list. The index is serialized to a temp
//! file with `bincode` between the per-run pass and the MBR pass, the same
//! way the teacher crate used `bincode` to persist its own built-at-build-time
//! databases.

use crate::error::EngineError;
use crate::peak::IndexedPeak;
use crate::system::{Mass, MassOverCharge};
use crate::tolerance::Tolerance;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};

fn bucket_of(mz: f64) -> i64 {
    mz.floor() as i64
}

/// A per-run, bucketed index over observed centroids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeakIndex {
    /// Integer-m/z bucket -> peaks in that bucket, sorted by scan index.
    buckets: HashMap<i64, Vec<IndexedPeak>>,
    next_peak_id: u64,
}

impl PeakIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one centroid, assigning it a stable `peak_id`.
    pub fn insert(&mut self, mut peak: IndexedPeak) -> u64 {
        peak.peak_id = self.next_peak_id;
        self.next_peak_id += 1;
        self.buckets.entry(bucket_of(peak.mz)).or_default().push(peak);
        peak.peak_id
    }

    /// Finalize bucket ordering after a bulk load. Call once after all
    /// `insert`s for a run.
    pub fn sort_buckets(&mut self) {
        for bucket in self.buckets.values_mut() {
            bucket.sort_by(|a, b| a.zero_based_ms1_index.cmp(&b.zero_based_ms1_index));
        }
    }

    /// Query the most intense centroid, at `scan_index`, whose neutral mass
    /// (at `charge`) is within `tol` of `target_neutral_mass` (spec §4.1).
    /// Ties are broken by higher intensity.
    pub fn get(
        &self,
        target_neutral_mass: Mass,
        scan_index: u32,
        tol: &Tolerance<Mass>,
        charge: i8,
    ) -> Option<IndexedPeak> {
        let target_mz = target_neutral_mass.to_mz(charge);
        let (low_mz, high_mz) = tol.bounds(target_neutral_mass);
        let low_mz = low_mz.to_mz(charge).value.min(target_mz.value);
        let high_mz = high_mz.to_mz(charge).value.max(target_mz.value);

        let low_bucket = bucket_of(low_mz);
        let high_bucket = bucket_of(high_mz);

        (low_bucket..=high_bucket)
            .filter_map(|bucket| self.buckets.get(&bucket))
            .flat_map(|peaks| peaks.iter())
            .filter(|peak| peak.zero_based_ms1_index == scan_index)
            .filter(|peak| tol.contains(peak.neutral_mass(charge), target_neutral_mass))
            .max_by(|a, b| {
                a.intensity
                    .total_cmp(&b.intensity)
                    .then_with(|| a.peak_id.cmp(&b.peak_id))
            })
            .copied()
    }

    /// All peaks at the given scan index across every bucket, used by the
    /// XIC builder when walking a single scan for the first time.
    pub fn peaks_at_scan(&self, scan_index: u32) -> impl Iterator<Item = &IndexedPeak> {
        self.buckets
            .values()
            .flat_map(|peaks| peaks.iter())
            .filter(move |peak| peak.zero_based_ms1_index == scan_index)
    }

    /// Query an m/z window directly, used by [`MassOverCharge`]-keyed
    /// callers such as the MBR scorer's acceptor search.
    pub fn get_by_mz(
        &self,
        target_mz: MassOverCharge,
        scan_index: u32,
        tol: &Tolerance<MassOverCharge>,
    ) -> Option<IndexedPeak> {
        let (low_mz, high_mz) = tol.bounds(target_mz);
        (bucket_of(low_mz.value)..=bucket_of(high_mz.value))
            .filter_map(|bucket| self.buckets.get(&bucket))
            .flat_map(|peaks| peaks.iter())
            .filter(|peak| peak.zero_based_ms1_index == scan_index)
            .filter(|peak| tol.contains(MassOverCharge::new::<crate::system::mz>(peak.mz), target_mz))
            .max_by(|a, b| a.intensity.total_cmp(&b.intensity))
            .copied()
    }

    /// Serialize this index to a temp file keyed by `run_id`, for later
    /// rehydration during the MBR pass.
    pub fn persist_to(&self, directory: &Path, run_id: &str) -> Result<PathBuf, EngineError> {
        let path = directory.join(format!("{run_id}.peakindex"));
        let bytes = bincode::serialize(self).map_err(|source| EngineError::PeakIndexSerialization {
            run_id: run_id.to_string(),
            source,
        })?;
        let mut file = std::fs::File::create(&path).map_err(|source| EngineError::PeakIndexIo {
            run_id: run_id.to_string(),
            path: path.clone(),
            source,
        })?;
        file.write_all(&bytes).map_err(|source| EngineError::PeakIndexIo {
            run_id: run_id.to_string(),
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Deserialize a previously persisted index.
    pub fn load_from(path: &Path, run_id: &str) -> Result<Self, EngineError> {
        let bytes = std::fs::read(path).map_err(|source| EngineError::PeakIndexIo {
            run_id: run_id.to_string(),
            path: path.to_path_buf(),
            source,
        })?;
        bincode::deserialize(&bytes).map_err(|source| EngineError::PeakIndexSerialization {
            run_id: run_id.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(mz: f64, scan: u32, intensity: f64) -> IndexedPeak {
        IndexedPeak {
            mz,
            intensity,
            zero_based_ms1_index: scan,
            retention_time: f64::from(scan) * 0.1,
            peak_id: 0,
        }
    }

    #[test]
    fn get_returns_most_intense_match_within_tolerance() {
        let mut index = PeakIndex::new();
        index.insert(peak(501.0, 5, 1000.0));
        index.insert(peak(501.0005, 5, 5000.0));
        index.sort_buckets();

        let target = peak(501.0, 5, 0.0).neutral_mass(2);
        let found = index
            .get(target, 5, &Tolerance::new_ppm(20.0), 2)
            .expect("a match within tolerance");
        assert!((found.intensity - 5000.0).abs() < 1e-9);
    }

    #[test]
    fn get_respects_scan_index() {
        let mut index = PeakIndex::new();
        index.insert(peak(501.0, 5, 1000.0));
        index.sort_buckets();

        let target = peak(501.0, 5, 0.0).neutral_mass(2);
        assert!(index.get(target, 6, &Tolerance::new_ppm(20.0), 2).is_none());
    }

    #[test]
    fn persist_and_load_round_trips_exactly() {
        let mut index = PeakIndex::new();
        index.insert(peak(501.0, 5, 1000.0));
        index.sort_buckets();

        let dir = tempfile::tempdir().unwrap();
        let path = index.persist_to(dir.path(), "run-1").unwrap();
        let loaded = PeakIndex::load_from(&path, "run-1").unwrap();

        let target = peak(501.0, 5, 0.0).neutral_mass(2);
        assert_eq!(
            index.get(target, 5, &Tolerance::new_ppm(20.0), 2),
            loaded.get(target, 5, &Tolerance::new_ppm(20.0), 2)
        );
    }
}
