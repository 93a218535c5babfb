//! Extracted-ion chromatogram construction.
//!
//! Traces a target neutral mass through the MS1 scans of a run, walking
//! outward from a seed scan until too many consecutive scans in a row fail
//! to produce a match (spec §4.3).

use crate::peak::{IndexedPeak, Ms1ScanInfo};
use crate::peak_index::PeakIndex;
use crate::system::Mass;
use crate::tolerance::Tolerance;

/// Build an XIC: the contiguous (up to `missed_scans_allowed` gaps) run of
/// matches around the MS1 scan whose retention time is last `<= rt_center`.
///
/// `scans` must be sorted ascending by `zero_based_ms1_index` (and
/// therefore by retention time).
pub fn peakfind(
    scans: &[Ms1ScanInfo],
    index: &PeakIndex,
    rt_center: f64,
    mass: Mass,
    charge: i8,
    tol: &Tolerance<Mass>,
    missed_scans_allowed: u32,
) -> Vec<IndexedPeak> {
    if scans.is_empty() {
        return Vec::new();
    }

    let seed_position = scans.partition_point(|scan| scan.retention_time <= rt_center).saturating_sub(1);

    let mut found = Vec::new();
    if let Some(seed_peak) = index.get(mass, scans[seed_position].zero_based_ms1_index, tol, charge) {
        found.push(seed_peak);
    }

    // A non-match at the seed scan does not count as a miss for either walk.
    walk(scans, index, mass, charge, tol, seed_position, 1, missed_scans_allowed, &mut found);
    walk(scans, index, mass, charge, tol, seed_position, -1, missed_scans_allowed, &mut found);

    found.sort_by(|a, b| a.retention_time.total_cmp(&b.retention_time));
    found
}

#[allow(clippy::too_many_arguments)]
fn walk(
    scans: &[Ms1ScanInfo],
    index: &PeakIndex,
    mass: Mass,
    charge: i8,
    tol: &Tolerance<Mass>,
    seed_position: usize,
    step: isize,
    missed_scans_allowed: u32,
    found: &mut Vec<IndexedPeak>,
) {
    let mut position = seed_position as isize + step;
    let mut consecutive_misses = 0u32;

    while position >= 0 && (position as usize) < scans.len() {
        let scan = &scans[position as usize];
        match index.get(mass, scan.zero_based_ms1_index, tol, charge) {
            Some(peak) => {
                found.push(peak);
                consecutive_misses = 0;
            }
            None => {
                consecutive_misses += 1;
                if consecutive_misses > missed_scans_allowed {
                    break;
                }
            }
        }
        position += step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::da;

    fn scans(n: u32) -> Vec<Ms1ScanInfo> {
        (0..n)
            .map(|i| Ms1ScanInfo {
                zero_based_ms1_index: i,
                one_based_scan_number: i + 1,
                retention_time: f64::from(i) * 0.1,
            })
            .collect()
    }

    fn peak_at(scan: u32, mz: f64) -> IndexedPeak {
        IndexedPeak {
            mz,
            intensity: 1000.0,
            zero_based_ms1_index: scan,
            retention_time: f64::from(scan) * 0.1,
            peak_id: u64::from(scan),
        }
    }

    #[test]
    fn walks_both_directions_from_the_seed_scan() {
        let scan_list = scans(10);
        let mut index = PeakIndex::new();
        let target_mz = da(999.0).to_mz(1).value;
        for s in 3..=6 {
            index.insert(peak_at(s, target_mz));
        }
        index.sort_buckets();

        let result = peakfind(&scan_list, &index, 0.45, da(999.0), 1, &Tolerance::new_ppm(20.0), 1);
        let scans_found: Vec<u32> = result.iter().map(|p| p.zero_based_ms1_index).collect();
        assert_eq!(scans_found, vec![3, 4, 5, 6]);
    }

    #[test]
    fn stops_after_too_many_consecutive_misses() {
        let scan_list = scans(10);
        let mut index = PeakIndex::new();
        let target_mz = da(999.0).to_mz(1).value;
        index.insert(peak_at(5, target_mz));
        index.insert(peak_at(8, target_mz)); // 2 misses (6, 7) then a hit, beyond tolerance of 1
        index.sort_buckets();

        let result = peakfind(&scan_list, &index, 0.5, da(999.0), 1, &Tolerance::new_ppm(20.0), 1);
        let scans_found: Vec<u32> = result.iter().map(|p| p.zero_based_ms1_index).collect();
        assert_eq!(scans_found, vec![5]);
    }

    #[test]
    fn tolerates_a_single_missed_scan() {
        let scan_list = scans(10);
        let mut index = PeakIndex::new();
        let target_mz = da(999.0).to_mz(1).value;
        index.insert(peak_at(5, target_mz));
        index.insert(peak_at(7, target_mz)); // scan 6 is a single missed scan
        index.sort_buckets();

        let result = peakfind(&scan_list, &index, 0.5, da(999.0), 1, &Tolerance::new_ppm(20.0), 1);
        let scans_found: Vec<u32> = result.iter().map(|p| p.zero_based_ms1_index).collect();
        assert_eq!(scans_found, vec![5, 7]);
    }
}
