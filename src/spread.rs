//! Beacon spreading
//!
//! A RAW covering many stations can be split over successive beacons so each
//! beacon only restricts a slice of the AID range. The slice advances every
//! beacon and wraps around once the last station has been covered.

use crate::aid::AidList;
use crate::window::{BeaconSpreading, WindowConfig};

/// Stations per beacon and the number of leading beacons that get one extra
/// station.
pub fn stations_per_beacon(num_stations: u16, spreading: &BeaconSpreading) -> (u16, u16) {
    let nominal = spreading.nominal_stations_per_beacon.max(1);
    if spreading.max_spread > 0 && num_stations / nominal > spreading.max_spread {
        (num_stations / spreading.max_spread, num_stations % spreading.max_spread)
    } else {
        let beacons = num_stations.div_ceil(nominal).max(1);
        (num_stations / beacons, num_stations % beacons)
    }
}

/// AID range to advertise for `config` in the next beacon.
///
/// Advances the spreading state of the config. Configs without spreading, or
/// whose range does not match any associated station, use their full range.
pub fn beacon_aid_range(config: &mut WindowConfig, aids: &AidList) -> (u16, u16) {
    let (start_idx, end_idx) = (config.start_aid_idx, config.end_aid_idx);

    let mut spreading = match config.beacon_spreading {
        Some(s) if s.is_enabled() && start_idx >= 0 && end_idx >= 0 && (start_idx as usize) < aids.len() => s,
        _ => {
            if let Some(s) = config.beacon_spreading.as_mut() {
                s.last_spread_aid = config.end_aid;
            }
            return (config.start_aid, config.end_aid);
        }
    };

    let (start_idx, end_idx) = (start_idx as usize, (end_idx as usize).min(aids.len() - 1));
    let num_stations = (end_idx - start_idx + 1) as u16;
    let (mut per_beacon, extra) = stations_per_beacon(num_stations, &spreading);
    log::debug!("Stations per beacon, mod: {}, {}", per_beacon, extra);

    let aid_slice = &aids.as_slice()[start_idx..=end_idx];
    let beacon_start_idx = aid_slice
        .iter()
        .position(|&aid| aid > spreading.last_spread_aid)
        .map_or(start_idx, |pos| start_idx + pos);

    // The first `extra` beacons of a cycle carry one more station
    if beacon_start_idx - start_idx < (per_beacon as usize + 1) * extra as usize {
        per_beacon += 1;
    }

    let beacon_end_idx = (beacon_start_idx + per_beacon as usize - 1).min(end_idx);
    let (first, last) = (aids.as_slice()[beacon_start_idx], aids.as_slice()[beacon_end_idx]);
    spreading.last_spread_aid = last;
    config.beacon_spreading = Some(spreading);

    log::debug!(
        "RAW {} beacon AID idx {}..={} (AID {}..={})",
        config.id,
        beacon_start_idx,
        beacon_end_idx,
        first,
        last
    );
    (first, last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::SlotDefinition;

    fn spread_config(start: u16, end: u16, max_spread: u16, nominal: u16, aids: &AidList) -> WindowConfig {
        let mut cfg = WindowConfig::generic(1, start, end, SlotDefinition::new(1, 1000, false))
            .with_beacon_spreading(BeaconSpreading::new(max_spread, nominal));
        let (s, e) = aids.resolve_indices(start, end);
        cfg.start_aid_idx = s;
        cfg.end_aid_idx = e;
        cfg
    }

    #[test]
    fn test_ten_stations_nominal_three() {
        let aids = AidList::from_aids(1..=10);
        let mut cfg = spread_config(1, 10, 0, 3, &aids);

        let mut sizes = Vec::new();
        let mut covered = Vec::new();
        for _ in 0..4 {
            let (first, last) = beacon_aid_range(&mut cfg, &aids);
            sizes.push(last - first + 1);
            covered.extend(first..=last);
        }
        assert_eq!(sizes, vec![3, 3, 2, 2]);
        assert_eq!(covered, (1..=10).collect::<Vec<_>>());

        // The cycle repeats
        assert_eq!(beacon_aid_range(&mut cfg, &aids), (1, 3));
        assert_eq!(beacon_aid_range(&mut cfg, &aids), (4, 6));
    }

    #[test]
    fn test_sparse_aids() {
        let aids = AidList::from_aids([2, 5, 9, 11, 40]);
        let mut cfg = spread_config(2, 40, 0, 2, &aids);
        // 5 stations over 3 beacons: 2, 2, 1
        assert_eq!(beacon_aid_range(&mut cfg, &aids), (2, 5));
        assert_eq!(beacon_aid_range(&mut cfg, &aids), (9, 11));
        assert_eq!(beacon_aid_range(&mut cfg, &aids), (40, 40));
        assert_eq!(beacon_aid_range(&mut cfg, &aids), (2, 5));
    }

    #[test]
    fn test_max_spread_limits_beacons() {
        let spreading = BeaconSpreading::new(2, 3);
        // 10 / 3 = 3 beacons > 2, so 5 per beacon
        assert_eq!(stations_per_beacon(10, &spreading), (5, 0));
        // 7 / 3 = 2, not above the limit
        assert_eq!(stations_per_beacon(7, &spreading), (2, 1));

        let aids = AidList::from_aids(1..=10);
        let mut cfg = spread_config(1, 10, 2, 3, &aids);
        assert_eq!(beacon_aid_range(&mut cfg, &aids), (1, 5));
        assert_eq!(beacon_aid_range(&mut cfg, &aids), (6, 10));
        assert_eq!(beacon_aid_range(&mut cfg, &aids), (1, 5));
    }

    #[test]
    fn test_unresolved_uses_full_range() {
        let aids = AidList::from_aids([20, 21]);
        let mut cfg = spread_config(1, 10, 0, 1, &aids);
        assert_eq!((cfg.start_aid_idx, cfg.end_aid_idx), (-1, -1));
        assert_eq!(beacon_aid_range(&mut cfg, &aids), (1, 10));
        assert_eq!(cfg.beacon_spreading.unwrap().last_spread_aid, 10);
    }

    #[test]
    fn test_without_spreading() {
        let aids = AidList::from_aids(1..=10);
        let mut cfg = WindowConfig::generic(1, 3, 7, SlotDefinition::new(1, 1000, false));
        assert_eq!(beacon_aid_range(&mut cfg, &aids), (3, 7));
        assert!(cfg.beacon_spreading.is_none());
    }
}
