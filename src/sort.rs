//! Generic insertion sort and the release-horizon partition used to flush
//! near-sorted calibrated events.
//!
//! Insertion sort is the right tool here, not a placeholder for something
//! faster: steady-state data arrives already nearly sorted, so the
//! worst-case `O(n*d)` cost is bounded by how far out of order any one
//! event can be (`assumed_max_delay`), not by `n`.

use crate::event::CalEvent;

/// Stable insertion sort: reorders `items` into non-decreasing order under
/// `less_than`, preserving relative order of equal elements.
pub fn insertion_sort<T>(items: &mut [T], less_than: impl Fn(&T, &T) -> bool) {
    for i in 1..items.len() {
        let mut j = i;
        while j > 0 && less_than(&items[j], &items[j - 1]) {
            items.swap(j, j - 1);
            j -= 1;
        }
    }
}

/// Splits `events` (assumed sorted by `ct`) at the release horizon: events
/// with `ct <= horizon` are returned for writing, the rest are left in
/// `events` to wait for more data. `horizon` is typically
/// `newest.ct - assumed_max_delay_ticks`.
pub fn partition_releasable(events: &mut Vec<CalEvent>, horizon: i64) -> Vec<CalEvent> {
    let split = events.partition_point(|e| e.ct <= horizon);
    let remainder = events.split_off(split);
    std::mem::replace(events, remainder)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cal(ct: i64, ft: f32) -> CalEvent {
        CalEvent {
            ct,
            ft,
            energy: 0.0,
            spatial_total: 0.0,
            x: 0.0,
            y: 0.0,
            panel: 0,
            cartridge: 0,
            fin: 0,
            module: 0,
            apd: 0,
            crystal: 0,
            daq: 0,
            chip: 0,
        }
    }

    #[test]
    fn sorts_by_ct_then_ft() {
        let mut events = vec![cal(1000, 0.0), cal(500, 10.0), cal(500, 1.0)];
        insertion_sort(&mut events, |a, b| (a.ct, a.ft.to_bits()) < (b.ct, b.ft.to_bits()));
        let cts: Vec<i64> = events.iter().map(|e| e.ct).collect();
        assert_eq!(cts, vec![500, 500, 1000]);
        assert_eq!(events[0].ft, 1.0);
        assert_eq!(events[1].ft, 10.0);
    }

    #[test]
    fn stable_for_equal_keys() {
        let mut items = vec![(1, 'a'), (1, 'b'), (0, 'c')];
        insertion_sort(&mut items, |a, b| a.0 < b.0);
        assert_eq!(items, vec![(0, 'c'), (1, 'a'), (1, 'b')]);
    }

    #[test]
    fn releases_only_events_at_or_before_horizon() {
        let mut events = vec![cal(500, 0.0), cal(1000, 0.0)];
        let released = partition_releasable(&mut events, 900);
        assert_eq!(released.iter().map(|e| e.ct).collect::<Vec<_>>(), vec![500]);
        assert_eq!(events.iter().map(|e| e.ct).collect::<Vec<_>>(), vec![1000]);
    }
}
