//! Double-buffered accumulation of grouped/standalone counter readouts.
//!
//! The kernel's grouped read format only ever reports a running total since
//! the counter was created, corrected for hardware multiplexing between the
//! two most recent reads. [`CounterBuffer`] turns a sequence of raw
//! [`Stat`] snapshots into accumulated per-index deltas, swapping instead of
//! copying so its allocations stay stable across the lifetime of a counter.

use super::Stat;

fn values(stat: &Stat) -> impl Iterator<Item = u64> + '_ {
    std::iter::once(stat.count).chain(stat.siblings.iter().map(|s| s.count))
}

/// Accumulates scaled deltas between successive [`Stat`] reads of the same
/// counter or counter group.
pub struct CounterBuffer {
    prev: Option<Stat>,
    accumulated: Vec<u64>,
}

impl CounterBuffer {
    pub fn new() -> Self {
        Self {
            prev: None,
            accumulated: Vec::new(),
        }
    }

    /// Folds a freshly read `Stat` into the accumulator and returns the
    /// updated accumulated values, one per counter in group order (leader
    /// first, then siblings).
    ///
    /// The first call only seeds `prev` and reports zeroed deltas, since
    /// there is nothing yet to diff against.
    pub fn update(&mut self, curr: Stat) -> &[u64] {
        let Some(prev) = self.prev.take() else {
            self.accumulated = vec![0; 1 + curr.siblings.len()];
            self.prev = Some(curr);
            return &self.accumulated;
        };

        let d_enabled = curr.time_enabled.unwrap_or(0).saturating_sub(prev.time_enabled.unwrap_or(0));
        let d_running = curr.time_running.unwrap_or(0).saturating_sub(prev.time_running.unwrap_or(0));

        if self.accumulated.len() != 1 + curr.siblings.len() {
            self.accumulated = vec![0; 1 + curr.siblings.len()];
        }

        for (i, (c, p)) in values(&curr).zip(values(&prev)).enumerate() {
            let d_value = c.saturating_sub(p);
            self.accumulated[i] += scale(d_value, d_enabled, d_running);
        }

        self.prev = Some(curr);
        &self.accumulated
    }

    pub fn accumulated(&self) -> &[u64] {
        &self.accumulated
    }
}

impl Default for CounterBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies the kernel multiplexing correction: raw if the counter ran the
/// whole interval, otherwise scaled by `enabled/running` (or its inverse,
/// working around kernels that occasionally report the two swapped).
fn scale(d_value: u64, d_enabled: u64, d_running: u64) -> u64 {
    if d_enabled == 0 || d_running == d_enabled {
        d_value
    } else if d_enabled > d_running {
        ((d_enabled as u128 * d_value as u128) / d_running as u128) as u64
    } else {
        ((d_running as u128 * d_value as u128) / d_enabled as u128) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(count: u64, time_enabled: u64, time_running: u64) -> Stat {
        Stat {
            count,
            id: None,
            time_enabled: Some(time_enabled),
            time_running: Some(time_running),
            lost_records: None,
            siblings: vec![],
        }
    }

    #[test]
    fn first_read_seeds_without_accumulating() {
        let mut buf = CounterBuffer::new();
        let acc = buf.update(stat(200, 1000, 500));
        assert_eq!(acc, &[0]);
    }

    #[test]
    fn group_scaling_example() {
        let mut buf = CounterBuffer::new();
        buf.update(stat(200, 1000, 500));
        let acc = buf.update(stat(600, 3000, 1500));
        assert_eq!(acc, &[800]);
    }

    #[test]
    fn equal_running_and_enabled_is_raw() {
        let mut buf = CounterBuffer::new();
        buf.update(stat(10, 100, 100));
        let acc = buf.update(stat(50, 200, 200));
        assert_eq!(acc, &[40]);
    }

    #[test]
    fn zero_enabled_delta_is_raw() {
        let mut buf = CounterBuffer::new();
        buf.update(stat(10, 100, 100));
        let acc = buf.update(stat(25, 100, 100));
        assert_eq!(acc, &[15]);
    }
}
