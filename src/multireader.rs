//! K-way time-ordered merge across per-CPU tracepoint readers into one
//! per-device stream.
//!
//! Block I/O and NVMe tracepoints are recorded per-CPU but must be emitted
//! per-device in timestamp order. [`MultiReader`] holds one reader per CPU,
//! each exposing its next event's timestamp, and repeatedly pops the reader
//! whose head is earliest.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// A single source feeding the merge: anything that can report and consume
/// its next timestamped event.
pub trait TimestampedReader {
    type Event;

    /// The timestamp of the next unconsumed event, if any.
    fn peek_top_timestamp(&self) -> Option<u64>;

    /// Consumes and returns the next event. Must not be called when
    /// [`Self::peek_top_timestamp`] returns `None`.
    fn pop(&mut self) -> Self::Event;
}

struct HeapEntry<R> {
    ts: u64,
    seq: usize,
    reader: R,
}

impl<R> PartialEq for HeapEntry<R> {
    fn eq(&self, other: &Self) -> bool {
        self.ts == other.ts && self.seq == other.seq
    }
}
impl<R> Eq for HeapEntry<R> {}

impl<R> PartialOrd for HeapEntry<R> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered by `(ts, seq)`: ties break on reader registration order, so a
/// per-stream's own internal order is preserved across ties.
impl<R> Ord for HeapEntry<R> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.ts, self.seq).cmp(&(other.ts, other.seq))
    }
}

/// Drives a min-heap k-way merge over a fixed set of readers.
pub struct MultiReader<R: TimestampedReader> {
    heap: BinaryHeap<Reverse<HeapEntry<R>>>,
}

impl<R: TimestampedReader> MultiReader<R> {
    pub fn new(readers: impl IntoIterator<Item = R>) -> Self {
        let mut heap = BinaryHeap::new();
        for (seq, reader) in readers.into_iter().enumerate() {
            if let Some(ts) = reader.peek_top_timestamp() {
                heap.push(Reverse(HeapEntry { ts, seq, reader }));
            }
        }
        Self { heap }
    }

    /// Pops the globally-earliest event across all readers, re-pushing its
    /// source reader if it still has more to offer.
    pub fn next(&mut self) -> Option<R::Event> {
        let Reverse(HeapEntry { seq, mut reader, .. }) = self.heap.pop()?;
        let event = reader.pop();
        if let Some(ts) = reader.peek_top_timestamp() {
            self.heap.push(Reverse(HeapEntry { ts, seq, reader }));
        }
        Some(event)
    }
}

impl<R: TimestampedReader> Iterator for MultiReader<R> {
    type Item = R::Event;

    fn next(&mut self) -> Option<Self::Item> {
        MultiReader::next(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct VecReader(VecDeque<u64>);

    impl TimestampedReader for VecReader {
        type Event = u64;

        fn peek_top_timestamp(&self) -> Option<u64> {
            self.0.front().copied()
        }

        fn pop(&mut self) -> u64 {
            self.0.pop_front().unwrap()
        }
    }

    #[test]
    fn merges_globally_sorted() {
        let a = VecReader(VecDeque::from([1, 4, 9]));
        let b = VecReader(VecDeque::from([2, 3, 10]));
        let c = VecReader(VecDeque::from([5, 6, 7, 8]));

        let merged: Vec<u64> = MultiReader::new([a, b, c]).collect();
        assert_eq!(merged, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn ties_preserve_reader_registration_order() {
        let a = VecReader(VecDeque::from([5, 5]));
        let b = VecReader(VecDeque::from([5]));

        // Reader `a` registered first, so its two same-timestamp events
        // should both precede `b`'s on a tie.
        let merged: Vec<u64> = MultiReader::new([a, b]).collect();
        assert_eq!(merged, vec![5, 5, 5]);
    }

    #[test]
    fn empty_readers_produce_nothing() {
        let a: VecReader = VecReader(VecDeque::new());
        assert_eq!(MultiReader::new([a]).collect::<Vec<_>>(), Vec::<u64>::new());
    }
}
