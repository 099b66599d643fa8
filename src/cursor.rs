//! Sequential cursor — hands out positions of one logical tile sequence to
//! many threads, each walking its own private enumerator.
//!
//! ```text
//! thread A: enum_A ──┐                      claimed = 5
//! thread B: enum_B ──┼──→ claim(local) ───→  A at 2: advance 2→5, take 5
//! thread C: enum_C ──┘     (one mutex)       claimed = 6
//! ```
//!
//! A thread calls [`SequentialCursor::claim`] with the position its
//! enumerator currently sits at. Under the lock the enumerator is stepped
//! forward past everything other threads already took, then the counter is
//! bumped. The returned position belongs to that thread alone. Across one
//! run the returned values are exactly `0, 1, 2, …`.
//!
//! The whole catch-up loop runs under the lock, so lagging threads hold it
//! longer. Advancing an enumerator is cheap next to rendering, compressing
//! and storing a tile.

use parking_lot::Mutex;

use crate::pyramid::TileEnumerator;

/// Shared claim counter for one pyramid run.
#[derive(Debug, Default)]
pub struct SequentialCursor {
    claimed: Mutex<usize>,
}

impl SequentialCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catch `enumerator` up from `local` and claim the next position.
    ///
    /// `local` must be the position `enumerator` currently points at: `0` for
    /// a fresh enumerator, otherwise the value returned by the previous
    /// claim. If the returned position lies past the end, the enumerator
    /// reports exhaustion and the caller stops.
    pub fn claim<E>(&self, enumerator: &mut E, local: usize) -> usize
    where
        E: TileEnumerator + ?Sized,
    {
        let mut claimed = self.claimed.lock();
        let mut local = local;
        while local < *claimed {
            enumerator.advance();
            local += 1;
        }
        *claimed += 1;
        local
    }

    /// Number of claims made so far, including claims past the end.
    pub fn claimed(&self) -> usize {
        *self.claimed.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::TileCoordinate;
    use crate::error::Result;
    use crate::pyramid::{SerializableTile, SerializeOptions};
    use std::collections::BTreeSet;
    use std::io::Write;

    struct Position(usize);

    impl SerializableTile for Position {
        fn coordinate(&self) -> TileCoordinate {
            TileCoordinate::new(0, self.0 as u32, 0)
        }

        fn write_to<W: Write>(&self, _: &mut W, _: &SerializeOptions) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Counts 0..len.
    struct Counter {
        pos: usize,
        len: usize,
    }

    impl TileEnumerator for Counter {
        type Tile = Position;

        fn advance(&mut self) {
            if self.pos < self.len {
                self.pos += 1;
            }
        }

        fn exhausted(&self) -> bool {
            self.pos >= self.len
        }

        fn coordinate(&self) -> Option<TileCoordinate> {
            (!self.exhausted()).then(|| TileCoordinate::new(0, self.pos as u32, 0))
        }

        fn current(&mut self) -> Result<Position> {
            Ok(Position(self.pos))
        }
    }

    #[test]
    fn single_consumer_sees_every_position() {
        let cursor = SequentialCursor::new();
        let mut e = Counter { pos: 0, len: 5 };
        let mut seen = Vec::new();
        let mut local = cursor.claim(&mut e, 0);
        while !e.exhausted() {
            assert_eq!(e.pos, local);
            seen.push(local);
            local = cursor.claim(&mut e, local);
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn round_robin_interleaving_is_exactly_once() {
        let n = 17;
        let cursor = SequentialCursor::new();
        let mut enums: Vec<_> = (0..3).map(|_| Counter { pos: 0, len: n }).collect();
        let mut locals = vec![None; 3];
        let mut seen = Vec::new();

        // Deterministic but uneven schedule: thread i runs (i + 1) steps per turn.
        'outer: loop {
            let mut progressed = false;
            for t in 0..3 {
                for _ in 0..=t {
                    let e = &mut enums[t];
                    let local = cursor.claim(e, locals[t].unwrap_or(0));
                    locals[t] = Some(local);
                    if e.exhausted() {
                        continue;
                    }
                    assert_eq!(e.current().unwrap().0, local);
                    seen.push(local);
                    progressed = true;
                    if seen.len() == n {
                        break 'outer;
                    }
                }
            }
            assert!(progressed, "no thread made progress");
        }

        seen.sort();
        assert_eq!(seen, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn threads_cover_sequence_exactly_once() {
        let n = 5_000;
        let cursor = SequentialCursor::new();

        let claimed: Vec<Vec<usize>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let cursor = &cursor;
                    s.spawn(move || {
                        let mut e = Counter { pos: 0, len: n };
                        let mut mine = Vec::new();
                        let mut local = cursor.claim(&mut e, 0);
                        while !e.exhausted() {
                            mine.push(e.current().unwrap().0);
                            local = cursor.claim(&mut e, local);
                        }
                        mine
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let total: usize = claimed.iter().map(Vec::len).sum();
        let unique: BTreeSet<usize> = claimed.into_iter().flatten().collect();
        assert_eq!(total, n);
        assert_eq!(unique, (0..n).collect::<BTreeSet<_>>());
    }

    #[test]
    fn more_threads_than_positions() {
        let cursor = SequentialCursor::new();
        let mut enums: Vec<_> = (0..4).map(|_| Counter { pos: 0, len: 2 }).collect();
        let mut taken = Vec::new();
        for e in enums.iter_mut() {
            let local = cursor.claim(e, 0);
            if !e.exhausted() {
                taken.push(local);
            }
        }
        assert_eq!(taken, vec![0, 1]);
        assert_eq!(cursor.claimed(), 4);
    }
}
