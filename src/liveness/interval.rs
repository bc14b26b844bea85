//! Live intervals
//!
//! One [`LiveInterval`] per live SSA value: an ordered, non-overlapping set
//! of `[start, end)` ranges over the lifetime-position number line, plus the
//! positions that use the value.
//!
//! Intervals are built back-to-front by the range builder, so every
//! mutation here works on the front of the range list: a new range is
//! prepended and merged with the old first range when they touch.

use crate::ir::types::ValueId;

/// A half-open `[start, end)` span of lifetime positions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiveRange {
    pub start: u32,
    pub end: u32,
}

/// One use of a value, recorded while scanning a block backward
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UsePosition {
    /// The instruction consuming the value
    pub user: ValueId,
    pub position: u32,
    /// Use comes from an environment list rather than a code input
    pub is_environment: bool,
}

/// The live interval of one SSA value
#[derive(Clone, Debug, Default)]
pub struct LiveInterval {
    /// Ordered, non-overlapping ranges, ascending by start
    ranges: Vec<LiveRange>,
    /// Uses in descending position order (backward build order)
    uses: Vec<UsePosition>,
}

impl LiveInterval {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[LiveRange] {
        &self.ranges
    }

    /// First covered position
    pub fn start(&self) -> u32 {
        self.ranges.first().map_or(0, |r| r.start)
    }

    /// One past the last covered position
    pub fn end(&self) -> u32 {
        self.ranges.last().map_or(0, |r| r.end)
    }

    /// Uses in ascending position order
    pub fn uses(&self) -> impl Iterator<Item = &UsePosition> {
        self.uses.iter().rev()
    }

    pub fn covers(&self, position: u32) -> bool {
        let idx = self.ranges.partition_point(|r| r.end <= position);
        self.ranges
            .get(idx)
            .is_some_and(|r| r.start <= position)
    }

    /// Add a range covering a whole block.
    ///
    /// The builder visits blocks in reverse linear order, so `start` never
    /// exceeds the start of the current first range; the new range either
    /// merges into it or sits strictly before it.
    pub fn add_range(&mut self, start: u32, end: u32) {
        debug_assert!(start < end);
        match self.ranges.first_mut() {
            Some(first) if end >= first.start => {
                debug_assert!(start <= first.start);
                first.start = start;
                first.end = first.end.max(end);
            }
            _ => self.ranges.insert(0, LiveRange { start, end }),
        }
    }

    /// Record a use at `position` inside the block starting at
    /// `block_start`, extending the interval to cover the use.
    pub fn add_use(&mut self, user: ValueId, position: u32, block_start: u32, is_environment: bool) {
        self.uses.push(UsePosition {
            user,
            position,
            is_environment,
        });
        match self.ranges.first() {
            // The block already contributes a range (a later use in the
            // same block, or a live-out cover); nothing to extend.
            Some(first) if first.start == block_start => {
                debug_assert!(position < first.end);
            }
            _ => self.add_range(block_start, position + 1),
        }
    }

    /// Cover an entire loop body `[start, end)`, absorbing every range that
    /// falls inside it. Used for values live at a loop header, so that no
    /// reload is ever needed mid-loop.
    pub fn add_loop_range(&mut self, start: u32, end: u32) {
        debug_assert!(start < end);
        let mut merged = LiveRange { start, end };
        let mut kept = Vec::with_capacity(self.ranges.len() + 1);
        let mut placed = false;
        for &range in &self.ranges {
            if range.end < merged.start || range.start > merged.end {
                if !placed && range.start > merged.end {
                    kept.push(merged);
                    placed = true;
                }
                kept.push(range);
            } else {
                // Overlapping or adjacent: absorb.
                merged.start = merged.start.min(range.start);
                merged.end = merged.end.max(range.end);
            }
        }
        if !placed {
            kept.push(merged);
        }
        kept.sort_by_key(|r| r.start);
        self.ranges = kept;
    }

    /// Shrink the starting edge down to the definition's position. The
    /// interval always has a range by the time its definition is visited:
    /// every indexed value has at least one use, and that use was scanned
    /// first.
    pub fn set_from(&mut self, from: u32) {
        match self.ranges.first_mut() {
            Some(first) => first.start = from,
            // Defensive for values used only through successor phis in
            // their own block; coverage of the definition still holds.
            None => self.ranges.push(LiveRange {
                start: from,
                end: from + 1,
            }),
        }
    }
}
