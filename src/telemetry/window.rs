//! Windowed (virtualized) view over a long feed.
//!
//! Only items intersecting the viewport, plus `overscan` items on each side,
//! are materialized. Everything else is reserved space in `total_size`, so
//! the scroll offset stays meaningful while items are added above or below.
//! Sizes are in rows; unmeasured items use the configured estimate.

use std::ops::RangeInclusive;

/// Default number of extra items materialized on each side of the viewport.
pub const DEFAULT_OVERSCAN: usize = 20;
/// Default distance from the bottom (in rows) that still counts as "at bottom".
pub const DEFAULT_STICK_THRESHOLD: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    pub overscan: usize,
    pub stick_threshold: u64,
    pub estimated_item_size: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            overscan: DEFAULT_OVERSCAN,
            stick_threshold: DEFAULT_STICK_THRESHOLD,
            estimated_item_size: 1,
        }
    }
}

/// Items to materialize for the current scroll position. Never empty; an
/// empty feed has no range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRange {
    pub first: usize,
    pub last: usize,
    /// Reserved space before `first`.
    pub offset_before: u64,
    /// Reserved space for the whole feed.
    pub total_size: u64,
}

impl WindowRange {
    pub fn indices(&self) -> RangeInclusive<usize> {
        self.first..=self.last
    }
}

#[derive(Debug, Clone)]
pub struct FeedWindow {
    config: WindowConfig,
    sizes: Vec<u32>,
    /// `prefix[i]` is the start offset of item `i`; one longer than `sizes`.
    prefix: Vec<u64>,
    /// First index whose prefix entry may be stale.
    dirty_from: usize,
    scroll_offset: u64,
    viewport: u64,
    /// Items appended while the user was reading history.
    unseen: usize,
}

impl FeedWindow {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config: WindowConfig {
                estimated_item_size: config.estimated_item_size.max(1),
                ..config
            },
            sizes: Vec::new(),
            prefix: vec![0],
            dirty_from: 0,
            scroll_offset: 0,
            viewport: 0,
            unseen: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn scroll_offset(&self) -> u64 {
        self.scroll_offset
    }

    pub fn viewport(&self) -> u64 {
        self.viewport
    }

    /// Count for the "new items" affordance; zero while following the tail.
    pub fn new_items(&self) -> usize {
        self.unseen
    }

    pub fn total_size(&mut self) -> u64 {
        self.ensure_prefix();
        self.prefix[self.sizes.len()]
    }

    fn max_offset(&mut self) -> u64 {
        self.total_size().saturating_sub(self.viewport)
    }

    pub fn is_at_bottom(&mut self) -> bool {
        let max = self.max_offset();
        max.saturating_sub(self.scroll_offset) <= self.config.stick_threshold
    }

    /// Resize the viewport, keeping the tail pinned if it was.
    pub fn set_viewport(&mut self, rows: u64) {
        if rows == self.viewport {
            return;
        }
        let following = self.is_at_bottom();
        self.viewport = rows;
        if following {
            self.stick_to_bottom();
        } else {
            self.clamp_offset();
        }
    }

    /// Bring the window in line with a feed of `len` items after
    /// `removed_front` items were dropped from its start.
    ///
    /// If the view was at (or near) the bottom it follows the new tail;
    /// otherwise it keeps its place and counts the new items as unseen.
    pub fn sync_len(&mut self, len: usize, removed_front: usize) {
        let following = self.is_at_bottom();

        let removed_front = removed_front.min(self.sizes.len());
        if removed_front > 0 {
            self.ensure_prefix();
            let removed_size = self.prefix[removed_front];
            self.scroll_offset = self.scroll_offset.saturating_sub(removed_size);
            self.sizes.drain(..removed_front);
            self.dirty_from = 0;
        }

        let before = self.sizes.len();
        if len >= before {
            self.sizes.resize(len, self.config.estimated_item_size);
            self.dirty_from = self.dirty_from.min(before);
        } else {
            self.sizes.truncate(len);
            self.dirty_from = self.dirty_from.min(len);
        }
        let added = len.saturating_sub(before);

        if following {
            self.stick_to_bottom();
        } else {
            self.unseen += added;
            self.clamp_offset();
        }
    }

    /// Record the real size of an item once it has been laid out.
    ///
    /// Items that resize above the viewport shift the offset by the same
    /// amount so the visible content does not jump.
    pub fn measure(&mut self, index: usize, size: u32) {
        let Some(current) = self.sizes.get(index).copied() else {
            return;
        };
        if current == size {
            return;
        }
        let following = self.is_at_bottom();
        self.ensure_prefix();
        let item_end = self.prefix[index + 1];

        self.sizes[index] = size;
        self.dirty_from = self.dirty_from.min(index);

        if following {
            self.stick_to_bottom();
        } else if item_end <= self.scroll_offset {
            let delta = i64::from(size) - i64::from(current);
            self.scroll_offset = self.scroll_offset.saturating_add_signed(delta);
            self.clamp_offset();
        }
    }

    /// Scroll by a signed number of rows.
    pub fn scroll_by(&mut self, delta: i64) {
        let target = self.scroll_offset.saturating_add_signed(delta);
        self.scroll_to(target);
    }

    /// Scroll to an absolute row offset, clamped to the feed.
    pub fn scroll_to(&mut self, offset: u64) {
        self.scroll_offset = offset;
        self.clamp_offset();
        if self.is_at_bottom() {
            self.unseen = 0;
        }
    }

    /// Jump to the tail and resume following it.
    pub fn stick_to_bottom(&mut self) {
        self.scroll_offset = self.max_offset();
        self.unseen = 0;
    }

    /// Index range to materialize, or `None` for an empty feed.
    pub fn range(&mut self) -> Option<WindowRange> {
        if self.sizes.is_empty() {
            return None;
        }
        self.ensure_prefix();
        let n = self.sizes.len();
        let start = self.scroll_offset;
        let end = start + self.viewport.max(1);

        // First item whose span ends after `start`.
        let first_visible = self.prefix[1..].partition_point(|&e| e <= start).min(n - 1);
        // Last item whose span starts before `end`.
        let last_visible = self.prefix[..n]
            .partition_point(|&s| s < end)
            .saturating_sub(1)
            .max(first_visible);

        let first = first_visible.saturating_sub(self.config.overscan);
        let last = (last_visible + self.config.overscan).min(n - 1);
        Some(WindowRange {
            first,
            last,
            offset_before: self.prefix[first],
            total_size: self.prefix[n],
        })
    }

    /// Slice of `items` that should be materialized right now.
    pub fn materialize<'a, T>(&mut self, items: &'a [T]) -> &'a [T] {
        if items.len() != self.sizes.len() {
            self.sync_len(items.len(), 0);
        }
        match self.range() {
            Some(range) => &items[range.indices()],
            None => &[],
        }
    }

    fn clamp_offset(&mut self) {
        let max = self.max_offset();
        if self.scroll_offset > max {
            self.scroll_offset = max;
        }
    }

    fn ensure_prefix(&mut self) {
        let n = self.sizes.len();
        self.prefix.resize(n + 1, 0);
        for i in self.dirty_from..n {
            self.prefix[i + 1] = self.prefix[i] + u64::from(self.sizes[i]);
        }
        self.dirty_from = n;
    }
}
