//! Termination detection for scrolling strategies.
//!
//! [`LinkSetConvergence`] stops once repeated scrolls keep producing links
//! already seen. [`HeightConvergence`] stops once a scroll plus "load more"
//! click no longer grows the page. Both are created fresh for every seed
//! task.

use std::collections::HashSet;

/// Where a link-set session stands after an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceState {
    /// The last scroll produced new links
    Scanning,
    /// `k` consecutive scrolls produced nothing new
    Stable(u32),
    Done,
}

#[derive(Debug, Clone)]
pub struct LinkSetConvergence {
    seen: HashSet<String>,
    repeat_count: u32,
    scroll_count: u32,
    max_repeats: u32,
    max_scrolls: u32,
}

impl LinkSetConvergence {
    pub fn new(max_repeats: u32, max_scrolls: u32) -> Self {
        Self {
            seen: HashSet::new(),
            repeat_count: 0,
            scroll_count: 0,
            max_repeats,
            max_scrolls,
        }
    }

    /// Record the links extracted by one scroll iteration
    pub fn observe<'a, I>(&mut self, extracted: I) -> ConvergenceState
    where
        I: IntoIterator<Item = &'a String>,
    {
        if self.is_done() {
            return ConvergenceState::Done;
        }

        self.scroll_count += 1;
        let mut new_links = 0;
        for link in extracted {
            if self.seen.insert(link.clone()) {
                new_links += 1;
            }
        }

        if new_links > 0 {
            self.repeat_count = 0;
        } else {
            self.repeat_count += 1;
        }

        self.state()
    }

    pub fn state(&self) -> ConvergenceState {
        if self.is_done() {
            ConvergenceState::Done
        } else if self.repeat_count > 0 {
            ConvergenceState::Stable(self.repeat_count)
        } else {
            ConvergenceState::Scanning
        }
    }

    pub fn is_done(&self) -> bool {
        self.repeat_count >= self.max_repeats || self.scroll_count >= self.max_scrolls
    }

    pub fn seen(&self) -> &HashSet<String> {
        &self.seen
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    pub fn scroll_count(&self) -> u32 {
        self.scroll_count
    }
}

/// Content-growth fixed point on the page's scrollable height
#[derive(Debug, Clone)]
pub struct HeightConvergence {
    last_height: u64,
    done: bool,
}

impl HeightConvergence {
    /// Start from the height measured before the first scroll
    pub fn new(initial_height: u64) -> Self {
        Self {
            last_height: initial_height,
            done: false,
        }
    }

    /// Record the height after one scroll/click iteration; true once it stopped changing
    pub fn observe(&mut self, height: u64) -> bool {
        if height == self.last_height {
            self.done = true;
        }
        self.last_height = height;
        self.done
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn last_height(&self) -> u64 {
        self.last_height
    }
}
