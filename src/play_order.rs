//! Visiting order over playlist indices.
//!
//! The order is always a permutation of `0..len`. Linear order is the identity;
//! shuffled order is drawn once per shuffle-enable and then held stable until
//! the playlist changes or shuffle is enabled again.

use crate::error::OrderError;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{RngExt, SeedableRng};

#[derive(Debug)]
pub struct PlayOrderManager {
    order: Vec<usize>,
    shuffled: bool,
    /// Playlist index of the entry currently being visited.
    current: Option<usize>,
    rng: SmallRng,
}

impl PlayOrderManager {
    pub fn new(len: usize) -> Self {
        Self::with_rng(len, rand::make_rng::<SmallRng>())
    }

    pub fn with_seed(len: usize, seed: u64) -> Self {
        Self::with_rng(len, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(len: usize, rng: SmallRng) -> Self {
        Self {
            order: (0..len).collect(),
            shuffled: false,
            current: None,
            rng,
        }
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffled
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Move the cursor. Indices outside the playlist clear it.
    pub fn set_current(&mut self, index: Option<usize>) {
        self.current = index.filter(|i| *i < self.order.len());
    }

    /// Enabling reshuffles every time, including when shuffle is already on.
    pub fn set_shuffle(&mut self, enabled: bool) {
        self.shuffled = enabled;
        self.order = (0..self.order.len()).collect();
        if enabled {
            self.order.shuffle(&mut self.rng);
        }
    }

    pub fn current_position_in_order(&self) -> Result<usize, OrderError> {
        let current = self.current.ok_or(OrderError::NoCurrent)?;
        self.position_of(current)
    }

    pub fn position_of(&self, index: usize) -> Result<usize, OrderError> {
        self.order
            .iter()
            .position(|entry| *entry == index)
            .ok_or(OrderError::NotFound(index))
    }

    pub fn first(&self) -> Option<usize> {
        self.order.first().copied()
    }

    /// Peek the entry after the cursor. Does not move the cursor.
    pub fn next(&self, wrap: bool) -> Option<usize> {
        match self.current {
            Some(current) => self.next_after(current, wrap),
            None => self.first(),
        }
    }

    /// The entry that follows playlist `index` in the order.
    pub fn next_after(&self, index: usize, wrap: bool) -> Option<usize> {
        let pos = self.position_of(index).ok()?;
        match self.order.get(pos + 1) {
            Some(index) => Some(*index),
            None if wrap => self.first(),
            None => None,
        }
    }

    /// Peek the entry before the cursor. Does not move the cursor.
    pub fn previous(&self, wrap: bool) -> Option<usize> {
        let Some(current) = self.current else {
            return self.first();
        };
        let pos = self.position_of(current).ok()?;
        if pos > 0 {
            return self.order.get(pos - 1).copied();
        }
        if wrap { self.order.last().copied() } else { None }
    }

    /// Rebuild from scratch for a playlist of `len` entries, keeping the shuffle flag.
    pub fn reset(&mut self, len: usize) {
        self.order = (0..len).collect();
        self.current = None;
        if self.shuffled {
            self.order.shuffle(&mut self.rng);
        }
    }

    /// A track was inserted at playlist `index`; later indices shifted up by one.
    pub fn on_inserted(&mut self, index: usize) {
        if !self.shuffled {
            self.order = (0..self.order.len() + 1).collect();
        } else {
            for entry in &mut self.order {
                if *entry >= index {
                    *entry += 1;
                }
            }
            let at = self.rng.random_range(0..=self.order.len());
            self.order.insert(at, index);
        }
        if let Some(current) = self.current.as_mut()
            && *current >= index
        {
            *current += 1;
        }
    }

    /// The track at playlist `index` was removed; later indices shifted down by one.
    pub fn on_removed(&mut self, index: usize) {
        if index >= self.order.len() {
            return;
        }
        if !self.shuffled {
            self.order = (0..self.order.len() - 1).collect();
        } else {
            self.order.retain(|entry| *entry != index);
            for entry in &mut self.order {
                if *entry > index {
                    *entry -= 1;
                }
            }
        }
        self.current = match self.current {
            Some(current) if current == index => None,
            Some(current) if current > index => Some(current - 1),
            other => other,
        };
    }

    /// The track at playlist `from` now sits at `to`.
    pub fn on_moved(&mut self, from: usize, to: usize) {
        let len = self.order.len();
        if from >= len || to >= len || from == to {
            return;
        }
        let remap = |entry: usize| -> usize {
            if entry == from {
                to
            } else if from < to && entry > from && entry <= to {
                entry - 1
            } else if to < from && entry >= to && entry < from {
                entry + 1
            } else {
                entry
            }
        };
        if self.shuffled {
            for entry in &mut self.order {
                *entry = remap(*entry);
            }
        }
        self.current = self.current.map(remap);
    }
}
