//! Pure position arithmetic for one ordering scope.
//!
//! # Responsibility
//! - Define what a valid position assignment looks like for a scope.
//! - Compute target orders for single moves and bulk reorders without
//!   touching storage.
//!
//! # Invariants
//! - A settled scope of `n` members holds exactly `{base, …, base+n-1}`.
//! - Staging positions are strictly negative and pairwise distinct, so they
//!   never collide with settled positions (`base >= 0`).

use std::cmp::Reverse;
use std::collections::HashMap;
use uuid::Uuid;

/// One scope member as seen by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub id: Uuid,
    /// `None` for legacy rows awaiting backfill.
    pub position: Option<i64>,
}

impl Slot {
    pub fn new(id: Uuid, position: Option<i64>) -> Self {
        Self { id, position }
    }
}

/// Position rules for scopes sharing one base value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionLedger {
    base: i64,
}

impl PositionLedger {
    pub const fn new(base: i64) -> Self {
        Self { base }
    }

    pub fn base(&self) -> i64 {
        self.base
    }

    /// Position for a member appended after `current_max`.
    pub fn next_position(&self, current_max: Option<i64>) -> i64 {
        current_max.map_or(self.base, |max| max + 1)
    }

    /// Settled position of the member at `index` in scope order.
    pub fn position_at(&self, index: usize) -> i64 {
        self.base + index as i64
    }

    /// Temporary position used by the first phase of a two-phase rewrite.
    pub fn staging_position(index: usize) -> i64 {
        -1 - index as i64
    }

    /// Returns whether `positions` is exactly `{base, …, base+n-1}`.
    pub fn is_contiguous<I>(&self, positions: I) -> bool
    where
        I: IntoIterator<Item = Option<i64>>,
    {
        let mut sorted = Vec::new();
        for position in positions {
            match position {
                Some(value) => sorted.push(value),
                None => return false,
            }
        }
        sorted.sort_unstable();
        sorted
            .iter()
            .enumerate()
            .all(|(index, value)| *value == self.position_at(index))
    }

    /// Returns whether `order` can be committed without writes: each member
    /// already holds the settled position for its index.
    pub fn is_settled(&self, slots: &[Slot], order: &[Uuid]) -> bool {
        if slots.len() != order.len() {
            return false;
        }
        let current: HashMap<Uuid, Option<i64>> =
            slots.iter().map(|slot| (slot.id, slot.position)).collect();
        order.iter().enumerate().all(|(index, id)| {
            current.get(id).copied().flatten() == Some(self.position_at(index))
        })
    }

    /// Maps a requested position onto an insertion index in a list of `len`
    /// remaining members. Out-of-range requests are clamped.
    pub fn clamp_index(&self, target: i64, len: usize) -> usize {
        target.saturating_sub(self.base).clamp(0, len as i64) as usize
    }

    /// Removes `item` from `order` and reinserts it at the clamped `target`.
    ///
    /// Returns `None` when `item` is not part of `order`.
    pub fn reinsert(&self, order: &[Uuid], item: Uuid, target: i64) -> Option<Vec<Uuid>> {
        let current_index = order.iter().position(|id| *id == item)?;
        let mut next = order.to_vec();
        next.remove(current_index);
        let index = self.clamp_index(target, next.len());
        next.insert(index, item);
        Some(next)
    }

    /// Final order for a bulk reorder of one scope.
    ///
    /// Members sort by the client-supplied target when present, else their
    /// current position; ties break by id ascending. Unpositioned members
    /// without a target go last.
    pub fn bulk_order(&self, slots: &[Slot], targets: &HashMap<Uuid, i64>) -> Vec<Uuid> {
        let mut keyed: Vec<(Reverse<bool>, i64, Uuid)> = slots
            .iter()
            .map(|slot| {
                let effective = targets.get(&slot.id).copied().or(slot.position);
                (Reverse(effective.is_some()), effective.unwrap_or(0), slot.id)
            })
            .collect();
        keyed.sort_unstable();
        keyed.into_iter().map(|(_, _, id)| id).collect()
    }
}

impl Default for PositionLedger {
    fn default() -> Self {
        Self::new(0)
    }
}
