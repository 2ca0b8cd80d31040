/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Two-slot module context.
//!
//! A module whose working data depends on the active State keeps it in a
//! [`DoubleSlot`]: it fills the staging slot for the incoming State and flips
//! in [`Module::prepare_next_state`](super::Module::prepare_next_state), so
//! `execute` only ever sees a complete context.

/// Active/staging pair with an externally flipped index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DoubleSlot<T> {
    slots: [T; 2],
    active: usize,
}

impl<T: Clone> DoubleSlot<T> {
    pub fn new(initial: T) -> Self {
        Self {
            slots: [initial.clone(), initial],
            active: 0,
        }
    }
}

impl<T> DoubleSlot<T> {
    pub fn active(&self) -> &T {
        &self.slots[self.active]
    }

    pub fn staging(&self) -> &T {
        &self.slots[self.active ^ 1]
    }

    pub fn staging_mut(&mut self) -> &mut T {
        &mut self.slots[self.active ^ 1]
    }

    /// Makes the staging slot active.
    pub fn flip(&mut self) {
        self.active ^= 1;
    }

    pub fn active_index(&self) -> usize {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_changes_are_invisible_until_flip() {
        let mut ctx = DoubleSlot::new(1.0);
        *ctx.staging_mut() = 2.0;
        assert_eq!(*ctx.active(), 1.0);

        ctx.flip();
        assert_eq!(*ctx.active(), 2.0);
        assert_eq!(*ctx.staging(), 1.0);
        assert_eq!(ctx.active_index(), 1);
    }
}
