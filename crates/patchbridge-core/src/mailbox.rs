//! Single-slot, single-writer mailboxes living inside the transfer region.
//!
//! A mailbox carries a value, the direction it travels in and a dirty flag.
//! The writer posts `value + direction + updated`; only the side named by
//! `direction` may clear `updated`, after consuming the value. A post in
//! the opposite direction is refused until then. Every
//! cross-process field with a "changed" notion (parameters, transport,
//! names, the state chunk) goes through this one type.

/// Which side is the designated reader of a posted value.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Written by the host bridge, consumed by the scheduler bridge.
    #[default]
    ToScheduler = 0,
    /// Written by the scheduler bridge, consumed by the host bridge.
    ToHost = 1,
}

impl Direction {
    /// Unknown raw values (foreign writer, torn memory) read as `ToScheduler`.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::ToHost,
            _ => Self::ToScheduler,
        }
    }

    pub fn reverse(self) -> Self {
        match self {
            Self::ToScheduler => Self::ToHost,
            Self::ToHost => Self::ToScheduler,
        }
    }
}

/// `#[repr(C)]` mailbox. Zeroed memory is a valid, empty `ToScheduler` mailbox.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Mailbox<T: Copy> {
    updated: u32,
    direction: u32,
    value: T,
}

impl<T: Copy> Mailbox<T> {
    pub const fn new(value: T) -> Self {
        Self {
            updated: 0,
            direction: Direction::ToScheduler as u32,
            value,
        }
    }

    /// Overwrite the value and mark it pending for the reader named by `direction`.
    ///
    /// Refused (returns false) while a value travelling the other way is
    /// still unread: the slot belongs to that reader until it consumes it.
    pub fn post(&mut self, direction: Direction, value: T) -> bool {
        self.post_with(direction, |slot| *slot = value)
    }

    /// Like [`post`](Self::post), but fills the value in place. Used for large payloads.
    pub fn post_with(&mut self, direction: Direction, fill: impl FnOnce(&mut T)) -> bool {
        if self.is_pending(direction.reverse()) {
            return false;
        }
        fill(&mut self.value);
        self.direction = direction as u32;
        self.updated = 1;
        true
    }

    pub fn is_pending(&self, direction: Direction) -> bool {
        self.updated != 0 && self.direction() == direction
    }

    /// Consume a pending value. Clears `updated`, so each post is delivered once.
    pub fn take(&mut self, direction: Direction) -> Option<T> {
        if !self.is_pending(direction) {
            return None;
        }
        self.updated = 0;
        Some(self.value)
    }

    /// Offer a pending value to `deliver`; the mailbox is only cleared if it returns true.
    ///
    /// Returns whether the value was delivered.
    pub fn consume(&mut self, direction: Direction, deliver: impl FnOnce(&T) -> bool) -> bool {
        if !self.is_pending(direction) {
            return false;
        }
        if deliver(&self.value) {
            self.updated = 0;
            true
        } else {
            false
        }
    }

    /// Re-arm the dirty flag without touching the value.
    pub fn rearm(&mut self) {
        self.updated = 1;
    }

    /// Clear the dirty flag and hand the slot to `direction`.
    pub fn reset(&mut self, direction: Direction) {
        self.updated = 0;
        self.direction = direction as u32;
    }

    /// Last value written, regardless of direction or dirty state.
    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn direction(&self) -> Direction {
        Direction::from_raw(self.direction)
    }
}

impl<T: Copy + Default> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
