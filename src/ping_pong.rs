//! Double-buffered resource pairs.
//!
//! One element is readable (the result of the previous step), the other is
//! writable (the target of the next step). [`PingPong::swap`] exchanges the
//! roles. The pair never hands out the same element for both roles, so a
//! pass that takes `split()` cannot read what it writes.

/// Two resources with alternating read/write roles.
#[derive(Debug)]
pub struct PingPong<T> {
    slots: [T; 2],
    /// Index of the readable slot.
    active: usize,
}

impl<T> PingPong<T> {
    /// `first` starts as the readable slot.
    pub fn new(first: T, second: T) -> Self {
        Self {
            slots: [first, second],
            active: 0,
        }
    }

    /// Build both slots with the same constructor.
    pub fn from_fn(mut f: impl FnMut(usize) -> T) -> Self {
        Self::new(f(0), f(1))
    }

    /// The readable slot.
    pub fn read(&self) -> &T {
        &self.slots[self.active]
    }

    /// The writable slot.
    pub fn write(&self) -> &T {
        &self.slots[1 - self.active]
    }

    /// `(read, write)` at once.
    pub fn split(&self) -> (&T, &T) {
        (self.read(), self.write())
    }

    /// Exchange read and write roles.
    pub fn swap(&mut self) {
        self.active = 1 - self.active;
    }

    /// Both slots, in storage order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter()
    }

    /// Apply `f` to both slots, in storage order.
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> [U; 2] {
        [f(&self.slots[0]), f(&self.slots[1])]
    }
}
