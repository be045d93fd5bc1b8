//! Root registration for locals that must survive a collection.
//!
//! A local variable holding a block is invisible to the collector. If an
//! allocating call runs while it is live, the block may be promoted (and
//! the local left dangling) or reclaimed. Registering the local in the
//! [`RootStack`] makes it a root: the collector reads it, and updates it
//! in place when the block moves.
//!
//! Registrations are made through a [`RootScope`] guard, which pops
//! everything it pushed when it is dropped, on normal return, early
//! return through `?`, and unwinding alike.

mod scope;

pub use scope::{Local, RootScope};

use crate::value::Value;

use std::cell::{Cell, RefCell};

/// Stack of registered local roots.
///
/// Slots are pushed and popped in strict LIFO order by [`RootScope`].
pub struct RootStack {
    /// Registered values, innermost scope last.
    slots: RefCell<Vec<Value>>,
    /// Number of open scopes.
    depth: Cell<usize>,
}

impl RootStack {
    /// Create a new empty root stack.
    pub fn new() -> Self {
        Self {
            slots: RefCell::new(Vec::new()),
            depth: Cell::new(0),
        }
    }

    /// Number of registered roots.
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Check if no roots are registered.
    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    /// Number of open scopes.
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// Visit every registered root.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(Value),
    {
        for value in self.slots.borrow().iter() {
            f(*value);
        }
    }

    /// Visit every registered root, letting the visitor replace it.
    ///
    /// Used by moving collectors to redirect roots to promoted copies.
    pub fn update<F>(&self, mut f: F)
    where
        F: FnMut(Value) -> Value,
    {
        for slot in self.slots.borrow_mut().iter_mut() {
            *slot = f(*slot);
        }
    }

    fn push(&self, value: Value) -> usize {
        let mut slots = self.slots.borrow_mut();
        slots.push(value);
        slots.len() - 1
    }

    fn get(&self, index: usize) -> Value {
        self.slots.borrow()[index]
    }

    fn set(&self, index: usize, value: Value) {
        self.slots.borrow_mut()[index] = value;
    }

    fn open_scope(&self) -> (usize, usize) {
        let depth = self.depth.get() + 1;
        self.depth.set(depth);
        (self.len(), depth)
    }

    fn close_scope(&self, base: usize, depth: usize) {
        // Checked before any state changes, so a misordered close leaves
        // the stack as it was.
        if !std::thread::panicking() {
            assert_eq!(
                self.depth.get(),
                depth,
                "root scopes must be closed in LIFO order"
            );
        }
        self.slots.borrow_mut().truncate(base);
        self.depth.set(depth - 1);
    }
}

impl Default for RootStack {
    fn default() -> Self {
        Self::new()
    }
}
