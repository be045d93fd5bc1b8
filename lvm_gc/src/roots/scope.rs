//! Scoped root registration guards.

use super::RootStack;
use crate::value::Value;

use std::marker::PhantomData;
use std::rc::Rc;

/// A registered local root.
///
/// `Local` is a slot index, not a value: read it with [`RootScope::get`]
/// after every allocating call to see where the collector left the block.
///
/// A local borrows the scope that registered it, so it cannot outlive it:
///
/// ```compile_fail
/// use lvm_gc::{Allocator, GcConfig, Value};
///
/// let heap = Allocator::new(GcConfig::default());
/// let outer = heap.root_scope();
/// let escaped = {
///     let inner = heap.root_scope();
///     inner.root(Value::int(1))
/// };
/// outer.get(escaped);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Local<'s> {
    index: usize,
    depth: usize,
    _scope: PhantomData<&'s RootScope>,
}

/// A guard that registers locals and unregisters them on drop.
///
/// # Example
///
/// ```
/// use lvm_gc::{Allocator, GcConfig, Value};
///
/// let mut heap = Allocator::new(GcConfig::default());
/// let scope = heap.root_scope();
/// let pair = scope.root(heap.tuple(2));
/// let text = heap.copy_str(Some("may move pair"));
/// heap.mutate_field(scope.get(pair).field(0), text);
/// assert_eq!(heap.field(scope.get(pair), 0), text);
/// ```
pub struct RootScope {
    stack: Rc<RootStack>,
    base: usize,
    depth: usize,
}

impl RootScope {
    /// Open a scope on top of `stack`.
    pub fn new(stack: &Rc<RootStack>) -> Self {
        let (base, depth) = stack.open_scope();
        Self {
            stack: Rc::clone(stack),
            base,
            depth,
        }
    }

    /// Register `value` for the rest of this scope.
    pub fn root(&self, value: Value) -> Local<'_> {
        let index = self.stack.push(value);
        Local {
            index,
            depth: self.depth,
            _scope: PhantomData,
        }
    }

    /// Current value of a registered local.
    #[inline]
    pub fn get(&self, local: Local<'_>) -> Value {
        self.check(local);
        self.stack.get(local.index)
    }

    /// Replace the value of a registered local.
    #[inline]
    pub fn set(&self, local: Local<'_>, value: Value) {
        self.check(local);
        self.stack.set(local.index, value);
    }

    /// Number of locals registered by this scope.
    pub fn len(&self) -> usize {
        self.stack.len() - self.base
    }

    /// Check if this scope registered nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Locals of scopes nested inside this one are rejected.
    #[inline]
    fn check(&self, local: Local<'_>) {
        assert!(
            local.depth <= self.depth && local.index < self.stack.len(),
            "local {:?} does not belong to a live scope",
            local
        );
    }
}

impl Drop for RootScope {
    fn drop(&mut self) {
        self.stack.close_scope(self.base, self.depth);
    }
}
