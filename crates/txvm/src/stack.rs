//! LIFO stacks with the positional reordering primitives `roll` and `bury`.
//!
//! Depth is counted from the top: depth 0 is the last element.

use crate::value::{Kind, Tuple, Value};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StackError {
    #[error("stack underflow")]
    Underflow,
    #[error("stack index {depth} out of range (len {len})")]
    IndexOutOfRange { depth: usize, len: usize },
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: Kind, found: Kind },
}

/// Ordered sequence, top = last element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stack<T = Value> {
    items: Vec<T>,
}

/// Record stacks: every element is a tuple, so fields are read without
/// a runtime variant check.
pub type TupleStack = Stack<Tuple>;

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Stack<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, v: T) {
        self.items.push(v);
    }

    pub fn pop(&mut self) -> Result<T, StackError> {
        self.items.pop().ok_or(StackError::Underflow)
    }

    pub fn peek(&self) -> Result<&T, StackError> {
        self.items.last().ok_or(StackError::Underflow)
    }

    /// Element at `depth` without removing it.
    pub fn peek_at(&self, depth: usize) -> Result<&T, StackError> {
        let i = self.index_of(depth)?;
        Ok(&self.items[i])
    }

    /// Moves the element at `depth` to the top, keeping the relative
    /// order of everything else.
    pub fn roll(&mut self, depth: usize) -> Result<(), StackError> {
        let i = self.index_of(depth)?;
        let x = self.items.remove(i);
        self.items.push(x);
        Ok(())
    }

    /// Pops the top and reinserts it at `depth`, counted in the
    /// post-pop stack. `bury(len_after_pop)` puts it at the bottom.
    pub fn bury(&mut self, depth: usize) -> Result<(), StackError> {
        if self.items.is_empty() {
            return Err(StackError::Underflow);
        }
        let after_pop = self.items.len() - 1;
        if depth > after_pop {
            return Err(StackError::IndexOutOfRange { depth, len: after_pop });
        }
        let x = self.pop()?;
        self.items.insert(after_pop - depth, x);
        Ok(())
    }

    /// Pops `n` elements, returned bottom-first.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<T>, StackError> {
        if n > self.items.len() {
            return Err(StackError::Underflow);
        }
        let at = self.items.len() - n;
        Ok(self.items.split_off(at))
    }

    /// Elements bottom-first.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Drains all elements, bottom-first.
    pub fn drain(&mut self) -> std::vec::Drain<'_, T> {
        self.items.drain(..)
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }

    fn index_of(&self, depth: usize) -> Result<usize, StackError> {
        let len = self.items.len();
        if depth >= len {
            return Err(StackError::IndexOutOfRange { depth, len });
        }
        Ok(len - 1 - depth)
    }
}

impl<T> FromIterator<T> for Stack<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self { items: iter.into_iter().collect() }
    }
}

// ── Typed accessors ─────────────────────────────────────────────

impl Stack<Value> {
    pub fn push_int64(&mut self, n: i64) {
        self.push(Value::Int64(n));
    }

    pub fn push_bytes(&mut self, b: Vec<u8>) {
        self.push(Value::Bytes(b));
    }

    pub fn push_tuple(&mut self, t: Tuple) {
        self.push(Value::Tuple(t));
    }

    pub fn pop_int64(&mut self) -> Result<i64, StackError> {
        self.expect_top(Kind::Int64)?;
        match self.pop()? {
            Value::Int64(n) => Ok(n),
            other => Err(mismatch(Kind::Int64, &other)),
        }
    }

    pub fn pop_bytes(&mut self) -> Result<Vec<u8>, StackError> {
        self.expect_top(Kind::Bytes)?;
        match self.pop()? {
            Value::Bytes(b) => Ok(b),
            other => Err(mismatch(Kind::Bytes, &other)),
        }
    }

    pub fn pop_tuple(&mut self) -> Result<Tuple, StackError> {
        self.expect_top(Kind::Tuple)?;
        match self.pop()? {
            Value::Tuple(t) => Ok(t),
            other => Err(mismatch(Kind::Tuple, &other)),
        }
    }

    pub fn peek_int64(&self) -> Result<i64, StackError> {
        let top = self.peek()?;
        top.as_int64().ok_or_else(|| mismatch(Kind::Int64, top))
    }

    // Checked before popping so a mismatch leaves the stack untouched.
    fn expect_top(&self, expected: Kind) -> Result<(), StackError> {
        let top = self.peek()?;
        if top.kind() != expected {
            return Err(mismatch(expected, top));
        }
        Ok(())
    }
}

fn mismatch(expected: Kind, found: &Value) -> StackError {
    StackError::TypeMismatch { expected, found: found.kind() }
}
