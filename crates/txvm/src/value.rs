//! Values: the only three shapes of datum the machine manipulates.
//!
//! Every stack element is a `Value`. Compound records (outputs, value
//! items, anchors, conditions) are tuples with a fixed field layout, see
//! [`crate::record`].

use serde::{Deserialize, Serialize};
use std::fmt;

const TAG_INT64: u8 = 0x01;
const TAG_BYTES: u8 = 0x02;
const TAG_TUPLE: u8 = 0x03;

/// Derive-key context used by [`Value::digest`].
pub const VALUE_DIGEST_CONTEXT: &str = "txvm 2024 value digest v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Int64,
    Bytes,
    Tuple,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Int64 => "int64",
            Kind::Bytes => "bytes",
            Kind::Tuple => "tuple",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Value {
    Int64(i64),
    Bytes(Vec<u8>),
    Tuple(Tuple),
}

/// Ordered, fixed-length sequence of values. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tuple(Vec<Value>);

impl Tuple {
    pub fn new(fields: Vec<Value>) -> Self {
        Self(fields)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Value> {
        self.0.get(i)
    }

    pub fn fields(&self) -> &[Value] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }

    pub fn into_fields(self) -> Vec<Value> {
        self.0
    }

    /// Digest of this tuple as a value, see [`Value::digest_in`].
    pub fn digest_in(&self, context: &str) -> [u8; 32] {
        let mut h = blake3::Hasher::new_derive_key(context);
        encode_tuple(self, &mut h);
        *h.finalize().as_bytes()
    }
}

impl From<Vec<Value>> for Tuple {
    fn from(fields: Vec<Value>) -> Self {
        Self(fields)
    }
}

impl FromIterator<Value> for Tuple {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Tuple {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Int64(_) => Kind::Int64,
            Value::Bytes(_) => Kind::Bytes,
            Value::Tuple(_) => Kind::Tuple,
        }
    }

    pub fn as_int64(&self) -> Option<i64> {
        match self {
            Value::Int64(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&Tuple> {
        match self {
            Value::Tuple(t) => Some(t),
            _ => None,
        }
    }

    /// Success terminal for condition programs: a nonzero integer.
    pub fn is_truthy(&self) -> bool {
        matches!(self, Value::Int64(n) if *n != 0)
    }

    /// 32-byte BLAKE3 identity of this value under the default context.
    pub fn digest(&self) -> [u8; 32] {
        self.digest_in(VALUE_DIGEST_CONTEXT)
    }

    /// 32-byte BLAKE3 identity of this value, domain-separated by `context`.
    ///
    /// The hashed form is tag + length prefixed, so structurally distinct
    /// values never share a preimage.
    pub fn digest_in(&self, context: &str) -> [u8; 32] {
        let mut h = blake3::Hasher::new_derive_key(context);
        encode_value(self, &mut h);
        *h.finalize().as_bytes()
    }
}

/// Encoded size and tuple nesting of a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Footprint {
    /// Bytes the value contributes to its digest preimage.
    pub size: usize,
    /// Scalars are 0, a tuple is one more than its deepest field.
    pub depth: usize,
}

impl Value {
    /// Measures the value with an explicit worklist. Gives up with `None`
    /// as soon as a tuple below `max_depth` is reached, so arbitrarily
    /// deep values are safe to measure.
    pub fn footprint(&self, max_depth: usize) -> Option<Footprint> {
        walk(vec![(self, 0)], Footprint::default(), max_depth)
    }
}

impl Tuple {
    /// Footprint of this tuple as a value, see [`Value::footprint`].
    pub fn footprint(&self, max_depth: usize) -> Option<Footprint> {
        if max_depth == 0 {
            return None;
        }
        let own = Footprint { size: 1 + 8, depth: 1 };
        walk(self.iter().map(|field| (field, 1)).collect(), own, max_depth)
    }
}

fn walk(mut pending: Vec<(&Value, usize)>, mut fp: Footprint, max_depth: usize) -> Option<Footprint> {
    while let Some((v, level)) = pending.pop() {
        let own = match v {
            Value::Int64(_) => 1 + 8,
            Value::Bytes(b) => 1 + 8 + b.len(),
            Value::Tuple(_) => 1 + 8,
        };
        fp.size = fp.size.saturating_add(own);
        if let Value::Tuple(t) = v {
            let depth = level + 1;
            if depth > max_depth {
                return None;
            }
            fp.depth = fp.depth.max(depth);
            pending.extend(t.iter().map(|field| (field, depth)));
        }
    }
    Some(fp)
}

fn encode_value(v: &Value, h: &mut blake3::Hasher) {
    match v {
        Value::Int64(n) => {
            h.update(&[TAG_INT64]);
            h.update(&n.to_be_bytes());
        }
        Value::Bytes(b) => {
            h.update(&[TAG_BYTES]);
            h.update(&(b.len() as u64).to_be_bytes());
            h.update(b);
        }
        Value::Tuple(t) => encode_tuple(t, h),
    }
}

fn encode_tuple(t: &Tuple, h: &mut blake3::Hasher) {
    h.update(&[TAG_TUPLE]);
    h.update(&(t.len() as u64).to_be_bytes());
    for field in t {
        encode_value(field, h);
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int64(n)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<Tuple> for Value {
    fn from(t: Tuple) -> Self {
        Value::Tuple(t)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int64(n) => write!(f, "{n}"),
            Value::Bytes(b) => write!(f, "x'{}'", hex::encode(b)),
            Value::Tuple(t) => {
                f.write_str("(")?;
                for (i, field) in t.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{field}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tup(fields: Vec<Value>) -> Value {
        Value::Tuple(Tuple::new(fields))
    }

    #[test]
    fn structural_equality_nests() {
        let a = tup(vec![1.into(), tup(vec![b"x".as_slice().into()])]);
        let b = tup(vec![1.into(), tup(vec![b"x".as_slice().into()])]);
        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn digest_separates_kinds() {
        // Int64(0) and eight zero bytes must not collide.
        let int = Value::Int64(0);
        let bytes = Value::Bytes(vec![0; 8]);
        assert_ne!(int.digest(), bytes.digest());
    }

    #[test]
    fn digest_separates_tuple_boundaries() {
        let flat = tup(vec![b"ab".as_slice().into(), b"c".as_slice().into()]);
        let shifted = tup(vec![b"a".as_slice().into(), b"bc".as_slice().into()]);
        assert_ne!(flat.digest(), shifted.digest());
    }

    #[test]
    fn digest_context_matters() {
        let v = Value::Int64(7);
        assert_ne!(v.digest_in("a"), v.digest_in("b"));
        assert_eq!(v.digest(), v.digest_in(VALUE_DIGEST_CONTEXT));
    }

    #[test]
    fn footprint_counts_encoded_bytes_and_nesting() {
        let v = tup(vec![1.into(), tup(vec![b"abc".as_slice().into()])]);
        let fp = v.footprint(8).unwrap();
        assert_eq!(fp.depth, 2);
        // outer tuple, int, inner tuple, 3-byte string
        assert_eq!(fp.size, 9 + 9 + 9 + (9 + 3));
        assert_eq!(Value::Int64(0).footprint(0), Some(Footprint { size: 9, depth: 0 }));
        let t = v.as_tuple().unwrap();
        assert_eq!(t.footprint(8), Some(fp));
    }

    #[test]
    fn footprint_stops_past_max_depth() {
        let mut v = Value::Int64(0);
        for _ in 0..5 {
            v = tup(vec![v]);
        }
        assert_eq!(v.footprint(5).map(|fp| fp.depth), Some(5));
        assert_eq!(v.footprint(4), None);
    }

    #[test]
    fn truthiness() {
        assert!(Value::Int64(1).is_truthy());
        assert!(Value::Int64(-3).is_truthy());
        assert!(!Value::Int64(0).is_truthy());
        assert!(!Value::Bytes(vec![1]).is_truthy());
    }

    #[test]
    fn display_is_readable() {
        let v = tup(vec![10.into(), vec![0xab, 0x01].into()]);
        assert_eq!(v.to_string(), "(10, x'ab01')");
    }
}
