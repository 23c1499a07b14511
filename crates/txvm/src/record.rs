//! Typed views over the tuples that live on record stacks.
//!
//! Field layouts:
//!
//! | record      | tuple                                            |
//! |-------------|--------------------------------------------------|
//! | anchor      | `(seed, path)`                                   |
//! | value item  | `(0, asset, amount, anchor)` clear               |
//! |             | `(1, asset_commitment, value_commitment, anchor)`|
//! | output      | `(value_item, condition_program)`                |
//! | input       | `(output_ref)`                                   |
//! | condition   | `(program)`                                      |
//! | nonce       | `(token, expiry)`                                |
//! | tx header   | `(version, min_time, max_time, run_id)`          |

use crate::error::Rejection;
use crate::value::{Tuple, Value};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const ASSET_CONTEXT: &str = "txvm 2024 asset id v1";
pub const OUTPUT_CONTEXT: &str = "txvm 2024 output id v1";
pub const ANCHOR_CONTEXT: &str = "txvm 2024 anchor v1";

const TAG_CLEAR: i64 = 0;
const TAG_CONFIDENTIAL: i64 = 1;

type Result<T> = std::result::Result<T, Rejection>;

// ── Field access ────────────────────────────────────────────────

fn expect_len(t: &Tuple, n: usize, what: &str) -> Result<()> {
    if t.len() != n {
        return Err(Rejection::InvalidRecord(format!(
            "{what}: expected {n} fields, got {}",
            t.len()
        )));
    }
    Ok(())
}

fn int_field(t: &Tuple, i: usize, what: &str) -> Result<i64> {
    t.get(i)
        .and_then(Value::as_int64)
        .ok_or_else(|| Rejection::InvalidRecord(format!("{what}: field {i} must be int64")))
}

fn bytes_field<'a>(t: &'a Tuple, i: usize, what: &str) -> Result<&'a [u8]> {
    t.get(i)
        .and_then(Value::as_bytes)
        .ok_or_else(|| Rejection::InvalidRecord(format!("{what}: field {i} must be bytes")))
}

fn tuple_field<'a>(t: &'a Tuple, i: usize, what: &str) -> Result<&'a Tuple> {
    t.get(i)
        .and_then(Value::as_tuple)
        .ok_or_else(|| Rejection::InvalidRecord(format!("{what}: field {i} must be tuple")))
}

fn array32(b: &[u8], what: &str) -> Result<[u8; 32]> {
    b.try_into()
        .map_err(|_| Rejection::InvalidRecord(format!("{what}: expected 32 bytes, got {}", b.len())))
}

// ── 32-byte identifiers ─────────────────────────────────────────

macro_rules! digest_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn from_slice(b: &[u8]) -> Result<Self> {
                array32(b, stringify!($name)).map(Self)
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
                s.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(d)?;
                let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
                Self::from_slice(&bytes).map_err(serde::de::Error::custom)
            }
        }
    };
}

digest_id!(AssetId);
digest_id!(OutputRef);

impl AssetId {
    /// An issued asset is named by the digest of its issuance program.
    pub fn from_issuance_program(program: &Tuple) -> Self {
        Self(program.digest_in(ASSET_CONTEXT))
    }
}

// ── Anchor ──────────────────────────────────────────────────────

/// Uniqueness seed. Splitting appends one branch bit to the path, so a
/// parent and both children can never be structurally equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Anchor {
    pub seed: Vec<u8>,
    pub path: Vec<u8>,
}

impl Anchor {
    pub fn seed(seed: impl Into<Vec<u8>>) -> Self {
        Self { seed: seed.into(), path: Vec::new() }
    }

    pub fn split(&self) -> (Anchor, Anchor) {
        (self.child(0), self.child(1))
    }

    fn child(&self, branch: u8) -> Anchor {
        let mut path = Vec::with_capacity(self.path.len() + 1);
        path.extend_from_slice(&self.path);
        path.push(branch);
        Anchor { seed: self.seed.clone(), path }
    }

    pub fn digest(&self) -> [u8; 32] {
        self.to_tuple().digest_in(ANCHOR_CONTEXT)
    }

    pub fn to_tuple(&self) -> Tuple {
        Tuple::new(vec![Value::Bytes(self.seed.clone()), Value::Bytes(self.path.clone())])
    }

    pub fn from_tuple(t: &Tuple) -> Result<Self> {
        expect_len(t, 2, "anchor")?;
        Ok(Self {
            seed: bytes_field(t, 0, "anchor")?.to_vec(),
            path: bytes_field(t, 1, "anchor")?.to_vec(),
        })
    }
}

// ── Value items ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantity {
    Clear { asset: AssetId, amount: i64 },
    Confidential { asset_commitment: Vec<u8>, value_commitment: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueItem {
    pub quantity: Quantity,
    pub anchor: Anchor,
}

impl ValueItem {
    pub fn clear(asset: AssetId, amount: i64, anchor: Anchor) -> Result<Self> {
        if amount < 0 {
            return Err(Rejection::InvalidAmount(amount));
        }
        Ok(Self { quantity: Quantity::Clear { asset, amount }, anchor })
    }

    pub fn confidential(asset_commitment: Vec<u8>, value_commitment: Vec<u8>, anchor: Anchor) -> Self {
        Self { quantity: Quantity::Confidential { asset_commitment, value_commitment }, anchor }
    }

    /// Asset and amount of a clear item; confidential items must be
    /// revealed before they can be split, merged, retired or output.
    pub fn as_clear(&self) -> Result<(AssetId, i64)> {
        match &self.quantity {
            Quantity::Clear { asset, amount } => Ok((*asset, *amount)),
            Quantity::Confidential { .. } => Err(Rejection::Unrevealed),
        }
    }

    pub fn to_tuple(&self) -> Tuple {
        let anchor = Value::Tuple(self.anchor.to_tuple());
        match &self.quantity {
            Quantity::Clear { asset, amount } => Tuple::new(vec![
                Value::Int64(TAG_CLEAR),
                Value::Bytes(asset.0.to_vec()),
                Value::Int64(*amount),
                anchor,
            ]),
            Quantity::Confidential { asset_commitment, value_commitment } => Tuple::new(vec![
                Value::Int64(TAG_CONFIDENTIAL),
                Value::Bytes(asset_commitment.clone()),
                Value::Bytes(value_commitment.clone()),
                anchor,
            ]),
        }
    }

    pub fn from_tuple(t: &Tuple) -> Result<Self> {
        expect_len(t, 4, "value item")?;
        let anchor = Anchor::from_tuple(tuple_field(t, 3, "value item")?)?;
        match int_field(t, 0, "value item")? {
            TAG_CLEAR => {
                let asset = AssetId::from_slice(bytes_field(t, 1, "value item")?)?;
                let amount = int_field(t, 2, "value item")?;
                Self::clear(asset, amount, anchor)
            }
            TAG_CONFIDENTIAL => Ok(Self::confidential(
                bytes_field(t, 1, "value item")?.to_vec(),
                bytes_field(t, 2, "value item")?.to_vec(),
                anchor,
            )),
            tag => Err(Rejection::InvalidRecord(format!("value item: unknown tag {tag}"))),
        }
    }
}

// ── Outputs and inputs ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub value: ValueItem,
    /// Quoted condition program guarding the output.
    pub condition: Tuple,
}

impl OutputRecord {
    pub fn new(value: ValueItem, condition: Tuple) -> Self {
        Self { value, condition }
    }

    pub fn id(&self) -> OutputRef {
        OutputRef(self.to_tuple().digest_in(OUTPUT_CONTEXT))
    }

    pub fn to_tuple(&self) -> Tuple {
        Tuple::new(vec![
            Value::Tuple(self.value.to_tuple()),
            Value::Tuple(self.condition.clone()),
        ])
    }

    pub fn from_tuple(t: &Tuple) -> Result<Self> {
        expect_len(t, 2, "output")?;
        Ok(Self {
            value: ValueItem::from_tuple(tuple_field(t, 0, "output")?)?,
            condition: tuple_field(t, 1, "output")?.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputRecord {
    pub output: OutputRef,
}

impl InputRecord {
    pub fn to_tuple(&self) -> Tuple {
        Tuple::new(vec![Value::Bytes(self.output.0.to_vec())])
    }

    pub fn from_tuple(t: &Tuple) -> Result<Self> {
        expect_len(t, 1, "input")?;
        Ok(Self { output: OutputRef::from_slice(bytes_field(t, 0, "input")?)? })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub program: Tuple,
}

impl Condition {
    pub fn to_tuple(&self) -> Tuple {
        Tuple::new(vec![Value::Tuple(self.program.clone())])
    }

    pub fn from_tuple(t: &Tuple) -> Result<Self> {
        expect_len(t, 1, "condition")?;
        Ok(Self { program: tuple_field(t, 0, "condition")?.clone() })
    }
}

// ── Nonces and header ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonceRecord {
    pub token: Vec<u8>,
    pub expiry: i64,
}

impl NonceRecord {
    pub fn to_tuple(&self) -> Tuple {
        Tuple::new(vec![Value::Bytes(self.token.clone()), Value::Int64(self.expiry)])
    }

    pub fn from_tuple(t: &Tuple) -> Result<Self> {
        expect_len(t, 2, "nonce")?;
        Ok(Self {
            token: bytes_field(t, 0, "nonce")?.to_vec(),
            expiry: int_field(t, 1, "nonce")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxHeader {
    pub version: i64,
    pub min_time: i64,
    pub max_time: i64,
    pub run_id: [u8; 32],
}

impl TxHeader {
    pub fn to_tuple(&self) -> Tuple {
        Tuple::new(vec![
            Value::Int64(self.version),
            Value::Int64(self.min_time),
            Value::Int64(self.max_time),
            Value::Bytes(self.run_id.to_vec()),
        ])
    }

    pub fn from_tuple(t: &Tuple) -> Result<Self> {
        expect_len(t, 4, "tx header")?;
        Ok(Self {
            version: int_field(t, 0, "tx header")?,
            min_time: int_field(t, 1, "tx header")?,
            max_time: int_field(t, 2, "tx header")?,
            run_id: array32(bytes_field(t, 3, "tx header")?, "tx header")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset() -> AssetId {
        AssetId([7; 32])
    }

    #[test]
    fn anchor_split_children_are_distinct() {
        let a = Anchor::seed(b"seed".to_vec());
        let (l, r) = a.split();
        assert_ne!(l, r);
        assert_ne!(l, a);
        assert_ne!(r, a);
        assert_ne!(l.digest(), r.digest());
    }

    #[test]
    fn value_item_tuple_layout() {
        let item = ValueItem::clear(asset(), 10, Anchor::seed(vec![1])).unwrap();
        let t = item.to_tuple();
        assert_eq!(t.get(0), Some(&Value::Int64(0)));
        assert_eq!(t.get(2), Some(&Value::Int64(10)));
        assert_eq!(ValueItem::from_tuple(&t).unwrap(), item);
    }

    #[test]
    fn negative_amount_rejected() {
        assert_eq!(
            ValueItem::clear(asset(), -1, Anchor::seed(vec![])),
            Err(Rejection::InvalidAmount(-1))
        );
    }

    #[test]
    fn confidential_item_is_not_clear() {
        let item = ValueItem::confidential(vec![1], vec![2], Anchor::seed(vec![3]));
        assert_eq!(item.as_clear(), Err(Rejection::Unrevealed));
        assert_eq!(ValueItem::from_tuple(&item.to_tuple()).unwrap(), item);
    }

    #[test]
    fn malformed_records_rejected() {
        let short = Tuple::new(vec![Value::Int64(0)]);
        assert!(matches!(ValueItem::from_tuple(&short), Err(Rejection::InvalidRecord(_))));
        let bad_tag = Tuple::new(vec![
            Value::Int64(9),
            Value::Bytes(vec![]),
            Value::Bytes(vec![]),
            Value::Tuple(Anchor::seed(vec![]).to_tuple()),
        ]);
        assert!(matches!(ValueItem::from_tuple(&bad_tag), Err(Rejection::InvalidRecord(_))));
        let short_ref = Tuple::new(vec![Value::Bytes(vec![0; 31])]);
        assert!(InputRecord::from_tuple(&short_ref).is_err());
    }

    #[test]
    fn output_id_depends_on_condition() {
        let item = ValueItem::clear(asset(), 3, Anchor::seed(vec![1])).unwrap();
        let a = OutputRecord::new(item.clone(), Tuple::new(vec![Value::Int64(1)]));
        let b = OutputRecord::new(item, Tuple::new(vec![Value::Int64(2)]));
        assert_ne!(a.id(), b.id());
        assert_eq!(OutputRecord::from_tuple(&a.to_tuple()).unwrap(), a);
    }

    #[test]
    fn ids_serialize_as_hex() {
        let json = serde_json::to_string(&asset()).unwrap();
        assert_eq!(json, format!("\"{}\"", "07".repeat(32)));
        let back: AssetId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, asset());
    }
}
