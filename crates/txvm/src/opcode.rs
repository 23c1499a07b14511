//! Instruction set.
//!
//! Programs can be quoted into values (a tuple of `(code, operands…)`
//! tuples) so condition programs can be carried inside records. This is
//! the in-VM form only; byte encodings belong to the encoding layer.

use crate::bank::StackId;
use crate::error::Rejection;
use crate::value::{Tuple, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    // scratch
    Push = 0x01,
    Drop = 0x02,
    Dup = 0x03,
    ToAlt = 0x04,
    FromAlt = 0x05,
    // reordering and introspection
    Roll = 0x08,
    Bury = 0x09,
    Inspect = 0x0a,
    Len = 0x0b,
    // computation
    Add = 0x10,
    Sub = 0x11,
    Eq = 0x12,
    Verify = 0x13,
    MakeTuple = 0x14,
    Untuple = 0x15,
    Field = 0x16,
    Hash = 0x17,
    CheckSig = 0x18,
    RunId = 0x19,
    // conditions
    Defer = 0x20,
    Satisfy = 0x21,
    // value class
    Spend = 0x30,
    Issue = 0x31,
    Split = 0x32,
    Merge = 0x33,
    Retire = 0x34,
    Output = 0x35,
    Reveal = 0x36,
    SplitAnchor = 0x37,
    Nonce = 0x38,
    Header = 0x39,
    Mux = 0x3a,
    Demux = 0x3b,
}

impl Opcode {
    pub const ALL: [Opcode; 33] = [
        Opcode::Push,
        Opcode::Drop,
        Opcode::Dup,
        Opcode::ToAlt,
        Opcode::FromAlt,
        Opcode::Roll,
        Opcode::Bury,
        Opcode::Inspect,
        Opcode::Len,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Eq,
        Opcode::Verify,
        Opcode::MakeTuple,
        Opcode::Untuple,
        Opcode::Field,
        Opcode::Hash,
        Opcode::CheckSig,
        Opcode::RunId,
        Opcode::Defer,
        Opcode::Satisfy,
        Opcode::Spend,
        Opcode::Issue,
        Opcode::Split,
        Opcode::Merge,
        Opcode::Retire,
        Opcode::Output,
        Opcode::Reveal,
        Opcode::SplitAnchor,
        Opcode::Nonce,
        Opcode::Header,
        Opcode::Mux,
        Opcode::Demux,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Opcode> {
        Opcode::ALL.iter().copied().find(|op| op.code() == code)
    }

    /// Value-class opcodes are the only ones allowed to mutate record
    /// stacks, and they are unavailable inside condition scopes.
    pub fn is_value_class(self) -> bool {
        self.code() >= 0x30
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instr {
    Push(Value),
    Drop,
    Dup,
    ToAlt,
    FromAlt,
    Roll { stack: StackId, depth: usize },
    Bury { stack: StackId, depth: usize },
    Inspect { stack: StackId, depth: usize },
    Len { stack: StackId },
    Add,
    Sub,
    Eq,
    Verify,
    MakeTuple(usize),
    Untuple,
    Field(usize),
    Hash,
    CheckSig,
    RunId,
    Defer,
    Satisfy { args: usize },
    Spend,
    Issue,
    Split,
    Merge,
    Retire,
    Output,
    Reveal,
    SplitAnchor,
    Nonce,
    Header,
    Mux(usize),
    Demux,
}

impl Instr {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instr::Push(_) => Opcode::Push,
            Instr::Drop => Opcode::Drop,
            Instr::Dup => Opcode::Dup,
            Instr::ToAlt => Opcode::ToAlt,
            Instr::FromAlt => Opcode::FromAlt,
            Instr::Roll { .. } => Opcode::Roll,
            Instr::Bury { .. } => Opcode::Bury,
            Instr::Inspect { .. } => Opcode::Inspect,
            Instr::Len { .. } => Opcode::Len,
            Instr::Add => Opcode::Add,
            Instr::Sub => Opcode::Sub,
            Instr::Eq => Opcode::Eq,
            Instr::Verify => Opcode::Verify,
            Instr::MakeTuple(_) => Opcode::MakeTuple,
            Instr::Untuple => Opcode::Untuple,
            Instr::Field(_) => Opcode::Field,
            Instr::Hash => Opcode::Hash,
            Instr::CheckSig => Opcode::CheckSig,
            Instr::RunId => Opcode::RunId,
            Instr::Defer => Opcode::Defer,
            Instr::Satisfy { .. } => Opcode::Satisfy,
            Instr::Spend => Opcode::Spend,
            Instr::Issue => Opcode::Issue,
            Instr::Split => Opcode::Split,
            Instr::Merge => Opcode::Merge,
            Instr::Retire => Opcode::Retire,
            Instr::Output => Opcode::Output,
            Instr::Reveal => Opcode::Reveal,
            Instr::SplitAnchor => Opcode::SplitAnchor,
            Instr::Nonce => Opcode::Nonce,
            Instr::Header => Opcode::Header,
            Instr::Mux(_) => Opcode::Mux,
            Instr::Demux => Opcode::Demux,
        }
    }

    pub fn to_value(&self) -> Value {
        let code = Value::Int64(self.opcode().code() as i64);
        let operands: Vec<Value> = match self {
            Instr::Push(v) => vec![v.clone()],
            Instr::Roll { stack, depth }
            | Instr::Bury { stack, depth }
            | Instr::Inspect { stack, depth } => {
                vec![Value::Int64(stack.code() as i64), usize_value(*depth)]
            }
            Instr::Len { stack } => vec![Value::Int64(stack.code() as i64)],
            Instr::MakeTuple(n) | Instr::Field(n) | Instr::Mux(n) => vec![usize_value(*n)],
            Instr::Satisfy { args } => vec![usize_value(*args)],
            _ => vec![],
        };
        let mut fields = Vec::with_capacity(1 + operands.len());
        fields.push(code);
        fields.extend(operands);
        Value::Tuple(Tuple::new(fields))
    }

    pub fn from_value(v: &Value) -> Result<Instr, Rejection> {
        let t = v
            .as_tuple()
            .ok_or_else(|| malformed("instruction must be a tuple"))?;
        let code = t
            .get(0)
            .and_then(Value::as_int64)
            .and_then(|c| u8::try_from(c).ok())
            .ok_or_else(|| malformed("instruction code must be a small int64"))?;
        let op = Opcode::from_code(code).ok_or_else(|| malformed(&format!("unknown opcode {code:#04x}")))?;
        let arity = match op {
            Opcode::Push
            | Opcode::Len
            | Opcode::MakeTuple
            | Opcode::Field
            | Opcode::Mux
            | Opcode::Satisfy => 1,
            Opcode::Roll | Opcode::Bury | Opcode::Inspect => 2,
            _ => 0,
        };
        if t.len() != 1 + arity {
            return Err(malformed(&format!("{op:?} takes {arity} operand(s)")));
        }
        let instr = match op {
            Opcode::Push => Instr::Push(t.get(1).cloned().ok_or_else(|| malformed("push operand"))?),
            Opcode::Drop => Instr::Drop,
            Opcode::Dup => Instr::Dup,
            Opcode::ToAlt => Instr::ToAlt,
            Opcode::FromAlt => Instr::FromAlt,
            Opcode::Roll => Instr::Roll { stack: stack_operand(t)?, depth: usize_operand(t, 2)? },
            Opcode::Bury => Instr::Bury { stack: stack_operand(t)?, depth: usize_operand(t, 2)? },
            Opcode::Inspect => Instr::Inspect { stack: stack_operand(t)?, depth: usize_operand(t, 2)? },
            Opcode::Len => Instr::Len { stack: stack_operand(t)? },
            Opcode::Add => Instr::Add,
            Opcode::Sub => Instr::Sub,
            Opcode::Eq => Instr::Eq,
            Opcode::Verify => Instr::Verify,
            Opcode::MakeTuple => Instr::MakeTuple(usize_operand(t, 1)?),
            Opcode::Untuple => Instr::Untuple,
            Opcode::Field => Instr::Field(usize_operand(t, 1)?),
            Opcode::Hash => Instr::Hash,
            Opcode::CheckSig => Instr::CheckSig,
            Opcode::RunId => Instr::RunId,
            Opcode::Defer => Instr::Defer,
            Opcode::Satisfy => Instr::Satisfy { args: usize_operand(t, 1)? },
            Opcode::Spend => Instr::Spend,
            Opcode::Issue => Instr::Issue,
            Opcode::Split => Instr::Split,
            Opcode::Merge => Instr::Merge,
            Opcode::Retire => Instr::Retire,
            Opcode::Output => Instr::Output,
            Opcode::Reveal => Instr::Reveal,
            Opcode::SplitAnchor => Instr::SplitAnchor,
            Opcode::Nonce => Instr::Nonce,
            Opcode::Header => Instr::Header,
            Opcode::Mux => Instr::Mux(usize_operand(t, 1)?),
            Opcode::Demux => Instr::Demux,
        };
        Ok(instr)
    }
}

fn malformed(msg: &str) -> Rejection {
    Rejection::InvalidRecord(format!("program: {msg}"))
}

fn usize_value(n: usize) -> Value {
    Value::Int64(i64::try_from(n).unwrap_or(i64::MAX))
}

fn usize_operand(t: &Tuple, i: usize) -> Result<usize, Rejection> {
    t.get(i)
        .and_then(Value::as_int64)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| malformed(&format!("operand {i} must be a non-negative int64")))
}

fn stack_operand(t: &Tuple) -> Result<StackId, Rejection> {
    let n = t
        .get(1)
        .and_then(Value::as_int64)
        .ok_or_else(|| malformed("stack operand must be int64"))?;
    StackId::try_from(n)
}

/// An ordered sequence of instructions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program(Vec<Instr>);

impl Program {
    pub fn new(instrs: Vec<Instr>) -> Self {
        Self(instrs)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn instrs(&self) -> &[Instr] {
        &self.0
    }

    /// Quoted form, suitable for records and for `Push`.
    pub fn to_tuple(&self) -> Tuple {
        self.0.iter().map(Instr::to_value).collect()
    }

    pub fn to_value(&self) -> Value {
        Value::Tuple(self.to_tuple())
    }

    pub fn from_tuple(t: &Tuple) -> Result<Self, Rejection> {
        t.iter().map(Instr::from_value).collect::<Result<Vec<_>, _>>().map(Self)
    }
}

impl From<Vec<Instr>> for Program {
    fn from(instrs: Vec<Instr>) -> Self {
        Self(instrs)
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a Instr;
    type IntoIter = std::slice::Iter<'a, Instr>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_codes_are_unique() {
        for (i, a) in Opcode::ALL.iter().enumerate() {
            assert_eq!(Opcode::from_code(a.code()), Some(*a));
            for b in &Opcode::ALL[i + 1..] {
                assert_ne!(a.code(), b.code(), "{a:?} vs {b:?}");
            }
        }
        assert_eq!(Opcode::from_code(0xff), None);
    }

    #[test]
    fn value_class_boundary() {
        assert!(Opcode::Spend.is_value_class());
        assert!(Opcode::Header.is_value_class());
        assert!(!Opcode::Roll.is_value_class());
        assert!(!Opcode::Satisfy.is_value_class());
    }

    #[test]
    fn quoted_program_unquotes() {
        let inner = Program::new(vec![Instr::Push(Value::Int64(1))]);
        let p = Program::new(vec![
            Instr::Push(inner.to_value()),
            Instr::Roll { stack: StackId::Value, depth: 3 },
            Instr::MakeTuple(2),
            Instr::Satisfy { args: 1 },
            Instr::Mux(4),
            Instr::Header,
        ]);
        assert_eq!(Program::from_tuple(&p.to_tuple()).unwrap(), p);
    }

    #[test]
    fn malformed_instructions_rejected() {
        let cases = vec![
            Value::Int64(1),
            Value::Tuple(Tuple::new(vec![Value::Int64(0xff)])),
            Value::Tuple(Tuple::new(vec![Value::Int64(Opcode::Drop.code() as i64), Value::Int64(1)])),
            Value::Tuple(Tuple::new(vec![
                Value::Int64(Opcode::Roll.code() as i64),
                Value::Int64(99),
                Value::Int64(0),
            ])),
            Value::Tuple(Tuple::new(vec![Value::Int64(Opcode::MakeTuple.code() as i64), Value::Int64(-1)])),
        ];
        for v in cases {
            assert!(
                matches!(Instr::from_value(&v), Err(Rejection::InvalidRecord(_))),
                "accepted {v}"
            );
        }
    }
}
