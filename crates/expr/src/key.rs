// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Cache-key encoding
//!
//! Every expression encodes to a canonical byte string used as the key
//! of the compiled-artifact cache. Two expressions produce the same key
//! exactly when they are structurally equal ignoring source positions —
//! key equality is a strict refinement of `==`.
//!
//! Each node kind writes its discriminant byte first. Strings are
//! length-prefixed, integers use LEB128 varints, floats encode as raw
//! bits, and big numbers as length-prefixed magnitude bytes.

use num_bigint::BigInt;

use relq_types::{Primitive, TupleType, Type, Value};

use crate::expr::Expr;
use crate::filter::RowFilter;

/// Node discriminants. Each AST variant owns one stable byte; relation
/// nodes in the planner continue the numbering.
pub mod k {
    pub const CONSTANT: u8 = 1;
    pub const PARAM: u8 = 2;
    pub const COLUMN: u8 = 3;
    pub const VAR: u8 = 4;
    pub const ASSIGN: u8 = 5;
    pub const CONVERSION: u8 = 6;
    pub const PROJ: u8 = 7;
    pub const NOT: u8 = 8;
    pub const BINARY: u8 = 9;
    pub const IN: u8 = 10;
    pub const RANGE: u8 = 11;
    pub const CALL: u8 = 12;
    pub const FILTER_TRUE: u8 = 13;
    pub const FILTER_FALSE: u8 = 14;
    pub const FILTER_AND: u8 = 15;
    pub const FILTER_OR: u8 = 16;
    pub const FILTER_ATOM: u8 = 17;
    pub const TABLE: u8 = 18;
    pub const QUERY_UNMAPPED: u8 = 19;
    pub const QUERY_MAPPED: u8 = 20;
    pub const QUERY_AGGREGATED: u8 = 21;
    pub const QUERY_GROUPED: u8 = 22;
}

/// Canonical byte-string builder
#[derive(Debug, Default)]
pub struct KeyEncoder {
    buf: Vec<u8>,
}

impl KeyEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, b: u8) {
        self.buf.push(b);
    }

    /// LEB128 unsigned varint.
    pub fn write_varint(&mut self, mut v: u64) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }

    /// Zigzag-encoded signed varint.
    pub fn write_svarint(&mut self, v: i64) {
        self.write_varint(((v << 1) ^ (v >> 63)) as u64);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    pub fn write_bool(&mut self, b: bool) {
        self.buf.push(b as u8);
    }

    pub fn write_value(&mut self, value: &Value) {
        match value {
            Value::Null => self.write_u8(0),
            Value::Boolean(v) => {
                self.write_u8(1);
                self.write_bool(*v);
            }
            Value::Byte(v) => {
                self.write_u8(2);
                self.write_svarint(*v as i64);
            }
            Value::Short(v) => {
                self.write_u8(3);
                self.write_svarint(*v as i64);
            }
            Value::Int(v) => {
                self.write_u8(4);
                self.write_svarint(*v as i64);
            }
            Value::Long(v) => {
                self.write_u8(5);
                self.write_svarint(*v);
            }
            Value::UByte(v) => {
                self.write_u8(6);
                self.write_varint(*v as u64);
            }
            Value::UShort(v) => {
                self.write_u8(7);
                self.write_varint(*v as u64);
            }
            Value::UInt(v) => {
                self.write_u8(8);
                self.write_varint(*v as u64);
            }
            Value::ULong(v) => {
                self.write_u8(9);
                self.write_varint(*v);
            }
            Value::Float(v) => {
                self.write_u8(10);
                self.buf.extend_from_slice(&v.to_bits().to_le_bytes());
            }
            Value::Double(v) => {
                self.write_u8(11);
                self.buf.extend_from_slice(&v.to_bits().to_le_bytes());
            }
            Value::BigInteger(v) => {
                self.write_u8(12);
                self.write_big(v);
            }
            Value::BigDecimal(v) => {
                self.write_u8(13);
                let (digits, scale) = v.as_bigint_and_exponent();
                self.write_big(&digits);
                self.write_svarint(scale);
            }
            Value::Text(v) => {
                self.write_u8(14);
                self.write_str(v);
            }
            Value::Char(v) => {
                self.write_u8(15);
                self.write_varint(*v as u64);
            }
            Value::Range(r) => {
                self.write_u8(16);
                self.write_value(&r.start);
                self.write_value(&r.end);
            }
        }
    }

    fn write_big(&mut self, v: &BigInt) {
        self.write_bytes(&v.to_signed_bytes_le());
    }

    pub fn write_type(&mut self, ty: &Type) {
        match ty {
            Type::Any => self.write_u8(0),
            Type::Basic(b) => {
                self.write_u8(1);
                self.write_u8(primitive_code(b.primitive));
                self.write_bool(b.nullable);
            }
            Type::Tuple(t) => {
                self.write_u8(2);
                self.write_tuple_type(t);
            }
            Type::Relation(r) => {
                self.write_u8(3);
                self.write_tuple_type(&r.row_type);
                self.write_u8(r.cardinality as u8);
            }
            Type::Range(e) => {
                self.write_u8(4);
                self.write_type(e);
            }
        }
    }

    pub fn write_tuple_type(&mut self, tuple: &TupleType) {
        self.write_varint(tuple.len() as u64);
        for col in tuple.columns() {
            self.write_str(&col.name);
            self.write_type(&col.ty);
            self.write_bool(col.hidden);
        }
    }
}

fn primitive_code(p: Primitive) -> u8 {
    match p {
        Primitive::Boolean => 0,
        Primitive::Byte => 1,
        Primitive::Short => 2,
        Primitive::Int => 3,
        Primitive::Long => 4,
        Primitive::UByte => 5,
        Primitive::UShort => 6,
        Primitive::UInt => 7,
        Primitive::ULong => 8,
        Primitive::Float => 9,
        Primitive::Double => 10,
        Primitive::BigInteger => 11,
        Primitive::BigDecimal => 12,
        Primitive::Text => 13,
        Primitive::Char => 14,
    }
}

impl Expr {
    /// Append this expression's canonical encoding.
    pub fn encode_key(&self, enc: &mut KeyEncoder) {
        match self {
            Expr::Constant(e) => {
                enc.write_u8(k::CONSTANT);
                enc.write_value(&e.value);
                enc.write_type(&e.ty);
            }
            Expr::Param(e) => {
                enc.write_u8(k::PARAM);
                enc.write_varint(e.ordinal as u64);
            }
            Expr::Column(e) => {
                enc.write_u8(k::COLUMN);
                enc.write_varint(e.path.len() as u64);
                for seg in &e.path {
                    enc.write_str(seg);
                }
            }
            Expr::Var(e) => {
                enc.write_u8(k::VAR);
                enc.write_str(&e.name);
            }
            Expr::Assign(e) => {
                enc.write_u8(k::ASSIGN);
                enc.write_str(&e.name);
                e.expr.encode_key(enc);
            }
            Expr::Conversion(e) => {
                enc.write_u8(k::CONVERSION);
                e.expr.encode_key(enc);
                enc.write_type(&e.ty);
            }
            Expr::Not(e) => {
                enc.write_u8(k::NOT);
                e.expr.encode_key(enc);
            }
            Expr::Binary(e) => {
                enc.write_u8(k::BINARY);
                enc.write_u8(e.op as u8);
                e.left.encode_key(enc);
                e.right.encode_key(enc);
            }
            Expr::In(e) => {
                enc.write_u8(k::IN);
                e.value.encode_key(enc);
                e.range.encode_key(enc);
            }
            Expr::Range(e) => {
                enc.write_u8(k::RANGE);
                match &e.start {
                    Some(s) => {
                        enc.write_bool(true);
                        s.encode_key(enc);
                    }
                    None => enc.write_bool(false),
                }
                match &e.end {
                    Some(s) => {
                        enc.write_bool(true);
                        s.encode_key(enc);
                    }
                    None => enc.write_bool(false),
                }
            }
            Expr::Call(e) => {
                enc.write_u8(k::CALL);
                enc.write_str(&e.name);
                enc.write_varint(e.args.len() as u64);
                for a in &e.args {
                    a.encode_key(enc);
                }
                enc.write_varint(e.named_args.len() as u64);
                for (n, a) in &e.named_args {
                    enc.write_str(n);
                    a.encode_key(enc);
                }
            }
        }
    }
}

impl RowFilter {
    /// Append this filter's canonical encoding.
    pub fn encode_key(&self, enc: &mut KeyEncoder) {
        match self {
            RowFilter::True => enc.write_u8(k::FILTER_TRUE),
            RowFilter::False => enc.write_u8(k::FILTER_FALSE),
            RowFilter::And(children) => {
                enc.write_u8(k::FILTER_AND);
                enc.write_varint(children.len() as u64);
                for c in children {
                    c.encode_key(enc);
                }
            }
            RowFilter::Or(children) => {
                enc.write_u8(k::FILTER_OR);
                enc.write_varint(children.len() as u64);
                for c in children {
                    c.encode_key(enc);
                }
            }
            other => {
                enc.write_u8(k::FILTER_ATOM);
                other.to_expr(crate::span::Span::default()).encode_key(enc);
            }
        }
    }
}
