// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Rows
//!
//! A row pairs a shared tuple type with one value per column. Rows are
//! the dynamic row representation flowing between the storage layer and
//! the compiled operators.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};
use crate::tuple::TupleType;
use crate::value::Value;

/// One tuple of values with a shared schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    schema: Arc<TupleType>,
    values: Box<[Value]>,
}

impl Row {
    /// Build a row, checking the value count against the schema.
    pub fn new(schema: Arc<TupleType>, values: Vec<Value>) -> TypeResult<Self> {
        if values.len() != schema.len() {
            return Err(TypeError::RowWidthMismatch {
                expected: schema.len(),
                found: values.len(),
            });
        }
        Ok(Self {
            schema,
            values: values.into_boxed_slice(),
        })
    }

    pub fn schema(&self) -> &Arc<TupleType> {
        &self.schema
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, index: usize) -> &Value {
        &self.values[index]
    }

    /// Value of a named column, by exact name.
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).map(|i| &self.values[i])
    }

    pub fn set(&mut self, index: usize, value: Value) {
        self.values[index] = value;
    }

    /// A row of the same shape with every value null. Used as the seed
    /// for target rows filled column by column.
    pub fn null_row(schema: Arc<TupleType>) -> Row {
        let values = vec![Value::Null; schema.len()].into_boxed_slice();
        Row { schema, values }
    }

    /// Project this row onto a narrower schema by column name.
    pub fn project(&self, target: &Arc<TupleType>) -> TypeResult<Row> {
        let mut values = Vec::with_capacity(target.len());
        for col in target.columns() {
            let v = self
                .get_named(&col.name)
                .ok_or_else(|| TypeError::UnknownColumn(col.name.clone()))?;
            values.push(v.clone());
        }
        Row::new(Arc::clone(target), values)
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{v}")?;
        }
        f.write_str(")")
    }
}
