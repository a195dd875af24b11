// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Tuple types
//!
//! A tuple type is an ordered list of named columns with unique names and
//! deterministic iteration order. Row shapes for tables, projections and
//! aggregation targets are all tuple types.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::column::Column;
use crate::error::{TypeError, TypeResult};
use crate::ty::Type;

/// An ordered list of named columns
#[derive(Debug, Clone)]
pub struct TupleType {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
}

impl TupleType {
    /// Build a tuple type, rejecting duplicate column names.
    pub fn new(columns: Vec<Column>) -> TypeResult<Self> {
        let mut index = HashMap::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            if index.insert(col.name.clone(), i).is_some() {
                return Err(TypeError::DuplicateColumn(col.name.clone()));
            }
        }
        Ok(Self { columns, index })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, i: usize) -> &Column {
        &self.columns[i]
    }

    /// Position of a column by exact name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Column by exact name, if present.
    pub fn try_column_for(&self, name: &str) -> Option<&Column> {
        self.index_of(name).map(|i| &self.columns[i])
    }

    /// Resolve a dotted path, descending into tuple-typed columns. Longer
    /// literal names win over subpaths: a column literally named `a.b` is
    /// found before a column `a` with member `b`.
    pub fn try_find_column(&self, path: &str) -> Option<&Column> {
        if let Some(col) = self.try_column_for(path) {
            return Some(col);
        }
        let mut split = path.len();
        while let Some(dot) = path[..split].rfind('.') {
            split = dot;
            if let Some(head) = self.try_column_for(&path[..dot]) {
                if let Type::Tuple(inner) = &head.ty {
                    if let Some(col) = inner.try_find_column(&path[dot + 1..]) {
                        return Some(col);
                    }
                }
            }
        }
        None
    }

    /// True when this tuple type has exactly the projected columns, in
    /// the projected order.
    pub fn matches(&self, projection: &[&str]) -> bool {
        self.columns.len() == projection.len()
            && self
                .columns
                .iter()
                .zip(projection)
                .all(|(col, name)| col.name == *name)
    }

    /// True when every projected column exists here, regardless of order.
    pub fn can_represent(&self, projection: &[&str]) -> bool {
        projection.iter().all(|name| self.index.contains_key(*name))
    }

    /// A new tuple type with the projected columns, in projection order.
    pub fn project(&self, projection: &[&str]) -> TypeResult<TupleType> {
        let mut columns = Vec::with_capacity(projection.len());
        for name in projection {
            let col = self
                .try_column_for(name)
                .ok_or_else(|| TypeError::CannotRepresent((*name).to_string()))?;
            columns.push(col.clone());
        }
        TupleType::new(columns)
    }

    /// The tuple type with every column made nullable.
    pub fn nullable(&self) -> TupleType {
        let columns = self
            .columns
            .iter()
            .map(|col| Column {
                name: col.name.clone(),
                ty: col.ty.nullable(),
                hidden: col.hidden,
            })
            .collect();
        TupleType::new(columns).expect("names unchanged")
    }

    /// Shared handle constructor, the common case for row types.
    pub fn shared(columns: Vec<Column>) -> TypeResult<Arc<TupleType>> {
        Ok(Arc::new(TupleType::new(columns)?))
    }
}

// Equality and hashing are over the column list alone; the name index is
// derived state.
impl PartialEq for TupleType {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

impl Eq for TupleType {}

impl Hash for TupleType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.columns.hash(state);
    }
}

// Serialized as the bare column list; the name index is derived state.
impl Serialize for TupleType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.columns.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TupleType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let columns = Vec::<Column>::deserialize(deserializer)?;
        TupleType::new(columns).map_err(D::Error::custom)
    }
}

impl fmt::Display for TupleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{col}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::Primitive;

    fn sample() -> TupleType {
        TupleType::new(vec![
            Column::new("id", Type::basic(Primitive::Long)),
            Column::new("name", Type::basic(Primitive::Text)),
            Column::new("salary", Type::basic_nullable(Primitive::Double)),
        ])
        .unwrap()
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = TupleType::new(vec![
            Column::new("a", Type::basic(Primitive::Int)),
            Column::new("a", Type::basic(Primitive::Int)),
        ])
        .unwrap_err();
        assert_eq!(err, TypeError::DuplicateColumn("a".into()));
    }

    #[test]
    fn test_lookup_and_project() {
        let t = sample();
        assert_eq!(t.index_of("name"), Some(1));
        assert!(t.try_column_for("missing").is_none());

        let p = t.project(&["salary", "id"]).unwrap();
        assert!(p.matches(&["salary", "id"]));
        assert!(!p.matches(&["id", "salary"]));
        assert!(t.can_represent(&["salary", "id"]));
        assert!(!t.can_represent(&["salary", "missing"]));
    }

    #[test]
    fn test_find_column_subpath() {
        let inner = TupleType::shared(vec![
            Column::new("city", Type::basic(Primitive::Text)),
            Column::new("zip", Type::basic(Primitive::Int)),
        ])
        .unwrap();
        let t = TupleType::new(vec![
            Column::new("id", Type::basic(Primitive::Long)),
            Column::new("addr", Type::Tuple(inner)),
            Column::new("addr.note", Type::basic(Primitive::Text)),
        ])
        .unwrap();

        assert_eq!(t.try_find_column("addr.city").unwrap().name, "city");
        // Literal dotted name wins over a subpath descent.
        assert_eq!(t.try_find_column("addr.note").unwrap().name, "addr.note");
        assert!(t.try_find_column("addr.street").is_none());
    }

    #[test]
    fn test_nullable_tuple() {
        let t = sample().nullable();
        assert!(t.columns().iter().all(|c| c.ty.is_nullable()));
    }

    #[test]
    fn test_equality_ignores_index() {
        let a = sample();
        let b = sample();
        assert_eq!(a, b);
    }
}
