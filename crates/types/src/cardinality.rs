// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Relation cardinality tracking for planned queries.

use serde::{Deserialize, Serialize};

/// How many rows a relation may produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    /// Provably empty
    Zero,
    /// Exactly one row
    One,
    /// Zero or more rows
    Many,
}

impl Cardinality {
    /// Cardinality after applying a row filter. A non-trivial filter can
    /// reject the single row of a `One` relation, so the result widens to
    /// `Many` (zero-or-one has no dedicated representation).
    pub fn filter(self, non_trivial: bool) -> Cardinality {
        match self {
            Cardinality::Zero => Cardinality::Zero,
            Cardinality::One if non_trivial => Cardinality::Many,
            other => other,
        }
    }
}
