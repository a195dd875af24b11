// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Source spans for diagnostics.
//!
//! Every expression node records the source offsets it was parsed from.
//! Spans deliberately compare equal and hash to nothing, so derived
//! `PartialEq`/`Hash` on expression nodes are purely structural: two
//! expressions parsed from different positions are still the same
//! expression.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Byte offsets `[start, end)` into the query source
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// The smallest span covering both operands.
    pub fn cover(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl PartialEq for Span {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl Eq for Span {}

impl Hash for Span {
    fn hash<H: Hasher>(&self, _: &mut H) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_compare_equal() {
        assert_eq!(Span::new(0, 3), Span::new(10, 20));
    }

    #[test]
    fn test_cover() {
        let s = Span::new(3, 5).cover(Span::new(1, 4));
        assert_eq!((s.start, s.end), (1, 5));
    }
}
