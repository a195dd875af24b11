// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Columns
//!
//! A column is a named, typed slot in a tuple type. Column names may
//! contain dots, which the query surface uses for subpath access into
//! tuple-typed columns; a name that itself contains a dot is quoted with
//! backticks wherever it is printed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ty::Type;

/// A named, typed member of a tuple type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    /// Column name, unique within its tuple type
    pub name: String,
    /// Column type
    pub ty: Type,
    /// Hidden columns are carried through plans but stripped from results
    pub hidden: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            hidden: false,
        }
    }

    /// Builder method: mark the column hidden
    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// The column name as it appears in query text, quoted if needed.
    pub fn printed_name(&self) -> String {
        escape_name(&self.name)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.printed_name(), self.ty)
    }
}

/// Quote an identifier for query text when it would not lex as a plain
/// identifier: a name containing a dot would otherwise read as a subpath.
pub fn escape_name(name: &str) -> String {
    let plain = !name.is_empty()
        && name
            .chars()
            .enumerate()
            .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()));
    if plain {
        name.to_string()
    } else {
        let mut quoted = String::with_capacity(name.len() + 2);
        quoted.push('`');
        for c in name.chars() {
            if c == '`' {
                quoted.push('`');
            }
            quoted.push(c);
        }
        quoted.push('`');
        quoted
    }
}

/// Split a dotted path into segments. Backtick-quoted segments keep their
/// dots. The inverse of joining printed names with `.`.
pub fn split_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();
    let mut quoted = false;
    while let Some(c) = chars.next() {
        match c {
            '`' => {
                if quoted && chars.peek() == Some(&'`') {
                    chars.next();
                    current.push('`');
                } else {
                    quoted = !quoted;
                }
            }
            '.' if !quoted => {
                segments.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::Primitive;

    #[test]
    fn test_plain_name_not_quoted() {
        assert_eq!(escape_name("salary"), "salary");
        assert_eq!(escape_name("a_1"), "a_1");
    }

    #[test]
    fn test_dotted_name_quoted() {
        assert_eq!(escape_name("addr.city"), "`addr.city`");
        assert_eq!(escape_name("1st"), "`1st`");
    }

    #[test]
    fn test_split_path_roundtrip() {
        assert_eq!(split_path("a.b.c"), vec!["a", "b", "c"]);
        assert_eq!(split_path("`addr.city`"), vec!["addr.city"]);
        assert_eq!(split_path("a.`b.c`.d"), vec!["a", "b.c", "d"]);
    }

    #[test]
    fn test_column_display() {
        let col = Column::new("addr.city", Type::basic(Primitive::Text));
        assert_eq!(col.to_string(), "`addr.city`: string");
    }
}
