// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Builtin function registry for relq.
//!
//! [`StandardFunctionFinder`] resolves call names to validated
//! appliers: the row-local builtins (`coalesce`, `iif`, `random`,
//! `self`), the aggregates (`count`, `first`, `last`, `min`, `max`,
//! `sum`, `avg`, `grn`), and their window forms when a call carries a
//! `rows`/`groups`/`range` frame argument.

pub mod builtin;
pub mod registry;

// Re-exports for convenience
pub use registry::StandardFunctionFinder;
