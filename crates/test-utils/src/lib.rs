// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Testing utilities for relq
//!
//! This crate provides common testing components including:
//! - An in-memory storage double with native view recording
//! - Row and schema fixtures for the end-to-end scenarios
//! - Scanner collection helpers

pub mod fixtures;
pub mod mem_table;

// Re-exports for convenience
pub use fixtures::{collect, column_values, employee, employee_type, employees, series};
pub use mem_table::MemTable;
