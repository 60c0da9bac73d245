//! Row types for every table in the control, domain, and projection planes.
//!
//! Grouped the way the schema groups them (see `migrations/001_init.sql`),
//! not alphabetically — control-plane rows first since everything else
//! hangs off a `repository_id`.

pub mod control;
pub mod domain;
pub mod projection;

pub use control::*;
pub use domain::*;
pub use projection::*;

use serde::Serialize;

/// Thin wrapper so every JSON response body has the same top-level shape.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// A bounded, cursor-based page of rows, used by the list reads in §4.18.
#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}
