//! Row structs for the record tables.
//!
//! Each submodule contains a `FromRow` entity struct matching the database
//! row and the conversion into its domain type.

pub mod order;
pub mod variation_task;
