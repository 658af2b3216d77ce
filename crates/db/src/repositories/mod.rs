//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods.
//! Reads take `&PgPool`; writes that must share a transaction take
//! `&mut PgConnection`.

pub mod order_repo;
pub mod variation_task_repo;

pub use order_repo::OrderRepo;
pub use variation_task_repo::VariationTaskRepo;
