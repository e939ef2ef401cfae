//! Data access for the meal plan hierarchy.
//!
//! Connection pooling, embedded migrations, row models and one query module
//! per table. Query functions that participate in a caller's transaction take
//! a `&mut PgConnection`; read-only scans take the pool.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
