//! Hierarchy-consistency engine for meal, daily and weekly plans.
//!
//! - [`allocator`]: `max + 1` identifier allocation, serialized per table.
//! - [`resolver`]: find-or-create the weekly bucket for a date.
//! - [`cascade`]: atomic cascading deletes across the three levels.
//! - [`pagination`]: first/last/next/previous links for list endpoints.
//! - [`service`]: the operation set exposed to the HTTP layer.
//! - [`tasks`]: registry of fire-and-forget background fetches.

pub mod allocator;
pub mod cascade;
pub mod error;
pub mod key;
pub mod pagination;
pub mod resolver;
pub mod service;
pub mod tasks;

pub use error::PlanError;
pub use service::Planner;
