//! # mill-core
//!
//! Core types, query planning, and capability traits for taskmill.
//!
//! This crate has no storage or runtime dependencies. It provides:
//! - Entity structs with explicit `create` factories (ID and timestamps)
//! - Status, priority, and audit enums
//! - The query model: `QuerySpec`, the typed `Predicate` tree, per-collection
//!   allow-lists, and the `QueryEngine` that plans one into the other
//! - The field-level diff used for audit entries
//! - `Clock` and `Notifier` capabilities consumed by `mill-db`

pub mod clock;
pub mod diff;
pub mod entities;
pub mod enums;
pub mod errors;
pub mod ids;
pub mod notify;
pub mod query;
