//! Repository modules.
//!
//! Each module holds the row mapping and SQL for one table as `impl MillDb`
//! blocks, and the business operations built on them as `impl MillService`
//! blocks.

pub mod attachment;
pub mod audit;
pub mod comment;
pub mod task;
pub mod user;
