//! Declarative paging, filtering, and sorting.
//!
//! A caller describes what it wants with a [`QuerySpec`]. The [`QueryEngine`]
//! validates it against a collection's [`CollectionSchema`] allow-lists and
//! plans a [`StoreQuery`]: a predicate tree plus sort, relations, and
//! offset/limit. A [`QueryStore`] executes the plan and the engine wraps the
//! result in a [`PageResult`].

mod engine;
mod page;
mod predicate;
mod schema;
mod spec;

pub use engine::{QueryEngine, QueryStore};
pub use page::PageResult;
pub use predicate::{Condition, Operator, Predicate, Scalar, Sort, StoreQuery};
pub use schema::{AUDIT_ENTRIES, COMMENTS, CollectionSchema, FieldKind, TASKS};
pub use spec::{DateRange, Filter, QueryParams, QuerySpec};
