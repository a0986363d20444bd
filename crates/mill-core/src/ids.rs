//! ID prefixes and the identity factory.
//!
//! IDs are `{prefix}-{uuid-v4-simple}`, e.g. `tsk-3f1c...`. They are minted
//! by the caller before an entity is handed to the store, never by an insert
//! hook.

pub const PREFIX_USER: &str = "usr";
pub const PREFIX_TASK: &str = "tsk";
pub const PREFIX_COMMENT: &str = "cmt";
pub const PREFIX_ATTACHMENT: &str = "att";
pub const PREFIX_AUDIT: &str = "aud";

pub const ALL_PREFIXES: &[&str] = &[
    PREFIX_USER,
    PREFIX_TASK,
    PREFIX_COMMENT,
    PREFIX_ATTACHMENT,
    PREFIX_AUDIT,
];

/// Mint a new prefixed identifier.
#[must_use]
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}

/// Returns the prefix portion of an ID, if it has one.
#[must_use]
pub fn prefix_of(id: &str) -> Option<&str> {
    id.split_once('-').map(|(prefix, _)| prefix)
}
