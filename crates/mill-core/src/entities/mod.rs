//! Entity structs for all taskmill domain objects.
//!
//! Each entity maps to a table in the libSQL database. All structs derive
//! `Serialize`, `Deserialize`, and `JsonSchema`; the serialized form is also
//! the snapshot format fed to the diff engine.
//!
//! Identity and timestamps are assigned by the `create` factories, which the
//! caller invokes before handing the entity to the store.

mod attachment;
mod audit;
mod comment;
mod task;
mod user;

pub use attachment::{Attachment, NewAttachment};
pub use audit::AuditEntry;
pub use comment::{Comment, CommentView};
pub use task::{NewTask, Task, TaskSummary, TaskView};
pub use user::{NewUser, User};
