//! Wrappers over the raw IR definitions (classes, methods, fields) to
//! enrich them and store them in the repository.

mod class;
mod field;
mod method;
mod repository;
mod uids;

pub use class::Class;
pub use field::Field;
pub use method::Method;
pub use repository::{FieldSearch, MethodSearch, Repo, Visibility};
pub use uids::{ClassUid, FieldUid, MethodUid, RepoCounters};
