// crates/db/src/queries/mod.rs
// Query modules for the context-hub session repository, split by entity.

pub(crate) mod row_types;

pub(crate) mod assets;
mod callinfo;
mod messages;
mod projects;
mod sessions;
mod status;
mod tasks;

pub use sessions::SessionListFilter;
