//! Durable workspace storage: the SQLite store and the workspace folders.

pub mod db;
pub mod files;
pub mod models;

pub use db::{DbHandle, StoreDb};
pub use files::{WorkspaceFiles, generated_file_name};
pub use models::{
    ActaData, CifData, IdentityKind, UpsertOutcome, WorkspaceRecord, WorkspaceStatus,
    WorkspaceUpdate,
};
