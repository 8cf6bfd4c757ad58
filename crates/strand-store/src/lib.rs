//! # strand-store
//!
//! Durable state of a Strand node.
//!
//! Two halves live here. The SQLite side ([`Database`], wrapped by
//! [`ThreadRegistry`]) owns the name -> thread identity mapping and the
//! index of every update ever seen. The [`objects`] side is the
//! content-addressed block store the encrypted bundles are written to and
//! fetched from.

pub mod database;
pub mod migrations;
pub mod models;
pub mod objects;
pub mod registry;
pub mod threads;
pub mod updates;

mod error;

pub use database::Database;
pub use error::{ObjectError, StoreError};
pub use models::*;
pub use objects::{FsObjectStore, MemoryObjectStore, ObjectStore, RemoteObjectStore};
pub use registry::ThreadRegistry;
