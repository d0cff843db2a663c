//! facematch-store: external stores the matcher depends on.
//!
//! An object store holding the known-face images, and a document store
//! resolving identity keys to identity records.

pub mod document_store;
pub mod error;
pub mod object_store;

pub use document_store::{DocumentStore, IdentityRecord, KeyedRecord, SqliteDocumentStore};
pub use error::StoreError;
pub use object_store::{LocalObjectStore, ObjectEntry, ObjectMetadata, ObjectStore};
