//! Storage layer for the web platform status service.
//!
//! Provides a [`Client`] over an embedded SQLite database plus a small set
//! of generic, mapper-driven primitives that every table module is built
//! from.
//!
//! # Architecture
//!
//! Each table supplies a mapper (key projection, SQL templates, merge
//! policy, dependent-row cleanup) and hands it to one of:
//! - [`EntityReader`]: read one row by business key
//! - [`EntityWriter`]: upsert-by-merge and delete-by-key
//! - [`EntitySynchronizer`]: reconcile a table against a desired list
//! - [`BatchWriter`]: stream derived rows into chunked writes
//!
//! Cross-cutting helpers cover opaque page tokens ([`cursor`]), TTL worker
//! locks ([`lock`]) and the latest-if-newer pointer rule ([`latest`]).
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`config`]: StorageConfig and its environment overrides
//! - [`client`]: Client and the read-only / read-write transaction types
//! - [`mutation`]: buffered row mutations applied at commit
//! - [`schema`]: SQL schema and migration setup
//! - [`tables`]: per-table operations on `Client`

pub mod batch;
pub mod client;
pub mod clock;
pub mod config;
pub mod cursor;
pub mod error;
pub mod latest;
pub mod lock;
pub mod mapper;
pub mod mutation;
pub mod reader;
pub mod schema;
pub mod sync;
pub mod tables;
pub mod value;
pub mod writer;

// Re-export key types for ergonomic use.
pub use batch::BatchWriter;
pub use client::{Client, ReadContext, ReadOnlyTxn, ReadWriteTxn};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StorageConfig;
pub use cursor::{decode_cursor, encode_cursor, Page};
pub use error::StorageError;
pub use latest::should_replace_latest;
pub use lock::LockLease;
pub use mapper::{DeleteMapper, IdentifiedEntity, ReadMapper, SyncMapper, WriteMapper};
pub use mutation::{ColumnValue, Mutation, MutationOp};
pub use reader::EntityReader;
pub use sync::{EntitySynchronizer, SyncSummary};
pub use value::{FromRow, SqlValue, Statement};
pub use writer::{EntityWriter, UpsertOutcome, WriteAction};
