//! # TQDB Core
//!
//! An embedded, file-backed record store for resource-constrained
//! environments.
//!
//! Clients register their record types once (binary layout plus id
//! accessors via the [`Record`] trait, named fields via [`Queryable`] for
//! querying), then perform create/read/update/delete/iterate operations by
//! type and numeric id. All records live in a single main file that is
//! rewritten copy-on-write and installed with an atomic rename swap, so a
//! failed mutation never damages existing data.
//!
//! Optional subsystems, all configured at open:
//! - a **write-ahead log** that stages mutations as append-only entries and
//!   folds them into the main file at checkpoints (crash safety without a
//!   full rewrite per mutation),
//! - a bounded **read cache** kept coherent with staged mutations,
//! - a **query engine** evaluating field-level conditions over iteration.
//!
//! ```rust,ignore
//! use tqdb_core::{Config, Database};
//!
//! let db = Database::open(Config::new("data.tqdb"))?;
//! db.register::<Item>()?;
//!
//! let mut item = Item::new("widget", 7);
//! let id = db.add(&mut item)?;
//! assert_eq!(db.get::<Item>(id)?.value, 7);
//! db.close()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod database;
mod error;
pub mod format;
mod query;
mod record;
mod rewrite;
mod types;
mod wal;

pub use cache::CacheStats;
pub use config::{
    Config, DEFAULT_CACHE_SIZE, DEFAULT_SCRATCH_SIZE, DEFAULT_WAL_MAX_ENTRIES,
    DEFAULT_WAL_MAX_SIZE,
};
pub use database::Database;
pub use error::{CoreResult, Error};
pub use query::{
    like_match, FieldDef, FieldValue, Query, QueryOp, Queryable, MAX_CONDITIONS,
};
pub use record::{Record, DEFAULT_MAX_COUNT, MAX_RECORD_TYPES};
pub use types::RecordId;
pub use wal::{WalEntry, WalHeader, WalOp, WalStats, WAL_HEADER_SIZE, WAL_MAGIC, WAL_VERSION};

// Re-exported so `Record` implementations can name the serialization types
// without a separate dependency.
pub use tqdb_codec::{CodecError, CodecResult, Reader, Writer};

/// Library version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
