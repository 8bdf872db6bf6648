//! recordstore - generic persistent state management for typed domain records
//!
//! A `Store` keeps one SQLite table per record type (id + JSON blob) plus a
//! shared secondary-index table so callers can filter without deserializing
//! every row. Callers implement [`Record`] for their domain type and get
//! CRUD + filtered listing for free.
//!
//! The intended usage pattern is one [`Store`] owned exclusively by a single
//! actor task (see `ingestcore::job::store::JobStore` for the canonical
//! example) so that writes are naturally single-threaded; `Store` itself does
//! no internal locking.

mod error;
mod filter;
mod record;
mod store;

pub use error::StoreError;
pub use filter::{Filter, FilterOp};
pub use record::{IndexValue, Record, generate_id, now_ms};
pub use store::Store;

pub type StoreResult<T> = Result<T, StoreError>;
