//! SQLite persistence for UberFix.
//!
//! `AsyncDatabase` runs every statement on a single dedicated thread.
//! Callers await results without blocking the Tokio runtime:
//!
//! ```ignore
//! let db = AsyncDatabase::open(path).await?;
//! let removed = db.call(move |conn| queries::delete_expired_otps(conn, now)).await?;
//! ```
//!
//! Only SQL belongs inside `db.call()`. Code generation, network calls and
//! locking happen outside.

mod error;
mod executor;
mod migrations;
mod models;
pub mod queries;

pub use error::{DatabaseError, DatabaseResult};
pub use executor::AsyncDatabase;
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use models::*;
