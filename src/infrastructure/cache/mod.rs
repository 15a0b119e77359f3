//! Exact store infrastructure - ExactStore implementations

mod factory;
mod in_memory;
mod sqlite;

pub use factory::{ExactStoreConfig, ExactStoreFactory, ExactStoreType};
pub use in_memory::{InMemoryExactStore, InMemoryStoreConfig};
pub use sqlite::{SqliteExactStore, SqliteStoreConfig};

pub(crate) use sqlite::{connect_sqlite, to_unix_seconds};
