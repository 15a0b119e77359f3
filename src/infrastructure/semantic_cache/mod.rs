//! Semantic index implementations

mod factory;
mod in_memory;
mod sqlite;

pub use factory::SemanticIndexFactory;
pub use in_memory::InMemorySemanticIndex;
pub use sqlite::{SqliteSemanticIndex, INDEX_FILE_NAME};
