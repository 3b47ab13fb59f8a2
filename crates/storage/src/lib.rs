pub mod db;
pub mod records;
pub mod rules;

pub use db::{create_db, DbPool};
pub use records::SqliteRecordStore;
pub use rules::SqliteLearningStore;
