mod common;
mod records;
mod run_log;

pub use records::SqliteRecordStore;
pub use run_log::SqliteRunLogRepo;
