mod records;
mod run_log;

pub use records::*;
pub use run_log::*;
