mod record;
mod retention_log;

pub use record::*;
pub use retention_log::*;
