use std::str::FromStr;

use crate::db::error::{DbError, DbResult};

/// Parse a status column into its enum, returning a DbError on failure
pub fn parse_enum<T>(s: &str) -> DbResult<T>
where
    T: FromStr<Err = String>,
{
    T::from_str(s).map_err(|e| DbError::Internal(format!("Invalid value in database: {}", e)))
}
