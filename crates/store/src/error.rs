use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Anything that is not a single SELECT is rejected before reaching
    /// SQLite. This core never issues DDL or DML.
    #[error("refusing to execute non-SELECT statement: {reason}")]
    ReadOnly { reason: String },

    #[error("store lock poisoned")]
    Poisoned,
}
