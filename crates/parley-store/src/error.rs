use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Local database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// No home directory, so no platform data directory either.
    #[error("Could not determine the parley data directory")]
    NoDataDir,

    #[error("Local storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    /// A writer panicked while holding the storage lock.
    #[error("Local storage lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;
