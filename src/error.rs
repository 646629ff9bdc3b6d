use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metadata yielded no records for dimension '{0}'")]
    EmptyDimension(&'static str),

    #[error("Schema is not provisioned: table '{0}' is missing")]
    SchemaMissing(String),

    #[error("Fact batch covering cleansed rows {start_row}..={end_row} failed to load: {source}")]
    BatchLoad {
        start_row: u64,
        end_row: u64,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Timeout budget exceeded during {0}")]
    Timeout(&'static str),
}

pub type Result<T> = std::result::Result<T, EtlError>;
