use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by table, index, selection, join and aggregation operations.
///
/// Every error is reported synchronously to the caller of the operation that
/// detected it; nothing is retried internally.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Column/type mismatch at construction, insert or cast time.
    #[error("schema error: {0}")]
    Schema(String),
    /// Malformed or unresolvable condition string.
    #[error("condition error: {0}")]
    Condition(String),
    /// Duplicate value in a primary key or UNIQUE column.
    #[error("value {value} already exists in unique column \"{column}\"")]
    Uniqueness { column: String, value: String },
    /// Join predicate names a column the table does not have.
    #[error("column \"{column}\" does not exist in table \"{table}\"; valid columns: {valid:?}")]
    JoinColumn {
        table: String,
        column: String,
        valid: Vec<String>,
    },
    /// Projection incompatible with the requested grouping.
    #[error("group by error: {0}")]
    GroupBySchema(String),
    /// Hash index could not accept an entry, or index and scan disagree.
    #[error("index error: {0}")]
    Index(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn schema(message: impl Into<String>) -> Self {
        EngineError::Schema(message.into())
    }

    pub(crate) fn condition(message: impl Into<String>) -> Self {
        EngineError::Condition(message.into())
    }

    pub(crate) fn group_by(message: impl Into<String>) -> Self {
        EngineError::GroupBySchema(message.into())
    }

    pub(crate) fn index(message: impl Into<String>) -> Self {
        EngineError::Index(message.into())
    }
}
