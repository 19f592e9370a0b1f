use thiserror::Error;

/// Unified error type for every fallible operation in the crate.
///
/// Variants group into configuration, metadata, value, execution,
/// object-graph and integrity failures. Callers compose with `?`; nothing
/// in the crate recovers locally from value coercion, lazy-load or flush
/// failures.
#[derive(Debug, Error)]
pub enum OrmError {
    // -- Configuration --
    /// No driver registered under this name.
    #[error("Unknown driver: {0}")]
    UnknownDriver(String),

    /// No dialect registered under this name.
    #[error("Unknown dialect: {0}")]
    UnknownDialect(String),

    /// Connection source string could not be parsed.
    #[error("Malformed connection URL: {0}")]
    MalformedUrl(String),

    /// A type code outside the known set.
    #[error("Unknown value type: {0}")]
    UnknownType(String),

    // -- Metadata --
    #[error("Table not found in schema: {0}")]
    TableNotFound(String),

    #[error("Class not found in schema: {0}")]
    ClassNotFound(String),

    #[error("Column not found: {table}.{column}")]
    ColumnNotFound { table: String, column: String },

    #[error("Relation not found for class: {0}")]
    RelationNotFound(String),

    /// FK target validation or depth assignment failed.
    #[error("Integrity check failed: {0}")]
    IntegrityCheckFailed(String),

    /// More than one candidate primary key column.
    #[error("Ambiguous primary key for table: {0}")]
    AmbiguousPk(String),

    /// Table has no single integer PK suitable for id autogeneration.
    #[error("Table not suitable for key autogeneration: {0}")]
    UnsuitablePk(String),

    // -- Value --
    /// A typed accessor was applied to a null value.
    #[error("Trying to read a null value")]
    ValueIsNull,

    #[error("Can't cast value \"{value}\" to type {to}")]
    ValueBadCast { value: String, to: String },

    /// A decimal did not fit the representable range or scale.
    #[error("Decimal out of range: {0}")]
    DecimalRange(String),

    // -- Execution --
    /// Generic failure surfaced from the driver.
    #[error("Database error: {0}")]
    Db(String),

    /// A select that required rows produced none.
    #[error("Data wasn't found, details: {0}")]
    NoDataFound(String),

    /// Malformed request at the SQL level.
    #[error("Bad SQL operation: {0}")]
    BadSqlOperation(String),

    /// A write attempted while the engine is read-only.
    #[error("Bad operation for engine mode: {0}")]
    BadOperationInMode(String),

    #[error("SQL dialect error: {0}")]
    SqlDialect(String),

    #[error("SQL driver error: {0}")]
    SqlDriver(String),

    // -- Object graph --
    #[error("Can't set value of {table}.{column} with '{value}', having max length {max_len}")]
    StringTooLong {
        table: String,
        column: String,
        max_len: usize,
        value: String,
    },

    #[error("Read-only column: {table}.{column}")]
    ReadOnlyColumn { table: String, column: String },

    #[error("Field not found in fetched row: {table}.{column}")]
    FieldNotFoundInRow { table: String, column: String },

    /// A distinct object already occupies this key in the identity map.
    #[error("DataObject is already registered in the identity map: {0}")]
    AlreadyInSession(String),

    #[error("Cycle detected in the graph of objects")]
    CycleDetected,

    /// Loading a keyed ghost matched no row.
    #[error("Object not found by key: {0}")]
    ObjectNotFoundByKey(String),

    /// A key with null components where a concrete one was required.
    #[error("Null PK given for table: {0}")]
    NullPk(String),

    /// The object is not attached to a session but the operation needs one.
    #[error("DataObject is not attached to a session")]
    NotInSession,

    // -- Integrity --
    /// A delete ran into a Restrict relation (or an unsafe Nullify).
    #[error("Cascade delete error: {0}")]
    CascadeDelete(String),
}

impl OrmError {
    pub fn db(msg: impl Into<String>) -> Self {
        Self::Db(msg.into())
    }

    pub fn bad_sql(msg: impl Into<String>) -> Self {
        Self::BadSqlOperation(msg.into())
    }

    pub fn dialect(msg: impl Into<String>) -> Self {
        Self::SqlDialect(msg.into())
    }

    pub fn driver(msg: impl Into<String>) -> Self {
        Self::SqlDriver(msg.into())
    }

    pub fn bad_cast(value: impl Into<String>, to: impl Into<String>) -> Self {
        Self::ValueBadCast {
            value: value.into(),
            to: to.into(),
        }
    }

    /// Whether the error came from statement execution rather than from
    /// this library's own validation. Used by the reconnect logic.
    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Db(_) | Self::NoDataFound(_))
    }
}

pub type Result<T> = std::result::Result<T, OrmError>;
