use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrmError>;

#[derive(Debug, Error)]
pub enum OrmError {
    #[error("The attribute {column} is undefined on entity {entity}")]
    UndefinedAttribute { entity: String, column: String },

    #[error("This entity id({0}) is already in the collection")]
    DuplicateId(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("There is no data in this iterator at index {position} (count {count})")]
    OutOfRange { position: usize, count: usize },

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Parameter error: {0}")]
    Parameter(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl OrmError {
    pub(crate) fn undefined(entity: &str, column: &str) -> Self {
        OrmError::UndefinedAttribute {
            entity: entity.to_string(),
            column: column.to_string(),
        }
    }
}

impl From<sqlx::Error> for OrmError {
    fn from(err: sqlx::Error) -> Self {
        OrmError::Store(err.to_string())
    }
}

impl From<figment::Error> for OrmError {
    fn from(err: figment::Error) -> Self {
        OrmError::Config(err.to_string())
    }
}
