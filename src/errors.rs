use sea_orm::error::{DbErr, SqlErr};
use strum::Display;

/// Whether a failed stock lookup referenced a base product or a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum StockItemKind {
    Product,
    Variant,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Customer {customer_id} not found")]
    CustomerNotFound { customer_id: i64 },

    #[error("{kind} {id} not found")]
    ProductNotFound { kind: StockItemKind, id: i64 },

    #[error("Insufficient stock for {kind} {id}: requested {requested}, available {available}")]
    InsufficientStock {
        kind: StockItemKind,
        id: i64,
        requested: i32,
        available: i32,
    },

    #[error("Monthly order quota exceeded: {used} of {ceiling} used")]
    QuotaExceeded { used: i32, ceiling: i32 },

    #[error("Transient conflict: {0}")]
    TransientConflict(String),

    #[error("Exhausted {attempts} attempts: {last}")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        last: Box<ServiceError>,
    },

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Wraps a database error, promoting datastore-level write races to
    /// `TransientConflict` so the retry executor can redraw the whole
    /// attempt. Everything else stays an opaque database error.
    pub fn db_error(err: DbErr) -> Self {
        match &err {
            DbErr::RecordNotUpdated => {
                return ServiceError::TransientConflict(
                    "row changed or disappeared during update".to_string(),
                )
            }
            DbErr::ConnectionAcquire(_) => {
                return ServiceError::TransientConflict(
                    "connection pool exhausted while in transaction".to_string(),
                )
            }
            _ => {}
        }
        if let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
            // A duplicate bill number means two commits raced on the same
            // sequence value; a fresh attempt draws a fresh number.
            return ServiceError::TransientConflict(format!(
                "unique constraint race: {detail}"
            ));
        }
        ServiceError::DatabaseError(err)
    }

    /// The single classification predicate consulted by the retry executor.
    /// Only enumerated datastore conflicts are retryable; business failures
    /// (validation, stock, quota, not-found) never are.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::TransientConflict(_))
    }
}
