//! Inventory error taxonomy.

use thiserror::Error;

/// Result type used across the inventory domain.
pub type InventoryResult<T> = Result<T, InventoryError>;

/// Domain-level error.
///
/// Every variant is detected before any state is touched; a rejected operation
/// leaves the ledger entry exactly as it was.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Non-positive or negative quantity where a positive/non-negative one is required.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Operation is not legal for the current lifecycle or reservation status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Requested quantity exceeds what is available.
    #[error("insufficient stock (requested: {requested}, available: {available})")]
    InsufficientStock { requested: i64, available: i64 },

    /// Threshold ordering `0 <= reorder <= low <= max` violated.
    #[error("invalid thresholds: {0}")]
    InvalidThresholds(String),

    /// Referenced entry or reservation does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The entry lock could not be acquired in time; safe to retry.
    #[error("contended: {0}")]
    Contended(String),

    /// Malformed input (empty SKU, empty metadata key, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Stale version on save (optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl InventoryError {
    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::InvalidQuantity(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn insufficient(requested: i64, available: i64) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }

    pub fn invalid_thresholds(msg: impl Into<String>) -> Self {
        Self::InvalidThresholds(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn contended(msg: impl Into<String>) -> Self {
        Self::Contended(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Whether a caller may simply retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Contended(_) | Self::Conflict(_))
    }
}
