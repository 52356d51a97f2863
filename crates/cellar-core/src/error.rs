use thiserror::Error;

/// Misuse of a cell, group, or store.
///
/// None of these are transient: they point at a bug in the calling code and
/// are reported immediately, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("state has been closed")]
    Closed,
    #[error("states have already been created")]
    AlreadyInitialized,
    #[error("states have not been created yet")]
    NotInitialized,
    #[error("state '{key}' is remote and cannot be set locally")]
    RemoteStateImmutable { key: String },
    #[error("remote state '{token}' is already connected to a service")]
    AlreadyConnected { token: String },
    #[error("no state named '{key}'")]
    UnknownKey { key: String },
    #[error("state '{key}' does not hold a value of type {expected}")]
    TypeMismatch { key: String, expected: &'static str },
    #[error("state '{key}' is declared more than once")]
    DuplicateKey { key: String },
}

pub type StateResult<T> = Result<T, StateError>;
