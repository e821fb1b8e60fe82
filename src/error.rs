//! Error types for the store, broker, repository and application layers.

use std::time::Duration;

use thiserror::Error;

use crate::models::EntityKind;

/// Failures of the graph store collaborator.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),

    #[error("store query failed: {message}")]
    Query { message: String, query: String },

    #[error("node {0} does not exist")]
    UnknownNode(String),

    #[error("blank node '_:{0}' is referenced but never defined")]
    UndefinedBlank(String),

    #[error("store did not assign an id to '_:{0}'")]
    MissingAssignedId(String),

    #[error("malformed {what}: {message}")]
    Decode { what: String, message: String },

    #[error("invalid mutation: {0}")]
    InvalidMutation(String),

    #[error("store call exceeded its deadline of {0:?}")]
    Timeout(Duration),

    #[error("store call cancelled")]
    Cancelled,

    #[error("internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    pub(crate) fn decode(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        StoreError::Decode {
            what: what.into(),
            message: err.to_string(),
        }
    }
}

/// Failures of the message broker collaborator.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("topic '{0}' is closed")]
    Closed(String),

    #[error("broker call exceeded its deadline of {0:?}")]
    Timeout(Duration),

    #[error("broker call cancelled")]
    Cancelled,

    #[error("malformed channel message: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Repository-level errors. The same taxonomy repeats for every entity kind.
#[derive(Error, Debug)]
pub enum EntityError {
    #[error("{kind} '{name}' already exists with id {id}")]
    AlreadyExists {
        kind: EntityKind,
        name: String,
        id: String,
    },

    #[error("{kind} named '{name}' not found")]
    ByNameNotFound { kind: EntityKind, name: String },

    #[error("{kind} {id} does not exist")]
    DoesNotExist { kind: EntityKind, id: String },

    #[error("{kind} can not be {operation} without an id")]
    CanNotBeWithoutId {
        kind: EntityKind,
        operation: &'static str,
    },

    #[error("{kind} can not be created")]
    CanNotBeCreated {
        kind: EntityKind,
        #[source]
        source: StoreError,
    },

    #[error("{kind} can not be updated")]
    CanNotBeUpdated {
        kind: EntityKind,
        #[source]
        source: StoreError,
    },

    #[error("{kind} can not be deleted")]
    CanNotBeDeleted {
        kind: EntityKind,
        #[source]
        source: StoreError,
    },

    #[error("{kind} can not be deactivated")]
    CanNotBeDeactivated {
        kind: EntityKind,
        #[source]
        source: StoreError,
    },

    #[error("{kind} is immutable once created")]
    Immutable { kind: EntityKind },

    #[error("invalid language tag '{0}'")]
    InvalidLanguage(String),

    #[error("invalid {kind} {field}: {reason}")]
    InvalidField {
        kind: EntityKind,
        field: &'static str,
        reason: String,
    },

    #[error("invalid pagination: page {page}, page size {page_size} (both start at 1)")]
    InvalidPagination { page: usize, page_size: usize },

    #[error("{kind} store request failed")]
    Store {
        kind: EntityKind,
        #[source]
        source: StoreError,
    },
}

impl EntityError {
    /// Identifier of the already stored entity for `AlreadyExists`.
    pub fn existing_id(&self) -> Option<&str> {
        match self {
            EntityError::AlreadyExists { id, .. } => Some(id),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EntityError::ByNameNotFound { .. } | EntityError::DoesNotExist { .. }
        )
    }
}

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Entity(#[from] EntityError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(String),
}
