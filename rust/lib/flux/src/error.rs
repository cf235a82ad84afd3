use thiserror::Error;

/// Errors raised by the persistence service behind a store.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Errors raised by commit, dispatch and the surrounding store plumbing.
///
/// None of these are caught internally: they surface once, to the nearest
/// caller of `commit` / `dispatch` / `put`.
#[derive(Error, Debug)]
pub enum FluxError {
    #[error("not found {0} action")]
    UnresolvedAction(String),

    #[error("commit needs a mutation type")]
    MissingMutationType,

    #[error("mutation is not registered: {0}")]
    UnknownMutation(String),

    #[error("invalid payload for mutation {mutation}: {reason}")]
    InvalidPayload { mutation: String, reason: String },

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("invalid store config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("action failed: {0}")]
    Action(String),
}

impl FluxError {
    /// Shorthand for an action body failing with a message.
    pub fn action(msg: impl Into<String>) -> Self {
        FluxError::Action(msg.into())
    }
}
