//! Event handler abstraction used by the consumer loop.
//!
//! A handler's boolean answer is the commit decision: `true` means the message
//! that produced the event may be acknowledged, `false` means its offset is withheld
//! and the message will be seen again.

use crate::event::{DeserializationError, DomainEvent};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed error type for failures the handler does not classify.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors escaping an [`EventHandler`].
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The event carried data that could not be interpreted
    #[error(transparent)]
    Deserialization(#[from] DeserializationError),

    /// Anything else; the consumer decides what to do with the offset
    #[error("Event handling failed: {0}")]
    Failed(#[source] BoxError),
}

impl HandlerError {
    /// Wrap an unclassified failure.
    pub fn failed(error: impl Into<BoxError>) -> Self {
        Self::Failed(error.into())
    }
}

/// Handles domain events and decides whether their messages may be committed.
pub trait EventHandler: Send + Sync {
    /// Handle one event.
    ///
    /// Returns `Ok(true)` when the triggering message is safe to commit.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Deserialization`] if the event data cannot be
    /// interpreted, or [`HandlerError::Failed`] for any other failure.
    fn handle<'a>(
        &'a self,
        event: &'a DomainEvent,
    ) -> Pin<Box<dyn Future<Output = Result<bool, HandlerError>> + Send + 'a>>;

    /// Decide whether a message that failed to deserialize may be committed.
    ///
    /// The default withholds the offset.
    fn handle_deserialization_error(&self, error: &DeserializationError) -> bool {
        let _ = error;
        false
    }
}
