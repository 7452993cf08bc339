use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credentials::Credentials;

/// Every way a remote call can fail.
///
/// The set is closed: callers match on it exhaustively, so a new failure kind
/// has to be handled everywhere before the crate compiles again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("flood wait of {seconds}s requested by the platform")]
    FloodWait { seconds: u64 },

    #[error("session is not authorized (revoked, expired or logged out)")]
    Unauthorized,

    #[error("account is not a participant of the channel")]
    NotParticipant,

    #[error("account is banned from the channel")]
    Banned,

    #[error("transient error: {0}")]
    Transient(String),
}

impl SessionError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }
}

/// A channel as resolved by one account's session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEntity {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// The remote platform as seen through one account.
///
/// A session belongs to exactly one account and is only ever driven by that
/// account's task, hence `&mut self` on every call.
#[async_trait]
pub trait RemoteSession: Send {
    async fn connect(&mut self) -> Result<(), SessionError>;

    async fn is_authorized(&mut self) -> Result<bool, SessionError>;

    /// Look up a channel; `NotParticipant` when membership is required first
    async fn resolve(&mut self, channel: &str) -> Result<ChannelEntity, SessionError>;

    async fn join(&mut self, channel: &str) -> Result<ChannelEntity, SessionError>;

    /// Most recent item ids, newest first or in any order
    async fn fetch_recent(
        &mut self,
        entity: &ChannelEntity,
        limit: usize,
    ) -> Result<Vec<u64>, SessionError>;

    async fn mark_viewed(
        &mut self,
        entity: &ChannelEntity,
        item_ids: &[u64],
    ) -> Result<(), SessionError>;

    async fn react(
        &mut self,
        entity: &ChannelEntity,
        item_id: u64,
        emoji: &str,
    ) -> Result<(), SessionError>;

    /// Send a direct message to a user by username
    async fn send_message(&mut self, recipient: &str, text: &str) -> Result<(), SessionError>;

    /// Release the connection; errors are not interesting at this point
    async fn disconnect(&mut self);
}

/// Builds the session for an account from its credentials
pub trait SessionFactory {
    fn open(&self, credentials: &Credentials) -> Box<dyn RemoteSession>;
}
