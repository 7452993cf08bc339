use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::ChannelTarget;
use crate::config::Config;
use crate::credentials::Credentials;
use crate::datetime_utils::now_utc;
use crate::pacing::sleep_or_cancel;
use crate::rate_limit::RateLimiter;
use crate::session::{ChannelEntity, RemoteSession, SessionError, SessionFactory};

/// Position of an account in its lifecycle.
///
/// `Deactivated` is terminal: nothing transitions out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Connecting,
    Active,
    /// Suspended while the rate limiter waits out a window
    RateLimited,
    Deactivated,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::RateLimited => "rate-limited",
            Self::Deactivated => "deactivated",
        };
        f.write_str(label)
    }
}

/// Reason attached to a call abandoned because the stop signal fired while
/// the account was rate limited
const STOPPED_WHILE_THROTTLED: &str = "stopped while waiting out the rate limit";

/// One platform account and the session it exclusively owns
pub struct Account {
    credentials: Credentials,
    session: Option<Box<dyn RemoteSession>>,
    state: LifecycleState,
    limiter: RateLimiter,
    success_count: u64,
    reaction_count: u64,
    error_count: u64,
    last_used: Option<DateTime<Utc>>,
    /// Resolved channels keyed by watermark key
    entities: HashMap<String, ChannelEntity>,
    banned_channels: HashSet<String>,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("phone", &self.credentials.phone)
            .field("state", &self.state)
            .field("success_count", &self.success_count)
            .field("reaction_count", &self.reaction_count)
            .field("error_count", &self.error_count)
            .finish_non_exhaustive()
    }
}

impl Account {
    pub fn new(credentials: Credentials, session: Box<dyn RemoteSession>, config: &Config) -> Self {
        Self {
            credentials,
            session: Some(session),
            state: LifecycleState::Connecting,
            limiter: RateLimiter::new(
                config.rate_limit_max_requests,
                config.rate_limit_window(),
                Instant::now(),
            ),
            success_count: 0,
            reaction_count: 0,
            error_count: 0,
            last_used: None,
            entities: HashMap::new(),
            banned_channels: HashSet::new(),
        }
    }

    pub fn phone(&self) -> &str {
        &self.credentials.phone
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Eligible for polling and dispatch
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            LifecycleState::Active | LifecycleState::RateLimited
        )
    }

    pub fn is_deactivated(&self) -> bool {
        self.state == LifecycleState::Deactivated
    }

    pub fn success_count(&self) -> u64 {
        self.success_count
    }

    pub fn reaction_count(&self) -> u64 {
        self.reaction_count
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    pub fn last_used(&self) -> Option<DateTime<Utc>> {
        self.last_used
    }

    pub fn is_banned_from(&self, target: &ChannelTarget) -> bool {
        self.banned_channels.contains(target.watermark_key())
    }

    pub(crate) fn record_success(&mut self, items: u64) {
        if !self.is_deactivated() {
            self.success_count += items;
        }
    }

    pub(crate) fn record_reaction(&mut self) {
        if !self.is_deactivated() {
            self.reaction_count += 1;
        }
    }

    pub(crate) fn record_error(&mut self) {
        if !self.is_deactivated() {
            self.error_count += 1;
        }
    }

    pub(crate) fn mark_active(&mut self) {
        if self.state == LifecycleState::Connecting {
            self.state = LifecycleState::Active;
            info!("Account {phone} is active", phone = self.phone());
        }
    }

    pub(crate) fn ban_from(&mut self, target: &ChannelTarget) {
        self.entities.remove(target.watermark_key());
        if self.banned_channels.insert(target.watermark_key().to_string()) {
            warn!(
                "Account {phone} is banned from {target}, excluding it from this channel",
                phone = self.phone()
            );
        }
    }

    pub(crate) fn forget_entity(&mut self, target: &ChannelTarget) {
        self.entities.remove(target.watermark_key());
    }

    /// Move to the terminal state and release the session
    pub(crate) async fn deactivate(&mut self, reason: &str) {
        if self.is_deactivated() {
            return;
        }
        self.state = LifecycleState::Deactivated;
        self.entities.clear();
        warn!(
            "Account {phone} deactivated: {reason}",
            phone = self.phone()
        );
        if let Some(mut session) = self.session.take() {
            session.disconnect().await;
        }
    }

    /// Release the session at shutdown without changing the lifecycle state
    pub(crate) async fn release(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.disconnect().await;
            debug!("Released session for {phone}", phone = self.phone());
        }
    }

    fn session(&mut self) -> Result<&mut (dyn RemoteSession + 'static), SessionError> {
        self.session
            .as_deref_mut()
            .ok_or_else(|| SessionError::transient("session is not connected"))
    }

    fn touch(&mut self) {
        self.last_used = Some(now_utc());
    }

    /// Charge one remote call against the rate limiter, suspending if the
    /// window budget is spent. Fails without issuing anything when `cancel`
    /// fires during the suspension.
    async fn throttle(&mut self, cancel: &CancellationToken) -> Result<(), SessionError> {
        let Some(wait) = self.limiter.admit(Instant::now()) else {
            return Ok(());
        };

        if self.state == LifecycleState::Active {
            self.state = LifecycleState::RateLimited;
        }
        warn!(
            "Rate limit reached for {phone}, waiting {seconds:.2} seconds",
            phone = self.phone(),
            seconds = wait.as_secs_f64()
        );
        let resumed = sleep_or_cancel(wait, cancel).await;
        if self.state == LifecycleState::RateLimited {
            self.state = LifecycleState::Active;
        }

        if resumed {
            Ok(())
        } else {
            debug!(
                "Stop requested while {phone} was rate limited",
                phone = self.phone()
            );
            Err(SessionError::transient(STOPPED_WHILE_THROTTLED))
        }
    }

    pub(crate) async fn connect(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<bool, SessionError> {
        self.throttle(cancel).await?;
        self.session()?.connect().await?;
        let authorized = self.session()?.is_authorized().await;
        self.touch();
        authorized
    }

    /// Resolve the channel through this account's session, joining it when
    /// the platform reports that membership is required
    pub async fn channel_entity(
        &mut self,
        target: &ChannelTarget,
        cancel: &CancellationToken,
    ) -> Result<ChannelEntity, SessionError> {
        if let Some(entity) = self.entities.get(target.watermark_key()) {
            return Ok(entity.clone());
        }

        self.throttle(cancel).await?;
        let resolved = self.session()?.resolve(target.platform_id()).await;
        self.touch();

        let entity = match resolved {
            Ok(entity) => entity,
            Err(SessionError::NotParticipant) => {
                info!(
                    "Account {phone} is not a member of {target}, joining",
                    phone = self.phone()
                );
                self.join(target, cancel).await?
            }
            Err(e) => return Err(e),
        };

        self.entities
            .insert(target.watermark_key().to_string(), entity.clone());
        Ok(entity)
    }

    pub async fn join(
        &mut self,
        target: &ChannelTarget,
        cancel: &CancellationToken,
    ) -> Result<ChannelEntity, SessionError> {
        self.throttle(cancel).await?;
        let joined = self.session()?.join(target.platform_id()).await;
        self.touch();

        let entity = joined?;
        info!(
            "Account {phone} joined {target}",
            phone = self.phone()
        );
        self.entities
            .insert(target.watermark_key().to_string(), entity.clone());
        Ok(entity)
    }

    pub(crate) async fn fetch_recent(
        &mut self,
        entity: &ChannelEntity,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<u64>, SessionError> {
        self.throttle(cancel).await?;
        let fetched = self.session()?.fetch_recent(entity, limit).await;
        self.touch();
        fetched
    }

    pub(crate) async fn mark_viewed(
        &mut self,
        entity: &ChannelEntity,
        item_ids: &[u64],
        cancel: &CancellationToken,
    ) -> Result<(), SessionError> {
        self.throttle(cancel).await?;
        let viewed = self.session()?.mark_viewed(entity, item_ids).await;
        self.touch();
        viewed
    }

    pub(crate) async fn react(
        &mut self,
        entity: &ChannelEntity,
        item_id: u64,
        emoji: &str,
        cancel: &CancellationToken,
    ) -> Result<(), SessionError> {
        self.throttle(cancel).await?;
        let reacted = self.session()?.react(entity, item_id, emoji).await;
        self.touch();
        reacted
    }

    pub(crate) async fn send_message(
        &mut self,
        recipient: &str,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<(), SessionError> {
        self.throttle(cancel).await?;
        let sent = self.session()?.send_message(recipient, text).await;
        self.touch();
        sent
    }
}

/// Every account loaded at startup, in credential order
#[derive(Debug, Default)]
pub struct AccountPool {
    accounts: Vec<Account>,
}

impl AccountPool {
    /// Open one session per credential. Accounts start in `Connecting`.
    pub fn open(
        credentials: Vec<Credentials>,
        factory: &dyn SessionFactory,
        config: &Config,
    ) -> Self {
        let accounts = credentials
            .into_iter()
            .map(|credentials| {
                let session = factory.open(&credentials);
                Account::new(credentials, session, config)
            })
            .collect();
        Self { accounts }
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub(crate) fn accounts_mut(&mut self) -> &mut [Account] {
        &mut self.accounts
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.accounts.iter().filter(|a| a.is_active()).count()
    }

    /// True once no account can ever become active again
    pub fn is_exhausted(&self) -> bool {
        self.accounts.iter().all(Account::is_deactivated)
    }

    pub fn find(&self, phone: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.phone() == phone)
    }

    /// Disconnect every remaining session
    pub async fn release_all(&mut self) {
        for account in &mut self.accounts {
            account.release().await;
        }
        info!("Released all sessions");
    }
}
