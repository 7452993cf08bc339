#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

use viewfleet::account::AccountPool;
use viewfleet::config::Config;
use viewfleet::credentials::Credentials;
use viewfleet::session::{ChannelEntity, RemoteSession, SessionError, SessionFactory};

/// A remote call as observed by the scripted platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    Resolve(String),
    Join(String),
    Fetch(String),
    View(String, Vec<u64>),
    React(String, u64, String),
    Message(String, String),
    Disconnect,
}

/// Which remote operation a scripted failure applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Connect,
    Authorize,
    Resolve,
    Join,
    Fetch,
    View,
    React,
    Send,
}

#[derive(Default)]
struct PlatformState {
    recent: HashMap<String, Vec<u64>>,
    unauthorized: HashSet<String>,
    failures: HashMap<(String, Op), VecDeque<SessionError>>,
    calls: Vec<(String, Call)>,
    connected_at: Vec<(String, Instant)>,
}

/// In-memory platform shared by every scripted session
#[derive(Clone, Default)]
pub struct ScriptedPlatform {
    state: Arc<Mutex<PlatformState>>,
}

impl ScriptedPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posts(self, channel: &str, ids: &[u64]) -> Self {
        self.state
            .lock()
            .unwrap()
            .recent
            .insert(channel.to_string(), ids.to_vec());
        self
    }

    pub fn unauthorized(self, phone: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .unauthorized
            .insert(phone.to_string());
        self
    }

    /// Queue `error` as the next result of `op` for `phone`
    pub fn fail(self, phone: &str, op: Op, error: SessionError) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry((phone.to_string(), op))
            .or_default()
            .push_back(error);
        self
    }

    pub fn calls(&self) -> Vec<(String, Call)> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_by(&self, phone: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|(who, _)| who == phone)
            .map(|(_, call)| call)
            .collect()
    }

    pub fn view_calls(&self) -> Vec<(String, Vec<u64>)> {
        self.calls()
            .into_iter()
            .filter_map(|(who, call)| match call {
                Call::View(_, ids) => Some((who, ids)),
                _ => None,
            })
            .collect()
    }

    /// When each connect attempt by `phone` happened
    pub fn connect_times(&self, phone: &str) -> Vec<Instant> {
        self.state
            .lock()
            .unwrap()
            .connected_at
            .iter()
            .filter(|(who, _)| who == phone)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn message_calls(&self) -> Vec<(String, String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|(who, call)| match call {
                Call::Message(to, text) => Some((who, to, text)),
                _ => None,
            })
            .collect()
    }

    pub fn pool(&self, phones: &[&str], config: &Config) -> AccountPool {
        let credentials = phones.iter().map(|phone| credentials(phone)).collect();
        AccountPool::open(credentials, self, config)
    }

    fn record(&self, phone: &str, call: Call) {
        self.state
            .lock()
            .unwrap()
            .calls
            .push((phone.to_string(), call));
    }

    fn next_failure(&self, phone: &str, op: Op) -> Option<SessionError> {
        self.state
            .lock()
            .unwrap()
            .failures
            .get_mut(&(phone.to_string(), op))
            .and_then(VecDeque::pop_front)
    }
}

impl SessionFactory for ScriptedPlatform {
    fn open(&self, credentials: &Credentials) -> Box<dyn RemoteSession> {
        Box::new(ScriptedSession {
            phone: credentials.phone.clone(),
            platform: self.clone(),
        })
    }
}

struct ScriptedSession {
    phone: String,
    platform: ScriptedPlatform,
}

impl ScriptedSession {
    fn outcome(&self, op: Op) -> Result<(), SessionError> {
        match self.platform.next_failure(&self.phone, op) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn entity(channel: &str) -> ChannelEntity {
    ChannelEntity {
        id: channel.to_string(),
        title: None,
    }
}

#[async_trait]
impl RemoteSession for ScriptedSession {
    async fn connect(&mut self) -> Result<(), SessionError> {
        self.platform.record(&self.phone, Call::Connect);
        self.platform
            .state
            .lock()
            .unwrap()
            .connected_at
            .push((self.phone.clone(), Instant::now()));
        self.outcome(Op::Connect)
    }

    async fn is_authorized(&mut self) -> Result<bool, SessionError> {
        self.outcome(Op::Authorize)?;
        let state = self.platform.state.lock().unwrap();
        Ok(!state.unauthorized.contains(&self.phone))
    }

    async fn resolve(&mut self, channel: &str) -> Result<ChannelEntity, SessionError> {
        self.platform
            .record(&self.phone, Call::Resolve(channel.to_string()));
        self.outcome(Op::Resolve)?;
        Ok(entity(channel))
    }

    async fn join(&mut self, channel: &str) -> Result<ChannelEntity, SessionError> {
        self.platform
            .record(&self.phone, Call::Join(channel.to_string()));
        self.outcome(Op::Join)?;
        Ok(entity(channel))
    }

    async fn fetch_recent(
        &mut self,
        entity: &ChannelEntity,
        limit: usize,
    ) -> Result<Vec<u64>, SessionError> {
        self.platform
            .record(&self.phone, Call::Fetch(entity.id.clone()));
        self.outcome(Op::Fetch)?;
        let state = self.platform.state.lock().unwrap();
        let mut ids = state.recent.get(&entity.id).cloned().unwrap_or_default();
        ids.truncate(limit);
        Ok(ids)
    }

    async fn mark_viewed(
        &mut self,
        entity: &ChannelEntity,
        item_ids: &[u64],
    ) -> Result<(), SessionError> {
        self.platform.record(
            &self.phone,
            Call::View(entity.id.clone(), item_ids.to_vec()),
        );
        self.outcome(Op::View)
    }

    async fn react(
        &mut self,
        entity: &ChannelEntity,
        item_id: u64,
        emoji: &str,
    ) -> Result<(), SessionError> {
        self.platform.record(
            &self.phone,
            Call::React(entity.id.clone(), item_id, emoji.to_string()),
        );
        self.outcome(Op::React)
    }

    async fn send_message(&mut self, recipient: &str, text: &str) -> Result<(), SessionError> {
        self.platform.record(
            &self.phone,
            Call::Message(recipient.to_string(), text.to_string()),
        );
        self.outcome(Op::Send)
    }

    async fn disconnect(&mut self) {
        self.platform.record(&self.phone, Call::Disconnect);
    }
}

pub fn credentials(phone: &str) -> Credentials {
    Credentials {
        phone: phone.to_string(),
        api_id: 12345,
        api_hash: "0123456789abcdef".to_string(),
        session: format!("session-{phone}"),
    }
}

/// Defaults with single-pass monitoring over `channels`
pub fn test_config(channels: &[&str]) -> Config {
    Config {
        target_channels: channels.iter().map(|c| c.to_string()).collect(),
        continuous_monitoring: false,
        ..Config::default()
    }
}
