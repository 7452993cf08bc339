use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

use crate::credentials::Credentials;
use crate::error_utils::create_http_client_with_context;
use crate::session::{ChannelEntity, RemoteSession, SessionError, SessionFactory};

/// Per-request timeout for gateway calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Flood wait assumed when the gateway throttles without saying for how long
const DEFAULT_FLOOD_WAIT_SECS: u64 = 30;

/// Error body returned by the gateway: `{"error": "FLOOD_WAIT", "seconds": 30}`
#[derive(Debug, Default, Deserialize)]
struct GatewayErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AuthorizedResponse {
    authorized: bool,
}

#[derive(Debug, Deserialize)]
struct RecentResponse {
    ids: Vec<u64>,
}

/// Map a failed gateway response onto the session error taxonomy
pub fn classify_error(status: StatusCode, body: &str) -> SessionError {
    let parsed: GatewayErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.error.to_ascii_uppercase();

    match code.as_str() {
        "FLOOD_WAIT" | "FLOOD" => {
            return SessionError::FloodWait {
                seconds: parsed.seconds.unwrap_or(DEFAULT_FLOOD_WAIT_SECS),
            }
        }
        "AUTH_KEY_UNREGISTERED" | "SESSION_REVOKED" | "SESSION_EXPIRED" | "USER_DEACTIVATED"
        | "SESSION_PASSWORD_NEEDED" | "UNAUTHORIZED" => return SessionError::Unauthorized,
        "USER_NOT_PARTICIPANT" | "CHANNEL_PRIVATE" | "NOT_PARTICIPANT" => {
            return SessionError::NotParticipant
        }
        "USER_BANNED_IN_CHANNEL" | "CHANNEL_BANNED" | "BANNED" => return SessionError::Banned,
        _ => {}
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => SessionError::FloodWait {
            seconds: parsed.seconds.unwrap_or(DEFAULT_FLOOD_WAIT_SECS),
        },
        s if s.as_u16() == 420 => SessionError::FloodWait {
            seconds: parsed.seconds.unwrap_or(DEFAULT_FLOOD_WAIT_SECS),
        },
        StatusCode::UNAUTHORIZED => SessionError::Unauthorized,
        _ => SessionError::Transient(format!("gateway returned {status}: {body}")),
    }
}

/// Session for one account, spoken over the HTTP session gateway
pub struct GatewaySession {
    client: Client,
    base: Url,
    credentials: Credentials,
}

impl GatewaySession {
    pub fn new(client: Client, base: Url, credentials: Credentials) -> Self {
        Self {
            client,
            base,
            credentials,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, SessionError> {
        self.base
            .join(path)
            .map_err(|e| SessionError::transient(format!("invalid gateway path {path}: {e}")))
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, SessionError> {
        let url = self.endpoint(path)?;
        trace!(%url, phone = %self.credentials.phone, "Gateway request");
        Ok(self
            .client
            .request(method, url)
            .header("X-Api-Id", self.credentials.api_id.to_string())
            .header("X-Api-Hash", &self.credentials.api_hash)
            .header("X-Session", &self.credentials.session))
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, SessionError> {
        let response = builder
            .send()
            .await
            .map_err(|e| SessionError::transient(format!("gateway unreachable: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = classify_error(status, &body);
        debug!(
            "Gateway call for {phone} failed with {status}: {error}",
            phone = self.credentials.phone
        );
        Err(error)
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, SessionError> {
        let builder = self.request(reqwest::Method::POST, path)?.json(&body);
        let response = self.send(builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| SessionError::transient(format!("malformed gateway response: {e}")))
    }

    async fn post_unit(&self, path: &str, body: Value) -> Result<(), SessionError> {
        let builder = self.request(reqwest::Method::POST, path)?.json(&body);
        self.send(builder).await.map(|_| ())
    }
}

#[async_trait]
impl RemoteSession for GatewaySession {
    async fn connect(&mut self) -> Result<(), SessionError> {
        self.post_unit("connect", json!({})).await
    }

    async fn is_authorized(&mut self) -> Result<bool, SessionError> {
        let builder = self.request(reqwest::Method::GET, "authorized")?;
        let response = self.send(builder).await?;
        let parsed: AuthorizedResponse = response
            .json()
            .await
            .map_err(|e| SessionError::transient(format!("malformed gateway response: {e}")))?;
        Ok(parsed.authorized)
    }

    async fn resolve(&mut self, channel: &str) -> Result<ChannelEntity, SessionError> {
        self.post("channels/resolve", json!({ "channel": channel }))
            .await
    }

    async fn join(&mut self, channel: &str) -> Result<ChannelEntity, SessionError> {
        self.post("channels/join", json!({ "channel": channel })).await
    }

    async fn fetch_recent(
        &mut self,
        entity: &ChannelEntity,
        limit: usize,
    ) -> Result<Vec<u64>, SessionError> {
        let response: RecentResponse = self
            .post(
                "messages/recent",
                json!({ "channel": entity.id, "limit": limit }),
            )
            .await?;
        Ok(response.ids)
    }

    async fn mark_viewed(
        &mut self,
        entity: &ChannelEntity,
        item_ids: &[u64],
    ) -> Result<(), SessionError> {
        self.post_unit(
            "messages/views",
            json!({ "channel": entity.id, "ids": item_ids, "increment": true }),
        )
        .await
    }

    async fn react(
        &mut self,
        entity: &ChannelEntity,
        item_id: u64,
        emoji: &str,
    ) -> Result<(), SessionError> {
        self.post_unit(
            "messages/react",
            json!({ "channel": entity.id, "id": item_id, "emoji": emoji }),
        )
        .await
    }

    async fn send_message(&mut self, recipient: &str, text: &str) -> Result<(), SessionError> {
        self.post_unit(
            "messages/send",
            json!({ "peer": recipient, "text": text }),
        )
        .await
    }

    async fn disconnect(&mut self) {
        if let Err(e) = self.post_unit("disconnect", json!({})).await {
            debug!(
                "Ignoring disconnect failure for {phone}: {e}",
                phone = self.credentials.phone
            );
        }
    }
}

/// Opens gateway sessions sharing one HTTP client
pub struct GatewaySessionFactory {
    client: Client,
    base: Url,
}

impl GatewaySessionFactory {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .with_context(|| format!("Invalid gateway URL: {base_url}"))?;
        // Url::join replaces the last segment unless the base ends with a slash
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let client = create_http_client_with_context(REQUEST_TIMEOUT)?;
        Ok(Self { client, base })
    }
}

impl SessionFactory for GatewaySessionFactory {
    fn open(&self, credentials: &Credentials) -> Box<dyn RemoteSession> {
        Box::new(GatewaySession::new(
            self.client.clone(),
            self.base.clone(),
            credentials.clone(),
        ))
    }
}
