/// Network seam between the loops and the API
///
/// Endpoints (relative to the configured base URL):
///   GET  notifications                    ?since=..&unread_snapshot=..[&wait=1&timeout=N]
///   GET  conversations/:peer/messages     ?after=..[&wait=1&timeout=N]&active=1
///   POST conversations/:peer/read         body: {"last_message_id":..,"last_message_at":..}
///   POST <form action>                    form-encoded reaction fields
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::sync_types::{
    MessagePayload, MessageQuery, NotificationPayload, NotificationQuery, ReactionPayload,
    ReadReceipt,
};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, COOKIE};
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[async_trait]
pub trait SyncTransport: Send + Sync + 'static {
    /// Resolves to `SyncError::Cancelled` as soon as `cancel` fires.
    async fn fetch_notifications(
        &self,
        query: &NotificationQuery,
        cancel: &CancellationToken,
    ) -> Result<NotificationPayload>;

    /// Resolves to `SyncError::Cancelled` as soon as `cancel` fires.
    async fn fetch_messages(
        &self,
        peer_id: u64,
        query: &MessageQuery,
        cancel: &CancellationToken,
    ) -> Result<MessagePayload>;

    async fn send_read_receipt(&self, peer_id: u64, receipt: &ReadReceipt) -> Result<()>;

    async fn submit_reaction(
        &self,
        action: &str,
        fields: &[(String, String)],
    ) -> Result<ReactionPayload>;

    /// Absolute URL for a form action, used by the full-page fallback
    fn resolve_action(&self, action: &str) -> Result<String>;
}

/// Race a request against its cancellation token
pub async fn cancellable<T>(
    cancel: &CancellationToken,
    request: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        result = request => result,
    }
}

/// Same-origin, credentialed JSON client over reqwest
#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
    base_url: Url,
    session_cookie: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        // Trailing slash so relative joins land under the API root
        let base_url = Url::parse(&format!("{}/", config.base_url.trim_end_matches('/')))
            .map_err(|e| SyncError::Config(format!("Invalid base URL {}: {}", config.base_url, e)))?;
        Ok(Self {
            http,
            base_url,
            session_cookie: config.session_cookie.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| SyncError::Config(format!("Invalid endpoint {}: {}", path, e)))
    }

    fn with_session(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.header(ACCEPT, "application/json");
        match &self.session_cookie {
            Some(cookie) => builder.header(COOKIE, cookie.as_str()),
            None => builder,
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let res = self.with_session(builder).send().await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(SyncError::Status { status, body });
        }
        let bytes = res.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn fetch_notifications(
        &self,
        query: &NotificationQuery,
        cancel: &CancellationToken,
    ) -> Result<NotificationPayload> {
        let url = self.endpoint("notifications")?;
        debug!("GET {} (hold: {:?})", url, query.hold);
        let request = self.http.get(url).query(&query.to_pairs());
        cancellable(cancel, self.send_json(request)).await
    }

    async fn fetch_messages(
        &self,
        peer_id: u64,
        query: &MessageQuery,
        cancel: &CancellationToken,
    ) -> Result<MessagePayload> {
        let url = self.endpoint(&format!("conversations/{}/messages", peer_id))?;
        debug!("GET {} after {} (hold: {:?})", url, query.after, query.hold);
        let request = self.http.get(url).query(&query.to_pairs());
        cancellable(cancel, self.send_json(request)).await
    }

    async fn send_read_receipt(&self, peer_id: u64, receipt: &ReadReceipt) -> Result<()> {
        let url = self.endpoint(&format!("conversations/{}/read", peer_id))?;
        let res = self
            .with_session(self.http.post(url).json(receipt))
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(SyncError::Status { status, body });
        }
        Ok(())
    }

    async fn submit_reaction(
        &self,
        action: &str,
        fields: &[(String, String)],
    ) -> Result<ReactionPayload> {
        let url = self.resolve_action(action)?;
        debug!("POST {} ({} fields)", url, fields.len());
        self.send_json(self.http.post(url).form(fields)).await
    }

    fn resolve_action(&self, action: &str) -> Result<String> {
        self.endpoint(action).map(String::from)
    }
}
