use anyhow::Context;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{header::ACCEPT, Client, RequestBuilder, Response};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{join_path, split_path, ChangeCallback, RecordStore, Subscription};
use crate::{config::Config, error::StoreError};

/// What a streaming-endpoint event means for a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamSignal {
    Changed,
    KeepAlive,
    Closed,
    Ignored,
}

impl StreamSignal {
    fn of(event: &str) -> Self {
        match event {
            "put" | "patch" => Self::Changed,
            "keep-alive" => Self::KeepAlive,
            "cancel" | "auth_revoked" => Self::Closed,
            _ => Self::Ignored,
        }
    }
}

/// Realtime database accessed over its REST API
#[derive(Clone)]
pub struct FirebaseStore {
    client: Client,
    /// Streams stay open indefinitely, so this one has no request timeout
    stream_client: Client,
    base_url: String,
    auth: Option<String>,
}

impl FirebaseStore {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("houselook/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        let stream_client = Client::builder()
            .connect_timeout(config.http_timeout)
            .build()
            .context("Failed to create streaming HTTP client")?;

        Ok(Self {
            client,
            stream_client,
            base_url: config.database_url.trim_end_matches('/').to_string(),
            auth: config.database_auth.clone(),
        })
    }

    fn url(&self, path: &str) -> Result<String, StoreError> {
        let segments = split_path(path)?;
        Ok(format!("{}/{}.json", self.base_url, segments.join("/")))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some(token) => request.query(&[("auth", token)]),
            None => request,
        }
    }

    async fn send(&self, path: &str, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| StoreError::unavailable(path, e))?;

        if !response.status().is_success() {
            warn!("Database returned status {} for '{path}'", response.status());
            return Err(StoreError::unavailable(
                path,
                format!("status {}", response.status()),
            ));
        }

        Ok(response)
    }

    async fn read_json(&self, path: &str, response: Response) -> Result<Value, StoreError> {
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::unavailable(path, e))?;
        serde_json::from_str(&body).map_err(|source| StoreError::Decode {
            path: path.to_string(),
            source,
        })
    }

    /// Follows the streaming endpoint until it closes or the task is aborted
    async fn stream_changes(&self, path: String, on_change: ChangeCallback) {
        let url = match self.url(&path) {
            Ok(url) => url,
            Err(e) => {
                warn!("{e}");
                return;
            }
        };

        let request = self
            .stream_client
            .get(url)
            .header(ACCEPT, "text/event-stream");

        let response = match self.send(&path, request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Could not open change stream: {e}");
                return;
            }
        };

        info!("Listening for changes at '{path}'");
        let mut events = response.bytes_stream().eventsource();

        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    warn!("Change stream for '{path}' failed: {e}");
                    return;
                }
            };

            match StreamSignal::of(&event.event) {
                StreamSignal::Changed => match self.get(&path).await {
                    Ok(value) => on_change(value),
                    Err(e) => warn!("Failed to refresh '{path}' after change: {e}"),
                },
                StreamSignal::KeepAlive => debug!("keep-alive on '{path}'"),
                StreamSignal::Closed => {
                    warn!("Change stream for '{path}' ended by server: {}", event.event);
                    return;
                }
                StreamSignal::Ignored => debug!("Ignoring stream event '{}'", event.event),
            }
        }

        info!("Change stream for '{path}' closed");
    }
}

#[async_trait]
impl RecordStore for FirebaseStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        debug!("GET {path}");
        let response = self.send(path, self.client.get(self.url(path)?)).await?;
        match self.read_json(path, response).await? {
            Value::Null => Ok(None),
            value => Ok(Some(value)),
        }
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        debug!("PUT {path}");
        let request = if value.is_null() {
            self.client.delete(self.url(path)?)
        } else {
            self.client.put(self.url(path)?).json(&value)
        };
        self.send(path, request).await?;
        Ok(())
    }

    async fn update(&self, path: &str, changes: Map<String, Value>) -> Result<(), StoreError> {
        debug!("PATCH {path} ({} paths)", changes.len());
        for key in changes.keys() {
            split_path(&join_path(path, key))?;
        }
        let request = self.client.patch(self.url(path)?).json(&changes);
        self.send(path, request).await?;
        Ok(())
    }

    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError> {
        debug!("POST {path}");
        let response = self
            .send(path, self.client.post(self.url(path)?).json(&value))
            .await?;
        let reply = self.read_json(path, response).await?;

        reply
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StoreError::unavailable(path, "push reply carried no key"))
    }

    async fn subscribe(
        &self,
        path: &str,
        on_change: ChangeCallback,
    ) -> Result<Subscription, StoreError> {
        on_change(self.get(path).await?);

        let store = self.clone();
        let path = path.to_string();
        let task = tokio::spawn(async move { store.stream_changes(path, on_change).await });

        Ok(Subscription::new(move || task.abort()))
    }

    fn backend_name(&self) -> &'static str {
        "firebase"
    }
}
