//! The bridge control endpoint.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::error::BridgeError;
use crate::config::BridgeConfig;

/// Lifecycle verb sent to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeVerb {
    Start,
    Stop,
}

impl BridgeVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeVerb::Start => "start",
            BridgeVerb::Stop => "stop",
        }
    }
}

impl fmt::Display for BridgeVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flags accompanying a verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeFlags {
    /// Flush buffered operations before acting.
    pub flush: bool,
    /// Stream ledger operations while running.
    pub stream: bool,
}

impl BridgeFlags {
    pub const START: BridgeFlags = BridgeFlags {
        flush: false,
        stream: true,
    };
    pub const STOP: BridgeFlags = BridgeFlags {
        flush: true,
        stream: false,
    };
    /// Stop without flushing.
    pub const FORCE_STOP: BridgeFlags = BridgeFlags {
        flush: false,
        stream: false,
    };
}

/// State the bridge reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeStatus {
    Running,
    AlreadyRunning,
    Stopped,
    AlreadyStopped,
}

#[derive(Debug, Serialize)]
struct ControlRequest {
    verb: BridgeVerb,
    #[serde(flatten)]
    flags: BridgeFlags,
}

#[derive(Debug, Deserialize)]
struct ControlResponse {
    status: BridgeStatus,
}

/// Something that accepts bridge lifecycle verbs.
#[async_trait]
pub trait BridgeControl: Send + Sync {
    async fn send(&self, verb: BridgeVerb, flags: BridgeFlags) -> Result<BridgeStatus, BridgeError>;
}

/// Bridge control over HTTP: `POST {verb, flush, stream}` to the control URL.
#[derive(Debug, Clone)]
pub struct HttpBridgeControl {
    client: reqwest::Client,
    url: Url,
}

impl HttpBridgeControl {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    pub fn from_config(config: &BridgeConfig) -> Result<Self, crate::lifecycle::BoxError> {
        let url = Url::parse(&config.control_url)?;
        Ok(Self::new(url, Duration::from_secs(config.request_timeout_secs))?)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl BridgeControl for HttpBridgeControl {
    async fn send(&self, verb: BridgeVerb, flags: BridgeFlags) -> Result<BridgeStatus, BridgeError> {
        let transport = |source| BridgeError::Transport { verb, source };

        let response = self
            .client
            .post(self.url.clone())
            .json(&ControlRequest { verb, flags })
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BridgeError::Rejected {
                verb,
                status: status.as_u16(),
                message,
            });
        }

        let body: ControlResponse = response.json().await.map_err(transport)?;
        tracing::debug!(verb = %verb, status = ?body.status, "Bridge control acknowledged");
        Ok(body.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    #[test]
    fn request_wire_shape() {
        let body = serde_json::to_value(ControlRequest {
            verb: BridgeVerb::Stop,
            flags: BridgeFlags::STOP,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"verb": "stop", "flush": true, "stream": false}));
    }

    #[tokio::test]
    async fn http_control_posts_verb() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let app = Router::new().route(
            "/control",
            post(move |Json(body): Json<serde_json::Value>| {
                let recorder = recorder.clone();
                async move {
                    recorder.lock().unwrap().push(body);
                    Json(serde_json::json!({"status": "running"}))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let url = Url::parse(&format!("http://{addr}/control")).unwrap();
        let control = HttpBridgeControl::new(url, Duration::from_secs(5)).unwrap();
        let status = control.send(BridgeVerb::Start, BridgeFlags::START).await.unwrap();

        assert_eq!(status, BridgeStatus::Running);
        assert_eq!(seen.lock().unwrap()[0]["stream"], true);
    }

    #[tokio::test]
    async fn non_success_is_rejected() {
        let app = Router::new().route("/control", post(|| async { (axum::http::StatusCode::CONFLICT, "busy") }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let url = Url::parse(&format!("http://{addr}/control")).unwrap();
        let control = HttpBridgeControl::new(url, Duration::from_secs(5)).unwrap();
        let err = control.send(BridgeVerb::Stop, BridgeFlags::STOP).await.unwrap_err();
        assert!(matches!(err, BridgeError::Rejected { status: 409, .. }));
    }
}
