//! REST client for an Evolution API gateway instance.
//!
//! The gateway keeps the WhatsApp Web session (pairing, credentials, wire
//! protocol). Outbound traffic goes through its REST endpoints; inbound events
//! arrive on the webhook served by [`crate::webhook`].

use anyhow::{Context as _, Result, anyhow, bail};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures_util::stream;
use plugin_core::error::HTTP_TIMEOUT;
use plugin_core::{InboundMessage, MediaKind, MediaStream, Outbound, Presence, Transport};
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::supervisor::Connector;

/// Delay the gateway holds a presence state before sending, in milliseconds.
const PRESENCE_DELAY_MS: u64 = 1200;

#[derive(Debug, Clone)]
pub struct EvolutionGateway {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    instance: String,
}

impl EvolutionGateway {
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: Option<String>, instance: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("building gateway HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.filter(|k| !k.is_empty()),
            instance,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}/{}", self.base_url, self.instance)
    }

    /// Send one JSON request; non-2xx responses become errors carrying the body.
    async fn call(&self, method: Method, url: String, body: Option<Value>) -> Result<Value> {
        let mut req = self.http.request(method.clone(), url.as_str());
        if let Some(key) = &self.api_key {
            req = req.header("apikey", key);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("{method} {url}"))?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(GatewayStatus { status, body: text }.into());
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).with_context(|| format!("decoding response of {url}"))
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.call(Method::POST, self.url(path), Some(body)).await
    }

    /// Point the gateway's webhook for this instance at `url`.
    ///
    /// # Errors
    ///
    /// Fails when the gateway rejects the request.
    pub async fn register_webhook(&self, url: &str) -> Result<()> {
        self.post(
            "webhook/set",
            json!({
                "webhook": {
                    "enabled": true,
                    "url": url,
                    "byEvents": false,
                    "base64": false,
                    "events": ["MESSAGES_UPSERT", "CONNECTION_UPDATE", "QRCODE_UPDATED"],
                }
            }),
        )
        .await
        .context("registering webhook")?;
        info!(instance = %self.instance, %url, "Webhook registered");
        Ok(())
    }

    async fn create_instance(&self) -> Result<Value> {
        info!(instance = %self.instance, "Creating gateway instance");
        self.call(
            Method::POST,
            format!("{}/instance/create", self.base_url),
            Some(json!({
                "instanceName": self.instance,
                "integration": "WHATSAPP-BAILEYS",
                "qrcode": true,
            })),
        )
        .await
        .context("creating instance")
    }
}

/// Non-2xx answer from the gateway.
#[derive(Debug)]
struct GatewayStatus {
    status: StatusCode,
    body: String,
}

impl core::fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "gateway answered {}: {}", self.status, plugin_core::truncate(&self.body, 300))
    }
}

impl core::error::Error for GatewayStatus {}

/// Pairing code from a connect or create response, when the gateway asks for one.
fn pairing_code(body: &Value) -> Option<String> {
    body.get("code")
        .or_else(|| body.pointer("/qrcode/code"))
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .map(ToOwned::to_owned)
}

#[async_trait]
impl Connector for EvolutionGateway {
    async fn connect(&self) -> Result<Option<String>> {
        let url = self.url("instance/connect");
        let body = match self.call(Method::GET, url, None).await {
            Ok(body) => body,
            Err(e)
                if e.downcast_ref::<GatewayStatus>()
                    .is_some_and(|s| s.status == StatusCode::NOT_FOUND) =>
            {
                self.create_instance().await?
            }
            Err(e) => return Err(e.context("connecting instance")),
        };
        debug!(instance = %self.instance, response = %body, "Connect response");
        Ok(pairing_code(&body))
    }
}

#[async_trait]
impl Transport for EvolutionGateway {
    async fn send(&self, chat: &str, message: Outbound) -> Result<()> {
        let (path, body) = match message {
            Outbound::Text(text) => ("message/sendText", json!({ "number": chat, "text": text })),
            Outbound::Sticker(webp) => (
                "message/sendSticker",
                json!({ "number": chat, "sticker": STANDARD.encode(webp) }),
            ),
            Outbound::Video { url, caption } => (
                "message/sendMedia",
                json!({
                    "number": chat,
                    "mediatype": "video",
                    "mimetype": "video/mp4",
                    "media": url,
                    "caption": caption,
                    "fileName": "video.mp4",
                }),
            ),
        };
        self.post(path, body)
            .await
            .with_context(|| format!("sending to {chat}"))?;
        Ok(())
    }

    async fn send_presence(&self, chat: &str, presence: Presence) -> Result<()> {
        self.post(
            "chat/sendPresence",
            json!({ "number": chat, "presence": presence.as_str(), "delay": PRESENCE_DELAY_MS }),
        )
        .await
        .map(drop)
    }

    async fn media_stream(&self, message: &InboundMessage, kind: MediaKind) -> Result<MediaStream> {
        let body = self
            .post(
                "chat/getBase64FromMediaMessage",
                json!({ "message": { "key": { "id": message.id } }, "convertToMp4": false }),
            )
            .await
            .with_context(|| format!("fetching {kind} of message {}", message.id))?;
        let encoded = body
            .get("base64")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("gateway returned no media for message {}", message.id))?;
        let bytes = STANDARD
            .decode(encoded.trim())
            .context("decoding base64 media")?;
        if bytes.is_empty() {
            bail!("gateway returned empty media for message {}", message.id);
        }
        Ok(Box::pin(stream::once(async move { Ok(bytes) })))
    }
}
