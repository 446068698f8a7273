use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

use shared::{
    domain::ReplyToken,
    protocol::{OutboundMessage, TemplateAction},
};

type HmacSha256 = Hmac<Sha256>;

pub const REPLY_ENDPOINT: &str = "https://api.line.me/v2/bot/message/reply";
pub const SIGNATURE_HEADER: &str = "x-line-signature";

#[derive(Debug, Error)]
#[error("reply API returned {status}")]
pub struct ReplyApiError {
    pub status: reqwest::StatusCode,
}

/// Base64 HMAC-SHA256 of the raw request body, keyed by the channel
/// secret. This is what the platform puts in `x-line-signature`.
pub fn signature_for(channel_secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(channel_secret.as_bytes())
        .expect("hmac accepts any key length");
    mac.update(body);
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Constant-time check of an inbound webhook signature.
pub fn verify_signature(channel_secret: &str, body: &[u8], signature_b64: &str) -> bool {
    let Ok(expected) = STANDARD.decode(signature_b64.as_bytes()) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(channel_secret.as_bytes())
        .expect("hmac accepts any key length");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Outbound seam: one reply per reply token.
#[async_trait]
pub trait ReplyGateway: Send + Sync {
    async fn send_reply(&self, reply_token: &ReplyToken, message: &OutboundMessage) -> Result<()>;
}

/// Reply-API client. Holds the channel access token for bearer auth.
#[derive(Clone)]
pub struct LineGateway {
    endpoint: String,
    channel_access_token: String,
    http: reqwest::Client,
}

impl LineGateway {
    pub fn new(channel_access_token: String) -> Self {
        Self::with_endpoint(REPLY_ENDPOINT.to_string(), channel_access_token)
    }

    /// Endpoint override for tests and local stubs.
    pub fn with_endpoint(endpoint: String, channel_access_token: String) -> Self {
        Self {
            endpoint,
            channel_access_token,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ReplyGateway for LineGateway {
    async fn send_reply(&self, reply_token: &ReplyToken, message: &OutboundMessage) -> Result<()> {
        let payload = json!({
            "replyToken": reply_token.0,
            "messages": [message_json(message)],
        });

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.channel_access_token)
            .json(&payload)
            .send()
            .await
            .context("reply request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "reply API returned non-success");
            return Err(ReplyApiError { status }.into());
        }

        Ok(())
    }
}

/// Wire shape of one message object in a reply request.
pub fn message_json(message: &OutboundMessage) -> serde_json::Value {
    match message {
        OutboundMessage::Text { text } => json!({
            "type": "text",
            "text": text,
        }),
        OutboundMessage::ButtonsTemplate {
            alt_text,
            title,
            text,
            actions,
        } => json!({
            "type": "template",
            "altText": alt_text,
            "template": {
                "type": "buttons",
                "title": title,
                "text": text,
                "actions": actions.iter().map(action_json).collect::<Vec<_>>(),
            },
        }),
    }
}

fn action_json(action: &TemplateAction) -> serde_json::Value {
    json!({
        "type": "postback",
        "label": action.label,
        "data": action.data,
    })
}
