use serde::Deserialize;

use crate::domain::{InboundEvent, ReplyToken};

/// Raw webhook delivery body: zero or more events.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

impl WebhookPayload {
    pub fn into_events(self) -> Vec<InboundEvent> {
        self.events
            .into_iter()
            .map(WebhookEvent::into_inbound)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WebhookEvent {
    Message {
        #[serde(rename = "replyToken")]
        reply_token: String,
        message: MessageBody,
    },
    Postback {
        #[serde(rename = "replyToken")]
        reply_token: String,
        postback: PostbackBody,
    },
    /// Follow, unfollow, join and any future event types.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostbackBody {
    pub data: String,
}

impl WebhookEvent {
    pub fn into_inbound(self) -> InboundEvent {
        match self {
            WebhookEvent::Message {
                reply_token,
                message,
            } if message.kind == "text" => match message.text {
                Some(text) => InboundEvent::TextMessage {
                    reply_token: ReplyToken(reply_token),
                    text,
                },
                None => InboundEvent::Other,
            },
            WebhookEvent::Message { .. } => InboundEvent::Other,
            WebhookEvent::Postback {
                reply_token,
                postback,
            } => InboundEvent::Postback {
                reply_token: ReplyToken(reply_token),
                action: postback.data,
            },
            WebhookEvent::Unknown => InboundEvent::Other,
        }
    }
}

/// An action offered inside a choice template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateAction {
    pub label: String,
    pub data: String,
}

/// Outbound reply. The gateway owns the wire encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Text {
        text: String,
    },
    /// Buttons template; the platform caps actions at four.
    ButtonsTemplate {
        alt_text: String,
        title: String,
        text: String,
        actions: Vec<TemplateAction>,
    },
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}
