use std::sync::{Arc, OnceLock};

use anyhow::Result;
use chrono::Utc;
use regex::Regex;
use tracing::{debug, warn};

use line_gateway::ReplyGateway;
use shared::{
    domain::{ExamRecord, InboundEvent, RecordId, ReplyToken},
    protocol::{OutboundMessage, TemplateAction},
};
use storage::RecordStore;

pub const REGISTER_COMMAND: &str = "試験登録";
pub const LIST_COMMAND: &str = "試験一覧";
pub const ACTION_REGISTER: &str = "action=register";
pub const ACTION_LIST: &str = "action=list";

const REGISTER_PROMPT: &str = "試験名:yyyy-mm-ddで登録してください。";
const REGISTER_OK: &str = "登録しました";
const REGISTER_FAILED: &str = "登録に失敗しました。もう一度試してください。";
const LIST_HEADER: &str = "登録された試験一覧:";
const LIST_EMPTY: &str = "まだ試験は登録されていません。";
const CHOICE_ALT_TEXT: &str = "試験登録 or 試験一覧";
const CHOICE_TITLE: &str = "選択してください";
const CHOICE_TEXT: &str = "試験登録または試験一覧を選んでください";

/// `<name>:<yyyy-mm-dd>`. The name part permits word characters,
/// whitespace, hiragana, katakana and kanji; the date part is checked
/// for digit widths only, not calendar validity.
fn registration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[\w\sぁ-んァ-ン一-龥々ー]+:\d{4}-\d{2}-\d{2}$")
            .expect("registration pattern compiles")
    })
}

fn parse_registration(text: &str) -> Option<(&str, &str)> {
    if !registration_pattern().is_match(text) {
        return None;
    }
    let (name, date) = text.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, date.trim()))
}

/// Classifies a webhook batch and issues exactly one reply per handled
/// event. Holds no state across invocations; both collaborators are
/// injected at construction.
pub struct Dispatcher {
    store: Arc<dyn RecordStore>,
    gateway: Arc<dyn ReplyGateway>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn RecordStore>, gateway: Arc<dyn ReplyGateway>) -> Self {
        Self { store, gateway }
    }

    /// Two fixed passes over the batch: every message event in arrival
    /// order, then every postback event in arrival order.
    pub async fn dispatch(&self, events: &[InboundEvent]) -> Result<()> {
        for event in events {
            if let InboundEvent::TextMessage { reply_token, text } = event {
                self.handle_text(reply_token, text).await?;
            }
        }
        for event in events {
            if let InboundEvent::Postback {
                reply_token,
                action,
            } = event
            {
                self.handle_postback(reply_token, action).await?;
            }
        }
        Ok(())
    }

    async fn handle_text(&self, reply_token: &ReplyToken, text: &str) -> Result<()> {
        if text == REGISTER_COMMAND {
            debug!("register command");
            self.gateway
                .send_reply(reply_token, &OutboundMessage::text(REGISTER_PROMPT))
                .await
        } else if let Some((name, date)) = parse_registration(text) {
            debug!(name, date, "registration payload");
            self.register(reply_token, name, date).await
        } else if text == LIST_COMMAND {
            debug!("list command");
            let reply = self.list_reply().await?;
            self.gateway.send_reply(reply_token, &reply).await
        } else {
            debug!("unmatched text, offering choice prompt");
            self.gateway
                .send_reply(reply_token, &choice_prompt())
                .await
        }
    }

    async fn handle_postback(&self, reply_token: &ReplyToken, action: &str) -> Result<()> {
        match action {
            ACTION_REGISTER => {
                self.gateway
                    .send_reply(reply_token, &OutboundMessage::text(REGISTER_PROMPT))
                    .await
            }
            ACTION_LIST => {
                let reply = self.list_reply().await?;
                self.gateway.send_reply(reply_token, &reply).await
            }
            other => {
                // No reply for unknown actions; the token goes unused.
                warn!(action = other, "unrecognized postback action dropped");
                Ok(())
            }
        }
    }

    async fn register(&self, reply_token: &ReplyToken, name: &str, date: &str) -> Result<()> {
        let record = ExamRecord {
            id: RecordId::generate(),
            name: name.to_string(),
            date: date.to_string(),
            created_at: Utc::now(),
        };
        let reply = match self.store.create(&record).await {
            Ok(()) => OutboundMessage::text(REGISTER_OK),
            Err(error) => {
                // Downgraded to a generic retry prompt; the batch goes on.
                warn!(%error, "exam record create failed");
                OutboundMessage::text(REGISTER_FAILED)
            }
        };
        self.gateway.send_reply(reply_token, &reply).await
    }

    async fn list_reply(&self) -> Result<OutboundMessage> {
        let records = self.store.scan_all().await?;
        if records.is_empty() {
            return Ok(OutboundMessage::text(LIST_EMPTY));
        }
        let lines: Vec<String> = records
            .iter()
            .map(|r| format!("{} : {}", r.name, r.date))
            .collect();
        Ok(OutboundMessage::text(format!(
            "{LIST_HEADER}\n{}",
            lines.join("\n")
        )))
    }
}

fn choice_prompt() -> OutboundMessage {
    OutboundMessage::ButtonsTemplate {
        alt_text: CHOICE_ALT_TEXT.to_string(),
        title: CHOICE_TITLE.to_string(),
        text: CHOICE_TEXT.to_string(),
        actions: vec![
            TemplateAction {
                label: REGISTER_COMMAND.to_string(),
                data: ACTION_REGISTER.to_string(),
            },
            TemplateAction {
                label: LIST_COMMAND.to_string(),
                data: ACTION_LIST.to_string(),
            },
        ],
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
