use std::{collections::HashMap, fs};

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub exam_table_name: String,
    pub channel_secret: String,
    pub channel_access_token: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/exam_bot.db".into(),
            exam_table_name: "exams".into(),
            channel_secret: "devsecret".into(),
            channel_access_token: "devtoken".into(),
        }
    }
}

/// Defaults, overridden by `server.toml`, overridden by environment.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("server.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("bind_addr") {
                settings.server_bind = v.clone();
            }
            if let Some(v) = file_cfg.get("database_url") {
                settings.database_url = v.clone();
            }
            if let Some(v) = file_cfg.get("exam_table_name") {
                settings.exam_table_name = v.clone();
            }
        }
    }

    if let Ok(v) = std::env::var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Ok(v) = std::env::var("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Ok(v) = std::env::var("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Ok(v) = std::env::var("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Ok(v) = std::env::var("EXAM_TABLE_NAME") {
        settings.exam_table_name = v;
    }
    if let Ok(v) = std::env::var("APP__EXAM_TABLE_NAME") {
        settings.exam_table_name = v;
    }

    if let Ok(v) = std::env::var("LINE_CHANNEL_SECRET") {
        settings.channel_secret = v;
    }
    if let Ok(v) = std::env::var("APP__LINE_CHANNEL_SECRET") {
        settings.channel_secret = v;
    }

    if let Ok(v) = std::env::var("LINE_CHANNEL_ACCESS_TOKEN") {
        settings.channel_access_token = v;
    }
    if let Ok(v) = std::env::var("APP__LINE_CHANNEL_ACCESS_TOKEN") {
        settings.channel_access_token = v;
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
