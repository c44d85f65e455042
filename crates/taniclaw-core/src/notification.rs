//! Outbound notifications over Telegram and WhatsApp.
//!
//! Delivery is best effort. A failed send is logged and reported as `false`
//! but never fails a cycle.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::NotificationConfig;
use crate::error::Result;
use crate::executor::ExecutionResult;
use crate::types::ActionType;

const MESSAGE_HEADER: &str = "🌱 TaniClaw";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    #[default]
    Normal,
    High,
    Critical,
}

impl NotificationPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationPriority::Normal => "normal",
            NotificationPriority::High => "high",
            NotificationPriority::Critical => "critical",
        }
    }
}

impl fmt::Display for NotificationPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Returns whether the message was delivered.
    async fn send(&self, message: &str, priority: NotificationPriority) -> bool;
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

pub struct Notifier {
    http: reqwest::Client,
    config: NotificationConfig,
}

impl Notifier {
    pub fn new(config: NotificationConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    async fn send_telegram(&self, token: &str, chat_id: &str, message: &str) -> Result<()> {
        let url = format!(
            "{}/bot{token}/sendMessage",
            self.config.telegram_api_base.trim_end_matches('/')
        );
        self.http
            .post(&url)
            .json(&json!({
                "chat_id": chat_id,
                "text": format!("{MESSAGE_HEADER}\n\n{message}"),
                "parse_mode": "HTML",
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn send_whatsapp(&self, url: &str, key: &str, message: &str) -> Result<()> {
        self.http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, key)
            .json(&json!({ "message": format!("{MESSAGE_HEADER}\n\n{message}") }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl NotificationChannel for Notifier {
    async fn send(&self, message: &str, priority: NotificationPriority) -> bool {
        if !self.config.enabled {
            tracing::info!(%priority, "notification (disabled): {message}");
            return true;
        }

        let mut results = Vec::new();
        if let Some((token, chat_id)) = self.config.telegram() {
            let sent = self.send_telegram(token, chat_id, message).await;
            if let Err(e) = &sent {
                tracing::error!(error = %e, "telegram notification failed");
            }
            results.push(sent.is_ok());
        }
        if let Some((url, key)) = self.config.whatsapp() {
            let sent = self.send_whatsapp(url, key, message).await;
            if let Err(e) = &sent {
                tracing::error!(error = %e, "whatsapp notification failed");
            }
            results.push(sent.is_ok());
        }

        if results.is_empty() {
            tracing::info!(%priority, "notification (no channel configured): {message}");
            return true;
        }
        let delivered = results.iter().any(|ok| *ok);
        if delivered {
            tracing::info!(%priority, channels = results.len(), "notification sent");
        } else {
            tracing::error!(%priority, "all notification channels failed");
        }
        delivered
    }
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

fn marker(action_type: &ActionType) -> &'static str {
    match action_type {
        ActionType::Water => "💧",
        ActionType::SkipWater => "⏭️",
        ActionType::Fertilize => "🌿",
        ActionType::Harvest => "🌾",
        ActionType::Notify => "🔔",
        ActionType::Alert => "⚠️",
        ActionType::Log => "📝",
        ActionType::Other(_) => "•",
    }
}

/// One line per executed action, or a nothing-to-do line.
pub fn format_daily_summary(plant_name: &str, results: &[ExecutionResult]) -> String {
    let mut lines = vec![format!("📋 Daily summary: {plant_name}"), String::new()];
    if results.is_empty() {
        lines.push("✅ No action needed today.".to_string());
    }
    for r in results {
        lines.push(format!("{} {}", marker(&r.action_type), r.description));
    }
    lines.join("\n")
}

pub fn format_alert(plant_name: &str, description: &str) -> String {
    let description = if description.is_empty() {
        "unknown alert"
    } else {
        description
    };
    format!("⚠️ TANICLAW ALERT: {plant_name}\n\n{description}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
