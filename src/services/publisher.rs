//! Distribution collaborator: publishes a finished sticker set and carries
//! user notifications. The concrete client talks to the Telegram Bot API;
//! the orchestrator only sees the trait.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use reqwest::multipart;
use reqwest::Client;
use serde::Deserialize;

/// One artifact reference plus its assigned short tag.
#[derive(Debug, Clone)]
pub struct SetItem {
    pub artifact_ref: String,
    pub tag: String,
}

/// Fixed cyclic tag table; item `i` gets `EMOJI_TAGS[i % len]`.
pub const EMOJI_TAGS: &[&str] = &["👋", "🙏", "🙏", "😊", "👋", "✅", "❌", "🙏"];

pub fn tag_for_index(index: usize) -> &'static str {
    EMOJI_TAGS[index % EMOJI_TAGS.len()]
}

pub type PublishFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PublishError>> + Send + 'a>>;

/// External distribution service. Only error text crosses this boundary;
/// the service exposes no structured error codes.
pub trait StickerPublisher: Send + Sync {
    /// Upload one artifact file; returns the service's reference for it.
    fn upload_artifact<'a>(&'a self, owner_id: i64, path: &'a Path) -> PublishFuture<'a, String>;

    /// Create the named artifact set from uploaded references; returns the
    /// public reference (URL) of the set.
    fn create_artifact_set<'a>(
        &'a self,
        owner_id: i64,
        set_name: &'a str,
        title: &'a str,
        items: &'a [SetItem],
    ) -> PublishFuture<'a, String>;

    /// Send a text notification to a channel.
    fn notify<'a>(&'a self, channel_id: i64, text: &'a str) -> PublishFuture<'a, ()>;

    /// Generate a fresh, unique set name owned by this service's namespace.
    fn new_set_name(&self, owner_id: i64) -> String;
}

/// Telegram Bot API envelope.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    file_id: String,
}

pub struct TelegramPublisher {
    http: Client,
    base_url: String,
    bot_username: String,
}

impl TelegramPublisher {
    pub fn new(token: &str, bot_username: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: format!("https://api.telegram.org/bot{token}"),
            bot_username: bot_username.to_string(),
        }
    }

    pub fn set_url(set_name: &str) -> String {
        format!("https://t.me/addstickers/{set_name}")
    }

    fn unwrap_envelope<T>(envelope: ApiEnvelope<T>) -> Result<T, PublishError> {
        if !envelope.ok {
            return Err(PublishError::Api(
                envelope
                    .description
                    .unwrap_or_else(|| "unknown API error".to_string()),
            ));
        }
        envelope
            .result
            .ok_or_else(|| PublishError::Api("API reported ok without a result".to_string()))
    }

    async fn upload(&self, owner_id: i64, path: &Path) -> Result<String, PublishError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sticker.jpg".to_string());

        let form = multipart::Form::new()
            .text("user_id", owner_id.to_string())
            .text("sticker_format", "static")
            .part("sticker", multipart::Part::bytes(bytes).file_name(file_name));

        let envelope: ApiEnvelope<UploadedFile> = self
            .http
            .post(format!("{}/uploadStickerFile", self.base_url))
            .multipart(form)
            .send()
            .await?
            .json()
            .await?;
        let file = Self::unwrap_envelope(envelope)?;
        Ok(file.file_id)
    }

    async fn create_set(
        &self,
        owner_id: i64,
        set_name: &str,
        title: &str,
        items: &[SetItem],
    ) -> Result<String, PublishError> {
        let stickers: Vec<serde_json::Value> = items
            .iter()
            .map(|item| {
                serde_json::json!({
                    "sticker": item.artifact_ref,
                    "emoji_list": [item.tag],
                })
            })
            .collect();

        let body = serde_json::json!({
            "user_id": owner_id,
            "name": set_name,
            "title": title,
            "stickers": stickers,
            "sticker_format": "static",
        });

        let envelope: ApiEnvelope<bool> = self
            .http
            .post(format!("{}/createNewStickerSet", self.base_url))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;
        Self::unwrap_envelope(envelope)?;
        tracing::info!(set_name, count = items.len(), "Sticker set created");
        Ok(Self::set_url(set_name))
    }

    async fn send_message(&self, channel_id: i64, text: &str) -> Result<(), PublishError> {
        let body = serde_json::json!({
            "chat_id": channel_id,
            "text": text,
        });
        let envelope: ApiEnvelope<serde_json::Value> = self
            .http
            .post(format!("{}/sendMessage", self.base_url))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;
        Self::unwrap_envelope(envelope)?;
        Ok(())
    }
}

impl StickerPublisher for TelegramPublisher {
    fn upload_artifact<'a>(&'a self, owner_id: i64, path: &'a Path) -> PublishFuture<'a, String> {
        Box::pin(self.upload(owner_id, path))
    }

    fn create_artifact_set<'a>(
        &'a self,
        owner_id: i64,
        set_name: &'a str,
        title: &'a str,
        items: &'a [SetItem],
    ) -> PublishFuture<'a, String> {
        Box::pin(self.create_set(owner_id, set_name, title, items))
    }

    fn notify<'a>(&'a self, channel_id: i64, text: &'a str) -> PublishFuture<'a, ()> {
        Box::pin(self.send_message(channel_id, text))
    }

    /// Set names must be unique per owner and end with `_by_<bot_username>`.
    /// The timestamp keeps retried attempts from colliding with a set the
    /// service may already hold.
    fn new_set_name(&self, owner_id: i64) -> String {
        let timestamp = chrono::Utc::now().timestamp_millis();
        format!("ai_stickers_{owner_id}_{timestamp}_by_{}", self.bot_username)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Distribution request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Api(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_cycle_by_position() {
        assert_eq!(tag_for_index(0), "👋");
        assert_eq!(tag_for_index(EMOJI_TAGS.len()), "👋");
        assert_eq!(tag_for_index(EMOJI_TAGS.len() + 3), tag_for_index(3));
    }

    #[test]
    fn set_names_carry_owner_and_bot_suffix() {
        let publisher = TelegramPublisher::new("token", "forge_bot");
        let name = publisher.new_set_name(42);
        assert!(name.starts_with("ai_stickers_42_"));
        assert!(name.ends_with("_by_forge_bot"));
    }
}
