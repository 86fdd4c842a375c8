use std::path::PathBuf;

use serde::Deserialize;

/// Service configuration, loaded from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Telegram bot token used by the distribution client.
    pub bot_token: String,

    /// Bot username, required for sticker set name suffixes.
    #[serde(default = "default_bot_username")]
    pub bot_username: String,

    /// Redis connection string. Absent means the in-process queue backend.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Maximum number of jobs processed concurrently.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Priority recorded on durable queue payloads.
    #[serde(default = "default_queue_priority")]
    pub queue_priority: u8,

    /// Base delay for the durable backend's exponential retry backoff.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Square sticker canvas side length in pixels.
    #[serde(default = "default_sticker_size")]
    pub sticker_size: u32,

    /// Lossy codec quality (0-100) for the final encode stage.
    #[serde(default = "default_codec_quality")]
    pub codec_quality: u8,

    /// Largest font size tried by the text fitter.
    #[serde(default = "default_font_ceiling")]
    pub font_ceiling: f32,

    /// Smallest font size the text fitter may return.
    #[serde(default = "default_font_floor")]
    pub font_floor: f32,

    /// Decrement between tried font sizes.
    #[serde(default = "default_font_step")]
    pub font_step: f32,

    /// Padding between the text block and the canvas edges.
    #[serde(default = "default_text_padding")]
    pub text_padding: f32,

    /// Maximum fraction of the canvas height the text block may occupy.
    #[serde(default = "default_max_block_fraction")]
    pub max_block_fraction: f32,

    /// Vertical anchor for the text block.
    #[serde(default)]
    pub text_anchor: TextAnchor,

    /// TTF font file for the overlay. Falls back to a system font search.
    #[serde(default)]
    pub font_path: Option<PathBuf>,

    /// Directory for downloaded sources and intermediate artifacts.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Texts overlaid on the stickers, one sticker per label.
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
}

/// Vertical placement of the fitted text block on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAnchor {
    Top,
    Center,
    #[default]
    Bottom,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_bot_username() -> String {
    "stickerforge_bot".to_string()
}

fn default_max_concurrent_jobs() -> usize {
    3
}

fn default_queue_priority() -> u8 {
    1
}

fn default_retry_base_delay_ms() -> u64 {
    2000
}

fn default_sticker_size() -> u32 {
    512
}

fn default_codec_quality() -> u8 {
    90
}

fn default_font_ceiling() -> f32 {
    48.0
}

fn default_font_floor() -> f32 {
    24.0
}

fn default_font_step() -> f32 {
    4.0
}

fn default_text_padding() -> f32 {
    20.0
}

fn default_max_block_fraction() -> f32 {
    0.5
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("tmp")
}

fn default_labels() -> Vec<String> {
    [
        "Assalomu alaykum",
        "Vaaalaykum assalom",
        "Rahmat",
        "Yaxshimisiz?",
        "Xayr",
        "Ha",
        "Yo'q",
        "Kechirasiz",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Reject configurations the pipeline and queue cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_jobs must be a positive integer".into(),
            ));
        }
        if self.sticker_size == 0 {
            return Err(ConfigError::Invalid(
                "sticker_size must be a positive integer".into(),
            ));
        }
        if self.codec_quality > 100 {
            return Err(ConfigError::Invalid("codec_quality must be in 0-100".into()));
        }
        if self.font_floor <= 0.0 || self.font_ceiling < self.font_floor {
            return Err(ConfigError::Invalid(
                "font sizes must satisfy 0 < font_floor <= font_ceiling".into(),
            ));
        }
        if self.font_step <= 0.0 {
            return Err(ConfigError::Invalid("font_step must be positive".into()));
        }
        if !(self.max_block_fraction > 0.0 && self.max_block_fraction <= 1.0) {
            return Err(ConfigError::Invalid(
                "max_block_fraction must be in (0, 1]".into(),
            ));
        }
        if self.labels.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one sticker label is required".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            bind_addr: default_bind_addr(),
            bot_token: "test-token".into(),
            bot_username: default_bot_username(),
            redis_url: None,
            max_concurrent_jobs: default_max_concurrent_jobs(),
            queue_priority: default_queue_priority(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            sticker_size: default_sticker_size(),
            codec_quality: default_codec_quality(),
            font_ceiling: default_font_ceiling(),
            font_floor: default_font_floor(),
            font_step: default_font_step(),
            text_padding: default_text_padding(),
            max_block_fraction: default_max_block_fraction(),
            text_anchor: TextAnchor::default(),
            font_path: None,
            temp_dir: default_temp_dir(),
            labels: default_labels(),
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn rejects_zero_concurrency() {
        let mut config = base_config();
        config.max_concurrent_jobs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_font_bounds() {
        let mut config = base_config();
        config.font_floor = 64.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_anchor_is_bottom() {
        assert_eq!(TextAnchor::default(), TextAnchor::Bottom);
    }
}
