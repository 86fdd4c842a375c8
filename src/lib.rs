//! Stickerforge
//!
//! Turns a user-submitted image into a themed set of labeled stickers:
//! resize, dynamic text-fit overlay, lossy re-encode, then publication of
//! the set through the Telegram Bot API. Jobs run through a pluggable,
//! concurrency-bounded queue with an in-process and a durable (Redis)
//! backend.

pub mod app_state;
pub mod config;
pub mod models;
pub mod orchestrator;
pub mod routes;
pub mod services;
