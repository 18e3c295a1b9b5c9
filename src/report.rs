//! Progress and log reporting.
//!
//! The engine never talks to a UI directly. It is handed a [`Reporter`] and
//! emits `(current, total, message)` progress events and free-form log
//! lines through it.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Receives progress and log events from a harvest
pub trait Reporter: Send + Sync {
    fn on_progress(&self, current: u32, total: u32, message: &str);

    fn on_log(&self, message: &str);
}

/// An event as delivered by [`ChannelReporter`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarvestEvent {
    Progress {
        current: u32,
        total: u32,
        message: String,
    },
    Log(String),
}

/// Writes every event through the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn on_progress(&self, current: u32, total: u32, message: &str) {
        ::log::info!("[{}/{}] {}", current, total, message);
    }

    fn on_log(&self, message: &str) {
        ::log::info!("{}", message);
    }
}

/// Forwards events to a channel, for callers that render them elsewhere
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<HarvestEvent>,
}

impl ChannelReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HarvestEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Reporter for ChannelReporter {
    fn on_progress(&self, current: u32, total: u32, message: &str) {
        // A dropped receiver only means nobody is listening any more
        let _ = self.tx.send(HarvestEvent::Progress {
            current,
            total,
            message: message.to_string(),
        });
    }

    fn on_log(&self, message: &str) {
        ::log::debug!("{}", message);
        let _ = self.tx.send(HarvestEvent::Log(message.to_string()));
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn on_progress(&self, _current: u32, _total: u32, _message: &str) {}

    fn on_log(&self, _message: &str) {}
}
