//! Events flowing from the poster core to whatever presents them.
//!
//! The core never touches presentation state; it calls an [`Observer`], which
//! may be invoked from any worker task.

use std::fmt;

use chrono::{DateTime, Local};
use tokio::sync::mpsc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn marker(self) -> &'static str {
        match self {
            Severity::Info => "ℹ️",
            Severity::Success => "✅",
            Severity::Warning => "⚠️",
            Severity::Error => "❌",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Log {
        at: DateTime<Local>,
        severity: Severity,
        message: String,
    },
    /// 0..=100
    Progress(u8),
    RunningChanged(bool),
    /// Credentials rejected or missing, settings have to be reopened.
    SettingsRequired(String),
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Log { at, severity, message } => {
                write!(f, "[{}] {} {}", at.format("%H:%M:%S"), severity.marker(), message)
            }
            Event::Progress(p) => write!(f, "progress {}%", p),
            Event::RunningChanged(true) => f.write_str("bot started"),
            Event::RunningChanged(false) => f.write_str("bot stopped"),
            Event::SettingsRequired(reason) => write!(f, "settings required: {}", reason),
        }
    }
}

pub trait Observer: Send + Sync {
    fn on_log(&self, severity: Severity, message: &str);
    fn on_progress(&self, percent: u8);
    fn on_running_state_changed(&self, running: bool);
    fn on_settings_required(&self, reason: &str);

    fn info(&self, message: &str) {
        tracing::info!("{}", message);
        self.on_log(Severity::Info, message);
    }

    fn success(&self, message: &str) {
        tracing::info!("{}", message);
        self.on_log(Severity::Success, message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
        self.on_log(Severity::Warning, message);
    }

    fn error(&self, message: &str) {
        tracing::error!("{}", message);
        self.on_log(Severity::Error, message);
    }
}

/// Forwards everything as [`Event`]s over an unbounded channel.
#[derive(Clone, Debug)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<Event>,
}

pub fn channel() -> (ChannelObserver, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelObserver { tx }, rx)
}

impl ChannelObserver {
    fn emit(&self, event: Event) {
        // Nobody listening is fine, the core keeps working headless.
        let _ = self.tx.send(event);
    }
}

impl Observer for ChannelObserver {
    fn on_log(&self, severity: Severity, message: &str) {
        self.emit(Event::Log {
            at: Local::now(),
            severity,
            message: message.to_string(),
        });
    }

    fn on_progress(&self, percent: u8) {
        self.emit(Event::Progress(percent.min(100)));
    }

    fn on_running_state_changed(&self, running: bool) {
        self.emit(Event::RunningChanged(running));
    }

    fn on_settings_required(&self, reason: &str) {
        self.emit(Event::SettingsRequired(reason.to_string()));
    }
}
