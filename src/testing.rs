//! Test doubles for the backend and the observer.

use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::{
    backend::MessagingBackend,
    error::SendError,
    events::{Event, Observer, Severity},
    media::{MediaItem, MediaKind},
};

#[derive(Clone, Debug)]
pub struct SentBatch {
    pub channel_id: String,
    pub paths: Vec<PathBuf>,
    pub kinds: Vec<MediaKind>,
    pub caption: Option<String>,
}

/// Lets a test hold a send call open.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

type Hook = Box<dyn FnMut() + Send>;

/// Records every send. Answers from `script` first, `Ok(())` once it runs out.
#[derive(Default)]
pub struct FakeBackend {
    calls: Mutex<Vec<SentBatch>>,
    script: Mutex<VecDeque<Result<(), SendError>>>,
    hook: Mutex<Option<Hook>>,
    gate: Option<Arc<Gate>>,
    reject_identity: bool,
}

impl FakeBackend {
    pub fn scripted(script: Vec<Result<(), SendError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    pub fn gated() -> (Self, Arc<Gate>) {
        let gate = Arc::new(Gate::default());
        let backend = Self {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        (backend, gate)
    }

    pub fn rejecting_identity() -> Self {
        Self {
            reject_identity: true,
            ..Default::default()
        }
    }

    /// Runs on every send, before it answers.
    pub fn on_send(&self, hook: impl FnMut() + Send + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<SentBatch> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingBackend for FakeBackend {
    async fn send_media_batch(
        &self,
        channel_id: &str,
        items: &[MediaItem],
        caption: Option<&str>,
    ) -> Result<(), SendError> {
        self.calls.lock().unwrap().push(SentBatch {
            channel_id: channel_id.to_string(),
            paths: items.iter().map(|i| i.path.clone()).collect(),
            kinds: items.iter().map(|i| i.kind).collect(),
            caption: caption.map(String::from),
        });

        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        if let Some(hook) = self.hook.lock().unwrap().as_mut() {
            hook();
        }

        self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn get_identity(&self) -> Result<String, SendError> {
        if self.reject_identity {
            Err(SendError::Api {
                code: 401,
                description: "Unauthorized".into(),
            })
        } else {
            Ok("test_bot".into())
        }
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn logs(&self, severity: Severity) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Log { severity: s, message, .. } if s == severity => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl Observer for RecordingObserver {
    fn on_log(&self, severity: Severity, message: &str) {
        self.events.lock().unwrap().push(Event::Log {
            at: chrono::Local::now(),
            severity,
            message: message.to_string(),
        });
    }

    fn on_progress(&self, percent: u8) {
        self.events.lock().unwrap().push(Event::Progress(percent));
    }

    fn on_running_state_changed(&self, running: bool) {
        self.events.lock().unwrap().push(Event::RunningChanged(running));
    }

    fn on_settings_required(&self, reason: &str) {
        self.events.lock().unwrap().push(Event::SettingsRequired(reason.to_string()));
    }
}
