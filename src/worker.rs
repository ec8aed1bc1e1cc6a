//! Long-lived poster: owns the schedule and runs at most one delivery at a time.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::Utc;
use rand::{rngs::StdRng, RngCore, SeedableRng};
use tokio::{
    sync::{mpsc, oneshot, Mutex},
    task::JoinSet,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    backend::MessagingBackend,
    caption::parse_phrases,
    config::Settings,
    delivery::{has_deliverable, Delivery, DeliveryPolicy, DeliveryReport},
    error::{DeliveryError, ScanError, SendError, StorageError, UpdateError},
    events::Observer,
    scanner::scan,
    scheduler::Scheduler,
    storage::Store,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    Manual,
    Scheduled,
}

#[derive(Debug)]
pub enum CycleOutcome {
    NotRunning,
    /// Another delivery holds the guard. The trigger is dropped.
    Busy,
    NotDue,
    ScanFailed(ScanError),
    NothingToPost,
    /// Nothing was sent, the group stays on disk.
    Undeliverable(DeliveryError),
    Posted(DeliveryReport),
    Failed(DeliveryReport),
}

/// Everything a delivery reads or writes, behind one guard.
struct PosterState {
    settings: Settings,
    scheduler: Scheduler,
    rng: Box<dyn RngCore + Send>,
}

pub struct Poster<B> {
    backend: Arc<B>,
    store: Store,
    observer: Arc<dyn Observer>,
    policy: DeliveryPolicy,
    running: AtomicBool,
    state: Mutex<PosterState>,
}

impl<B: MessagingBackend> Poster<B> {
    /// Picks up the persisted last post time from `store`.
    pub fn new(backend: Arc<B>, store: Store, settings: Settings, observer: Arc<dyn Observer>) -> Self {
        let scheduler = Scheduler::new(store.load_last_post_time());

        Self {
            backend,
            store,
            observer,
            policy: DeliveryPolicy::default(),
            running: AtomicBool::new(false),
            state: Mutex::new(PosterState {
                settings,
                scheduler,
                rng: Box::new(StdRng::from_entropy()),
            }),
        }
    }

    pub fn with_policy(mut self, policy: DeliveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.state.get_mut().rng = Box::new(rng);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Verifies the credential with the backend and starts accepting triggers.
    pub async fn start(&self) -> Result<String, SendError> {
        match self.backend.get_identity().await {
            Ok(name) => {
                self.set_running(true);
                self.observer.success(&format!("Bot started. Bot name: {}", name));
                Ok(name)
            }
            Err(e) => {
                self.observer.error(&format!("Token check failed: {}", e));
                self.observer.on_settings_required(&e.to_string());
                Err(e)
            }
        }
    }

    /// An already issued send finishes; only later deliveries are prevented.
    pub fn stop(&self) {
        self.set_running(false);
        self.observer.info("Bot stopped.");
    }

    fn set_running(&self, running: bool) {
        if self.running.swap(running, Ordering::SeqCst) != running {
            self.observer.on_running_state_changed(running);
        }
    }

    pub async fn send_now(&self) -> CycleOutcome {
        self.cycle(Trigger::Manual).await
    }

    pub async fn check_queue(&self) -> CycleOutcome {
        self.cycle(Trigger::Scheduled).await
    }

    async fn cycle(&self, trigger: Trigger) -> CycleOutcome {
        let manual = trigger == Trigger::Manual;

        if !self.is_running() {
            if manual {
                self.observer.warn("Bot is not running.");
            }
            return CycleOutcome::NotRunning;
        }

        let mut guard = match self.state.try_lock() {
            Ok(g) => g,
            Err(_) => {
                if manual {
                    self.observer.warn("A post is already being sent.");
                } else {
                    debug!("delivery in progress, skipping check");
                }
                return CycleOutcome::Busy;
            }
        };
        let state = &mut *guard;

        if !manual {
            let s = &state.settings;
            if !state
                .scheduler
                .is_due(&mut state.rng, Utc::now(), s.min_delay_minutes, s.max_delay_minutes)
            {
                return CycleOutcome::NotDue;
            }
        } else {
            self.observer.info("Sending post...");
        }

        let groups = match scan(&state.settings.folder_path) {
            Ok(g) => g,
            Err(e) => {
                self.observer.error(&format!("Folder scan failed: {}", e));
                return CycleOutcome::ScanFailed(e);
            }
        };

        let delivery = Delivery::new(&*self.backend, &*self.observer, &self.policy);
        let mut loaded_phrases = None;
        let mut undeliverable = None;
        let mut report = None;

        // Groups the lists empty out stay on disk and never block newer ones.
        for group in groups {
            if !has_deliverable(&group, &state.settings) {
                debug!("nothing to post in {}, skipping", group.origin.display());
                continue;
            }

            info!("posting {} ({} files)", group.origin.display(), group.len());
            let phrases: &[String] = loaded_phrases.get_or_insert_with(|| self.store.load_phrases());

            match delivery
                .deliver(&group, &state.settings, phrases, state.rng.as_mut())
                .await
            {
                Ok(r) => {
                    report = Some(r);
                    break;
                }
                Err(DeliveryError::NoDeliverableMedia) => {
                    undeliverable = Some(DeliveryError::NoDeliverableMedia);
                }
                Err(e) => return CycleOutcome::Undeliverable(e),
            }
        }

        let report = match (report, undeliverable) {
            (Some(r), _) => r,
            (None, Some(e)) => return CycleOutcome::Undeliverable(e),
            (None, None) => {
                if manual {
                    self.observer.error("No files to send.");
                }
                return CycleOutcome::NothingToPost;
            }
        };

        if !report.succeeded() {
            return CycleOutcome::Failed(report);
        }

        let now = Utc::now();
        state.scheduler.mark_posted(now);
        if let Err(e) = self.store.save_last_post_time(now) {
            self.observer.error(&format!("Can't save last post time: {}", e));
        }

        CycleOutcome::Posted(report)
    }

    pub async fn settings(&self) -> Settings {
        self.state.lock().await.settings.clone()
    }

    /// Waits for an in-flight delivery, then persists and applies `settings`.
    pub async fn update_settings(&self, settings: Settings) -> Result<(), UpdateError> {
        settings.validate()?;

        let mut state = self.state.lock().await;
        self.store.save_settings(&settings)?;
        state.settings = settings;
        self.observer.success("Settings saved.");

        Ok(())
    }

    pub async fn set_folder(&self, folder: PathBuf) -> Result<(), UpdateError> {
        let mut state = self.state.lock().await;

        let mut settings = state.settings.clone();
        settings.folder_path = folder;
        self.store.save_settings(&settings)?;

        self.observer.info(&format!("Folder selected: {}", settings.folder_path.display()));
        state.settings = settings;

        Ok(())
    }

    /// Trims lines and drops blank ones before saving.
    pub fn update_phrases(&self, lines: &[String]) -> Result<Vec<String>, StorageError> {
        let phrases = parse_phrases(&lines.join("\n"));
        if let Err(e) = self.store.save_phrases(&phrases) {
            self.observer.error(&format!("Can't save phrases: {}", e));
            return Err(e);
        }
        self.observer.info("Phrases updated.");

        Ok(phrases)
    }
}

pub enum Command {
    SendNow(oneshot::Sender<CycleOutcome>),
    Start(oneshot::Sender<Result<String, SendError>>),
    Stop,
    UpdateSettings(Settings, oneshot::Sender<Result<(), UpdateError>>),
    SetFolder(PathBuf, oneshot::Sender<Result<(), UpdateError>>),
    UpdatePhrases(Vec<String>, oneshot::Sender<Result<Vec<String>, StorageError>>),
    Shutdown,
}

/// Cheap clonable front for a running [`run`] loop.
#[derive(Clone)]
pub struct PosterHandle {
    tx: mpsc::Sender<Command>,
}

/// The loop is gone.
#[derive(Debug, thiserror::Error)]
#[error("poster worker has shut down")]
pub struct Closed;

impl PosterHandle {
    pub fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, Closed> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).await.map_err(|_| Closed)?;
        rx.await.map_err(|_| Closed)
    }

    pub async fn send_now(&self) -> Result<CycleOutcome, Closed> {
        self.request(Command::SendNow).await
    }

    pub async fn start(&self) -> Result<Result<String, SendError>, Closed> {
        self.request(Command::Start).await
    }

    pub async fn stop(&self) -> Result<(), Closed> {
        self.tx.send(Command::Stop).await.map_err(|_| Closed)
    }

    pub async fn update_settings(&self, settings: Settings) -> Result<Result<(), UpdateError>, Closed> {
        self.request(|reply| Command::UpdateSettings(settings, reply)).await
    }

    pub async fn set_folder(&self, folder: PathBuf) -> Result<Result<(), UpdateError>, Closed> {
        self.request(|reply| Command::SetFolder(folder, reply)).await
    }

    pub async fn update_phrases(&self, lines: Vec<String>) -> Result<Result<Vec<String>, StorageError>, Closed> {
        self.request(|reply| Command::UpdatePhrases(lines, reply)).await
    }

    pub async fn shutdown(&self) -> Result<(), Closed> {
        self.tx.send(Command::Shutdown).await.map_err(|_| Closed)
    }
}

/// Runs until `Shutdown` or until every handle is dropped.
///
/// Every tick and command runs in its own task, so a trigger that arrives
/// during a delivery reaches the guard and is turned away instead of waiting
/// behind it. On exit the loop waits for those tasks, a send already issued
/// is never cut off.
pub async fn run<B: MessagingBackend + 'static>(
    poster: Arc<Poster<B>>,
    mut commands: mpsc::Receiver<Command>,
    check_every: Duration,
) {
    // First check one period after start, like any later one.
    let mut ticker = interval_at(Instant::now() + check_every, check_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let poster = poster.clone();
                tasks.spawn(async move {
                    poster.check_queue().await;
                });
            }
            Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = finished {
                    warn!("poster task failed: {}", e);
                }
            }
            command = commands.recv() => {
                let command = match command {
                    Some(c) => c,
                    None => break,
                };
                let poster = poster.clone();

                match command {
                    Command::SendNow(reply) => {
                        tasks.spawn(async move {
                            let _ = reply.send(poster.send_now().await);
                        });
                    }
                    Command::Start(reply) => {
                        tasks.spawn(async move {
                            let _ = reply.send(poster.start().await);
                        });
                    }
                    Command::Stop => poster.stop(),
                    Command::UpdateSettings(settings, reply) => {
                        tasks.spawn(async move {
                            let _ = reply.send(poster.update_settings(settings).await);
                        });
                    }
                    Command::SetFolder(folder, reply) => {
                        tasks.spawn(async move {
                            let _ = reply.send(poster.set_folder(folder).await);
                        });
                    }
                    Command::UpdatePhrases(lines, reply) => {
                        let _ = reply.send(poster.update_phrases(&lines));
                    }
                    Command::Shutdown => break,
                }
            }
        }
    }

    poster.stop();
    if !tasks.is_empty() {
        info!("waiting for {} pending task(s)", tasks.len());
    }
    while let Some(finished) = tasks.join_next().await {
        if let Err(e) = finished {
            warn!("poster task failed: {}", e);
        }
    }
    debug!("poster loop finished");
}
