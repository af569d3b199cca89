//! Background agent that keeps the license state current.
//!
//! Two independent tasks share one [`LicenseState`] watch channel:
//!
//! - the **poll task** asks the authority about the held key on startup,
//!   every `poll_interval`, and whenever the application asks for it;
//! - the **countdown task** ticks every `tick_interval`, publishes the
//!   time left until the authoritative expiry and flips the state to
//!   [`LicenseState::LocallyExpired`] when it reaches zero.
//!
//! The countdown never talks to the network. It converts the wall-clock
//! expiry into a monotonic deadline once per expiry value, so it only ever
//! decreases between polls. A local expiry is provisional: if the next
//! poll still reports the same expiry as valid, the authority wins and the
//! countdown stays at zero without expiring the license again.

use crate::countdown::format_remaining;
use crate::error::{ClientError, ClientResult};
use crate::state::{LicenseState, LockoutReason};
use crate::verifier::{HttpVerifier, Verifier};
use keybind_types::{Clock, DeviceId, LicenseKey, SystemClock, Timestamp};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Agent timing and endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Base URL of the authority.
    pub server_url: String,
    /// How often the held key is re-verified (default 60 s).
    pub poll_interval: Duration,
    /// How often the countdown is refreshed (default 1 s).
    pub tick_interval: Duration,
    /// Upper bound for one verification request (default 10 s).
    pub request_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3000".to_string(),
            poll_interval: Duration::from_secs(60),
            tick_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl AgentConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Default::default()
        }
    }
}

enum Command {
    SubmitKey(LicenseKey, oneshot::Sender<LicenseState>),
    CheckNow(oneshot::Sender<LicenseState>),
}

/// Configured but not yet running agent.
pub struct ClientSyncAgent {
    verifier: Arc<dyn Verifier>,
    device: DeviceId,
    config: AgentConfig,
    clock: Arc<dyn Clock>,
}

impl ClientSyncAgent {
    pub fn new(verifier: Arc<dyn Verifier>, device: DeviceId, config: AgentConfig) -> Self {
        Self {
            verifier,
            device,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Agent verifying over HTTP against `config.server_url`.
    pub fn connect(device: DeviceId, config: AgentConfig) -> ClientResult<Self> {
        let verifier = HttpVerifier::new(&config.server_url, config.request_timeout)?;
        Ok(Self::new(Arc::new(verifier), device, config))
    }

    /// Replaces the wall clock used to anchor the countdown.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Starts both tasks on the current tokio runtime.
    ///
    /// Without a `key` the agent starts locked out with
    /// [`LockoutReason::NoKey`] and waits for [`AgentHandle::submit_key`].
    pub fn spawn(self, key: Option<LicenseKey>) -> AgentHandle {
        let state = Arc::new(watch::Sender::new(LicenseState::Unverified));
        let (countdown_tx, countdown_rx) = watch::channel(None);
        let (command_tx, command_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let poller = Poller {
            verifier: self.verifier,
            device: self.device,
            key,
            state: Arc::clone(&state),
        };
        let countdown = Countdown {
            state: Arc::clone(&state),
            remaining: countdown_tx,
            clock: self.clock,
        };

        let tasks = vec![
            tokio::spawn(poller.run(self.config.poll_interval, command_rx, shutdown_rx.clone())),
            tokio::spawn(countdown.run(self.config.tick_interval, shutdown_rx)),
        ];

        AgentHandle {
            state: state.subscribe(),
            countdown: countdown_rx,
            commands: command_tx,
            shutdown: shutdown_tx,
            tasks,
        }
    }
}

/// Application-side handle to a running agent.
///
/// Dropping the handle stops the agent as well; [`shutdown`](Self::shutdown)
/// additionally waits for both tasks to finish.
pub struct AgentHandle {
    state: watch::Receiver<LicenseState>,
    countdown: watch::Receiver<Option<Duration>>,
    commands: mpsc::Sender<Command>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl AgentHandle {
    /// Subscribes to license state changes.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<LicenseState> {
        self.state.clone()
    }

    #[must_use]
    pub fn current(&self) -> LicenseState {
        *self.state.borrow()
    }

    /// Subscribes to the time left on an active license. `None` while no
    /// license is active, zero once it has run out locally.
    #[must_use]
    pub fn countdown(&self) -> watch::Receiver<Option<Duration>> {
        self.countdown.clone()
    }

    /// Current countdown rendered for display.
    #[must_use]
    pub fn remaining_text(&self) -> Option<String> {
        self.countdown.borrow().map(format_remaining)
    }

    /// Replaces the held key and verifies it immediately.
    pub async fn submit_key(&self, key: LicenseKey) -> ClientResult<LicenseState> {
        self.request(|reply| Command::SubmitKey(key, reply)).await
    }

    /// Verifies the held key now and returns the resulting state.
    ///
    /// Meant to gate individual protected actions; a transient failure
    /// returns the unchanged current state.
    pub async fn check_now(&self) -> ClientResult<LicenseState> {
        self.request(Command::CheckNow).await
    }

    async fn request<F>(&self, command: F) -> ClientResult<LicenseState>
    where
        F: FnOnce(oneshot::Sender<LicenseState>) -> Command,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .await
            .map_err(|_| ClientError::Closed)?;
        reply_rx.await.map_err(|_| ClientError::Closed)
    }

    /// Stops both tasks and waits for them.
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("agent task ended abnormally: {e}");
            }
        }
        debug!("license agent stopped");
    }
}

struct Poller {
    verifier: Arc<dyn Verifier>,
    device: DeviceId,
    key: Option<LicenseKey>,
    state: Arc<watch::Sender<LicenseState>>,
}

impl Poller {
    async fn run(
        mut self,
        period: Duration,
        mut commands: mpsc::Receiver<Command>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => self.poll().await,
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    let reply = match command {
                        Command::SubmitKey(key, reply) => {
                            self.key = Some(key);
                            self.state.send_replace(LicenseState::Unverified);
                            reply
                        }
                        Command::CheckNow(reply) => reply,
                    };
                    self.poll().await;
                    ticker.reset();
                    // The caller may have given up waiting.
                    let _ = reply.send(*self.state.borrow());
                }
            }
        }
        debug!("poll task stopped");
    }

    async fn poll(&mut self) {
        let Some(key) = self.key.clone() else {
            self.state.send_if_modified(|s| {
                if *s == LicenseState::Unverified {
                    *s = LicenseState::LockedOut(LockoutReason::NoKey);
                    true
                } else {
                    false
                }
            });
            return;
        };

        let reply = match self.verifier.verify(&key, &self.device).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("license check failed, will retry: {e}");
                return;
            }
        };

        let Some(next) = LicenseState::from_reply(&reply) else {
            debug!(?reply, "authority gave no verdict, will retry");
            return;
        };
        if reply.is_terminal() {
            info!(key = %key, ?reply, "license rejected, waiting for a new key");
            // Re-polling a rejected key can only degrade the reason shown.
            self.key = None;
        }
        set_if_changed(&self.state, next);
    }
}

struct Countdown {
    state: Arc<watch::Sender<LicenseState>>,
    remaining: watch::Sender<Option<Duration>>,
    clock: Arc<dyn Clock>,
}

impl Countdown {
    async fn run(self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut states = self.state.subscribe();
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut deadline: Option<Deadline> = None;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            let state = *states.borrow_and_update();
            self.refresh(state, &mut deadline);
        }
        debug!("countdown task stopped");
    }

    fn refresh(&self, state: LicenseState, deadline: &mut Option<Deadline>) {
        let shown = match state {
            LicenseState::Active { expires_at } => {
                if deadline.as_ref().is_some_and(|a| a.expires_at != expires_at) {
                    *deadline = None;
                }
                let anchor = deadline.get_or_insert_with(|| Deadline {
                    expires_at,
                    at: Instant::now() + self.clock.now().until(expires_at),
                    ran_out: false,
                });
                let left = anchor.at.saturating_duration_since(Instant::now());
                if left.is_zero() && !anchor.ran_out {
                    let expired = self.state.send_if_modified(|s| {
                        if *s == state {
                            *s = LicenseState::LocallyExpired { expires_at };
                            true
                        } else {
                            false
                        }
                    });
                    if expired {
                        anchor.ran_out = true;
                        info!("license ran out locally at {expires_at}");
                    }
                }
                Some(left)
            }
            LicenseState::LocallyExpired { expires_at } => {
                if let Some(anchor) = deadline.as_mut().filter(|a| a.expires_at == expires_at) {
                    anchor.ran_out = true;
                }
                Some(Duration::ZERO)
            }
            LicenseState::Unverified | LicenseState::LockedOut(_) => {
                *deadline = None;
                None
            }
        };
        set_if_changed(&self.remaining, shown);
    }
}

/// Monotonic deadline for one authoritative expiry value.
///
/// Once `ran_out` is set, only the poll task can move the state away from
/// this expiry: an `Active` state for it means the authority confirmed the
/// license after the local clock had already passed it.
struct Deadline {
    expires_at: Timestamp,
    at: Instant,
    ran_out: bool,
}

fn set_if_changed<T: PartialEq>(tx: &watch::Sender<T>, next: T) {
    tx.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}
