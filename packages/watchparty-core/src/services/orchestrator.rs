//! Session orchestration: lifecycle, drift correction and pause automation.
//!
//! The orchestrator is the only component that mutates session state. All
//! sessions and their pending background tasks live behind one coarse lock.
//! Every operation follows the same shape: compute and snapshot under the
//! lock, release it, then talk to participants.
//!
//! Background work (scheduled start, automatic pause, automatic resume) is
//! spawned while the lock is held so that installing a task and superseding
//! its predecessor happen atomically. See [`TaskRegistry`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{WatchPartyError, WatchPartyResult};
use crate::protocol::Command;
use crate::protocol_constants::{DEFAULT_DRIFT_THRESHOLD_MS, DEFAULT_PAUSE_DURATION_SECS};
use crate::services::scheduler::{next_pause_delay, TaskKind, TaskRegistry};
use crate::services::session::{Participant, Session, SessionSummary};
use crate::services::traits::ParticipantChannel;

/// Tunables for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Divergence between a client's adjusted offset and the server offset
    /// beyond which the client is sent a SEEK.
    pub drift_threshold_ms: u64,
    /// How long an automatic or manual pause lasts before auto-resume.
    pub pause_duration: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            drift_threshold_ms: DEFAULT_DRIFT_THRESHOLD_MS,
            pause_duration: Duration::from_secs(DEFAULT_PAUSE_DURATION_SECS),
        }
    }
}

/// Everything guarded by the session lock.
struct SessionBook {
    sessions: HashMap<String, Session>,
    tasks: TaskRegistry,
}

/// Owns all sessions and keeps their participants in step.
pub struct Orchestrator {
    book: Mutex<SessionBook>,
    channel: Arc<dyn ParticipantChannel>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        channel: Arc<dyn ParticipantChannel>,
        clock: Arc<dyn Clock>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            book: Mutex::new(SessionBook {
                sessions: HashMap::new(),
                tasks: TaskRegistry::new(),
            }),
            channel,
            clock,
            config,
        }
    }

    /// Current time according to the orchestrator's clock.
    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers a new session and arms its scheduled start.
    ///
    /// Returns immediately; the session starts on its own once
    /// `scheduled_start_ms` is reached.
    pub fn create_session(
        self: &Arc<Self>,
        filename: &str,
        duration_ms: u64,
        scheduled_start_ms: u64,
    ) -> WatchPartyResult<SessionSummary> {
        if filename.trim().is_empty() {
            return Err(WatchPartyError::InvalidRequest(
                "filename must not be empty".into(),
            ));
        }
        if duration_ms == 0 {
            return Err(WatchPartyError::InvalidRequest(
                "duration must be greater than zero".into(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        let session = Session::new(id.clone(), filename.to_string(), duration_ms, scheduled_start_ms);

        let mut guard = self.book.lock();
        let book = &mut *guard;
        let summary = session.summary(self.clock.now_millis());
        book.sessions.insert(id.clone(), session);
        self.arm_start(book, &id);

        log::info!(
            "[Orchestrator] Created session {} filename={} duration_ms={} scheduled_start_ms={}",
            id,
            filename,
            duration_ms,
            scheduled_start_ms
        );
        Ok(summary)
    }

    /// Starts playback for everyone who joined before the start.
    ///
    /// No-op if the session has already started.
    pub async fn start_session(self: &Arc<Self>, id: &str) -> WatchPartyResult<()> {
        let commands = {
            let mut guard = self.book.lock();
            let book = &mut *guard;
            let now = self.clock.now_millis();
            let session = book
                .sessions
                .get_mut(id)
                .ok_or_else(|| WatchPartyError::SessionNotFound(id.to_string()))?;

            if session.is_started() {
                log::debug!("[Orchestrator] Session {} already started", id);
                return Ok(());
            }
            if now < session.scheduled_start_ms {
                return Err(WatchPartyError::InvalidState(format!(
                    "session {} is scheduled to start in {} ms",
                    id,
                    session.scheduled_start_ms - now
                )));
            }

            session.start_ms = Some(now);
            let queued = std::mem::take(&mut session.prequeue);
            // A paused start plays nobody; the resume PLAY reaches everyone.
            let commands: HashMap<String, Command> = if session.is_paused() {
                HashMap::new()
            } else {
                queued
                    .iter()
                    .filter_map(|username| session.participants.get(username))
                    .map(|p| {
                        (
                            p.username.clone(),
                            Command::play(0, &session.filename, p.device.clone()),
                        )
                    })
                    .collect()
            };

            book.tasks.cancel(id, TaskKind::Start);
            log::info!(
                "[Orchestrator] Session {} started at {}; prequeue={:?} paused={}",
                id,
                now,
                queued,
                session.is_paused()
            );
            commands
        };

        self.dispatch(id, "PLAY", commands).await;
        self.schedule_next_pause(id);
        Ok(())
    }

    /// Pauses every participant and arms the automatic resume.
    ///
    /// Supersedes any pending automatic pause or resume for the session.
    /// Works before the start too; a session started while paused begins
    /// playing on resume.
    pub async fn pause_session(self: &Arc<Self>, id: &str) -> WatchPartyResult<()> {
        let commands = {
            let mut guard = self.book.lock();
            let book = &mut *guard;
            let now = self.clock.now_millis();
            let session = book
                .sessions
                .get_mut(id)
                .ok_or_else(|| WatchPartyError::SessionNotFound(id.to_string()))?;

            session.begin_pause(now);
            let commands: HashMap<String, Command> = session
                .devices()
                .into_iter()
                .map(|(username, device)| (username, Command::pause(&session.filename, device)))
                .collect();

            book.tasks.cancel(id, TaskKind::Pause);
            self.arm_auto_resume(book, id);
            log::info!(
                "[Orchestrator] Session {} paused at {} (resume in {:?})",
                id,
                now,
                self.config.pause_duration
            );
            commands
        };

        self.dispatch(id, "PAUSE", commands).await;
        Ok(())
    }

    /// Ends the current pause and resumes everyone at the server offset.
    ///
    /// No-op if the session is not paused.
    pub async fn resume_session(self: &Arc<Self>, id: &str) -> WatchPartyResult<()> {
        let commands = {
            let mut guard = self.book.lock();
            let book = &mut *guard;
            let now = self.clock.now_millis();
            let session = book
                .sessions
                .get_mut(id)
                .ok_or_else(|| WatchPartyError::SessionNotFound(id.to_string()))?;

            if !session.end_pause(now) {
                log::debug!("[Orchestrator] Session {} is not paused, nothing to resume", id);
                return Ok(());
            }
            book.tasks.cancel(id, TaskKind::Resume);

            if !session.is_started() {
                // The scheduled start sends the initial PLAY.
                log::info!("[Orchestrator] Session {} resumed before its start", id);
                return Ok(());
            }

            let offset = session.offset_at(now);
            let commands: HashMap<String, Command> = session
                .devices()
                .into_iter()
                .map(|(username, device)| {
                    (username, Command::play(offset, &session.filename, device))
                })
                .collect();

            log::info!("[Orchestrator] Session {} resumed at offset {} ms", id, offset);
            commands
        };

        self.dispatch(id, "PLAY", commands).await;
        self.schedule_next_pause(id);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Participants
    // ─────────────────────────────────────────────────────────────────────────

    /// Joins `username` to a session with one of their authorized devices.
    ///
    /// Before the start the user is queued for the initial PLAY. After the
    /// start they immediately get a PLAY at the current offset.
    pub async fn add_participant(
        &self,
        id: &str,
        username: &str,
        device_title: &str,
    ) -> WatchPartyResult<()> {
        let exists = self.book.lock().sessions.contains_key(id);
        if !exists {
            return Err(WatchPartyError::SessionNotFound(id.to_string()));
        }

        let device = self
            .channel
            .authorized_devices(username)
            .await
            .into_iter()
            .find(|d| d.title == device_title)
            .ok_or_else(|| {
                WatchPartyError::NotAuthorized(format!(
                    "device '{}' is not authorized for {}",
                    device_title, username
                ))
            })?;

        let catch_up = {
            let mut book = self.book.lock();
            let now = self.clock.now_millis();
            let session = book
                .sessions
                .get_mut(id)
                .ok_or_else(|| WatchPartyError::SessionNotFound(id.to_string()))?;

            let offset = session.offset_at(now);
            session.participants.insert(
                username.to_string(),
                Participant {
                    username: username.to_string(),
                    device: device.clone(),
                    join_time_ms: now,
                    offset_ms: offset,
                },
            );
            log::info!(
                "[Orchestrator] Added {} to session {} (device={} id={})",
                username,
                id,
                device.title,
                device.id
            );

            if session.is_started() {
                Some(Command::play(offset, &session.filename, device))
            } else {
                session.enqueue(username);
                None
            }
        };

        if let Some(cmd) = catch_up {
            let outcome = self.channel.send(username, cmd).await;
            log::debug!("[Orchestrator] Catch-up PLAY to {}: {:?}", username, outcome);
        }
        Ok(())
    }

    /// Removes `username` from a session and stops their device.
    pub async fn remove_participant(&self, id: &str, username: &str) -> WatchPartyResult<()> {
        let cmd = {
            let mut book = self.book.lock();
            let session = book
                .sessions
                .get_mut(id)
                .ok_or_else(|| WatchPartyError::SessionNotFound(id.to_string()))?;
            let participant = session.participants.remove(username).ok_or_else(|| {
                WatchPartyError::ParticipantNotFound(format!("{} is not in session {}", username, id))
            })?;
            session.prequeue.retain(|u| u != username);
            log::info!("[Orchestrator] Removed {} from session {}", username, id);
            Command::stop(&session.filename, participant.device)
        };

        let outcome = self.channel.send(username, cmd).await;
        log::debug!("[Orchestrator] STOP to {}: {:?}", username, outcome);
        Ok(())
    }

    /// Earliest-scheduled session in which `username` participates.
    pub fn find_participant_session(&self, username: &str) -> Option<String> {
        let book = self.book.lock();
        book.sessions
            .values()
            .filter(|s| s.participants.contains_key(username))
            .min_by(|a, b| {
                (a.scheduled_start_ms, &a.id).cmp(&(b.scheduled_start_ms, &b.id))
            })
            .map(|s| s.id.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────────

    /// Snapshots of all sessions, ordered by scheduled start.
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let book = self.book.lock();
        let now = self.clock.now_millis();
        let mut summaries: Vec<SessionSummary> =
            book.sessions.values().map(|s| s.summary(now)).collect();
        summaries.sort_by(|a, b| {
            (a.scheduled_start_ms, &a.id).cmp(&(b.scheduled_start_ms, &b.id))
        });
        summaries
    }

    pub fn session(&self, id: &str) -> WatchPartyResult<SessionSummary> {
        let book = self.book.lock();
        book.sessions
            .get(id)
            .map(|s| s.summary(self.clock.now_millis()))
            .ok_or_else(|| WatchPartyError::SessionNotFound(id.to_string()))
    }

    pub fn session_count(&self) -> usize {
        self.book.lock().sessions.len()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Drift Correction
    // ─────────────────────────────────────────────────────────────────────────

    /// Compares a client's reported position against every session it
    /// participates in for `filename`, and SEEKs that client when it has
    /// drifted past the threshold.
    ///
    /// Returns the reported offset adjusted for time spent since
    /// `receive_ms`, or `None` when no session matched.
    pub async fn handle_client_status_update(
        &self,
        username: &str,
        filename: &str,
        reported_offset_ms: i64,
        receive_ms: u64,
    ) -> Option<i64> {
        let threshold = u128::from(self.config.drift_threshold_ms);

        let (adjusted, seeks) = {
            let book = self.book.lock();
            let now = self.clock.now_millis();
            let delay = i64::try_from(now.saturating_sub(receive_ms)).unwrap_or(i64::MAX);

            let mut adjusted = None;
            let mut seeks = Vec::new();
            for session in book.sessions.values().filter(|s| s.filename == filename) {
                let Some(participant) = session.participants.get(username) else {
                    continue;
                };
                let server_offset = session.offset_at(now);
                let client_offset = reported_offset_ms.saturating_add(delay);
                adjusted = Some(client_offset);

                let drift = (i128::from(client_offset) - i128::from(server_offset)).unsigned_abs();
                if drift > threshold {
                    log::info!(
                        "[Orchestrator] {} drifted {} ms in session {} (client={} server={}), seeking",
                        username,
                        drift,
                        session.id,
                        client_offset,
                        server_offset
                    );
                    seeks.push(Command::seek(
                        server_offset,
                        &session.filename,
                        participant.device.clone(),
                    ));
                }
            }
            (adjusted, seeks)
        };

        for cmd in seeks {
            let outcome = self.channel.send(username, cmd).await;
            log::debug!("[Orchestrator] SEEK to {}: {:?}", username, outcome);
        }
        adjusted
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Background Tasks
    // ─────────────────────────────────────────────────────────────────────────

    /// Aborts every pending scheduled start, pause and resume.
    ///
    /// Does not wait for the tasks to finish.
    pub fn stop_background_tasks(&self) -> usize {
        let cancelled = self.book.lock().tasks.cancel_all();
        log::info!("[Orchestrator] Cancelled {} background task(s)", cancelled);
        cancelled
    }

    fn claim(&self, id: &str, kind: TaskKind, generation: u64) -> bool {
        self.book.lock().tasks.claim(id, kind, generation)
    }

    fn arm_start(self: &Arc<Self>, book: &mut SessionBook, id: &str) {
        let generation = book.tasks.next_generation();
        let this = Arc::clone(self);
        let session_id = id.to_string();

        let handle = tokio::spawn(async move {
            // Re-read the schedule once running.
            let delay = {
                let book = this.book.lock();
                book.sessions
                    .get(&session_id)
                    .map(|s| s.scheduled_start_ms.saturating_sub(this.clock.now_millis()))
            };
            let Some(delay) = delay else {
                return;
            };
            tokio::time::sleep(Duration::from_millis(delay)).await;

            if !this.claim(&session_id, TaskKind::Start, generation) {
                return;
            }
            if let Err(e) = this.start_session(&session_id).await {
                log::warn!("[Orchestrator] Scheduled start failed for {}: {}", session_id, e);
            }
        });
        book.tasks.install(id, TaskKind::Start, generation, handle.abort_handle());
    }

    fn schedule_next_pause(self: &Arc<Self>, id: &str) {
        let mut guard = self.book.lock();
        self.arm_next_pause(&mut guard, id);
    }

    fn arm_next_pause(self: &Arc<Self>, book: &mut SessionBook, id: &str) {
        let Some(session) = book.sessions.get(id) else {
            return;
        };
        if !session.is_started() || session.is_paused() {
            return;
        }

        let elapsed = session.offset_at(self.clock.now_millis());
        let Some(delay) = next_pause_delay(session.duration_ms, elapsed) else {
            log::info!(
                "[Orchestrator] No further automatic pause for session {} (elapsed {} ms of {} ms)",
                id,
                elapsed,
                session.duration_ms
            );
            return;
        };

        let generation = book.tasks.next_generation();
        let this = Arc::clone(self);
        let session_id = id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !this.claim(&session_id, TaskKind::Pause, generation) {
                return;
            }
            if let Err(e) = this.pause_session(&session_id).await {
                log::warn!("[Orchestrator] Automatic pause failed for {}: {}", session_id, e);
            }
        });
        book.tasks.install(id, TaskKind::Pause, generation, handle.abort_handle());
        log::info!("[Orchestrator] Next automatic pause for session {} in {:?}", id, delay);
    }

    fn arm_auto_resume(self: &Arc<Self>, book: &mut SessionBook, id: &str) {
        let generation = book.tasks.next_generation();
        let delay = self.config.pause_duration;
        let this = Arc::clone(self);
        let session_id = id.to_string();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !this.claim(&session_id, TaskKind::Resume, generation) {
                return;
            }
            if let Err(e) = this.resume_session(&session_id).await {
                log::warn!("[Orchestrator] Automatic resume failed for {}: {}", session_id, e);
            }
        });
        book.tasks.install(id, TaskKind::Resume, generation, handle.abort_handle());
    }

    async fn dispatch(&self, id: &str, label: &str, commands: HashMap<String, Command>) {
        if commands.is_empty() {
            return;
        }
        let recipients = commands.len();
        let summary = self.channel.send_many(commands).await;
        let undelivered = summary.undelivered();
        if undelivered.is_empty() {
            log::info!(
                "[Orchestrator] {} delivered to {}/{} participant(s) of session {}",
                label,
                summary.delivered(),
                recipients,
                id
            );
        } else {
            log::warn!(
                "[Orchestrator] {} for session {} not delivered to {:?}",
                label,
                id,
                undelivered
            );
        }
    }
}
