//! Session data model and offset computation.
//!
//! A [`Session`] is plain data. All mutation goes through the
//! [`Orchestrator`](super::Orchestrator) while it holds its session lock.

use std::collections::HashMap;

use serde::Serialize;

use crate::protocol::Device;

/// A span of time during which a session was paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseInterval {
    pub start_ms: u64,
    /// Set exactly once, when the session resumes.
    pub end_ms: Option<u64>,
}

impl PauseInterval {
    pub fn open(start_ms: u64) -> Self {
        Self {
            start_ms,
            end_ms: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_ms.is_none()
    }

    /// Paused time covered by this interval after `since`, treating an open
    /// interval as ending at `at`.
    fn paused_between(&self, since: u64, at: u64) -> u64 {
        self.end_ms
            .unwrap_or(at)
            .saturating_sub(self.start_ms.max(since))
    }
}

/// A user who joined a session with a chosen device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub username: String,
    pub device: Device,
    pub join_time_ms: u64,
    /// Session offset at the moment of joining.
    pub offset_ms: u64,
}

/// One scheduled shared-playback event.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub filename: String,
    pub duration_ms: u64,
    pub scheduled_start_ms: u64,
    pub start_ms: Option<u64>,
    pub pause_intervals: Vec<PauseInterval>,
    pub participants: HashMap<String, Participant>,
    /// Usernames that joined before start, in join order.
    pub prequeue: Vec<String>,
}

impl Session {
    pub fn new(id: String, filename: String, duration_ms: u64, scheduled_start_ms: u64) -> Self {
        Self {
            id,
            filename,
            duration_ms,
            scheduled_start_ms,
            start_ms: None,
            pause_intervals: Vec::new(),
            participants: HashMap::new(),
            prequeue: Vec::new(),
        }
    }

    pub fn is_started(&self) -> bool {
        self.start_ms.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.pause_intervals.last().is_some_and(PauseInterval::is_open)
    }

    /// Playback position at `at`, excluding all paused time.
    ///
    /// 0 before start. Never negative. A pause that began before the start
    /// only counts from the start onwards.
    pub fn offset_at(&self, at: u64) -> u64 {
        let Some(start) = self.start_ms else {
            return 0;
        };
        let paused: u64 = self
            .pause_intervals
            .iter()
            .map(|interval| interval.paused_between(start, at))
            .sum();
        at.saturating_sub(start).saturating_sub(paused)
    }

    /// Adds `username` to the prequeue unless already present.
    pub fn enqueue(&mut self, username: &str) {
        if !self.prequeue.iter().any(|u| u == username) {
            self.prequeue.push(username.to_string());
        }
    }

    /// Opens a pause interval at `at`, closing any interval still open.
    pub fn begin_pause(&mut self, at: u64) {
        if let Some(open) = self.pause_intervals.last_mut().filter(|i| i.is_open()) {
            open.end_ms = Some(at);
        }
        self.pause_intervals.push(PauseInterval::open(at));
    }

    /// Closes the open pause interval at `at`.
    ///
    /// Returns false when the session was not paused.
    pub fn end_pause(&mut self, at: u64) -> bool {
        match self.pause_intervals.last_mut() {
            Some(open) if open.is_open() => {
                open.end_ms = Some(at.max(open.start_ms));
                true
            }
            _ => false,
        }
    }

    /// Username → device for every participant.
    pub fn devices(&self) -> Vec<(String, Device)> {
        self.participants
            .values()
            .map(|p| (p.username.clone(), p.device.clone()))
            .collect()
    }

    pub fn summary(&self, now: u64) -> SessionSummary {
        let mut participants: Vec<String> = self.participants.keys().cloned().collect();
        participants.sort();
        SessionSummary {
            id: self.id.clone(),
            filename: self.filename.clone(),
            duration_ms: self.duration_ms,
            scheduled_start_ms: self.scheduled_start_ms,
            start_ms: self.start_ms,
            paused: self.is_paused(),
            offset_ms: self.offset_at(now),
            participants,
            prequeue: self.prequeue.clone(),
        }
    }
}

/// Read-only snapshot of a session for listing and display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub filename: String,
    pub duration_ms: u64,
    pub scheduled_start_ms: u64,
    pub start_ms: Option<u64>,
    pub paused: bool,
    pub offset_ms: u64,
    pub participants: Vec<String>,
    pub prequeue: Vec<String>,
}
