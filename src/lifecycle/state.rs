use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use strum_macros::Display;
use uuid::Uuid;

/// Phase of a host's single run
///
/// ```text
/// Created → Starting → Running → Stopping → Stopped → Disposed
///               │                   ▲
///               └──► Faulted ───────┘
/// ```
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum HostState {
    Created = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
    Disposed = 5,
    Faulted = 6,
}

impl HostState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            4 => Self::Stopped,
            5 => Self::Disposed,
            _ => Self::Faulted,
        }
    }
}

/// Atomic holder for [`HostState`].
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(HostState::Created as u8))
    }

    pub(crate) fn get(&self) -> HostState {
        HostState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: HostState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves to `to` if the current state is one of `from`; returns the
    /// state observed before the attempt.
    pub(crate) fn transition(
        &self,
        from: &[HostState],
        to: HostState,
    ) -> Result<HostState, HostState> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                from.contains(&HostState::from_u8(raw)).then_some(to as u8)
            })
            .map(HostState::from_u8)
            .map_err(HostState::from_u8)
    }
}

/// Point-in-time view of a host, suitable for health endpoints
#[derive(Debug, Clone, Serialize)]
pub struct HostStatus {
    pub host_id: Uuid,
    pub application_name: String,
    pub state: HostState,
    pub started_at: Option<DateTime<Utc>>,
    pub stopping_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl HostStatus {
    /// Render for health and diagnostics endpoints.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
