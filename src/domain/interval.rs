use super::session::{Session, SessionId, SessionStatus};
use super::user::UserId;
use chrono::{DateTime, Duration, Utc};

/// Half-open overlap test: `[start_a, end_a)` against `[start_b, end_b)`.
///
/// Intervals that merely touch at an endpoint do not overlap.
pub fn overlaps(
    start_a: DateTime<Utc>,
    end_a: DateTime<Utc>,
    start_b: DateTime<Utc>,
    end_b: DateTime<Utc>,
) -> bool {
    start_a < end_b && start_b < end_a
}

/// A half-open window of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn starting_at(start: DateTime<Utc>, minutes: u32) -> Self {
        Self {
            start,
            end: start + Duration::minutes(i64::from(minutes)),
        }
    }

    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }
}

/// Conflict query used before a session is written.
#[derive(Debug, Clone)]
pub struct ConflictQuery {
    pub participants: Vec<UserId>,
    pub window: TimeInterval,
    pub exclude: Option<SessionId>,
}

impl ConflictQuery {
    pub fn new(participants: Vec<UserId>, window: TimeInterval) -> Self {
        Self {
            participants,
            window,
            exclude: None,
        }
    }

    pub fn excluding(mut self, session_id: SessionId) -> Self {
        self.exclude = Some(session_id);
        self
    }

    fn occupies(&self, session: &Session) -> bool {
        matches!(
            session.status,
            SessionStatus::Scheduled | SessionStatus::InProgress
        ) && self.exclude != Some(session.id)
            && (self.participants.contains(&session.host_id)
                || self.participants.contains(&session.learner_id))
    }
}

/// Returns the sessions among `sessions` that block the queried window.
///
/// Only `scheduled` and `in-progress` sessions count. Each candidate occupies
/// `[scheduled_time, scheduled_time + duration)`.
pub fn find_conflicts<'a, I>(sessions: I, query: &ConflictQuery) -> Vec<Session>
where
    I: IntoIterator<Item = &'a Session>,
{
    sessions
        .into_iter()
        .filter(|s| query.occupies(s) && s.interval().overlaps(&query.window))
        .cloned()
        .collect()
}
