use super::coins::Coins;
use super::interval::TimeInterval;
use super::swap::SwapId;
use super::user::{UserId, UserSummary};
use crate::error::{MarketError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type SessionId = Uuid;

/// Every session is booked for two hours.
pub const DEFAULT_DURATION_MINUTES: u32 = 120;

/// How long before `scheduled_time` the host may already go live.
pub const START_BUFFER_MINUTES: i64 = 5;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Scheduled,
    Ready,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::NoShow)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Ready => "ready",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no-show",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub enum SessionType {
    SkillExchange,
    SkillTeaching,
}

/// Fields supplied when booking a session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub host_id: UserId,
    pub learner_id: UserId,
    pub scheduled_time: DateTime<Utc>,
    pub title: String,
    pub description: Option<String>,
    pub session_type: SessionType,
}

/// A scheduled live meeting between a host and a learner.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub host_id: UserId,
    pub learner_id: UserId,
    pub scheduled_time: DateTime<Utc>,
    /// Booked length in minutes. Never changes after creation.
    pub duration: u32,
    pub status: SessionStatus,
    pub title: String,
    pub description: Option<String>,
    pub session_type: SessionType,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Minutes between `started_at` and `ended_at`, rounded.
    pub actual_duration: Option<i64>,
    #[serde(rename = "webRTCRoomId")]
    pub webrtc_room_id: Option<String>,
    pub extended_from: Option<SessionId>,
    pub is_extended: bool,
    pub swap_request_id: Option<SwapId>,
    pub cost: Option<Coins>,
    pub paid: bool,
}

/// What a successful transition did, so callers can skip side effects on no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Unchanged,
}

impl Session {
    pub fn new(new: NewSession) -> Self {
        Self::with_duration(new, DEFAULT_DURATION_MINUTES)
    }

    pub fn with_duration(new: NewSession, duration: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            host_id: new.host_id,
            learner_id: new.learner_id,
            scheduled_time: new.scheduled_time,
            duration,
            status: SessionStatus::Scheduled,
            title: new.title,
            description: new.description,
            session_type: new.session_type,
            started_at: None,
            ended_at: None,
            actual_duration: None,
            webrtc_room_id: None,
            extended_from: None,
            is_extended: false,
            swap_request_id: None,
            cost: None,
            paid: false,
        }
    }

    pub fn interval(&self) -> TimeInterval {
        TimeInterval::starting_at(self.scheduled_time, self.duration)
    }

    pub fn participants(&self) -> [UserId; 2] {
        [self.host_id, self.learner_id]
    }

    pub fn is_participant(&self, user: UserId) -> bool {
        self.host_id == user || self.learner_id == user
    }

    pub fn ensure_participant(&self, user: UserId) -> Result<()> {
        if self.is_participant(user) {
            Ok(())
        } else {
            Err(MarketError::Forbidden(
                "Only the host or the learner of this session can do that".to_string(),
            ))
        }
    }

    fn reject(&self, action: &'static str, reason: impl Into<String>) -> MarketError {
        MarketError::InvalidTransition {
            from: self.status,
            action,
            reason: reason.into(),
        }
    }

    /// `scheduled -> ready`. Calling it again on a ready session is a no-op.
    pub fn mark_ready(&mut self, actor: UserId, now: DateTime<Utc>) -> Result<Transition> {
        self.ensure_participant(actor)?;
        match self.status {
            SessionStatus::Ready => Ok(Transition::Unchanged),
            SessionStatus::Scheduled if now < self.scheduled_time => Err(self.reject(
                "mark ready",
                format!("the session only opens at {}", self.scheduled_time.to_rfc3339()),
            )),
            SessionStatus::Scheduled => {
                self.status = SessionStatus::Ready;
                Ok(Transition::Applied)
            }
            _ => Err(self.reject("mark ready", "only scheduled sessions can be marked ready")),
        }
    }

    /// `scheduled | ready -> in-progress`, host only.
    pub fn start(&mut self, actor: UserId, now: DateTime<Utc>) -> Result<Transition> {
        if actor != self.host_id {
            return Err(MarketError::Forbidden(
                "Only the host can start the live session".to_string(),
            ));
        }
        match self.status {
            SessionStatus::Ready => {}
            SessionStatus::Scheduled => {
                let lead = self.scheduled_time - now;
                if lead > Duration::minutes(START_BUFFER_MINUTES) {
                    return Err(self.reject(
                        "start",
                        format!(
                            "it begins in {} minutes and can start at most {} minutes early",
                            lead.num_minutes(),
                            START_BUFFER_MINUTES
                        ),
                    ));
                }
            }
            _ => return Err(self.reject("start", "only scheduled or ready sessions can start")),
        }

        self.status = SessionStatus::InProgress;
        self.started_at = Some(now);
        if self.webrtc_room_id.is_none() {
            self.webrtc_room_id = Some(format!("room-{}", Uuid::new_v4().simple()));
        }
        Ok(Transition::Applied)
    }

    /// `in-progress -> completed`.
    pub fn end(&mut self, actor: UserId, now: DateTime<Utc>) -> Result<Transition> {
        self.ensure_participant(actor)?;
        if self.status != SessionStatus::InProgress {
            return Err(self.reject("end", "only sessions in progress can end"));
        }
        let started = self.started_at.unwrap_or(self.scheduled_time);
        let elapsed_ms = (now - started).num_milliseconds() as f64;

        self.status = SessionStatus::Completed;
        self.ended_at = Some(now);
        self.actual_duration = Some((elapsed_ms / 60_000.0).round() as i64);
        Ok(Transition::Applied)
    }

    /// `scheduled -> cancelled`.
    pub fn cancel(&mut self, actor: UserId) -> Result<Transition> {
        self.ensure_participant(actor)?;
        if self.status != SessionStatus::Scheduled {
            return Err(self.reject("cancel", "only scheduled sessions can be cancelled"));
        }
        self.status = SessionStatus::Cancelled;
        Ok(Transition::Applied)
    }

    /// `scheduled -> no-show`.
    pub fn mark_no_show(&mut self, actor: UserId) -> Result<Transition> {
        self.ensure_participant(actor)?;
        if self.status != SessionStatus::Scheduled {
            return Err(self.reject("mark no-show", "only scheduled sessions can be marked no-show"));
        }
        self.status = SessionStatus::NoShow;
        Ok(Transition::Applied)
    }

    /// Builds the follow-up session that extends this one.
    ///
    /// The extension starts where this session ends and keeps both
    /// participants and the session type.
    pub fn extension(&self, actor: UserId) -> Result<Session> {
        self.ensure_participant(actor)?;
        if !matches!(
            self.status,
            SessionStatus::InProgress | SessionStatus::Completed
        ) {
            return Err(self.reject("extend", "only live or completed sessions can be extended"));
        }
        let start = self.ended_at.unwrap_or(self.interval().end);
        let mut extension = Session::new(NewSession {
            host_id: self.host_id,
            learner_id: self.learner_id,
            scheduled_time: start,
            title: self.title.clone(),
            description: self.description.clone(),
            session_type: self.session_type,
        });
        extension.extended_from = Some(self.id);
        extension.is_extended = true;
        Ok(extension)
    }
}

/// A session as returned to API callers: participants reduced to name and email.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    pub host: UserSummary,
    pub learner: UserSummary,
}
