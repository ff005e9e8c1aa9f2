use super::ledger::LedgerEngine;
use crate::domain::clock::ClockRef;
use crate::domain::interval::{ConflictQuery, TimeInterval};
use crate::domain::ports::{
    InsertOutcome, RealtimeChannelRef, SessionEvent, SessionStoreRef, UserDirectoryRef,
};
use crate::domain::session::{
    DEFAULT_DURATION_MINUTES, NewSession, Session, SessionId, SessionStatus, SessionType,
    SessionView, Transition,
};
use crate::domain::settlement::session_price;
use crate::domain::transaction::Transaction;
use crate::domain::user::{UserId, UserProfile, UserSummary};
use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Booking request as received from a host.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub learner_id: UserId,
    /// RFC 3339 instant.
    pub scheduled_time: String,
    pub title: String,
    pub description: Option<String>,
    pub session_type: Option<SessionType>,
}

pub const UPDATE_DISABLED: &str = "Sessions cannot be edited directly. Use the mark-ready, \
start-live, end-live, cancel or no-show endpoints to change a session";

/// Owns session creation and every status transition.
#[derive(Clone)]
pub struct SessionService {
    sessions: SessionStoreRef,
    users: UserDirectoryRef,
    ledger: LedgerEngine,
    clock: ClockRef,
    realtime: Option<RealtimeChannelRef>,
}

impl SessionService {
    pub fn new(
        sessions: SessionStoreRef,
        users: UserDirectoryRef,
        ledger: LedgerEngine,
        clock: ClockRef,
    ) -> Self {
        Self {
            sessions,
            users,
            ledger,
            clock,
            realtime: None,
        }
    }

    /// Attaches the live-room channel. Without one, transitions still succeed
    /// and nothing is broadcast.
    pub fn with_realtime(mut self, realtime: RealtimeChannelRef) -> Self {
        self.realtime = Some(realtime);
        self
    }

    async fn user(&self, id: UserId) -> Result<UserProfile> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| MarketError::not_found("User", id))
    }

    async fn load(&self, id: SessionId) -> Result<Session> {
        self.sessions
            .get(id)
            .await?
            .ok_or_else(|| MarketError::not_found("Session", id))
    }

    /// Resolves host and learner into their public name/email projection.
    pub async fn view(&self, session: Session) -> Result<SessionView> {
        let host = UserSummary::from(&self.user(session.host_id).await?);
        let learner = UserSummary::from(&self.user(session.learner_id).await?);
        Ok(SessionView {
            session,
            host,
            learner,
        })
    }

    fn emit(&self, session: &Session, event: SessionEvent) {
        if let Some(realtime) = &self.realtime {
            realtime.emit_to_session_room(session, event);
        }
    }

    /// Books a session hosted by `host`.
    ///
    /// Runs conflict detection for both participants over a two-hour window
    /// in the same store operation as the insert.
    pub async fn create_session(
        &self,
        host: UserId,
        request: CreateSessionRequest,
    ) -> Result<SessionView> {
        if host == request.learner_id {
            return Err(MarketError::ValidationError(
                "Host and learner must be different users".to_string(),
            ));
        }
        if request.title.trim().is_empty() {
            return Err(MarketError::ValidationError(
                "Session title cannot be empty".to_string(),
            ));
        }
        let scheduled_time = DateTime::parse_from_rfc3339(&request.scheduled_time)
            .map_err(|e| {
                MarketError::ValidationError(format!(
                    "scheduledTime '{}' is not a valid RFC 3339 instant: {e}",
                    request.scheduled_time
                ))
            })?
            .with_timezone(&Utc);

        self.user(host).await?;
        self.user(request.learner_id).await?;

        let session = Session::new(NewSession {
            host_id: host,
            learner_id: request.learner_id,
            scheduled_time,
            title: request.title.trim().to_string(),
            description: request.description,
            session_type: request.session_type.unwrap_or(SessionType::SkillTeaching),
        });
        let query = ConflictQuery::new(
            session.participants().to_vec(),
            TimeInterval::starting_at(scheduled_time, DEFAULT_DURATION_MINUTES),
        );
        self.insert_checked(session, &query).await
    }

    async fn insert_checked(&self, session: Session, query: &ConflictQuery) -> Result<SessionView> {
        match self.sessions.insert_if_free(session.clone(), query).await? {
            InsertOutcome::Inserted => {
                tracing::info!(
                    session_id = %session.id,
                    host_id = %session.host_id,
                    learner_id = %session.learner_id,
                    scheduled_time = %session.scheduled_time,
                    "Session scheduled"
                );
                self.view(session).await
            }
            InsertOutcome::Conflicts(conflicts) => {
                tracing::info!(
                    host_id = %session.host_id,
                    learner_id = %session.learner_id,
                    conflicts = conflicts.len(),
                    "Session rejected: schedule conflict"
                );
                Err(MarketError::Conflict(format!(
                    "The requested time overlaps {} existing session(s) of a participant",
                    conflicts.len()
                )))
            }
        }
    }

    pub async fn find_conflicts(
        &self,
        participants: Vec<UserId>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<SessionId>,
    ) -> Result<Vec<Session>> {
        let mut query = ConflictQuery::new(participants, TimeInterval::new(start, end));
        if let Some(id) = exclude {
            query = query.excluding(id);
        }
        self.sessions.find_conflicts(&query).await
    }

    pub async fn get_session(&self, actor: UserId, id: SessionId) -> Result<SessionView> {
        let session = self.load(id).await?;
        session.ensure_participant(actor)?;
        self.view(session).await
    }

    pub async fn list_sessions(&self, actor: UserId) -> Result<Vec<SessionView>> {
        let mut views = Vec::new();
        for session in self.sessions.list_for_user(actor).await? {
            views.push(self.view(session).await?);
        }
        Ok(views)
    }

    /// The only question the media layer asks before admitting someone.
    pub async fn is_participant(&self, id: SessionId, user: UserId) -> Result<bool> {
        Ok(self.load(id).await?.is_participant(user))
    }

    async fn transition<F>(
        &self,
        id: SessionId,
        action: &'static str,
        apply: F,
    ) -> Result<(Session, Transition)>
    where
        F: FnOnce(&mut Session, DateTime<Utc>) -> Result<Transition> + Send + 'static,
    {
        let now = self.clock.now();
        let (session, transition) = self
            .sessions
            .update(
                id,
                Box::new(move |s: &mut Session| -> Result<Transition> { apply(s, now) }),
            )
            .await?;
        if transition == Transition::Applied {
            tracing::info!(session_id = %id, action, status = %session.status, "Session transition");
        }
        Ok((session, transition))
    }

    pub async fn mark_ready(&self, actor: UserId, id: SessionId) -> Result<SessionView> {
        let (session, _) = self
            .transition(id, "mark-ready", move |s, now| s.mark_ready(actor, now))
            .await?;
        self.view(session).await
    }

    pub async fn start_live(&self, actor: UserId, id: SessionId) -> Result<SessionView> {
        let (session, _) = self
            .transition(id, "start-live", move |s, now| s.start(actor, now))
            .await?;
        if let (Some(room_id), Some(started_at)) = (&session.webrtc_room_id, session.started_at) {
            self.emit(
                &session,
                SessionEvent::SessionStarted {
                    session_id: session.id,
                    room_id: room_id.clone(),
                    started_at,
                },
            );
        }
        self.view(session).await
    }

    pub async fn end_live(&self, actor: UserId, id: SessionId) -> Result<SessionView> {
        let (session, _) = self
            .transition(id, "end-live", move |s, now| s.end(actor, now))
            .await?;
        self.emit(
            &session,
            SessionEvent::SessionEnded {
                session_id: session.id,
                actual_duration: session.actual_duration.unwrap_or_default(),
            },
        );
        self.view(session).await
    }

    pub async fn cancel(&self, actor: UserId, id: SessionId) -> Result<SessionView> {
        let (session, _) = self
            .transition(id, "cancel", move |s, _| s.cancel(actor))
            .await?;
        self.emit(
            &session,
            SessionEvent::SessionCancelled {
                session_id: session.id,
            },
        );
        self.view(session).await
    }

    pub async fn mark_no_show(&self, actor: UserId, id: SessionId) -> Result<SessionView> {
        let (session, _) = self
            .transition(id, "no-show", move |s, _| s.mark_no_show(actor))
            .await?;
        self.view(session).await
    }

    /// Generic edits are not supported; callers must use a transition.
    pub async fn update_session(&self, _actor: UserId, _id: SessionId) -> Result<SessionView> {
        Err(MarketError::ValidationError(UPDATE_DISABLED.to_string()))
    }

    /// Books a follow-up session that starts where `id` ends.
    pub async fn extend_session(&self, actor: UserId, id: SessionId) -> Result<SessionView> {
        let original = self.load(id).await?;
        let extension = original.extension(actor)?;
        let query = ConflictQuery::new(original.participants().to_vec(), extension.interval())
            .excluding(original.id);
        self.insert_checked(extension, &query).await
    }

    /// Settles payment for a session and records it as paid.
    pub async fn pay_for_session(
        &self,
        actor: UserId,
        id: SessionId,
    ) -> Result<(SessionView, Vec<Transaction>)> {
        let session = self.load(id).await?;
        session.ensure_participant(actor)?;
        if matches!(
            session.status,
            SessionStatus::Cancelled | SessionStatus::NoShow
        ) {
            return Err(MarketError::InvalidTransition {
                from: session.status,
                action: "pay for",
                reason: "the session will not take place".to_string(),
            });
        }
        if session.paid {
            return Err(MarketError::Conflict(format!("Session {id} is already paid")));
        }

        let transactions = self.ledger.settle_session(&session).await?;
        let price = session_price(session.session_type);
        let (session, _) = self
            .sessions
            .update(
                id,
                Box::new(move |s: &mut Session| -> Result<Transition> {
                    s.paid = true;
                    s.cost = Some(price);
                    Ok(Transition::Applied)
                }),
            )
            .await?;
        Ok((self.view(session).await?, transactions))
    }
}
