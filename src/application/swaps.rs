use super::ledger::LedgerEngine;
use crate::domain::coins::Coins;
use crate::domain::interval::{ConflictQuery, TimeInterval};
use crate::domain::ports::{
    InsertOutcome, Notification, NotificationKind, NotificationSinkRef, PostDirectoryRef,
    SessionStoreRef, SwapStoreRef, UserDirectoryRef,
};
use crate::domain::session::{NewSession, Session, SessionType, Transition};
use crate::domain::settlement::{self, EXCHANGE_FEE};
use crate::domain::swap::{ChatRoom, ChatRoomId, PostId, SwapId, SwapRequest};
use crate::domain::transaction::BatchOutcome;
use crate::domain::user::UserId;
use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSwapRequest {
    pub post_id: PostId,
    /// RFC 3339 instant.
    pub scheduled_time: String,
    pub message: Option<String>,
}

/// Outcome of one participant's attempt to pay for a swap.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentValidation {
    pub room: ChatRoom,
    /// The session this call created, if it was the one to promote the swap.
    pub session: Option<Session>,
    /// Whether coins were taken by this call.
    pub charged: bool,
}

/// Drives a swap request from proposal to a scheduled exchange session.
#[derive(Clone)]
pub struct SwapPromoter {
    swaps: SwapStoreRef,
    sessions: SessionStoreRef,
    posts: PostDirectoryRef,
    users: UserDirectoryRef,
    ledger: LedgerEngine,
    notifications: NotificationSinkRef,
}

impl SwapPromoter {
    pub fn new(
        swaps: SwapStoreRef,
        sessions: SessionStoreRef,
        posts: PostDirectoryRef,
        users: UserDirectoryRef,
        ledger: LedgerEngine,
        notifications: NotificationSinkRef,
    ) -> Self {
        Self {
            swaps,
            sessions,
            posts,
            users,
            ledger,
            notifications,
        }
    }

    async fn load_request(&self, id: SwapId) -> Result<SwapRequest> {
        self.swaps
            .get_request(id)
            .await?
            .ok_or_else(|| MarketError::not_found("SwapRequest", id))
    }

    async fn load_room(&self, id: ChatRoomId) -> Result<ChatRoom> {
        self.swaps
            .get_room(id)
            .await?
            .ok_or_else(|| MarketError::not_found("ChatRoom", id))
    }

    /// Window both participants must keep free for the swap.
    fn slot_query(swap: &SwapRequest) -> ConflictQuery {
        ConflictQuery::new(
            vec![swap.owner_id, swap.requester_id],
            TimeInterval::starting_at(swap.scheduled_time, swap.duration),
        )
    }

    async fn ensure_slot_free(&self, swap: &SwapRequest) -> Result<()> {
        let conflicts = self.sessions.find_conflicts(&Self::slot_query(swap)).await?;
        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(MarketError::Conflict(format!(
                "The requested time overlaps {} existing session(s) of a participant",
                conflicts.len()
            )))
        }
    }

    /// Delivery is best effort: a slow or failing sink never fails the caller.
    async fn notify(&self, user: UserId, notification: Notification) {
        let kind = notification.kind;
        match tokio::time::timeout(NOTIFY_TIMEOUT, self.notifications.notify(user, notification))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(user_id = %user, ?kind, error = %err, "Notification failed");
            }
            Err(_) => {
                tracing::warn!(user_id = %user, ?kind, "Notification timed out");
            }
        }
    }

    pub async fn create_swap_request(
        &self,
        requester: UserId,
        request: CreateSwapRequest,
    ) -> Result<SwapRequest> {
        let owner = self
            .posts
            .owner_of(request.post_id)
            .await?
            .ok_or_else(|| MarketError::not_found("Post", request.post_id))?;
        if self.users.find_by_id(requester).await?.is_none() {
            return Err(MarketError::not_found("User", requester));
        }
        let scheduled_time = DateTime::parse_from_rfc3339(&request.scheduled_time)
            .map_err(|e| {
                MarketError::ValidationError(format!(
                    "scheduledTime '{}' is not a valid RFC 3339 instant: {e}",
                    request.scheduled_time
                ))
            })?
            .with_timezone(&Utc);

        let swap = SwapRequest::new(
            request.post_id,
            owner,
            requester,
            scheduled_time,
            request.message,
        )?;
        self.swaps.insert_request(swap.clone()).await?;
        tracing::info!(swap_id = %swap.id, post_id = %swap.post_id, requester_id = %requester, "Swap requested");

        self.notify(
            owner,
            Notification {
                kind: NotificationKind::SwapRequest,
                title: "New swap request".to_string(),
                content: "Someone wants to swap skills with you".to_string(),
                related_id: swap.id,
                related_model: "SwapRequest",
            },
        )
        .await;
        Ok(swap)
    }

    /// Accepts a pending request and opens its chat room.
    ///
    /// Both participants must be free for the requested window.
    pub async fn accept_swap_request(&self, actor: UserId, id: SwapId) -> Result<ChatRoom> {
        let swap = self.load_request(id).await?;
        if actor != swap.owner_id {
            return Err(MarketError::Forbidden(
                "Only the post owner can answer a swap request".to_string(),
            ));
        }
        self.ensure_slot_free(&swap).await?;

        let room = ChatRoom::for_swap(&swap);
        let room_id = room.id;
        let swap = self
            .swaps
            .update_request(
                id,
                Box::new(move |r: &mut SwapRequest| -> Result<()> {
                    r.accept(actor)?;
                    r.chat_room_id = Some(room_id);
                    Ok(())
                }),
            )
            .await?;
        self.swaps.insert_room(room.clone()).await?;
        tracing::info!(swap_id = %swap.id, chat_room_id = %room.id, "Swap accepted");

        self.notify(
            swap.requester_id,
            Notification {
                kind: NotificationKind::SwapAccepted,
                title: "Swap request accepted".to_string(),
                content: "Your swap request was accepted. Pay the exchange fee to schedule it"
                    .to_string(),
                related_id: room.id,
                related_model: "ChatRoom",
            },
        )
        .await;
        Ok(room)
    }

    pub async fn reject_swap_request(&self, actor: UserId, id: SwapId) -> Result<SwapRequest> {
        let swap = self
            .swaps
            .update_request(
                id,
                Box::new(move |r: &mut SwapRequest| -> Result<()> { r.reject(actor) }),
            )
            .await?;
        tracing::info!(swap_id = %swap.id, "Swap rejected");
        self.notify(
            swap.requester_id,
            Notification {
                kind: NotificationKind::SwapRejected,
                title: "Swap request declined".to_string(),
                content: "Your swap request was declined".to_string(),
                related_id: swap.id,
                related_model: "SwapRequest",
            },
        )
        .await;
        Ok(swap)
    }

    /// Charges `user` the exchange fee for `room_id` and, once both sides
    /// have paid, schedules the session.
    ///
    /// When the wallet is short the room is remembered and retried after the
    /// user's next coin purchase; the `InsufficientBalance` error is returned.
    /// The payment that would complete the room is refused with `Conflict`
    /// while either participant is busy in the swap's window. A fully paid
    /// room whose session could not be created is retried by any later call.
    pub async fn validate_payment(
        &self,
        user: UserId,
        room_id: ChatRoomId,
    ) -> Result<PaymentValidation> {
        let room = self.load_room(room_id).await?;
        let party = room.party(user)?;
        if room.has_paid(party) && (!room.both_paid() || room.session_id.is_some()) {
            return Ok(PaymentValidation {
                room,
                session: None,
                charged: false,
            });
        }

        let swap = self.load_request(room.swap_request_id).await?;
        let mut charged = false;
        if !room.has_paid(party) {
            if room.has_paid(party.other()) {
                self.ensure_slot_free(&swap).await?;
            }
            let batch = settlement::swap_payment(swap.id, user, room.counterpart(party));
            charged = match self.ledger.apply(batch).await {
                Ok(BatchOutcome::Applied(_)) => true,
                Ok(BatchOutcome::Duplicate) => false,
                Err(err @ MarketError::InsufficientBalance { .. }) => {
                    self.swaps.add_pending_validation(user, room_id).await?;
                    tracing::info!(user_id = %user, chat_room_id = %room_id, "Swap payment deferred until coins are bought");
                    return Err(err);
                }
                Err(err) => return Err(err),
            };
        }

        let claim = Uuid::new_v4();
        let (room, _) = self
            .swaps
            .update_room(
                room_id,
                Box::new(move |r: &mut ChatRoom| -> Result<Transition> {
                    r.record_payment(party);
                    if r.both_paid() && r.session_id.is_none() {
                        r.session_id = Some(claim);
                    }
                    Ok(Transition::Applied)
                }),
            )
            .await?;
        let swap = self
            .swaps
            .update_request(
                swap.id,
                Box::new(move |r: &mut SwapRequest| -> Result<()> {
                    r.record_payment(party);
                    Ok(())
                }),
            )
            .await?;
        tracing::info!(user_id = %user, chat_room_id = %room_id, charged, "Swap payment recorded");

        if room.session_id != Some(claim) {
            return Ok(PaymentValidation {
                room,
                session: None,
                charged,
            });
        }
        match self.promote(&room, &swap, claim).await {
            Ok(session) => Ok(PaymentValidation {
                room,
                session: Some(session),
                charged,
            }),
            Err(err) => {
                tracing::warn!(chat_room_id = %room_id, error = %err, "Swap promotion failed; releasing claim");
                self.release_claim(room_id, claim).await?;
                Err(err)
            }
        }
    }

    async fn release_claim(&self, room_id: ChatRoomId, claim: Uuid) -> Result<()> {
        self.swaps
            .update_room(
                room_id,
                Box::new(move |r: &mut ChatRoom| -> Result<Transition> {
                    if r.session_id != Some(claim) {
                        return Ok(Transition::Unchanged);
                    }
                    r.session_id = None;
                    Ok(Transition::Applied)
                }),
            )
            .await?;
        Ok(())
    }

    async fn promote(&self, room: &ChatRoom, swap: &SwapRequest, id: Uuid) -> Result<Session> {
        let mut session = Session::with_duration(
            NewSession {
                host_id: room.host_id,
                learner_id: room.learner_id,
                scheduled_time: swap.scheduled_time,
                title: "Skill swap session".to_string(),
                description: swap.message.clone(),
                session_type: SessionType::SkillExchange,
            },
            swap.duration,
        );
        session.id = id;
        session.swap_request_id = Some(swap.id);
        session.cost = Some(Coins::new(EXCHANGE_FEE));
        session.paid = true;
        if let InsertOutcome::Conflicts(conflicts) = self
            .sessions
            .insert_if_free(session.clone(), &Self::slot_query(swap))
            .await?
        {
            return Err(MarketError::Conflict(format!(
                "The swap slot now overlaps {} existing session(s) of a participant",
                conflicts.len()
            )));
        }
        self.swaps
            .update_request(
                swap.id,
                Box::new(move |r: &mut SwapRequest| -> Result<()> {
                    r.session_id = Some(id);
                    Ok(())
                }),
            )
            .await?;
        tracing::info!(
            session_id = %session.id,
            swap_id = %swap.id,
            "Swap promoted to session"
        );

        for user in session.participants() {
            self.notify(
                user,
                Notification {
                    kind: NotificationKind::SessionScheduled,
                    title: "Session scheduled".to_string(),
                    content: format!(
                        "Your skill swap is scheduled for {}",
                        session.scheduled_time.to_rfc3339()
                    ),
                    related_id: session.id,
                    related_model: "Session",
                },
            )
            .await;
        }
        Ok(session)
    }

    /// Re-attempts every swap payment `user` could not afford earlier, plus
    /// `extra` when given. Rooms that still cannot be paid stay pending;
    /// rooms the user may not pay for at all are dropped.
    pub async fn retry_pending(
        &self,
        user: UserId,
        extra: Option<ChatRoomId>,
    ) -> Result<Vec<PaymentValidation>> {
        let mut rooms = self.swaps.take_pending_validations(user).await?;
        if let Some(room) = extra
            && !rooms.contains(&room)
        {
            rooms.push(room);
        }

        let mut validated = Vec::new();
        for room in rooms {
            match self.validate_payment(user, room).await {
                Ok(validation) => validated.push(validation),
                // Already queued again by validate_payment.
                Err(MarketError::InsufficientBalance { .. }) => {}
                Err(
                    err @ (MarketError::Forbidden(_)
                    | MarketError::NotFound { .. }
                    | MarketError::ValidationError(_)),
                ) => {
                    tracing::warn!(user_id = %user, chat_room_id = %room, error = %err, "Pending swap payment dropped");
                }
                Err(err) => {
                    tracing::warn!(user_id = %user, chat_room_id = %room, error = %err, "Pending swap payment still failing");
                    self.swaps.add_pending_validation(user, room).await?;
                }
            }
        }
        Ok(validated)
    }
}
