use super::interval::ConflictQuery;
use super::payment::{CheckoutRequest, CheckoutSession, ProviderEvent};
use super::session::{Session, SessionId, Transition};
use super::swap::{ChatRoom, ChatRoomId, PostId, SwapId, SwapRequest};
use super::transaction::{BatchOutcome, LedgerBatch, Transaction};
use super::user::{UserId, UserProfile};
use super::wallet::{Wallet, WalletId, WalletRef};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Change applied to a stored session while the store holds it exclusively.
pub type SessionMutation = Box<dyn FnOnce(&mut Session) -> Result<Transition> + Send>;

/// Change applied to a stored swap request while the store holds it exclusively.
pub type SwapMutation = Box<dyn FnOnce(&mut SwapRequest) -> Result<()> + Send>;

/// Change applied to a stored chat room while the store holds it exclusively.
pub type ChatRoomMutation = Box<dyn FnOnce(&mut ChatRoom) -> Result<Transition> + Send>;

#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted,
    Conflicts(Vec<Session>),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: SessionId) -> Result<Option<Session>>;
    async fn list_for_user(&self, user: UserId) -> Result<Vec<Session>>;
    async fn find_conflicts(&self, query: &ConflictQuery) -> Result<Vec<Session>>;
    /// Checks `query` and inserts `session` as one step; concurrent callers
    /// cannot both pass the check for overlapping windows.
    async fn insert_if_free(&self, session: Session, query: &ConflictQuery)
    -> Result<InsertOutcome>;
    async fn insert(&self, session: Session) -> Result<()>;
    /// Applies `mutation` and persists the result only if it returns `Ok`.
    async fn update(
        &self,
        id: SessionId,
        mutation: SessionMutation,
    ) -> Result<(Session, Transition)>;
}

#[async_trait]
pub trait SwapStore: Send + Sync {
    /// Fails with `Conflict` when the requester already asked for this post.
    async fn insert_request(&self, request: SwapRequest) -> Result<()>;
    async fn get_request(&self, id: SwapId) -> Result<Option<SwapRequest>>;
    async fn update_request(&self, id: SwapId, mutation: SwapMutation) -> Result<SwapRequest>;
    async fn insert_room(&self, room: ChatRoom) -> Result<()>;
    async fn get_room(&self, id: ChatRoomId) -> Result<Option<ChatRoom>>;
    async fn update_room(
        &self,
        id: ChatRoomId,
        mutation: ChatRoomMutation,
    ) -> Result<(ChatRoom, Transition)>;
    /// Remembers that `user` failed to pay in `room` for lack of coins.
    async fn add_pending_validation(&self, user: UserId, room: ChatRoomId) -> Result<()>;
    /// Removes and returns every room awaiting `user`'s payment.
    async fn take_pending_validations(&self, user: UserId) -> Result<Vec<ChatRoomId>>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Applies every posting or none. Balance checks and writes happen under
    /// the same exclusive section.
    async fn apply(&self, batch: LedgerBatch, now: DateTime<Utc>) -> Result<BatchOutcome>;
    async fn wallet(&self, wallet: WalletRef) -> Result<Option<Wallet>>;
    async fn wallets(&self) -> Result<Vec<Wallet>>;
    /// Ledger rows for `wallet_id`, oldest first.
    async fn transactions(&self, wallet_id: WalletId) -> Result<Vec<Transaction>>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<UserProfile>>;
}

#[async_trait]
pub trait PostDirectory: Send + Sync {
    async fn owner_of(&self, post: PostId) -> Result<Option<UserId>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    SwapRequest,
    SwapAccepted,
    SwapRejected,
    SessionScheduled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub content: String,
    pub related_id: Uuid,
    pub related_model: &'static str,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, user: UserId, notification: Notification) -> Result<()>;
}

/// Broadcast to everyone watching a session's live room.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SessionEvent {
    #[serde(rename_all = "camelCase")]
    SessionStarted {
        session_id: SessionId,
        room_id: String,
        started_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    SessionEnded {
        session_id: SessionId,
        actual_duration: i64,
    },
    #[serde(rename_all = "camelCase")]
    SessionCancelled { session_id: SessionId },
}

/// Best-effort fan-out; implementations must not fail the caller.
pub trait RealtimeChannel: Send + Sync {
    fn emit_to_session_room(&self, session: &Session, event: SessionEvent);
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<CheckoutSession>;
    /// Authenticates `payload` against `signature` and decodes it.
    fn verify_webhook(&self, payload: &[u8], signature: &str) -> Result<ProviderEvent>;
}

pub type SessionStoreRef = Arc<dyn SessionStore>;
pub type SwapStoreRef = Arc<dyn SwapStore>;
pub type LedgerStoreRef = Arc<dyn LedgerStore>;
pub type UserDirectoryRef = Arc<dyn UserDirectory>;
pub type PostDirectoryRef = Arc<dyn PostDirectory>;
pub type NotificationSinkRef = Arc<dyn NotificationSink>;
pub type RealtimeChannelRef = Arc<dyn RealtimeChannel>;
pub type PaymentProviderRef = Arc<dyn PaymentProvider>;
