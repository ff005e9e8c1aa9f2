use crate::domain::interval::{ConflictQuery, find_conflicts};
use crate::domain::ports::{
    ChatRoomMutation, InsertOutcome, LedgerStore, Notification, NotificationSink, PostDirectory,
    SessionMutation, SessionStore, SwapMutation, SwapStore, UserDirectory,
};
use crate::domain::session::{Session, SessionId, Transition};
use crate::domain::swap::{ChatRoom, ChatRoomId, PostId, SwapId, SwapRequest};
use crate::domain::transaction::{BatchOutcome, LedgerBatch, Transaction};
use crate::domain::user::{UserId, UserProfile};
use crate::domain::wallet::{Wallet, WalletId, WalletRef};
use crate::error::{MarketError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Sessions kept in a shared map.
///
/// Conflict checks that precede an insert run under the same write guard as
/// the insert itself.
#[derive(Default, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: SessionId) -> Result<Option<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&id).cloned())
    }

    async fn list_for_user(&self, user: UserId) -> Result<Vec<Session>> {
        let sessions = self.sessions.read().await;
        let mut mine: Vec<Session> = sessions
            .values()
            .filter(|s| s.is_participant(user))
            .cloned()
            .collect();
        mine.sort_by_key(|s| s.scheduled_time);
        Ok(mine)
    }

    async fn find_conflicts(&self, query: &ConflictQuery) -> Result<Vec<Session>> {
        let sessions = self.sessions.read().await;
        Ok(find_conflicts(sessions.values(), query))
    }

    async fn insert_if_free(
        &self,
        session: Session,
        query: &ConflictQuery,
    ) -> Result<InsertOutcome> {
        let mut sessions = self.sessions.write().await;
        let conflicts = find_conflicts(sessions.values(), query);
        if !conflicts.is_empty() {
            return Ok(InsertOutcome::Conflicts(conflicts));
        }
        sessions.insert(session.id, session);
        Ok(InsertOutcome::Inserted)
    }

    async fn insert(&self, session: Session) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id, session);
        Ok(())
    }

    async fn update(
        &self,
        id: SessionId,
        mutation: SessionMutation,
    ) -> Result<(Session, Transition)> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(&id)
            .ok_or_else(|| MarketError::not_found("Session", id))?;
        let mut working = stored.clone();
        let transition = mutation(&mut working)?;
        *stored = working.clone();
        Ok((working, transition))
    }
}

#[derive(Default)]
struct SwapState {
    requests: HashMap<SwapId, SwapRequest>,
    rooms: HashMap<ChatRoomId, ChatRoom>,
    pending: HashMap<UserId, Vec<ChatRoomId>>,
}

/// Swap requests, their chat rooms and pending payment retries.
#[derive(Default, Clone)]
pub struct InMemorySwapStore {
    state: Arc<RwLock<SwapState>>,
}

impl InMemorySwapStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SwapStore for InMemorySwapStore {
    async fn insert_request(&self, request: SwapRequest) -> Result<()> {
        let mut state = self.state.write().await;
        let duplicate = state
            .requests
            .values()
            .any(|r| r.post_id == request.post_id && r.requester_id == request.requester_id);
        if duplicate {
            return Err(MarketError::Conflict(
                "You already sent a swap request for this post".to_string(),
            ));
        }
        state.requests.insert(request.id, request);
        Ok(())
    }

    async fn get_request(&self, id: SwapId) -> Result<Option<SwapRequest>> {
        let state = self.state.read().await;
        Ok(state.requests.get(&id).cloned())
    }

    async fn update_request(&self, id: SwapId, mutation: SwapMutation) -> Result<SwapRequest> {
        let mut state = self.state.write().await;
        let stored = state
            .requests
            .get_mut(&id)
            .ok_or_else(|| MarketError::not_found("SwapRequest", id))?;
        let mut working = stored.clone();
        mutation(&mut working)?;
        *stored = working.clone();
        Ok(working)
    }

    async fn insert_room(&self, room: ChatRoom) -> Result<()> {
        let mut state = self.state.write().await;
        state.rooms.insert(room.id, room);
        Ok(())
    }

    async fn get_room(&self, id: ChatRoomId) -> Result<Option<ChatRoom>> {
        let state = self.state.read().await;
        Ok(state.rooms.get(&id).cloned())
    }

    async fn update_room(
        &self,
        id: ChatRoomId,
        mutation: ChatRoomMutation,
    ) -> Result<(ChatRoom, Transition)> {
        let mut state = self.state.write().await;
        let stored = state
            .rooms
            .get_mut(&id)
            .ok_or_else(|| MarketError::not_found("ChatRoom", id))?;
        let mut working = stored.clone();
        let transition = mutation(&mut working)?;
        *stored = working.clone();
        Ok((working, transition))
    }

    async fn add_pending_validation(&self, user: UserId, room: ChatRoomId) -> Result<()> {
        let mut state = self.state.write().await;
        let rooms = state.pending.entry(user).or_default();
        if !rooms.contains(&room) {
            rooms.push(room);
        }
        Ok(())
    }

    async fn take_pending_validations(&self, user: UserId) -> Result<Vec<ChatRoomId>> {
        let mut state = self.state.write().await;
        Ok(state.pending.remove(&user).unwrap_or_default())
    }
}

#[derive(Default)]
struct LedgerState {
    wallets: HashMap<WalletRef, Wallet>,
    transactions: Vec<Transaction>,
    applied_keys: HashSet<String>,
}

/// Wallets and their append-only ledger.
///
/// `apply` holds one mutex for the whole check-and-write, so two batches
/// against the same wallet are serialized.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn apply(&self, batch: LedgerBatch, now: DateTime<Utc>) -> Result<BatchOutcome> {
        let mut state = self.state.lock().await;
        if let Some(key) = &batch.idempotency_key
            && state.applied_keys.contains(key)
        {
            return Ok(BatchOutcome::Duplicate);
        }

        let mut working: HashMap<WalletRef, Wallet> = batch
            .wallet_refs()
            .into_iter()
            .filter_map(|r| state.wallets.get(&r).map(|w| (r, w.clone())))
            .collect();
        let written = batch.apply_to(&mut working, now)?;

        state.wallets.extend(working);
        state.transactions.extend(written.iter().cloned());
        if let Some(key) = batch.idempotency_key {
            state.applied_keys.insert(key);
        }
        Ok(BatchOutcome::Applied(written))
    }

    async fn wallet(&self, wallet: WalletRef) -> Result<Option<Wallet>> {
        let state = self.state.lock().await;
        Ok(state.wallets.get(&wallet).cloned())
    }

    async fn wallets(&self) -> Result<Vec<Wallet>> {
        let state = self.state.lock().await;
        Ok(state.wallets.values().cloned().collect())
    }

    async fn transactions(&self, wallet_id: WalletId) -> Result<Vec<Transaction>> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .filter(|tx| tx.wallet_id == wallet_id)
            .cloned()
            .collect())
    }
}

/// Stand-in for the external user service.
#[derive(Default, Clone)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<HashMap<UserId, UserProfile>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserProfile>) -> Self {
        let map = users.into_iter().map(|u| (u.id, u)).collect();
        Self {
            users: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn insert(&self, user: UserProfile) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_id(&self, id: UserId) -> Result<Option<UserProfile>> {
        Ok(self.users.read().await.get(&id).cloned())
    }
}

/// Stand-in for the external post service: post id to owner.
#[derive(Default, Clone)]
pub struct InMemoryPostDirectory {
    owners: Arc<RwLock<HashMap<PostId, UserId>>>,
}

impl InMemoryPostDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, post: PostId, owner: UserId) {
        self.owners.write().await.insert(post, owner);
    }
}

#[async_trait]
impl PostDirectory for InMemoryPostDirectory {
    async fn owner_of(&self, post: PostId) -> Result<Option<UserId>> {
        Ok(self.owners.read().await.get(&post).copied())
    }
}

/// Keeps every notification it is handed.
#[derive(Default, Clone)]
pub struct InMemoryNotificationSink {
    sent: Arc<Mutex<Vec<(UserId, Notification)>>>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<(UserId, Notification)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn notify(&self, user: UserId, notification: Notification) -> Result<()> {
        self.sent.lock().await.push((user, notification));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::coins::{Amount, Coins};
    use crate::domain::interval::TimeInterval;
    use crate::domain::session::{NewSession, SessionType};
    use crate::domain::transaction::Posting;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn session(host: UserId, learner: UserId, start: DateTime<Utc>) -> Session {
        Session::new(NewSession {
            host_id: host,
            learner_id: learner,
            scheduled_time: start,
            title: "Guitar".into(),
            description: None,
            session_type: SessionType::SkillExchange,
        })
    }

    #[tokio::test]
    async fn test_insert_if_free_rejects_overlap() {
        let store = InMemorySessionStore::new();
        let (host, learner) = (Uuid::new_v4(), Uuid::new_v4());
        let start = Utc::now();

        let first = session(host, learner, start);
        let query = ConflictQuery::new(vec![host, learner], first.interval());
        assert_eq!(
            store.insert_if_free(first, &query).await.unwrap(),
            InsertOutcome::Inserted
        );

        let second = session(host, Uuid::new_v4(), start);
        let query = ConflictQuery::new(vec![host], TimeInterval::starting_at(start, 120));
        assert!(matches!(
            store.insert_if_free(second, &query).await.unwrap(),
            InsertOutcome::Conflicts(c) if c.len() == 1
        ));
        assert_eq!(store.list_for_user(host).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_only_one_wins() {
        let store = InMemorySessionStore::new();
        let host = Uuid::new_v4();
        let start = Utc::now();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let s = session(host, Uuid::new_v4(), start);
                let query = ConflictQuery::new(s.participants().to_vec(), s.interval());
                store.insert_if_free(s, &query).await.unwrap()
            }));
        }
        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap() == InsertOutcome::Inserted {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
    }

    #[tokio::test]
    async fn test_update_discards_failed_mutation() {
        let store = InMemorySessionStore::new();
        let s = session(Uuid::new_v4(), Uuid::new_v4(), Utc::now());
        let id = s.id;
        store.insert(s.clone()).await.unwrap();

        let result = store
            .update(
                id,
                Box::new(|s: &mut Session| -> Result<Transition> {
                    s.title = "changed".into();
                    Err(MarketError::ValidationError("nope".into()))
                }),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(store.get(id).await.unwrap().unwrap(), s);
    }

    #[tokio::test]
    async fn test_duplicate_swap_request() {
        let store = InMemorySwapStore::new();
        let (post, owner, requester) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let first = SwapRequest::new(post, owner, requester, Utc::now(), None).unwrap();
        let second = SwapRequest::new(post, owner, requester, Utc::now(), None).unwrap();

        store.insert_request(first).await.unwrap();
        assert!(matches!(
            store.insert_request(second).await,
            Err(MarketError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_pending_validations_are_taken_once() {
        let store = InMemorySwapStore::new();
        let (user, room) = (Uuid::new_v4(), Uuid::new_v4());
        store.add_pending_validation(user, room).await.unwrap();
        store.add_pending_validation(user, room).await.unwrap();

        assert_eq!(store.take_pending_validations(user).await.unwrap(), vec![room]);
        assert!(store.take_pending_validations(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ledger_failed_batch_writes_nothing() {
        let store = InMemoryLedgerStore::new();
        let (rich, poor) = (Uuid::new_v4(), Uuid::new_v4());
        let fifty = Amount::new(dec!(50)).unwrap();
        store
            .apply(
                LedgerBatch::new(vec![Posting::credit(WalletRef::User(rich), fifty, "top up")]),
                Utc::now(),
            )
            .await
            .unwrap();

        let batch = LedgerBatch::new(vec![
            Posting::debit(WalletRef::User(rich), fifty, "fee"),
            Posting::debit(WalletRef::User(poor), fifty, "fee"),
        ]);
        assert!(store.apply(batch, Utc::now()).await.is_err());

        let wallet = store.wallet(WalletRef::User(rich)).await.unwrap().unwrap();
        assert_eq!(wallet.balance, Coins::new(dec!(50)));
        assert_eq!(store.transactions(wallet.id).await.unwrap().len(), 1);
        assert!(store.wallet(WalletRef::User(poor)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ledger_keyed_batch_applies_once() {
        let store = InMemoryLedgerStore::new();
        let user = Uuid::new_v4();
        let batch = LedgerBatch::keyed(
            "provider-event:evt_1",
            vec![Posting::credit(
                WalletRef::User(user),
                Amount::new(dec!(10)).unwrap(),
                "purchase",
            )],
        );

        assert!(matches!(
            store.apply(batch.clone(), Utc::now()).await.unwrap(),
            BatchOutcome::Applied(_)
        ));
        assert_eq!(
            store.apply(batch, Utc::now()).await.unwrap(),
            BatchOutcome::Duplicate
        );
        let wallet = store.wallet(WalletRef::User(user)).await.unwrap().unwrap();
        assert_eq!(wallet.balance, Coins::new(dec!(10)));
    }
}
