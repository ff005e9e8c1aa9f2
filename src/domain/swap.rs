use super::session::{DEFAULT_DURATION_MINUTES, SessionId};
use super::user::UserId;
use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type SwapId = Uuid;
pub type PostId = Uuid;
pub type ChatRoomId = Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum SwapStatus {
    Pending,
    Accepted,
    Rejected,
}

/// A requester's proposal to swap skills with the owner of a post.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    pub id: SwapId,
    pub post_id: PostId,
    pub owner_id: UserId,
    pub requester_id: UserId,
    pub status: SwapStatus,
    pub requester_paid: bool,
    pub owner_paid: bool,
    pub scheduled_time: DateTime<Utc>,
    pub duration: u32,
    pub message: Option<String>,
    pub chat_room_id: Option<ChatRoomId>,
    pub session_id: Option<SessionId>,
}

impl SwapRequest {
    pub fn new(
        post_id: PostId,
        owner_id: UserId,
        requester_id: UserId,
        scheduled_time: DateTime<Utc>,
        message: Option<String>,
    ) -> Result<Self> {
        if owner_id == requester_id {
            return Err(MarketError::ValidationError(
                "You cannot request a swap on your own post".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            post_id,
            owner_id,
            requester_id,
            status: SwapStatus::Pending,
            requester_paid: false,
            owner_paid: false,
            scheduled_time,
            duration: DEFAULT_DURATION_MINUTES,
            message,
            chat_room_id: None,
            session_id: None,
        })
    }

    fn decide(&mut self, actor: UserId, status: SwapStatus) -> Result<()> {
        if actor != self.owner_id {
            return Err(MarketError::Forbidden(
                "Only the post owner can answer a swap request".to_string(),
            ));
        }
        if self.status != SwapStatus::Pending {
            return Err(MarketError::Conflict(format!(
                "Swap request {} was already answered",
                self.id
            )));
        }
        self.status = status;
        Ok(())
    }

    pub fn accept(&mut self, actor: UserId) -> Result<()> {
        self.decide(actor, SwapStatus::Accepted)
    }

    pub fn reject(&mut self, actor: UserId) -> Result<()> {
        self.decide(actor, SwapStatus::Rejected)
    }

    /// Mirrors a chat-room payment onto the request. Flags only ever go up.
    pub fn record_payment(&mut self, party: Party) {
        match party {
            Party::Host => self.owner_paid = true,
            Party::Learner => self.requester_paid = true,
        }
    }

    pub fn both_paid(&self) -> bool {
        self.requester_paid && self.owner_paid
    }
}

/// Which side of an accepted swap a user is on. The post owner hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Host,
    Learner,
}

impl Party {
    pub fn other(self) -> Party {
        match self {
            Party::Host => Party::Learner,
            Party::Learner => Party::Host,
        }
    }
}

/// Room opened when a swap is accepted; tracks who has paid.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub id: ChatRoomId,
    pub swap_request_id: SwapId,
    pub host_id: UserId,
    pub learner_id: UserId,
    pub host_paid: bool,
    pub learner_paid: bool,
    pub session_id: Option<SessionId>,
}

impl ChatRoom {
    pub fn for_swap(swap: &SwapRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            swap_request_id: swap.id,
            host_id: swap.owner_id,
            learner_id: swap.requester_id,
            host_paid: false,
            learner_paid: false,
            session_id: None,
        }
    }

    pub fn party(&self, user: UserId) -> Result<Party> {
        if user == self.host_id {
            Ok(Party::Host)
        } else if user == self.learner_id {
            Ok(Party::Learner)
        } else {
            Err(MarketError::Forbidden(
                "Only members of this chat room can validate payment".to_string(),
            ))
        }
    }

    pub fn has_paid(&self, party: Party) -> bool {
        match party {
            Party::Host => self.host_paid,
            Party::Learner => self.learner_paid,
        }
    }

    pub fn counterpart(&self, party: Party) -> UserId {
        match party {
            Party::Host => self.learner_id,
            Party::Learner => self.host_id,
        }
    }

    pub fn record_payment(&mut self, party: Party) {
        match party {
            Party::Host => self.host_paid = true,
            Party::Learner => self.learner_paid = true,
        }
    }

    pub fn both_paid(&self) -> bool {
        self.host_paid && self.learner_paid
    }
}
