//! Conversation types for streamed chat
//!
//! A [`Conversation`] is the caller-owned, ordered list of turns. The stream
//! assembler never inspects its tail to guess which turn is in progress; it
//! holds an [`OpenTurnHandle`] instead and writes through the [`TurnSink`] trait.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::trust::{self, TrustMetadata};

/// Message role in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Lifecycle of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// Assistant turn still receiving content deltas
    Streaming,
    /// Closed after the stream finished normally
    Complete,
    /// Closed early by cancellation, deadline or transport failure
    Interrupted,
}

impl TurnStatus {
    /// Closed turns are immutable
    #[must_use]
    pub const fn is_closed(self) -> bool {
        !matches!(self, Self::Streaming)
    }
}

/// A single turn in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TrustMetadata>,
    pub status: TurnStatus,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    /// Create a closed user turn
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            content: content.into(),
            metadata: None,
            status: TurnStatus::Complete,
            created_at: Utc::now(),
        }
    }

    /// Create an assistant turn that is still streaming
    #[must_use]
    pub fn streaming_assistant(content: impl Into<String>, metadata: Option<TrustMetadata>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            content: content.into(),
            metadata,
            status: TurnStatus::Streaming,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// Backend trust metadata, or a content-based estimate when none arrived
    #[must_use]
    pub fn effective_trust(&self, mode: Option<&str>) -> TrustMetadata {
        self.metadata
            .clone()
            .unwrap_or_else(|| trust::fallback_metadata(&self.content, mode))
    }
}

/// Exclusive handle on the assistant turn being assembled
///
/// Not `Clone`: exactly one holder may extend a turn, and closing the turn
/// consumes the handle.
#[derive(Debug, PartialEq, Eq)]
pub struct OpenTurnHandle {
    id: Uuid,
}

impl OpenTurnHandle {
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }
}

/// Destination for assembled turns
///
/// Every method is one atomic write; implementations shared across threads
/// must lock around each call.
pub trait TurnSink {
    /// Append a whole user turn and return its id
    fn push_user_turn(&mut self, content: &str) -> Uuid;

    /// Append a new streaming assistant turn
    fn open_assistant_turn(
        &mut self,
        content: &str,
        metadata: Option<&TrustMetadata>,
    ) -> OpenTurnHandle;

    /// Replace content and metadata of an open turn.
    ///
    /// Returns `false` if the turn is gone or already closed.
    fn update_turn(
        &mut self,
        handle: &OpenTurnHandle,
        content: &str,
        metadata: Option<&TrustMetadata>,
    ) -> bool;

    /// Close an open turn with a final status
    fn close_turn(&mut self, handle: OpenTurnHandle, status: TurnStatus) -> bool;

    /// Undo the optimistic part of a failed exchange started by `user_turn`.
    ///
    /// Returns the number of turns removed.
    fn rollback_failed_exchange(&mut self, user_turn: Uuid) -> usize;
}

impl<T: TurnSink + ?Sized> TurnSink for &mut T {
    fn push_user_turn(&mut self, content: &str) -> Uuid {
        (**self).push_user_turn(content)
    }

    fn open_assistant_turn(
        &mut self,
        content: &str,
        metadata: Option<&TrustMetadata>,
    ) -> OpenTurnHandle {
        (**self).open_assistant_turn(content, metadata)
    }

    fn update_turn(
        &mut self,
        handle: &OpenTurnHandle,
        content: &str,
        metadata: Option<&TrustMetadata>,
    ) -> bool {
        (**self).update_turn(handle, content, metadata)
    }

    fn close_turn(&mut self, handle: OpenTurnHandle, status: TurnStatus) -> bool {
        (**self).close_turn(handle, status)
    }

    fn rollback_failed_exchange(&mut self, user_turn: Uuid) -> usize {
        (**self).rollback_failed_exchange(user_turn)
    }
}

/// Ordered list of turns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    /// Look up a turn by id
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&ConversationTurn> {
        self.position(id).map(|idx| &self.turns[idx])
    }

    /// Remove a turn by id (host-side edits such as "delete message")
    pub fn remove(&mut self, id: Uuid) -> Option<ConversationTurn> {
        self.position(id).map(|idx| self.turns.remove(idx))
    }

    /// Number of assistant turns
    #[must_use]
    pub fn assistant_turns(&self) -> usize {
        self.turns.iter().filter(|t| t.is_assistant()).count()
    }

    // Open turns sit at or near the tail, so search from the back.
    fn position(&self, id: Uuid) -> Option<usize> {
        self.turns.iter().rposition(|t| t.id == id)
    }

    fn open_turn_mut(&mut self, handle: &OpenTurnHandle) -> Option<&mut ConversationTurn> {
        let idx = self.position(handle.id)?;
        let turn = &mut self.turns[idx];
        (!turn.status.is_closed()).then_some(turn)
    }
}

impl AsRef<Conversation> for Conversation {
    fn as_ref(&self) -> &Conversation {
        self
    }
}

impl TurnSink for Conversation {
    fn push_user_turn(&mut self, content: &str) -> Uuid {
        let turn = ConversationTurn::user(content);
        let id = turn.id;
        self.turns.push(turn);
        id
    }

    fn open_assistant_turn(
        &mut self,
        content: &str,
        metadata: Option<&TrustMetadata>,
    ) -> OpenTurnHandle {
        let turn = ConversationTurn::streaming_assistant(content, metadata.cloned());
        let handle = OpenTurnHandle { id: turn.id };
        self.turns.push(turn);
        handle
    }

    fn update_turn(
        &mut self,
        handle: &OpenTurnHandle,
        content: &str,
        metadata: Option<&TrustMetadata>,
    ) -> bool {
        let Some(turn) = self.open_turn_mut(handle) else {
            return false;
        };
        turn.content.clear();
        turn.content.push_str(content);
        turn.metadata = metadata.cloned();
        true
    }

    fn close_turn(&mut self, handle: OpenTurnHandle, status: TurnStatus) -> bool {
        let Some(turn) = self.open_turn_mut(&handle) else {
            return false;
        };
        turn.status = status;
        true
    }

    fn rollback_failed_exchange(&mut self, user_turn: Uuid) -> usize {
        let Some(user_idx) = self.position(user_turn) else {
            return 0;
        };
        let before = self.turns.len();

        // An assistant turn that never received text is noise.
        if let Some(last) = self.turns.last() {
            if self.turns.len() - 1 > user_idx && last.is_assistant() && last.content.is_empty() {
                self.turns.pop();
            }
        }

        let answered = self.turns[user_idx + 1..].iter().any(ConversationTurn::is_assistant);
        if !answered {
            self.turns.remove(user_idx);
        }

        before - self.turns.len()
    }
}

/// Conversation shared between the streaming task and its observers
#[derive(Debug, Clone, Default)]
pub struct SharedConversation(Arc<Mutex<Conversation>>);

impl SharedConversation {
    #[must_use]
    pub fn new(conversation: Conversation) -> Self {
        Self(Arc::new(Mutex::new(conversation)))
    }

    /// Lock for reading or host-side edits
    pub fn lock(&self) -> MutexGuard<'_, Conversation> {
        self.0.lock()
    }

    /// Copy of the current state
    #[must_use]
    pub fn snapshot(&self) -> Conversation {
        self.0.lock().clone()
    }
}

impl TurnSink for SharedConversation {
    fn push_user_turn(&mut self, content: &str) -> Uuid {
        self.0.lock().push_user_turn(content)
    }

    fn open_assistant_turn(
        &mut self,
        content: &str,
        metadata: Option<&TrustMetadata>,
    ) -> OpenTurnHandle {
        self.0.lock().open_assistant_turn(content, metadata)
    }

    fn update_turn(
        &mut self,
        handle: &OpenTurnHandle,
        content: &str,
        metadata: Option<&TrustMetadata>,
    ) -> bool {
        self.0.lock().update_turn(handle, content, metadata)
    }

    fn close_turn(&mut self, handle: OpenTurnHandle, status: TurnStatus) -> bool {
        self.0.lock().close_turn(handle, status)
    }

    fn rollback_failed_exchange(&mut self, user_turn: Uuid) -> usize {
        self.0.lock().rollback_failed_exchange(user_turn)
    }
}
