//! Assembles classified events into a single assistant turn
//!
//! Content deltas are appended in arrival order; the first one opens a turn in
//! the caller's conversation and every later one updates that same turn in place.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    messages::{OpenTurnHandle, TurnSink, TurnStatus},
    trust::TrustMetadata,
};

use super::ParsedEvent;

/// Whether the read loop should keep going after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Final state of an assistant turn produced by one stream
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledTurn {
    pub turn_id: Uuid,
    pub text: String,
    pub metadata: Option<TrustMetadata>,
    /// `true` if the done sentinel arrived, `false` if the transport just closed
    pub saw_terminal: bool,
}

/// Result of one assembly pass
#[derive(Debug, Clone, PartialEq)]
pub enum AssemblyOutcome {
    /// At least one content delta arrived
    Completed(AssembledTurn),
    /// No content at all; no turn was appended
    Empty,
}

impl AssemblyOutcome {
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Completed(turn) => Some(&turn.text),
            Self::Empty => None,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Per-stream assembly state
#[derive(Debug, Default)]
pub struct MessageAssembler {
    text: String,
    metadata: Option<TrustMetadata>,
    open: Option<OpenTurnHandle>,
    saw_terminal: bool,
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text assembled so far
    pub fn current_text(&self) -> &str {
        &self.text
    }

    /// Apply one event to the conversation
    pub fn apply<S: TurnSink + ?Sized>(&mut self, event: ParsedEvent, sink: &mut S) -> Flow {
        match event {
            ParsedEvent::Terminal => {
                self.saw_terminal = true;
                return Flow::Stop;
            }
            ParsedEvent::Metadata(metadata) => {
                debug!(confidence = ?metadata.confidence_level, "Trust metadata received");
                self.metadata = Some(metadata);
                // Metadata may arrive after the first delta; keep the open turn current.
                if let Some(handle) = &self.open {
                    self.write_open_turn(handle, sink);
                }
            }
            ParsedEvent::ContentDelta(fragment) => {
                self.text.push_str(&fragment);
                match &self.open {
                    Some(handle) => self.write_open_turn(handle, sink),
                    None => {
                        let handle = sink.open_assistant_turn(&self.text, self.metadata.as_ref());
                        debug!(turn_id = %handle.id(), "Opened assistant turn");
                        self.open = Some(handle);
                    }
                }
            }
            ParsedEvent::Ignorable | ParsedEvent::Malformed(_) => {}
        }
        Flow::Continue
    }

    fn write_open_turn<S: TurnSink + ?Sized>(&self, handle: &OpenTurnHandle, sink: &mut S) {
        if !sink.update_turn(handle, &self.text, self.metadata.as_ref()) {
            warn!(turn_id = %handle.id(), "Open turn no longer accepts updates");
        }
    }

    /// Close the open turn, if any, and report the outcome
    pub fn finish<S: TurnSink + ?Sized>(self, sink: &mut S) -> AssemblyOutcome {
        self.close(sink, TurnStatus::Complete)
    }

    /// Close the open turn as interrupted, keeping its partial content
    pub fn interrupt<S: TurnSink + ?Sized>(self, sink: &mut S) -> AssemblyOutcome {
        self.close(sink, TurnStatus::Interrupted)
    }

    fn close<S: TurnSink + ?Sized>(self, sink: &mut S, status: TurnStatus) -> AssemblyOutcome {
        let Some(handle) = self.open else {
            return AssemblyOutcome::Empty;
        };
        let turn_id = handle.id();
        if !sink.close_turn(handle, status) {
            warn!(%turn_id, "Assistant turn was removed before it could be closed");
        }
        AssemblyOutcome::Completed(AssembledTurn {
            turn_id,
            text: self.text,
            metadata: self.metadata,
            saw_terminal: self.saw_terminal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        messages::{Conversation, Role},
        trust::fallback_metadata,
    };

    fn delta(text: &str) -> ParsedEvent {
        ParsedEvent::ContentDelta(text.to_string())
    }

    #[test]
    fn test_single_turn_grows_in_place() {
        let mut conversation = Conversation::new();
        conversation.push_user_turn("hi");
        let mut assembler = MessageAssembler::new();

        assembler.apply(delta("Hel"), &mut conversation);
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.last().unwrap().content, "Hel");
        assert_eq!(conversation.last().unwrap().status, TurnStatus::Streaming);

        assembler.apply(delta("lo"), &mut conversation);
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.last().unwrap().content, "Hello");

        assert_eq!(assembler.apply(ParsedEvent::Terminal, &mut conversation), Flow::Stop);
        let outcome = assembler.finish(&mut conversation);
        assert_eq!(outcome.text(), Some("Hello"));
        let last = conversation.last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.status, TurnStatus::Complete);
    }

    #[test]
    fn test_does_not_reuse_previous_assistant_turn() {
        let mut conversation = Conversation::new();
        let old = conversation.open_assistant_turn("old answer", None);
        conversation.close_turn(old, TurnStatus::Complete);

        let mut assembler = MessageAssembler::new();
        assembler.apply(delta("new"), &mut conversation);

        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.turns()[0].content, "old answer");
        assert_eq!(conversation.turns()[1].content, "new");
    }

    #[test]
    fn test_late_metadata_updates_open_turn() {
        let mut conversation = Conversation::new();
        let mut assembler = MessageAssembler::new();
        assembler.apply(delta("A"), &mut conversation);
        assert!(conversation.last().unwrap().metadata.is_none());

        let meta = fallback_metadata("", Some("daily_operator"));
        assembler.apply(ParsedEvent::Metadata(meta.clone()), &mut conversation);
        assert_eq!(conversation.last().unwrap().metadata.as_ref(), Some(&meta));
    }

    #[test]
    fn test_no_deltas_means_no_turn() {
        let mut conversation = Conversation::new();
        let mut assembler = MessageAssembler::new();
        let meta = fallback_metadata("", None);
        assembler.apply(ParsedEvent::Metadata(meta), &mut conversation);
        assembler.apply(ParsedEvent::Ignorable, &mut conversation);

        assert!(assembler.finish(&mut conversation).is_empty());
        assert!(conversation.is_empty());
    }

    #[test]
    fn test_interrupt_keeps_partial_content() {
        let mut conversation = Conversation::new();
        let mut assembler = MessageAssembler::new();
        assembler.apply(delta("half an ans"), &mut conversation);

        let outcome = assembler.interrupt(&mut conversation);
        let AssemblyOutcome::Completed(turn) = outcome else {
            panic!("Expected partial turn");
        };
        assert!(!turn.saw_terminal);
        assert_eq!(conversation.last().unwrap().status, TurnStatus::Interrupted);
        assert_eq!(conversation.last().unwrap().content, "half an ans");
    }

    #[test]
    fn test_host_removing_turn_does_not_abort() {
        let mut conversation = Conversation::new();
        let mut assembler = MessageAssembler::new();
        assembler.apply(delta("a"), &mut conversation);
        let id = conversation.last().unwrap().id;
        conversation.remove(id);

        assert_eq!(assembler.apply(delta("b"), &mut conversation), Flow::Continue);
        assert_eq!(assembler.current_text(), "ab");
        assert_eq!(assembler.finish(&mut conversation).text(), Some("ab"));
    }
}
