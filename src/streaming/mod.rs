//! Streaming support for chat responses
//!
//! Decodes a line-delimited event stream (`data: {...}` lines ending with
//! `data: [DONE]`) into incremental assistant turns. One core serves every chat
//! surface; surfaces differ only in their [`StreamProfile`].

pub mod assembler;
pub mod classifier;
pub mod consumer;
pub mod line_decoder;

pub use assembler::{AssembledTurn, AssemblyOutcome, Flow, MessageAssembler};
pub use classifier::{EventClassifier, ParsedEvent};
pub use consumer::{consume_stream, StreamConsumer, StreamControl, StreamStats};
pub use line_decoder::LineDecoder;

use serde::{Deserialize, Serialize};

/// What to do with an unterminated fragment left when the stream ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailingLinePolicy {
    /// Treat it as an interrupted transmission and drop it
    #[default]
    Discard,
    /// Classify it as if it had ended with a newline
    Process,
}

/// Framing and retry parameters for one kind of event stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamProfile {
    /// Literal every meaningful line starts with
    pub event_prefix: String,

    /// Payload marking normal end of stream
    pub done_sentinel: String,

    /// `type` value of out-of-band metadata events; `None` disables them
    pub metadata_type: Option<String>,

    /// JSON pointer to the content fragment of a delta payload
    pub content_pointer: String,

    pub trailing_line: TrailingLinePolicy,

    /// Largest malformed payload held for re-parse, and largest unterminated
    /// line buffered, in bytes
    pub max_pending_bytes: usize,

    /// Continuation lines joined onto a malformed payload before giving up
    pub max_continuation_lines: usize,
}

pub const DEFAULT_EVENT_PREFIX: &str = "data: ";
pub const DEFAULT_DONE_SENTINEL: &str = "[DONE]";
pub const TRUST_METADATA_TYPE: &str = "trust_metadata";
pub const OPENAI_CONTENT_POINTER: &str = "/choices/0/delta/content";

impl Default for StreamProfile {
    fn default() -> Self {
        Self {
            event_prefix: DEFAULT_EVENT_PREFIX.to_string(),
            done_sentinel: DEFAULT_DONE_SENTINEL.to_string(),
            metadata_type: Some(TRUST_METADATA_TYPE.to_string()),
            content_pointer: OPENAI_CONTENT_POINTER.to_string(),
            trailing_line: TrailingLinePolicy::Discard,
            max_pending_bytes: 64 * 1024,
            max_continuation_lines: 4,
        }
    }
}

impl StreamProfile {
    /// Profile for streams that never carry trust metadata
    #[must_use]
    pub fn without_metadata() -> Self {
        Self {
            metadata_type: None,
            ..Self::default()
        }
    }
}

/// The chat surfaces that share the streaming core
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChatSurface {
    /// Full advisor workspace
    #[default]
    Workspace,
    /// Inline chat box embedded in dashboards
    Inline,
    /// Floating coach panel
    Coach,
}

impl ChatSurface {
    /// Edge function serving this surface
    #[must_use]
    pub const fn function_name(self) -> &'static str {
        match self {
            Self::Workspace | Self::Inline => "genie-chat",
            Self::Coach => "ai-coach-chat",
        }
    }

    /// Stream profile for this surface
    #[must_use]
    pub fn profile(self) -> StreamProfile {
        match self {
            Self::Workspace | Self::Inline => StreamProfile::default(),
            Self::Coach => StreamProfile::without_metadata(),
        }
    }

    /// Whether the surface sends its own mode or always "general"
    #[must_use]
    pub const fn fixed_mode(self) -> Option<&'static str> {
        match self {
            Self::Coach => Some("general"),
            Self::Workspace | Self::Inline => None,
        }
    }
}
