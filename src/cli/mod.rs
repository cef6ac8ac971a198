//! CLI argument parsing and command helpers

use std::{io::Write, path::PathBuf};

use clap::{Parser, Subcommand};
use tracing::warn;
use uuid::Uuid;

use crate::{
    messages::{Conversation, OpenTurnHandle, TurnSink, TurnStatus},
    streaming::{AssemblyOutcome, ChatSurface, Flow, StreamConsumer, StreamProfile, StreamStats},
    trust::{improvement_hint, TrustMetadata},
};

/// Genie: streaming chat client for the wellness advisor
#[derive(Debug, Parser)]
#[command(name = "genie")]
#[command(about = "Streaming chat client for the Genie advisor", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Send one prompt and stream the reply
    Chat {
        /// The prompt to send
        prompt: String,

        /// Chat surface to talk to (defaults to the configured one)
        #[arg(long, value_enum)]
        surface: Option<ChatSurface>,

        /// Advisor mode, e.g. daily_operator or decision_support
        #[arg(long)]
        mode: Option<String>,
    },

    /// Run a captured event-stream body through the decoder offline
    Replay {
        /// File holding the raw response body
        file: PathBuf,

        /// Bytes per simulated network chunk
        #[arg(long, default_value_t = 64, value_parser = clap::value_parser!(u64).range(1..))]
        chunk_size: u64,

        #[arg(long, value_enum, default_value_t = ChatSurface::Workspace)]
        surface: ChatSurface,

        /// Mode used for the fallback trust estimate
        #[arg(long)]
        mode: Option<String>,
    },

    /// Show configuration
    Config {
        /// List all config values
        #[arg(long)]
        list: bool,

        /// Write a default global config file if none exists
        #[arg(long, conflicts_with = "list")]
        init: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from environment
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Conversation sink that also prints assistant text as it grows
pub struct EchoSink<W: Write> {
    conversation: Conversation,
    out: W,
    printed: usize,
}

impl<W: Write> EchoSink<W> {
    pub fn new(conversation: Conversation, out: W) -> Self {
        Self {
            conversation,
            out,
            printed: 0,
        }
    }

    pub fn into_inner(self) -> (Conversation, W) {
        (self.conversation, self.out)
    }

    fn echo(&mut self, content: &str) {
        let Some(suffix) = content.get(self.printed..) else {
            return;
        };
        if suffix.is_empty() {
            return;
        }
        if let Err(err) = self.out.write_all(suffix.as_bytes()).and_then(|()| self.out.flush()) {
            warn!(error = %err, "Failed to echo reply");
        }
        self.printed = content.len();
    }
}

impl<W: Write> AsRef<Conversation> for EchoSink<W> {
    fn as_ref(&self) -> &Conversation {
        &self.conversation
    }
}

impl<W: Write> TurnSink for EchoSink<W> {
    fn push_user_turn(&mut self, content: &str) -> Uuid {
        self.conversation.push_user_turn(content)
    }

    fn open_assistant_turn(
        &mut self,
        content: &str,
        metadata: Option<&TrustMetadata>,
    ) -> OpenTurnHandle {
        self.printed = 0;
        self.echo(content);
        self.conversation.open_assistant_turn(content, metadata)
    }

    fn update_turn(
        &mut self,
        handle: &OpenTurnHandle,
        content: &str,
        metadata: Option<&TrustMetadata>,
    ) -> bool {
        self.echo(content);
        self.conversation.update_turn(handle, content, metadata)
    }

    fn close_turn(&mut self, handle: OpenTurnHandle, status: TurnStatus) -> bool {
        if let Err(err) = writeln!(self.out) {
            warn!(error = %err, "Failed to echo reply");
        }
        self.conversation.close_turn(handle, status)
    }

    fn rollback_failed_exchange(&mut self, user_turn: Uuid) -> usize {
        self.conversation.rollback_failed_exchange(user_turn)
    }
}

/// Result of replaying a captured body
#[derive(Debug)]
pub struct Replay {
    pub conversation: Conversation,
    pub outcome: AssemblyOutcome,
    pub stats: StreamStats,
}

/// Feed `body` through a [`StreamConsumer`] in `chunk_size` pieces
#[must_use]
pub fn replay_body(body: &[u8], chunk_size: usize, profile: StreamProfile) -> Replay {
    let mut conversation = Conversation::new();
    let mut consumer = StreamConsumer::new(profile);
    for chunk in body.chunks(chunk_size.max(1)) {
        if consumer.feed(chunk, &mut conversation) == Flow::Stop {
            break;
        }
    }
    let stats = consumer.stats();
    let outcome = consumer.finish(&mut conversation);
    Replay {
        conversation,
        outcome,
        stats,
    }
}

/// Human-readable trust block printed under a reply
#[must_use]
pub fn trust_summary(trust: &TrustMetadata, from_backend: bool) -> String {
    let source = if from_backend { "backend" } else { "estimated" };
    let mut summary = format!(
        "Trust ({source}): confidence {:?}, sensitivity {:?}, {}\n  {}\n",
        trust.confidence_level,
        trust.data_sensitivity,
        if trust.is_inference { "inference" } else { "grounded" },
        trust.explanation,
    );
    for factor in &trust.factors {
        summary.push_str(&format!("  - {factor}\n"));
    }
    summary.push_str(&format!("  Tip: {}", improvement_hint(trust)));
    summary
}
