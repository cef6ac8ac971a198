//! Read loop tying the decoder, classifier and assembler together
//!
//! [`StreamConsumer`] is the synchronous core: feed it chunks, it applies every
//! complete line before returning. [`consume_stream`] drives it from an async
//! byte stream with cancellation and a deadline.

use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    error::{GenieError, Result},
    messages::TurnSink,
};

use super::{
    AssemblyOutcome, EventClassifier, Flow, LineDecoder, MessageAssembler, ParsedEvent,
    StreamProfile, TrailingLinePolicy,
};

/// Counters for one consumed stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub chunks: usize,
    pub bytes: usize,
    pub lines: usize,
    pub ignorable: usize,
    pub metadata_events: usize,
    pub content_deltas: usize,
    /// Malformed payloads later completed by continuation lines
    pub malformed_recovered: usize,
    /// Malformed payloads given up on
    pub malformed_dropped: usize,
}

/// Malformed payload waiting for the rest of itself
#[derive(Debug)]
struct HeldPayload {
    payload: String,
    continuations: usize,
}

/// Synchronous stream consumer for a single response
#[derive(Debug)]
pub struct StreamConsumer {
    decoder: LineDecoder,
    classifier: EventClassifier,
    assembler: MessageAssembler,
    held: Option<HeldPayload>,
    stopped: bool,
    stats: StreamStats,
}

impl StreamConsumer {
    pub fn new(profile: StreamProfile) -> Self {
        Self {
            decoder: LineDecoder::new(),
            classifier: EventClassifier::new(profile),
            assembler: MessageAssembler::new(),
            held: None,
            stopped: false,
            stats: StreamStats::default(),
        }
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Text assembled so far
    pub fn current_text(&self) -> &str {
        self.assembler.current_text()
    }

    /// Feed one transport chunk and apply every line it completes.
    ///
    /// Returns [`Flow::Stop`] once the done sentinel has been seen; later
    /// chunks are ignored.
    pub fn feed<S: TurnSink + ?Sized>(&mut self, chunk: &[u8], sink: &mut S) -> Flow {
        if self.stopped {
            return Flow::Stop;
        }
        self.stats.chunks += 1;
        self.stats.bytes += chunk.len();
        self.decoder.push(chunk);

        while let Some(line) = self.decoder.next_line() {
            if self.process_line(&line, sink) == Flow::Stop {
                self.stopped = true;
                return Flow::Stop;
            }
        }

        let max_pending = self.classifier.profile().max_pending_bytes;
        if self.decoder.pending_len() > max_pending {
            let bytes = self.decoder.discard_partial();
            self.stats.malformed_dropped += 1;
            warn!(bytes, max_pending, "Dropping overlong stream line");
        }
        Flow::Continue
    }

    /// End of stream: settle leftovers and close the turn
    pub fn finish<S: TurnSink + ?Sized>(mut self, sink: &mut S) -> AssemblyOutcome {
        if !self.stopped {
            if let Some(fragment) = self.decoder.finish() {
                match self.classifier.profile().trailing_line {
                    TrailingLinePolicy::Process => {
                        if self.process_line(&fragment, sink) == Flow::Stop {
                            self.stopped = true;
                        }
                    }
                    TrailingLinePolicy::Discard => {
                        debug!(bytes = fragment.len(), "Discarding unterminated trailing line");
                    }
                }
            }
        }
        if let Some(held) = self.held.take() {
            self.drop_held(&held, "stream ended");
        }

        debug!(stats = ?self.stats, terminal = self.stopped, "Stream consumed");
        self.assembler.finish(sink)
    }

    /// Abort: close the turn as interrupted with whatever arrived
    pub fn interrupt<S: TurnSink + ?Sized>(self, sink: &mut S) -> AssemblyOutcome {
        debug!(stats = ?self.stats, "Stream interrupted");
        self.assembler.interrupt(sink)
    }

    fn process_line<S: TurnSink + ?Sized>(&mut self, line: &str, sink: &mut S) -> Flow {
        self.stats.lines += 1;

        let event = match self.held.take() {
            Some(held) if self.classifier.is_continuation(line) => {
                match self.resume_held(held, line) {
                    Some(event) => event,
                    None => return Flow::Continue,
                }
            }
            Some(held) => {
                self.drop_held(&held, "next event started");
                self.classifier.classify(line)
            }
            None => self.classifier.classify(line),
        };
        self.dispatch(event, sink)
    }

    fn resume_held(&mut self, mut held: HeldPayload, line: &str) -> Option<ParsedEvent> {
        let profile = self.classifier.profile();
        if held.continuations >= profile.max_continuation_lines
            || held.payload.len() + line.len() > profile.max_pending_bytes
        {
            self.drop_held(&held, "retry budget exhausted");
            return None;
        }
        held.payload.push_str(line);
        held.continuations += 1;

        match self.classifier.classify_payload(held.payload.trim_end()) {
            ParsedEvent::Malformed(_) => {
                self.held = Some(held);
                None
            }
            event => {
                self.stats.malformed_recovered += 1;
                Some(event)
            }
        }
    }

    fn dispatch<S: TurnSink + ?Sized>(&mut self, event: ParsedEvent, sink: &mut S) -> Flow {
        let event = match event {
            ParsedEvent::Malformed(payload) => {
                self.hold(payload);
                return Flow::Continue;
            }
            other => other,
        };
        match &event {
            ParsedEvent::Ignorable => self.stats.ignorable += 1,
            ParsedEvent::Metadata(_) => self.stats.metadata_events += 1,
            ParsedEvent::ContentDelta(_) => self.stats.content_deltas += 1,
            ParsedEvent::Terminal | ParsedEvent::Malformed(_) => {}
        }
        self.assembler.apply(event, sink)
    }

    fn hold(&mut self, payload: String) {
        let held = HeldPayload {
            payload,
            continuations: 0,
        };
        if held.payload.len() > self.classifier.profile().max_pending_bytes {
            self.drop_held(&held, "payload too large to hold");
        } else {
            self.held = Some(held);
        }
    }

    fn drop_held(&mut self, held: &HeldPayload, reason: &str) {
        self.stats.malformed_dropped += 1;
        warn!(
            bytes = held.payload.len(),
            continuations = held.continuations,
            reason,
            "Dropping malformed stream event"
        );
    }
}

/// Caller-side controls for one stream
#[derive(Debug, Clone, Default)]
pub struct StreamControl {
    /// Cancel to abort the stream (e.g. the user navigated away)
    pub cancel: CancellationToken,
    /// Deadline for the whole stream
    pub timeout: Option<Duration>,
}

impl StreamControl {
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            timeout: Some(timeout),
        }
    }
}

enum Wake<T> {
    Next(Option<T>),
    Cancelled,
    TimedOut,
}

/// Consume a response body into `sink`
///
/// The only suspension point is waiting for the next chunk; each chunk's lines
/// are fully applied before the next read. A missing done sentinel is not an
/// error. On cancellation, deadline or read failure the open turn is closed as
/// interrupted and the error is returned.
pub async fn consume_stream<St, E, S>(
    body: St,
    profile: StreamProfile,
    sink: &mut S,
    control: &StreamControl,
) -> Result<AssemblyOutcome>
where
    St: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::fmt::Display,
    S: TurnSink + ?Sized,
{
    let mut body = std::pin::pin!(body);
    let mut consumer = StreamConsumer::new(profile);

    let deadline = async {
        match control.timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        let wake = tokio::select! {
            biased;
            () = control.cancel.cancelled() => Wake::Cancelled,
            () = &mut deadline => Wake::TimedOut,
            next = body.next() => Wake::Next(next),
        };

        match wake {
            Wake::Next(Some(Ok(chunk))) => {
                if consumer.feed(&chunk, sink) == Flow::Stop {
                    break;
                }
            }
            Wake::Next(Some(Err(err))) => {
                consumer.interrupt(sink);
                return Err(GenieError::Transport(err.to_string()));
            }
            Wake::Next(None) => break,
            Wake::Cancelled => {
                consumer.interrupt(sink);
                return Err(GenieError::Cancelled);
            }
            Wake::TimedOut => {
                consumer.interrupt(sink);
                return Err(GenieError::Timeout(control.timeout.unwrap_or_default()));
            }
        }
    }

    Ok(consumer.finish(sink))
}
