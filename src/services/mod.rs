//! Service layer for the Genie chat backend
//!
//! [`ChatClient`] runs one prompt/response exchange end to end:
//! - validates the prompt and resolves a credential
//! - appends the user turn optimistically
//! - posts the request to the surface's edge function
//! - streams the reply into the conversation
//! - rolls the conversation back when the exchange fails

pub mod credentials;
pub mod request;

use std::time::{Duration, Instant};

use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use self::{
    credentials::{CredentialProvider, EnvCredential, StaticCredential},
    request::{validate_prompt, ChatMessage, ChatOptions, ChatRequest},
};
use crate::{
    config::{Config, StreamSettings},
    error::{GenieError, Result},
    messages::{Conversation, SharedConversation, TurnSink},
    streaming::{consume_stream, AssembledTurn, AssemblyOutcome, ChatSurface, StreamControl},
};

/// Message used when an error response carries no usable `error` field
const FALLBACK_ERROR_MESSAGE: &str = "Failed to get response";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Streaming chat client for the Genie edge functions
#[derive(Debug, Clone)]
pub struct ChatClient<C> {
    http: Client,
    base_url: String,
    timeout: Duration,
    stream: StreamSettings,
    credentials: C,
}

impl ChatClient<StaticCredential> {
    /// Client using the token from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    pub fn from_config(config: &Config) -> Result<Self> {
        let credentials = StaticCredential::new(config.global.access_token.clone());
        Self::new(config, credentials)
    }
}

impl<C: CredentialProvider> ChatClient<C> {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built
    pub fn new(config: &Config, credentials: C) -> Result<Self> {
        config.validate()?;

        let http = Client::builder()
            .user_agent(concat!("genie-stream/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.global.supabase_url.trim().trim_end_matches('/').to_string(),
            timeout: config.request_timeout(),
            stream: config.global.stream.clone(),
            credentials,
        })
    }

    /// URL of the edge function serving `surface`
    #[must_use]
    pub fn endpoint(&self, surface: ChatSurface) -> String {
        format!("{}/functions/v1/{}", self.base_url, surface.function_name())
    }

    /// Send `prompt` and stream the reply into `conversation`
    ///
    /// `conversation` may be a plain [`Conversation`] or any sink wrapping one.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt is invalid, there is no credential, the
    /// request fails, the stream is cancelled or times out, or the reply is
    /// empty. On error the conversation is rolled back.
    pub async fn send<S>(
        &self,
        conversation: &mut S,
        prompt: &str,
        options: &ChatOptions,
        control: &StreamControl,
    ) -> Result<AssembledTurn>
    where
        S: TurnSink + AsRef<Conversation>,
    {
        let (prompt, token) = self.prepare(prompt, options.surface).await?;
        let user_turn = conversation.push_user_turn(prompt);
        let request = ChatRequest::new(ChatMessage::history(conversation.as_ref()), options);
        self.exchange(conversation, user_turn, &token, &request, options.surface, control)
            .await
    }

    /// Same as [`ChatClient::send`] for a conversation observed by other tasks
    ///
    /// # Errors
    ///
    /// See [`ChatClient::send`]
    pub async fn send_shared(
        &self,
        conversation: &SharedConversation,
        prompt: &str,
        options: &ChatOptions,
        control: &StreamControl,
    ) -> Result<AssembledTurn> {
        let (prompt, token) = self.prepare(prompt, options.surface).await?;
        let mut sink = conversation.clone();
        let user_turn = sink.push_user_turn(prompt);
        let request = ChatRequest::new(ChatMessage::history(&conversation.lock()), options);
        self.exchange(&mut sink, user_turn, &token, &request, options.surface, control)
            .await
    }

    async fn prepare<'p>(&self, prompt: &'p str, surface: ChatSurface) -> Result<(&'p str, String)> {
        let prompt = validate_prompt(prompt, surface)?;
        let token = self.credentials.access_token().await?.ok_or_else(|| {
            GenieError::Unauthenticated("Not authenticated. Please log in.".to_string())
        })?;
        Ok((prompt, token))
    }

    async fn exchange<S: TurnSink + ?Sized>(
        &self,
        sink: &mut S,
        user_turn: Uuid,
        token: &str,
        request: &ChatRequest,
        surface: ChatSurface,
        control: &StreamControl,
    ) -> Result<AssembledTurn> {
        let result = self.stream_reply(sink, token, request, surface, control).await;
        if let Err(err) = &result {
            let removed = sink.rollback_failed_exchange(user_turn);
            warn!(
                error = %err,
                transport = err.is_transport(),
                removed,
                "Chat exchange failed; conversation rolled back"
            );
        }
        result
    }

    async fn stream_reply<S: TurnSink + ?Sized>(
        &self,
        sink: &mut S,
        token: &str,
        request: &ChatRequest,
        surface: ChatSurface,
        control: &StreamControl,
    ) -> Result<AssembledTurn> {
        let timeout = control.timeout.unwrap_or(self.timeout);
        let started = Instant::now();
        let url = self.endpoint(surface);
        info!(%url, messages = request.messages.len(), mode = %request.mode, "Sending chat request");

        let send = self.http.post(&url).bearer_auth(token).json(request).send();
        let response = tokio::select! {
            biased;
            () = control.cancel.cancelled() => return Err(GenieError::Cancelled),
            () = tokio::time::sleep(timeout) => return Err(GenieError::Timeout(timeout)),
            response = send => response?,
        };

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        if response.content_length() == Some(0) {
            return Err(GenieError::MissingBody);
        }
        debug!(status = %response.status(), elapsed = ?started.elapsed(), "Response headers received");

        let stream_control = StreamControl {
            cancel: control.cancel.clone(),
            timeout: Some(timeout.saturating_sub(started.elapsed())),
        };
        let profile = self.stream.profile_for(surface);
        let outcome = consume_stream(response.bytes_stream(), profile, sink, &stream_control)
            .await
            .map_err(|err| match err {
                GenieError::Timeout(_) => GenieError::Timeout(timeout),
                other => other,
            })?;

        match outcome {
            AssemblyOutcome::Completed(turn) => {
                info!(
                    chars = turn.text.chars().count(),
                    has_metadata = turn.metadata.is_some(),
                    terminal = turn.saw_terminal,
                    "Assistant reply complete"
                );
                Ok(turn)
            }
            AssemblyOutcome::Empty => Err(GenieError::EmptyResponse),
        }
    }
}

/// Map a non-success response to an error, reading `{ "error": ... }` if present
async fn error_from_response(response: Response) -> GenieError {
    let status = response.status();
    let message = match response.text().await {
        Ok(body) => serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.error)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_ERROR_MESSAGE.to_string()),
        Err(err) => {
            debug!(error = %err, "Could not read error body");
            FALLBACK_ERROR_MESSAGE.to_string()
        }
    };
    warn!(status = status.as_u16(), %message, "Chat request rejected");

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GenieError::Unauthenticated(message),
        StatusCode::PAYMENT_REQUIRED => GenieError::PaymentRequired(message),
        StatusCode::TOO_MANY_REQUESTS => GenieError::RateLimited(message),
        _ => GenieError::Api {
            status: status.as_u16(),
            message,
        },
    }
}
