//! Request body for the chat edge functions

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{GenieError, Result},
    messages::{Conversation, Role},
    streaming::ChatSurface,
};

/// Longest prompt any surface accepts, in characters
pub const MAX_PROMPT_CHARS: usize = 4000;

/// Shortest prompt the workspace accepts, in characters
pub const MIN_WORKSPACE_PROMPT_CHARS: usize = 3;

/// Default advisor mode
pub const DEFAULT_MODE: &str = "daily_operator";

/// One message as sent to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Wire history for a conversation, skipping assistant turns that never got text
    #[must_use]
    pub fn history(conversation: &Conversation) -> Vec<Self> {
        conversation
            .turns()
            .iter()
            .filter(|turn| !(turn.is_assistant() && turn.content.is_empty()))
            .map(|turn| Self {
                role: turn.role,
                content: turn.content.clone(),
            })
            .collect()
    }
}

/// Optional context sent along with a prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    #[serde(default)]
    pub surface: ChatSurface,

    /// Advisor mode; ignored by surfaces with a fixed mode
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Business memory (profile fields) as a JSON object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_context: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_context: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_context: Option<String>,

    /// Coach profile fields as a JSON object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_context: Option<Value>,
}

fn default_mode() -> String {
    DEFAULT_MODE.to_string()
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self::new(ChatSurface::default())
    }
}

impl ChatOptions {
    #[must_use]
    pub fn new(surface: ChatSurface) -> Self {
        Self {
            surface,
            mode: default_mode(),
            memory_context: None,
            document_context: None,
            web_context: None,
            user_context: None,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    /// Mode actually sent for this surface
    #[must_use]
    pub fn effective_mode(&self) -> &str {
        self.surface.fixed_mode().unwrap_or(self.mode.as_str())
    }
}

/// JSON body posted to a chat function
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_context: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_context: Option<Value>,
    /// Bot trap; the server rejects requests where this is not empty
    #[serde(rename = "_hp_field")]
    honeypot: &'static str,
}

impl ChatRequest {
    #[must_use]
    pub fn new(messages: Vec<ChatMessage>, options: &ChatOptions) -> Self {
        let non_blank = |s: &Option<String>| s.clone().filter(|s| !s.trim().is_empty());
        Self {
            messages,
            mode: options.effective_mode().to_string(),
            memory_context: options.memory_context.clone(),
            document_context: non_blank(&options.document_context),
            web_context: non_blank(&options.web_context),
            user_context: options.user_context.clone(),
            honeypot: "",
        }
    }
}

/// Trim and check a prompt against the surface's limits
///
/// # Errors
///
/// Returns [`GenieError::InvalidInput`] for empty, too short or too long prompts
pub fn validate_prompt(prompt: &str, surface: ChatSurface) -> Result<&str> {
    let trimmed = prompt.trim();
    let chars = trimmed.chars().count();

    if chars == 0 {
        return Err(GenieError::InvalidInput("Message is empty.".to_string()));
    }
    if surface == ChatSurface::Workspace && chars < MIN_WORKSPACE_PROMPT_CHARS {
        return Err(GenieError::InvalidInput(format!(
            "Message must be at least {MIN_WORKSPACE_PROMPT_CHARS} characters."
        )));
    }
    if chars > MAX_PROMPT_CHARS {
        return Err(GenieError::InvalidInput(format!(
            "Message too long. Keep under {MAX_PROMPT_CHARS} characters."
        )));
    }
    Ok(trimmed)
}
