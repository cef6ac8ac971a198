//! Line classification for chat event streams

use serde_json::Value;
use tracing::warn;

use crate::trust::TrustMetadata;

use super::StreamProfile;

/// One classified line
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEvent {
    /// Comment, keepalive, foreign line or payload without content
    Ignorable,
    /// Done sentinel; nothing after it is processed
    Terminal,
    /// Out-of-band trust signal
    Metadata(TrustMetadata),
    /// Non-empty text fragment
    ContentDelta(String),
    /// Payload that is not valid JSON yet, with the prefix stripped
    Malformed(String),
}

/// Classifies decoded lines according to a [`StreamProfile`]
#[derive(Debug, Clone)]
pub struct EventClassifier {
    profile: StreamProfile,
}

impl EventClassifier {
    pub fn new(profile: StreamProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &StreamProfile {
        &self.profile
    }

    /// Classify one line; first matching rule wins
    pub fn classify(&self, line: &str) -> ParsedEvent {
        if line.is_empty() || line.starts_with(':') {
            return ParsedEvent::Ignorable;
        }
        let Some(rest) = line.strip_prefix(self.profile.event_prefix.as_str()) else {
            return ParsedEvent::Ignorable;
        };
        self.classify_payload(rest.trim())
    }

    /// Classify an already unprefixed payload
    pub fn classify_payload(&self, payload: &str) -> ParsedEvent {
        if payload == self.profile.done_sentinel {
            return ParsedEvent::Terminal;
        }
        match serde_json::from_str::<Value>(payload) {
            Ok(value) => self.classify_value(&value),
            Err(_) => ParsedEvent::Malformed(payload.to_string()),
        }
    }

    /// Whether `line` could continue a payload that was cut by a stray newline.
    ///
    /// Blank lines, comments and prefixed lines start something new.
    pub fn is_continuation(&self, line: &str) -> bool {
        !line.is_empty()
            && !line.starts_with(':')
            && !line.starts_with(self.profile.event_prefix.as_str())
    }

    fn classify_value(&self, value: &Value) -> ParsedEvent {
        if let Some(marker) = &self.profile.metadata_type {
            if value.get("type").and_then(Value::as_str) == Some(marker.as_str()) {
                return match serde_json::from_value::<TrustMetadata>(value.clone()) {
                    Ok(metadata) => ParsedEvent::Metadata(metadata),
                    Err(err) => {
                        warn!(error = %err, "Ignoring trust metadata event with invalid fields");
                        ParsedEvent::Ignorable
                    }
                };
            }
        }

        match value
            .pointer(&self.profile.content_pointer)
            .and_then(Value::as_str)
        {
            Some(text) if !text.is_empty() => ParsedEvent::ContentDelta(text.to_string()),
            _ => ParsedEvent::Ignorable,
        }
    }
}

impl Default for EventClassifier {
    fn default() -> Self {
        Self::new(StreamProfile::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::ConfidenceLevel;

    const METADATA_LINE: &str = r#"data: {"type":"trust_metadata","confidenceLevel":"low","dataSensitivity":"standard","isInference":true,"explanation":"thin context","factors":["No profile"]}"#;

    #[test]
    fn test_comments_and_blank_lines() {
        let classifier = EventClassifier::default();
        assert_eq!(classifier.classify(""), ParsedEvent::Ignorable);
        assert_eq!(classifier.classify(": keep-alive"), ParsedEvent::Ignorable);
        assert_eq!(classifier.classify("event: message"), ParsedEvent::Ignorable);
        assert_eq!(classifier.classify("data:{\"x\":1}"), ParsedEvent::Ignorable);
    }

    #[test]
    fn test_done_sentinel() {
        let classifier = EventClassifier::default();
        assert_eq!(classifier.classify("data: [DONE]"), ParsedEvent::Terminal);
        assert_eq!(classifier.classify("data:  [DONE]  "), ParsedEvent::Terminal);
    }

    #[test]
    fn test_content_delta() {
        let classifier = EventClassifier::default();
        let line = r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#;
        assert_eq!(
            classifier.classify(line),
            ParsedEvent::ContentDelta("Hi".into())
        );
    }

    #[test]
    fn test_payloads_without_content() {
        let classifier = EventClassifier::default();
        for line in [
            r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":""}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
            r#"data: {"choices":[]}"#,
            r#"data: {"id":"chatcmpl-1","object":"chat.completion.chunk"}"#,
            r#"data: [1,2,3]"#,
        ] {
            assert_eq!(classifier.classify(line), ParsedEvent::Ignorable, "{line}");
        }
    }

    #[test]
    fn test_metadata_event() {
        let classifier = EventClassifier::default();
        let ParsedEvent::Metadata(meta) = classifier.classify(METADATA_LINE) else {
            panic!("Expected metadata event");
        };
        assert_eq!(meta.confidence_level, ConfidenceLevel::Low);
        assert_eq!(meta.factors, vec!["No profile".to_string()]);
    }

    #[test]
    fn test_metadata_disabled_profile() {
        let classifier = EventClassifier::new(StreamProfile::without_metadata());
        assert_eq!(classifier.classify(METADATA_LINE), ParsedEvent::Ignorable);
    }

    #[test]
    fn test_invalid_metadata_is_ignorable() {
        let classifier = EventClassifier::default();
        let line = r#"data: {"type":"trust_metadata","confidenceLevel":"certain"}"#;
        assert_eq!(classifier.classify(line), ParsedEvent::Ignorable);
    }

    #[test]
    fn test_truncated_json_is_malformed() {
        let classifier = EventClassifier::default();
        assert_eq!(
            classifier.classify(r#"data: {"choices":[{"del"#),
            ParsedEvent::Malformed(r#"{"choices":[{"del"#.into())
        );
    }

    #[test]
    fn test_custom_content_pointer() {
        let profile = StreamProfile {
            content_pointer: "/delta/text".into(),
            ..StreamProfile::default()
        };
        let classifier = EventClassifier::new(profile);
        assert_eq!(
            classifier.classify(r#"data: {"delta":{"text":"yo"}}"#),
            ParsedEvent::ContentDelta("yo".into())
        );
    }

    #[test]
    fn test_continuation_lines() {
        let classifier = EventClassifier::default();
        assert!(classifier.is_continuation(r#"ent":"lo"}}]}"#));
        assert!(!classifier.is_continuation(""));
        assert!(!classifier.is_continuation(": ping"));
        assert!(!classifier.is_continuation("data: [DONE]"));
    }
}
