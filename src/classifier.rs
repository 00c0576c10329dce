//! Classifier / responder
//!
//! Builds prompts from persona profiles and conversation context, calls the
//! AI gateway, and decodes batch classifications strictly: items are matched
//! to inputs by echoed id, never by position, and anything the model fails to
//! echo or label validly degrades to `Unclassified` rather than a fabricated
//! default.

use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::adapters::InboundComment;
use crate::ai::{AiError, AiGatewayClient, ChatMessage};
use crate::models::{message, persona_profile};

/// Classifier-assigned intent label for a comment or message
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Buying,
    Question,
    Praise,
    Complaint,
    Spam,
    Unclassified,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buying => "buying",
            Signal::Question => "question",
            Signal::Praise => "praise",
            Signal::Complaint => "complaint",
            Signal::Spam => "spam",
            Signal::Unclassified => "unclassified",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "buying" => Signal::Buying,
            "question" => Signal::Question,
            "praise" => Signal::Praise,
            "complaint" => Signal::Complaint,
            "spam" => Signal::Spam,
            _ => Signal::Unclassified,
        }
    }
}

/// One comment with its classification outcome
#[derive(Debug, Clone)]
pub struct ClassifiedComment {
    pub comment_id: String,
    pub author_id: String,
    pub author_username: Option<String>,
    pub text: String,
    pub signal: Signal,
    pub suggested_reply: Option<String>,
}

/// Raw per-item shape the model is asked to echo back
#[derive(Debug, Deserialize)]
struct RawClassification {
    id: String,
    signal: String,
    #[serde(default)]
    reply: Option<String>,
}

/// Classifier over the AI gateway
#[derive(Clone)]
pub struct Classifier {
    ai: Arc<AiGatewayClient>,
    context_turns: usize,
}

impl Classifier {
    pub fn new(ai: Arc<AiGatewayClient>, context_turns: usize) -> Self {
        Self { ai, context_turns }
    }

    /// Size of the bounded context window
    pub fn context_turns(&self) -> usize {
        self.context_turns
    }

    /// System instruction biasing replies toward the account's persona.
    fn build_system_prompt(
        persona: Option<&persona_profile::Model>,
        redirect_sent: bool,
    ) -> String {
        let mut prompt = String::from(
            "You reply to fans on behalf of a creator. Stay in character, keep replies \
             to one or two short sentences, and never mention being an AI.",
        );

        if let Some(persona) = persona {
            prompt.push_str(&format!(
                " Tone: {}. Vocabulary: {}. Emotional range: {}.",
                persona.tone, persona.vocabulary_style, persona.emotional_range
            ));

            if let Some(boundaries) = persona
                .boundaries
                .as_ref()
                .and_then(|value| value.as_array())
            {
                let rules: Vec<&str> = boundaries.iter().filter_map(|b| b.as_str()).collect();
                if !rules.is_empty() {
                    prompt.push_str(&format!(" Never do the following: {}.", rules.join("; ")));
                }
            }

            match (&persona.redirect_url, redirect_sent) {
                (Some(url), false) => prompt.push_str(&format!(
                    " If the fan shows buying intent, point them to {} exactly once.",
                    url
                )),
                (Some(_), true) => prompt.push_str(
                    " The fan already received the link; do not send it again.",
                ),
                (None, _) => {}
            }
        }

        prompt
    }

    /// Generate a reply to one inbound message, given the recent context
    /// window. `message_text` must be non-empty; callers skip blank inbound
    /// messages.
    pub async fn generate_reply(
        &self,
        message_text: &str,
        sender_name: &str,
        recent_context: &[message::Model],
        persona: Option<&persona_profile::Model>,
        redirect_sent: bool,
    ) -> Result<String, AiError> {
        let mut messages = vec![ChatMessage::system(Self::build_system_prompt(
            persona,
            redirect_sent,
        ))];

        // Bounded window of prior turns, oldest first
        let context = recent_context
            .iter()
            .rev()
            .take(self.context_turns)
            .rev();
        for turn in context {
            match turn.sender_type.as_str() {
                "fan" => messages.push(ChatMessage::user(turn.content.clone())),
                _ => messages.push(ChatMessage::assistant(turn.content.clone())),
            }
        }

        messages.push(ChatMessage::user(format!(
            "{}: {}",
            sender_name, message_text
        )));

        let reply = self.ai.complete(messages).await?;
        Ok(reply.trim().to_string())
    }

    /// Classify a batch of comments. The model is asked to echo each input's
    /// id; outputs are matched by id, and anything missing or invalid
    /// degrades to `Unclassified`. A completely unparseable completion
    /// yields `Unclassified` for every input, none dropped.
    pub async fn classify_comments(
        &self,
        comments: &[InboundComment],
    ) -> Result<Vec<ClassifiedComment>, AiError> {
        if comments.is_empty() {
            return Ok(Vec::new());
        }

        let listing: String = comments
            .iter()
            .map(|comment| {
                format!(
                    "- id: {} | author: {} | text: {}",
                    comment.comment_id,
                    comment.author_username.as_deref().unwrap_or("unknown"),
                    comment.text.replace('\n', " ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let system = "You label social media comments for a creator's inbox. For each \
                      comment decide the signal: buying (purchase intent), question, praise, \
                      complaint, or spam. For buying comments also draft a short friendly DM \
                      reply. Respond with ONLY a JSON array; each element must be \
                      {\"id\": \"<the comment id, echoed exactly>\", \"signal\": \"<label>\", \
                      \"reply\": \"<DM text, buying only>\"}.";

        let completion = self
            .ai
            .complete(vec![
                ChatMessage::system(system),
                ChatMessage::user(listing),
            ])
            .await?;

        Ok(Self::decode_batch(&completion, comments))
    }

    /// Strict decode of a batch completion. Pure so it can be tested without
    /// a gateway.
    fn decode_batch(completion: &str, comments: &[InboundComment]) -> Vec<ClassifiedComment> {
        let raw_items = Self::extract_classifications(completion);

        if raw_items.is_empty() {
            warn!(
                input_count = comments.len(),
                "Batch classification response unusable; degrading all items to unclassified"
            );
        }

        comments
            .iter()
            .map(|comment| {
                let matched = raw_items
                    .iter()
                    .find(|item| item.id == comment.comment_id);

                let (signal, suggested_reply) = match matched {
                    Some(item) => {
                        let signal = Signal::parse(&item.signal);
                        let reply = item
                            .reply
                            .as_deref()
                            .map(str::trim)
                            .filter(|reply| !reply.is_empty())
                            .map(String::from);
                        // A reply is only usable for buying signals
                        match signal {
                            Signal::Buying => (signal, reply),
                            _ => (signal, None),
                        }
                    }
                    None => (Signal::Unclassified, None),
                };

                ClassifiedComment {
                    comment_id: comment.comment_id.clone(),
                    author_id: comment.author_id.clone(),
                    author_username: comment.author_username.clone(),
                    text: comment.text.clone(),
                    signal,
                    suggested_reply,
                }
            })
            .collect()
    }

    /// Locate the JSON array in the completion text and decode it. Returns
    /// an empty vec when no valid array is present.
    fn extract_classifications(completion: &str) -> Vec<RawClassification> {
        let array_pattern = Regex::new(r"\[[\s\S]*\]").expect("valid regex");
        let Some(matched) = array_pattern.find(completion) else {
            return Vec::new();
        };

        match serde_json::from_str::<Vec<RawClassification>>(matched.as_str()) {
            Ok(items) => items,
            Err(err) => {
                debug!(error = %err, "Batch classification array failed strict decode");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn comment(id: &str, text: &str) -> InboundComment {
        InboundComment {
            comment_id: id.to_string(),
            author_id: format!("author-{}", id),
            author_username: Some("fan".to_string()),
            text: text.to_string(),
        }
    }

    fn persona(redirect_url: Option<&str>) -> persona_profile::Model {
        persona_profile::Model {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            tone: "flirty".to_string(),
            vocabulary_style: "emoji-heavy".to_string(),
            emotional_range: "warm".to_string(),
            boundaries: Some(serde_json::json!(["never discuss politics"])),
            redirect_url: redirect_url.map(String::from),
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[test]
    fn system_prompt_includes_persona_and_boundaries() {
        let persona = persona(Some("https://fans.example.com/me"));
        let prompt = Classifier::build_system_prompt(Some(&persona), false);

        assert!(prompt.contains("Tone: flirty"));
        assert!(prompt.contains("never discuss politics"));
        assert!(prompt.contains("https://fans.example.com/me"));
    }

    #[test]
    fn system_prompt_suppresses_redirect_after_sent() {
        let persona = persona(Some("https://fans.example.com/me"));
        let prompt = Classifier::build_system_prompt(Some(&persona), true);

        assert!(!prompt.contains("point them to"));
        assert!(prompt.contains("do not send it again"));
    }

    #[test]
    fn decode_batch_matches_by_id_not_position() {
        let comments = vec![comment("c-1", "love this!"), comment("c-2", "price? link?")];
        // Items deliberately reordered relative to the input
        let completion = r#"Here you go:
            [
                {"id": "c-2", "signal": "buying", "reply": "check your DMs 💕"},
                {"id": "c-1", "signal": "praise"}
            ]"#;

        let classified = Classifier::decode_batch(completion, &comments);
        assert_eq!(classified.len(), 2);
        assert_eq!(classified[0].comment_id, "c-1");
        assert_eq!(classified[0].signal, Signal::Praise);
        assert_eq!(classified[1].comment_id, "c-2");
        assert_eq!(classified[1].signal, Signal::Buying);
        assert_eq!(
            classified[1].suggested_reply.as_deref(),
            Some("check your DMs 💕")
        );
    }

    #[test]
    fn decode_batch_degrades_unparseable_response_to_unclassified() {
        let comments = vec![comment("c-1", "a"), comment("c-2", "b"), comment("c-3", "c")];
        let completion = "Sorry, I can't help with that.";

        let classified = Classifier::decode_batch(completion, &comments);
        assert_eq!(classified.len(), 3);
        assert!(classified.iter().all(|c| c.signal == Signal::Unclassified));
        assert!(classified.iter().all(|c| c.suggested_reply.is_none()));
    }

    #[test]
    fn decode_batch_discards_unmatched_ids() {
        let comments = vec![comment("c-1", "price?")];
        let completion = r#"[{"id": "c-99", "signal": "buying", "reply": "hi"}]"#;

        let classified = Classifier::decode_batch(completion, &comments);
        assert_eq!(classified.len(), 1);
        assert_eq!(classified[0].signal, Signal::Unclassified);
        assert!(classified[0].suggested_reply.is_none());
    }

    #[test]
    fn decode_batch_treats_unknown_signal_as_unclassified() {
        let comments = vec![comment("c-1", "hmm")];
        let completion = r#"[{"id": "c-1", "signal": "enthusiastic"}]"#;

        let classified = Classifier::decode_batch(completion, &comments);
        assert_eq!(classified[0].signal, Signal::Unclassified);
    }

    #[test]
    fn decode_batch_ignores_reply_on_non_buying_signal() {
        let comments = vec![comment("c-1", "you rock")];
        let completion = r#"[{"id": "c-1", "signal": "praise", "reply": "should not be used"}]"#;

        let classified = Classifier::decode_batch(completion, &comments);
        assert_eq!(classified[0].signal, Signal::Praise);
        assert!(classified[0].suggested_reply.is_none());
    }

    #[test]
    fn decode_batch_drops_blank_replies() {
        let comments = vec![comment("c-1", "price?")];
        let completion = r#"[{"id": "c-1", "signal": "buying", "reply": "   "}]"#;

        let classified = Classifier::decode_batch(completion, &comments);
        assert_eq!(classified[0].signal, Signal::Buying);
        assert!(classified[0].suggested_reply.is_none());
    }

    #[test]
    fn decode_batch_handles_malformed_array() {
        let comments = vec![comment("c-1", "a"), comment("c-2", "b")];
        let completion = r#"[{"id": "c-1", "signal": }]"#;

        let classified = Classifier::decode_batch(completion, &comments);
        assert_eq!(classified.len(), 2);
        assert!(classified.iter().all(|c| c.signal == Signal::Unclassified));
    }

    #[test]
    fn signal_parse_is_case_insensitive() {
        assert_eq!(Signal::parse("Buying"), Signal::Buying);
        assert_eq!(Signal::parse(" SPAM "), Signal::Spam);
        assert_eq!(Signal::parse("whatever"), Signal::Unclassified);
    }
}
