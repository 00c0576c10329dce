//! Reply dispatch
//!
//! Sends generated or manual replies out through the platform adapter and
//! records the outcome as a two-phase message row: appended as `pending`,
//! reconciled to `sent` or `failed` after the remote call. Send failures are
//! recorded on the row and returned, not re-raised, so callers always get a
//! completed operation with a visible final state.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::adapters::{AdapterContext, AdapterRegistry, SendMessageParams};
use crate::models::{conversation, message};
use crate::repositories::{ConversationRepository, MessageRepository, NewMessage};

/// Who authored an outbound reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySender {
    Ai,
    Manual,
}

impl ReplySender {
    fn sender_type(&self) -> &'static str {
        match self {
            ReplySender::Ai => "ai",
            ReplySender::Manual => "manual",
        }
    }

    fn sender_name(&self) -> &'static str {
        match self {
            ReplySender::Ai => "Auto-responder",
            ReplySender::Manual => "Operator",
        }
    }
}

/// Outcome of a dispatch attempt
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Remote send acknowledged; row reconciled to `sent`
    Sent(message::Model),
    /// Remote send failed; row reconciled to `failed` with the error
    Failed(message::Model),
    /// An auto-DM for this trigger already exists; nothing was sent
    Duplicate,
}

impl DispatchOutcome {
    /// The persisted message row, when one exists
    pub fn message(&self) -> Option<&message::Model> {
        match self {
            DispatchOutcome::Sent(model) | DispatchOutcome::Failed(model) => Some(model),
            DispatchOutcome::Duplicate => None,
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, DispatchOutcome::Sent(_))
    }
}

/// Dispatcher sending replies through platform adapters
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<AdapterRegistry>,
    conversations: ConversationRepository,
    messages: MessageRepository,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        conversations: ConversationRepository,
        messages: MessageRepository,
    ) -> Self {
        Self {
            registry,
            conversations,
            messages,
        }
    }

    /// Send a reply into a conversation.
    ///
    /// `trigger_id` carries the id of the comment that triggered an auto-DM;
    /// the unique index on it makes repeated polling ticks unable to produce
    /// a second send for the same comment.
    pub async fn send_reply(
        &self,
        ctx: AdapterContext,
        conversation: &conversation::Model,
        sender: ReplySender,
        text: String,
        trigger_id: Option<String>,
    ) -> Result<DispatchOutcome> {
        if let Some(trigger) = &trigger_id
            && self.messages.trigger_exists(trigger).await?
        {
            info!(
                conversation_id = %conversation.id,
                trigger_id = %trigger,
                "Skipping dispatch; trigger already answered"
            );
            return Ok(DispatchOutcome::Duplicate);
        }

        let adapter = self.registry.get(&conversation.platform_slug)?;

        // Phase one: record the outbound message as pending before touching
        // the network.
        let mut pending = NewMessage::outbound_pending(
            sender.sender_type().to_string(),
            sender.sender_name().to_string(),
            text.clone(),
        );
        if let Some(trigger) = trigger_id.clone() {
            pending = pending.with_trigger_id(trigger);
        }

        let pending_row = match self.messages.append(&conversation.id, pending).await {
            Ok(row) => row,
            // A concurrent tick won the trigger_id unique race
            Err(err) if trigger_id.is_some() && is_unique_violation_message(&err) => {
                return Ok(DispatchOutcome::Duplicate);
            }
            Err(err) => return Err(err),
        };

        // Phase two: remote send, then reconcile the row.
        let send_result = adapter
            .send_message(SendMessageParams {
                ctx,
                participant_id: conversation.participant_id.clone(),
                text,
            })
            .await;

        match send_result {
            Ok(receipt) => {
                let row = self
                    .messages
                    .resolve_status(
                        &pending_row.id,
                        "sent",
                        Some(receipt.platform_message_id),
                        None,
                    )
                    .await?;

                let metric_labels = vec![("platform", conversation.platform_slug.clone())];
                metrics::counter!("dispatch_sent_total", &metric_labels).increment(1);

                Ok(DispatchOutcome::Sent(row))
            }
            Err(err) => {
                warn!(
                    conversation_id = %conversation.id,
                    platform_slug = %conversation.platform_slug,
                    error = %err,
                    "Reply dispatch failed; recording failed message"
                );

                let row = self
                    .messages
                    .resolve_status(&pending_row.id, "failed", None, Some(err.to_string()))
                    .await?;

                let metric_labels = vec![("platform", conversation.platform_slug.clone())];
                metrics::counter!("dispatch_failed_total", &metric_labels).increment(1);

                Ok(DispatchOutcome::Failed(row))
            }
        }
    }

    /// Mark the conversation's redirect flag after a reply containing the
    /// redirect URL went out.
    pub async fn note_redirect_sent(&self, conversation_id: &uuid::Uuid) -> Result<()> {
        self.conversations.mark_redirect_sent(conversation_id).await
    }
}

fn is_unique_violation_message(err: &anyhow::Error) -> bool {
    let rendered = err.to_string().to_lowercase();
    rendered.contains("unique") || rendered.contains("1555") || rendered.contains("23505")
}
