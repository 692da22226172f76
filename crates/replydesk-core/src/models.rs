//! Core data models used throughout Replydesk.
//!
//! These types flow through both halves of the system: the offline
//! knowledge-base pipeline (corpus → [`TemplateRecord`]s → index) and the
//! runtime mailbox pipeline ([`InboundMessage`] → [`ReplyDraft`]).

use serde::{Deserialize, Serialize};

/// One canonical past reply plus the digest used to match against it.
///
/// `reply` is the verbatim trimmed corpus block and is the style source of
/// truth. `topic` is the same text with greeting, sign-off and decorative
/// lines removed, and is only used for matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub topic: String,
    pub reply: String,
}

impl TemplateRecord {
    /// The composite text that gets embedded and shown to the generator.
    ///
    /// Format: `"Topic: {topic}\nFull Template: {reply}"`.
    pub fn composite_text(&self) -> String {
        format!("Topic: {}\nFull Template: {}", self.topic, self.reply)
    }
}

/// The persisted knowledge base: an ordered list of template records.
///
/// Order does not affect retrieval ranking except as the tie-breaker.
pub type KnowledgeBase = Vec<TemplateRecord>;

/// A message pulled from the support mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Bare sender address (`user@example.com`).
    pub sender: String,
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// Value of the `Auto-Submitted` header, when present.
    pub auto_submitted: Option<String>,
}

/// A reply ready to be handed to the mailbox's send operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyDraft {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Result of asking the mailbox for the next unread message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The inbox has no unread messages.
    Empty,
    /// The mailbox rejected the message with its own eligibility check.
    Ineligible { sender: String, reason: String },
    /// A message eligible for further processing.
    Message(InboundMessage),
}
