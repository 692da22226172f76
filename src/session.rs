//! The mailbox session loop.
//!
//! A [`Session`] is an explicit state machine. Each call to
//! [`Session::advance`] performs one stage and returns a [`Step`] naming what
//! happened and how long to wait before the next call; it never sleeps
//! itself. [`run_until`] drives a session, performing the waits as
//! cancellable tokio timers.
//!
//! ```text
//! Polling ──fetch──┬─ transport error ─────────────── wait error_backoff ─▶ Polling
//!                  ├─ empty ───────────────────────── wait empty_inbox ──▶ Polling
//!                  ├─ ineligible / parse / gen fail ─ wait skip_pause ───▶ Polling
//!                  └─ message → retrieve → compose ── wait throttle ─────▶ Throttling
//! Throttling ──send (sent or failed, no retry) ────── wait after_send ───▶ Polling
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use replydesk_core::compose::{GenerationResult, ReplyComposer, SENTINEL_REPLY};
use replydesk_core::eligibility::EligibilityRules;
use replydesk_core::embedding::EmbeddingProvider;
use replydesk_core::index::RetrievalIndex;
use replydesk_core::models::{FetchOutcome, InboundMessage, ReplyDraft, TemplateRecord};

use crate::config::ReplyConfig;
use crate::mailbox::{Mailbox, MailboxError};

/// Waits between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    pub error_backoff: Duration,
    pub empty_inbox: Duration,
    pub skip_pause: Duration,
    pub throttle: Duration,
    pub after_send: Duration,
}

impl SessionTimings {
    /// No waits at all; for tests and dry runs.
    pub fn zero() -> Self {
        Self {
            error_backoff: Duration::ZERO,
            empty_inbox: Duration::ZERO,
            skip_pause: Duration::ZERO,
            throttle: Duration::ZERO,
            after_send: Duration::ZERO,
        }
    }
}

/// Everything a session needs, passed in explicitly.
#[derive(Clone)]
pub struct SessionContext {
    pub mailbox: Arc<dyn Mailbox>,
    /// `None` when no index has been built; replies then get empty context.
    pub index: Option<Arc<RetrievalIndex>>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub composer: ReplyComposer,
    pub rules: Arc<EligibilityRules>,
    pub reply: ReplyConfig,
    pub top_k: usize,
    pub timings: SessionTimings,
}

impl SessionContext {
    /// Top-k templates for `text`. Any retrieval failure yields no context.
    pub async fn retrieve(&self, text: &str) -> Vec<TemplateRecord> {
        let Some(index) = &self.index else {
            warn!("retrieval index unavailable; composing without context");
            return Vec::new();
        };
        match index.query(self.embedder.as_ref(), text, self.top_k).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "retrieval failed; composing without context");
                Vec::new()
            }
        }
    }

    /// Retrieve and compose a reply draft for `message`.
    ///
    /// Returns `Err(reason)` when generation failed and sending the
    /// placeholder is not enabled.
    pub async fn draft_reply(&self, message: &InboundMessage) -> Result<ReplyDraft, String> {
        let context = self.retrieve(&message.body).await;
        debug!(templates = context.len(), "retrieved context");

        let body = match self.composer.compose(&message.body, &context).await {
            GenerationResult::Generated(body) => body,
            GenerationResult::Failed { reason } if self.reply.send_on_generation_failure => {
                warn!(%reason, "generation failed; sending placeholder reply");
                SENTINEL_REPLY.to_string()
            }
            GenerationResult::Failed { reason } => return Err(reason),
        };

        Ok(ReplyDraft {
            to: message.sender.clone(),
            subject: self.reply.reply_subject(&message.subject),
            body,
        })
    }
}

/// Where the session is between steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Polling,
    /// A reply is composed and waiting out the throttle window.
    Throttling(ReplyDraft),
}

/// What a step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleEvent {
    TransportError(String),
    Empty,
    Ineligible { sender: String, reason: String },
    ParseFailed(String),
    GenerationFailed { sender: String, reason: String },
    Drafted(ReplyDraft),
    Sent { to: String },
    SendFailed { to: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub event: CycleEvent,
    pub wait: Duration,
}

pub struct Session {
    ctx: SessionContext,
    phase: Phase,
}

impl Session {
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            ctx,
            phase: Phase::Polling,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Run one stage. Never fails: every error becomes an event.
    pub async fn advance(&mut self) -> Step {
        match std::mem::replace(&mut self.phase, Phase::Polling) {
            Phase::Polling => self.poll().await,
            Phase::Throttling(draft) => self.send(draft).await,
        }
    }

    async fn poll(&mut self) -> Step {
        let timings = self.ctx.timings;
        info!("checking inbox");

        let message = match self.ctx.mailbox.fetch_next_unread().await {
            Ok(FetchOutcome::Message(message)) => message,
            Ok(FetchOutcome::Empty) => {
                info!(wait = ?timings.empty_inbox, "inbox empty");
                return step(CycleEvent::Empty, timings.empty_inbox);
            }
            Ok(FetchOutcome::Ineligible { sender, reason }) => {
                info!(%sender, %reason, "skipped ineligible message");
                return step(CycleEvent::Ineligible { sender, reason }, timings.skip_pause);
            }
            Err(MailboxError::Parse(reason)) => {
                warn!(%reason, "skipped unparseable message");
                return step(CycleEvent::ParseFailed(reason), timings.skip_pause);
            }
            Err(e) => {
                warn!(error = %e, wait = ?timings.error_backoff, "fetch failed; backing off");
                return step(CycleEvent::TransportError(e.to_string()), timings.error_backoff);
            }
        };

        info!(sender = %message.sender, subject = %message.subject, "processing message");

        if let Err(rejection) = self.ctx.rules.check(
            &message.sender,
            &message.subject,
            message.auto_submitted.as_deref(),
        ) {
            info!(sender = %message.sender, reason = %rejection, "skipped ineligible message");
            return step(
                CycleEvent::Ineligible {
                    sender: message.sender,
                    reason: rejection.to_string(),
                },
                timings.skip_pause,
            );
        }

        match self.ctx.draft_reply(&message).await {
            Ok(draft) => {
                info!(
                    to = %draft.to,
                    wait = ?timings.throttle,
                    "reply ready; waiting before send\n--- generated reply ---\n{}\n-----------------------",
                    draft.body
                );
                self.phase = Phase::Throttling(draft.clone());
                step(CycleEvent::Drafted(draft), timings.throttle)
            }
            Err(reason) => {
                error!(sender = %message.sender, %reason, "generation failed; not replying");
                step(
                    CycleEvent::GenerationFailed {
                        sender: message.sender,
                        reason,
                    },
                    timings.skip_pause,
                )
            }
        }
    }

    async fn send(&mut self, draft: ReplyDraft) -> Step {
        let wait = self.ctx.timings.after_send;
        info!(to = %draft.to, subject = %draft.subject, "sending reply");
        match self.ctx.mailbox.send(&draft).await {
            Ok(()) => {
                info!(to = %draft.to, "reply sent");
                step(CycleEvent::Sent { to: draft.to }, wait)
            }
            Err(e) => {
                error!(to = %draft.to, error = %e, "send failed; not retrying");
                step(
                    CycleEvent::SendFailed {
                        to: draft.to,
                        reason: e.to_string(),
                    },
                    wait,
                )
            }
        }
    }
}

fn step(event: CycleEvent, wait: Duration) -> Step {
    Step { event, wait }
}

/// Drive `session` until `shutdown` resolves, or until `max_cycles` full
/// cycles (a poll plus its send, if any) have completed.
///
/// Stages always run to completion; only the waits between them are
/// interrupted. A shutdown during the throttle window drops the pending
/// reply unsent. Returns the number of completed cycles.
pub async fn run_until<F>(session: &mut Session, shutdown: F, max_cycles: Option<usize>) -> usize
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut cycles = 0usize;

    loop {
        let step = session.advance().await;

        if *session.phase() == Phase::Polling {
            cycles += 1;
            if max_cycles.is_some_and(|max| cycles >= max) {
                return cycles;
            }
        }

        tokio::select! {
            biased;
            _ = &mut shutdown => {
                if let Phase::Throttling(draft) = session.phase() {
                    warn!(to = %draft.to, "shutdown during throttle window; reply not sent");
                }
                info!(cycles, "session stopped");
                return cycles;
            }
            _ = tokio::time::sleep(step.wait) => {}
        }
    }
}
