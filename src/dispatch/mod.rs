//! Message dispatcher
//!
//! Drives one inbound message through the dialogue: read the sender's
//! state, decide, commit the transition with compare-and-set, run the
//! requested action and produce the reply. Intake I/O runs outside any lock
//! with the user parked in [`ConversationState::Processing`].

mod replay;

use std::sync::Arc;

use futures::StreamExt;

pub use replay::ReplyCache;

use crate::Result;
use crate::conversation::engine::{document_link, document_listing, intake_failed};
use crate::conversation::{
    Action, ConversationState, Decision, DialogueEngine, DocumentType, InboundMessage, MediaRef,
    Reply,
};
use crate::documents::DocumentQuery;
use crate::intake::IntakePipeline;
use crate::sessions::StateStore;

/// Re-reads allowed when another delivery changed the state first
const MAX_ATTEMPTS: usize = 3;

/// Reply when the state kept changing underneath us
pub const BUSY_REPLY: &str = "We're still handling your previous message. Please try again.";

enum Outcome {
    /// The stored state was no longer the one the decision was made from
    Stale,
    Done { reply: Reply, remember: bool },
}

/// Runs the dialogue for inbound messages
#[derive(Clone)]
pub struct Dispatcher {
    engine: DialogueEngine,
    states: Arc<dyn StateStore>,
    intake: IntakePipeline,
    documents: DocumentQuery,
    replies: ReplyCache,
}

impl Dispatcher {
    /// Create a dispatcher
    #[must_use]
    pub fn new(
        engine: DialogueEngine,
        states: Arc<dyn StateStore>,
        intake: IntakePipeline,
        documents: DocumentQuery,
    ) -> Self {
        Self {
            engine,
            states,
            intake,
            documents,
            replies: ReplyCache::default(),
        }
    }

    /// Use a specific replay cache
    #[must_use]
    pub fn with_reply_cache(mut self, replies: ReplyCache) -> Self {
        self.replies = replies;
        self
    }

    /// The state store in use
    #[must_use]
    pub fn states(&self) -> &Arc<dyn StateStore> {
        &self.states
    }

    /// Handle one inbound message and return the reply to send
    ///
    /// # Errors
    ///
    /// Returns error if the state store or the document query fails; intake
    /// failures are turned into a reply instead
    pub async fn handle(&self, message: &InboundMessage) -> Result<Reply> {
        if let Some(reply) = self.replies.get(&message.message_id) {
            tracing::debug!(message_id = %message.message_id, "replaying reply for re-delivered message");
            return Ok(reply);
        }

        for attempt in 1..=MAX_ATTEMPTS {
            let current = self.states.get(&message.sender).await?;
            let decision = self.engine.decide(&current, message);

            tracing::debug!(
                user = %message.sender,
                message_id = %message.message_id,
                from = current.name(),
                to = decision.next.name(),
                "dialogue transition"
            );

            match self.apply(message, &current, decision).await? {
                Outcome::Stale => {
                    tracing::debug!(user = %message.sender, attempt, "state changed concurrently, re-reading");
                }
                Outcome::Done { reply, remember } => {
                    if remember {
                        self.replies.insert(&message.message_id, reply.clone());
                    }
                    return Ok(reply);
                }
            }
        }

        tracing::warn!(user = %message.sender, "gave up after repeated concurrent state changes");
        Ok(Reply::text(BUSY_REPLY))
    }

    async fn apply(
        &self,
        message: &InboundMessage,
        current: &ConversationState,
        decision: Decision,
    ) -> Result<Outcome> {
        let Decision {
            next,
            reply,
            action,
        } = decision;

        if let Action::Intake { doc_type, media } = action {
            return self.run_intake(message, current, &next, reply, &doc_type, &media).await;
        }

        if !self
            .states
            .compare_and_set(&message.sender, current, &next)
            .await?
        {
            return Ok(Outcome::Stale);
        }

        let reply = match action {
            Action::Query { doc_type } => {
                match self.documents.find_one(&message.sender, &doc_type).await? {
                    Some(record) => document_link(&doc_type, &record.url),
                    None => reply,
                }
            }
            Action::ListAll => {
                let records: Vec<_> = self
                    .documents
                    .find_all(&message.sender)
                    .await?
                    .collect()
                    .await;
                if records.is_empty() {
                    reply
                } else {
                    document_listing(
                        records
                            .iter()
                            .map(|r| (r.doc_type.label.as_str(), r.url.as_str())),
                    )
                }
            }
            Action::EndChat => {
                tracing::info!(user = %message.sender, "chat ended");
                reply
            }
            Action::None | Action::Intake { .. } => reply,
        };

        // A duplicate that raced an in-flight intake must not pin its
        // "still processing" reply to the message id
        let remember = !matches!(current, ConversationState::Processing { .. });
        Ok(Outcome::Done { reply, remember })
    }

    async fn run_intake(
        &self,
        message: &InboundMessage,
        current: &ConversationState,
        next: &ConversationState,
        reply: Reply,
        doc_type: &DocumentType,
        media: &MediaRef,
    ) -> Result<Outcome> {
        let user = message.sender.as_str();
        let processing = ConversationState::Processing {
            doc_type: doc_type.clone(),
        };

        if !self.states.compare_and_set(user, current, &processing).await? {
            return Ok(Outcome::Stale);
        }

        match self.intake.ingest(user, doc_type, media).await {
            Ok(record) => {
                tracing::info!(user, doc_type = %doc_type.id, id = %record.id, "document received");
                // A duplicate must find the reply before it can see the settled state
                self.replies.insert(&message.message_id, reply.clone());
                self.settle(user, &processing, next).await;
                Ok(Outcome::Done {
                    reply,
                    remember: false,
                })
            }
            Err(e) => {
                tracing::error!(
                    user,
                    doc_type = %doc_type.id,
                    step = %e.step(),
                    orphan_blob = e.left_orphan_blob(),
                    error = %e,
                    "document intake failed"
                );
                self.settle(user, &processing, current).await;
                Ok(Outcome::Done {
                    reply: intake_failed(),
                    remember: false,
                })
            }
        }
    }

    /// Leave the processing state; the reply is already decided
    async fn settle(&self, user: &str, processing: &ConversationState, to: &ConversationState) {
        match self.states.compare_and_set(user, processing, to).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(user, to = to.name(), "processing state was replaced during intake");
            }
            Err(e) => {
                tracing::error!(user, to = to.name(), error = %e, "failed to leave processing state");
            }
        }
    }
}
