//! Dialogue engine
//!
//! A pure decision function: given the user's current state and the
//! inbound message it returns the next state, the reply text and the side
//! effect the caller should run. It performs no I/O and never fails; every
//! `(state, message)` pair maps to a defined [`Decision`].

use super::{ConversationState, DocumentType, InboundMessage, MediaRef, MenuAction, MenuOptions, Reply};

/// Side effect requested by a decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Nothing to run beyond sending the reply
    None,
    /// Fetch and store the attached media
    Intake {
        doc_type: DocumentType,
        media: MediaRef,
    },
    /// Look up the sender's document of this type
    Query { doc_type: DocumentType },
    /// List all of the sender's documents
    ListAll,
    /// The user ended the chat
    EndChat,
}

/// Outcome of [`DialogueEngine::decide`]
///
/// For actions with an external outcome, `reply` is the text to send when
/// that outcome is the default one: intake succeeded, no document was found,
/// or the listing is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub next: ConversationState,
    pub reply: Reply,
    pub action: Action,
}

impl Decision {
    fn stay(state: &ConversationState, reply: Reply) -> Self {
        Self {
            next: state.clone(),
            reply,
            action: Action::None,
        }
    }

    fn to(next: ConversationState, reply: Reply) -> Self {
        Self {
            next,
            reply,
            action: Action::None,
        }
    }
}

/// Table-driven dialogue engine
#[derive(Debug, Clone, Default)]
pub struct DialogueEngine {
    options: MenuOptions,
}

impl DialogueEngine {
    /// Create an engine over an option table
    #[must_use]
    pub const fn new(options: MenuOptions) -> Self {
        Self { options }
    }

    /// The option table in use
    #[must_use]
    pub const fn options(&self) -> &MenuOptions {
        &self.options
    }

    /// Decide the transition for one inbound message
    #[must_use]
    pub fn decide(&self, state: &ConversationState, message: &InboundMessage) -> Decision {
        let body = message.body.as_str();

        match state {
            ConversationState::Greeting => {
                Decision::to(ConversationState::AwaitingAction, self.main_menu())
            }

            ConversationState::AwaitingAction => match self.options.match_action(body) {
                Some(MenuAction::Send) => Decision::to(
                    ConversationState::AwaitingSendDocType,
                    self.document_menu("Which document do you want to send?"),
                ),
                Some(MenuAction::Receive) => Decision::to(
                    ConversationState::AwaitingReceiveDocType,
                    self.document_menu("Which document do you want to receive?"),
                ),
                Some(MenuAction::ListAll) => Decision {
                    next: ConversationState::Greeting,
                    reply: Reply::text("You have no saved documents."),
                    action: Action::ListAll,
                },
                Some(MenuAction::End) => end_chat(),
                None => Decision::stay(state, self.choose_option()),
            },

            ConversationState::AwaitingSendDocType => {
                if let Some(doc_type) = self.options.match_document(body) {
                    let reply = Reply::text(format!("Please send the {doc_type} document now."));
                    Decision::to(ConversationState::AwaitingDocumentMedia { doc_type }, reply)
                } else if self.options.is_end(body) {
                    end_chat()
                } else {
                    Decision::stay(state, self.invalid_document())
                }
            }

            ConversationState::AwaitingReceiveDocType => {
                if let Some(doc_type) = self.options.match_document(body) {
                    Decision {
                        next: ConversationState::Greeting,
                        reply: not_found(&doc_type),
                        action: Action::Query { doc_type },
                    }
                } else if self.options.is_end(body) {
                    end_chat()
                } else {
                    Decision::stay(state, self.invalid_document())
                }
            }

            ConversationState::AwaitingDocumentMedia { doc_type } => {
                if let Some(media) = message.first_media() {
                    Decision {
                        next: ConversationState::Greeting,
                        reply: intake_saved(doc_type),
                        action: Action::Intake {
                            doc_type: doc_type.clone(),
                            media: media.clone(),
                        },
                    }
                } else if self.options.is_end(body) {
                    end_chat()
                } else {
                    Decision::stay(
                        state,
                        Reply::text(format!(
                            "Please send a document as media. To end the chat, reply with '{}'.",
                            self.options.end_keyword()
                        )),
                    )
                }
            }

            ConversationState::Processing { .. } => Decision::stay(state, still_processing()),

            ConversationState::Unrecognized { .. } => Decision::to(
                ConversationState::Greeting,
                Reply::text("An error occurred. Please start over."),
            ),
        }
    }

    fn main_menu(&self) -> Reply {
        let mut text = String::from("Hello! What would you like to do?\n");
        for option in &self.options.actions {
            text.push_str(&format!(
                "\n*{}:* Reply with '{}'",
                option.label,
                capitalize(&option.primary_keyword())
            ));
            if let Some(n) = option.number {
                text.push_str(&format!(" or {n}"));
            }
        }
        Reply::text(text)
    }

    fn choose_option(&self) -> Reply {
        let mut text = String::from("Please choose an option:");
        for option in &self.options.actions {
            match option.number {
                Some(n) => text.push_str(&format!("\n{n}. *{}*", option.label)),
                None => text.push_str(&format!("\n*{}*", option.label)),
            }
        }
        Reply::text(text)
    }

    fn document_menu(&self, heading: &str) -> Reply {
        Reply::text(format!("{heading}\n\n{}", self.document_list()))
    }

    fn invalid_document(&self) -> Reply {
        Reply::text(format!(
            "Invalid document type. Please choose again:\n{}",
            self.document_list()
        ))
    }

    fn document_list(&self) -> String {
        self.options
            .documents
            .iter()
            .map(|kind| match kind.number {
                Some(n) => format!("{n}. *{}*", kind.label),
                None => format!("*{}*", kind.label),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn end_chat() -> Decision {
    Decision {
        next: ConversationState::Greeting,
        reply: Reply::text("Chat ended. You can start over by sending any message."),
        action: Action::EndChat,
    }
}

/// Reply confirming a saved document
#[must_use]
pub fn intake_saved(doc_type: &DocumentType) -> Reply {
    Reply::text(format!("{doc_type} document received and saved."))
}

/// Reply when intake failed at any step
#[must_use]
pub fn intake_failed() -> Reply {
    Reply::text("Failed to process your document, please try again.")
}

/// Reply when no stored document matches
#[must_use]
pub fn not_found(doc_type: &DocumentType) -> Reply {
    Reply::text(format!("No {doc_type} document found."))
}

/// Reply carrying a stored document's link
#[must_use]
pub fn document_link(doc_type: &DocumentType, url: &str) -> Reply {
    Reply::text(format!("Here is your {doc_type} document: {url}"))
}

/// Reply listing stored documents as `(label, url)` pairs
#[must_use]
pub fn document_listing<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Reply {
    let lines: Vec<String> = entries
        .into_iter()
        .map(|(label, url)| format!("*{label}:* {url}"))
        .collect();

    if lines.is_empty() {
        return Reply::text("You have no saved documents.");
    }

    Reply::text(format!("Your saved documents:\n{}", lines.join("\n")))
}

/// Reply while a previous submission is still being stored
#[must_use]
pub fn still_processing() -> Reply {
    Reply::text("Your document is still being processed. Please wait a moment.")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> DialogueEngine {
        DialogueEngine::default()
    }

    fn msg(body: &str) -> InboundMessage {
        InboundMessage::new("SM1", "whatsapp:+15550001", body)
    }

    fn pan() -> DocumentType {
        DocumentType {
            id: "pan".to_string(),
            label: "PAN".to_string(),
        }
    }

    #[test]
    fn test_greeting_sends_menu() {
        let d = engine().decide(&ConversationState::Greeting, &msg("hi"));
        assert_eq!(d.next, ConversationState::AwaitingAction);
        assert_eq!(d.action, Action::None);
        let text = d.reply.to_string();
        assert!(text.contains("Send"));
        assert!(text.contains("Receive"));
        assert!(text.contains("End"));
    }

    #[test]
    fn test_send_lists_document_types() {
        let d = engine().decide(&ConversationState::AwaitingAction, &msg("Send"));
        assert_eq!(d.next, ConversationState::AwaitingSendDocType);
        assert!(d.reply.contains("Aadhar"));
        assert!(d.reply.contains("PAN"));
        assert!(d.reply.contains("Driving License"));
    }

    #[test]
    fn test_receive_by_number() {
        let d = engine().decide(&ConversationState::AwaitingAction, &msg("2"));
        assert_eq!(d.next, ConversationState::AwaitingReceiveDocType);
    }

    #[test]
    fn test_list_all_resets_to_greeting() {
        let d = engine().decide(&ConversationState::AwaitingAction, &msg("list"));
        assert_eq!(d.next, ConversationState::Greeting);
        assert_eq!(d.action, Action::ListAll);
    }

    #[test]
    fn test_list_all_unsupported_repeats_menu() {
        let mut options = MenuOptions::default();
        options.actions.retain(|o| o.action != MenuAction::ListAll);
        let d = DialogueEngine::new(options).decide(&ConversationState::AwaitingAction, &msg("list"));
        assert_eq!(d.next, ConversationState::AwaitingAction);
        assert_eq!(d.action, Action::None);
    }

    #[test]
    fn test_end_from_action_menu() {
        let d = engine().decide(&ConversationState::AwaitingAction, &msg("end"));
        assert_eq!(d.next, ConversationState::Greeting);
        assert_eq!(d.action, Action::EndChat);
    }

    #[test]
    fn test_unrecognized_action_repeats_menu() {
        let d = engine().decide(&ConversationState::AwaitingAction, &msg("what"));
        assert_eq!(d.next, ConversationState::AwaitingAction);
        assert!(d.reply.contains("Please choose an option"));
    }

    #[test]
    fn test_doc_type_selection_prompts_for_media() {
        let d = engine().decide(&ConversationState::AwaitingSendDocType, &msg("pan"));
        assert_eq!(d.next, ConversationState::AwaitingDocumentMedia { doc_type: pan() });
        assert!(d.reply.contains("Please send the PAN document now."));
    }

    #[test]
    fn test_invalid_doc_type_repeats() {
        let d = engine().decide(&ConversationState::AwaitingSendDocType, &msg("passport"));
        assert_eq!(d.next, ConversationState::AwaitingSendDocType);
        assert!(d.reply.contains("Invalid document type"));
    }

    #[test]
    fn test_end_from_doc_type_menus() {
        for state in [
            ConversationState::AwaitingSendDocType,
            ConversationState::AwaitingReceiveDocType,
            ConversationState::AwaitingDocumentMedia { doc_type: pan() },
        ] {
            let d = engine().decide(&state, &msg("end"));
            assert_eq!(d.next, ConversationState::Greeting);
            assert_eq!(d.action, Action::EndChat);
        }
    }

    #[test]
    fn test_receive_doc_type_queries() {
        let d = engine().decide(&ConversationState::AwaitingReceiveDocType, &msg("aadhar"));
        assert_eq!(d.next, ConversationState::Greeting);
        match d.action {
            Action::Query { doc_type } => assert_eq!(doc_type.id, "aadhar"),
            other => panic!("expected query, got {other:?}"),
        }
        assert_eq!(d.reply.to_string(), "No Aadhar document found.");
    }

    #[test]
    fn test_media_triggers_intake_with_first_item_only() {
        let message = msg("")
            .with_media("https://media/1", "image/jpeg")
            .with_media("https://media/2", "application/pdf");
        let state = ConversationState::AwaitingDocumentMedia { doc_type: pan() };
        let d = engine().decide(&state, &message);
        assert_eq!(d.next, ConversationState::Greeting);
        match d.action {
            Action::Intake { doc_type, media } => {
                assert_eq!(doc_type, pan());
                assert_eq!(media.url, "https://media/1");
            }
            other => panic!("expected intake, got {other:?}"),
        }
        assert!(d.reply.contains("PAN document received and saved."));
    }

    #[test]
    fn test_send_word_does_not_end_media_wait() {
        let state = ConversationState::AwaitingDocumentMedia { doc_type: pan() };
        let d = engine().decide(&state, &msg("send"));
        assert_eq!(d.next, state);
        assert!(d.reply.contains("Please send a document as media"));
    }

    #[test]
    fn test_processing_holds_state() {
        let state = ConversationState::Processing { doc_type: pan() };
        let d = engine().decide(&state, &msg("hello"));
        assert_eq!(d.next, state);
        assert_eq!(d.action, Action::None);
    }

    #[test]
    fn test_unrecognized_state_resets() {
        let state = ConversationState::Unrecognized {
            raw: "{\"state\":\"legacy\"}".to_string(),
        };
        let d = engine().decide(&state, &msg("hi"));
        assert_eq!(d.next, ConversationState::Greeting);
        assert!(d.reply.contains("An error occurred"));
    }

    #[test]
    fn test_decide_is_total() {
        let states = [
            ConversationState::Greeting,
            ConversationState::AwaitingAction,
            ConversationState::AwaitingSendDocType,
            ConversationState::AwaitingReceiveDocType,
            ConversationState::AwaitingDocumentMedia { doc_type: pan() },
            ConversationState::Processing { doc_type: pan() },
            ConversationState::Unrecognized { raw: String::new() },
        ];
        let inputs = ["", "   ", "1", "99", "send", "end", "pan", "🙂", "list", "receive aadhar"];

        for state in &states {
            for input in inputs {
                let d = engine().decide(state, &msg(input));
                assert!(!d.reply.to_string().is_empty(), "{state:?} / {input:?}");
            }
        }
    }

    #[test]
    fn test_document_listing() {
        let empty = document_listing(std::iter::empty());
        assert_eq!(empty.to_string(), "You have no saved documents.");

        let listing = document_listing([("PAN", "https://x/pan"), ("Aadhar", "https://x/a")]);
        assert!(listing.contains("*PAN:* https://x/pan"));
        assert!(listing.contains("*Aadhar:* https://x/a"));
    }
}
