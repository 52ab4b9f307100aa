//! Recognized-option table shared by every menu
//!
//! The action menu and the document menus are configuration: adding a
//! document type or rewording an option never touches the dialogue engine.

use serde::{Deserialize, Serialize};

use super::DocumentType;
use crate::{Error, Result};

/// Something the user can ask for from the main menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuAction {
    /// Submit a new document
    Send,
    /// Retrieve a stored document
    Receive,
    /// List every stored document
    ListAll,
    /// End the conversation
    End,
}

/// One entry in the main menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOption {
    /// Action selected by this entry
    pub action: MenuAction,

    /// Menu label (e.g. "Send a Document")
    pub label: String,

    /// Numeric shortcut
    #[serde(default)]
    pub number: Option<u32>,

    /// Keywords recognized anywhere in the body, as whole words
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl ActionOption {
    fn new(action: MenuAction, label: &str, number: u32, keywords: &[&str]) -> Self {
        Self {
            action,
            label: label.to_string(),
            number: Some(number),
            keywords: keywords.iter().map(ToString::to_string).collect(),
        }
    }

    /// Keyword shown to the user in prompts
    #[must_use]
    pub fn primary_keyword(&self) -> String {
        self.keywords
            .first()
            .cloned()
            .unwrap_or_else(|| self.label.to_lowercase())
    }

    fn matches_keyword(&self, body: &str) -> bool {
        if self.keywords.is_empty() {
            return contains_phrase(body, &self.label);
        }
        self.keywords.iter().any(|k| contains_phrase(body, k))
    }
}

/// A configured document category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentKind {
    /// Stable identifier used in filenames
    pub id: String,

    /// Label shown in menus and stored on records
    pub label: String,

    /// Numeric shortcut in the document menu
    #[serde(default)]
    pub number: Option<u32>,

    /// Extra spellings accepted for this document
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl DocumentKind {
    fn new(id: &str, label: &str, number: u32, aliases: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            number: Some(number),
            aliases: aliases.iter().map(ToString::to_string).collect(),
        }
    }

    /// The document type this entry stands for
    #[must_use]
    pub fn doc_type(&self) -> DocumentType {
        DocumentType {
            id: self.id.clone(),
            label: self.label.clone(),
        }
    }

    fn spellings(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(self.label.to_lowercase())
            .chain(std::iter::once(self.id.replace('_', " ")))
            .chain(self.aliases.iter().map(|a| a.to_lowercase()))
    }
}

/// The full option table used by the dialogue engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuOptions {
    /// Main menu entries, in display and match order
    #[serde(default = "default_actions")]
    pub actions: Vec<ActionOption>,

    /// Document categories, in display and match order
    #[serde(default = "default_documents")]
    pub documents: Vec<DocumentKind>,
}

impl Default for MenuOptions {
    fn default() -> Self {
        Self {
            actions: default_actions(),
            documents: default_documents(),
        }
    }
}

fn default_actions() -> Vec<ActionOption> {
    vec![
        ActionOption::new(MenuAction::Send, "Send a Document", 1, &["send"]),
        ActionOption::new(MenuAction::Receive, "Receive a Document", 2, &["receive"]),
        ActionOption::new(MenuAction::ListAll, "List all Documents", 3, &["list", "show all"]),
        ActionOption::new(MenuAction::End, "End the chat", 4, &["end"]),
    ]
}

fn default_documents() -> Vec<DocumentKind> {
    vec![
        DocumentKind::new("aadhar", "Aadhar", 1, &["aadhaar"]),
        DocumentKind::new("pan", "PAN", 2, &["pan card"]),
        DocumentKind::new("driving_license", "Driving License", 3, &["dl", "license"]),
    ]
}

impl MenuOptions {
    /// Check the table is usable by the dialogue
    ///
    /// # Errors
    ///
    /// Returns error if a required action is missing, a document id is
    /// duplicated, or an id cannot be used in a filename
    pub fn validate(&self) -> Result<()> {
        for required in [MenuAction::Send, MenuAction::Receive, MenuAction::End] {
            if !self.supports(required) {
                return Err(Error::Config(format!("menu is missing the {required:?} action")));
            }
        }

        if self.documents.is_empty() {
            return Err(Error::Config("menu has no document types".to_string()));
        }

        for (i, kind) in self.documents.iter().enumerate() {
            if kind.id.is_empty()
                || !kind
                    .id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(Error::Config(format!("invalid document id: {:?}", kind.id)));
            }
            if self.documents[..i].iter().any(|k| k.id == kind.id) {
                return Err(Error::Config(format!("duplicate document id: {}", kind.id)));
            }
        }

        Ok(())
    }

    /// Whether the main menu offers this action
    #[must_use]
    pub fn supports(&self, action: MenuAction) -> bool {
        self.actions.iter().any(|o| o.action == action)
    }

    /// Look up the menu entry for an action
    #[must_use]
    pub fn action(&self, action: MenuAction) -> Option<&ActionOption> {
        self.actions.iter().find(|o| o.action == action)
    }

    /// Match a normalized body against the main menu
    ///
    /// A body that is exactly an option's number selects it; otherwise the
    /// first option with a keyword present as whole words wins.
    #[must_use]
    pub fn match_action(&self, body: &str) -> Option<MenuAction> {
        if let Ok(n) = body.parse::<u32>() {
            return self
                .actions
                .iter()
                .find(|o| o.number == Some(n))
                .map(|o| o.action);
        }

        self.actions
            .iter()
            .find(|o| o.matches_keyword(body))
            .map(|o| o.action)
    }

    /// Whether the body asks to end the chat, by keyword only
    ///
    /// Numbers are not accepted here since outside the main menu they select
    /// document types.
    #[must_use]
    pub fn is_end(&self, body: &str) -> bool {
        self.action(MenuAction::End)
            .is_some_and(|o| o.matches_keyword(body))
    }

    /// Keyword used to end the chat, for prompts
    #[must_use]
    pub fn end_keyword(&self) -> String {
        self.action(MenuAction::End)
            .map_or_else(|| "end".to_string(), ActionOption::primary_keyword)
    }

    /// Match a normalized body against the document menu
    ///
    /// Exact matches (number, label, id, alias) are tried across the whole
    /// table before falling back to whole-word containment.
    #[must_use]
    pub fn match_document(&self, body: &str) -> Option<DocumentType> {
        if body.is_empty() {
            return None;
        }

        if let Ok(n) = body.parse::<u32>() {
            return self
                .documents
                .iter()
                .find(|k| k.number == Some(n))
                .map(DocumentKind::doc_type);
        }

        self.documents
            .iter()
            .find(|k| k.spellings().any(|s| s == body))
            .or_else(|| {
                self.documents
                    .iter()
                    .find(|k| k.spellings().any(|s| contains_phrase(body, &s)))
            })
            .map(DocumentKind::doc_type)
    }

    /// Resolve a stored type label or id back to a configured document type
    #[must_use]
    pub fn find_document(&self, label_or_id: &str) -> Option<DocumentType> {
        self.documents
            .iter()
            .find(|k| k.id == label_or_id || k.label.eq_ignore_ascii_case(label_or_id))
            .map(DocumentKind::doc_type)
    }
}

/// Whether `phrase` occurs in `body` as a run of whole words
fn contains_phrase(body: &str, phrase: &str) -> bool {
    let words: Vec<&str> = split_words(body).collect();
    let lowered = phrase.to_lowercase();
    let needle: Vec<&str> = split_words(&lowered).collect();

    if needle.is_empty() || needle.len() > words.len() {
        return false;
    }

    words.windows(needle.len()).any(|w| w == needle.as_slice())
}

fn split_words(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
}
