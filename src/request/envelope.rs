//! Prompt inputs and the normalized message list sent to the provider.

use serde::{Deserialize, Serialize};

/// Speaker tag used by prompt templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PromptRole {
    Human,
    Bot,
    System,
}

/// One role-tagged turn of a templated prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: PromptRole,
    pub prompt: String,
}

impl Turn {
    pub fn new(role: PromptRole, prompt: impl Into<String>) -> Self {
        Self {
            role,
            prompt: prompt.into(),
        }
    }
}

/// A single dispatcher input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prompt {
    /// Plain text, sent as one user message.
    Text(String),
    /// Ordered role-tagged turns.
    Turns(Vec<Turn>),
}

impl Prompt {
    /// Text used for token estimation: the string itself, or the turn
    /// contents joined by newlines.
    pub fn flat_text(&self) -> String {
        match self {
            Prompt::Text(text) => text.clone(),
            Prompt::Turns(turns) => turns
                .iter()
                .map(|t| t.prompt.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Prompt::Text(text.to_string())
    }
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Prompt::Text(text)
    }
}

impl From<Vec<Turn>> for Prompt {
    fn from(turns: Vec<Turn>) -> Self {
        Prompt::Turns(turns)
    }
}

/// Provider-side message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl From<PromptRole> for Role {
    fn from(role: PromptRole) -> Self {
        match role {
            PromptRole::Human => Role::User,
            PromptRole::Bot => Role::Assistant,
            PromptRole::System => Role::System,
        }
    }
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Normalized message list for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Envelope {
    messages: Vec<Message>,
}

impl Envelope {
    /// Wrap plain text as a single user turn.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            messages: vec![Message {
                role: Role::User,
                content: text.into(),
            }],
        }
    }

    /// Map template turns onto provider roles, keeping their order.
    pub fn from_turns(turns: &[Turn]) -> Self {
        Self {
            messages: turns
                .iter()
                .map(|t| Message {
                    role: t.role.into(),
                    content: t.prompt.clone(),
                })
                .collect(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Message contents joined by newlines, for completion-style endpoints.
    pub fn joined_content(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<&Prompt> for Envelope {
    fn from(prompt: &Prompt) -> Self {
        match prompt {
            Prompt::Text(text) => Envelope::from_text(text.clone()),
            Prompt::Turns(turns) => Envelope::from_turns(turns),
        }
    }
}
