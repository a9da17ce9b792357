// Conversation Models - transcript, wire turns and prompt modes for onboarding chat

use serde::{Deserialize, Serialize};

// ============================================================================
// Message Role Enum
// ============================================================================

/// Enum for transcript roles with compile-time validation.
/// Serializes/deserializes as lowercase strings to match the LLM wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    /// Convert to lowercase string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    /// Label used when a transcript is rendered as plain text
    pub fn label(&self) -> &'static str {
        match self {
            MessageRole::System => "System",
            MessageRole::User => "User",
            MessageRole::Assistant => "Assistant",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            _ => Err(format!(
                "Invalid message role: '{}'. Expected 'system', 'user', or 'assistant'",
                s
            )),
        }
    }
}

/// Who authored a displayed message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// A message as shown in the chat view. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub sender: Sender,
    pub text: String,
}

/// One role-tagged turn in the LLM wire format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: MessageRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

// ============================================================================
// Prompt Modes
// ============================================================================

/// Persona used to seed an onboarding conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    #[default]
    Standard,
    Playful,
    Deep,
}

impl PromptMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptMode::Standard => "standard",
            PromptMode::Playful => "playful",
            PromptMode::Deep => "deep",
        }
    }
}

impl std::fmt::Display for PromptMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PromptMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" | "default" => Ok(PromptMode::Standard),
            "playful" => Ok(PromptMode::Playful),
            "deep" => Ok(PromptMode::Deep),
            _ => Err(format!(
                "Invalid prompt mode: '{}'. Expected 'standard', 'playful', or 'deep'",
                s
            )),
        }
    }
}

/// How the user is talking to the onboarding assistant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputChannel {
    #[default]
    Text,
    Sms,
}

// ============================================================================
// Conversation
// ============================================================================

/// Append-only transcript driving one onboarding session.
///
/// `user_answers` always has one entry per user turn; its length is the turn
/// counter used for capping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub turns: Vec<ConversationTurn>,
    pub user_answers: Vec<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Create a conversation seeded with a single system turn
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![ConversationTurn::system(system_prompt)],
            user_answers: Vec::new(),
            messages: Vec::new(),
        }
    }

    fn next_message_id(&self) -> u64 {
        self.messages.last().map(|m| m.id + 1).unwrap_or(1)
    }

    /// Append a user utterance to the turns, answers and display messages
    pub fn push_user(&mut self, text: &str) {
        let id = self.next_message_id();
        self.turns.push(ConversationTurn::user(text));
        self.user_answers.push(text.to_string());
        self.messages.push(Message {
            id,
            sender: Sender::User,
            text: text.to_string(),
        });
    }

    /// Append an assistant reply to the turns and display messages
    pub fn push_assistant(&mut self, text: &str) {
        let id = self.next_message_id();
        self.turns.push(ConversationTurn::assistant(text));
        self.messages.push(Message {
            id,
            sender: Sender::Assistant,
            text: text.to_string(),
        });
    }

    /// Number of user answers so far
    pub fn answer_count(&self) -> usize {
        self.user_answers.len()
    }

    /// The system prompt that seeded this conversation, if any
    pub fn system_prompt(&self) -> Option<&str> {
        self.turns
            .iter()
            .find(|t| t.role == MessageRole::System)
            .map(|t| t.content.as_str())
    }

    /// Turns without the system persona
    pub fn dialogue(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter().filter(|t| t.role != MessageRole::System)
    }

    /// Render the dialogue as a role-labelled plain-text block
    pub fn render_transcript(&self) -> String {
        self.dialogue()
            .map(|t| format!("{}: {}", t.role.label(), t.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.dialogue().next().is_none()
    }
}
