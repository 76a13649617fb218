//! The provider-agnostic canonical model (C1): the shared vocabulary every
//! other module speaks. Nothing in this module knows about any one
//! provider's wire format.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// One piece of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text(String),
    Image {
        mime: String,
        source: ImageSource,
    },
    Thinking(ThinkingBlock),
    /// Synthetic part produced only by the Anthropic normalizer overlay,
    /// when several `Tool`-role messages for one turn are merged into a
    /// single `User`-role message of `tool_result` blocks (Anthropic has no
    /// dedicated tool role). Adapters for every other provider never see
    /// this variant.
    ToolResult {
        tool_call_id: String,
        text: String,
        is_error: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    Bytes(Vec<u8>),
    Url(String),
}

/// Extended-reasoning content an assistant message may carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingBlock {
    pub text: String,
    /// Opaque provider-issued signature that must be echoed back verbatim
    /// on the next turn (Anthropic extended thinking). `None` for providers
    /// that don't sign their thinking output.
    pub signature: Option<String>,
}

/// A tool invocation requested by the model.
///
/// `arguments` is `None` while the call is still streaming and its buffer
/// has not yet produced valid JSON. A call that reaches `BlockStop` without
/// ever producing valid JSON keeps `arguments: None` and is still surfaced
/// (invariant I5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Option<serde_json::Value>,
}

/// The result of executing a tool call, supplied back by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: Vec<ContentPart>,
    #[serde(default)]
    pub is_error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One turn of conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: SmallVec<[ContentPart; 1]>,
    /// Only ever non-empty on `Assistant` messages.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Only ever `Some` on `Tool` messages.
    #[serde(default)]
    pub tool_call_id: Option<String>,
    /// Only ever `Some` on `Assistant` messages.
    #[serde(default)]
    pub thinking: Option<ThinkingBlock>,
}

impl Message {
    #[must_use]
    pub fn text(id: impl Into<String>, role: Role, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: SmallVec::from_buf([ContentPart::Text(text.into())]),
            tool_calls: Vec::new(),
            tool_call_id: None,
            thinking: None,
        }
    }

    /// Concatenation of every `Text` part, ignoring images and thinking.
    #[must_use]
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for part in &self.content {
            if let ContentPart::Text(text) = part {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    #[must_use]
    pub fn is_empty_turn(&self) -> bool {
        self.content.is_empty() && self.tool_calls.is_empty()
    }
}

/// The OpenAI-family variant in play — these all share one wire shape and
/// differ only in base URL and (for Cerebras) tool-schema sanitization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenAiVariant {
    OpenAi,
    Groq,
    Cerebras,
    Fireworks,
}

/// Which provider wire format a message history / tool list is destined
/// for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderTag {
    OpenAiFamily(OpenAiVariant),
    Anthropic,
    Gemini,
    Ollama,
    Empty,
}

impl ProviderTag {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::OpenAiFamily(OpenAiVariant::OpenAi) => "openai",
            Self::OpenAiFamily(OpenAiVariant::Groq) => "groq",
            Self::OpenAiFamily(OpenAiVariant::Cerebras) => "cerebras",
            Self::OpenAiFamily(OpenAiVariant::Fireworks) => "fireworks",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
            Self::Empty => "empty",
        }
    }
}

/// A tool the model may call, described once and translated per provider by
/// [`crate::tools::convert_tools`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Generation parameters common across providers; adapters drop whichever
/// fields their wire format doesn't support.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub stop: Vec<String>,
    /// Request Anthropic extended thinking with this budget. Clamped to the
    /// requesting model's catalog maximum (`providers::anthropic::
    /// max_thinking_budget`); ignored by every other provider.
    #[serde(default)]
    pub thinking_budget_tokens: Option<u32>,
}

/// A single event surfaced from an in-flight `stream_chat` call.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Content(String),
    Thinking(String),
    ThinkingSignature(String),
    ToolCall(ToolCall),
    UsageHint {
        input_tokens: Option<u64>,
        output_tokens: Option<u64>,
    },
    End,
    Error(crate::error::ErrorKind, String),
}
