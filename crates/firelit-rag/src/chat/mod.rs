pub mod engine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::{ChatMessage, ChatRole};

pub use engine::{ChatEngine, EngineSettings};

// ============================================================================
// Prompts
// ============================================================================

pub const SYSTEM_PROMPT: &str = "You are an expert of a market analysis in restaurant field. \
You'll be able to communicate accurate, informed analysis in an easy-to-understand manner \
to people who want to start a business in the catering sector. \
You must be straightforward and responsive to customers, and avoid using ambiguous language. \
Answers should include appropriate comparision with other district.";

pub const GREETING: &str = "어떻게 도와드릴까요? 창업을 고려 중인 지역(행정동)을 먼저 알려주세요.";

pub const LOCATION_ACK: &str = "지역을 확인했습니다. 창업하려는 업종(예: 한식, 카페)을 알려주세요.";

pub const CONTINUATION_NOTICE: &str =
    "응답이 너무 길어 중간에 끊겼습니다. '계속'이라고 입력하시면 이어서 답변드립니다.";

/// Append the continuation instruction to a reply cut at the token ceiling.
pub fn with_continuation_notice(partial: &str) -> String {
    if partial.trim().is_empty() {
        CONTINUATION_NOTICE.to_string()
    } else {
        format!("{}\n\n({})", partial.trim_end(), CONTINUATION_NOTICE)
    }
}

// ============================================================================
// Session state
// ============================================================================

/// Where a session is in the information-gathering flow. Each phase carries
/// exactly the data captured so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    AwaitingLocation,
    AwaitingIndustry { location: String },
    FreeChat { location: String, industry: String },
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::AwaitingLocation => "awaiting_location",
            Phase::AwaitingIndustry { .. } => "awaiting_industry",
            Phase::FreeChat { .. } => "free_chat",
        }
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            Phase::AwaitingLocation => None,
            Phase::AwaitingIndustry { location } | Phase::FreeChat { location, .. } => {
                Some(location.as_str())
            }
        }
    }

    pub fn industry(&self) -> Option<&str> {
        match self {
            Phase::FreeChat { industry, .. } => Some(industry.as_str()),
            _ => None,
        }
    }
}

/// One user's conversation. History is append-only; index 0 is the system prompt.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    history: Vec<ChatMessage>,
    phase: Phase,
    last_active: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            history: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::assistant(GREETING)],
            phase: Phase::AwaitingLocation,
            last_active: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    pub fn system_message(&self) -> &ChatMessage {
        &self.history[0]
    }

    /// The trailing user message of a turn that did not get a reply.
    pub fn pending_user_message(&self) -> Option<&str> {
        self.history
            .last()
            .filter(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
    }

    fn push(&mut self, message: ChatMessage) {
        self.history.push(message);
        self.last_active = Utc::now();
    }

    fn set_phase(&mut self, phase: Phase) {
        tracing::debug!(session = %self.id, from = self.phase.name(), to = phase.name(), "Phase transition");
        self.phase = phase;
    }
}
