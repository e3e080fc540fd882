//! Conversation turns and the expected-follow-up tag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// A label attached to an assistant turn that conditions classification of
/// the next user turn. A short affirmative reply ("yes", "ok") resolves to
/// the tagged intent instead of whatever its surface form would classify as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpTag {
    #[default]
    None,
    BuildInstructions,
    CodeGeneration,
    WebSearch,
    Finance,
}

impl FollowUpTag {
    /// The intent a follow-up affirmative resolves to.
    pub fn intent(&self) -> Option<&'static str> {
        match self {
            FollowUpTag::None => None,
            FollowUpTag::BuildInstructions => Some("build_instructions"),
            FollowUpTag::CodeGeneration => Some("code_generation"),
            FollowUpTag::WebSearch => Some("web_search"),
            FollowUpTag::Finance => Some("finance"),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, FollowUpTag::None)
    }
}

/// One conversation turn in a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    /// Intent the router recorded for this turn (user turns only).
    #[serde(default)]
    pub intent: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub expected_follow_up: FollowUpTag,
}

impl Turn {
    pub fn user(text: impl Into<String>, intent: Option<String>) -> Turn {
        Turn {
            role: TurnRole::User,
            text: text.into(),
            intent,
            timestamp: Utc::now(),
            expected_follow_up: FollowUpTag::None,
        }
    }

    pub fn assistant(text: impl Into<String>, expected_follow_up: FollowUpTag) -> Turn {
        Turn {
            role: TurnRole::Assistant,
            text: text.into(),
            intent: None,
            timestamp: Utc::now(),
            expected_follow_up,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_tag_has_no_intent() {
        assert!(FollowUpTag::None.intent().is_none());
        assert!(FollowUpTag::None.is_none());
    }

    #[test]
    fn tags_resolve_to_intents() {
        assert_eq!(
            FollowUpTag::BuildInstructions.intent(),
            Some("build_instructions")
        );
        assert_eq!(FollowUpTag::CodeGeneration.intent(), Some("code_generation"));
    }

    #[test]
    fn turn_constructors_set_roles() {
        let u = Turn::user("hi", Some("utility".into()));
        assert_eq!(u.role, TurnRole::User);
        assert!(u.expected_follow_up.is_none());

        let a = Turn::assistant("want me to build it?", FollowUpTag::BuildInstructions);
        assert_eq!(a.role, TurnRole::Assistant);
        assert_eq!(a.expected_follow_up, FollowUpTag::BuildInstructions);
    }

    #[test]
    fn follow_up_tag_serializes_snake_case() {
        let json = serde_json::to_string(&FollowUpTag::BuildInstructions).unwrap();
        assert_eq!(json, "\"build_instructions\"");
    }
}
