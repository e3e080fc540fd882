//! Pattern sets for the identity and affirmative guards.

use regex::RegexSet;

/// Patterns matching questions about the assistant's own nature,
/// capabilities, or self-modification. These short-circuit classification
/// so self-referential queries never hit web search.
pub fn identity_patterns() -> RegexSet {
    RegexSet::new([
        r"(?i)\bwhat can you do\b",
        r"(?i)\bwho (are|made|built|created) you\b",
        r"(?i)\bwhat are you\b",
        r"(?i)\byour (name|capabilities|abilities|purpose|limitations)\b",
        r"(?i)\bare you (an? )?(ai|bot|robot|assistant|human|person)\b",
        r"(?i)\b(tell me )?about yourself\b",
        r"(?i)\bintroduce yourself\b",
        r"(?i)\bcan you (modify|rewrite|change|improve|update) (yourself|your( own)? code)\b",
        r"(?i)\bhow (do|were) you (work|made|built|trained)\b",
        r"(?i)\bwhat (is|'s) your (model|version)\b",
    ])
    .expect("identity patterns are statically valid")
}

/// Maximum token count for a reply to count as a short affirmative/negative.
const SHORT_REPLY_MAX_TOKENS: usize = 4;

const AFFIRMATIVES: &[&str] = &[
    "yes",
    "yes please",
    "yep",
    "yeah",
    "ya",
    "y",
    "ok",
    "okay",
    "sure",
    "sure thing",
    "go ahead",
    "do it",
    "please do",
    "please",
    "absolutely",
    "definitely",
    "sounds good",
    "why not",
];

const NEGATIVES: &[&str] = &[
    "no",
    "nope",
    "nah",
    "n",
    "no thanks",
    "no thank you",
    "not now",
    "dont",
    "do not",
    "cancel",
    "stop",
    "never mind",
    "nevermind",
];

/// Lowercase, strip punctuation, collapse whitespace.
fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_short(normalized: &str) -> bool {
    !normalized.is_empty() && normalized.split_whitespace().count() <= SHORT_REPLY_MAX_TOKENS
}

/// Whether the text is a short affirmative reply.
pub fn is_affirmative(text: &str) -> bool {
    let n = normalize(text);
    is_short(&n) && AFFIRMATIVES.contains(&n.as_str())
}

/// Whether the text is a short negative reply.
pub fn is_negative(text: &str) -> bool {
    let n = normalize(text);
    is_short(&n) && NEGATIVES.contains(&n.as_str())
}
