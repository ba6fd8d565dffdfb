use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use ai_client::{truncate_chars, AiError, Claude};
use outreach_common::config::GeneratorConfig;
use outreach_common::{ActionType, Candidate};

use crate::traits::ContentGenerator;

/// Reply the model gives when a post is not worth engaging with.
const SKIP_SENTINEL: &str = "SKIP";

const COMMENT_RULES: &str = "\
RULES:
- 2-4 sentences
- Professional, never corporate
- Add something real; no generic praise
- Do not open with \"Great post!\" or \"Love this!\"
- At most one emoji
- No hashtags
- No self-promotion
- Write like a thoughtful peer";

/// Instructions for each comment strategy. Unknown names use `insight`.
fn strategy_instructions(strategy: &str) -> &'static str {
    match strategy {
        "question" => {
            "Ask one thoughtful follow-up question that shows you understood the post and opens a deeper discussion."
        }
        "story" => {
            "Share a short personal experience (two sentences at most) that relates to the post. Be specific, not generic."
        }
        "agree_expand" => {
            "Agree with the core point, then add an angle or dimension the author did not cover."
        }
        _ => {
            "Add a concrete data point, a contrarian take, or a perspective the author missed. Be specific."
        }
    }
}

/// Content generator backed by Claude.
pub struct ClaudeGenerator {
    claude: Claude,
    config: GeneratorConfig,
}

impl ClaudeGenerator {
    pub fn new(claude: Claude, config: GeneratorConfig) -> Self {
        Self { claude, config }
    }

    pub fn comment_prompt(&self, candidate: &Candidate, strategy: &str) -> String {
        let text = truncate_chars(&candidate.text, self.config.candidate_text_max_chars);
        format!(
            "You are commenting on a LinkedIn post. Write a professional but authentic comment.\n\n\
             POST AUTHOR: {author}\n\
             AUTHOR TITLE: {title}\n\
             POST: {text}\n\n\
             STRATEGY: {strategy}\n\
             INSTRUCTIONS: {instructions}\n\n\
             {COMMENT_RULES}\n\n\
             OUTPUT: only the comment text. If the post is not worth commenting on, reply with {SKIP_SENTINEL}.",
            author = candidate.author,
            title = candidate.author_title,
            instructions = strategy_instructions(strategy),
        )
    }

    pub fn connection_prompt(&self, candidate: &Candidate) -> String {
        format!(
            "Write a short LinkedIn connection request note (at most {max} characters).\n\n\
             TO: {name}, {title}\n\n\
             RULES:\n\
             - Genuine and specific to their role\n\
             - Mention a shared interest or why you want to connect\n\
             - Never \"I'd like to add you to my network\"\n\
             - Under {max} characters\n\
             - Professional but warm\n\n\
             OUTPUT: only the note text.",
            max = self.config.connection_note_max_chars,
            name = candidate.author,
            title = candidate.author_title,
        )
    }

    /// Raw completion text. A reply with no text block counts as empty.
    async fn ask(&self, prompt: String, max_tokens: u32) -> Result<String> {
        match self.claude.complete(None, prompt, max_tokens).await {
            Ok(text) => Ok(text),
            Err(AiError::EmptyResponse) => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// `None` for an empty reply or the skip sentinel.
    pub fn parse_comment(raw: &str) -> Option<String> {
        let text = raw.trim();
        let bare = text.trim_end_matches('.').trim_matches('"');
        if text.is_empty() || bare.eq_ignore_ascii_case(SKIP_SENTINEL) {
            return None;
        }
        Some(text.to_string())
    }

    /// Trimmed note capped at the configured length; `None` when empty.
    pub fn parse_note(&self, raw: &str) -> Option<String> {
        let note = truncate_chars(raw.trim(), self.config.connection_note_max_chars).trim_end();
        (!note.is_empty()).then(|| note.to_string())
    }
}

#[async_trait]
impl ContentGenerator for ClaudeGenerator {
    async fn generate(
        &self,
        action: ActionType,
        candidate: &Candidate,
        strategy: Option<&str>,
    ) -> Result<Option<String>> {
        match action {
            ActionType::Comment => {
                let strategy = strategy.unwrap_or("insight");
                let prompt = self.comment_prompt(candidate, strategy);
                let raw = self.ask(prompt, self.config.comment_max_tokens).await?;
                let comment = Self::parse_comment(&raw);
                if comment.is_none() {
                    debug!(candidate_id = %candidate.id, strategy, "Model declined to comment");
                }
                Ok(comment)
            }
            ActionType::Connection => {
                let prompt = self.connection_prompt(candidate);
                let raw = self.ask(prompt, self.config.connection_max_tokens).await?;
                Ok(self.parse_note(&raw))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::candidate;

    fn generator() -> ClaudeGenerator {
        ClaudeGenerator::new(
            Claude::new("sk-ant-test", "claude-sonnet-4-20250514"),
            GeneratorConfig::default(),
        )
    }

    #[test]
    fn skip_sentinel_and_empty_mean_skip() {
        assert_eq!(ClaudeGenerator::parse_comment("SKIP"), None);
        assert_eq!(ClaudeGenerator::parse_comment("  skip. "), None);
        assert_eq!(ClaudeGenerator::parse_comment("\"SKIP\""), None);
        assert_eq!(ClaudeGenerator::parse_comment("   "), None);
        assert_eq!(
            ClaudeGenerator::parse_comment(" Skipping standups cut our cycle time. "),
            Some("Skipping standups cut our cycle time.".into())
        );
    }

    #[test]
    fn comment_prompt_carries_strategy_and_truncated_text() {
        let g = generator();
        let mut c = candidate("p1", 20);
        c.text = "x".repeat(1500);
        let prompt = g.comment_prompt(&c, "question");
        assert!(prompt.contains("STRATEGY: question"));
        assert!(prompt.contains("follow-up question"));
        assert!(prompt.contains(&"x".repeat(1000)));
        assert!(!prompt.contains(&"x".repeat(1001)));
    }

    #[test]
    fn unknown_strategy_uses_insight_instructions() {
        assert_eq!(
            strategy_instructions("meme"),
            strategy_instructions("insight")
        );
    }

    #[test]
    fn note_is_capped_on_char_boundary() {
        let g = generator();
        let note = g.parse_note(&"é".repeat(300)).unwrap();
        assert_eq!(note.chars().count(), 200);
        assert_eq!(g.parse_note("  \n "), None);
    }

    #[test]
    fn connection_prompt_addresses_person() {
        let g = generator();
        let mut c = candidate("in-1", 0);
        c.author = "Dana Reyes".into();
        c.author_title = "Head of Product".into();
        let prompt = g.connection_prompt(&c);
        assert!(prompt.contains("TO: Dana Reyes, Head of Product"));
        assert!(prompt.contains("at most 200 characters"));
    }
}
