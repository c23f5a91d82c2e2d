//! Packs a session shard into a bounded prompt preamble.

use super::shard::{SessionShard, MAX_RECENT_QA};

/// Roughly 300 tokens.
pub const DEFAULT_CONTEXT_BUDGET_CHARS: usize = 1200;

/// Renders session memory for prompt injection, highest priority first:
/// user intent, then facts, then the latest Q&A pairs. Output is cut at the
/// character budget; whatever does not fit is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextPacker {
    budget_chars: usize,
}

impl Default for ContextPacker {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_BUDGET_CHARS)
    }
}

impl ContextPacker {
    pub fn new(budget_chars: usize) -> Self {
        Self { budget_chars }
    }

    pub fn budget_chars(&self) -> usize {
        self.budget_chars
    }

    fn sections(shard: &SessionShard) -> Vec<String> {
        let mut sections = Vec::new();
        if let Some(intent) = shard.user_intent.as_deref().map(str::trim) {
            if !intent.is_empty() {
                sections.push(format!("User intent: {intent}"));
            }
        }
        if !shard.facts.is_empty() {
            let facts: Vec<&str> = shard.facts.iter().map(String::as_str).collect();
            sections.push(format!("Known facts: {}", facts.join("; ")));
        }
        let skip = shard.recent_qa.len().saturating_sub(MAX_RECENT_QA);
        for qa in shard.recent_qa.iter().skip(skip) {
            sections.push(format!("Q: {}\nA: {}", qa.question, qa.answer));
        }
        sections
    }

    /// Empty when there is no shard, nothing to say, or no budget.
    pub fn pack(&self, shard: Option<&SessionShard>) -> String {
        let Some(shard) = shard else {
            return String::new();
        };
        if self.budget_chars == 0 {
            return String::new();
        }

        let mut out = String::new();
        let mut used = 0usize;
        for section in Self::sections(shard) {
            let sep = usize::from(!out.is_empty());
            let len = section.chars().count();
            if used + sep + len <= self.budget_chars {
                if sep == 1 {
                    out.push('\n');
                }
                out.push_str(&section);
                used += sep + len;
                continue;
            }
            // Partial section fills the remaining budget, then stop.
            let room = self.budget_chars.saturating_sub(used + sep);
            if room > 0 {
                if sep == 1 {
                    out.push('\n');
                }
                out.extend(section.chars().take(room));
            }
            break;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionPatch;

    fn shard() -> SessionShard {
        let mut shard = SessionShard::empty("s");
        shard.apply(
            SessionPatch::new()
                .with_intent("find platform 4")
                .with_fact("station is crowded")
                .with_fact("stairs ahead"),
        );
        shard.apply(SessionPatch::new().with_qa("Which way?", "Turn left."));
        shard.apply(SessionPatch::new().with_qa("How far?", "About ten metres."));
        shard
    }

    #[test]
    fn renders_in_priority_order() {
        let text = ContextPacker::default().pack(Some(&shard()));
        assert_eq!(
            text,
            "User intent: find platform 4\n\
             Known facts: station is crowded; stairs ahead\n\
             Q: Which way?\nA: Turn left.\n\
             Q: How far?\nA: About ten metres."
        );
    }

    #[test]
    fn truncates_to_budget() {
        for budget in [1, 10, 29, 30, 31, 45, 80] {
            let text = ContextPacker::new(budget).pack(Some(&shard()));
            assert!(text.chars().count() <= budget, "budget {budget}: {text:?}");
            assert!(text.starts_with(&"User intent: find platform 4"[..budget.min(28)]));
        }
    }

    #[test]
    fn lower_priority_sections_are_dropped_first() {
        let text = ContextPacker::new(40).pack(Some(&shard()));
        assert!(text.starts_with("User intent: find platform 4\n"));
        assert!(!text.contains("Q:"));
    }

    #[test]
    fn budget_counts_characters_not_bytes() {
        let mut shard = SessionShard::empty("s");
        shard.apply(SessionPatch::new().with_intent("ابحث عن المخرج"));
        let text = ContextPacker::new(15).pack(Some(&shard));
        assert_eq!(text.chars().count(), 15);
    }

    #[test]
    fn absent_shard_or_zero_budget_yields_empty() {
        assert_eq!(ContextPacker::default().pack(None), "");
        assert_eq!(ContextPacker::new(0).pack(Some(&shard())), "");
        assert_eq!(
            ContextPacker::default().pack(Some(&SessionShard::empty("s"))),
            ""
        );
    }
}
