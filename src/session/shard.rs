//! Session shard data model and merge rules.

use crate::provider::Signals;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

/// Q&A pairs retained per session.
pub const MAX_RECENT_QA: usize = 3;
/// Distinct facts retained per session.
pub const MAX_FACTS: usize = 3;

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
    pub timestamp_ms: u64,
}

impl QaPair {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            timestamp_ms: now_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    Brief,
    Detailed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub language: Option<String>,
    pub verbosity: Option<Verbosity>,
}

/// Rolling memory of one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionShard {
    pub session_id: String,
    /// Time of the latest write, ms since the Unix epoch.
    pub captured_at_ms: u64,
    pub signals: Option<Signals>,
    pub user_intent: Option<String>,
    /// Oldest first.
    pub recent_qa: VecDeque<QaPair>,
    /// Distinct values, oldest first.
    pub facts: VecDeque<String>,
    pub preferences: Preferences,
}

impl SessionShard {
    pub(crate) fn empty(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            captured_at_ms: now_ms(),
            signals: None,
            user_intent: None,
            recent_qa: VecDeque::new(),
            facts: VecDeque::new(),
            preferences: Preferences::default(),
        }
    }

    /// Merge a partial update into the shard.
    pub fn apply(&mut self, patch: SessionPatch) {
        self.captured_at_ms = now_ms();
        if let Some(signals) = patch.signals {
            self.signals = Some(signals);
        }
        if let Some(intent) = patch.user_intent {
            self.user_intent = Some(intent);
        }
        if let Some(qa) = patch.qa {
            self.recent_qa.push_back(qa);
            while self.recent_qa.len() > MAX_RECENT_QA {
                self.recent_qa.pop_front();
            }
        }
        for fact in patch.facts {
            let fact = fact.trim().to_string();
            if fact.is_empty() {
                continue;
            }
            // A repeated fact moves to the most recent position.
            self.facts.retain(|f| f != &fact);
            self.facts.push_back(fact);
        }
        while self.facts.len() > MAX_FACTS {
            self.facts.pop_front();
        }
        if let Some(prefs) = patch.preferences {
            if prefs.language.is_some() {
                self.preferences.language = prefs.language;
            }
            if prefs.verbosity.is_some() {
                self.preferences.verbosity = prefs.verbosity;
            }
        }
    }
}

/// Partial update for [`SessionShard::apply`]. Absent fields leave the shard untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPatch {
    pub signals: Option<Signals>,
    pub user_intent: Option<String>,
    pub qa: Option<QaPair>,
    #[serde(default)]
    pub facts: Vec<String>,
    pub preferences: Option<Preferences>,
}

impl SessionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signals(mut self, signals: Signals) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.user_intent = Some(intent.into());
        self
    }

    pub fn with_qa(mut self, question: impl Into<String>, answer: impl Into<String>) -> Self {
        self.qa = Some(QaPair::new(question, answer));
        self
    }

    pub fn with_fact(mut self, fact: impl Into<String>) -> Self {
        self.facts.push(fact.into());
        self
    }

    pub fn with_preferences(mut self, preferences: Preferences) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_none()
            && self.user_intent.is_none()
            && self.qa.is_none()
            && self.facts.is_empty()
            && self.preferences.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_qa_keeps_last_three_in_order() {
        let mut shard = SessionShard::empty("s");
        for n in 1..=4 {
            shard.apply(SessionPatch::new().with_qa(format!("q{n}"), format!("a{n}")));
        }
        let questions: Vec<_> = shard.recent_qa.iter().map(|qa| qa.question.as_str()).collect();
        assert_eq!(questions, vec!["q2", "q3", "q4"]);
    }

    #[test]
    fn facts_keep_most_recent_three_distinct() {
        let mut shard = SessionShard::empty("s");
        for fact in ["door is red", "two steps down", "door is red", "bus 42 arriving", "wet floor"] {
            shard.apply(SessionPatch::new().with_fact(fact));
        }
        let facts: Vec<_> = shard.facts.iter().map(String::as_str).collect();
        assert_eq!(facts, vec!["door is red", "bus 42 arriving", "wet floor"]);
    }

    #[test]
    fn overwrite_fields_take_latest_value() {
        let mut shard = SessionShard::empty("s");
        shard.apply(SessionPatch::new().with_intent("find the exit"));
        shard.apply(SessionPatch::new().with_signals(Signals {
            has_text: true,
            ..Signals::default()
        }));
        assert_eq!(shard.user_intent.as_deref(), Some("find the exit"));
        shard.apply(SessionPatch::new().with_intent("read the menu"));
        assert_eq!(shard.user_intent.as_deref(), Some("read the menu"));
        assert!(shard.signals.as_ref().map(|s| s.has_text).unwrap_or(false));
    }

    #[test]
    fn preferences_merge_field_by_field() {
        let mut shard = SessionShard::empty("s");
        shard.apply(SessionPatch::new().with_preferences(Preferences {
            language: Some("ar".into()),
            verbosity: Some(Verbosity::Brief),
        }));
        shard.apply(SessionPatch::new().with_preferences(Preferences {
            language: None,
            verbosity: Some(Verbosity::Detailed),
        }));
        assert_eq!(shard.preferences.language.as_deref(), Some("ar"));
        assert_eq!(shard.preferences.verbosity, Some(Verbosity::Detailed));
    }

    #[test]
    fn blank_facts_are_ignored() {
        let mut shard = SessionShard::empty("s");
        shard.apply(SessionPatch::new().with_fact("  ").with_fact(" lift on the left "));
        assert_eq!(shard.facts, VecDeque::from(vec!["lift on the left".to_string()]));
        assert!(SessionPatch::new().is_empty());
    }
}
