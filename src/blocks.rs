//! typed output of the parser: what a renderer paints for one assistant message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// multiple-choice option letter. ordering is display order (A → D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OptionLabel {
    A,
    B,
    C,
    D,
}

impl OptionLabel {
    pub const ALL: [OptionLabel; 4] = [Self::A, Self::B, Self::C, Self::D];

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'A' => Some(Self::A),
            'B' => Some(Self::B),
            'C' => Some(Self::C),
            'D' => Some(Self::D),
            _ => None,
        }
    }

    /// accepts `a`..`d` as well; used for user input, never for model text.
    pub fn from_answer(s: &str) -> Option<Self> {
        let mut chars = s.trim().chars();
        let c = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        Self::from_char(c.to_ascii_uppercase())
    }

    pub fn as_char(self) -> char {
        match self {
            Self::A => 'A',
            Self::B => 'B',
            Self::C => 'C',
            Self::D => 'D',
        }
    }
}

impl fmt::Display for OptionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// answer outcome recovered from a graded reply. absent fields stay `None`,
/// a present field is never an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerFields {
    pub user_answer: Option<String>,
    pub correct_answer: Option<String>,
    pub score: Option<String>,
    pub explanation: Option<String>,
}

impl AnswerFields {
    /// any field present puts the message in result mode.
    pub fn is_result(&self) -> bool {
        self.user_answer.is_some()
            || self.correct_answer.is_some()
            || self.score.is_some()
            || self.explanation.is_some()
    }

    /// true when both letters are known and agree.
    pub fn is_correct(&self) -> Option<bool> {
        match (&self.user_answer, &self.correct_answer) {
            (Some(u), Some(c)) => Some(u == c),
            _ => None,
        }
    }
}

/// one renderable unit. the ordered `Vec<ContentBlock>` for a message is
/// republished wholesale on every update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentBlock {
    Prose { text: String },
    Prompt { text: String },
    QuestionTitle { text: String },
    Option {
        label: OptionLabel,
        text: String,
        selectable: bool,
    },
    ContinuePrompt { text: String },
    AnswerResult(AnswerFields),
}

impl ContentBlock {
    pub fn prose(text: impl Into<String>) -> Self {
        Self::Prose { text: text.into() }
    }
    pub fn prompt(text: impl Into<String>) -> Self {
        Self::Prompt { text: text.into() }
    }
    pub fn title(text: impl Into<String>) -> Self {
        Self::QuestionTitle { text: text.into() }
    }
    pub fn continue_prompt(text: impl Into<String>) -> Self {
        Self::ContinuePrompt { text: text.into() }
    }
    pub fn option(label: OptionLabel, text: impl Into<String>, selectable: bool) -> Self {
        Self::Option { label, text: text.into(), selectable }
    }

    pub fn is_option(&self) -> bool {
        matches!(self, Self::Option { .. })
    }

    pub fn is_answer_result(&self) -> bool {
        matches!(self, Self::AnswerResult(_))
    }
}
