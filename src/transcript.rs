//! conversation history as seen by the host: user turns plus assistant
//! messages kept up to date from `StreamMsg`s.
//!
//! assistant entries keep their raw text, so older messages are re-assembled
//! with the right context (not latest, or already answered) on demand.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::assemble::{AssembleContext, ParsedMessage};
use crate::blocks::{ContentBlock, OptionLabel};
use crate::config::ParseConfig;
use crate::controller::{MessageId, StreamMsg, TurnOutcome, TurnStatus};
use crate::error::TransportError;
use crate::quiz;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub role: Role,
    /// set for assistant entries only.
    pub message: Option<MessageId>,
    pub text: String,
    /// last blocks published while streaming.
    pub live_blocks: Vec<ContentBlock>,
    pub status: TurnStatus,
    pub selection: Option<OptionLabel>,
    pub error: Option<TransportError>,
}

impl Entry {
    fn user(text: String) -> Self {
        Self {
            role: Role::User,
            message: None,
            text,
            live_blocks: Vec::new(),
            status: TurnStatus::Completed,
            selection: None,
            error: None,
        }
    }

    fn assistant(message: MessageId) -> Self {
        Self {
            role: Role::Assistant,
            message: Some(message),
            text: String::new(),
            live_blocks: Vec::new(),
            status: TurnStatus::Sending,
            selection: None,
            error: None,
        }
    }
}

#[derive(Component, Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<Entry>,
}

impl Transcript {
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn push_user(&mut self, text: impl Into<String>) -> usize {
        self.entries.push(Entry::user(text.into()));
        self.entries.len() - 1
    }

    fn index_of(&self, message: MessageId) -> Option<usize> {
        self.entries.iter().rposition(|e| e.message == Some(message))
    }

    fn index_for(&mut self, message: MessageId) -> usize {
        match self.index_of(message) {
            Some(i) => i,
            None => {
                self.entries.push(Entry::assistant(message));
                self.entries.len() - 1
            }
        }
    }

    /// folds one controller message in; returns the touched entry index.
    pub fn apply(&mut self, msg: &StreamMsg) -> usize {
        let idx = self.index_for(msg.message());
        let entry = &mut self.entries[idx];
        match msg {
            StreamMsg::Status { status, .. } => entry.status = *status,
            StreamMsg::Blocks { text, blocks, .. } => {
                entry.text.clone_from(text);
                entry.live_blocks.clone_from(blocks);
            }
            StreamMsg::Finished { outcome, .. } => {
                entry.status = outcome.status();
                if let TurnOutcome::Failed { error, .. } = outcome {
                    entry.error = Some(error.clone());
                }
            }
        }
        idx
    }

    pub fn latest_assistant(&self) -> Option<usize> {
        self.entries.iter().rposition(|e| e.role == Role::Assistant)
    }

    pub fn last_assistant_text(&self) -> Option<&str> {
        self.latest_assistant().map(|i| self.entries[i].text.as_str())
    }

    pub fn context(&self, index: usize) -> AssembleContext {
        AssembleContext {
            is_latest: self.latest_assistant() == Some(index),
            has_selection: self.entries.get(index).is_some_and(|e| e.selection.is_some()),
        }
    }

    /// display blocks for entry `index`, assembled for where it sits now.
    pub fn blocks(&self, index: usize, config: &ParseConfig) -> Vec<ContentBlock> {
        let Some(entry) = self.entries.get(index) else {
            return Vec::new();
        };
        match (entry.role, entry.status) {
            (Role::User, _) => vec![ContentBlock::prose(&entry.text)],
            (Role::Assistant, TurnStatus::Failed) => entry.live_blocks.clone(),
            (Role::Assistant, _) => ParsedMessage::parse(&entry.text, config).blocks(self.context(index)),
        }
    }

    /// records a pick on the latest assistant message and returns the user
    /// turn to send. `None` when the pick is not allowed: older message,
    /// already answered, graded reply, or no such option.
    pub fn select_option(&mut self, index: usize, label: OptionLabel, config: &ParseConfig) -> Option<String> {
        if self.latest_assistant() != Some(index) {
            return None;
        }
        let entry = &mut self.entries[index];
        if entry.selection.is_some() || entry.status == TurnStatus::Failed {
            return None;
        }
        let parsed = ParsedMessage::parse(&entry.text, config);
        if parsed.is_result() || parsed.options.get(label).is_none() {
            return None;
        }
        entry.selection = Some(label);
        Some(quiz::answer_turn(label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const Q: &str = "题目1\nA. 鸡胸肉\nB. 米饭\n请在30秒内选择";

    fn id(seq: u64) -> MessageId {
        MessageId { session: 7, seq }
    }

    fn stream(t: &mut Transcript, seq: u64, text: &str) -> usize {
        let cfg = ParseConfig::default();
        t.apply(&StreamMsg::Status { message: id(seq), status: TurnStatus::Sending });
        t.apply(&StreamMsg::Blocks {
            message: id(seq),
            text: text.into(),
            blocks: crate::assemble::parse_blocks(text, &cfg, AssembleContext::LIVE),
        });
        t.apply(&StreamMsg::Finished { message: id(seq), outcome: TurnOutcome::Completed })
    }

    #[test]
    fn messages_fold_into_one_entry() {
        let mut t = Transcript::default();
        t.push_user("开始");
        let i = stream(&mut t, 0, Q);
        assert_eq!(i, 1);
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(1).unwrap().status, TurnStatus::Completed);
        assert_eq!(t.last_assistant_text(), Some(Q));
    }

    #[test]
    fn picking_an_option_locks_the_message() {
        let cfg = ParseConfig::default();
        let mut t = Transcript::default();
        let i = stream(&mut t, 0, Q);

        assert!(t.blocks(i, &cfg).iter().any(|b| matches!(b, ContentBlock::Option { selectable: true, .. })));
        assert_eq!(t.select_option(i, OptionLabel::D, &cfg), None);
        assert_eq!(t.select_option(i, OptionLabel::A, &cfg), Some("我选择选项A".to_string()));
        assert_eq!(t.select_option(i, OptionLabel::B, &cfg), None);
        assert!(t.blocks(i, &cfg).iter().all(|b| !matches!(b, ContentBlock::Option { selectable: true, .. })));
    }

    #[test]
    fn older_questions_become_read_only() {
        let cfg = ParseConfig::default();
        let mut t = Transcript::default();
        let first = stream(&mut t, 0, Q);
        t.push_user("b");
        stream(&mut t, 1, "题目2\nA. 深蹲\nB. 卧推");

        assert_eq!(t.context(first), AssembleContext::HISTORY);
        assert!(t.blocks(first, &cfg).iter().filter(|b| b.is_option()).all(|b| matches!(
            b,
            ContentBlock::Option { selectable: false, .. }
        )));
        assert_eq!(t.select_option(first, OptionLabel::A, &cfg), None);
    }

    #[test]
    fn failed_turn_shows_fallback() {
        let cfg = ParseConfig::default();
        let mut t = Transcript::default();
        let fallback = cfg.fallback_message.clone();
        t.apply(&StreamMsg::Blocks {
            message: id(0),
            text: fallback.clone(),
            blocks: vec![ContentBlock::prose(&fallback)],
        });
        let i = t.apply(&StreamMsg::Finished {
            message: id(0),
            outcome: TurnOutcome::Failed { fallback: fallback.clone(), error: TransportError::Io("connection reset".into()) },
        });
        assert_eq!(t.blocks(i, &cfg), vec![ContentBlock::prose(&fallback)]);
        assert_eq!(t.get(i).unwrap().error, Some(TransportError::Io("connection reset".into())));
    }
}
