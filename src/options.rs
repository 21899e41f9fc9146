use std::collections::BTreeMap;

use crate::blocks::OptionLabel;
use crate::classify::{Classified, OptionLine};
use crate::config::ParseConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionEntry {
    pub text: String,
    /// instruction cut out of this option's raw text, shown right after it.
    pub trailing_prompt: Option<String>,
}

/// deduplicated letter → text map, iterated A → D.
///
/// a label keeps its first text unless a later candidate is strictly longer
/// and not a placeholder. entries are replaced whole, never merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionMap {
    entries: BTreeMap<OptionLabel, OptionEntry>,
}

impl OptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_classified(classified: &Classified, config: &ParseConfig) -> Self {
        let mut map = Self::new();
        for line in classified.options() {
            map.offer(line, config);
        }
        map
    }

    /// returns true when the map changed.
    pub fn offer(&mut self, line: &OptionLine, config: &ParseConfig) -> bool {
        match self.entries.get_mut(&line.label) {
            None => {
                self.entries.insert(
                    line.label,
                    OptionEntry { text: line.text.clone(), trailing_prompt: line.trailing_prompt.clone() },
                );
                true
            }
            Some(existing) => {
                let longer = line.text.chars().count() > existing.text.chars().count();
                if !longer || config.is_placeholder(&line.text) {
                    return false;
                }
                existing.text = line.text.clone();
                if line.trailing_prompt.is_some() {
                    existing.trailing_prompt = line.trailing_prompt.clone();
                }
                true
            }
        }
    }

    pub fn get(&self, label: OptionLabel) -> Option<&OptionEntry> {
        self.entries.get(&label)
    }

    pub fn text(&self, label: OptionLabel) -> Option<&str> {
        self.entries.get(&label).map(|e| e.text.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (OptionLabel, &OptionEntry)> {
        self.entries.iter().map(|(l, e)| (*l, e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// instructions that were embedded in option texts, in label order.
    pub fn trailing_prompts(&self) -> impl Iterator<Item = &str> {
        self.entries.values().filter_map(|e| e.trailing_prompt.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;

    fn line(label: OptionLabel, text: &str) -> OptionLine {
        OptionLine { label, text: text.into(), trailing_prompt: None }
    }

    #[test]
    fn longer_non_placeholder_wins() {
        let cfg = ParseConfig::default();
        let mut map = OptionMap::new();
        assert!(map.offer(&line(OptionLabel::A, "选项"), &cfg));
        assert!(map.offer(&line(OptionLabel::A, "选项一"), &cfg));
        assert!(!map.offer(&line(OptionLabel::A, "选"), &cfg));
        assert!(!map.offer(&line(OptionLabel::A, "其他选项"), &cfg));
        assert_eq!(map.text(OptionLabel::A), Some("选项一"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn placeholder_is_kept_when_first_then_replaced() {
        let cfg = ParseConfig::default();
        let mut map = OptionMap::new();
        map.offer(&line(OptionLabel::D, "其他选项"), &cfg);
        assert_eq!(map.text(OptionLabel::D), Some("其他选项"));
        map.offer(&line(OptionLabel::D, "以上都不是的选项"), &cfg);
        assert_eq!(map.text(OptionLabel::D), Some("以上都不是的选项"));
    }

    #[test]
    fn placeholder_vocabulary_is_configurable() {
        let cfg = ParseConfig { placeholder_options: vec!["以上皆非".into()], ..Default::default() };
        let mut map = OptionMap::new();
        map.offer(&line(OptionLabel::B, "无"), &cfg);
        assert!(!map.offer(&line(OptionLabel::B, "以上皆非"), &cfg));
        assert!(map.offer(&line(OptionLabel::B, "其他选项"), &cfg));
    }

    #[test]
    fn duplicates_collapse_regardless_of_order() {
        let cfg = ParseConfig::default();
        let a = OptionMap::from_classified(&classify("A. 深蹲\nB. 卧推\nA. 深蹲训练\nB. 卧", &cfg), &cfg);
        let b = OptionMap::from_classified(&classify("B. 卧\nA. 深蹲训练\nB. 卧推\nA. 深蹲", &cfg), &cfg);
        assert_eq!(a, b);
        assert_eq!(a.text(OptionLabel::A), Some("深蹲训练"));
        assert_eq!(a.text(OptionLabel::B), Some("卧推"));
    }

    #[test]
    fn reflowed_and_separate_lines_agree() {
        let cfg = ParseConfig::default();
        let split = OptionMap::from_classified(&classify("A. 保持姿势\nB. 增加负重", &cfg), &cfg);
        let glued = OptionMap::from_classified(&classify("A. 保持姿势B. 增加负重", &cfg), &cfg);
        assert_eq!(split, glued);
        assert_eq!(split.len(), 2);
    }

    #[test]
    fn embedded_prompt_is_surfaced() {
        let cfg = ParseConfig::default();
        let map = OptionMap::from_classified(&classify("A. 一\nB. 二\nC. 三\nD. 四请在30秒内选择", &cfg), &cfg);
        assert_eq!(map.text(OptionLabel::D), Some("四"));
        assert_eq!(map.trailing_prompts().collect::<Vec<_>>(), vec!["请在30秒内选择"]);
    }
}
