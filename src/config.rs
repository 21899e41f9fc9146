//! parser vocabulary. everything model-phrasing specific that is not a
//! structural pattern lives here so hosts can tune it without a rebuild.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// env var naming a json file with a `ParseConfig`.
pub const CONFIG_ENV: &str = "BEVY_QUIZ_STREAM_CONFIG";

#[derive(Resource, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseConfig {
    /// per-line transport envelope markers stripped by the framer.
    pub envelope_prefixes: Vec<String>,
    /// option texts that never replace an existing option.
    pub placeholder_options: Vec<String>,
    /// selection instructions beyond the built-in "within N seconds" pattern.
    pub prompt_markers: Vec<String>,
    /// phrases of a "next question / continue or quit" prompt.
    pub continue_markers: Vec<String>,
    /// replaces the message content when a turn fails.
    pub fallback_message: String,
    /// drop lines that are only an option label (`"B"`, `"C."`).
    pub drop_bare_labels: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            envelope_prefixes: vec!["data:".into()],
            placeholder_options: vec!["其他选项".into(), "other option".into()],
            prompt_markers: vec![
                "选择答案".into(),
                "请选择正确答案".into(),
                "请回复选项".into(),
                "请输入选项".into(),
                "reply with the option letter".into(),
                "choose the correct answer".into(),
            ],
            continue_markers: vec![
                "准备好查看下一题了吗".into(),
                "请回复'继续'或'退出'".into(),
                "请回复“继续”或“退出”".into(),
                "请回复\"继续\"或\"退出\"".into(),
                "请继续健康知识问答游戏".into(),
                "你已完成当前题目".into(),
                "ready for the next question".into(),
                "reply 'continue' or 'quit'".into(),
                "reply continue or quit".into(),
            ],
            fallback_message: "抱歉，我暂时无法回应，请稍后再试。".into(),
            drop_bare_labels: true,
        }
    }
}

impl ParseConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// loads the file named by `BEVY_QUIZ_STREAM_CONFIG`, defaults otherwise.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => {
                info!(target: "bevy_quiz_stream", "loading parse config from {}", path);
                Self::from_path(path.trim())
            }
            _ => Ok(Self::default()),
        }
    }

    /// case-insensitive, whitespace-trimmed equality against the vocabulary.
    pub fn is_placeholder(&self, text: &str) -> bool {
        let t = text.trim();
        self.placeholder_options
            .iter()
            .any(|p| p.trim().eq_ignore_ascii_case(t) || p.trim() == t)
    }

    /// byte offset of the earliest configured selection instruction.
    pub(crate) fn find_prompt_marker(&self, text: &str) -> Option<usize> {
        earliest(text, &self.prompt_markers)
    }

    pub(crate) fn has_continue_marker(&self, text: &str) -> bool {
        earliest(text, &self.continue_markers).is_some()
    }
}

/// earliest match of any marker; ascii markers match case-insensitively.
fn earliest(text: &str, markers: &[String]) -> Option<usize> {
    let lower = text.to_ascii_lowercase();
    markers
        .iter()
        .filter(|m| !m.is_empty())
        .filter_map(|m| lower.find(&m.to_ascii_lowercase()))
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = ParseConfig::from_json_str(r#"{ "placeholder_options": ["其它"] }"#).unwrap();
        assert_eq!(cfg.placeholder_options, vec!["其它".to_string()]);
        assert_eq!(cfg.envelope_prefixes, vec!["data:".to_string()]);
        assert!(cfg.drop_bare_labels);
    }

    #[test]
    fn loads_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{ "fallback_message": "稍后再试", "drop_bare_labels": false }}"#).unwrap();
        let cfg = ParseConfig::from_path(f.path()).unwrap();
        assert_eq!(cfg.fallback_message, "稍后再试");
        assert!(!cfg.drop_bare_labels);
    }

    #[test]
    fn bad_json_is_a_config_error() {
        assert!(matches!(ParseConfig::from_json_str("{"), Err(ConfigError::Json(_))));
        assert!(matches!(
            ParseConfig::from_path("/definitely/not/here.json"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn placeholder_match_ignores_case_and_padding() {
        let cfg = ParseConfig::default();
        assert!(cfg.is_placeholder(" 其他选项 "));
        assert!(cfg.is_placeholder("Other Option"));
        assert!(!cfg.is_placeholder("其他选项都不对"));
    }

    #[test]
    fn marker_search_is_earliest() {
        let cfg = ParseConfig::default();
        let text = "蛋白质请选择正确答案，选择答案后回复";
        let at = cfg.find_prompt_marker(text).unwrap();
        assert_eq!(&text[at..], "请选择正确答案，选择答案后回复");
    }
}
