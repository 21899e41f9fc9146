//! helpers around quiz turns: the game-start prompt and answer phrasing.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::blocks::OptionLabel;
use crate::classify::TIMER_PROMPT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn label(self) -> &'static str {
        match self {
            Self::Beginner => "初级",
            Self::Intermediate => "中级",
            Self::Advanced => "高级",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Topic {
    #[default]
    Training,
    NutritionBasics,
    HealthyLifestyle,
    BodyFat,
    Recovery,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Self::Training,
        Self::NutritionBasics,
        Self::HealthyLifestyle,
        Self::BodyFat,
        Self::Recovery,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Training => "健身训练",
            Self::NutritionBasics => "营养学基础",
            Self::HealthyLifestyle => "健康生活方式",
            Self::BodyFat => "体脂管理",
            Self::Recovery => "运动恢复",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QuestionCount {
    #[default]
    Five,
    Ten,
    Fifteen,
}

impl QuestionCount {
    pub fn get(self) -> u32 {
        match self {
            Self::Five => 5,
            Self::Ten => 10,
            Self::Fifteen => 15,
        }
    }
}

/// settings picked before the first question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuizSetup {
    pub difficulty: Difficulty,
    pub topic: Topic,
    pub count: QuestionCount,
}

impl QuizSetup {
    /// user turn that opens a game.
    pub fn start_prompt(&self) -> String {
        format!(
            "我想开始健康知识问答游戏，选择{}难度，主题是{}，题目数量{}道。请直接出第一题。",
            self.difficulty.label(),
            self.topic.label(),
            self.count.get()
        )
    }
}

impl fmt::Display for QuizSetup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}题", self.difficulty.label(), self.topic.label(), self.count.get())
    }
}

/// an assistant message that asks the user to pick A–D.
pub fn is_multiple_choice(text: &str) -> bool {
    let has = |label: char| text.contains(&format!("{label}.")) || text.contains(&format!("{label} "));
    has('A')
        && has('B')
        && (TIMER_PROMPT.is_match(text) || text.contains("选择答案") || text.contains("请在30秒内作答"))
}

/// the reply is waiting for "继续" / "退出" rather than an answer.
pub fn awaits_continue(text: &str) -> bool {
    text.contains("准备好查看下一题了吗")
        || text.contains("请回复'继续'或'退出'")
        || text.contains("请继续健康知识问答游戏")
        || text.contains("你已完成当前题目")
        || (text.contains("得分") && text.contains("解析"))
}

/// a restored conversation whose last reply is mid-game.
pub fn game_in_progress(text: &str) -> bool {
    text.contains("题目") || TIMER_PROMPT.is_match(text) || text.contains("得分")
}

/// phrases a bare letter reply to a multiple-choice question the way the
/// grader expects; anything else goes through trimmed.
pub fn normalize_answer(input: &str, last_assistant: Option<&str>) -> String {
    let trimmed = input.trim();
    match (OptionLabel::from_answer(trimmed), last_assistant) {
        (Some(label), Some(prev)) if is_multiple_choice(prev) => format!("我选择选项{label}"),
        _ => trimmed.to_string(),
    }
}

/// user turn for a picked option.
pub fn answer_turn(label: OptionLabel) -> String {
    format!("我选择选项{label}")
}
