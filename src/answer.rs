//! answer outcome recovery over the whole normalized buffer.
//!
//! patterns run most specific first; a field filled by an earlier pattern is
//! never overwritten by a later, looser one.

use regex::Regex;
use std::sync::LazyLock;

use crate::blocks::AnswerFields;
use crate::config::ParseConfig;

const USER_KEY: &str = r"(?:你的回答|你的答案|您的回答|您的答案|你选择的是|你选择了|你选的是|(?i:your answer|you chose|you selected))";
const CORRECT_KEY: &str = r"(?:正确答案|标准答案|(?i:correct answer|right answer))";
const SCORE_KEY: &str = r"(?:本题得分|得分|(?i:score))";
/// fields never cross a line break: `正确答案：` at a line end is a question, not a grade.
const LETTER: &str = r#"[ \t]*(?:是|为|(?i:is|was))?[ \t]*[：:]?[ \t]*(?:选项|(?i:option)[ \t]*)?[「“"'（(]?([A-D])(?:[^A-Za-z\n]|(?m:$))"#;
/// a separator is required, so `每题得分10分` in the rules is not a score.
const SCORE: &str = r"[ \t]*(?:[：:]|是|为)[ \t]*([+＋\-－]?\d+(?:\.\d+)?[ \t]*(?:分|(?i:points?|pts))?(?:[ \t]*[（(][^）)\n]*[）)])?)";

/// user letter, correct letter and score in one statement.
static COMBINED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"{USER_KEY}{LETTER}[^\n]*?{CORRECT_KEY}{LETTER}[^\n]*?{SCORE_KEY}{SCORE}"
    ))
    .unwrap()
});

static USER_ANSWER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"{USER_KEY}{LETTER}")).unwrap());

static CORRECT_ANSWER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"{CORRECT_KEY}{LETTER}")).unwrap());

static SCORE_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"{SCORE_KEY}{SCORE}")).unwrap());

static EXPLANATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:答案解析|解析|解释|(?i:explanation))\s*[：:]\s*").unwrap()
});

/// where an explanation stops: the next section of a graded reply.
static SECTION_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"你的回答|你的答案|您的回答|正确答案|本题得分|得分[：:]|总分[：:]|当前总分|下一题|题目\s*[0-9一二三四五六七八九十]|第\s*[0-9一二三四五六七八九十]+\s*题|(?i:your answer|correct answer|score\s*:|next question)")
        .unwrap()
});

pub fn extract(normalized: &str, config: &ParseConfig) -> AnswerFields {
    let text = normalized.replace("**", "");
    let mut fields = AnswerFields::default();

    if let Some(caps) = COMBINED.captures(&text) {
        fill(&mut fields.user_answer, caps.get(1).map(|m| m.as_str()));
        fill(&mut fields.correct_answer, caps.get(2).map(|m| m.as_str()));
        fill(&mut fields.score, caps.get(3).map(|m| m.as_str()));
    }
    fill(&mut fields.user_answer, first_capture(&USER_ANSWER, &text));
    fill(&mut fields.correct_answer, first_capture(&CORRECT_ANSWER, &text));
    fill(&mut fields.score, first_capture(&SCORE_FIELD, &text));
    fill(&mut fields.explanation, explanation(&text, config).as_deref());
    fields
}

fn first_capture<'t>(re: &Regex, text: &'t str) -> Option<&'t str> {
    re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// only fills an empty slot, and only with a non-empty value.
fn fill(slot: &mut Option<String>, value: Option<&str>) {
    if slot.is_some() {
        return;
    }
    if let Some(v) = value.map(str::trim)
        && !v.is_empty() {
            *slot = Some(v.to_string());
    }
}

fn explanation(text: &str, config: &ParseConfig) -> Option<String> {
    let start = EXPLANATION.find(text)?.end();
    let rest = &text[start..];
    let section = SECTION_END.find(rest).map(|m| m.start());
    let cont = config
        .continue_markers
        .iter()
        .filter(|m| !m.is_empty())
        .filter_map(|m| rest.find(m.as_str()))
        .min();
    let end = match (section, cont) {
        (Some(a), Some(b)) => a.min(b),
        (a, b) => a.or(b).unwrap_or(rest.len()),
    };
    let body = rest[..end].trim();
    (!body.is_empty()).then(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(text: &str) -> AnswerFields {
        extract(text, &ParseConfig::default())
    }

    #[test]
    fn combined_statement() {
        let f = run("你的回答：A 正确答案：B 得分：+10分(总分:10分)");
        assert_eq!(
            f,
            AnswerFields {
                user_answer: Some("A".into()),
                correct_answer: Some("B".into()),
                score: Some("+10分(总分:10分)".into()),
                explanation: None,
            }
        );
    }

    #[test]
    fn per_field_fallbacks_across_lines() {
        let f = run("回答正确！\n**你的答案**是 C\n**正确答案**：选项C\n本题得分：10分\n解析：鸡胸肉蛋白质含量高。\n准备好查看下一题了吗？");
        assert_eq!(f.user_answer.as_deref(), Some("C"));
        assert_eq!(f.correct_answer.as_deref(), Some("C"));
        assert_eq!(f.score.as_deref(), Some("10分"));
        assert_eq!(f.explanation.as_deref(), Some("鸡胸肉蛋白质含量高。"));
        assert_eq!(f.is_correct(), Some(true));
    }

    #[test]
    fn english_phrasing() {
        let f = run("Your answer is B. The correct answer is D.\nScore: 0 points (total: 20)\nExplanation: protein timing matters less than total intake.");
        assert_eq!(f.user_answer.as_deref(), Some("B"));
        assert_eq!(f.correct_answer.as_deref(), Some("D"));
        assert_eq!(f.score.as_deref(), Some("0 points (total: 20)"));
        assert_eq!(f.explanation.as_deref(), Some("protein timing matters less than total intake."));
    }

    #[test]
    fn explanation_stops_at_next_section() {
        let f = run("解析：多练核心。下一题：题目2 以下哪个...");
        assert_eq!(f.explanation.as_deref(), Some("多练核心。"));
    }

    #[test]
    fn earlier_pattern_wins() {
        let f = run("你的回答：A 正确答案：A 得分：+10分\n你的回答：B");
        assert_eq!(f.user_answer.as_deref(), Some("A"));
    }

    #[test]
    fn field_key_at_line_end_does_not_grab_next_line() {
        let f = run("题目3：下列哪一项是正确答案：\nA. 每天喝水2升\nB. 不吃早餐\n请在30秒内选择");
        assert_eq!(f, AnswerFields::default());
        let f = run("你的回答：\nB. 米饭");
        assert_eq!(f.user_answer, None);
    }

    #[test]
    fn score_needs_a_separator() {
        assert_eq!(run("游戏规则：每题得分10分").score, None);
        assert_eq!(run("本题得分为10分").score.as_deref(), Some("10分"));
        assert_eq!(run("得分：\n10分").score, None);
    }

    #[test]
    fn prose_is_not_a_result() {
        assert!(!run("题目1\nA. 选项一\nB. 选项二\n计分规则：答对+10分").is_result());
        assert!(!run("").is_result());
        assert!(!run("your answer will be graded").is_result());
    }
}
