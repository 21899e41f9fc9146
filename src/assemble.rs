//! block assembly and the end-to-end pure chain `buffer → blocks`.

use crate::answer;
use crate::blocks::{AnswerFields, ContentBlock};
use crate::classify::{self, Classified, LineKind};
use crate::config::ParseConfig;
use crate::options::OptionMap;

/// where the message sits in the conversation; decides option selectability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssembleContext {
    pub is_latest: bool,
    pub has_selection: bool,
}

impl AssembleContext {
    /// the message currently streaming in.
    pub const LIVE: Self = Self { is_latest: true, has_selection: false };
    pub const HISTORY: Self = Self { is_latest: false, has_selection: false };

    fn selectable(self) -> bool {
        self.is_latest && !self.has_selection
    }
}

/// everything derived from one buffer snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub classified: Classified,
    pub options: OptionMap,
    pub answer: AnswerFields,
}

impl ParsedMessage {
    pub fn parse(buffer: &str, config: &ParseConfig) -> Self {
        let classified = classify::classify(buffer, config);
        let options = OptionMap::from_classified(&classified, config);
        let answer = answer::extract(&classified.normalized, config);
        Self { classified, options, answer }
    }

    pub fn is_result(&self) -> bool {
        self.answer.is_result()
    }

    pub fn blocks(&self, ctx: AssembleContext) -> Vec<ContentBlock> {
        assemble(&self.classified, &self.options, &self.answer, ctx)
    }
}

/// buffer text to display blocks. pure: same input, same output.
pub fn parse_blocks(buffer: &str, config: &ParseConfig, ctx: AssembleContext) -> Vec<ContentBlock> {
    ParsedMessage::parse(buffer, config).blocks(ctx)
}

pub fn assemble(
    classified: &Classified,
    options: &OptionMap,
    answer: &AnswerFields,
    ctx: AssembleContext,
) -> Vec<ContentBlock> {
    if answer.is_result() {
        return result_blocks(classified, answer);
    }

    let mut out = Vec::with_capacity(classified.lines.len() + options.len());
    let mut options_emitted = false;
    for line in &classified.lines {
        match line {
            LineKind::Prose(t) | LineKind::AnswerFragment(t) => out.push(ContentBlock::prose(t)),
            LineKind::Prompt(t) => out.push(ContentBlock::prompt(t)),
            LineKind::QuestionTitle(t) => out.push(ContentBlock::title(t)),
            LineKind::ContinuePrompt(t) => out.push(ContentBlock::continue_prompt(t)),
            // the whole option group goes where the first option appeared
            LineKind::Option(_) if !options_emitted => {
                options_emitted = true;
                for (label, entry) in options.iter() {
                    out.push(ContentBlock::option(label, &entry.text, ctx.selectable()));
                    if let Some(p) = &entry.trailing_prompt {
                        out.push(ContentBlock::prompt(p));
                    }
                }
            }
            LineKind::Option(_) => {}
        }
    }
    out
}

/// result mode: titles for context, continue prompts, then the outcome.
fn result_blocks(classified: &Classified, answer: &AnswerFields) -> Vec<ContentBlock> {
    let titles = classified.lines.iter().filter_map(|l| match l {
        LineKind::QuestionTitle(t) => Some(ContentBlock::title(t)),
        _ => None,
    });
    let continues = classified.lines.iter().filter_map(|l| match l {
        LineKind::ContinuePrompt(t) => Some(ContentBlock::continue_prompt(t)),
        _ => None,
    });
    titles
        .chain(continues)
        .chain(std::iter::once(ContentBlock::AnswerResult(answer.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::OptionLabel;
    use pretty_assertions::assert_eq;

    fn cfg() -> ParseConfig {
        ParseConfig::default()
    }

    #[test]
    fn question_with_embedded_timer() {
        let blocks = parse_blocks(
            "题目1\nA. 选项一请在30秒内选择\nB. 选项二\nC. 选项三\nD. 选项四",
            &cfg(),
            AssembleContext::LIVE,
        );
        assert_eq!(
            blocks,
            vec![
                ContentBlock::title("题目1"),
                ContentBlock::option(OptionLabel::A, "选项一", true),
                ContentBlock::prompt("请在30秒内选择"),
                ContentBlock::option(OptionLabel::B, "选项二", true),
                ContentBlock::option(OptionLabel::C, "选项三", true),
                ContentBlock::option(OptionLabel::D, "选项四", true),
            ]
        );
    }

    #[test]
    fn graded_reply_is_a_single_result() {
        let blocks = parse_blocks("你的回答：A 正确答案：B 得分：+10分(总分:10分)", &cfg(), AssembleContext::LIVE);
        assert_eq!(
            blocks,
            vec![ContentBlock::AnswerResult(AnswerFields {
                user_answer: Some("A".into()),
                correct_answer: Some("B".into()),
                score: Some("+10分(总分:10分)".into()),
                explanation: None,
            })]
        );
    }

    #[test]
    fn result_suppresses_options_seen_earlier() {
        let text = "题目1：哪项正确？\nA. 一\nB. 二\n你的回答：A 正确答案：B 得分：0分\n解析：二才对。\n准备好查看下一题了吗？";
        let blocks = parse_blocks(text, &cfg(), AssembleContext::LIVE);
        assert!(!blocks.iter().any(ContentBlock::is_option));
        assert_eq!(blocks[0], ContentBlock::title("题目1：哪项正确？"));
        assert_eq!(blocks[1], ContentBlock::continue_prompt("准备好查看下一题了吗？"));
        let ContentBlock::AnswerResult(fields) = &blocks[2] else {
            panic!("expected an answer result, got {:?}", blocks[2]);
        };
        assert_eq!(fields.explanation.as_deref(), Some("二才对。"));
        assert_eq!(blocks.len(), 3);
    }

    #[test]
    fn fragments_reparse_into_one_option() {
        let mut buf = crate::accumulator::MessageBuffer::new();
        let first = parse_blocks(buf.append("A. 选项"), &cfg(), AssembleContext::LIVE);
        assert_eq!(first, vec![ContentBlock::option(OptionLabel::A, "选项", true)]);
        let second = parse_blocks(buf.append("一"), &cfg(), AssembleContext::LIVE);
        assert_eq!(second, vec![ContentBlock::option(OptionLabel::A, "选项一", true)]);
    }

    #[test]
    fn historical_or_answered_options_are_not_selectable() {
        let text = "A. 一\nB. 二";
        for ctx in [AssembleContext::HISTORY, AssembleContext { is_latest: true, has_selection: true }] {
            let blocks = parse_blocks(text, &cfg(), ctx);
            assert!(blocks.iter().all(|b| matches!(b, ContentBlock::Option { selectable: false, .. })));
        }
    }

    #[test]
    fn prose_keeps_its_order_around_options() {
        let blocks = parse_blocks("好的，我们开始！\nA. 一\nB. 二\n请选择正确答案", &cfg(), AssembleContext::HISTORY);
        assert_eq!(
            blocks,
            vec![
                ContentBlock::prose("好的，我们开始！"),
                ContentBlock::option(OptionLabel::A, "一", false),
                ContentBlock::option(OptionLabel::B, "二", false),
                ContentBlock::prompt("请选择正确答案"),
            ]
        );
    }

    #[test]
    fn question_mentioning_answer_keywords_keeps_its_options() {
        let blocks = parse_blocks(
            "题目3：下列哪一项是正确答案：\nA. 每天喝水2升\nB. 不吃早餐\n请在30秒内选择",
            &cfg(),
            AssembleContext::LIVE,
        );
        assert_eq!(
            blocks,
            vec![
                ContentBlock::title("题目3：下列哪一项是正确答案："),
                ContentBlock::option(OptionLabel::A, "每天喝水2升", true),
                ContentBlock::option(OptionLabel::B, "不吃早餐", true),
                ContentBlock::prompt("请在30秒内选择"),
            ]
        );

        let blocks = parse_blocks(
            "游戏规则：每题得分10分\n题目1：哪个富含蛋白质？\nA. 鸡胸肉\nB. 米饭",
            &cfg(),
            AssembleContext::LIVE,
        );
        assert_eq!(
            blocks,
            vec![
                ContentBlock::prose("游戏规则：每题得分10分"),
                ContentBlock::title("题目1：哪个富含蛋白质？"),
                ContentBlock::option(OptionLabel::A, "鸡胸肉", true),
                ContentBlock::option(OptionLabel::B, "米饭", true),
            ]
        );
    }

    #[test]
    fn envelope_text_inside_prose_is_kept() {
        let blocks = parse_blocks("记录你的训练data: 深蹲3组", &cfg(), AssembleContext::LIVE);
        assert_eq!(blocks, vec![ContentBlock::prose("记录你的训练data: 深蹲3组")]);
    }

    #[test]
    fn chain_is_idempotent() {
        let texts = [
            "",
            "题目1A. 保持姿势B. 增加负重C. 其他选项D. 减少休息请在30秒内选择",
            "你的回答：C\n得分：10分\n解析：略",
            "普通的聊天回复，没有题目。\n\n\n第二段",
        ];
        for t in texts {
            assert_eq!(
                parse_blocks(t, &cfg(), AssembleContext::LIVE),
                parse_blocks(t, &cfg(), AssembleContext::LIVE)
            );
        }
    }

    #[test]
    fn options_and_result_never_coexist() {
        let mut buf = crate::accumulator::MessageBuffer::new();
        let stream = ["题目2\nA. 深", "蹲\nB. 卧推\n", "你的回答：A", " 正确答案：A 得分：+10分"];
        for frag in stream {
            let blocks = parse_blocks(buf.append(frag), &cfg(), AssembleContext::LIVE);
            let has_option = blocks.iter().any(ContentBlock::is_option);
            let has_result = blocks.iter().any(ContentBlock::is_answer_result);
            assert!(!(has_option && has_result), "{blocks:?}");
        }
    }
}
