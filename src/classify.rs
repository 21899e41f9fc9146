//! line classification over the whole accumulated buffer.
//!
//! the buffer is normalized first (envelope leftovers, blank-line runs,
//! option labels glued onto one physical line) and then each logical line
//! gets exactly one kind. anything unrecognized is prose; the only lines
//! dropped are bare option labels.

use bevy::log::trace;
use regex::Regex;
use std::sync::LazyLock;

use crate::blocks::OptionLabel;
use crate::config::ParseConfig;

/// `A.` / `B、` / `C：` anywhere in a line; candidates for reflow.
static INLINE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-D][.．、：:]").unwrap());

static OPTION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-D])([.．、：:]|\s)\s*(.*)$").unwrap());

static BARE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-D][.．、：:]?$").unwrap());

static QUESTION_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:题目\s*[0-9一二三四五六七八九十]*|第\s*[0-9一二三四五六七八九十百]+\s*题|问题\s*\d+|(?i:question)\s*\d+)")
        .unwrap()
});

/// timing instruction, e.g. `请在30秒内选择` / `within 30 seconds`.
pub(crate) static TIMER_PROMPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:请在|请于)\s*\d+\s*秒钟?内|(?i:within\s+\d+\s+seconds?)").unwrap()
});

static ANSWER_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"你的回答|你的答案|您的回答|正确答案|标准答案|得分|解析|(?i:your answer|correct answer|score\s*:|explanation\s*:)")
        .unwrap()
});

static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n){2,}").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionLine {
    pub label: OptionLabel,
    pub text: String,
    /// selection instruction that was glued onto the option text.
    pub trailing_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Prose(String),
    Prompt(String),
    QuestionTitle(String),
    Option(OptionLine),
    ContinuePrompt(String),
    /// part of a graded reply (your answer / correct answer / score / explanation).
    AnswerFragment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub normalized: String,
    pub lines: Vec<LineKind>,
}

impl Classified {
    pub fn options(&self) -> impl Iterator<Item = &OptionLine> {
        self.lines.iter().filter_map(|l| match l {
            LineKind::Option(o) => Some(o),
            _ => None,
        })
    }
}

pub fn classify(buffer: &str, config: &ParseConfig) -> Classified {
    let normalized = normalize(buffer, config);
    let lines = normalized
        .lines()
        .filter_map(|line| classify_line(line, config))
        .collect();
    Classified { normalized, lines }
}

/// buffer-wide cleanup applied before any line is looked at.
pub fn normalize(buffer: &str, config: &ParseConfig) -> String {
    let text = buffer.replace("\r\n", "\n").replace('\r', "\n");
    let text = text
        .split('\n')
        .map(|line| strip_envelope(line, &config.envelope_prefixes))
        .collect::<Vec<_>>()
        .join("\n");
    let text = BLANK_RUN.replace_all(&text, "\n\n");
    text.split('\n').map(reflow_options).collect::<Vec<_>>().join("\n")
}

/// envelope left at the start of a line (raw transports relaying sse text).
/// the same marker inside prose is content.
fn strip_envelope<'a>(line: &'a str, prefixes: &[String]) -> &'a str {
    prefixes
        .iter()
        .filter(|p| !p.is_empty())
        .find_map(|p| line.strip_prefix(p.as_str()))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .unwrap_or(line)
}

/// breaks a line before each option label when two or more labels were
/// concatenated onto it (`A. 保持姿势B. 增加负重`).
fn reflow_options(line: &str) -> String {
    let candidates: Vec<(usize, OptionLabel)> = INLINE_LABEL
        .find_iter(line)
        .filter(|m| {
            // `PhD.` is not a label, neither is the letter in `正确答案：B.`
            let before = &line[..m.start()];
            let glued_to_word = before.chars().next_back().is_some_and(|c| c.is_ascii_alphabetic());
            let answer_letter = before.trim_end().ends_with(['：', ':']) && before.contains('答');
            !glued_to_word && !answer_letter
        })
        .filter_map(|m| {
            let c = line[m.start()..].chars().next()?;
            Some((m.start(), OptionLabel::from_char(c)?))
        })
        .collect();

    let chain = increasing_chain(&candidates);
    if chain.len() < 2 {
        return line.to_string();
    }
    trace!(target: "bevy_quiz_stream", "reflow: {} labels on one line", chain.len());

    let mut out = String::with_capacity(line.len() + chain.len());
    let mut last = 0;
    for &at in &chain {
        let head = line[last..at].trim_end();
        if !head.trim().is_empty() {
            out.push_str(head);
            out.push('\n');
        }
        last = at;
    }
    out.push_str(&line[last..]);
    out
}

/// longest run of strictly increasing labels, returned as byte offsets.
fn increasing_chain(candidates: &[(usize, OptionLabel)]) -> Vec<usize> {
    let n = candidates.len();
    let mut best_len = vec![1usize; n];
    let mut prev: Vec<Option<usize>> = vec![None; n];
    for i in 0..n {
        for j in 0..i {
            if candidates[j].1 < candidates[i].1 && best_len[j] + 1 > best_len[i] {
                best_len[i] = best_len[j] + 1;
                prev[i] = Some(j);
            }
        }
    }
    let Some(mut at) = (0..n).max_by_key(|&i| (best_len[i], std::cmp::Reverse(i))) else {
        return Vec::new();
    };
    let mut chain = vec![candidates[at].0];
    while let Some(p) = prev[at] {
        chain.push(candidates[p].0);
        at = p;
    }
    chain.reverse();
    chain
}

/// emphasis and heading markers do not change what a line is.
fn strip_markup(line: &str) -> String {
    let t = line.replace("**", "");
    t.trim().trim_start_matches('#').trim().to_string()
}

fn classify_line(line: &str, config: &ParseConfig) -> Option<LineKind> {
    let plain = strip_markup(line);
    if plain.is_empty() {
        return None;
    }

    if BARE_LABEL.is_match(&plain) {
        return (!config.drop_bare_labels).then(|| LineKind::Prose(line.trim().to_string()));
    }

    if let Some(kind) = option_line(&plain, config) {
        return Some(kind);
    }

    if QUESTION_TITLE.is_match(&plain) {
        return Some(LineKind::QuestionTitle(plain));
    }
    if config.has_continue_marker(&plain) {
        return Some(LineKind::ContinuePrompt(plain));
    }
    if find_prompt(&plain, config).is_some() {
        return Some(LineKind::Prompt(plain));
    }
    if ANSWER_MARKER.is_match(&plain) {
        return Some(LineKind::AnswerFragment(line.trim().to_string()));
    }
    Some(LineKind::Prose(line.trim_end().to_string()))
}

fn option_line(plain: &str, config: &ParseConfig) -> Option<LineKind> {
    let caps = OPTION_LINE.captures(plain)?;
    let label = caps.get(1)?.as_str().chars().next().and_then(OptionLabel::from_char)?;
    let sep = caps.get(2)?.as_str();
    let rest = caps.get(3)?.as_str().trim();

    // `A healthy diet ...` is prose, `A 保持姿势` is an option
    if sep.trim().is_empty() && rest.starts_with(|c: char| c.is_ascii_lowercase()) {
        return None;
    }

    let (text, trailing_prompt) = match find_prompt(rest, config) {
        Some(at) => {
            let trailing = rest[at..].trim().to_string();
            trace!(target: "bevy_quiz_stream", "excised prompt from option {}: {}", label, trailing);
            (rest[..at].trim().to_string(), Some(trailing))
        }
        None => (rest.to_string(), None),
    };

    if text.is_empty() {
        // nothing left but the instruction
        return trailing_prompt.map(LineKind::Prompt);
    }
    Some(LineKind::Option(OptionLine { label, text, trailing_prompt }))
}

/// earliest selection instruction in `text`, built-in timer or configured.
pub(crate) fn find_prompt(text: &str, config: &ParseConfig) -> Option<usize> {
    let timer = TIMER_PROMPT.find(text).map(|m| m.start());
    match (timer, config.find_prompt_marker(text)) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
