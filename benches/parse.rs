//! full re-parse cost as a reply grows fragment by fragment.

use bevy_quiz_stream::accumulator::MessageBuffer;
use bevy_quiz_stream::framer::{Framing, frame_chunk};
use bevy_quiz_stream::{AssembleContext, ParseConfig, parse_blocks};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

const QUESTION: &str = "好的，我们开始吧！\n题目3：以下哪种做法最有助于深蹲时保护膝关节？A. 保持膝盖与脚尖方向一致B. 尽量增加负重C. 膝盖内扣以发力D. 减少组间休息请在30秒内选择";
const GRADED: &str = "你的回答：A\n正确答案：A\n得分：+10分(总分:30分)\n解析：膝盖与脚尖方向一致可以让受力沿着关节的自然轨迹传递。\n准备好查看下一题了吗？";

fn fragments(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

fn benchmark_single_parse(c: &mut Criterion) {
    let config = ParseConfig::default();
    c.bench_function("parse_question", |b| {
        b.iter(|| black_box(parse_blocks(black_box(QUESTION), &config, AssembleContext::LIVE)))
    });
    c.bench_function("parse_graded_reply", |b| {
        b.iter(|| black_box(parse_blocks(black_box(GRADED), &config, AssembleContext::LIVE)))
    });
}

fn benchmark_streamed_reply(c: &mut Criterion) {
    let config = ParseConfig::default();
    let frags = fragments(QUESTION, 4);
    c.bench_function("stream_question_4_char_fragments", |b| {
        b.iter(|| {
            let mut buf = MessageBuffer::new();
            for f in &frags {
                black_box(parse_blocks(buf.append(f), &config, AssembleContext::LIVE));
            }
        })
    });

    let chunk: String = GRADED.lines().map(|l| format!("data:{l}\n\n")).collect();
    c.bench_function("frame_event_stream_chunk", |b| {
        b.iter(|| black_box(frame_chunk(black_box(&chunk), Framing::EventStream, &config.envelope_prefixes)))
    });
}

criterion_group!(benches, benchmark_single_parse, benchmark_streamed_reply);
criterion_main!(benches);
