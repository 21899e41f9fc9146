//! headless quiz demo driven by any openai-compatible model via `llm`.
//! - `LLM_BASE_URL`, `OPENAI_API_KEY`, `LLM_MODEL` as in the other demos.
//! - the model plays quizmaster; the provider keeps the history (sliding window).
//! - type a letter to answer, `/cancel` to stop a reply, `/quit` to exit.

use bevy::app::{AppExit, ScheduleRunnerPlugin};
use bevy::log::LogPlugin;
use bevy::prelude::*;
use bevy_quiz_stream::transport::{LLMBackend, LLMBuilder};
use bevy_quiz_stream::{
    ContentBlock, LLMProvider, ParseConfig, QuizSession, QuizSet, QuizSetup, QuizStreamPlugin, Transcript,
    Transports, TurnFinishedEvt, TurnOutcome, TurnStatus, TurnStatusEvt, cancel_turn, quiz, send_user_turn,
    start_quiz,
};
use flume::Receiver;
use std::sync::Arc;
use std::time::Duration;

const SYSTEM_PROMPT: &str = "\
你是一名健身教练，正在主持健康知识问答游戏。每次只出一道题，格式如下：
题目N：题干
A. 选项
B. 选项
C. 选项
D. 选项
请在30秒内选择
用户作答后按此格式评分：
你的回答：X
正确答案：Y
得分：+10分(总分:Z分)
解析：一两句话
最后询问：准备好查看下一题了吗？";

fn normalize_oai_base(base: &str) -> String {
    // provider requires base to include `/v1`
    let b = base.trim_end_matches('/');
    if b.ends_with("/v1") { b.to_string() } else { format!("{}/v1", b) }
}

fn responses_url(base: &str) -> String {
    format!("{}/responses", normalize_oai_base(base))
}

#[derive(Resource)]
struct Stdin(Receiver<String>);

#[derive(Resource)]
struct Session(Entity);

fn main() {
    let base_url = std::env::var("LLM_BASE_URL").unwrap_or_else(|_| "https://api.openai.com".to_string());
    let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
    let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-5".to_string());

    let mut b = LLMBuilder::new()
        .backend(LLMBackend::OpenAI)
        .base_url(responses_url(&base_url))
        .model(model)
        .system(SYSTEM_PROMPT)
        .sliding_window_memory(16);
    if !api_key.is_empty() {
        b = b.api_key(api_key);
    }
    let provider: Arc<dyn LLMProvider> = b.build().expect("build provider").into();

    let (tx, rx) = flume::unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    App::new()
        .add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_millis(16))))
        .add_plugins(LogPlugin::default())
        .insert_resource(Transports::llm(provider))
        .insert_resource(Stdin(rx))
        .add_plugins(QuizStreamPlugin)
        .add_systems(Startup, setup)
        .add_systems(Update, handle_input.before(QuizSet::Submit))
        .add_systems(Update, (on_status, on_finished).after(QuizSet::Drain))
        .run();
}

fn setup(mut commands: Commands) {
    let session = commands.spawn(QuizSession::default()).id();
    commands.insert_resource(Session(session));
    start_quiz(&mut commands, session, QuizSetup::default());
}

fn handle_input(
    mut commands: Commands,
    stdin: Res<Stdin>,
    session: Res<Session>,
    q: Query<&Transcript>,
    mut exit: EventWriter<AppExit>,
) {
    let Ok(transcript) = q.get(session.0) else {
        return;
    };
    for line in stdin.0.try_iter() {
        match line.trim() {
            "" => {}
            "/quit" => {
                exit.write(AppExit::Success);
            }
            "/cancel" => cancel_turn(&mut commands, session.0),
            text => {
                let turn = quiz::normalize_answer(text, transcript.last_assistant_text());
                send_user_turn(&mut commands, session.0, turn);
            }
        }
    }
}

fn on_status(mut evr: EventReader<TurnStatusEvt>) {
    for ev in evr.read() {
        if ev.status == TurnStatus::Streaming {
            println!("…");
        }
    }
}

fn on_finished(mut evr: EventReader<TurnFinishedEvt>, config: Res<ParseConfig>, q: Query<&Transcript>) {
    for ev in evr.read() {
        let Ok(transcript) = q.get(ev.entity) else {
            continue;
        };
        let Some(i) = transcript.latest_assistant() else {
            continue;
        };
        for block in transcript.blocks(i, &config) {
            match block {
                ContentBlock::Option { label, text, .. } => println!("  {label}. {text}"),
                ContentBlock::AnswerResult(f) => println!(
                    "{:?} → {:?} ({})",
                    f.user_answer,
                    f.correct_answer,
                    f.score.as_deref().unwrap_or("-")
                ),
                ContentBlock::Prose { text }
                | ContentBlock::Prompt { text }
                | ContentBlock::QuestionTitle { text }
                | ContentBlock::ContinuePrompt { text } => println!("{text}"),
            }
        }
        if let TurnOutcome::Failed { error, .. } = &ev.outcome {
            warn!(target: "coach", "turn failed: {error}");
        }
    }
}
