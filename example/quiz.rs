//! headless quiz demo against an http quiz backend.
//! - `QUIZ_BASE_URL` (default http://localhost:8080), `QUIZ_TOKEN` (optional bearer).
//! - quiz turns POST `{prompt, chatId}` to `/api/ai/health/qa` (plain text stream).
//! - `/coach <text>` goes to `/api/ai/chat` (event-stream, `data:` lines).
//! - type a letter to answer, `/cancel` to stop a reply, `/quit` to exit.
//!
//! ureq is blocking, so each request runs on its own thread and forwards
//! body chunks over a flume channel.

use bevy::app::{AppExit, ScheduleRunnerPlugin};
use bevy::log::LogPlugin;
use bevy::prelude::*;
use bevy_quiz_stream::{
    BlocksUpdatedEvt, BoxedSource, ChunkSource, ContentBlock, Framing, OptionLabel, ParseConfig, QuizSession, QuizSet,
    QuizSetup, QuizStreamPlugin, Transcript, TransportError, Transport, Transports, TurnFinishedEvt,
    TurnOutcome, cancel_turn, pick_option, quiz, send_user_turn, start_quiz,
};
use async_trait::async_trait;
use flume::{Receiver, Sender};
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const QA_PATH: &str = "/api/ai/health/qa";
const CHAT_PATH: &str = "/api/ai/chat";

// ---------------------- http transport ----------------------

#[derive(Clone, Copy, Debug)]
enum Endpoint {
    Quiz,
    Coach,
}

#[derive(Clone)]
struct HttpTransport {
    base_url: String,
    token: Option<String>,
    chat_id: String,
    endpoint: Endpoint,
}

impl HttpTransport {
    fn request(&self, prompt: &str) -> Result<ureq::http::Response<ureq::Body>, TransportError> {
        let agent = ureq::Agent::new_with_defaults();
        let base = self.base_url.trim_end_matches('/');
        let auth = self.token.as_ref().map(|t| format!("Bearer {t}"));
        let res = match self.endpoint {
            Endpoint::Quiz => {
                let mut req = agent.post(format!("{base}{QA_PATH}")).header("accept", "text/plain");
                if let Some(a) = auth.as_ref() {
                    req = req.header("authorization", a);
                }
                req.send_json(serde_json::json!({ "prompt": prompt, "chatId": self.chat_id }))
            }
            Endpoint::Coach => {
                let mut req = agent
                    .get(format!("{base}{CHAT_PATH}"))
                    .query("prompt", prompt)
                    .query("chatId", &self.chat_id)
                    .header("accept", "text/event-stream");
                if let Some(a) = auth.as_ref() {
                    req = req.header("authorization", a);
                }
                req.call()
            }
        };
        res.map_err(|err| match err {
            ureq::Error::StatusCode(code) => TransportError::Status {
                code,
                reason: ureq::http::StatusCode::from_u16(code)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("unknown")
                    .to_string(),
            },
            other => TransportError::Io(other.to_string()),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn framing(&self) -> Framing {
        match self.endpoint {
            Endpoint::Quiz => Framing::Raw,
            Endpoint::Coach => Framing::EventStream,
        }
    }

    async fn open(&self, user_turn: &str) -> Result<BoxedSource, TransportError> {
        let (head_tx, head_rx) = flume::bounded::<Result<(), TransportError>>(1);
        let (tx, rx) = flume::bounded::<Result<Vec<u8>, TransportError>>(64);
        let stop = Arc::new(AtomicBool::new(false));

        let this = self.clone();
        let prompt = user_turn.to_string();
        let stop_reader = stop.clone();
        std::thread::spawn(move || {
            let res = match this.request(&prompt) {
                Ok(res) => res,
                Err(err) => {
                    let _ = head_tx.send(Err(err));
                    return;
                }
            };
            let _ = head_tx.send(Ok(()));
            pump_body(res.into_body().into_reader(), &tx, &stop_reader);
        });

        match head_rx.recv_async().await {
            Ok(Ok(())) => Ok(Box::new(HttpSource { rx: Some(rx), stop })),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(TransportError::Io("response reader exited".into())),
        }
    }
}

fn pump_body(mut body: impl Read, tx: &Sender<Result<Vec<u8>, TransportError>>, stop: &AtomicBool) {
    let mut buf = [0u8; 1024];
    while !stop.load(Ordering::SeqCst) {
        match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(Ok(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(err) => {
                let _ = tx.send(Err(TransportError::Io(err.to_string())));
                break;
            }
        }
    }
}

struct HttpSource {
    rx: Option<Receiver<Result<Vec<u8>, TransportError>>>,
    stop: Arc<AtomicBool>,
}

#[async_trait]
impl ChunkSource for HttpSource {
    async fn next_chunk(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        // a disconnected channel means the reader thread is done
        self.rx.as_ref()?.recv_async().await.ok()
    }

    async fn cancel(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.rx = None;
    }
}

// ---------------------- stdin ----------------------

#[derive(Resource)]
struct Stdin(Receiver<String>);

fn spawn_stdin_reader() -> Stdin {
    let (tx, rx) = flume::unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    Stdin(rx)
}

// ---------------------- app ----------------------

#[derive(Component)]
struct QuizChat;
#[derive(Component)]
struct CoachChat;

fn main() {
    let base_url = std::env::var("QUIZ_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let token = std::env::var("QUIZ_TOKEN").ok().filter(|t| !t.is_empty());
    let chat_id = format!("demo-{}", std::process::id());

    let transport = |endpoint| {
        Arc::new(HttpTransport {
            base_url: base_url.clone(),
            token: token.clone(),
            chat_id: chat_id.clone(),
            endpoint,
        }) as Arc<dyn Transport>
    };

    App::new()
        .add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_millis(16))))
        .add_plugins(LogPlugin::default())
        .insert_resource(Transports::new(transport(Endpoint::Quiz)).with("coach", transport(Endpoint::Coach)))
        .insert_resource(spawn_stdin_reader())
        .add_plugins(QuizStreamPlugin)
        .add_systems(Startup, setup)
        .add_systems(Update, handle_input.before(QuizSet::Submit))
        // event readers should run after the plugin emits events
        .add_systems(Update, (print_blocks, print_finished).after(QuizSet::Drain))
        .run();
}

fn setup(mut commands: Commands) {
    let quiz_chat = commands.spawn((QuizSession::default(), QuizChat)).id();
    commands.spawn((QuizSession { key: Some("coach".into()) }, CoachChat));
    println!("starting quiz: {}", QuizSetup::default());
    start_quiz(&mut commands, quiz_chat, QuizSetup::default());
}

fn handle_input(
    mut commands: Commands,
    stdin: Res<Stdin>,
    quiz_q: Query<(Entity, &Transcript), With<QuizChat>>,
    coach_q: Query<Entity, With<CoachChat>>,
    mut exit: EventWriter<AppExit>,
) {
    let (Ok((quiz_chat, transcript)), Ok(coach)) = (quiz_q.single(), coach_q.single()) else {
        return;
    };
    for line in stdin.0.try_iter() {
        let line = line.trim();
        match line {
            "" => {}
            "/quit" => {
                exit.write(AppExit::Success);
            }
            "/cancel" => {
                cancel_turn(&mut commands, quiz_chat);
                cancel_turn(&mut commands, coach);
            }
            _ if line.starts_with("/coach ") => {
                send_user_turn(&mut commands, coach, line.trim_start_matches("/coach ").to_string());
            }
            _ => match OptionLabel::from_answer(line) {
                Some(label) if transcript.last_assistant_text().is_some_and(quiz::is_multiple_choice) => {
                    pick_option(&mut commands, quiz_chat, label);
                }
                _ => {
                    let text = quiz::normalize_answer(line, transcript.last_assistant_text());
                    send_user_turn(&mut commands, quiz_chat, text);
                }
            },
        }
    }
}

fn render(block: &ContentBlock) -> String {
    match block {
        ContentBlock::Prose { text } => text.clone(),
        ContentBlock::Prompt { text } => format!("  ⏱ {text}"),
        ContentBlock::QuestionTitle { text } => format!("## {text}"),
        ContentBlock::Option { label, text, selectable } => {
            format!("  [{}] {label}. {text}", if *selectable { ' ' } else { '-' })
        }
        ContentBlock::ContinuePrompt { text } => format!("» {text}"),
        ContentBlock::AnswerResult(fields) => {
            let mark = match fields.is_correct() {
                Some(true) => "✔",
                Some(false) => "✘",
                None => "·",
            };
            let mut out = format!(
                "{mark} your answer: {} | correct: {} | score: {}",
                fields.user_answer.as_deref().unwrap_or("-"),
                fields.correct_answer.as_deref().unwrap_or("-"),
                fields.score.as_deref().unwrap_or("-"),
            );
            if let Some(exp) = &fields.explanation {
                out.push_str(&format!("\n  {exp}"));
            }
            out
        }
    }
}

fn print_blocks(mut evr: EventReader<BlocksUpdatedEvt>) {
    // each update replaces the last one; a terminal ui would redraw in place
    for ev in evr.read() {
        debug!(target: "quiz", "blocks: entity={:?} message={:?} n={}", ev.entity, ev.message, ev.blocks.len());
    }
}

fn print_finished(mut evr: EventReader<TurnFinishedEvt>, config: Res<ParseConfig>, q: Query<&Transcript>) {
    for ev in evr.read() {
        let Ok(transcript) = q.get(ev.entity) else {
            continue;
        };
        if let Some(i) = transcript.latest_assistant() {
            for block in transcript.blocks(i, &config) {
                println!("{}", render(&block));
            }
        }
        match &ev.outcome {
            TurnOutcome::Completed => {}
            TurnOutcome::Cancelled => println!("(cancelled)"),
            TurnOutcome::Failed { error, .. } => warn!(target: "quiz", "turn failed: {error}"),
        }
    }
}
