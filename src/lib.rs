//! bevy_quiz_stream: streamed quiz replies turned into typed display blocks.
//!
//! - a pure chain `buffer → normalized lines → options/answer → blocks`
//!   re-run on the whole buffer for every chunk (see `parse_blocks`).
//! - a per-conversation stream controller with cooperative cancellation.
//! - a bevy plugin that drives turns off the main thread and emits the
//!   latest blocks as events; the `Transcript` component keeps history.
//! - never blocks the main thread: on native turns run on a tiny tokio
//!   runtime; on wasm we use bevy's async pool, which yields to the
//!   browser/event loop.
//!
//! the transport is pluggable (`Transport`); `LlmTransport` wraps any `llm`
//! provider, http endpoints are left to the host.

use bevy::prelude::*;
use bevy::tasks::AsyncComputeTaskPool;
use flume::{Receiver, Sender, TryRecvError};
use std::collections::HashMap;
use std::sync::Arc;

pub mod accumulator;
pub mod answer;
pub mod assemble;
pub mod blocks;
pub mod classify;
pub mod config;
pub mod controller;
pub mod error;
pub mod framer;
pub mod options;
pub mod quiz;
pub mod transcript;
pub mod transport;

pub use assemble::{AssembleContext, ParsedMessage, parse_blocks};
pub use blocks::{AnswerFields, ContentBlock, OptionLabel};
pub use config::ParseConfig;
pub use controller::{CancelHandle, MessageId, StreamController, StreamMsg, Turn, TurnOutcome, TurnStatus};
pub use error::{ConfigError, TransportError};
pub use framer::Framing;
pub use quiz::{Difficulty, QuestionCount, QuizSetup, Topic};
pub use transcript::{Entry, Role, Transcript};
pub use transport::{BoxedSource, ChunkSource, LLMProvider, LlmTransport, Transport};

/// a map of ready-to-use transports.
///
/// - `default`: used when a `QuizSession` doesn't specify a `key`
/// - `per_key`: named transports (e.g. quiz endpoint vs. coach chat)
#[derive(Resource, Clone)]
pub struct Transports {
    pub default: Arc<dyn Transport>,
    pub per_key: HashMap<String, Arc<dyn Transport>>,
}

impl Transports {
    pub fn new(default: Arc<dyn Transport>) -> Self {
        Self { default, per_key: HashMap::new() }
    }
    /// default transport over an `llm` provider.
    pub fn llm(provider: Arc<dyn LLMProvider>) -> Self {
        Self::new(Arc::new(LlmTransport::new(provider)))
    }
    pub fn with(mut self, key: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        self.per_key.insert(key.into(), transport);
        self
    }
    fn get(&self, key: Option<&String>) -> Arc<dyn Transport> {
        key.and_then(|k| self.per_key.get(k)).cloned().unwrap_or_else(|| self.default.clone())
    }
}

/// on native we keep a tiny tokio runtime to drive transport futures.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Resource, Clone)]
pub struct TokioRt(pub Arc<tokio::runtime::Runtime>);

#[cfg(not(target_arch = "wasm32"))]
impl Default for TokioRt {
    fn default() -> Self {
        info!(target: "bevy_quiz_stream", "QuizStream: initializing Tokio multi-thread runtime (native)");
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("tokio runtime");
        Self(Arc::new(rt))
    }
}

/// system ordering so uis can run after we emit events
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum QuizSet {
    /// turn requests, picks and cancellations are handled here
    Submit,
    /// Turn* / BlocksUpdated events are emitted here (in `Update`)
    Drain,
}

/// attach this to an entity that holds one conversation.
#[derive(Component, Clone, Debug, Default)]
#[require(Transcript)]
pub struct QuizSession {
    /// optional key to pick a transport from `Transports::per_key`.
    pub key: Option<String>,
}

/// insert to send a user turn; an in-flight turn is cancelled first.
#[derive(Component, Clone, Debug)]
pub struct TurnRequest {
    pub text: String,
}

/// insert to cancel the in-flight turn of a session.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct CancelTurn;

/// insert to pick an option on the latest assistant message.
#[derive(Component, Clone, Copy, Debug)]
pub struct PickOption(pub OptionLabel);

/// controller state, added on the session's first turn.
#[derive(Component)]
pub struct SessionStream {
    controller: StreamController,
}

impl SessionStream {
    pub fn session(&self) -> u64 {
        self.controller.session()
    }
    pub fn active(&self) -> Option<MessageId> {
        self.controller.active()
    }
}

/// helper to enqueue a user turn on a session entity.
pub fn send_user_turn(commands: &mut Commands, target: Entity, text: impl Into<String>) {
    let text = text.into();
    info!(target: "bevy_quiz_stream", "send_user_turn -> '{}' (len={})", text, text.len());
    commands.entity(target).insert(TurnRequest { text });
}

/// helper to open a game with the given settings.
pub fn start_quiz(commands: &mut Commands, target: Entity, setup: QuizSetup) {
    debug!(target: "bevy_quiz_stream", "start_quiz: {}", setup);
    send_user_turn(commands, target, setup.start_prompt());
}

pub fn cancel_turn(commands: &mut Commands, target: Entity) {
    commands.entity(target).insert(CancelTurn);
}

pub fn pick_option(commands: &mut Commands, target: Entity, label: OptionLabel) {
    commands.entity(target).insert(PickOption(label));
}

#[derive(Event, Debug)]
pub struct TurnStartedEvt {
    pub entity: Entity,
    pub message: MessageId,
    pub user_turn: String,
}
#[derive(Event, Debug)]
pub struct TurnStatusEvt {
    pub entity: Entity,
    pub message: MessageId,
    pub status: TurnStatus,
}
/// the full, current block list for a message (replace, don't append).
#[derive(Event, Debug)]
pub struct BlocksUpdatedEvt {
    pub entity: Entity,
    pub message: MessageId,
    pub blocks: Vec<ContentBlock>,
}
#[derive(Event, Debug)]
pub struct TurnFinishedEvt {
    pub entity: Entity,
    pub message: MessageId,
    pub outcome: TurnOutcome,
}

/// cross-thread inbox; controllers send, main thread drains.
/// bounded to avoid unbounded growth when the frame stalls briefly.
#[derive(Resource, Clone)]
struct StreamInbox {
    tx: Sender<StreamMsg>,
    rx: Receiver<StreamMsg>,
}

impl Default for StreamInbox {
    fn default() -> Self {
        let (tx, rx) = flume::bounded(2048);
        Self { tx, rx }
    }
}

#[derive(Resource, Default)]
struct SessionIds(u64);

/// bevy plugin: wires systems, events, resources.
/// requires a `Transports` resource; `ParseConfig` defaults to
/// `ParseConfig::from_env()` when not inserted.
pub struct QuizStreamPlugin;

impl Plugin for QuizStreamPlugin {
    fn build(&self, app: &mut App) {
        info!(target: "bevy_quiz_stream", "QuizStreamPlugin: build()");
        if app.world().get_resource::<ParseConfig>().is_none() {
            let config = ParseConfig::from_env().unwrap_or_else(|err| {
                warn!(target: "bevy_quiz_stream", "parse config not loaded ({err}); using defaults");
                ParseConfig::default()
            });
            app.insert_resource(config);
        }
        app.init_resource::<StreamInbox>()
            .init_resource::<SessionIds>()
            .add_event::<TurnStartedEvt>()
            .add_event::<TurnStatusEvt>()
            .add_event::<BlocksUpdatedEvt>()
            .add_event::<TurnFinishedEvt>()
            .configure_sets(Update, (QuizSet::Submit, QuizSet::Drain).chain())
            .add_systems(
                Update,
                (apply_option_picks, cancel_turns, spawn_turn_requests)
                    .chain()
                    .in_set(QuizSet::Submit),
            )
            .add_systems(Update, drain_stream_inbox.in_set(QuizSet::Drain));

        #[cfg(not(target_arch = "wasm32"))]
        if app.world().get_resource::<TokioRt>().is_none() {
            app.insert_resource(TokioRt::default());
        }
    }
}

/// turns option picks on the latest message into answer turns.
fn apply_option_picks(
    mut commands: Commands,
    config: Res<ParseConfig>,
    mut q: Query<(Entity, &PickOption, &mut Transcript)>,
) {
    for (e, pick, mut transcript) in q.iter_mut() {
        commands.entity(e).remove::<PickOption>();
        let Some(latest) = transcript.latest_assistant() else {
            continue;
        };
        match transcript.select_option(latest, pick.0, &config) {
            Some(text) => send_user_turn(&mut commands, e, text),
            None => debug!(target: "bevy_quiz_stream", "pick {} ignored: entity={:?}", pick.0, e),
        }
    }
}

fn cancel_turns(mut commands: Commands, mut q: Query<(Entity, Option<&mut SessionStream>), With<CancelTurn>>) {
    for (e, stream) in q.iter_mut() {
        commands.entity(e).remove::<CancelTurn>();
        if let Some(mut stream) = stream {
            stream.controller.cancel();
        }
    }
}

/// starts turns for pending requests and spawns their read loops.
#[allow(clippy::too_many_arguments)]
fn spawn_turn_requests(
    mut commands: Commands,
    transports: Res<Transports>,
    config: Res<ParseConfig>,
    inbox: Res<StreamInbox>,
    mut ids: ResMut<SessionIds>,
    mut q: Query<(Entity, &QuizSession, &TurnRequest, Option<&mut SessionStream>, &mut Transcript)>,
    mut ev_start: EventWriter<TurnStartedEvt>,

    // native-only: small runtime to drive transport futures
    #[cfg(not(target_arch = "wasm32"))] rt: Res<TokioRt>,
) {
    for (e, session, req, stream, mut transcript) in q.iter_mut() {
        commands.entity(e).remove::<TurnRequest>();
        transcript.push_user(req.text.clone());

        let turn = match stream {
            Some(mut stream) => stream.controller.start(req.text.clone()),
            None => {
                let id = ids.0;
                ids.0 += 1;
                let transport = transports.get(session.key.as_ref());
                let mut controller =
                    StreamController::new(id, transport, Arc::new(config.clone()), inbox.tx.clone());
                let turn = controller.start(req.text.clone());
                commands.entity(e).insert(SessionStream { controller });
                turn
            }
        };

        info!(target: "bevy_quiz_stream",
            "spawn_turn_requests: entity={:?} key={:?} message={:?}",
            e, session.key, turn.id()
        );
        ev_start.write(TurnStartedEvt { entity: e, message: turn.id(), user_turn: req.text.clone() });

        let pool = AsyncComputeTaskPool::get();
        #[cfg(not(target_arch = "wasm32"))]
        let rt = rt.0.clone();

        pool.spawn(async move {
            #[cfg(target_arch = "wasm32")]
            {
                turn.run().await;
            }
            #[cfg(not(target_arch = "wasm32"))]
            {
                // native: hand off to tokio so bevy pools stay free.
                let _ = rt.spawn(turn.run()).await;
            }
        })
        .detach();
    }
}

/// drains the inbox, updates transcripts and emits user-facing events.
fn drain_stream_inbox(
    inbox: Res<StreamInbox>,
    mut q: Query<(Entity, &SessionStream, &mut Transcript)>,
    mut ev_status: EventWriter<TurnStatusEvt>,
    mut ev_blocks: EventWriter<BlocksUpdatedEvt>,
    mut ev_done: EventWriter<TurnFinishedEvt>,
) {
    // drain up to a cap per frame to avoid long frames on bursty streams
    const MAX_PER_FRAME: usize = 512;
    let mut drained = Vec::with_capacity(64);
    for _ in 0..MAX_PER_FRAME {
        match inbox.rx.try_recv() {
            Ok(m) => drained.push(m),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
    if drained.is_empty() {
        return;
    }

    let sessions: HashMap<u64, Entity> = q.iter().map(|(e, s, _)| (s.session(), e)).collect();

    // each Blocks msg is a full replacement, so only the newest per message matters
    let mut latest: HashMap<MessageId, (Entity, Vec<ContentBlock>)> = HashMap::new();
    let mut order: Vec<MessageId> = Vec::new();
    let mut statuses: Vec<(Entity, MessageId, TurnStatus)> = Vec::new();
    let mut dones: Vec<(Entity, MessageId, TurnOutcome)> = Vec::new();

    for msg in drained {
        let message = msg.message();
        let Some(&entity) = sessions.get(&message.session) else {
            debug!(target: "bevy_quiz_stream", "dropping message for unknown session: {:?}", message);
            continue;
        };
        if let Ok((_, _, mut transcript)) = q.get_mut(entity) {
            transcript.apply(&msg);
        }
        match msg {
            StreamMsg::Status { status, .. } => statuses.push((entity, message, status)),
            StreamMsg::Blocks { blocks, .. } => {
                if latest.insert(message, (entity, blocks)).is_none() {
                    order.push(message);
                }
            }
            StreamMsg::Finished { outcome, .. } => dones.push((entity, message, outcome)),
        }
    }

    for (entity, message, status) in statuses {
        ev_status.write(TurnStatusEvt { entity, message, status });
    }
    for message in order {
        if let Some((entity, blocks)) = latest.remove(&message) {
            ev_blocks.write(BlocksUpdatedEvt { entity, message, blocks });
        }
    }
    // blocks land before "finished" for the same frame
    for (entity, message, outcome) in dones {
        ev_done.write(TurnFinishedEvt { entity, message, outcome });
    }
}
