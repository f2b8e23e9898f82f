use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use courier_common::{ChatId, ConversationTurn, Error, UserId};
use courier_engine::{
    ChatEngine, ChatTransport, EditOutcome, MessageHandle, TextFormat, TransportError, TurnError,
    TurnLimits,
};
use courier_history::HistoryStore;
use courier_providers::{BackendRegistry, ChatBackend, FragmentStream, ProviderFamily};
use futures::stream;
use futures::StreamExt as _;

#[derive(Debug, Clone, PartialEq)]
enum Op {
    Send(String),
    Edit(i64, String),
}

#[derive(Default)]
struct RecordingTransport {
    ops: Mutex<Vec<Op>>,
    /// When set, edits answer "not modified" instead of "edited".
    edits_report_not_modified: bool,
}

impl RecordingTransport {
    fn not_modified() -> Self {
        Self {
            edits_report_not_modified: true,
            ..Default::default()
        }
    }

    fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    fn sends(&self) -> usize {
        self.ops()
            .iter()
            .filter(|op| matches!(op, Op::Send(_)))
            .count()
    }

    /// Final text of each message, in creation order.
    fn final_payloads(&self) -> Vec<String> {
        let mut order = Vec::new();
        let mut texts: HashMap<i64, String> = HashMap::new();
        let mut next_handle = 0;
        for op in self.ops() {
            match op {
                Op::Send(text) => {
                    order.push(next_handle);
                    texts.insert(next_handle, text);
                    next_handle += 1;
                }
                Op::Edit(handle, text) => {
                    texts.insert(handle, text);
                }
            }
        }
        order
            .into_iter()
            .map(|handle| texts.remove(&handle).unwrap())
            .collect()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send(
        &self,
        _chat: ChatId,
        text: &str,
        _format: TextFormat,
    ) -> Result<MessageHandle, TransportError> {
        let mut ops = self.ops.lock().unwrap();
        let handle = ops.iter().filter(|op| matches!(op, Op::Send(_))).count() as i64;
        ops.push(Op::Send(text.to_string()));
        Ok(MessageHandle(handle))
    }

    async fn edit(
        &self,
        _chat: ChatId,
        handle: MessageHandle,
        text: &str,
        _format: TextFormat,
    ) -> Result<EditOutcome, TransportError> {
        self.ops
            .lock()
            .unwrap()
            .push(Op::Edit(handle.0, text.to_string()));
        if self.edits_report_not_modified {
            Ok(EditOutcome::NotModified)
        } else {
            Ok(EditOutcome::Edited)
        }
    }

    async fn notify_typing(&self, _chat: ChatId) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Replays a fixed fragment script and records the history length it was
/// opened with.
struct ScriptedBackend {
    script: Vec<Result<String, String>>,
    seen_history: Mutex<Vec<usize>>,
}

impl ScriptedBackend {
    fn new(script: Vec<Result<String, String>>) -> Self {
        Self {
            script,
            seen_history: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn backend_id(&self) -> &str {
        "scripted"
    }

    async fn open(
        &self,
        _model: &str,
        _prompt: &str,
        history: &[ConversationTurn],
    ) -> courier_common::Result<FragmentStream> {
        self.seen_history.lock().unwrap().push(history.len());
        let items: Vec<courier_common::Result<String>> = self
            .script
            .iter()
            .cloned()
            .map(|item| item.map_err(Error::Provider))
            .collect();
        Ok(Box::pin(stream::iter(items)))
    }
}

/// Yields one fragment, then hangs forever without ending the stream.
struct StallingBackend;

#[async_trait]
impl ChatBackend for StallingBackend {
    fn backend_id(&self) -> &str {
        "stalling"
    }

    async fn open(
        &self,
        _model: &str,
        _prompt: &str,
        _history: &[ConversationTurn],
    ) -> courier_common::Result<FragmentStream> {
        let items: Vec<courier_common::Result<String>> = vec![Ok("Hello".to_string())];
        Ok(Box::pin(stream::iter(items).chain(stream::pending())))
    }
}

const MODEL: &str = "scripted-model";

struct Fixture {
    engine: ChatEngine,
    transport: Arc<RecordingTransport>,
    backend: Arc<ScriptedBackend>,
    history: Arc<HistoryStore>,
}

fn fixture(script: Vec<Result<String, String>>, limits: TurnLimits) -> Fixture {
    fixture_with(script, limits, RecordingTransport::default())
}

fn fixture_with(
    script: Vec<Result<String, String>>,
    limits: TurnLimits,
    transport: RecordingTransport,
) -> Fixture {
    let backend = Arc::new(ScriptedBackend::new(script));
    let registry = Arc::new(BackendRegistry::from_slots(vec![(
        ProviderFamily::OpenAi,
        vec![MODEL.to_string()],
        Some(backend.clone() as Arc<dyn ChatBackend>),
    )]));
    let history = Arc::new(HistoryStore::in_memory(20).unwrap());
    let transport = Arc::new(transport);
    let engine = ChatEngine::new(
        registry,
        history.clone(),
        transport.clone(),
        Some(MODEL.to_string()),
        limits,
    );
    Fixture {
        engine,
        transport,
        backend,
        history,
    }
}

#[tokio::test]
async fn turn_delivers_full_answer_and_commits_it() {
    let fx = fixture(
        vec![Ok("Hello".into()), Ok(" world".into())],
        TurnLimits::default(),
    );

    let outcome = fx
        .engine
        .run_turn(UserId(1), ChatId(10), "greet me")
        .await
        .unwrap();

    assert!(outcome.message_sent);
    assert!(outcome.committed);
    assert!(!outcome.truncated);
    assert_eq!(outcome.response_chars, 11);
    assert_eq!(fx.transport.final_payloads(), vec!["Hello world".to_string()]);

    let turns = fx.history.read(UserId(1)).unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].prompt, "greet me");
    assert_eq!(turns[0].response, "Hello world");
}

#[tokio::test]
async fn stream_failure_flushes_and_commits_the_partial_answer() {
    let fx = fixture(
        vec![
            Ok("Hello".into()),
            Ok(" wor".into()),
            Err("connection dropped".into()),
        ],
        TurnLimits::default(),
    );

    let outcome = fx
        .engine
        .run_turn(UserId(1), ChatId(10), "greet me")
        .await
        .unwrap();

    assert!(outcome.truncated);
    assert!(outcome.committed);
    assert_eq!(fx.transport.final_payloads(), vec!["Hello wor".to_string()]);
    assert_eq!(fx.history.read(UserId(1)).unwrap()[0].response, "Hello wor");
}

#[tokio::test]
async fn empty_whole_answer_is_an_error_with_no_send_and_no_commit() {
    let fx = fixture(vec![Ok(String::new())], TurnLimits::default());

    let err = fx
        .engine
        .run_turn(UserId(1), ChatId(10), "say nothing")
        .await
        .unwrap_err();

    assert!(matches!(err, TurnError::EmptyResponse));
    assert!(fx.transport.ops().is_empty());
    assert!(fx.history.read(UserId(1)).unwrap().is_empty());
}

#[tokio::test]
async fn failure_before_any_content_is_a_stream_error() {
    let fx = fixture(vec![Err("boom".into())], TurnLimits::default());

    let err = fx
        .engine
        .run_turn(UserId(1), ChatId(10), "hi")
        .await
        .unwrap_err();

    assert!(matches!(err, TurnError::Stream(_)));
    assert!(fx.transport.ops().is_empty());
}

#[tokio::test]
async fn long_answer_is_split_without_gaps_or_duplicates() {
    let answer = "abcdefghij".repeat(25); // 250 chars
    let fx = fixture(
        vec![Ok(answer.clone())],
        TurnLimits {
            message_ceiling: 100,
            ..Default::default()
        },
    );

    let outcome = fx
        .engine
        .run_turn(UserId(1), ChatId(10), "long answer")
        .await
        .unwrap();

    let payloads = fx.transport.final_payloads();
    assert_eq!(payloads.len(), 3);
    assert!(payloads.iter().all(|p| p.chars().count() <= 100));
    assert_eq!(payloads.concat(), answer);
    assert_eq!(outcome.response_chars, 250);
    assert_eq!(fx.history.read(UserId(1)).unwrap()[0].response, answer);
}

#[tokio::test]
async fn not_modified_edits_never_fail_the_turn() {
    let fx = fixture_with(
        vec![Ok("a".repeat(30)), Ok("b".repeat(30))],
        TurnLimits {
            message_ceiling: 100,
            ..Default::default()
        },
        RecordingTransport::not_modified(),
    );

    let outcome = fx
        .engine
        .run_turn(UserId(1), ChatId(10), "hi")
        .await
        .unwrap();

    assert!(outcome.committed);
    assert_eq!(outcome.response_chars, 60);
    assert_eq!(fx.transport.sends(), 1);
}

#[tokio::test]
async fn switching_models_clears_only_the_switching_user() {
    let fx = fixture(vec![Ok("answer".into())], TurnLimits::default());

    fx.engine.run_turn(UserId(1), ChatId(10), "q1").await.unwrap();
    fx.engine.run_turn(UserId(2), ChatId(20), "q2").await.unwrap();

    fx.engine
        .switch_active_model(UserId(1), MODEL)
        .await
        .unwrap();

    assert!(fx.history.read(UserId(1)).unwrap().is_empty());
    assert_eq!(fx.history.read(UserId(2)).unwrap().len(), 1);
    assert_eq!(fx.engine.active_model().await.as_deref(), Some(MODEL));
}

#[tokio::test]
async fn switching_to_an_unknown_model_changes_nothing() {
    let fx = fixture(vec![Ok("answer".into())], TurnLimits::default());
    fx.engine.run_turn(UserId(1), ChatId(10), "q1").await.unwrap();

    let err = fx
        .engine
        .switch_active_model(UserId(1), "made-up-model")
        .await
        .unwrap_err();

    assert!(matches!(err, TurnError::UnknownModel(_)));
    assert_eq!(fx.history.read(UserId(1)).unwrap().len(), 1);
    assert_eq!(fx.engine.active_model().await.as_deref(), Some(MODEL));
}

#[tokio::test]
async fn committed_turns_feed_the_next_turn_as_context() {
    let fx = fixture(vec![Ok("answer".into())], TurnLimits::default());

    fx.engine.run_turn(UserId(1), ChatId(10), "first").await.unwrap();
    fx.engine.run_turn(UserId(1), ChatId(10), "second").await.unwrap();

    assert_eq!(*fx.backend.seen_history.lock().unwrap(), vec![0, 1]);
}

#[tokio::test]
async fn no_default_model_means_no_backend_configured() {
    let registry = Arc::new(BackendRegistry::from_slots(vec![]));
    let history = Arc::new(HistoryStore::in_memory(20).unwrap());
    let transport = Arc::new(RecordingTransport::default());
    let engine = ChatEngine::new(
        registry,
        history,
        transport.clone(),
        None,
        TurnLimits::default(),
    );

    let err = engine.run_turn(UserId(1), ChatId(10), "hi").await.unwrap_err();
    assert!(matches!(err, TurnError::NoBackendConfigured));
    assert!(transport.ops().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stalled_stream_hits_the_deadline_and_commits_the_partial() {
    let backend = Arc::new(StallingBackend);
    let registry = Arc::new(BackendRegistry::from_slots(vec![(
        ProviderFamily::OpenAi,
        vec![MODEL.to_string()],
        Some(backend as Arc<dyn ChatBackend>),
    )]));
    let history = Arc::new(HistoryStore::in_memory(20).unwrap());
    let transport = Arc::new(RecordingTransport::default());
    let engine = ChatEngine::new(
        registry,
        history.clone(),
        transport.clone(),
        Some(MODEL.to_string()),
        TurnLimits {
            max_stream_duration: Duration::from_secs(5),
            ..Default::default()
        },
    );

    // The paused clock advances as soon as the stalled stream leaves the
    // runtime idle, so the deadline fires without real waiting.
    let outcome = engine.run_turn(UserId(1), ChatId(10), "hi").await.unwrap();

    assert!(outcome.truncated);
    assert!(outcome.committed);
    assert_eq!(transport.final_payloads(), vec!["Hello".to_string()]);
    assert_eq!(history.read(UserId(1)).unwrap()[0].response, "Hello");
}

#[tokio::test]
async fn oversized_response_is_cut_at_the_cap_and_committed() {
    let fx = fixture(
        vec![Ok("x".repeat(60)), Ok("y".repeat(60))],
        TurnLimits {
            message_ceiling: 1000,
            max_response_chars: 100,
            ..Default::default()
        },
    );

    let outcome = fx
        .engine
        .run_turn(UserId(1), ChatId(10), "hi")
        .await
        .unwrap();

    assert!(outcome.truncated);
    assert!(outcome.committed);
    // Everything consumed before the cap tripped is still delivered.
    assert_eq!(outcome.response_chars, 120);
}
