//! Integration tests for workflow execution
//!
//! These tests drive the public run/resume API end to end using mock
//! collaborators.

use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use waypoint_rs::engine::interrupt::{InterruptConfig, Validation};
use waypoint_rs::engine::{
    step_fn, CancellationToken, CheckpointStore, Engine, EngineError, Graph,
    JsonFileCheckpointStore, MemoryCheckpointStore, RunStatus, StepContext, StepError,
    WorkflowState, END,
};
use waypoint_rs::waypoint::config::{CollaborationSettings, OutreachSettings};
use waypoint_rs::waypoint::workflow::{Builder, StepRegistry, WorkflowLoader};
use waypoint_rs::waypoint::workflows::collaboration::{self, SearchHit, SearchProvider};
use waypoint_rs::waypoint::workflows::outreach::{self, MessageSender};

// ============================================================================
// Mock Components
// ============================================================================

/// Sender that records every delivered message
#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSender {
    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, handle: &str, _profile_url: &str, text: &str) -> Result<(), StepError> {
        self.sent
            .lock()
            .unwrap()
            .push((handle.to_string(), text.to_string()));
        Ok(())
    }
}

/// Search provider serving one fixed page and counting requests
struct MockSearch {
    hits: Vec<SearchHit>,
    calls: Mutex<usize>,
}

impl MockSearch {
    fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn search(&self, _query: &str, _count: usize, page: usize) -> Result<Vec<SearchHit>, StepError> {
        *self.calls.lock().unwrap() += 1;
        if page == 0 {
            Ok(self.hits.clone())
        } else {
            Ok(Vec::new())
        }
    }
}

fn memory_store() -> Arc<dyn CheckpointStore> {
    Arc::new(MemoryCheckpointStore::new())
}

fn outreach_engine(sender: Arc<RecordingSender>) -> Engine {
    let graph = outreach::build(&OutreachSettings::default(), sender).unwrap();
    Engine::new(graph, memory_store())
}

const OUTREACH_INPUT: &str = "profiles: alice, @bob; message: Hi {handle}; delay: 0";

/// Ask for a name, then greet
fn greeter() -> Graph {
    Graph::builder()
        .interrupt(
            InterruptConfig::new("name", "ask_name")
                .message("What is your name?")
                .validator(|raw: &str, _ctx: &serde_json::Map<String, serde_json::Value>| {
                    if raw.trim().is_empty() {
                        Validation::reject("Name cannot be empty")
                    } else {
                        Validation::accept_with("name", raw.trim())
                    }
                }),
        )
        .human_interaction_step("name")
        .step(
            "greet",
            step_fn(|mut state: WorkflowState, _ctx: StepContext| async move {
                let name = state.get_str("name").unwrap_or_default().to_string();
                state.update("greeting", json!(format!("Hello, {}!", name)))?;
                Ok(state)
            }),
        )
        .entry("ask_name")
        .edge("ask_name", "greet")
        .edge("greet", END)
        .build()
        .unwrap()
}

// ============================================================================
// Outreach Workflow Tests
// ============================================================================

#[tokio::test]
async fn test_outreach_confirm_edit_send_skip() {
    let sender = Arc::new(RecordingSender::default());
    let engine = outreach_engine(sender.clone());

    let result = engine.run(OUTREACH_INPUT, Some("dm-1".to_string())).await;
    assert_eq!(result.status, RunStatus::AwaitingInput);
    assert_eq!(result.message.as_deref(), Some("Please confirm Instagram login"));
    let data = result.data.unwrap();
    assert_eq!(data.kind, "login_confirmation");
    assert_eq!(data.options, vec!["Yes, I've logged in", "Cancel"]);

    let result = engine.resume("Yes, I've logged in", "dm-1").await.unwrap();
    assert_eq!(result.status, RunStatus::AwaitingInput);
    assert_eq!(result.message.as_deref(), Some("Confirm or edit message"));
    let data = result.data.unwrap();
    assert_eq!(data.get("handle"), Some(json!("alice")));
    assert_eq!(data.get("message_text"), Some(json!("Hi alice")));

    // free text replaces the message and asks again
    let result = engine.resume("Hey alice, loved the last reel", "dm-1").await.unwrap();
    assert_eq!(result.status, RunStatus::AwaitingInput);
    assert_eq!(result.current_step.as_deref(), Some("message_confirmation"));
    assert_eq!(
        result.data.unwrap().get("message_text"),
        Some(json!("Hey alice, loved the last reel"))
    );

    let result = engine.resume("Send message", "dm-1").await.unwrap();
    assert_eq!(result.status, RunStatus::AwaitingInput);
    assert_eq!(result.data.unwrap().get("handle"), Some(json!("bob")));

    let result = engine.resume("skip", "dm-1").await.unwrap();
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(
        result.get("automation_result"),
        Some(&json!({
            "success": true,
            "processed": 2,
            "successful": 1,
            "message": "Successfully processed 2 profiles. Successfully messaged: 1"
        }))
    );
    assert_eq!(
        sender.sent(),
        vec![(
            "alice".to_string(),
            "Hey alice, loved the last reel".to_string()
        )]
    );
}

#[tokio::test]
async fn test_outreach_invalid_answer_reprompts_without_advancing() {
    let engine = outreach_engine(Arc::new(RecordingSender::default()));
    engine.run(OUTREACH_INPUT, Some("dm-2".to_string())).await;

    let result = engine.resume("maybe later", "dm-2").await.unwrap();
    assert_eq!(result.status, RunStatus::AwaitingInput);
    assert_eq!(
        result.message.as_deref(),
        Some("Please confirm with 'Yes' or cancel with 'No'")
    );
    let data = result.data.unwrap();
    assert_eq!(data.kind, "login_confirmation");
    assert_eq!(data.get("error"), Some(json!(true)));
    assert_eq!(data.get("previous_input"), Some(json!("maybe later")));
    assert_eq!(
        data.get("error_message"),
        Some(json!("Please confirm with 'Yes' or cancel with 'No'"))
    );

    let checkpoint = engine.snapshot("dm-2").await.unwrap();
    assert_eq!(checkpoint.suspended_step.as_deref(), Some("login_confirmation"));
    assert_eq!(checkpoint.state.current_step, "login_confirmation");

    // a valid answer afterwards continues normally
    let result = engine.resume("y", "dm-2").await.unwrap();
    assert_eq!(result.current_step.as_deref(), Some("message_confirmation"));
}

#[tokio::test]
async fn test_outreach_login_declined() {
    let engine = outreach_engine(Arc::new(RecordingSender::default()));
    engine.run(OUTREACH_INPUT, Some("dm-3".to_string())).await;

    let result = engine.resume("no", "dm-3").await.unwrap();
    assert_eq!(result.status, RunStatus::Cancelled);
    assert_eq!(result.error.as_deref(), Some("Login cancelled by user"));
    assert_eq!(result.get("login_confirmed"), Some(&json!(false)));
}

#[tokio::test]
async fn test_outreach_quit_runs_cancel_branch() {
    let sender = Arc::new(RecordingSender::default());
    let engine = outreach_engine(sender.clone());
    engine.run(OUTREACH_INPUT, Some("dm-4".to_string())).await;
    engine.resume("yes", "dm-4").await.unwrap();

    let result = engine.resume("quit", "dm-4").await.unwrap();
    assert_eq!(result.status, RunStatus::Cancelled);
    assert_eq!(
        result.get("automation_result").unwrap()["message"],
        json!("Workflow cancelled by user")
    );
    assert!(sender.sent().is_empty());
}

#[tokio::test]
async fn test_outreach_without_profiles_fails() {
    let engine = outreach_engine(Arc::new(RecordingSender::default()));
    let result = engine.run("message: hello", None).await;
    assert_eq!(result.status, RunStatus::Error);
    assert!(result.error.unwrap().starts_with("No valid Instagram profiles"));
}

// ============================================================================
// Cancellation Tests
// ============================================================================

#[tokio::test]
async fn test_cancel_command_ends_any_active_thread() {
    let engine = outreach_engine(Arc::new(RecordingSender::default()));
    engine.run(OUTREACH_INPUT, Some("dm-5".to_string())).await;
    engine.resume("yes", "dm-5").await.unwrap();

    let result = engine.resume("  CANCEL ", "dm-5").await.unwrap();
    assert_eq!(result.status, RunStatus::Cancelled);
    assert_eq!(result.message.as_deref(), Some("Workflow cancelled by user"));

    let checkpoint = engine.snapshot("dm-5").await.unwrap();
    assert!(checkpoint.state.is_terminal());

    // finished threads cannot be resumed
    let err = engine.resume("send", "dm-5").await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}

#[tokio::test]
async fn test_cancel_unknown_thread_is_harmless() {
    let engine = Engine::new(greeter(), memory_store());
    let result = engine.resume("cancel", "never-started").await.unwrap();
    assert_eq!(result.status, RunStatus::Cancelled);
    assert!(engine.snapshot("never-started").await.is_err());
}

#[tokio::test]
async fn test_cancelled_token_is_distinct_from_error() {
    let graph = collaboration::build(
        &CollaborationSettings::default(),
        Arc::new(MockSearch::new(Vec::new())),
    )
    .unwrap();
    let engine = Engine::new(graph, memory_store());

    let token = CancellationToken::new();
    token.request_cancel();
    let result = engine
        .run_with_token("niche: yoga", Some("c-1".to_string()), token)
        .await;
    assert_eq!(result.status, RunStatus::Cancelled);
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_step_polling_token_observes_cancel() {
    let graph = Graph::builder()
        .step(
            "long_wait",
            step_fn(|state: WorkflowState, ctx: StepContext| async move {
                ctx.cancel_token()
                    .sleep(std::time::Duration::from_secs(60))
                    .await?;
                Ok(state)
            }),
        )
        .entry("long_wait")
        .edge("long_wait", END)
        .build()
        .unwrap();
    let engine = Arc::new(Engine::new(graph, memory_store()));

    let runner = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run("", Some("slow".to_string())).await })
    };

    // wait until the run has registered its token
    let mut signalled = false;
    for _ in 0..100 {
        if engine.cancel("slow").await {
            signalled = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(signalled);

    let result = runner.await.unwrap();
    assert_eq!(result.status, RunStatus::Cancelled);
}

// ============================================================================
// Collaboration Workflow Tests
// ============================================================================

#[tokio::test]
async fn test_collaboration_collects_unique_handles() {
    let hits = vec![
        SearchHit {
            title: "Berlin Yoga".to_string(),
            url: "https://www.instagram.com/berlin.yoga/".to_string(),
            description: "DM for collabs or email hi@berlinyoga.de".to_string(),
        },
        SearchHit {
            title: "Berlin Yoga again".to_string(),
            url: "https://instagram.com/berlin.yoga".to_string(),
            description: String::new(),
        },
        SearchHit {
            title: "A post".to_string(),
            url: "https://instagram.com/p/xyz".to_string(),
            description: String::new(),
        },
    ];
    let provider = Arc::new(MockSearch::new(hits));
    let graph = collaboration::build(&CollaborationSettings::default(), provider.clone()).unwrap();
    let engine = Engine::new(graph, memory_store());

    let result = engine
        .run("niche: yoga; location: Berlin; max_pages: 3", None)
        .await;
    assert_eq!(result.status, RunStatus::Completed);

    let profiles = result.get("collaboration_result").unwrap()["profiles"]
        .as_array()
        .cloned()
        .unwrap();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0]["handle"], json!("berlin.yoga"));
    assert_eq!(profiles[0]["profile_url"], json!("https://instagram.com/berlin.yoga"));
    assert_eq!(
        profiles[0]["contact_info"],
        json!({"email": "hi@berlinyoga.de", "method": "DM on Instagram"})
    );

    // short first page ends each query's paging
    assert_eq!(*provider.calls.lock().unwrap(), 2);
}

#[tokio::test]
async fn test_collaboration_requires_niche() {
    let graph = collaboration::build(
        &CollaborationSettings::default(),
        Arc::new(MockSearch::new(Vec::new())),
    )
    .unwrap();
    let engine = Engine::new(graph, memory_store());

    let result = engine.run("location: Berlin", None).await;
    assert_eq!(result.status, RunStatus::Error);
    assert_eq!(result.error.as_deref(), Some("Niche is required"));
}

// ============================================================================
// Checkpoint Contract Tests
// ============================================================================

#[tokio::test]
async fn test_resume_replays_suspended_step_idempotently() {
    let store = memory_store();
    let engine = Engine::new(greeter(), store.clone());

    engine.run("", Some("g-1".to_string())).await;
    let suspended = engine.snapshot("g-1").await.unwrap();

    let first = engine.resume("Ada", "g-1").await.unwrap();
    assert_eq!(first.status, RunStatus::Completed);
    let first_state = engine.snapshot("g-1").await.unwrap().state;

    // put the suspended checkpoint back and answer again
    store.save(suspended).await.unwrap();
    let second = engine.resume("Ada", "g-1").await.unwrap();
    let second_state = engine.snapshot("g-1").await.unwrap().state;

    assert_eq!(first, second);
    assert_eq!(first_state.to_json(), second_state.to_json());
}

#[tokio::test]
async fn test_file_store_survives_engine_restart() {
    let dir = tempfile::tempdir().unwrap();

    let engine = Engine::new(
        greeter(),
        Arc::new(JsonFileCheckpointStore::new(dir.path()).unwrap()),
    );
    let result = engine.run("", Some("g-2".to_string())).await;
    assert_eq!(result.status, RunStatus::AwaitingInput);
    let saved = engine.snapshot("g-2").await.unwrap();
    drop(engine);

    let restarted = Engine::new(
        greeter(),
        Arc::new(JsonFileCheckpointStore::new(dir.path()).unwrap()),
    );
    let loaded = restarted.snapshot("g-2").await.unwrap();
    assert_eq!(loaded.state, saved.state);
    assert_eq!(loaded.interrupt, saved.interrupt);

    let result = restarted.resume("Grace", "g-2").await.unwrap();
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.get("greeting"), Some(&json!("Hello, Grace!")));
}

#[tokio::test]
async fn test_validator_rejection_keeps_checkpoint_suspended() {
    let engine = Engine::new(greeter(), memory_store());
    engine.run("", Some("g-3".to_string())).await;

    let result = engine.resume("   ", "g-3").await.unwrap();
    assert_eq!(result.status, RunStatus::AwaitingInput);
    assert_eq!(result.message.as_deref(), Some("Name cannot be empty"));

    let checkpoint = engine.snapshot("g-3").await.unwrap();
    assert_eq!(checkpoint.suspended_step.as_deref(), Some("ask_name"));
    assert!(checkpoint.state.get("name").is_none());
}

// ============================================================================
// Routing and Concurrency Tests
// ============================================================================

#[tokio::test]
async fn test_first_matching_branch_wins() {
    let mark = |label: &'static str| {
        step_fn(move |mut state: WorkflowState, _ctx: StepContext| async move {
            state.update("visited", json!(label))?;
            Ok(state)
        })
    };
    let graph = Graph::builder()
        .step(
            "score",
            step_fn(|mut state: WorkflowState, _ctx: StepContext| async move {
                state.update("score", json!(10))?;
                Ok(state)
            }),
        )
        .step("high", mark("high"))
        .step("positive", mark("positive"))
        .step("low", mark("low"))
        .entry("score")
        .branches(
            "score",
            [("score > 5", "high"), ("score > 0", "positive")],
            Some("low"),
        )
        .edge("high", END)
        .edge("positive", END)
        .edge("low", END)
        .build()
        .unwrap();
    let engine = Engine::new(graph, memory_store());

    let result = engine.run("", None).await;
    assert_eq!(result.get("visited"), Some(&json!("high")));
}

#[tokio::test]
async fn test_distinct_threads_run_concurrently() {
    let engine = Arc::new(Engine::new(greeter(), memory_store()));

    let runs = (0..8).map(|i| {
        let engine = engine.clone();
        async move {
            let thread_id = format!("user-{}", i);
            let started = engine.run("", Some(thread_id.clone())).await;
            assert_eq!(started.status, RunStatus::AwaitingInput);
            engine.resume(&format!("name{}", i), &thread_id).await.unwrap()
        }
    });
    let results = futures::future::join_all(runs).await;

    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.thread_id, format!("user-{}", i));
        assert_eq!(
            result.get("greeting"),
            Some(&json!(format!("Hello, name{}!", i)))
        );
    }
}

#[tokio::test]
async fn test_max_steps_stops_runaway_loop() {
    let graph = Graph::builder()
        .step(
            "spin",
            step_fn(|state: WorkflowState, _ctx: StepContext| async move { Ok(state) }),
        )
        .entry("spin")
        .route("spin", |_state: &WorkflowState| "spin".to_string())
        .build()
        .unwrap();
    let engine = Engine::new(graph, memory_store()).with_max_steps(10);

    let result = engine.run("", None).await;
    assert_eq!(result.status, RunStatus::Error);
    assert_eq!(
        result.error.as_deref(),
        Some("workflow exceeded the maximum of 10 steps")
    );
}

// ============================================================================
// YAML Workflow Tests
// ============================================================================

const CONFIRM_DEMO: &str = r#"
name: confirm-demo
description: Ask for confirmation before finishing
entry: prepare
state:
  notes: { type: array, reducer: append }
steps:
  - id: prepare
    uses: set
    with: { draft: "hello", notes: "drafted" }
  - id: confirm
    interrupt: confirm
  - id: finish
    uses: set
    with: { notes: "finished" }
edges:
  - from: prepare
    to: confirm
  - from: confirm
    branches:
      - when: "confirmed == true"
        to: finish
    otherwise: __end__
  - from: finish
    to: __end__
interrupts:
  confirm:
    message: "Confirm?"
    instructions: "Answer yes or no"
    choices:
      yes: { confirmed: true }
      no: { confirmed: false, status: cancelled }
"#;

async fn yaml_engine() -> Engine {
    let def = WorkflowLoader::parse_yaml(CONFIRM_DEMO).unwrap();
    let graph = Builder::new(StepRegistry::with_builtins().await)
        .build(&def)
        .await
        .unwrap();
    Engine::new(graph, memory_store())
}

#[tokio::test]
async fn test_yaml_workflow_confirmed() {
    let engine = yaml_engine().await;

    let result = engine.run("", Some("y-1".to_string())).await;
    assert_eq!(result.status, RunStatus::AwaitingInput);
    assert_eq!(result.message.as_deref(), Some("Confirm?"));
    assert_eq!(result.data.unwrap().options, vec!["no", "yes"]);

    let result = engine.resume("Yes", "y-1").await.unwrap();
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.get("draft"), Some(&json!("hello")));
    assert_eq!(result.get("notes"), Some(&json!(["drafted", "finished"])));
}

#[tokio::test]
async fn test_yaml_workflow_declined() {
    let engine = yaml_engine().await;
    engine.run("", Some("y-2".to_string())).await;

    let result = engine.resume("no", "y-2").await.unwrap();
    assert_eq!(result.status, RunStatus::Cancelled);
    assert_eq!(result.get("confirmed"), Some(&json!(false)));

    let result = engine.resume("perhaps", "y-2").await;
    assert!(result.is_err());
}
