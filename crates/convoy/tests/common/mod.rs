//! Common test utilities.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use futures::StreamExt;
use tempfile::TempDir;

use convoy::admission::AdmissionController;
use convoy::assistant::{
    AssistantClient, AssistantError, AssistantRegistry, ChunkStream, MessageChunk,
};
use convoy::command::BuiltinCommands;
use convoy::config::WorkflowConfig;
use convoy::gateway::{
    GatewayManager, GatewayMessageHandler, MessageSender, SendError, StreamingMode, TestGateway,
};
use convoy::model::{Codebase, CommandDef, Conversation};
use convoy::server::{self, AppState};
use convoy::session::{Orchestrator, OrchestratorDeps};
use convoy::store::file::{FileCodebaseStore, FileConversationStore, FileSessionStore};
use convoy::store::{CodebaseStore, ConversationStore, SessionStore};

pub const PLATFORM: &str = "test";

// ============================================================================
// Scripted Assistant
// ============================================================================

/// What the scripted assistant produces for one query.
pub enum Script {
    /// Yield the chunks, then end.
    Chunks(Vec<MessageChunk>),
    /// Yield the chunks, then an error.
    FailAfter(Vec<MessageChunk>),
    /// Yield the chunks, then never end.
    Hang(Vec<MessageChunk>),
}

/// One recorded `query` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub prompt: String,
    pub cwd: PathBuf,
    pub resume: Option<String>,
}

/// Assistant that replays queued scripts in order. An exhausted queue yields
/// an empty stream.
#[derive(Default)]
pub struct ScriptedAssistant {
    scripts: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedAssistant {
    pub fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssistantClient for ScriptedAssistant {
    async fn query(
        &self,
        prompt: &str,
        cwd: &Path,
        resume: Option<&str>,
    ) -> Result<ChunkStream, AssistantError> {
        self.calls.lock().unwrap().push(Call {
            prompt: prompt.to_string(),
            cwd: cwd.to_path_buf(),
            resume: resume.map(str::to_string),
        });

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Chunks(Vec::new()));

        let stream: ChunkStream = match script {
            Script::Chunks(chunks) => Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))),
            Script::FailAfter(chunks) => Box::pin(
                futures::stream::iter(chunks.into_iter().map(Ok)).chain(futures::stream::once(
                    async {
                        Err(AssistantError::Exited {
                            status: "exit status: 1".to_string(),
                        })
                    },
                )),
            ),
            Script::Hang(chunks) => Box::pin(
                futures::stream::iter(chunks.into_iter().map(Ok)).chain(futures::stream::pending()),
            ),
        };
        Ok(stream)
    }
}

// ============================================================================
// Recording Sender
// ============================================================================

/// `MessageSender` that keeps every sent text.
pub struct RecordingSender {
    mode: StreamingMode,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSender {
    pub fn new(mode: StreamingMode) -> Self {
        Self {
            mode,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Texts sent so far, in order.
    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, conversation_id: &str, text: &str) -> Result<(), SendError> {
        self.sent
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), text.to_string()));
        Ok(())
    }

    fn streaming_mode(&self) -> StreamingMode {
        self.mode
    }
}

// ============================================================================
// Harness
// ============================================================================

/// File-backed stores in a temp dir, a scripted assistant and an orchestrator
/// wired to them.
pub struct Harness {
    pub root: TempDir,
    pub conversations: Arc<FileConversationStore>,
    pub sessions: Arc<FileSessionStore>,
    pub codebases: Arc<FileCodebaseStore>,
    pub assistant: Arc<ScriptedAssistant>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_stream_timeout(None)
    }

    pub fn with_stream_timeout(stream_timeout: Option<Duration>) -> Self {
        let root = TempDir::new().unwrap();
        let data = root.path().join("data");

        let conversations = Arc::new(FileConversationStore::new(data.join("conversations")));
        let sessions = Arc::new(FileSessionStore::new(data.join("sessions")));
        let codebases = Arc::new(FileCodebaseStore::new(data.join("codebases")));
        let assistant = Arc::new(ScriptedAssistant::default());

        let mut assistants = AssistantRegistry::new();
        assistants.register("claude", assistant.clone());

        let commands = Arc::new(BuiltinCommands::new(
            conversations.clone(),
            sessions.clone(),
            codebases.clone(),
            root.path().join("workspace"),
        ));

        let orchestrator = Arc::new(Orchestrator::new(OrchestratorDeps {
            conversations: conversations.clone(),
            sessions: sessions.clone(),
            codebases: codebases.clone(),
            commands,
            assistants,
            default_assistant: "claude".to_string(),
            workflow: WorkflowConfig::default(),
            stream_timeout,
        }));

        Self {
            root,
            conversations,
            sessions,
            codebases,
            assistant,
            orchestrator,
        }
    }

    /// Create a codebase rooted at `<tmp>/repo` and link it to the conversation.
    pub async fn link_codebase(&self, conversation_key: &str) -> Codebase {
        let repo = self.root.path().join("repo");
        tokio::fs::create_dir_all(&repo).await.unwrap();

        let codebase = Codebase::new("repo", &repo);
        self.codebases.save(&codebase).await.unwrap();

        let mut conversation = self.conversation(conversation_key).await;
        conversation.codebase_id = Some(codebase.id.clone());
        conversation.touch();
        self.conversations.save(&conversation).await.unwrap();
        codebase
    }

    /// Write a command file under the codebase directory and register it.
    pub async fn add_command(&self, codebase: &Codebase, name: &str, path: &str, body: &str) {
        let file = codebase.default_cwd.join(path);
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(&file, body).await.unwrap();
        self.register_command(codebase, name, path).await;
    }

    /// Register a command without creating its file.
    pub async fn register_command(&self, codebase: &Codebase, name: &str, path: &str) {
        let mut stored = self.codebases.get(&codebase.id).await.unwrap().unwrap();
        stored
            .commands
            .insert(name.to_string(), CommandDef::new(path));
        self.codebases.save(&stored).await.unwrap();
    }

    pub async fn conversation(&self, conversation_key: &str) -> Conversation {
        self.conversations
            .get_or_create(PLATFORM, conversation_key, "claude")
            .await
            .unwrap()
    }
}

// ============================================================================
// HTTP App
// ============================================================================

/// A full app: orchestrator behind admission control, a test gateway and the
/// HTTP router.
pub struct TestApp {
    pub harness: Harness,
    pub state: AppState,
    pub router: Router,
}

pub async fn test_app(mode: StreamingMode) -> TestApp {
    let harness = Harness::new();

    let admission = AdmissionController::new(4);
    let gateways = GatewayManager::new();
    let handler = GatewayMessageHandler::new(
        harness.orchestrator.clone(),
        admission.clone(),
        gateways.clone(),
    );
    gateways.set_handler(Arc::new(handler)).await;
    let test_gateway = TestGateway::start(&gateways, mode).await;

    let state = AppState {
        admission,
        gateways,
        test_gateway: Some(test_gateway),
    };
    let router = server::build_app(state.clone(), 30);

    TestApp {
        harness,
        state,
        router,
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
