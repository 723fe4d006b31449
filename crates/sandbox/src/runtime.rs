//! The sandbox provider contract and the idempotent-destroy wrapper.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ha_domain::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Kinds & request/response shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The three sandbox families the orchestrator manages independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxKind {
    /// Code execution (interpreters, package installs).
    Execution,
    /// Desktop/browser automation with a live stream.
    Desktop,
    /// Web-app development sandboxes.
    App,
}

impl SandboxKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SandboxKind::Execution => "execution",
            SandboxKind::Desktop => "desktop",
            SandboxKind::App => "app",
        }
    }
}

/// A code execution request inside a sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecRequest {
    pub code: String,
    pub language: String,
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub capture_visualizations: bool,
    pub timeout_secs: u64,
}

/// Output of a sandboxed execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    /// Base64 image payloads captured during execution.
    #[serde(default)]
    pub visualizations: Vec<String>,
}

/// A file operation inside a sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum FileOperation {
    Read { path: String, is_binary: bool },
    Write { path: String, content: String, is_binary: bool },
    List { path: String },
    Delete { path: String },
    Exists { path: String },
}

impl FileOperation {
    pub fn path(&self) -> &str {
        match self {
            FileOperation::Read { path, .. }
            | FileOperation::Write { path, .. }
            | FileOperation::List { path }
            | FileOperation::Delete { path }
            | FileOperation::Exists { path } => path,
        }
    }

    /// Operations that change sandbox state.
    pub fn is_mutation(&self) -> bool {
        matches!(self, FileOperation::Write { .. } | FileOperation::Delete { .. })
    }
}

/// Result of a [`FileOperation`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileOpResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_written: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Live view info for desktop sandboxes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamInfo {
    pub stream_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_key: Option<String>,
}

/// A browser/desktop automation action (desktop sandboxes only).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BrowserAction {
    Navigate { url: String },
    Click { x: i32, y: i32 },
    TypeText { text: String },
    PressKey { key: String },
    Scroll { dx: i32, dy: i32 },
    Screenshot,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A live sandbox instance owned by one session.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Provider-assigned sandbox id.
    fn id(&self) -> &str;

    /// Run code. The implementation enforces `timeout_secs` itself.
    async fn exec(&self, req: ExecRequest) -> Result<ExecOutput>;

    /// Perform a file operation.
    async fn file_op(&self, op: FileOperation) -> Result<FileOpResult>;

    /// Cheap liveness probe, called before a session is reused.
    async fn is_alive(&self) -> bool;

    /// Tear the sandbox down. Implementations may assume this is called at
    /// most once; idempotency is provided by [`SandboxExecutor`].
    async fn destroy(&self) -> Result<()>;

    /// Perform a browser/desktop action. Execution sandboxes reject this.
    async fn browser_action(&self, _action: BrowserAction) -> Result<String> {
        Err(ha_domain::Error::Sandbox(
            "this sandbox kind does not support browser actions".into(),
        ))
    }

    /// Live desktop feed, when the provider exposes one.
    fn stream_info(&self) -> Option<StreamInfo> {
        None
    }
}

/// Factory for sandboxes of one kind.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    fn kind(&self) -> SandboxKind;
    async fn create(&self) -> Result<Box<dyn Sandbox>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executor wrapper
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Wraps a [`Sandbox`] handle with a destroyed-flag so `destroy` is safe to
/// call from the reaper, explicit cleanup, and drop paths concurrently.
pub struct SandboxExecutor {
    sandbox: Box<dyn Sandbox>,
    destroyed: AtomicBool,
}

impl SandboxExecutor {
    pub fn new(sandbox: Box<dyn Sandbox>) -> Arc<Self> {
        Arc::new(Self {
            sandbox,
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn sandbox_id(&self) -> &str {
        self.sandbox.id()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub async fn exec(&self, req: ExecRequest) -> Result<ExecOutput> {
        self.ensure_live()?;
        self.sandbox.exec(req).await
    }

    pub async fn file_op(&self, op: FileOperation) -> Result<FileOpResult> {
        self.ensure_live()?;
        self.sandbox.file_op(op).await
    }

    pub async fn is_alive(&self) -> bool {
        !self.is_destroyed() && self.sandbox.is_alive().await
    }

    pub async fn browser_action(&self, action: BrowserAction) -> Result<String> {
        self.ensure_live()?;
        self.sandbox.browser_action(action).await
    }

    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.sandbox.stream_info()
    }

    /// Destroy the underlying sandbox. Repeat calls are no-ops.
    pub async fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.sandbox.destroy().await
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(ha_domain::Error::Sandbox(
                "sandbox has been destroyed".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Test doubles shared by this crate's unit tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A scriptable sandbox: records destroys, can be marked dead.
    pub struct FakeSandbox {
        pub id: String,
        pub alive: AtomicBool,
        pub destroy_count: AtomicUsize,
    }

    impl FakeSandbox {
        pub fn new(id: impl Into<String>) -> Self {
            Self {
                id: id.into(),
                alive: AtomicBool::new(true),
                destroy_count: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Sandbox for Arc<FakeSandbox> {
        fn id(&self) -> &str {
            &self.id
        }

        async fn exec(&self, _req: ExecRequest) -> Result<ExecOutput> {
            Ok(ExecOutput {
                stdout: "ok".into(),
                exit_code: Some(0),
                ..Default::default()
            })
        }

        async fn file_op(&self, _op: FileOperation) -> Result<FileOpResult> {
            Ok(FileOpResult {
                success: true,
                ..Default::default()
            })
        }

        async fn is_alive(&self) -> bool {
            self.alive.load(Ordering::Acquire)
        }

        async fn destroy(&self) -> Result<()> {
            self.destroy_count.fetch_add(1, Ordering::AcqRel);
            self.alive.store(false, Ordering::Release);
            Ok(())
        }
    }

    /// Factory producing [`FakeSandbox`]es and remembering them.
    pub struct FakeRuntime {
        pub kind: SandboxKind,
        pub created: parking_lot::Mutex<Vec<Arc<FakeSandbox>>>,
        pub fail_create: AtomicBool,
        pub create_count: AtomicUsize,
    }

    impl FakeRuntime {
        pub fn new(kind: SandboxKind) -> Self {
            Self {
                kind,
                created: parking_lot::Mutex::new(Vec::new()),
                fail_create: AtomicBool::new(false),
                create_count: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SandboxRuntime for Arc<FakeRuntime> {
        fn kind(&self) -> SandboxKind {
            self.kind
        }

        async fn create(&self) -> Result<Box<dyn Sandbox>> {
            if self.fail_create.load(Ordering::Acquire) {
                return Err(ha_domain::Error::Sandbox("provider unavailable".into()));
            }
            let n = self.create_count.fetch_add(1, Ordering::AcqRel);
            let sandbox = Arc::new(FakeSandbox::new(format!("sbx-{n}")));
            self.created.lock().push(sandbox.clone());
            Ok(Box::new(sandbox))
        }
    }
}
