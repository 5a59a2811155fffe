//! aegis-sandbox — component C6: confined execution for agent-initiated
//! commands and skills.
//!
//! Two layers are provided:
//! - `Sandbox` (in `sandbox.rs`) — the policy-approved, single-shot
//!   execution path used by the tool executor. Picks the strongest isolation
//!   mechanism available on the host (bubblewrap, `sandbox-exec`, a
//!   container runtime, or a bare subprocess) and enforces a timeout, an
//!   output-size ceiling, and a pre-flight deny list.
//! - `SandboxExecutor` (in `manager.rs`) — interactive PTY sessions and
//!   detached background jobs, inherited from the teacher's terminal
//!   subsystem, for skills that need a persistent shell.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use aegis_sandbox::sandbox::{Sandbox, SandboxConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let sandbox = Sandbox::new(SandboxConfig::default());
//!     let result = sandbox.execute("echo hello", None).await.unwrap();
//!     println!("{}", result.stdout);
//! }
//! ```

pub mod backend;
pub mod error;
pub mod manager;
pub mod safety;
pub mod sandbox;
pub mod session;
pub mod truncate;
pub mod types;

pub use error::{Result, SandboxError};
pub use sandbox::{Sandbox, SandboxConfig, SandboxResult};
pub use types::{
    BackgroundJob, ExecMode, ExecOptions, ExecResult, JobId, JobStatus, SessionId, SessionInfo,
};
