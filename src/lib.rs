//! # opencode-runtime
//!
//! 本地 OpenCode 后端的客户端运行时：进程管理、REST 调用、SSE 事件流解码与重试。
//!
//! Client-side runtime for a local OpenCode backend: it launches and watches
//! the server process, talks to its REST surface, decodes its server-sent
//! event streams into typed events, and makes all of it resilient to a flaky
//! local server.
//!
//! ## Overview
//!
//! ```text
//! SessionOrchestrator ──▶ OpencodeClient (REST) ─┐
//!          │                                     ├──▶ BackoffRetrier + classify
//!          └────────────▶ EventStreamClient (SSE)┘
//!                                 ▲
//!                 BackendSupervisor (process + base URL)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use opencode_runtime::{BackendConfig, BackendSupervisor, OrchestratorConfig, SessionOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> opencode_runtime::Result<()> {
//!     let supervisor = BackendSupervisor::new(BackendConfig::from_env().with_working_dir("."));
//!     let connection = supervisor.ensure_started().await?;
//!
//!     let orchestrator = SessionOrchestrator::from_connection(&connection, OrchestratorConfig::default());
//!     let reply = orchestrator.send_prompt("Explain src/main.rs").await?.collect().await;
//!     println!("{}", reply.text);
//!
//!     supervisor.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Typed REST client and error classification |
//! | [`transport`] | reqwest wrapper bound to the backend base URL |
//! | [`pipeline`] | SSE framing and event mapping |
//! | [`stream`] | Per-session event streams with cancellation |
//! | [`supervisor`] | Backend process lifecycle |
//! | [`session`] | Session reuse, prompting and streaming fallback |
//! | [`resilience`] | Exponential backoff retries |
//! | [`types`] | Wire model |

pub mod client;
pub mod error;
pub mod error_code;
pub mod pipeline;
pub mod resilience;
pub mod session;
pub mod stream;
pub mod supervisor;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{classify, OpencodeClient, OpencodeClientBuilder, RetryDecision};
pub use error::{Error, ErrorContext, ProcessError};
pub use error_code::FailureCategory;
pub use resilience::{BackoffRetrier, RetryPolicy};
pub use session::{
    OrchestratorConfig, PromptReply, PromptStream, SessionOrchestrator, StreamedReply,
};
pub use stream::{EventStreamClient, EventSubscription, StreamState};
pub use supervisor::{
    BackendConfig, BackendConnection, BackendSupervisor, StartOutcome, SupervisorState,
};
pub use types::{
    events::StreamEvent,
    message::{Message, MessagePart, MessageResponse, MessageRole, PromptRequest},
    session::Session,
};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
