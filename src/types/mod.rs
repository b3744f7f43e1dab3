//! Wire model for the OpenCode backend.
//!
//! # Types Module
//!
//! Strongly-typed representations of everything that crosses the loopback HTTP
//! boundary. Decoding is forward compatible: unknown fields are ignored and
//! optional fields fall back to their declared defaults.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Session`] | Server-side conversation context |
//! | [`MessagePart`] | One ordered piece of a prompt or reply |
//! | [`MessageResponse`] | A message plus its parts |
//! | [`PromptRequest`] | Body of `POST /session/{id}/message` |
//! | [`StreamEvent`] | Decoded server-sent event |
//!
//! ## Submodules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`session`] | Session records and creation requests |
//! | [`message`] | Messages, parts and prompt bodies |
//! | [`events`] | Streaming event union |
//! | [`workspace`] | Health, providers, files and project info |

pub mod events;
pub mod message;
pub mod session;
pub mod workspace;

pub use events::StreamEvent;
pub use message::{
    Message, MessagePart, MessageResponse, MessageRole, ModelRef, PartKind, PromptRequest,
};
pub use session::{CreateSessionRequest, Session, Timestamp};
pub use workspace::{
    FileContent, HealthResponse, Project, Provider, ProviderModel, ProvidersResponse,
};
