//! Typed REST client for the OpenCode backend.
//!
//! Keep the public surface small and predictable: one method per endpoint on
//! [`OpencodeClient`], configuration through [`OpencodeClientBuilder`].
//! Endpoints are split by area under `src/client/`.

pub mod builder;
pub mod core;
pub mod error_classification;
pub(crate) mod sessions;
mod workspace;

pub use builder::{ClientConfig, OpencodeClientBuilder, DEFAULT_BASE_URL};
pub use core::OpencodeClient;
pub use error_classification::{classify, RetryDecision};
