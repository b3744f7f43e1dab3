//! 弹性模块：指数退避重试。
//!
//! # Resilience
//!
//! Every REST call and every stream connect goes through [`BackoffRetrier`].
//! Whether a failure is worth another attempt is decided by the error
//! classifier (`client::error_classification`), not by the call sites.
//!
//! ```rust
//! use opencode_runtime::resilience::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.max_attempts, 3);
//! assert_eq!(
//!     policy.delay_schedule(),
//!     vec![Duration::from_millis(1000), Duration::from_millis(2000)]
//! );
//! ```

pub mod backoff;

pub use backoff::{BackoffRetrier, RetryPolicy, RetryVerdict};
