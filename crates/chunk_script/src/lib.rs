//! Chunk Bridge Scripting Layer
//!
//! Evaluates dynamically loaded JavaScript chunks inside host-owned QuickJS
//! engines.
//!
//! ## Architecture
//!
//! - **Handles:** the host passes engines around as opaque `RuntimeHandle`s,
//!   checked against a registry on every use
//! - **Sync path:** `evaluate` runs on the caller's thread, which must own the engine
//! - **Async path:** `evaluate_async` queues onto the engine's `DispatchContext`
//!   and settles a one-shot `CompletionToken`
//!
//! Engine exceptions never cross the boundary; they surface as
//! `BridgeError::Evaluation` with a fixed message.

pub mod completion;
pub mod dispatch;
pub mod dispatcher;
pub mod error;
pub mod ffi;
pub mod loader;
pub mod runtime;

pub use completion::{CompletionToken, Outcome, Settlement};
pub use dispatch::{DispatchContext, EngineThread};
pub use dispatcher::{evaluate, evaluate_async, ScriptPayload};
pub use error::{BridgeError, EngineError, ScriptException, EVALUATION_FAILURE_MESSAGE};
pub use ffi::RuntimeHandle;
pub use loader::{BundleVerifier, ScriptLoader};
pub use runtime::{Engine, LocalEngine};

pub use rquickjs;
