use crate::ffi::RuntimeHandle;
use thiserror::Error;

/// Message reported for every failed evaluation. Engine exception text stays
/// inside the bridge.
pub const EVALUATION_FAILURE_MESSAGE: &str = "Failed to evaluate Javascript";

/// Errors reported across the bridge boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("Failed to evaluate Javascript")]
    Evaluation { source_id: String },

    #[error("{handle} is not available")]
    RuntimeUnavailable { handle: RuntimeHandle },

    #[error("dispatch context is not available")]
    DispatchContextUnavailable,

    #[error("{handle} is owned by another thread")]
    ThreadAffinity { handle: RuntimeHandle },

    #[error("bundle verification failed for '{source_id}': {reason}")]
    Verification { source_id: String, reason: String },
}

impl BridgeError {
    /// Stable error kind, suitable for rejecting a host-side promise.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::Evaluation { .. } => "ScriptEvalFailure",
            BridgeError::RuntimeUnavailable { .. } => "RuntimeUnavailable",
            BridgeError::DispatchContextUnavailable => "DispatchContextUnavailable",
            BridgeError::ThreadAffinity { .. } => "ThreadAffinityViolation",
            BridgeError::Verification { .. } => "ScriptVerificationFailure",
        }
    }
}

/// Exception raised by the engine while parsing or running a script.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ScriptException {
    pub message: String,
}

/// Errors raised by the host while bringing an engine up.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to create QuickJS engine: {0}")]
    Create(#[from] rquickjs::Error),

    #[error("failed to spawn engine thread")]
    Spawn(#[source] std::io::Error),

    #[error("engine thread exited before the engine was ready")]
    ThreadExited,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluation_message_is_fixed() {
        let err = BridgeError::Evaluation {
            source_id: "https://cdn.example.com/chunk.bundle".to_string(),
        };
        assert_eq!(err.to_string(), EVALUATION_FAILURE_MESSAGE);
        assert_eq!(err.code(), "ScriptEvalFailure");
    }

    #[test]
    fn codes_are_distinct() {
        let handle = RuntimeHandle::from_raw(7);
        let codes = [
            BridgeError::Evaluation { source_id: String::new() }.code(),
            BridgeError::RuntimeUnavailable { handle }.code(),
            BridgeError::DispatchContextUnavailable.code(),
            BridgeError::ThreadAffinity { handle }.code(),
            BridgeError::Verification {
                source_id: String::new(),
                reason: String::new(),
            }
            .code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
