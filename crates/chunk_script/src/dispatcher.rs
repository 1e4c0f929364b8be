//! Evaluation entry points
//!
//! `evaluate` runs on the caller's thread, which must own the engine.
//! `evaluate_async` hops onto the engine's dispatch context and reports back
//! through a `CompletionToken`; it never returns an error to the caller.

use crate::completion::CompletionToken;
use crate::dispatch::DispatchContext;
use crate::error::BridgeError;
use crate::ffi::{self, RuntimeHandle};

/// Script bytes plus the identifier used to label diagnostics.
///
/// The bytes are copied on construction; the caller's buffer is free to go
/// once the request has been created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPayload {
    code: Vec<u8>,
    source_id: String,
}

impl ScriptPayload {
    pub fn new(code: &[u8], source_id: &str) -> Self {
        Self {
            code: code.to_vec(),
            source_id: source_id.to_string(),
        }
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }
}

/// Evaluate `code` on the calling thread.
pub fn evaluate(handle: RuntimeHandle, code: &[u8], source_id: &str) -> Result<(), BridgeError> {
    run(handle, ScriptPayload::new(code, source_id))
}

/// Queue `code` for evaluation on the engine's own thread.
///
/// When `dispatch` is `None` the context registered for `handle` is used; an
/// explicit context must belong to `handle`.
/// `token` is settled exactly once: resolved after a clean evaluation,
/// rejected otherwise. Failures found before queueing settle it right away
/// on the calling thread.
pub fn evaluate_async(
    handle: RuntimeHandle,
    dispatch: Option<&DispatchContext>,
    code: &[u8],
    source_id: &str,
    token: CompletionToken,
) {
    if !ffi::is_live(handle) {
        tracing::warn!(runtime = %handle, source = source_id, "evaluation requested on unavailable runtime");
        token.reject(BridgeError::RuntimeUnavailable { handle });
        return;
    }

    let dispatch = match dispatch {
        Some(dispatch) if dispatch.runtime() != handle => {
            tracing::warn!(runtime = %handle, other = %dispatch.runtime(), source = source_id, "dispatch context belongs to another runtime");
            token.reject(BridgeError::DispatchContextUnavailable);
            return;
        }
        Some(dispatch) => dispatch.clone(),
        None => match ffi::dispatch_context(handle) {
            Ok(dispatch) => dispatch,
            Err(err) => {
                tracing::warn!(runtime = %handle, source = source_id, error = %err, "cannot dispatch evaluation");
                token.reject(err);
                return;
            }
        },
    };

    let payload = ScriptPayload::new(code, source_id);
    let queued = dispatch.invoke_async(move || match run(handle, payload) {
        Ok(()) => token.resolve(),
        Err(err) => token.reject(err),
    });
    // A refused job is dropped unrun, and its token rejects itself on drop.
    if let Err(err) = queued {
        tracing::warn!(runtime = %handle, source = source_id, error = %err, "dispatch context refused evaluation");
    }
}

fn run(handle: RuntimeHandle, payload: ScriptPayload) -> Result<(), BridgeError> {
    let ScriptPayload { code, source_id } = payload;
    let span = tracing::debug_span!("evaluate", runtime = %handle, source = %source_id);
    let _enter = span.enter();

    match ffi::with_engine(handle, |engine| engine.evaluate(code, &source_id))? {
        Ok(()) => {
            tracing::debug!("evaluated");
            Ok(())
        }
        Err(exception) => {
            tracing::warn!("script evaluation failed");
            tracing::debug!(%exception, "engine exception");
            Err(BridgeError::Evaluation { source_id })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::EngineThread;
    use crate::runtime::LocalEngine;
    use chunk_services::{EngineSettings, Settings};

    fn global_i32(handle: RuntimeHandle, name: &str) -> i32 {
        ffi::with_engine(handle, |engine| {
            engine.context().with(|ctx| ctx.globals().get::<_, i32>(name))
        })
        .unwrap()
        .unwrap()
    }

    #[test]
    fn payload_copies_bytes() {
        let mut buffer = b"var a = 1;".to_vec();
        let payload = ScriptPayload::new(&buffer, "a.js");
        buffer.clear();
        assert_eq!(payload.code(), b"var a = 1;");
        assert_eq!(payload.source_id(), "a.js");
    }

    #[test]
    fn evaluate_valid_code() {
        let engine = LocalEngine::new(&Settings::default()).unwrap();
        evaluate(engine.handle(), b"var x = 1+1;", "test1.js").unwrap();
        assert_eq!(global_i32(engine.handle(), "x"), 2);
    }

    #[test]
    fn evaluate_runs_top_level_effects_once() {
        let engine = LocalEngine::new(&Settings::default()).unwrap();
        evaluate(engine.handle(), b"var hits = 0;", "init.js").unwrap();
        evaluate(engine.handle(), b"hits += 1;", "chunk.js").unwrap();
        assert_eq!(global_i32(engine.handle(), "hits"), 1);
    }

    #[test]
    fn evaluate_reports_fixed_error_for_throwing_code() {
        let engine = LocalEngine::new(&Settings::default()).unwrap();
        let err = evaluate(engine.handle(), b"throw new Error('boom')", "test2.js").unwrap_err();

        assert_eq!(
            err,
            BridgeError::Evaluation {
                source_id: "test2.js".to_string()
            }
        );
        assert_eq!(err.to_string(), crate::error::EVALUATION_FAILURE_MESSAGE);
        assert!(!err.to_string().contains("boom"));
    }

    #[test]
    fn evaluate_accepts_unterminated_buffers() {
        let engine = LocalEngine::new(&Settings::default()).unwrap();
        let buffer = b"var y = 40 + 2;GARBAGE";
        evaluate(engine.handle(), &buffer[..15], "slice.js").unwrap();
        assert_eq!(global_i32(engine.handle(), "y"), 42);
    }

    #[test]
    fn evaluate_on_dropped_engine_is_unavailable() {
        let engine = LocalEngine::new(&Settings::default()).unwrap();
        let handle = engine.handle();
        drop(engine);
        assert_eq!(
            evaluate(handle, b"var z = 1;", "late.js").unwrap_err(),
            BridgeError::RuntimeUnavailable { handle }
        );
    }

    #[test]
    fn evaluate_async_without_dispatch_context_rejects() {
        let engine = LocalEngine::new(&Settings::default()).unwrap();
        let (token, mut settlement) = CompletionToken::channel();

        evaluate_async(engine.handle(), None, b"var q = 1;", "q.js", token);

        assert_eq!(
            settlement.try_outcome(),
            Some(Err(BridgeError::DispatchContextUnavailable))
        );
    }

    #[test]
    fn evaluate_async_on_closed_queue_rejects_through_token() {
        let engine = LocalEngine::new(&Settings::default()).unwrap();
        let dispatch = DispatchContext::closed(engine.handle());
        let (token, mut settlement) = CompletionToken::channel();

        evaluate_async(engine.handle(), Some(&dispatch), b"var q = 1;", "q.js", token);

        assert!(ffi::is_live(engine.handle()));
        assert_eq!(
            settlement.try_outcome(),
            Some(Err(BridgeError::DispatchContextUnavailable))
        );
    }

    #[test]
    fn evaluate_async_rejects_foreign_dispatch_context() {
        let engine = LocalEngine::new(&Settings::default()).unwrap();
        let other = EngineThread::spawn(&Settings::default()).unwrap();
        let (token, mut settlement) = CompletionToken::channel();

        evaluate_async(
            engine.handle(),
            Some(other.dispatch_context()),
            b"var q = 1;",
            "q.js",
            token,
        );

        assert_eq!(
            settlement.try_outcome(),
            Some(Err(BridgeError::DispatchContextUnavailable))
        );
    }

    #[test]
    fn memory_limit_turns_large_allocations_into_evaluation_errors() {
        let mut settings = Settings::default();
        settings.engine = EngineSettings {
            memory_limit_bytes: Some(8 * 1024 * 1024),
            ..EngineSettings::default()
        };
        let engine = LocalEngine::new(&settings).unwrap();

        let err = evaluate(
            engine.handle(),
            b"var big = []; for (var i = 0; i < 1e7; i++) { big.push({ i: i }); }",
            "big.js",
        )
        .unwrap_err();
        assert_eq!(err.code(), "ScriptEvalFailure");

        evaluate(engine.handle(), b"big = null; var small = 3;", "small.js").unwrap();
        assert_eq!(global_i32(engine.handle(), "small"), 3);
    }
}
