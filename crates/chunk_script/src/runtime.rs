//! Script runtime management
//!
//! Wraps a QuickJS runtime and context. An `Engine` is bound to the thread
//! that created it; other threads reach it through a `DispatchContext`.

use crate::error::{EngineError, ScriptException};
use crate::ffi::{self, RuntimeHandle};
use chunk_services::EngineSettings;
use rquickjs::{CatchResultExt, Context, Runtime};
use std::marker::PhantomData;
use std::rc::Rc;

/// Script execution context
pub struct Engine {
    runtime: Runtime,
    context: Context,
    drain_pending_jobs: bool,
}

impl Engine {
    pub fn new(settings: &EngineSettings) -> Result<Self, EngineError> {
        let runtime = Runtime::new()?;
        if let Some(limit) = settings.memory_limit_bytes {
            runtime.set_memory_limit(limit);
        }
        if let Some(limit) = settings.max_stack_size_bytes {
            runtime.set_max_stack_size(limit);
        }
        if let Some(threshold) = settings.gc_threshold_bytes {
            runtime.set_gc_threshold(threshold);
        }
        let context = Context::full(&runtime)?;

        Ok(Self {
            runtime,
            context,
            drain_pending_jobs: true,
        })
    }

    pub fn with_job_draining(mut self, enabled: bool) -> Self {
        self.drain_pending_jobs = enabled;
        self
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Evaluate `code` as a classic script in the global scope.
    ///
    /// `source_id` only labels diagnostics. Promise jobs queued by the script
    /// are run before returning unless draining is disabled.
    ///
    /// QuickJS takes its source as a C string, so code containing a NUL byte
    /// is refused and reported as an exception without running.
    pub fn evaluate(&self, code: Vec<u8>, source_id: &str) -> Result<(), ScriptException> {
        self.context.with(|ctx| {
            ctx.eval::<(), _>(code)
                .catch(&ctx)
                .map_err(|err| ScriptException {
                    message: err.to_string(),
                })
        })?;

        if self.drain_pending_jobs {
            let executed = self.run_pending_jobs();
            if executed > 0 {
                tracing::trace!(source = source_id, executed, "drained pending jobs");
            }
        }
        Ok(())
    }

    /// Run queued promise jobs until none remain. Returns how many ran.
    pub fn run_pending_jobs(&self) -> usize {
        let mut executed = 0;
        loop {
            match self.runtime.execute_pending_job() {
                Ok(true) => executed += 1,
                Ok(false) => break,
                Err(_) => {
                    executed += 1;
                    tracing::warn!("pending job raised an exception");
                }
            }
        }
        executed
    }

    pub fn is_job_pending(&self) -> bool {
        self.runtime.is_job_pending()
    }
}

/// An engine owned by the current thread, for hosts that evaluate
/// synchronously on their own thread. Unregistered on drop.
pub struct LocalEngine {
    handle: RuntimeHandle,
    _thread_bound: PhantomData<Rc<()>>,
}

impl LocalEngine {
    pub fn new(settings: &chunk_services::Settings) -> Result<Self, EngineError> {
        let engine =
            Engine::new(&settings.engine)?.with_job_draining(settings.dispatch.drain_pending_jobs);
        let handle = RuntimeHandle::allocate();
        ffi::register(handle, Rc::new(engine), None);
        tracing::info!(runtime = %handle, "local engine started");

        Ok(Self {
            handle,
            _thread_bound: PhantomData,
        })
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.handle
    }
}

impl Drop for LocalEngine {
    fn drop(&mut self) {
        ffi::unregister(self.handle);
        tracing::info!(runtime = %self.handle, "local engine stopped");
    }
}
