//! Engine thread affinity
//!
//! Every engine that accepts asynchronous work is owned by one dedicated
//! thread draining a single-consumer queue. Work for that engine is funnelled
//! through its `DispatchContext`, so no two evaluations ever overlap.

use crate::error::{BridgeError, EngineError};
use crate::ffi::{self, RuntimeHandle};
use crate::runtime::Engine;
use chunk_services::Settings;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Shutdown,
}

/// Handle to an engine's work queue.
#[derive(Clone)]
pub struct DispatchContext {
    runtime: RuntimeHandle,
    queue: mpsc::UnboundedSender<Message>,
}

impl std::fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchContext")
            .field("runtime", &self.runtime)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl DispatchContext {
    pub fn runtime(&self) -> RuntimeHandle {
        self.runtime
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Queue `job` to run on the engine's thread and return immediately.
    ///
    /// If the queue has shut down the job is dropped unrun.
    pub fn invoke_async<F>(&self, job: F) -> Result<(), BridgeError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue
            .send(Message::Run(Box::new(job)))
            .map_err(|_| BridgeError::DispatchContextUnavailable)
    }

    /// A context whose engine thread is already gone.
    #[cfg(test)]
    pub(crate) fn closed(runtime: RuntimeHandle) -> Self {
        let (queue, _) = mpsc::unbounded_channel();
        Self { runtime, queue }
    }
}

/// A host-owned engine living on its own thread.
///
/// The engine is registered for the lifetime of the thread. `shutdown` (or
/// drop) stops accepting new work, runs whatever was already queued, then
/// unregisters the handle and joins the thread.
pub struct EngineThread {
    handle: RuntimeHandle,
    dispatch: DispatchContext,
    thread: Option<JoinHandle<()>>,
}

impl EngineThread {
    pub fn spawn(settings: &Settings) -> Result<Self, EngineError> {
        let handle = RuntimeHandle::allocate();
        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel();
        let dispatch = DispatchContext {
            runtime: handle,
            queue: queue_tx,
        };

        let engine_settings = settings.engine.clone();
        let drain_pending_jobs = settings.dispatch.drain_pending_jobs;
        let registered_dispatch = dispatch.clone();
        // Not a tokio oneshot: `spawn` may run inside an async runtime, where
        // `blocking_recv` panics.
        let (ready_tx, ready_rx) = std_mpsc::channel();

        let thread = std::thread::Builder::new()
            .name(settings.dispatch.thread_name.clone())
            .spawn(move || {
                let engine = match Engine::new(&engine_settings) {
                    Ok(engine) => engine.with_job_draining(drain_pending_jobs),
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                ffi::register(handle, Rc::new(engine), Some(registered_dispatch));
                let _registration = RegistrationGuard(handle);
                tracing::info!(runtime = %handle, "engine thread started");
                let _ = ready_tx.send(Ok(()));

                run_queue(handle, &mut queue_rx);
            })
            .map_err(EngineError::Spawn)?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                handle,
                dispatch,
                thread: Some(thread),
            }),
            Ok(Err(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(_) => {
                let _ = thread.join();
                Err(EngineError::ThreadExited)
            }
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.handle
    }

    pub fn dispatch_context(&self) -> &DispatchContext {
        &self.dispatch
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        // Already closed means the thread is on its way out.
        let _ = self.dispatch.queue.send(Message::Shutdown);
        if thread.join().is_err() {
            tracing::error!(runtime = %self.handle, "engine thread panicked");
        }
    }
}

impl Drop for EngineThread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Unregisters the engine however the thread exits.
struct RegistrationGuard(RuntimeHandle);

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        ffi::unregister(self.0);
        tracing::info!(runtime = %self.0, "engine thread stopped");
    }
}

fn run_queue(handle: RuntimeHandle, queue: &mut mpsc::UnboundedReceiver<Message>) {
    while let Some(message) = queue.blocking_recv() {
        match message {
            Message::Run(job) => {
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    tracing::error!(runtime = %handle, "job panicked on engine thread");
                }
            }
            Message::Shutdown => {
                // Submitted work still runs; new sends fail from here on.
                tracing::debug!(runtime = %handle, "engine thread shutting down");
                queue.close();
            }
        }
    }
}
