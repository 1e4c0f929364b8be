//! Handle-based access to host-owned engines
//!
//! The host hands the bridge a plain `u64`. Every use goes through the
//! registry below, so a stale or forged value can only ever produce
//! `RuntimeUnavailable`, never a dangling engine. Engines are `!Send` and stay
//! in a table local to the thread that owns them.

use crate::dispatch::DispatchContext;
use crate::error::BridgeError;
use crate::runtime::Engine;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

/// Opaque, non-owning reference to a live engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RuntimeHandle(u64);

impl RuntimeHandle {
    pub fn from_raw(raw: u64) -> Self {
        RuntimeHandle(raw)
    }

    pub fn into_raw(self) -> u64 {
        self.0
    }

    /// Ids are never reused, so a torn-down handle cannot alias a newer engine.
    pub(crate) fn allocate() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        RuntimeHandle(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "runtime#{}", self.0)
    }
}

struct Registration {
    owner: ThreadId,
    dispatch: Option<DispatchContext>,
}

static REGISTRY: Lazy<DashMap<RuntimeHandle, Registration>> = Lazy::new(DashMap::new);

thread_local! {
    static LOCAL_ENGINES: RefCell<HashMap<RuntimeHandle, Rc<Engine>>> = RefCell::new(HashMap::new());
}

/// Publish an engine owned by the current thread.
pub(crate) fn register(handle: RuntimeHandle, engine: Rc<Engine>, dispatch: Option<DispatchContext>) {
    LOCAL_ENGINES.with(|engines| engines.borrow_mut().insert(handle, engine));
    REGISTRY.insert(
        handle,
        Registration {
            owner: thread::current().id(),
            dispatch,
        },
    );
    tracing::debug!(runtime = %handle, "registered engine");
}

/// Withdraw an engine. Must run on the owning thread.
pub(crate) fn unregister(handle: RuntimeHandle) -> bool {
    let removed = REGISTRY.remove(&handle).is_some();
    // Dropped outside the borrow in case the engine's finalizers re-enter.
    let engine = LOCAL_ENGINES.with(|engines| engines.borrow_mut().remove(&handle));
    drop(engine);
    if removed {
        tracing::debug!(runtime = %handle, "unregistered engine");
    }
    removed
}

pub fn is_live(handle: RuntimeHandle) -> bool {
    REGISTRY.contains_key(&handle)
}

/// The work queue the host registered for `handle`.
pub fn dispatch_context(handle: RuntimeHandle) -> Result<DispatchContext, BridgeError> {
    let registration = REGISTRY
        .get(&handle)
        .ok_or(BridgeError::RuntimeUnavailable { handle })?;
    registration
        .dispatch
        .clone()
        .ok_or(BridgeError::DispatchContextUnavailable)
}

/// Enter the engine behind `handle` on the current thread.
pub fn with_engine<R>(handle: RuntimeHandle, f: impl FnOnce(&Engine) -> R) -> Result<R, BridgeError> {
    let owner = REGISTRY
        .get(&handle)
        .map(|registration| registration.owner)
        .ok_or(BridgeError::RuntimeUnavailable { handle })?;
    if owner != thread::current().id() {
        return Err(BridgeError::ThreadAffinity { handle });
    }

    let engine = LOCAL_ENGINES
        .with(|engines| engines.borrow().get(&handle).cloned())
        .ok_or(BridgeError::RuntimeUnavailable { handle })?;
    Ok(f(&engine))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunk_services::EngineSettings;

    fn register_local() -> RuntimeHandle {
        let engine = Engine::new(&EngineSettings::default()).unwrap();
        let handle = RuntimeHandle::allocate();
        register(handle, Rc::new(engine), None);
        handle
    }

    #[test]
    fn raw_round_trip_preserves_identity() {
        let handle = RuntimeHandle::allocate();
        assert_eq!(RuntimeHandle::from_raw(handle.into_raw()), handle);
    }

    #[test]
    fn allocated_handles_are_unique() {
        let a = RuntimeHandle::allocate();
        let b = RuntimeHandle::allocate();
        assert_ne!(a, b);
    }

    #[test]
    fn unknown_handle_is_unavailable() {
        let handle = RuntimeHandle::from_raw(u64::MAX);
        assert!(!is_live(handle));
        let err = with_engine(handle, |_| ()).unwrap_err();
        assert_eq!(err, BridgeError::RuntimeUnavailable { handle });
    }

    #[test]
    fn registered_engine_is_entered_on_owner_thread() {
        let handle = register_local();
        assert!(is_live(handle));
        assert!(with_engine(handle, |_| ()).is_ok());

        assert!(unregister(handle));
        assert!(!is_live(handle));
        assert!(!unregister(handle));
    }

    #[test]
    fn other_threads_are_refused() {
        let handle = register_local();
        let err = std::thread::spawn(move || with_engine(handle, |_| ()).unwrap_err())
            .join()
            .unwrap();
        assert_eq!(err, BridgeError::ThreadAffinity { handle });
        unregister(handle);
    }

    #[test]
    fn missing_dispatch_context_is_reported() {
        let handle = register_local();
        assert_eq!(
            dispatch_context(handle).unwrap_err(),
            BridgeError::DispatchContextUnavailable
        );
        unregister(handle);
        assert_eq!(
            dispatch_context(handle).unwrap_err(),
            BridgeError::RuntimeUnavailable { handle }
        );
    }
}
