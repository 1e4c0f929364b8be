//! Chunk loading facade
//!
//! Takes the bytes the calling layer fetched for a locator, strips the
//! signature trailer, applies the locator's verification policy, and hands
//! the code to the dispatcher: asynchronously when the caller supplied a
//! completion token, synchronously otherwise.

use crate::completion::CompletionToken;
use crate::dispatch::DispatchContext;
use crate::dispatcher;
use crate::error::BridgeError;
use crate::ffi::RuntimeHandle;
use chunk_services::{split_signed_bundle, ScriptLocator};
use std::sync::Arc;

/// Checks a bundle against its signature token.
pub trait BundleVerifier: Send + Sync {
    fn verify(&self, code: &[u8], token: Option<&str>) -> Result<(), String>;
}

pub struct ScriptLoader {
    handle: RuntimeHandle,
    dispatch: Option<DispatchContext>,
    verifier: Option<Arc<dyn BundleVerifier>>,
}

impl ScriptLoader {
    pub fn new(handle: RuntimeHandle) -> Self {
        Self {
            handle,
            dispatch: None,
            verifier: None,
        }
    }

    pub fn with_dispatch(mut self, dispatch: DispatchContext) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn BundleVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.handle
    }

    /// Evaluate a fetched chunk.
    ///
    /// With a token every failure, verification included, is delivered
    /// through it and this returns `Ok`.
    pub fn load(
        &self,
        locator: &ScriptLocator,
        content: &[u8],
        token: Option<CompletionToken>,
    ) -> Result<(), BridgeError> {
        let bundle = split_signed_bundle(content);
        let source_id = locator.source_url();

        if let Err(err) = self.verify(locator, bundle.code, bundle.token.as_deref()) {
            tracing::warn!(script = %locator.script_id, error = %err, "rejecting chunk");
            return match token {
                Some(token) => {
                    token.reject(err);
                    Ok(())
                }
                None => Err(err),
            };
        }

        match token {
            Some(token) => {
                dispatcher::evaluate_async(
                    self.handle,
                    self.dispatch.as_ref(),
                    bundle.code,
                    source_id,
                    token,
                );
                Ok(())
            }
            None => dispatcher::evaluate(self.handle, bundle.code, source_id),
        }
    }

    fn verify(&self, locator: &ScriptLocator, code: &[u8], token: Option<&str>) -> Result<(), BridgeError> {
        if !locator.requires_verification(token.is_some()) {
            return Ok(());
        }
        let verifier = self.verifier.as_ref().ok_or_else(|| BridgeError::Verification {
            source_id: locator.source_url().to_string(),
            reason: "no bundle verifier is configured".to_string(),
        })?;
        verifier
            .verify(code, token)
            .map_err(|reason| BridgeError::Verification {
                source_id: locator.source_url().to_string(),
                reason,
            })
    }
}
