//! Script locators
//!
//! A locator describes where a chunk comes from and how it should be treated
//! once its bytes are in hand. Resolution and fetching happen in the calling
//! layer; the bridge only reads the fields it needs to evaluate the chunk.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub const DEFAULT_METHOD: &str = "GET";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("script locator is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid script locator: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Signature verification policy for a chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyMode {
    /// Every chunk must carry a valid token.
    Strict,
    /// Verify only chunks that carry a token.
    Lax,
    #[default]
    Off,
}

impl VerifyMode {
    pub fn requires_verification(self, token_present: bool) -> bool {
        match self {
            VerifyMode::Strict => true,
            VerifyMode::Lax => token_present,
            VerifyMode::Off => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptLocator {
    #[serde(default)]
    pub script_id: String,
    pub url: String,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub fetch: bool,
    #[serde(default)]
    pub absolute: bool,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub verify_script_signature: VerifyMode,
    #[serde(default)]
    pub unique_id: String,
}

fn default_method() -> String {
    DEFAULT_METHOD.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl ScriptLocator {
    pub fn new(script_id: &str, url: &str) -> Self {
        Self {
            script_id: script_id.to_string(),
            url: url.to_string(),
            query: None,
            method: default_method(),
            fetch: false,
            absolute: false,
            body: None,
            headers: BTreeMap::new(),
            timeout: DEFAULT_TIMEOUT_MS,
            verify_script_signature: VerifyMode::Off,
            unique_id: script_id.to_string(),
        }
    }

    /// Parse a locator sent by the calling layer. `script_id` takes
    /// precedence over any id carried in the JSON body.
    pub fn parse(script_id: &str, json: &str) -> Result<Self, LocatorError> {
        let mut locator: ScriptLocator = serde_json::from_str(json)?;
        if !script_id.is_empty() {
            locator.script_id = script_id.to_string();
        }
        locator.validate()?;
        Ok(locator)
    }

    pub fn validate(&self) -> Result<(), LocatorError> {
        if self.script_id.is_empty() {
            return Err(LocatorError::MissingField("scriptId"));
        }
        if self.url.is_empty() {
            return Err(LocatorError::MissingField("url"));
        }
        if self.method.is_empty() {
            return Err(LocatorError::MissingField("method"));
        }
        Ok(())
    }

    /// URL used to fetch the chunk, query included.
    pub fn request_url(&self) -> String {
        match &self.query {
            Some(query) if !query.is_empty() => format!("{}?{}", self.url, query),
            _ => self.url.clone(),
        }
    }

    /// URL reported to the engine as the chunk's source identifier.
    pub fn source_url(&self) -> &str {
        &self.url
    }

    pub fn content_type(&self) -> &str {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    pub fn requires_verification(&self, token_present: bool) -> bool {
        self.verify_script_signature
            .requires_verification(token_present)
    }
}
