//! Engine configuration.

use serde::Deserialize;

use crate::error::Result;
use crate::reactive::DEFAULT_MAX_EFFECT_RERUNS;

/// Settings of one [`Engine`](crate::Engine).
///
/// ```rust,ignore
/// let config = EngineConfig::from_json(r#"{ "debug": true, "root_prefix": "app" }"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Trace every dependency registration and flush.
    pub debug: bool,
    /// Address prefix of root components.
    pub root_prefix: String,
    /// Bound on deferred self-triggered reruns of a component effect.
    pub max_effect_reruns: usize,
    pub default_language: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debug: false,
            root_prefix: "0".into(),
            max_effect_reruns: DEFAULT_MAX_EFFECT_RERUNS,
            default_language: "en".into(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }
}
