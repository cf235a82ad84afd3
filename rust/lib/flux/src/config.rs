use serde::{Deserialize, Serialize};

use crate::error::FluxError;

/// Event broadcast after every commit.
pub const UPDATE_STATE_EVENT: &str = "updateState";

/// Store-wide settings.
///
/// Every field has a default, so `{}` is a valid config:
///
/// ```json
/// { "update_event": "updateState", "once_return_value": true, "namespace": "app:" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Event name commits broadcast the new state on.
    pub update_event: String,
    /// Return value that removes opted-in listeners from the store's bus.
    pub once_return_value: bool,
    /// Default persistence prefix for commits and hydration.
    /// `None` disables persistence unless a commit names its own prefix.
    pub namespace: Option<String>,
}

impl StoreConfig {
    pub fn from_json(text: &str) -> Result<Self, FluxError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            update_event: UPDATE_STATE_EVENT.to_string(),
            once_return_value: true,
            namespace: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_default() {
        let config = StoreConfig::from_json("{}").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.update_event, "updateState");
        assert!(config.once_return_value);
        assert!(config.namespace.is_none());
    }

    #[test]
    fn partial_json_overrides_fields() {
        let config = StoreConfig::from_json(r#"{"namespace": "todo:", "once_return_value": false}"#).unwrap();
        assert_eq!(config.namespace.as_deref(), Some("todo:"));
        assert!(!config.once_return_value);
        assert_eq!(config.update_event, UPDATE_STATE_EVENT);
    }

    #[test]
    fn malformed_json_is_config_error() {
        let err = StoreConfig::from_json("{ nope").unwrap_err();
        assert!(matches!(err, FluxError::Config(_)));
    }

    #[test]
    fn with_namespace_builder() {
        let config = StoreConfig::default().with_namespace("cart:");
        assert_eq!(config.namespace.as_deref(), Some("cart:"));
    }
}
