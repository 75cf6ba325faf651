//! The credentials handed to the DON-hosted function.

use serde::Serialize;
use std::collections::BTreeMap;

pub const ALPACA_KEY: &str = "alpacaKey";
pub const ALPACA_SECRET: &str = "alpacaSecret";

const ALPACA_API_KEY_VAR: &str = "ALPACA_API_KEY";
// Older deployments exported the key under this misspelt name
const ALPACA_API_KEY_LEGACY_VAR: &str = "APLACA_API_KEY";
const ALPACA_SECRET_KEY_VAR: &str = "ALPACA_SECRET_KEY";

/// String-to-string secrets map, serialized with sorted keys
#[derive(Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Secrets(BTreeMap<String, String>);

impl Secrets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the Alpaca credential pair. Both keys are always present;
    /// unset values become empty strings.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_key = lookup(ALPACA_API_KEY_VAR)
            .or_else(|| lookup(ALPACA_API_KEY_LEGACY_VAR))
            .unwrap_or_default();
        let secret_key = lookup(ALPACA_SECRET_KEY_VAR).unwrap_or_default();

        Self::alpaca(api_key, secret_key)
    }

    pub fn alpaca(api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        let mut secrets = Self::new();
        secrets.insert(ALPACA_KEY, api_key);
        secrets.insert(ALPACA_SECRET, secret_key);
        secrets
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Compact JSON object, e.g. `{"alpacaKey":"...","alpacaSecret":"..."}`
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }
}

// Never print the values
impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}
