//! Pipeline configuration.
//!
//! Loading a config file (TOML/YAML, file watching) is out of scope; this
//! module only defines the shape the processor is constructed from and the
//! `env:`/`envOptional:` expansion contract the surrounding loader is
//! expected to apply to string fields before deserializing into [`Config`].

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::allowlist::{Allowlist, AllowlistRule};
use crate::error::{AllowlistError, ConfigError};

/// One allowlist rule as it appears in configuration, before the code-id
/// keys (which may themselves be `env:`-expanded references into another
/// part of config) are resolved to concrete `u64`s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowlistRuleConfig {
    pub code_ids_keys: Vec<String>,
    pub state_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bech32 human-readable prefix used to render contract addresses.
    pub bech32_prefix: String,
    /// Chain ID. When absent it is read from the node at startup, out of
    /// scope here: the processor is always constructed with one.
    pub chain_id: Option<String>,
    /// Base URL of the node's REST/JSON RPC endpoint, used by the resolver.
    pub rpc_endpoint: String,
    #[serde(default)]
    pub send_webhooks: bool,
    #[serde(default)]
    pub state_event_allowlist: HashMap<String, Vec<AllowlistRuleConfig>>,
}

impl Config {
    /// Builds the runtime [`Allowlist`] the processor filters state events
    /// with, from this config's `state_event_allowlist`.
    ///
    /// Resolving a symbolic code-key group name (e.g. `"cl-vault"`) to a
    /// concrete set of code ids is the job of an external Wasm-code
    /// registry this crate does not own. By the time a rule reaches this
    /// crate's configuration, each entry in `code_ids_keys` is expected to
    /// already be that resolved numeric code id, written as a decimal
    /// string. An entry that doesn't parse is reported rather than
    /// silently dropped, so a misconfigured chain fails at startup instead
    /// of quietly admitting everything.
    pub fn build_allowlist(&self) -> Result<Allowlist, AllowlistError> {
        let mut rules_by_chain = HashMap::new();
        for (chain_id, rule_configs) in &self.state_event_allowlist {
            let mut rules = Vec::with_capacity(rule_configs.len());
            for rule_config in rule_configs {
                let mut code_ids = HashSet::new();
                for key in &rule_config.code_ids_keys {
                    let code_id = key.parse::<u64>().map_err(|_| AllowlistError::UnknownCodeKeyGroup {
                        chain_id: chain_id.clone(),
                        group: key.clone(),
                    })?;
                    code_ids.insert(code_id);
                }
                rules.push(AllowlistRule {
                    code_ids,
                    state_keys: rule_config.state_keys.iter().cloned().collect(),
                });
            }
            rules_by_chain.insert(chain_id.clone(), rules);
        }
        Ok(Allowlist::new(rules_by_chain))
    }
}

/// Expands a single configuration string per the `env:NAME` /
/// `envOptional:NAME` contract.
///
/// A value with no recognized prefix is returned unchanged. `env:NAME`
/// reads `NAME` from the process environment; an unset variable is a
/// fatal [`ConfigError`]. `envOptional:NAME` reads `NAME` from the process
/// environment; an unset variable expands to the empty string.
pub fn expand_env(raw: &str) -> Result<String, ConfigError> {
    if let Some(name) = raw.strip_prefix("env:") {
        std::env::var(name).map_err(|_| ConfigError::MissingRequiredEnvVar(name.to_string()))
    } else if let Some(name) = raw.strip_prefix("envOptional:") {
        Ok(std::env::var(name).unwrap_or_default())
    } else {
        Ok(raw.to_string())
    }
}
