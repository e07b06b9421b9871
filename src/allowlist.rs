//! Per-chain rule set restricting which state keys are persisted.
//!
//! Each rule names a set of resolved code IDs and a set of canonical state
//! keys. For contracts whose code ID is in a rule's set, only events whose
//! key is in that rule's key set are kept. When more than one rule applies
//! to the same code ID, every one of them must admit the key: overlapping
//! rules tighten what is kept, they never widen it.

use std::collections::{HashMap, HashSet};

use crate::model::CodeId;

#[derive(Debug, Clone)]
pub struct AllowlistRule {
    pub code_ids: HashSet<u64>,
    pub state_keys: HashSet<String>,
}

/// Rules grouped by chain ID. A chain absent from the map has no
/// restrictions: all state events pass.
#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    rules_by_chain: HashMap<String, Vec<AllowlistRule>>,
}

impl Allowlist {
    pub fn new(rules_by_chain: HashMap<String, Vec<AllowlistRule>>) -> Self {
        Self { rules_by_chain }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns whether a state event with the given resolved `code_id` and
    /// canonical `key` should be persisted for `chain_id`.
    ///
    /// An unresolved code ID (`0`) is always kept: the decision is deferred
    /// to a later batch once resolution succeeds.
    pub fn is_allowed(&self, chain_id: &str, code_id: CodeId, key: &str) -> bool {
        if !code_id.is_known() {
            return true;
        }

        let Some(rules) = self.rules_by_chain.get(chain_id) else {
            return true;
        };

        rules
            .iter()
            .filter(|rule| rule.code_ids.contains(&code_id.as_u64()))
            .all(|rule| rule.state_keys.contains(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(code_ids: &[u64], state_keys: &[&str]) -> AllowlistRule {
        AllowlistRule {
            code_ids: code_ids.iter().copied().collect(),
            state_keys: state_keys.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn no_rule_for_chain_passes_everything() {
        let allowlist = Allowlist::empty();
        assert!(allowlist.is_allowed("osmosis-1", CodeId(100), "anything"));
    }

    #[test]
    fn unresolved_code_id_always_kept() {
        let mut rules = HashMap::new();
        rules.insert(
            "osmosis-1".to_string(),
            vec![rule(&[100], &["contract_info"])],
        );
        let allowlist = Allowlist::new(rules);
        assert!(allowlist.is_allowed("osmosis-1", CodeId::UNKNOWN, "balances"));
    }

    #[test]
    fn rule_confines_matching_code_id() {
        let mut rules = HashMap::new();
        rules.insert(
            "osmosis-1".to_string(),
            vec![rule(&[100], &["contract_info"])],
        );
        let allowlist = Allowlist::new(rules);
        assert!(allowlist.is_allowed("osmosis-1", CodeId(100), "contract_info"));
        assert!(!allowlist.is_allowed("osmosis-1", CodeId(100), "balances"));
    }

    #[test]
    fn other_code_ids_unaffected_by_rule() {
        let mut rules = HashMap::new();
        rules.insert(
            "osmosis-1".to_string(),
            vec![rule(&[100], &["contract_info"])],
        );
        let allowlist = Allowlist::new(rules);
        assert!(allowlist.is_allowed("osmosis-1", CodeId(200), "balances"));
    }

    #[test]
    fn overlapping_rules_tighten_conjunctively() {
        let mut rules = HashMap::new();
        rules.insert(
            "osmosis-1".to_string(),
            vec![
                rule(&[100], &["contract_info", "balances"]),
                rule(&[100], &["contract_info"]),
            ],
        );
        let allowlist = Allowlist::new(rules);
        assert!(allowlist.is_allowed("osmosis-1", CodeId(100), "contract_info"));
        assert!(!allowlist.is_allowed("osmosis-1", CodeId(100), "balances"));
    }
}
