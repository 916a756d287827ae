use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::EffectId;

/// One slot in a track's effect chain.
///
/// Chains are always exchanged as whole values, so `PartialEq` here is the
/// deep-equality check used to suppress no-op broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Effect {
    pub id: EffectId,
    /// Effect type name, e.g. "reverb", "delay".
    pub kind: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

fn default_enabled() -> bool {
    true
}

impl Effect {
    pub fn new(id: impl Into<EffectId>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            enabled: true,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.params.insert(name.into(), value);
        self
    }
}
