//! Read-only access to entity master data, rule versions, pass-through rules
//! and flow limits.
//!
//! The engine only needs the [`RuleRepository`] contract; where the records
//! live is up to the implementor. [`InMemoryRepository`] holds a whole
//! snapshot and is what the CLI and tests load from JSON or YAML.

use serde::{Deserialize, Serialize};

use crate::entities::records::{
    EntityRecord, FlowConstraintRecord, HhyRuleRecord, RuleVersionRecord, DEFAULT_RULE_VERSION,
};
use crate::error::FlowTaxError;
use crate::FlowTaxResult;

const SAMPLE_SNAPSHOT: &str = include_str!("../data/sample_snapshot.json");

pub trait RuleRepository {
    fn active_rule_version(&self) -> FlowTaxResult<String>;

    /// Every entity, ordered by level then code.
    fn all_entities(&self) -> FlowTaxResult<Vec<EntityRecord>>;

    fn entity_by_code(&self, code: &str) -> FlowTaxResult<Option<EntityRecord>>;

    fn hhy_rule(&self, hhy_code: &str, version: &str) -> FlowTaxResult<Option<HhyRuleRecord>>;

    /// A record without a rule version applies to every version.
    fn flow_constraint(
        &self,
        from_code: &str,
        to_code: &str,
        version: &str,
    ) -> FlowTaxResult<Option<FlowConstraintRecord>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryRepository {
    #[serde(default)]
    pub rule_versions: Vec<RuleVersionRecord>,
    #[serde(default)]
    pub entities: Vec<EntityRecord>,
    #[serde(default)]
    pub hhy_rules: Vec<HhyRuleRecord>,
    #[serde(default)]
    pub flow_constraints: Vec<FlowConstraintRecord>,
}

impl InMemoryRepository {
    pub fn from_json(text: &str) -> FlowTaxResult<Self> {
        serde_json::from_str(text).map_err(|e| FlowTaxError::Repository(format!("snapshot: {}", e)))
    }

    /// The bundled demonstration dataset: two funding companies, two
    /// intermediate companies, two partnerships and two individuals.
    pub fn sample() -> FlowTaxResult<Self> {
        Self::from_json(SAMPLE_SNAPSHOT)
    }

    pub fn rule_version(&self, version: &str) -> Option<&RuleVersionRecord> {
        self.rule_versions.iter().find(|v| v.version == version)
    }
}

impl RuleRepository for InMemoryRepository {
    fn active_rule_version(&self) -> FlowTaxResult<String> {
        Ok(self
            .rule_versions
            .iter()
            .find(|v| v.is_active)
            .map(|v| v.version.clone())
            .unwrap_or_else(|| DEFAULT_RULE_VERSION.to_string()))
    }

    fn all_entities(&self) -> FlowTaxResult<Vec<EntityRecord>> {
        let mut records = self.entities.clone();
        records.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.code.cmp(&b.code)));
        Ok(records)
    }

    fn entity_by_code(&self, code: &str) -> FlowTaxResult<Option<EntityRecord>> {
        Ok(self.entities.iter().find(|e| e.code == code).cloned())
    }

    fn hhy_rule(&self, hhy_code: &str, version: &str) -> FlowTaxResult<Option<HhyRuleRecord>> {
        Ok(self
            .hhy_rules
            .iter()
            .find(|r| r.hhy_code == hhy_code && r.rule_version == version)
            .cloned())
    }

    fn flow_constraint(
        &self,
        from_code: &str,
        to_code: &str,
        version: &str,
    ) -> FlowTaxResult<Option<FlowConstraintRecord>> {
        let mut candidates = self
            .flow_constraints
            .iter()
            .filter(|c| c.from_company == from_code && c.to_company == to_code);

        let exact = candidates
            .clone()
            .find(|c| c.rule_version.as_deref() == Some(version));
        Ok(exact
            .or_else(|| candidates.find(|c| c.rule_version.is_none()))
            .cloned())
    }
}
