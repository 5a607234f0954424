use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::entities::{Entity, FlowConstraint, HhyRule};
use crate::error::FlowTaxError;
use crate::repository::RuleRepository;
use crate::types::*;
use crate::FlowTaxResult;

fn constraint_key(from_code: &str, to_code: &str) -> String {
    format!("{}->{}", from_code, to_code)
}

/// Everything one simulation run needs, loaded once for a single rule
/// version. Never mutated after construction; load a new state when the
/// rule version changes.
#[derive(Debug, Clone, Serialize)]
pub struct GraphState {
    rule_version: String,
    entities: BTreeMap<String, Entity>,
    hhy_rules: BTreeMap<String, HhyRule>,
    flow_constraints: BTreeMap<String, FlowConstraint>,
    initial_funds: BTreeMap<String, Money>,
    total_initial_amount: Money,
}

impl GraphState {
    /// Load the repository's active rule version.
    pub fn load<R: RuleRepository + ?Sized>(repo: &R) -> FlowTaxResult<Self> {
        let version = repo.active_rule_version()?;
        Self::load_version(repo, &version)
    }

    /// Load a specific rule version. Any malformed record aborts the load.
    pub fn load_version<R: RuleRepository + ?Sized>(repo: &R, version: &str) -> FlowTaxResult<Self> {
        let mut entities: BTreeMap<String, Entity> = BTreeMap::new();
        for record in repo.all_entities()? {
            let entity = Entity::try_from(&record)?;
            if entities.contains_key(&entity.code) {
                return Err(FlowTaxError::malformed(
                    format!("entity {}", entity.code),
                    "duplicate code",
                ));
            }
            entities.insert(entity.code.clone(), entity);
        }

        for entity in entities.values() {
            if let Some(parent_code) = &entity.parent_code {
                let parent = entities.get(parent_code).ok_or_else(|| {
                    FlowTaxError::malformed(
                        format!("entity {}", entity.code),
                        format!("unknown parent {}", parent_code),
                    )
                })?;
                if parent.level >= entity.level {
                    return Err(FlowTaxError::malformed(
                        format!("entity {}", entity.code),
                        format!(
                            "level {} is not below parent {} (level {})",
                            entity.level, parent.code, parent.level
                        ),
                    ));
                }
            }
        }

        let mut hhy_rules: BTreeMap<String, HhyRule> = BTreeMap::new();
        for code in entities.keys() {
            if let Some(record) = repo.hhy_rule(code, version)? {
                let rule = HhyRule::try_from(&record)?;
                check_rule_targets(&rule, &entities)?;
                hhy_rules.insert(code.clone(), rule);
            }
        }

        let mut flow_constraints: BTreeMap<String, FlowConstraint> = BTreeMap::new();
        for from_code in entities.keys() {
            for to_code in entities.keys() {
                if from_code == to_code {
                    continue;
                }
                if let Some(record) = repo.flow_constraint(from_code, to_code, version)? {
                    flow_constraints.insert(
                        constraint_key(from_code, to_code),
                        FlowConstraint::from_record(&record, version)?,
                    );
                }
            }
        }

        tracing::info!(
            rule_version = version,
            entities = entities.len(),
            hhy_rules = hhy_rules.len(),
            flow_constraints = flow_constraints.len(),
            "graph state loaded"
        );

        Ok(GraphState {
            rule_version: version.to_string(),
            entities,
            hhy_rules,
            flow_constraints,
            initial_funds: BTreeMap::new(),
            total_initial_amount: Decimal::ZERO,
        })
    }

    /// Seed the fund amounts held by source entities before any transfer.
    pub fn with_initial_funds(mut self, funds: BTreeMap<String, Money>) -> FlowTaxResult<Self> {
        for (code, amount) in &funds {
            let entity = self.entities.get(code).ok_or_else(|| FlowTaxError::InvalidInput {
                field: "initial_funds".to_string(),
                reason: format!("unknown entity {}", code),
            })?;
            if !entity.is_source() {
                return Err(FlowTaxError::InvalidInput {
                    field: "initial_funds".to_string(),
                    reason: format!("{} is level {}, only level-1 sources hold funds", code, entity.level),
                });
            }
            if *amount < Decimal::ZERO {
                return Err(FlowTaxError::InvalidInput {
                    field: "initial_funds".to_string(),
                    reason: format!("{} amount {} is negative", code, amount),
                });
            }
        }

        self.total_initial_amount = funds.values().copied().sum();
        self.initial_funds = funds;
        Ok(self)
    }

    /// Seed the two source entities (in code order) with the given amounts.
    pub fn with_default_initial_funds(self, first: Money, second: Money) -> FlowTaxResult<Self> {
        let sources: Vec<String> = self
            .source_entities()
            .into_iter()
            .map(|e| e.code.clone())
            .collect();
        if sources.len() != 2 {
            return Err(FlowTaxError::InvalidInput {
                field: "initial_funds".to_string(),
                reason: format!("expected two source entities, found {}", sources.len()),
            });
        }

        let funds = sources.into_iter().zip([first, second]).collect();
        self.with_initial_funds(funds)
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn rule_version(&self) -> &str {
        &self.rule_version
    }

    pub fn entity(&self, code: &str) -> Option<&Entity> {
        self.entities.get(code)
    }

    pub fn hhy_rule(&self, hhy_code: &str) -> Option<&HhyRule> {
        self.hhy_rules.get(hhy_code)
    }

    pub fn flow_constraint(&self, from_code: &str, to_code: &str) -> Option<&FlowConstraint> {
        self.flow_constraints.get(&constraint_key(from_code, to_code))
    }

    pub fn hhy_rules(&self) -> impl Iterator<Item = &HhyRule> {
        self.hhy_rules.values()
    }

    pub fn flow_constraints(&self) -> impl Iterator<Item = &FlowConstraint> {
        self.flow_constraints.values()
    }

    pub fn initial_funds(&self) -> &BTreeMap<String, Money> {
        &self.initial_funds
    }

    pub fn initial_fund(&self, code: &str) -> Money {
        self.initial_funds.get(code).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn total_initial_amount(&self) -> Money {
        self.total_initial_amount
    }

    // -----------------------------------------------------------------------
    // Graph views, ordered by level then code
    // -----------------------------------------------------------------------

    fn filtered(&self, keep: impl Fn(&Entity) -> bool) -> Vec<&Entity> {
        let mut found: Vec<&Entity> = self.entities.values().filter(|e| keep(e)).collect();
        found.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.code.cmp(&b.code)));
        found
    }

    pub fn entities(&self) -> Vec<&Entity> {
        self.filtered(|_| true)
    }

    pub fn children(&self, parent_code: &str) -> Vec<&Entity> {
        if !self.entities.contains_key(parent_code) {
            return Vec::new();
        }
        self.filtered(|e| e.parent_code.as_deref() == Some(parent_code))
    }

    pub fn individuals(&self) -> Vec<&Entity> {
        self.filtered(Entity::is_individual)
    }

    pub fn companies(&self) -> Vec<&Entity> {
        self.filtered(Entity::is_company)
    }

    pub fn partnerships(&self) -> Vec<&Entity> {
        self.filtered(Entity::is_partnership)
    }

    pub fn source_entities(&self) -> Vec<&Entity> {
        self.filtered(Entity::is_source)
    }

    pub fn endpoint_entities(&self) -> Vec<&Entity> {
        self.individuals()
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Check a transfer is legal: both codes known, receiver exactly one
    /// level below the sender. Returns the flow limit that bounds the
    /// amount, if one exists; a limit never makes a flow illegal.
    pub fn validate_flow(&self, from_code: &str, to_code: &str) -> FlowTaxResult<Option<&FlowConstraint>> {
        let from = self
            .entity(from_code)
            .ok_or_else(|| FlowTaxError::UnknownEntity(from_code.to_string()))?;
        let to = self
            .entity(to_code)
            .ok_or_else(|| FlowTaxError::UnknownEntity(to_code.to_string()))?;

        if !from.can_transfer_to(to) {
            return Err(FlowTaxError::HierarchyViolation {
                from: from.code.clone(),
                from_level: from.level,
                to: to.code.clone(),
                to_level: to.level,
            });
        }

        Ok(self.flow_constraint(from_code, to_code))
    }
}

/// A rule must belong to a partnership and may only allocate to individuals.
fn check_rule_targets(rule: &HhyRule, entities: &BTreeMap<String, Entity>) -> FlowTaxResult<()> {
    let label = format!("HHY rule {}@{}", rule.hhy_code, rule.rule_version);

    match entities.get(&rule.hhy_code) {
        Some(owner) if owner.is_partnership() => {}
        Some(owner) => {
            return Err(FlowTaxError::malformed(
                label,
                format!("{} is a {}, not a partnership", owner.code, owner.kind.name()),
            ))
        }
        None => return Err(FlowTaxError::malformed(label, "owner entity is unknown")),
    }

    for code in rule.allocations.keys().chain(rule.income_nature.keys()) {
        match entities.get(code) {
            Some(target) if target.is_individual() => {}
            _ => {
                return Err(FlowTaxError::malformed(
                    label,
                    format!("{} is not a known individual", code),
                ))
            }
        }
    }

    Ok(())
}
