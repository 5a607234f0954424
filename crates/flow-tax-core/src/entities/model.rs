use serde::{Deserialize, Serialize};

use crate::types::*;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// What an entity is, together with the rates only that kind can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity_type", rename_all = "snake_case")]
pub enum EntityKind {
    Company {
        vat_rate: Option<Rate>,
        surtax_rate: Option<Rate>,
        eit_rate: Option<Rate>,
        is_vat_general_taxpayer: bool,
    },
    /// Pass-through vehicle: no rates of its own.
    Partnership,
    Individual { pit_rate: Option<Rate> },
}

impl EntityKind {
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Company { .. } => "company",
            EntityKind::Partnership => "partnership",
            EntityKind::Individual { .. } => "individual",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub code: String,
    pub name: String,
    /// 1 = top-level fund source; grows by one per hop downstream.
    pub level: u32,
    #[serde(flatten)]
    pub kind: EntityKind,
    pub parent_code: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl Entity {
    pub fn is_company(&self) -> bool {
        matches!(self.kind, EntityKind::Company { .. })
    }

    pub fn is_partnership(&self) -> bool {
        matches!(self.kind, EntityKind::Partnership)
    }

    pub fn is_individual(&self) -> bool {
        matches!(self.kind, EntityKind::Individual { .. })
    }

    pub fn is_source(&self) -> bool {
        self.level == 1
    }

    /// Money may only move down exactly one level.
    pub fn can_transfer_to(&self, target: &Entity) -> bool {
        target.level > self.level && target.level - self.level == 1
    }
}

// ---------------------------------------------------------------------------
// Constraints and edges
// ---------------------------------------------------------------------------

pub const DEFAULT_CONSTRAINT_TYPE: &str = "annual_limit";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowConstraint {
    pub from_code: String,
    pub to_code: String,
    pub max_amount: Money,
    pub constraint_type: String,
    pub rule_version: String,
}

impl FlowConstraint {
    pub fn is_exceeded_by(&self, amount: Money) -> bool {
        amount > self.max_amount
    }
}

/// One instructed transfer between two loaded entities.
#[derive(Debug, Clone, Copy)]
pub struct FlowEdge<'a> {
    pub from: &'a Entity,
    pub to: &'a Entity,
    pub amount: Money,
    pub mode: TransferMode,
}

impl FlowEdge<'_> {
    pub fn is_dividend(&self) -> bool {
        self.mode == TransferMode::Dividend
    }

    pub fn is_bonus(&self) -> bool {
        self.mode == TransferMode::Bonus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entity(code: &str, level: u32, kind: EntityKind) -> Entity {
        Entity {
            code: code.to_string(),
            name: code.to_string(),
            level,
            kind,
            parent_code: None,
            description: String::new(),
        }
    }

    #[test]
    fn test_can_transfer_exactly_one_level_down() {
        let top = entity("A", 1, EntityKind::Partnership);
        let mid = entity("B", 2, EntityKind::Partnership);
        let low = entity("C", 3, EntityKind::Partnership);
        let peer = entity("D", 2, EntityKind::Partnership);

        assert!(top.can_transfer_to(&mid));
        assert!(mid.can_transfer_to(&low));
        assert!(!top.can_transfer_to(&low), "level skip");
        assert!(!mid.can_transfer_to(&peer), "same level");
        assert!(!mid.can_transfer_to(&top), "upward");
        assert!(!mid.can_transfer_to(&mid), "self");
    }

    #[test]
    fn test_kind_predicates() {
        let company = entity(
            "PXA",
            1,
            EntityKind::Company {
                vat_rate: Some(dec!(0.06)),
                surtax_rate: Some(dec!(0.12)),
                eit_rate: Some(dec!(0.25)),
                is_vat_general_taxpayer: true,
            },
        );
        let person = entity("SZW", 4, EntityKind::Individual { pit_rate: Some(dec!(0.2)) });

        assert!(company.is_company() && !company.is_individual());
        assert!(company.is_source());
        assert!(person.is_individual() && !person.is_partnership());
        assert_eq!(person.kind.name(), "individual");
    }

    #[test]
    fn test_entity_serializes_with_flat_kind_tag() {
        let person = entity("SXP", 4, EntityKind::Individual { pit_rate: Some(dec!(0.20)) });
        let json = serde_json::to_value(&person).unwrap();
        assert_eq!(json["entity_type"], "individual");
        assert_eq!(json["pit_rate"], "0.20");
        assert_eq!(json["level"], 4);
    }

    #[test]
    fn test_constraint_exceeded() {
        let c = FlowConstraint {
            from_code: "PXA".to_string(),
            to_code: "KKG".to_string(),
            max_amount: dec!(500000),
            constraint_type: DEFAULT_CONSTRAINT_TYPE.to_string(),
            rule_version: "v1.0".to_string(),
        };
        assert!(!c.is_exceeded_by(dec!(500000)));
        assert!(c.is_exceeded_by(dec!(500000.0001)));
    }
}
