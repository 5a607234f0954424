//! Raw repository records and their normalization into typed model values.
//!
//! Records mirror what a backing store hands over: rates as number-or-null,
//! rule payloads as JSON text. Everything is checked once here so the rest
//! of the engine only sees well-formed values.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::entities::hhy::HhyRule;
use crate::entities::model::{Entity, EntityKind, FlowConstraint, DEFAULT_CONSTRAINT_TYPE};
use crate::error::FlowTaxError;
use crate::types::*;
use crate::FlowTaxResult;

/// Rule version assumed when the store has none marked active.
pub const DEFAULT_RULE_VERSION: &str = "v1.0";

/// Store-side default for a flow limit with no explicit amount.
pub const DEFAULT_MAX_FLOW_AMOUNT: Money = dec!(500000);

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

fn default_entity_type() -> String {
    "company".to_string()
}

fn default_max_amount() -> Money {
    DEFAULT_MAX_FLOW_AMOUNT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub code: String,
    pub name: String,
    pub level: i64,
    #[serde(default = "default_entity_type")]
    pub entity_type: String,
    #[serde(default)]
    pub vat_rate: Option<Decimal>,
    #[serde(default)]
    pub surtax_rate: Option<Decimal>,
    #[serde(default)]
    pub eit_rate: Option<Decimal>,
    #[serde(default)]
    pub pit_rate: Option<Decimal>,
    #[serde(default)]
    pub is_vat_general_taxpayer: bool,
    #[serde(default)]
    pub parent_code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HhyRuleRecord {
    pub hhy_code: String,
    pub rule_version: String,
    /// JSON object: individual code -> ratio.
    pub allocations: String,
    /// JSON object: individual code -> income nature.
    pub income_nature: String,
    /// JSON object of merge flags.
    pub merge_policy: String,
    #[serde(default)]
    pub validation_rules: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowConstraintRecord {
    pub from_company: String,
    pub to_company: String,
    #[serde(default = "default_max_amount")]
    pub max_amount: Decimal,
    #[serde(default)]
    pub constraint_type: Option<String>,
    /// `None` applies to every rule version.
    #[serde(default)]
    pub rule_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleVersionRecord {
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub effective_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_active: bool,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Null and zero both mean "does not apply"; anything outside [0, 1] is bad data.
fn normalize_rate(record: &str, field: &str, rate: Option<Decimal>) -> FlowTaxResult<Option<Rate>> {
    match rate {
        None => Ok(None),
        Some(r) if r < Decimal::ZERO || r > Decimal::ONE => Err(FlowTaxError::malformed(
            record,
            format!("{} {} is outside [0, 1]", field, r),
        )),
        Some(r) if r.is_zero() => Ok(None),
        Some(r) => Ok(Some(r)),
    }
}

fn reject_rate(record: &str, field: &str, kind: &str, rate: Option<Decimal>) -> FlowTaxResult<()> {
    match rate {
        Some(r) if !r.is_zero() => Err(FlowTaxError::malformed(
            record,
            format!("{} entities cannot carry {} ({})", kind, field, r),
        )),
        _ => Ok(()),
    }
}

impl TryFrom<&EntityRecord> for Entity {
    type Error = FlowTaxError;

    fn try_from(record: &EntityRecord) -> FlowTaxResult<Entity> {
        let label = format!("entity {}", record.code);

        if record.code.trim().is_empty() {
            return Err(FlowTaxError::malformed(label, "code is empty"));
        }
        let level = u32::try_from(record.level)
            .ok()
            .filter(|l| *l >= 1)
            .ok_or_else(|| {
                FlowTaxError::malformed(&label, format!("level {} is not a positive integer", record.level))
            })?;

        let kind = match record.entity_type.as_str() {
            "company" => {
                reject_rate(&label, "pit_rate", "company", record.pit_rate)?;
                EntityKind::Company {
                    vat_rate: normalize_rate(&label, "vat_rate", record.vat_rate)?,
                    surtax_rate: normalize_rate(&label, "surtax_rate", record.surtax_rate)?,
                    eit_rate: normalize_rate(&label, "eit_rate", record.eit_rate)?,
                    is_vat_general_taxpayer: record.is_vat_general_taxpayer,
                }
            }
            "partnership" => {
                for (field, rate) in [
                    ("vat_rate", record.vat_rate),
                    ("surtax_rate", record.surtax_rate),
                    ("eit_rate", record.eit_rate),
                    ("pit_rate", record.pit_rate),
                ] {
                    reject_rate(&label, field, "partnership", rate)?;
                }
                EntityKind::Partnership
            }
            "individual" => {
                for (field, rate) in [
                    ("vat_rate", record.vat_rate),
                    ("surtax_rate", record.surtax_rate),
                    ("eit_rate", record.eit_rate),
                ] {
                    reject_rate(&label, field, "individual", rate)?;
                }
                EntityKind::Individual {
                    pit_rate: normalize_rate(&label, "pit_rate", record.pit_rate)?,
                }
            }
            other => {
                return Err(FlowTaxError::malformed(
                    label,
                    format!("unknown entity_type '{}'", other),
                ))
            }
        };

        Ok(Entity {
            code: record.code.clone(),
            name: record.name.clone(),
            level,
            kind,
            parent_code: record.parent_code.clone().filter(|p| !p.is_empty()),
            description: record.description.clone().unwrap_or_default(),
        })
    }
}

fn parse_payload<T: DeserializeOwned>(record: &str, field: &str, text: &str) -> FlowTaxResult<T> {
    let text = if text.trim().is_empty() { "{}" } else { text };
    serde_json::from_str(text)
        .map_err(|e| FlowTaxError::malformed(record, format!("{} payload: {}", field, e)))
}

impl TryFrom<&HhyRuleRecord> for HhyRule {
    type Error = FlowTaxError;

    fn try_from(record: &HhyRuleRecord) -> FlowTaxResult<HhyRule> {
        let label = format!("HHY rule {}@{}", record.hhy_code, record.rule_version);

        Ok(HhyRule {
            hhy_code: record.hhy_code.clone(),
            rule_version: record.rule_version.clone(),
            allocations: parse_payload(&label, "allocations", &record.allocations)?,
            income_nature: parse_payload(&label, "income_nature", &record.income_nature)?,
            merge_policy: parse_payload(&label, "merge_policy", &record.merge_policy)?,
            validation: parse_payload(
                &label,
                "validation_rules",
                record.validation_rules.as_deref().unwrap_or("{}"),
            )?,
        })
    }
}

impl FlowConstraint {
    /// Normalize a store record, stamping `version` when the record applies
    /// to every version.
    pub fn from_record(record: &FlowConstraintRecord, version: &str) -> FlowTaxResult<Self> {
        if record.max_amount < Decimal::ZERO {
            return Err(FlowTaxError::malformed(
                format!("flow constraint {}->{}", record.from_company, record.to_company),
                format!("max_amount {} is negative", record.max_amount),
            ));
        }

        Ok(FlowConstraint {
            from_code: record.from_company.clone(),
            to_code: record.to_company.clone(),
            max_amount: record.max_amount,
            constraint_type: record
                .constraint_type
                .clone()
                .unwrap_or_else(|| DEFAULT_CONSTRAINT_TYPE.to_string()),
            rule_version: record
                .rule_version
                .clone()
                .unwrap_or_else(|| version.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::hhy::IncomeNature;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn company_record() -> EntityRecord {
        EntityRecord {
            code: "KKG".to_string(),
            name: "KKG Co".to_string(),
            level: 2,
            entity_type: "company".to_string(),
            vat_rate: Some(dec!(0.06)),
            surtax_rate: Some(dec!(0.12)),
            eit_rate: Some(dec!(0.25)),
            pit_rate: None,
            is_vat_general_taxpayer: true,
            parent_code: Some("PXA".to_string()),
            description: None,
        }
    }

    #[test]
    fn test_company_record_normalizes() {
        let entity = Entity::try_from(&company_record()).unwrap();
        assert_eq!(entity.level, 2);
        assert_eq!(
            entity.kind,
            EntityKind::Company {
                vat_rate: Some(dec!(0.06)),
                surtax_rate: Some(dec!(0.12)),
                eit_rate: Some(dec!(0.25)),
                is_vat_general_taxpayer: true,
            }
        );
        assert_eq!(entity.parent_code.as_deref(), Some("PXA"));
        assert_eq!(entity.description, "");
    }

    #[test]
    fn test_zero_rate_becomes_inapplicable() {
        let mut record = company_record();
        record.eit_rate = Some(dec!(0));
        let entity = Entity::try_from(&record).unwrap();
        match entity.kind {
            EntityKind::Company { eit_rate, .. } => assert_eq!(eit_rate, None),
            other => panic!("Expected company, got {:?}", other),
        }
    }

    #[test]
    fn test_partnership_with_rate_is_malformed() {
        let mut record = company_record();
        record.entity_type = "partnership".to_string();
        match Entity::try_from(&record).unwrap_err() {
            FlowTaxError::MalformedRecord { reason, .. } => {
                assert!(reason.contains("partnership entities cannot carry vat_rate"))
            }
            other => panic!("Expected MalformedRecord, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_level_and_type_rejected() {
        let mut record = company_record();
        record.level = 0;
        assert!(Entity::try_from(&record).is_err());

        let mut record = company_record();
        record.entity_type = "trust".to_string();
        assert!(Entity::try_from(&record).is_err());

        let mut record = company_record();
        record.vat_rate = Some(dec!(6));
        assert!(Entity::try_from(&record).is_err());
    }

    #[test]
    fn test_entity_record_defaults_from_json() {
        let record: EntityRecord = serde_json::from_str(
            r#"{"code": "PXA", "name": "PXA Co", "level": 1, "vat_rate": 0.06, "surtax_rate": null}"#,
        )
        .unwrap();
        assert_eq!(record.entity_type, "company");
        assert_eq!(record.vat_rate, Some(dec!(0.06)));
        assert_eq!(record.surtax_rate, None);
        assert!(!record.is_vat_general_taxpayer);
    }

    #[test]
    fn test_hhy_record_parses_payloads() {
        let record = HhyRuleRecord {
            hhy_code: "HHY".to_string(),
            rule_version: "v1.0".to_string(),
            allocations: r#"{"SZW": 1.0}"#.to_string(),
            income_nature: r#"{"SZW": "comprehensive"}"#.to_string(),
            merge_policy: r#"{"merge_to_szw": true, "bonus_special_tax": false}"#.to_string(),
            validation_rules: Some(r#"{"min_ratio": 0, "max_ratio": 1}"#.to_string()),
        };
        let rule = HhyRule::try_from(&record).unwrap();
        assert_eq!(rule.allocation_ratio("SZW"), dec!(1));
        assert_eq!(rule.income_nature("SZW"), IncomeNature::Comprehensive);
        assert!(rule.merges_comprehensive());
        assert_eq!(rule.validation.max_ratio, Some(dec!(1)));
        assert!(rule.check_allocations().is_empty());
    }

    #[test]
    fn test_hhy_record_bad_payload_is_malformed() {
        let record = HhyRuleRecord {
            hhy_code: "HHY".to_string(),
            rule_version: "v1.0".to_string(),
            allocations: r#"{"SZW": "lots"}"#.to_string(),
            income_nature: "{}".to_string(),
            merge_policy: "{}".to_string(),
            validation_rules: None,
        };
        match HhyRule::try_from(&record).unwrap_err() {
            FlowTaxError::MalformedRecord { record, reason } => {
                assert!(record.contains("HHY"));
                assert!(reason.starts_with("allocations payload"));
            }
            other => panic!("Expected MalformedRecord, got {:?}", other),
        }
    }

    #[test]
    fn test_constraint_record_defaults() {
        let record: FlowConstraintRecord =
            serde_json::from_str(r#"{"from_company": "PXA", "to_company": "KKG"}"#).unwrap();
        let constraint = FlowConstraint::from_record(&record, "v2.0").unwrap();
        assert_eq!(constraint.max_amount, dec!(500000));
        assert_eq!(constraint.constraint_type, "annual_limit");
        assert_eq!(constraint.rule_version, "v2.0");
    }
}
