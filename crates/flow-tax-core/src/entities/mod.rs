pub mod hhy;
pub mod model;
pub mod records;

pub use hhy::{HhyRule, IncomeNature, MergePolicy, ValidationParams};
pub use model::{Entity, EntityKind, FlowConstraint, FlowEdge};
pub use records::{EntityRecord, FlowConstraintRecord, HhyRuleRecord, RuleVersionRecord};
