use clap::{Args, ValueEnum};
use serde_json::{json, Value};

use flow_tax_core::entities::{Entity, EntityKind};
use flow_tax_core::FlowTaxError;

use super::load_state;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum GraphView {
    Entities,
    Companies,
    Partnerships,
    Individuals,
    Sources,
    Rules,
    Constraints,
}

/// Arguments for inspecting the loaded entity graph
#[derive(Args)]
pub struct GraphArgs {
    /// What to list
    #[arg(long, value_enum, default_value = "entities")]
    pub view: GraphView,

    /// List only the direct children of this entity
    #[arg(long)]
    pub children_of: Option<String>,

    /// Rule version (default: the snapshot's active version)
    #[arg(long)]
    pub rule_version: Option<String>,
}

fn entity_row(entity: &Entity) -> Value {
    let (vat, surtax, eit, pit) = match &entity.kind {
        EntityKind::Company {
            vat_rate,
            surtax_rate,
            eit_rate,
            ..
        } => (*vat_rate, *surtax_rate, *eit_rate, None),
        EntityKind::Partnership => (None, None, None, None),
        EntityKind::Individual { pit_rate } => (None, None, None, *pit_rate),
    };
    json!({
        "code": entity.code,
        "name": entity.name,
        "level": entity.level,
        "entity_type": entity.kind.name(),
        "parent_code": entity.parent_code,
        "vat_rate": vat,
        "surtax_rate": surtax,
        "eit_rate": eit,
        "pit_rate": pit,
    })
}

pub fn run_graph(args: GraphArgs, snapshot: Option<&str>) -> Result<Value, Box<dyn std::error::Error>> {
    let state = load_state(snapshot, args.rule_version.as_deref())?;

    let rows: Vec<Value> = if let Some(parent) = &args.children_of {
        if state.entity(parent).is_none() {
            return Err(FlowTaxError::UnknownEntity(parent.clone()).into());
        }
        state.children(parent).into_iter().map(entity_row).collect()
    } else {
        match args.view {
            GraphView::Entities => state.entities().into_iter().map(entity_row).collect(),
            GraphView::Companies => state.companies().into_iter().map(entity_row).collect(),
            GraphView::Partnerships => state.partnerships().into_iter().map(entity_row).collect(),
            GraphView::Individuals => state.individuals().into_iter().map(entity_row).collect(),
            GraphView::Sources => state.source_entities().into_iter().map(entity_row).collect(),
            GraphView::Rules => state
                .hhy_rules()
                .map(|rule| {
                    json!({
                        "hhy_code": rule.hhy_code,
                        "rule_version": rule.rule_version,
                        "allocations": rule.allocations,
                        "income_nature": rule.income_nature,
                        "merge_comprehensive": rule.merges_comprehensive(),
                        "bonus_special_tax": rule.applies_bonus_special_tax(),
                        "warnings": rule.check_allocations(),
                    })
                })
                .collect(),
            GraphView::Constraints => state
                .flow_constraints()
                .map(serde_json::to_value)
                .collect::<Result<_, _>>()?,
        }
    };

    Ok(json!({
        "result": rows,
        "methodology": format!("Entity graph at rule version {}", state.rule_version()),
        "warnings": [],
    }))
}

// ---------------------------------------------------------------------------
// validate-flow
// ---------------------------------------------------------------------------

/// Arguments for checking whether one transfer is legal
#[derive(Args)]
pub struct ValidateFlowArgs {
    /// Sender code
    #[arg(long)]
    pub from: String,

    /// Receiver code
    #[arg(long)]
    pub to: String,

    /// Rule version (default: the snapshot's active version)
    #[arg(long)]
    pub rule_version: Option<String>,
}

/// A rejected flow is a normal answer here, not a command failure.
pub fn run_validate_flow(
    args: ValidateFlowArgs,
    snapshot: Option<&str>,
) -> Result<Value, Box<dyn std::error::Error>> {
    let state = load_state(snapshot, args.rule_version.as_deref())?;

    let result = match state.validate_flow(&args.from, &args.to) {
        Ok(limit) => json!({
            "from": args.from,
            "to": args.to,
            "allowed": true,
            "reason": "passed",
            "max_amount": limit.map(|c| c.max_amount),
            "constraint_type": limit.map(|c| c.constraint_type.clone()),
        }),
        Err(e @ (FlowTaxError::UnknownEntity(_) | FlowTaxError::HierarchyViolation { .. })) => {
            json!({
                "from": args.from,
                "to": args.to,
                "allowed": false,
                "reason": e.to_string(),
                "max_amount": null,
                "constraint_type": null,
            })
        }
        Err(e) => return Err(e.into()),
    };

    Ok(json!({
        "result": result,
        "methodology": format!(
            "Receiver must sit exactly one level below the sender (rule version {})",
            state.rule_version()
        ),
        "warnings": [],
    }))
}
