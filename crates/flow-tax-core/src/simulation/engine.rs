use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use crate::entities::{Entity, EntityKind, FlowEdge, HhyRule, IncomeNature};
use crate::error::FlowTaxError;
use crate::simulation::state::GraphState;
use crate::tax::comprehensive::{
    reconcile_comprehensive_income, ComprehensiveIncomeResult, IncomeStream, IncomeStreams,
};
use crate::tax::friction::{calc_edge_friction, EdgeFriction, EdgeFrictionInput};
use crate::types::*;
use crate::FlowTaxResult;

// ---------------------------------------------------------------------------
// Input / Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEdgeInput {
    pub from: String,
    pub to: String,
    pub amount: Money,
    #[serde(default)]
    pub mode: TransferMode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationInput {
    /// Must match the loaded state; omitted means "whatever is loaded".
    #[serde(default)]
    pub rule_version: Option<String>,
    pub edges: Vec<FlowEdgeInput>,
    /// Fail the whole run on the first rejected edge instead of reporting it.
    #[serde(default)]
    pub stop_on_first_failure: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedEdge {
    pub index: usize,
    pub from: String,
    pub to: String,
    pub amount: Money,
    pub mode: TransferMode,
    pub reason: String,
}

/// One individual's share of a partnership's inflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationShare {
    pub edge_index: usize,
    pub partnership: String,
    pub individual: String,
    pub ratio: Rate,
    pub amount: Money,
    pub nature: IncomeNature,
    pub stream: IncomeStream,
    pub merged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLedger {
    pub code: String,
    pub name: String,
    pub entity_type: String,
    pub level: u32,
    pub initial: Money,
    /// Net amounts received.
    pub inflow: Money,
    /// Gross amounts sent, including allocations passed through.
    pub outflow: Money,
    pub retained: Money,
}

/// Income reconciled apart from the individual's main base because the
/// allocating partnership does not merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeparateIncome {
    pub partnership: String,
    pub result: ComprehensiveIncomeResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndividualTaxResult {
    pub code: String,
    pub name: String,
    pub main: ComprehensiveIncomeResult,
    pub separate: Vec<SeparateIncome>,
    pub salary: Money,
    pub salary_tax: Money,
    pub bonus: Money,
    pub bonus_tax: Money,
    pub service_income: Money,
    pub service_tax: Money,
    pub dividend: Money,
    pub dividend_tax: Money,
    pub total_income: Money,
    pub total_tax: Money,
    pub total_net: Money,
    pub effective_rate: Rate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationOutput {
    pub rule_version: String,
    pub edges: Vec<EdgeFriction>,
    pub rejected_edges: Vec<RejectedEdge>,
    pub allocations: Vec<AllocationShare>,
    pub ledger: Vec<EntityLedger>,
    pub individuals: Vec<IndividualTaxResult>,
    pub total_initial_amount: Money,
    pub total_edge_friction: Money,
    pub total_retained: Money,
    pub total_tax: Money,
    pub total_friction: Money,
    pub total_net: Money,
    pub effective_rate: Rate,
}

// ---------------------------------------------------------------------------
// Friction between loaded entities
// ---------------------------------------------------------------------------

/// Friction of one transfer, with the rates taken from what each side is.
/// Only companies carry indirect and enterprise rates; only individuals
/// carry a PIT rate.
pub fn friction_between(
    sender: &Entity,
    receiver: &Entity,
    amount: Money,
    mode: TransferMode,
) -> EdgeFriction {
    let (sender_vat_rate, sender_surtax_rate, sender_eit_rate) = match &sender.kind {
        EntityKind::Company {
            vat_rate,
            surtax_rate,
            eit_rate,
            ..
        } => (*vat_rate, *surtax_rate, *eit_rate),
        EntityKind::Partnership | EntityKind::Individual { .. } => (None, None, None),
    };
    let receiver_pit_rate = match &receiver.kind {
        EntityKind::Individual { pit_rate } => *pit_rate,
        EntityKind::Company { .. } | EntityKind::Partnership => None,
    };

    calc_edge_friction(&EdgeFrictionInput {
        sender_code: sender.code.clone(),
        receiver_code: receiver.code.clone(),
        amount,
        mode,
        sender_vat_rate,
        sender_surtax_rate,
        sender_eit_rate,
        receiver_pit_rate,
        is_pre_tax: None,
    })
}

/// Stream for money paid straight to an individual.
fn direct_stream(mode: TransferMode) -> IncomeStream {
    match mode {
        TransferMode::Bonus => IncomeStream::Bonus,
        TransferMode::Dividend => IncomeStream::Dividend,
        TransferMode::PreTax | TransferMode::PostTax => IncomeStream::Salary,
    }
}

/// Stream for a partnership share, driven by the share's income nature.
/// Bonus shares only get the annual one-time method when the rule's
/// `bonus_special_tax` policy is on; otherwise they join salary.
fn allocated_stream(nature: IncomeNature, edge: &FlowEdge<'_>, rule: &HhyRule) -> IncomeStream {
    match nature {
        IncomeNature::Salary => IncomeStream::Salary,
        IncomeNature::Service => IncomeStream::ServiceIncome,
        IncomeNature::Bonus if rule.applies_bonus_special_tax() => IncomeStream::Bonus,
        IncomeNature::Bonus => IncomeStream::Salary,
        IncomeNature::Dividend => IncomeStream::Dividend,
        IncomeNature::Comprehensive => {
            if edge.is_bonus() && rule.applies_bonus_special_tax() {
                IncomeStream::Bonus
            } else if edge.is_dividend() {
                IncomeStream::Dividend
            } else {
                IncomeStream::Salary
            }
        }
    }
}

/// Most an edge can add to any running total: its amount, scaled up when
/// the receiving partnership hands out more than it receives.
fn exposure(amount: Money, rule: Option<&HhyRule>) -> Option<Money> {
    let weight = match rule {
        Some(rule) => rule
            .allocations
            .values()
            .filter(|ratio| **ratio > Decimal::ZERO)
            .try_fold(Decimal::ZERO, |acc, ratio| acc.checked_add(*ratio))?
            .max(Decimal::ONE),
        None => Decimal::ONE,
    };
    amount.checked_mul(weight)
}

fn checked_total(field: &str, a: Money, b: Money) -> FlowTaxResult<Money> {
    a.checked_add(b).ok_or_else(|| FlowTaxError::InvalidInput {
        field: field.to_string(),
        reason: "Total exceeds the decimal range".to_string(),
    })
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Flows {
    inflow: Money,
    outflow: Money,
}

#[derive(Default)]
struct IncomeBuckets {
    main: IncomeStreams,
    separate: BTreeMap<String, IncomeStreams>,
}

#[derive(Default)]
struct Run {
    flows: BTreeMap<String, Flows>,
    buckets: BTreeMap<String, IncomeBuckets>,
    edges: Vec<EdgeFriction>,
    rejected: Vec<RejectedEdge>,
    allocations: Vec<AllocationShare>,
    sent_by_pair: BTreeMap<(String, String), Money>,
    /// Upper bound on every amount accumulated so far.
    accepted: Money,
    checked_rules: BTreeSet<String>,
    warnings: Vec<String>,
}

impl Run {
    fn send(&mut self, from: &str, to: &str, gross: Money, net: Money) {
        self.flows.entry(from.to_string()).or_default().outflow += gross;
        self.flows.entry(to.to_string()).or_default().inflow += net;
    }

    fn credit(&mut self, individual: &str, separate_from: Option<&str>, stream: IncomeStream, amount: Money) {
        let buckets = self.buckets.entry(individual.to_string()).or_default();
        match separate_from {
            Some(partnership) => buckets
                .separate
                .entry(partnership.to_string())
                .or_default()
                .credit(stream, amount),
            None => buckets.main.credit(stream, amount),
        }
    }

    /// Split a partnership's net inflow across its individuals.
    fn allocate(&mut self, index: usize, edge: &FlowEdge<'_>, rule: &HhyRule, net: Money) {
        if self.checked_rules.insert(rule.hhy_code.clone()) {
            self.warnings.extend(rule.check_allocations());
        }

        let merged = rule.merges_comprehensive();
        for (individual, ratio) in &rule.allocations {
            let portion = round_money(net * *ratio);
            if portion <= Decimal::ZERO {
                continue;
            }
            let nature = rule.income_nature(individual);
            let stream = allocated_stream(nature, edge, rule);
            let separate_from = if merged { None } else { Some(rule.hhy_code.as_str()) };

            self.send(&rule.hhy_code, individual, portion, portion);
            self.credit(individual, separate_from, stream, portion);
            self.allocations.push(AllocationShare {
                edge_index: index,
                partnership: rule.hhy_code.clone(),
                individual: individual.clone(),
                ratio: *ratio,
                amount: portion,
                nature,
                stream,
                merged,
            });
        }
    }

    fn reject(
        &mut self,
        index: usize,
        edge: &FlowEdgeInput,
        reason: String,
        stop: bool,
    ) -> FlowTaxResult<()> {
        if stop {
            return Err(FlowTaxError::FlowRejected {
                from: edge.from.clone(),
                to: edge.to.clone(),
                reason,
            });
        }
        tracing::warn!(index, from = %edge.from, to = %edge.to, %reason, "edge rejected");
        self.rejected.push(RejectedEdge {
            index,
            from: edge.from.clone(),
            to: edge.to.clone(),
            amount: edge.amount,
            mode: edge.mode,
            reason,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Push every instructed edge through the loaded graph in order, then tax
/// what each individual ended up with.
pub fn run_simulation(
    state: &GraphState,
    input: &SimulationInput,
) -> FlowTaxResult<ComputationOutput<SimulationOutput>> {
    let start = Instant::now();

    if let Some(version) = &input.rule_version {
        if version != state.rule_version() {
            return Err(FlowTaxError::InvalidInput {
                field: "rule_version".to_string(),
                reason: format!(
                    "requested {} but the loaded state is {}",
                    version,
                    state.rule_version()
                ),
            });
        }
    }
    if input.edges.is_empty() {
        return Err(FlowTaxError::InvalidInput {
            field: "edges".to_string(),
            reason: "At least one flow edge is required".to_string(),
        });
    }

    let mut run = Run::default();
    let stop = input.stop_on_first_failure;

    for (index, edge) in input.edges.iter().enumerate() {
        if edge.amount < Decimal::ZERO {
            run.reject(index, edge, format!("negative amount {}", edge.amount), stop)?;
            continue;
        }
        let constraint = match state.validate_flow(&edge.from, &edge.to) {
            Ok(constraint) => constraint,
            Err(e) => {
                run.reject(index, edge, e.to_string(), stop)?;
                continue;
            }
        };
        // validate_flow succeeded, so both ends exist.
        let (Some(from), Some(to)) = (state.entity(&edge.from), state.entity(&edge.to)) else {
            continue;
        };
        if from.is_partnership() && state.hhy_rule(&from.code).is_some() {
            run.reject(
                index,
                edge,
                format!("{} distributes its inflow through its HHY rule", from.code),
                stop,
            )?;
            continue;
        }

        let rule = if to.is_partnership() {
            state.hhy_rule(&to.code)
        } else {
            None
        };
        let accepted = exposure(edge.amount, rule).and_then(|e| run.accepted.checked_add(e));
        match accepted {
            Some(accepted) => run.accepted = accepted,
            None => {
                run.reject(
                    index,
                    edge,
                    format!("amount {} overflows the run totals", edge.amount),
                    stop,
                )?;
                continue;
            }
        }

        let sent = run
            .sent_by_pair
            .entry((from.code.clone(), to.code.clone()))
            .or_default();
        *sent += edge.amount;
        if let Some(limit) = constraint {
            if limit.is_exceeded_by(*sent) {
                run.warnings.push(format!(
                    "{}->{}: {} sent exceeds {} of {} (not enforced)",
                    from.code, to.code, sent, limit.constraint_type, limit.max_amount
                ));
            }
        }

        let flow = FlowEdge {
            from,
            to,
            amount: edge.amount,
            mode: edge.mode,
        };
        let friction = friction_between(from, to, flow.amount, flow.mode);
        tracing::debug!(
            index,
            from = %from.code,
            to = %to.code,
            amount = %friction.input_amount,
            friction = %friction.total_friction,
            net = %friction.net_amount,
            "edge applied"
        );
        run.send(&from.code, &to.code, friction.input_amount, friction.net_amount);
        let net = friction.net_amount;
        run.edges.push(friction);

        match &to.kind {
            EntityKind::Individual { .. } => {
                run.credit(&to.code, None, direct_stream(flow.mode), net);
            }
            EntityKind::Partnership => match rule {
                Some(rule) => run.allocate(index, &flow, rule, net),
                None => {
                    tracing::warn!(partnership = %to.code, amount = %net, "no HHY rule, inflow retained");
                    run.warnings.push(format!(
                        "{} has no HHY rule for {}; {} is retained",
                        to.code,
                        state.rule_version(),
                        net
                    ));
                }
            },
            EntityKind::Company { .. } => {}
        }
    }

    // -- Ledger -----------------------------------------------------------
    let mut ledger = Vec::new();
    let mut total_retained = Decimal::ZERO;
    for entity in state.entities() {
        let flows = run.flows.get(&entity.code);
        let initial = state.initial_fund(&entity.code);
        let inflow = flows.map(|f| f.inflow).unwrap_or(Decimal::ZERO);
        let outflow = flows.map(|f| f.outflow).unwrap_or(Decimal::ZERO);
        let retained = initial + inflow - outflow;

        if !entity.is_individual() {
            total_retained = checked_total("total_retained", total_retained, retained)?;
            let funded = !entity.is_source() || !state.initial_funds().is_empty();
            if funded && retained < Decimal::ZERO {
                run.warnings.push(format!(
                    "{} sends {} more than it holds",
                    entity.code, -retained
                ));
            }
        }

        ledger.push(EntityLedger {
            code: entity.code.clone(),
            name: entity.name.clone(),
            entity_type: entity.kind.name().to_string(),
            level: entity.level,
            initial,
            inflow,
            outflow,
            retained,
        });
    }

    // -- Individual income tax --------------------------------------------
    let individuals: Vec<IndividualTaxResult> = state
        .individuals()
        .into_iter()
        .map(|person| {
            let buckets = run.buckets.remove(&person.code).unwrap_or_default();
            individual_result(person, &buckets)
        })
        .collect();

    let total_edge_friction: Money = run.edges.iter().map(|e| e.total_friction).sum();
    let total_tax: Money = individuals.iter().map(|i| i.total_tax).sum();
    let total_net: Money = individuals.iter().map(|i| i.total_net).sum();
    let total_friction = checked_total("total_friction", total_edge_friction, total_tax)?;
    let gross = checked_total("total_friction", total_friction, total_net)?;
    let effective_rate = if gross.is_zero() {
        Decimal::ZERO
    } else {
        round_money(total_friction / gross)
    };

    if !run.rejected.is_empty() {
        run.warnings.push(format!(
            "{} of {} edges rejected",
            run.rejected.len(),
            input.edges.len()
        ));
    }

    tracing::info!(
        rule_version = state.rule_version(),
        edges = run.edges.len(),
        rejected = run.rejected.len(),
        total_friction = %total_friction,
        effective_rate = %effective_rate,
        "simulation complete"
    );

    let output = SimulationOutput {
        rule_version: state.rule_version().to_string(),
        edges: run.edges,
        rejected_edges: run.rejected,
        allocations: run.allocations,
        ledger,
        individuals,
        total_initial_amount: state.total_initial_amount(),
        total_edge_friction,
        total_retained,
        total_tax,
        total_friction,
        total_net,
        effective_rate,
    };

    let initial_funds: BTreeMap<&str, String> = state
        .initial_funds()
        .iter()
        .map(|(code, amount)| (code.as_str(), amount.to_string()))
        .collect();
    let assumptions = serde_json::json!({
        "rule_version": state.rule_version(),
        "edge_count": input.edges.len(),
        "stop_on_first_failure": stop,
        "initial_funds": initial_funds,
        "flow_limits": "reported, not enforced",
    });

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Entity-graph tax friction: per-edge VAT/surtax/EIT/PIT, HHY pass-through \
         allocation, comprehensive income reconciliation per individual",
        &assumptions,
        run.warnings,
        elapsed,
        output,
    ))
}

fn individual_result(person: &Entity, buckets: &IncomeBuckets) -> IndividualTaxResult {
    let main = reconcile_comprehensive_income(&buckets.main);
    let separate: Vec<SeparateIncome> = buckets
        .separate
        .iter()
        .map(|(partnership, streams)| SeparateIncome {
            partnership: partnership.clone(),
            result: reconcile_comprehensive_income(streams),
        })
        .collect();

    let results = std::iter::once(&main).chain(separate.iter().map(|s| &s.result));
    let mut r = IndividualTaxResult {
        code: person.code.clone(),
        name: person.name.clone(),
        main: main.clone(),
        separate: Vec::new(),
        salary: Decimal::ZERO,
        salary_tax: Decimal::ZERO,
        bonus: Decimal::ZERO,
        bonus_tax: Decimal::ZERO,
        service_income: Decimal::ZERO,
        service_tax: Decimal::ZERO,
        dividend: Decimal::ZERO,
        dividend_tax: Decimal::ZERO,
        total_income: Decimal::ZERO,
        total_tax: Decimal::ZERO,
        total_net: Decimal::ZERO,
        effective_rate: Decimal::ZERO,
    };
    for part in results {
        r.salary += part.salary;
        r.salary_tax += part.salary_tax;
        r.bonus += part.bonus;
        r.bonus_tax += part.bonus_tax;
        r.service_income += part.service_income;
        r.service_tax += part.service_tax;
        r.dividend += part.dividend;
        r.dividend_tax += part.dividend_tax;
        r.total_income += part.total_income;
        r.total_tax += part.total_tax;
        r.total_net += part.total_net;
    }
    if r.total_income > Decimal::ZERO {
        r.effective_rate = round_money(r.total_tax / r.total_income);
    }
    r.separate = separate;
    r
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
