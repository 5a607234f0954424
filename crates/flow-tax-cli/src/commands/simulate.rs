use clap::Args;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use flow_tax_core::simulation::{self, SimulationInput};
use flow_tax_core::Money;

use super::load_state;
use crate::input;

/// A simulation file: the run itself plus the funds each source starts with.
#[derive(Debug, Deserialize)]
struct Scenario {
    #[serde(flatten)]
    simulation: SimulationInput,
    #[serde(default)]
    initial_funds: BTreeMap<String, Money>,
}

/// Arguments for a whole-graph simulation
#[derive(Args)]
pub struct SimulateArgs {
    /// Path to JSON/YAML scenario file (edges, optional rule_version and initial_funds)
    #[arg(long)]
    pub input: Option<String>,

    /// Funds held by the first source (by code) when the scenario sets none
    #[arg(long)]
    pub fund_a: Option<Decimal>,

    /// Funds held by the second source (by code) when the scenario sets none
    #[arg(long)]
    pub fund_b: Option<Decimal>,

    /// Fail on the first rejected edge instead of reporting it
    #[arg(long)]
    pub stop_on_first_failure: bool,
}

pub fn run_simulate(args: SimulateArgs, snapshot: Option<&str>) -> Result<Value, Box<dyn std::error::Error>> {
    let mut scenario: Scenario = input::read_input(args.input.as_deref())?
        .ok_or("--input <scenario.json> or stdin required for simulate")?;
    if args.stop_on_first_failure {
        scenario.simulation.stop_on_first_failure = true;
    }

    let state = load_state(snapshot, scenario.simulation.rule_version.as_deref())?;
    let state = if !scenario.initial_funds.is_empty() {
        state.with_initial_funds(scenario.initial_funds)?
    } else if args.fund_a.is_some() || args.fund_b.is_some() {
        state.with_default_initial_funds(
            args.fund_a.unwrap_or(Decimal::ZERO),
            args.fund_b.unwrap_or(Decimal::ZERO),
        )?
    } else {
        state
    };

    let result = simulation::run_simulation(&state, &scenario.simulation)?;
    Ok(serde_json::to_value(result)?)
}
