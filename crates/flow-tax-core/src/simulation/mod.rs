pub mod engine;
pub mod state;

pub use engine::{
    friction_between, run_simulation, AllocationShare, EntityLedger, FlowEdgeInput,
    IndividualTaxResult, RejectedEdge, SeparateIncome, SimulationInput, SimulationOutput,
};
pub use state::GraphState;
