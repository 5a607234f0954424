//! Tax primitives, the comprehensive-income reconciler and the per-edge
//! friction calculator. Everything here is pure and decimal-exact.

pub mod comprehensive;
pub mod friction;
pub mod income;
pub mod indirect;
