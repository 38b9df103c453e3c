//! The generic forward dataflow framework: a fixed-point engine
//! parameterized over any state type forming a join-semilattice.

pub mod analyses;
pub mod engine;
pub mod lattice;

pub use engine::{run, run_with_transfer, TryState};
pub use lattice::LatticeState;
