//! Concrete analyses built on [`crate::dataflow::engine`], each just a
//! [`crate::dataflow::lattice::LatticeState`] implementation plus a call to
//! [`crate::dataflow::engine::run`].

pub mod definite_assignment;

pub use definite_assignment::{run_definite_assignment, DefiniteAssignment};
