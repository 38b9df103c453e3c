//! The state contract the dataflow engine is generic over (§4.D, §9
//! "Dataflow state as a first-class abstraction").
//!
//! A concrete analysis (definite-assignment, nullability, liveness,
//! copy-propagation, …) implements this once; the engine in
//! [`crate::dataflow::engine`] never knows which one it's driving.

/// A join-semilattice value the engine threads through the instruction
/// tree as `current`. `join`/`meet` must be monotone and the lattice must
/// have finite height for the engine's fixed-point iteration to terminate
/// (§8 "Dataflow" testable property).
pub trait LatticeState: Clone {
	/// The semilattice order: `self ≤ other`.
	fn less_or_equal(&self, other: &Self) -> bool;

	/// Overwrites `self` with `other`'s value in place.
	fn replace_with(&mut self, other: &Self) {
		*self = other.clone();
	}

	/// Joins `incoming` into `self`. Postcondition: `old_self ≤ self` and
	/// `incoming ≤ self`.
	fn join(&mut self, incoming: &Self);

	/// Used only at try/finally exits: the state reachable only if *both*
	/// operands are reachable.
	fn meet(&mut self, incoming: &Self);

	fn is_unreachable(&self) -> bool;

	fn mark_unreachable(&mut self);
}
