//! "Set of definitely-assigned variables" — the concrete analysis named in
//! §8 scenario 6, used to check the engine converges on a function whose
//! loop conditionally assigns a variable.

use std::collections::BTreeSet;

use crate::cancellation::CancellationToken;
use crate::dataflow::engine;
use crate::dataflow::lattice::LatticeState;
use crate::error::DecompilerError;
use crate::ilast::function::ILFunction;
use crate::ilast::instruction::InstructionKind;
use crate::ilast::variable::{VariableId, VariableKind};

/// `reachable = false` is the bottom element: "no path has reached here
/// yet", which joins as the identity (contributes nothing) rather than as
/// "nothing assigned" (which would wrongly veto every other predecessor).
#[derive(Clone, Debug)]
pub struct DefiniteAssignment {
	reachable: bool,
	assigned: BTreeSet<VariableId>,
}

impl DefiniteAssignment {
	pub fn bottom() -> Self {
		Self { reachable: false, assigned: BTreeSet::new() }
	}

	pub fn is_assigned(&self, variable: VariableId) -> bool {
		self.assigned.contains(&variable)
	}
}

impl LatticeState for DefiniteAssignment {
	fn less_or_equal(&self, other: &Self) -> bool {
		if !self.reachable {
			return true;
		}
		if !other.reachable {
			return false;
		}
		self.assigned.is_superset(&other.assigned)
	}

	fn join(&mut self, incoming: &Self) {
		if !incoming.reachable {
			return;
		}
		if !self.reachable {
			self.reachable = true;
			self.assigned = incoming.assigned.clone();
		} else {
			self.assigned = self.assigned.intersection(&incoming.assigned).copied().collect();
		}
	}

	fn meet(&mut self, incoming: &Self) {
		if !self.reachable || !incoming.reachable {
			self.mark_unreachable();
			return;
		}
		self.assigned = self.assigned.intersection(&incoming.assigned).copied().collect();
	}

	fn is_unreachable(&self) -> bool {
		!self.reachable
	}

	fn mark_unreachable(&mut self) {
		self.reachable = false;
		self.assigned.clear();
	}
}

/// Runs the analysis over `function`, starting with its parameters
/// definitely assigned and every local not yet assigned, and returns the
/// state at the function's exit.
pub fn run_definite_assignment<'l>(
	function: &ILFunction<'l>,
	cancellation: Option<&CancellationToken>,
) -> Result<DefiniteAssignment, DecompilerError> {
	let mut initial = DefiniteAssignment { reachable: true, assigned: BTreeSet::new() };
	for (index, variable) in function.variables().iter().enumerate() {
		if variable.kind == VariableKind::Parameter {
			initial.assigned.insert(VariableId::from_raw(index as u32));
		}
	}

	let (final_state, _) = engine::run_with_transfer(
		function,
		function.root,
		initial,
		|kind, state: &mut DefiniteAssignment| {
			if let InstructionKind::StLoc { variable, .. } = kind {
				state.assigned.insert(*variable);
			}
		},
		cancellation,
	)?;
	Ok(final_state)
}
