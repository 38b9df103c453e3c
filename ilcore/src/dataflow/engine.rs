//! The generic forward fixed-point visitor (§4.D). Parameterized over any
//! [`LatticeState`]; the traversal rules below are a direct encoding of the
//! per-kind semantics the specification lays out, not a generic "visit
//! every child" walk — `BlockContainer` gets real fixed-point iteration,
//! `IfInstruction`/`SwitchInstruction` clone-and-join, and the three `Try*`
//! kinds each get their own on-exception bookkeeping.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::error::DecompilerError;
use crate::ilast::arena::NodeId;
use crate::ilast::flags::FlowFlags;
use crate::ilast::function::ILFunction;
use crate::ilast::instruction::InstructionKind;

use super::lattice::LatticeState;

/// Persistent on-exception accumulator for one `Try*` node, surviving
/// across however many times a containing `BlockContainer`'s fixed-point
/// loop re-enters it (§9 "the engine maintains, for each try-instruction,
/// its persistent on-exception state across re-entries").
pub struct TryState<S> {
	pub on_exception: S,
}

/// Per-run engine state: the block-input table every `BlockContainer`
/// fixed-point populates (exposed so callers can assert the §8 "block
/// input ≥ join of predecessors" property directly), and the persistent
/// on-exception accumulators for every `Try*` node visited so far.
///
/// `transfer` is the one piece the generic structural traversal can't
/// supply itself: the per-leaf-kind effect a concrete analysis has on
/// `current` (e.g. definite-assignment marking a variable assigned on
/// `StLoc`). It runs once per node, after that node's own children (if
/// any) have already been folded into `current`.
pub struct Engine<'f, 'l, S: LatticeState, F: Fn(&InstructionKind<'l>, &mut S)> {
	function: &'f ILFunction<'l>,
	transfer: F,
	block_inputs: HashMap<NodeId, S>,
	try_states: HashMap<NodeId, TryState<S>>,
	try_stack: Vec<NodeId>,
	cancellation: Option<&'f crate::cancellation::CancellationToken>,
}

/// Runs the analysis starting at `start` (typically an `ILFunction`'s
/// root `BlockContainer`) with `initial` as the incoming state, returning
/// the post-state and the full block-input table for inspection. Use
/// [`run_with_transfer`] when the analysis has a node-kind-specific effect
/// beyond pure structural propagation.
pub fn run<'f, 'l, S: LatticeState>(
	function: &'f ILFunction<'l>,
	start: NodeId,
	initial: S,
	cancellation: Option<&'f crate::cancellation::CancellationToken>,
) -> Result<(S, HashMap<NodeId, S>), DecompilerError> {
	run_with_transfer(function, start, initial, |_, _| {}, cancellation)
}

pub fn run_with_transfer<'f, 'l, S: LatticeState, F: Fn(&InstructionKind<'l>, &mut S)>(
	function: &'f ILFunction<'l>,
	start: NodeId,
	initial: S,
	transfer: F,
	cancellation: Option<&'f crate::cancellation::CancellationToken>,
) -> Result<(S, HashMap<NodeId, S>), DecompilerError> {
	let mut engine = Engine { function, transfer, block_inputs: HashMap::new(), try_states: HashMap::new(), try_stack: Vec::new(), cancellation };
	let mut current = initial;
	engine.visit(start, &mut current)?;
	Ok((current, engine.block_inputs))
}

impl<'f, 'l, S: LatticeState, F: Fn(&InstructionKind<'l>, &mut S)> Engine<'f, 'l, S, F> {
	fn check_cancelled(&self) -> Result<(), DecompilerError> {
		if let Some(token) = self.cancellation {
			if token.is_cancelled() {
				return Err(DecompilerError::Cancelled);
			}
		}
		Ok(())
	}

	fn bottom(current: &S) -> S {
		let mut bottom = current.clone();
		bottom.mark_unreachable();
		bottom
	}

	fn visit(&mut self, node: NodeId, current: &mut S) -> Result<(), DecompilerError> {
		self.check_cancelled()?;
		let may_throw = self.function.node(node).intrinsic_flags().contains(FlowFlags::MAY_THROW);

		match &self.function.node(node).kind {
			InstructionKind::BlockContainer { .. } => self.visit_block_container(node, current)?,
			InstructionKind::Block { instructions, .. } => {
				let instructions = instructions.clone();
				for instruction in instructions {
					self.visit(instruction, current)?;
				}
			}
			InstructionKind::Branch { target } => {
				let target = *target;
				self.join_block_input(target, current);
				current.mark_unreachable();
			}
			InstructionKind::Leave { container, value } => {
				if let Some(value) = value {
					self.visit(*value, current)?;
				}
				let container = *container;
				self.join_leave_exit(container, current);
				current.mark_unreachable();
			}
			InstructionKind::Return(value) => {
				if let Some(value) = value {
					self.visit(*value, current)?;
				}
				current.mark_unreachable();
			}
			InstructionKind::Throw(value) => {
				let value = *value;
				self.visit(value, current)?;
				current.mark_unreachable();
			}
			InstructionKind::Rethrow => {
				current.mark_unreachable();
			}
			InstructionKind::IfInstruction { condition, true_branch, false_branch } => {
				let (condition, true_branch, false_branch) = (*condition, *true_branch, *false_branch);
				self.visit(condition, current)?;
				let mut on_true = current.clone();
				self.visit(true_branch, &mut on_true)?;
				let mut on_false = current.clone();
				if let Some(false_branch) = false_branch {
					self.visit(false_branch, &mut on_false)?;
				}
				current.replace_with(&on_true);
				current.join(&on_false);
			}
			InstructionKind::SwitchInstruction { value, sections } => {
				let (value, sections) = (*value, sections.clone());
				self.visit(value, current)?;
				let baseline = current.clone();
				let mut joined = Self::bottom(&baseline);
				for section in &sections {
					let mut branch = baseline.clone();
					self.visit(section.body, &mut branch)?;
					joined.join(&branch);
				}
				current.replace_with(&joined);
			}
			InstructionKind::TryCatch { try_block, handlers } => {
				let (try_block, handlers) = (*try_block, handlers.clone());
				self.try_states.entry(node).or_insert_with(|| TryState { on_exception: Self::bottom(current) });
				self.try_stack.push(node);
				self.visit(try_block, current)?;
				self.try_stack.pop();
				let try_exit = current.clone();

				let mut on_exception = self.try_states.get(&node).unwrap().on_exception.clone();
				let mut joined = try_exit.clone();
				for handler in &handlers {
					let mut handler_state = on_exception.clone();
					if let Some(filter) = handler.filter {
						self.visit(filter, &mut handler_state)?;
					}
					self.visit(handler.body, &mut handler_state)?;
					on_exception.join(&handler_state);
					joined.join(&handler_state);
				}
				self.try_states.get_mut(&node).unwrap().on_exception.replace_with(&on_exception);
				current.replace_with(&joined);
			}
			InstructionKind::TryFinally { try_block, finally_block } => {
				let (try_block, finally_block) = (*try_block, *finally_block);
				self.try_states.entry(node).or_insert_with(|| TryState { on_exception: Self::bottom(current) });
				self.try_stack.push(node);
				self.visit(try_block, current)?;
				self.try_stack.pop();
				let try_exit = current.clone();

				let on_exception = self.try_states.get(&node).unwrap().on_exception.clone();
				let mut finally_entry = try_exit.clone();
				finally_entry.join(&on_exception);
				let mut finally_exit = finally_entry;
				self.visit(finally_block, &mut finally_exit)?;

				let mut post = finally_exit;
				post.meet(&try_exit);
				current.replace_with(&post);
			}
			InstructionKind::TryFault { try_block, fault_block } => {
				let (try_block, fault_block) = (*try_block, *fault_block);
				self.try_states.entry(node).or_insert_with(|| TryState { on_exception: Self::bottom(current) });
				self.try_stack.push(node);
				self.visit(try_block, current)?;
				self.try_stack.pop();
				let try_exit = current.clone();

				let on_exception = self.try_states.get(&node).unwrap().on_exception.clone();
				let mut fault_entry = on_exception;
				self.visit(fault_block, &mut fault_entry)?;

				current.replace_with(&try_exit);
			}
			InstructionKind::LockInstruction { value, body } => {
				let (value, body) = (*value, *body);
				self.visit(value, current)?;
				self.visit(body, current)?;
			}
			InstructionKind::UsingInstruction { resource, body } => {
				let (resource, body) = (*resource, *body);
				self.visit(resource, current)?;
				self.visit(body, current)?;
			}
			_ => {
				for child in self.function.node(node).children() {
					self.visit(child, current)?;
				}
			}
		}

		(self.transfer)(&self.function.node(node).kind, current);

		if may_throw {
			if let Some(&enclosing_try) = self.try_stack.last() {
				let on_exception = &mut self.try_states.get_mut(&enclosing_try).expect("try entered before body visited").on_exception;
				on_exception.join(current);
			}
		}
		Ok(())
	}

	fn join_block_input(&mut self, block: NodeId, current: &S) {
		match self.block_inputs.get_mut(&block) {
			Some(existing) => existing.join(current),
			None => {
				self.block_inputs.insert(block, current.clone());
			}
		}
	}

	fn join_leave_exit(&mut self, container: NodeId, current: &S) {
		self.join_block_input(container, current);
	}

	fn visit_block_container(&mut self, container: NodeId, current: &mut S) -> Result<(), DecompilerError> {
		let InstructionKind::BlockContainer { entry_point, blocks } = &self.function.node(container).kind else {
			return Ok(());
		};
		let (entry_point, blocks) = (*entry_point, blocks.clone());

		for &block in &blocks {
			self.block_inputs.entry(block).or_insert_with(|| Self::bottom(current));
		}
		self.block_inputs.entry(container).or_insert_with(|| Self::bottom(current));
		self.join_block_input(entry_point, current);

		let order: HashMap<NodeId, usize> = blocks.iter().enumerate().map(|(i, b)| (*b, i)).collect();
		let mut queued: HashSet<NodeId> = HashSet::new();
		let mut worklist = BinaryHeap::new();
		worklist.push(Reverse((0usize, entry_point)));
		queued.insert(entry_point);

		while let Some(Reverse((_, block))) = worklist.pop() {
			self.check_cancelled()?;
			queued.remove(&block);
			let mut local = self.block_inputs.get(&block).cloned().unwrap_or_else(|| Self::bottom(current));
			let targets = self.visit_block_and_collect_targets(block, &mut local)?;

			for target in targets {
				let existing = self.block_inputs.get(&target).cloned();
				self.join_block_input(target, &local);
				let changed = match existing {
					Some(prev) => !self.block_inputs[&target].less_or_equal(&prev),
					None => true,
				};
				if changed && !queued.contains(&target) {
					let index = order.get(&target).copied().unwrap_or(usize::MAX);
					worklist.push(Reverse((index, target)));
					queued.insert(target);
				}
			}
		}

		let post = self.block_inputs.get(&container).cloned().unwrap_or_else(|| Self::bottom(current));
		current.replace_with(&post);
		Ok(())
	}

	/// Visits one block's straight-line body, then re-derives which
	/// `Branch`/`Leave` targets it just joined state into by re-reading its
	/// terminator — cheaper than threading a collector through `visit`, and
	/// a block's successors are a pure function of its own last instruction.
	fn visit_block_and_collect_targets(&mut self, block: NodeId, local: &mut S) -> Result<Vec<NodeId>, DecompilerError> {
		self.visit(block, local)?;
		Ok(crate::ilast::block::successors(self.function, block)
			.into_iter()
			.chain(self.leave_targets(block))
			.collect())
	}

	fn leave_targets(&self, block: NodeId) -> Vec<NodeId> {
		let InstructionKind::Block { instructions, .. } = &self.function.node(block).kind else {
			return Vec::new();
		};
		instructions
			.iter()
			.filter_map(|i| match &self.function.node(*i).kind {
				InstructionKind::Leave { container, .. } => Some(*container),
				_ => None,
			})
			.collect()
	}
}
