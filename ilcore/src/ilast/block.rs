//! Free functions treating `InstructionKind::Block`/`BlockContainer` as a
//! small control-flow graph: successor computation, incoming-edge-count
//! maintenance, and `SortBlocks` (reverse-postorder reordering, §4.E).
//!
//! These stay free functions over `&ILFunction`/`NodeId` rather than a
//! dedicated `Block` struct, since a block's storage already lives in the
//! arena as an ordinary node — wrapping it again would just be a second,
//! competing owner of the same data.

use std::collections::HashSet;

use crate::ilast::arena::NodeId;
use crate::ilast::function::ILFunction;
use crate::ilast::instruction::InstructionKind;

/// The block(s) control can transfer to when falling off the end of
/// `block`'s terminator, empty for a block that doesn't end in a recognized
/// branch-like instruction (e.g. mid-construction, or terminated by
/// `Return`/`Throw`/`Rethrow`, which leave the containing function rather
/// than another block).
pub fn successors<'l>(function: &ILFunction<'l>, block: NodeId) -> Vec<NodeId> {
	let InstructionKind::Block { instructions, .. } = &function.node(block).kind else {
		return Vec::new();
	};
	let Some(&terminator) = instructions.last() else {
		return Vec::new();
	};
	match &function.node(terminator).kind {
		InstructionKind::Branch { target } => vec![*target],
		InstructionKind::IfInstruction { true_branch, false_branch, .. } => {
			let mut out = vec![*true_branch];
			out.extend(*false_branch);
			out
		}
		InstructionKind::SwitchInstruction { sections, .. } => sections.iter().map(|s| s.body).collect(),
		_ => Vec::new(),
	}
}

/// Recomputes `incoming_edge_count` for every block in `container` by
/// counting predecessors reachable from the entry point. Blocks unreachable
/// from the entry (dead after a rewrite) get a count of `0` rather than
/// being removed — removal is the caller's decision, since a transform may
/// still want to inspect them before dropping.
pub fn recompute_incoming_edge_counts<'l>(function: &mut ILFunction<'l>, container: NodeId) {
	let InstructionKind::BlockContainer { blocks, .. } = &function.node(container).kind else {
		return;
	};
	let blocks = blocks.clone();
	let mut counts = vec![0u32; blocks.len()];
	let index_of = |id: NodeId| blocks.iter().position(|b| *b == id);
	for &block in &blocks {
		for succ in successors(function, block) {
			if let Some(i) = index_of(succ) {
				counts[i] += 1;
			}
		}
	}
	for (block, count) in blocks.iter().zip(counts) {
		if let InstructionKind::Block { incoming_edge_count, .. } = &mut function.arena_mut().get_mut(*block).kind {
			*incoming_edge_count = count;
		}
	}
}

/// Reorders `container`'s `blocks` list into reverse-postorder starting
/// from its entry point, matching `SortBlocks()`'s documented effect: later
/// passes that assume "predecessors come before successors" (e.g. the
/// dataflow engine's worklist) see a friendlier initial order, and any
/// block left unreachable from the entry is dropped to the end, past a
/// final pass that can then discard it outright.
pub fn sort_blocks<'l>(function: &mut ILFunction<'l>, container: NodeId) {
	let (entry, blocks) = match &function.node(container).kind {
		InstructionKind::BlockContainer { entry_point, blocks } => (*entry_point, blocks.clone()),
		_ => return,
	};

	let mut visited = HashSet::new();
	let mut postorder = Vec::new();
	let mut stack = vec![(entry, false)];
	while let Some((node, expanded)) = stack.pop() {
		if expanded {
			postorder.push(node);
			continue;
		}
		if !visited.insert(node) {
			continue;
		}
		stack.push((node, true));
		for succ in successors(function, node) {
			if !visited.contains(&succ) {
				stack.push((succ, false));
			}
		}
	}
	postorder.reverse();

	for block in &blocks {
		if !postorder.contains(block) {
			postorder.push(*block);
		}
	}

	if let InstructionKind::BlockContainer { blocks, .. } = &mut function.arena_mut().get_mut(container).kind {
		*blocks = postorder;
	}
	recompute_incoming_edge_counts(function, container);
}
