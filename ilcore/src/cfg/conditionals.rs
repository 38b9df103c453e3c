//! If/else recovery (§4.E item 2) and the straight-line block merging that
//! goes with it: folding a `Branch` to a single-predecessor successor into
//! its predecessor reduces the block count enough for the rest of the
//! structurer's pattern matching to see whole `if`/`else` shapes instead of
//! a maze of two-instruction blocks.

use crate::ilast::arena::NodeId;
use crate::ilast::block::{recompute_incoming_edge_counts, successors};
use crate::ilast::function::ILFunction;
use crate::ilast::instruction::InstructionKind;
use crate::ilast::mutate;

/// Repeatedly folds any block `B` that ends in an unconditional `Branch`
/// to a block `S` with exactly one incoming edge (`B`'s) into `B` itself,
/// dropping the `Branch` and splicing `S`'s instructions onto `B`'s tail.
/// Runs to a fixed point: folding can expose a new fold opportunity one
/// level up.
pub fn merge_straight_line_blocks<'l>(function: &mut ILFunction<'l>, container: NodeId) {
	loop {
		let InstructionKind::BlockContainer { blocks, entry_point } = &function.node(container).kind else {
			return;
		};
		let (blocks, entry_point) = (blocks.clone(), *entry_point);

		let mut folded = false;
		for &block in &blocks {
			let succ = successors(function, block);
			let [only] = succ.as_slice() else { continue };
			let target = *only;
			if target == block || target == entry_point {
				continue;
			}
			let InstructionKind::Block { incoming_edge_count, .. } = &function.node(target).kind else { continue };
			if *incoming_edge_count != 1 {
				continue;
			}

			fold_into(function, block, target);
			folded = true;
			break;
		}

		if !folded {
			break;
		}
	}
	recompute_incoming_edge_counts(function, container);
}

/// Drops `block`'s terminating `Branch` and moves `target`'s instructions
/// onto `block`'s own instruction list (re-parenting them in place rather
/// than detaching and reattaching, since they're being relocated, not
/// added or removed — the variable-use counters this crate maintains on
/// `attach`/`detach` don't apply to a move), then deletes the now-empty
/// `target` from its container.
fn fold_into<'l>(function: &mut ILFunction<'l>, block: NodeId, target: NodeId) {
	let InstructionKind::Block { instructions, .. } = &function.node(block).kind else { return };
	let Some(&terminator) = instructions.last() else { return };
	let _ = mutate::remove_subtree(function, terminator);

	let target_instructions = match &mut function.arena_mut().get_mut(target).kind {
		InstructionKind::Block { instructions, .. } => std::mem::take(instructions),
		_ => return,
	};

	let InstructionKind::Block { instructions: dest, .. } = &mut function.arena_mut().get_mut(block).kind else { return };
	let base = dest.len() as u32;
	dest.extend(target_instructions.iter().copied());

	for (offset, &instruction) in target_instructions.iter().enumerate() {
		let node = function.arena_mut().get_mut(instruction);
		node.parent = Some(block);
		node.child_index = base + offset as u32;
	}

	let _ = mutate::remove_subtree(function, target);
	mutate::invalidate_ancestors(function, block);
}
