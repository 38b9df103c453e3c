//! Block reordering (§4.E item 4): `SortBlocks` plus the optional
//! unreachable-block drop the structurer runs after it.

use crate::ilast::arena::NodeId;
use crate::ilast::block::{recompute_incoming_edge_counts, sort_blocks};
use crate::ilast::function::ILFunction;
use crate::ilast::instruction::InstructionKind;
use crate::ilast::mutate;

/// Reorders `container`'s blocks into reverse-postorder (delegates to
/// [`crate::ilast::block::sort_blocks`], the same routine
/// `ILFunction`-level callers use), then drops every block left with zero
/// incoming edges and no longer reachable from the entry.
pub fn sort_and_prune<'l>(function: &mut ILFunction<'l>, container: NodeId) {
	sort_blocks(function, container);

	loop {
		let InstructionKind::BlockContainer { blocks, entry_point } = &function.node(container).kind else {
			return;
		};
		let (blocks, entry_point) = (blocks.clone(), *entry_point);

		let Some(&dead) = blocks.iter().find(|&&b| {
			b != entry_point
				&& matches!(&function.node(b).kind, InstructionKind::Block { incoming_edge_count: 0, .. })
		}) else {
			break;
		};
		let _ = mutate::remove_subtree(function, dead);
	}

	recompute_incoming_edge_counts(function, container);
}
