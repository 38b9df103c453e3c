//! Natural-loop detection: find back edges against the dominator tree,
//! then grow each one into the set of blocks that loop around to it.

use std::collections::{HashSet, VecDeque};

use crate::cfg::dominators::DominatorTree;
use crate::ilast::arena::NodeId;
use crate::ilast::block::successors;
use crate::ilast::function::ILFunction;
use crate::ilast::instruction::InstructionKind;

/// A loop rooted at `header` (the single block every back edge in the loop
/// targets), containing `header` and every block that can reach the back
/// edge's source without leaving the loop.
pub struct NaturalLoop {
	pub header: NodeId,
	pub body: HashSet<NodeId>,
}

/// Finds every natural loop in `container`, one per back edge (`tail ->
/// header` where `header` dominates `tail`). Two back edges sharing a
/// header produce two `NaturalLoop`s whose bodies the caller is expected to
/// union before rewriting — multi-entry-tail loops (`while`/`do-while`
/// compiled with more than one `continue`) are common.
pub fn find_natural_loops<'l>(function: &ILFunction<'l>, container: NodeId) -> Vec<NaturalLoop> {
	let InstructionKind::BlockContainer { blocks, .. } = &function.node(container).kind else {
		return Vec::new();
	};
	let blocks = blocks.clone();

	let Some(doms) = DominatorTree::compute(function, container) else {
		return Vec::new();
	};

	let mut loops = Vec::new();
	for &tail in &blocks {
		for target in successors(function, tail) {
			if doms.dominates(target, tail) {
				loops.push(NaturalLoop { header: target, body: natural_loop_body(function, target, tail) });
			}
		}
	}
	loops
}

/// Blocks reachable backward from `tail` without passing through `header`,
/// plus `header` itself — the standard "grow the loop body" walk over the
/// *predecessor* graph, computed here by walking successors of everything
/// and inverting membership via a fixed point instead of building a
/// separate predecessor index.
fn natural_loop_body<'l>(function: &ILFunction<'l>, header: NodeId, tail: NodeId) -> HashSet<NodeId> {
	let mut body = HashSet::new();
	body.insert(header);
	body.insert(tail);

	let mut queue = VecDeque::new();
	queue.push_back(tail);
	while let Some(current) = queue.pop_front() {
		if current == header {
			continue;
		}
		for predecessor in predecessors(function, current, header) {
			if body.insert(predecessor) {
				queue.push_back(predecessor);
			}
		}
	}
	body
}

/// All blocks within `header`'s enclosing container with an edge into
/// `target` — a linear scan, acceptable since this runs once per back edge
/// found, not once per dataflow iteration.
fn predecessors<'l>(function: &ILFunction<'l>, target: NodeId, header: NodeId) -> Vec<NodeId> {
	let Some(parent) = function.node(header).parent else {
		return Vec::new();
	};
	let InstructionKind::BlockContainer { blocks, .. } = &function.node(parent).kind else {
		return Vec::new();
	};
	blocks.iter().copied().filter(|&block| successors(function, block).contains(&target)).collect()
}
