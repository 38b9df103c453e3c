//! Dominator-tree computation over a `BlockContainer`'s blocks, via
//! `petgraph`'s simple iterative algorithm — this is the one piece of the
//! structurer genuinely better served by a battle-tested graph library
//! than a hand-rolled walk.

use fxhash::FxHashMap;
use petgraph::algo::dominators::{self, Dominators};
use petgraph::graph::{DiGraph, NodeIndex};

use crate::ilast::arena::NodeId;
use crate::ilast::block::successors;
use crate::ilast::function::ILFunction;
use crate::ilast::instruction::InstructionKind;

pub struct DominatorTree {
	dominators: Dominators<NodeIndex>,
	index_of: FxHashMap<NodeId, NodeIndex>,
	node_of: FxHashMap<NodeIndex, NodeId>,
}

impl DominatorTree {
	/// Builds the dominator tree for `container`'s blocks, rooted at its
	/// entry point.
	pub fn compute<'l>(function: &ILFunction<'l>, container: NodeId) -> Option<Self> {
		let InstructionKind::BlockContainer { entry_point, blocks } = &function.node(container).kind else {
			return None;
		};
		let (entry_point, blocks) = (*entry_point, blocks.clone());

		let mut graph = DiGraph::<NodeId, ()>::new();
		let mut index_of = FxHashMap::default();
		for &block in &blocks {
			index_of.insert(block, graph.add_node(block));
		}
		for &block in &blocks {
			for target in successors(function, block) {
				if let (Some(&from), Some(&to)) = (index_of.get(&block), index_of.get(&target)) {
					graph.add_edge(from, to, ());
				}
			}
		}

		let root = *index_of.get(&entry_point)?;
		let dominators = dominators::simple_fast(&graph, root);
		let node_of = index_of.iter().map(|(node, index)| (*index, *node)).collect();
		Some(Self { dominators, index_of, node_of })
	}

	/// The block that immediately dominates `block`, or `None` for the
	/// entry point (no strict dominator) or a block unreachable from it.
	pub fn immediate_dominator(&self, block: NodeId) -> Option<NodeId> {
		let index = *self.index_of.get(&block)?;
		let dominator = self.dominators.immediate_dominator(index)?;
		self.node_of.get(&dominator).copied()
	}

	/// `true` if `a` dominates `b` (every path from the entry to `b` passes
	/// through `a`), reflexively — `dominates(a, a)` is `true`.
	pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
		if a == b {
			return true;
		}
		let Some(mut current) = self.immediate_dominator(b) else {
			return false;
		};
		loop {
			if current == a {
				return true;
			}
			match self.immediate_dominator(current) {
				Some(next) if next != current => current = next,
				_ => return false,
			}
		}
	}
}
