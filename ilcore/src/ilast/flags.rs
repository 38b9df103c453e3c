//! Flow-flags: a monotone summary of what a subtree can do, recomputed
//! bottom-up whenever a mutation invalidates an ancestor's cached value.

bitflags::bitflags! {
	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct FlowFlags: u16 {
		/// The node is itself a control-flow transfer (branch/leave/return/…).
		const CONTROL_FLOW = 0x01;
		/// The node, or something beneath it, may transfer control to a
		/// location other than "the next instruction".
		const MAY_BRANCH = 0x02;
		/// The node, or something beneath it, may throw.
		const MAY_THROW = 0x04;
		/// Control never falls through past this node (it always branches,
		/// returns, throws, or loops forever).
		const END_POINT_UNREACHABLE = 0x08;
		/// The node has an effect beyond producing its value (calls, stores,
		/// volatile/interlocked loads, …) — required to avoid dropping it as
		/// dead code even when its value is unused.
		const SIDE_EFFECTS = 0x10;
	}
}

impl FlowFlags {
	/// The union of `self` and every child's flags, folded by the caller one
	/// child at a time as it walks a node's slots — mirrors the "composite
	/// nodes propagate by the defined union" rule in the flags contract.
	pub fn union_child(self, child: FlowFlags) -> Self {
		self | (child & (FlowFlags::MAY_BRANCH | FlowFlags::MAY_THROW | FlowFlags::SIDE_EFFECTS))
	}
}
