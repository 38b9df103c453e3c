//! [`ILFunction`]: the arena, variable table and root container for one
//! decompiled method body.

use crate::ilast::arena::{Arena, NodeId};
use crate::ilast::instruction::{kind_children, ILInstruction, InstructionKind};
use crate::ilast::variable::{Variable, VariableId, VariableKind};
use crate::typesystem::{Method, Type};

/// Owns the whole instruction tree for one method: the arena every
/// [`NodeId`] indexes into, the variable table every [`VariableId`] indexes
/// into, and a back-pointer to the resolved method this body belongs to.
pub struct ILFunction<'l> {
	pub method: &'l Method<'l>,
	arena: Arena<ILInstruction<'l>>,
	variables: Vec<Variable<'l>>,
	pub root: NodeId,
}

impl<'l> ILFunction<'l> {
	/// Builds an empty function with a single, empty root `BlockContainer`.
	pub fn new(method: &'l Method<'l>) -> Self {
		let mut arena = Arena::new();
		let entry = arena.insert(ILInstruction::new(InstructionKind::Block { instructions: Vec::new(), incoming_edge_count: 1 }));
		let root = arena.insert(ILInstruction::new(InstructionKind::BlockContainer { entry_point: entry, blocks: vec![entry] }));
		arena.get_mut(entry).parent = Some(root);
		Self { method, arena, variables: Vec::new(), root }
	}

	pub fn arena(&self) -> &Arena<ILInstruction<'l>> {
		&self.arena
	}

	pub(crate) fn arena_mut(&mut self) -> &mut Arena<ILInstruction<'l>> {
		&mut self.arena
	}

	pub fn node(&self, id: NodeId) -> &ILInstruction<'l> {
		self.arena.get(id)
	}

	/// Inserts a freshly built node and links every child `kind` embeds back
	/// to it (`parent`, `child_index`), so a composite built bottom-up out of
	/// unattached pieces (the common case: fresh leaves, or subtrees just
	/// pulled out via [`crate::ilast::mutate::extract_child`]) satisfies the
	/// mutation module's parent-pointer invariant the moment it exists,
	/// without waiting for some later [`crate::ilast::mutate::replace_child`]
	/// to attach the composite itself somewhere.
	pub fn insert_node(&mut self, kind: InstructionKind<'l>) -> NodeId {
		let children = kind_children(&kind);
		let id = self.arena.insert(ILInstruction::new(kind));
		for (index, child) in children.into_iter().enumerate() {
			let node = self.arena.get_mut(child);
			debug_assert!(node.parent.is_none(), "child {child:?} already attached when embedding it into new node {id:?}");
			node.parent = Some(id);
			node.child_index = index as u32;
		}
		id
	}

	pub fn declare_variable(&mut self, kind: VariableKind, variable_type: Type<'l>) -> VariableId {
		let index = self.variables.len() as u32;
		self.variables.push(Variable::new(kind, variable_type, index));
		VariableId::from_raw(index)
	}

	pub fn variable(&self, id: VariableId) -> &Variable<'l> {
		&self.variables[id.raw() as usize]
	}

	pub(crate) fn variable_mut(&mut self, id: VariableId) -> &mut Variable<'l> {
		&mut self.variables[id.raw() as usize]
	}

	pub fn variables(&self) -> &[Variable<'l>] {
		&self.variables
	}

	/// Depth-first pre-order walk of `id` and everything beneath it —
	/// `DescendantsAndSelf` in the source's vocabulary.
	pub fn descendants_and_self(&self, id: NodeId) -> Vec<NodeId> {
		let mut out = Vec::new();
		let mut stack = vec![id];
		while let Some(current) = stack.pop() {
			out.push(current);
			let mut children = self.arena.get(current).children();
			children.reverse();
			stack.extend(children);
		}
		out
	}

	pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
		let mut all = self.descendants_and_self(id);
		all.remove(0);
		all
	}

	pub fn children(&self, id: NodeId) -> Vec<NodeId> {
		self.arena.get(id).children()
	}
}
