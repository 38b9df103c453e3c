//! Structural mutation of an [`ILFunction`]'s instruction tree.
//!
//! Every rewrite pass in `crate::transforms` and `crate::cfg` goes through
//! here rather than poking `InstructionKind` fields directly, so the four
//! invariants this module exists to hold stay true everywhere else. Invariant
//! 1's parent-pointer is actually seeded one layer down, in
//! [`ILFunction::insert_node`]: building a composite node out of already-built
//! pieces links each of them to it immediately, rather than leaving them
//! parentless until the composite itself is spliced into a block.
//!
//! 1. every live [`NodeId`] reachable from `function.root` has its `parent`
//!    pointing back at the node that actually holds it as a child, and its
//!    `child_index` matching that child's slot position;
//! 2. a node has exactly one parent — attaching an existing node under a
//!    second parent without detaching it first is rejected;
//! 3. a cached [`FlowFlags`] is never stale: mutating a node invalidates it
//!    and every ancestor up to the root;
//! 4. `Variable::load_count`/`store_count` always equal the number of live
//!    `LdLoc`/`LdLoca`/`StLoc` nodes referencing that variable.

use crate::error::DecompilerError;
use crate::ilast::arena::NodeId;
use crate::ilast::function::ILFunction;
use crate::ilast::instruction::InstructionKind;

/// Walks from `start` to the root, clearing each ancestor's cached flow
/// flags. Invariant 3.
pub(crate) fn invalidate_ancestors<'l>(function: &ILFunction<'l>, start: NodeId) {
	let mut current = Some(start);
	while let Some(id) = current {
		let node = function.node(id);
		node.invalidate_flags();
		current = node.parent;
	}
}

/// Invariant 4: increments the counters for every `LdLoc`/`LdLoca`/`StLoc`
/// found in `id`'s own subtree (not its ancestors).
fn record_attach<'l>(function: &mut ILFunction<'l>, id: NodeId) {
	for descendant in function.descendants_and_self(id) {
		let node = function.node(descendant);
		let loaded = node.loaded_variable();
		let stored = node.stored_variable();
		if let Some(v) = loaded {
			function.variable_mut(v).record_load();
		}
		if let Some(v) = stored {
			function.variable_mut(v).record_store();
		}
	}
}

/// The inverse of [`record_attach`], run before a subtree is detached or
/// dropped.
fn record_detach<'l>(function: &mut ILFunction<'l>, id: NodeId) {
	for descendant in function.descendants_and_self(id) {
		let node = function.node(descendant);
		let loaded = node.loaded_variable();
		let stored = node.stored_variable();
		if let Some(v) = loaded {
			function.variable_mut(v).record_unload();
		}
		if let Some(v) = stored {
			function.variable_mut(v).record_unstore();
		}
	}
}

fn set_parent<'l>(function: &mut ILFunction<'l>, child: NodeId, parent: NodeId, child_index: u32) -> Result<(), DecompilerError> {
	let node = function.arena_mut().get_mut(child);
	if let Some(existing) = node.parent {
		if existing != parent {
			return Err(DecompilerError::InvariantViolation(format!(
				"node {child:?} already has parent {existing:?}; detach before reattaching under {parent:?}"
			)));
		}
	}
	node.parent = Some(parent);
	node.child_index = child_index;
	Ok(())
}

/// Replaces the child of `parent` at the slot currently holding `old` with
/// `new`, rewriting `parent`'s `InstructionKind` fields in place.
///
/// `new` must not already be attached elsewhere in this function's tree.
/// The detached `old` subtree's variable references are uncounted and it is
/// returned to the caller, who is responsible for dropping it (via
/// [`remove_subtree`]) or reattaching it elsewhere.
pub fn replace_child<'l>(function: &mut ILFunction<'l>, parent: NodeId, old: NodeId, new: NodeId) -> Result<(), DecompilerError> {
	{
		let new_node = function.node(new);
		if new_node.parent.is_some() {
			return Err(DecompilerError::InvariantViolation(format!("node {new:?} is already attached; detach it first")));
		}
	}

	let parent_node = function.arena_mut().get_mut(parent);
	let mut replaced = false;
	replace_in_kind(&mut parent_node.kind, old, new, &mut replaced);
	if !replaced {
		return Err(DecompilerError::InvariantViolation(format!("{old:?} is not a child of {parent:?}")));
	}

	record_detach(function, old);
	function.arena_mut().get_mut(old).parent = None;

	let child_index = function.children(parent).iter().position(|c| *c == new).unwrap_or(0) as u32;
	set_parent(function, new, parent, child_index)?;
	record_attach(function, new);
	invalidate_ancestors(function, parent);
	Ok(())
}

/// Rewrites every `NodeId` field in `kind` equal to `old` to `new`, setting
/// `found` if at least one field matched. `InstructionKind` has no generic
/// "children" storage to splice into, so this mirrors
/// [`crate::ilast::instruction::ILInstruction::children`]'s match by hand.
fn replace_in_kind(kind: &mut InstructionKind, old: NodeId, new: NodeId, found: &mut bool) {
	use InstructionKind::*;
	let mut hit = |slot: &mut NodeId| {
		if *slot == old {
			*slot = new;
			*found = true;
		}
	};
	match kind {
		StLoc { value, .. } => hit(value),
		Call { args, .. } | NewObj { args, .. } => {
			for a in args {
				hit(a);
			}
		}
		LdObj { target, .. } | LdFld { target, .. } | LdFlda { target, .. } => hit(target),
		StObj { target, value, .. } => {
			hit(target);
			hit(value);
		}
		StFld { target, value, .. } => {
			hit(target);
			hit(value);
		}
		StsFld { value, .. } => hit(value),
		Box { value, .. } | Unbox { value, .. } | CastClass { value, .. } | IsInst { value, .. } => hit(value),
		CompEquals { left, right } | CompNotEquals { left, right } => {
			hit(left);
			hit(right);
		}
		LogicNot(inner) => hit(inner),
		Add { left, right, .. } | Sub { left, right, .. } | Mul { left, right, .. } | Div { left, right } => {
			hit(left);
			hit(right);
		}
		Block { instructions, .. } => {
			for i in instructions {
				hit(i);
			}
		}
		BlockContainer { entry_point, blocks } => {
			hit(entry_point);
			for b in blocks {
				hit(b);
			}
		}
		Branch { target } => hit(target),
		Leave { container, value } => {
			hit(container);
			if let Some(v) = value {
				hit(v);
			}
		}
		Return(value) => {
			if let Some(v) = value {
				hit(v);
			}
		}
		Throw(value) => hit(value),
		IfInstruction { condition, true_branch, false_branch } => {
			hit(condition);
			hit(true_branch);
			if let Some(b) = false_branch {
				hit(b);
			}
		}
		SwitchInstruction { value, sections } => {
			hit(value);
			for s in sections {
				hit(&mut s.body);
			}
		}
		TryCatch { try_block, handlers } => {
			hit(try_block);
			for h in handlers {
				if let Some(f) = &mut h.filter {
					hit(f);
				}
				hit(&mut h.body);
			}
		}
		TryFinally { try_block, finally_block } => {
			hit(try_block);
			hit(finally_block);
		}
		TryFault { try_block, fault_block } => {
			hit(try_block);
			hit(fault_block);
		}
		LockInstruction { value, body } => {
			hit(value);
			hit(body);
		}
		UsingInstruction { resource, body } => {
			hit(resource);
			hit(body);
		}
		LdVirtFtn { target, .. } => hit(target),
		DelegateConstruction { target, .. } => {
			if let Some(t) = target {
				hit(t);
			}
		}
		StringToInt { value, .. } => hit(value),
		ForEachInstruction { collection, body, .. } => {
			hit(collection);
			hit(body);
		}
		NullCoalescing { left, right } => {
			hit(left);
			hit(right);
		}
		NullConditional { target, body } => {
			hit(target);
			hit(body);
		}
		StringConcat { parts } => {
			for p in parts {
				hit(p);
			}
		}
		TupleExpression { elements, .. } => {
			for e in elements {
				hit(e);
			}
		}
		TupleDeconstruction { value, .. } => hit(value),
		ObjectInitializer { construction, initializers } => {
			hit(construction);
			for (_, v) in initializers {
				hit(v);
			}
		}
		YieldReturn(value) => hit(value),
		AwaitInstruction(task) => hit(task),
		Nop | LdLoc(_) | LdLoca(_) | LdNull | LdStr(_) | LdcI4(_) | LdcI8(_) | LdcR4(_) | LdcR8(_)
		| LdsFld { .. } | LdsFlda { .. } | Rethrow | Token { .. } | LdFtn(_) | YieldBreak => {}
	}
}

/// Inserts `instruction` immediately before `before` within `block`'s
/// straight-line instruction list. `instruction` must not already be
/// attached.
pub fn insert_before<'l>(function: &mut ILFunction<'l>, block: NodeId, before: NodeId, instruction: NodeId) -> Result<(), DecompilerError> {
	if function.node(instruction).parent.is_some() {
		return Err(DecompilerError::InvariantViolation(format!("node {instruction:?} is already attached")));
	}
	let InstructionKind::Block { instructions, .. } = &mut function.arena_mut().get_mut(block).kind else {
		return Err(DecompilerError::InvariantViolation(format!("{block:?} is not a Block")));
	};
	let position = instructions.iter().position(|i| *i == before).ok_or_else(|| {
		DecompilerError::InvariantViolation(format!("{before:?} is not an instruction of block {block:?}"))
	})?;
	instructions.insert(position, instruction);

	renumber_block_children(function, block);
	set_parent(function, instruction, block, position as u32)?;
	record_attach(function, instruction);
	invalidate_ancestors(function, block);
	Ok(())
}

/// Appends `instruction` to the end of `block`'s straight-line instruction
/// list. `instruction` must not already be attached.
pub fn append_to_block<'l>(function: &mut ILFunction<'l>, block: NodeId, instruction: NodeId) -> Result<(), DecompilerError> {
	if function.node(instruction).parent.is_some() {
		return Err(DecompilerError::InvariantViolation(format!("node {instruction:?} is already attached")));
	}
	let InstructionKind::Block { instructions, .. } = &mut function.arena_mut().get_mut(block).kind else {
		return Err(DecompilerError::InvariantViolation(format!("{block:?} is not a Block")));
	};
	let position = instructions.len();
	instructions.push(instruction);

	set_parent(function, instruction, block, position as u32)?;
	record_attach(function, instruction);
	invalidate_ancestors(function, block);
	Ok(())
}

/// Detaches `id` from its parent's child list, dropping it from the tree.
/// The caller must have already moved anything worth keeping out of the
/// subtree first; the arena slots are freed and the variable counters
/// decremented for good.
pub fn remove_subtree<'l>(function: &mut ILFunction<'l>, id: NodeId) -> Result<(), DecompilerError> {
	let Some(parent) = function.node(id).parent else {
		return Err(DecompilerError::InvariantViolation(format!("{id:?} has no parent to detach from")));
	};
	let mut removed = false;
	remove_from_kind(&mut function.arena_mut().get_mut(parent).kind, id, &mut removed);
	if !removed {
		return Err(DecompilerError::InvariantViolation(format!("{id:?} is not a child of {parent:?}")));
	}
	renumber_block_children(function, parent);

	let subtree = function.descendants_and_self(id);
	record_detach(function, id);
	for node in subtree {
		function.arena_mut().remove(node);
	}
	invalidate_ancestors(function, parent);
	Ok(())
}

fn remove_from_kind(kind: &mut InstructionKind, id: NodeId, removed: &mut bool) {
	if let InstructionKind::Block { instructions, .. } = kind {
		let before = instructions.len();
		instructions.retain(|i| *i != id);
		*removed = instructions.len() != before;
	}
}

/// Detaches `child` from its current slot under `from` (swapping in a
/// disposable `Nop` placeholder) and hands it back ready to be named as a
/// field of a brand-new, not-yet-attached node.
///
/// This is the building block every higher-level recognizer in
/// `crate::transforms` uses to lift an existing subtree out of the
/// low-level shape it was just recognized in (a `TryFinally`'s try-block,
/// a `NewObj`'s stored-to temporary, ...) and regraft it under the
/// higher-level node replacing that shape, without walking `child`'s own
/// use-counters down and back up by hand: the placeholder swap already
/// does that bookkeeping, and the eventual [`replace_child`] that attaches
/// the new composite node back into the tree re-counts `child`'s subtree
/// exactly once.
pub fn extract_child<'l>(function: &mut ILFunction<'l>, from: NodeId, child: NodeId) -> Result<NodeId, DecompilerError> {
	let placeholder = function.insert_node(InstructionKind::Nop);
	replace_child(function, from, child, placeholder)?;
	Ok(child)
}

/// Frees the arena slots of a subtree that is already detached (`parent ==
/// None`) and already uncounted — the disposal half of the
/// [`extract_child`]/[`replace_child`] dance, for the low-level scaffolding
/// a recognizer is throwing away (the old `TryFinally`, the setup `stloc`s,
/// ...) once whatever was worth keeping has been extracted out of it.
pub fn discard<'l>(function: &mut ILFunction<'l>, id: NodeId) {
	for node in function.descendants_and_self(id) {
		function.arena_mut().remove(node);
	}
}

/// After a `Block`'s instruction list is spliced, every remaining
/// instruction's `child_index` must match its new slot position.
fn renumber_block_children<'l>(function: &mut ILFunction<'l>, block: NodeId) {
	let children = function.children(block);
	for (index, child) in children.into_iter().enumerate() {
		function.arena_mut().get_mut(child).child_index = index as u32;
	}
}
