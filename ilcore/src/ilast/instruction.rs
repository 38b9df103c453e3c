//! The tagged-union instruction tree: one `InstructionKind` variant per
//! opcode-like node, each node wrapped in [`ILInstruction`] with its flow
//! flags, parent link and child-index.
//!
//! The source models this as a class hierarchy (`ILInstruction` base, one
//! subclass per kind, a visitor for dispatch). Here every kind is a variant
//! and dispatch is a `match` — see `DESIGN.md` for why that's the natural
//! translation once ownership moves to the arena in
//! [`crate::ilast::arena`].

use crate::ilast::arena::{Arena, NodeId};
use crate::ilast::flags::FlowFlags;
use crate::ilast::variable::VariableId;
use crate::metadata::token::MetadataToken;
use crate::typesystem::{Field, Method, Type};

#[derive(Debug, Clone)]
pub struct SwitchSection {
	/// The integer labels dispatching to this section. Disjoint across all
	/// of a switch's sections once [`crate::cfg::switches`] has normalized
	/// it (see `SimplifySwitchInstruction`'s invariant).
	pub labels: Vec<i64>,
	pub body: NodeId,
}

#[derive(Debug, Clone)]
pub struct ExceptionHandlerClause<'l> {
	pub exception_type: Option<Type<'l>>,
	pub filter: Option<NodeId>,
	pub body: NodeId,
}

/// One instruction node's shape. Child slots hold [`NodeId`]s into the
/// owning [`crate::ilast::function::ILFunction`]'s arena rather than owned
/// subtrees, so replacing a child is a pointer-sized write rather than a
/// move.
#[derive(Debug, Clone)]
pub enum InstructionKind<'l> {
	Nop,
	LdLoc(VariableId),
	LdLoca(VariableId),
	StLoc { variable: VariableId, value: NodeId },
	LdNull,
	LdStr(String),
	LdcI4(i32),
	LdcI8(i64),
	LdcR4(f32),
	LdcR8(f64),
	Call { method: &'l Method<'l>, is_virtual: bool, args: Vec<NodeId> },
	NewObj { constructor: &'l Method<'l>, args: Vec<NodeId> },
	LdObj { target: NodeId, object_type: Type<'l> },
	StObj { target: NodeId, value: NodeId, object_type: Type<'l> },
	LdFld { target: NodeId, field: &'l Field<'l> },
	LdFlda { target: NodeId, field: &'l Field<'l> },
	StFld { target: NodeId, value: NodeId, field: &'l Field<'l> },
	LdsFld { field: &'l Field<'l> },
	LdsFlda { field: &'l Field<'l> },
	StsFld { value: NodeId, field: &'l Field<'l> },
	Box { value: NodeId, box_type: Type<'l> },
	Unbox { value: NodeId, unbox_type: Type<'l> },
	CastClass { value: NodeId, target_type: Type<'l> },
	IsInst { value: NodeId, target_type: Type<'l> },
	CompEquals { left: NodeId, right: NodeId },
	CompNotEquals { left: NodeId, right: NodeId },
	LogicNot(NodeId),
	Add { left: NodeId, right: NodeId, checked: bool },
	Sub { left: NodeId, right: NodeId, checked: bool },
	Mul { left: NodeId, right: NodeId, checked: bool },
	Div { left: NodeId, right: NodeId },
	/// Structurally opaque node kept as a token (e.g. an unrecognized
	/// opcode's operand) instead of failing the whole tree build.
	Token { opcode: crate::metadata::il::OpCode, operand: Option<MetadataToken> },

	/// An ordered run of straight-line instructions, terminated by a
	/// control-flow instruction among `children`.
	Block { instructions: Vec<NodeId>, incoming_edge_count: u32 },
	/// A bounded region of `Block`s; control leaves only via `Leave`
	/// targeting this container.
	BlockContainer { entry_point: NodeId, blocks: Vec<NodeId> },
	Branch { target: NodeId },
	Leave { container: NodeId, value: Option<NodeId> },
	Return(Option<NodeId>),
	Throw(NodeId),
	Rethrow,
	IfInstruction { condition: NodeId, true_branch: NodeId, false_branch: Option<NodeId> },
	SwitchInstruction { value: NodeId, sections: Vec<SwitchSection> },
	TryCatch { try_block: NodeId, handlers: Vec<ExceptionHandlerClause<'l>> },
	TryFinally { try_block: NodeId, finally_block: NodeId },
	TryFault { try_block: NodeId, fault_block: NodeId },

	/// Introduced by the `lock` recovery pass (§4.F): a resolved `TryFinally`
	/// collapsed into its surface meaning.
	LockInstruction { value: NodeId, body: NodeId },
	/// Introduced by `using`-statement recovery.
	UsingInstruction { resource: NodeId, body: NodeId },

	/// Loads a bound function pointer to a (non-virtual) method —
	/// `ldftn`. Low-level; consumed and replaced by
	/// [`crate::transforms::delegate_construction`].
	LdFtn(&'l Method<'l>),
	/// `ldvirtftn`: resolves `method` virtually against `target`'s runtime
	/// type.
	LdVirtFtn { target: NodeId, method: &'l Method<'l> },
	/// Introduced by delegate-construction recovery: a `newobj` on a
	/// delegate type whose two constructor arguments were a target (or
	/// `null` for a static method group) and an `LdFtn`/`LdVirtFtn`,
	/// collapsed into the single surface-level expression they represent.
	DelegateConstruction { target: Option<NodeId>, method: &'l Method<'l>, delegate_type: Type<'l> },

	/// Introduced by switch-on-string recovery: the synthesized dispatch
	/// key every shape in §4.F's switch-on-string family eventually
	/// reduces to — `value`'s runtime string compared in turn against
	/// `literals`, ordinal position becoming the corresponding
	/// `SwitchInstruction` section label.
	StringToInt { value: NodeId, literals: Vec<String> },

	/// Introduced by `foreach` recovery (array, enumerator or span
	/// source): the whole index/enumerator bookkeeping collapsed into one
	/// node binding `item_variable` to successive elements of
	/// `collection` across `body`.
	ForEachInstruction { item_variable: VariableId, collection: NodeId, body: NodeId },

	/// `x ?? y` (§4.F null-coalescing recovery).
	NullCoalescing { left: NodeId, right: NodeId },
	/// `x?.body` (§4.F null-conditional recovery): `target` is evaluated
	/// once; `body` runs (referencing the same value) only if it's
	/// non-null, otherwise the whole expression is `null`/`default`.
	NullConditional { target: NodeId, body: NodeId },

	/// Introduced by string-concatenation recovery: a chain of
	/// `String.Concat` calls collapsed into its surface `+`-chain form.
	StringConcat { parts: Vec<NodeId> },

	/// Introduced by tuple recovery: a `System.ValueTuple` construction
	/// collapsed into `(e0, e1, ...)` literal form.
	TupleExpression { elements: Vec<NodeId>, tuple_type: Type<'l> },
	/// Introduced by tuple-deconstruction recovery: a single-definition
	/// tuple-typed temporary whose `ItemN` fields were immediately copied
	/// out into `elements`, collapsed into `(a, b, ...) = value`.
	TupleDeconstruction { elements: Vec<VariableId>, value: NodeId },

	/// Introduced by inlined-initializer recovery: a `newobj` followed
	/// immediately by a run of field stores on the freshly constructed
	/// instance, collapsed into `new T { Field = value, ... }`.
	ObjectInitializer { construction: NodeId, initializers: Vec<(&'l Field<'l>, NodeId)> },

	/// Introduced by iterator-state-machine unwinding: a recovered `yield
	/// return value;`.
	YieldReturn(NodeId),
	/// Introduced by iterator-state-machine unwinding: a recovered `yield
	/// break;`.
	YieldBreak,
	/// Introduced by async-state-machine unwinding: a recovered `await
	/// task;` expression.
	AwaitInstruction(NodeId),
}

pub struct ILInstruction<'l> {
	pub kind: InstructionKind<'l>,
	pub parent: Option<NodeId>,
	pub child_index: u32,
	flags: std::cell::Cell<Option<FlowFlags>>,
}

impl<'l> ILInstruction<'l> {
	pub fn new(kind: InstructionKind<'l>) -> Self {
		Self { kind, parent: None, child_index: 0, flags: std::cell::Cell::new(None) }
	}

	/// The node's intrinsic flags unioned with every live child's flags.
	/// Requires each child's own flags already be valid (the mutation API
	/// recomputes bottom-up, invalidating ancestors rather than children —
	/// see `crate::ilast::mutate`).
	pub fn flow_flags(&self, arena: &Arena<ILInstruction<'l>>) -> FlowFlags {
		if let Some(flags) = self.flags.get() {
			return flags;
		}
		let mut flags = intrinsic_flags(&self.kind);
		if let InstructionKind::TryFinally { try_block, finally_block } = &self.kind {
			let try_flags = arena.get(*try_block).flow_flags(arena);
			let finally_flags = arena.get(*finally_block).flow_flags(arena);
			flags = flags.union_child(try_flags);
			flags = flags.union_child(finally_flags & !FlowFlags::MAY_THROW);
			if try_flags.contains(FlowFlags::MAY_THROW) {
				flags |= finally_flags & FlowFlags::MAY_THROW;
			}
		} else {
			for child in self.children() {
				flags = flags.union_child(arena.get(child).flow_flags(arena));
			}
		}
		self.flags.set(Some(flags));
		flags
	}

	/// The node's own flags, ignoring every descendant — what
	/// [`crate::dataflow::engine`] tests to decide whether *this* node can
	/// throw, as opposed to [`Self::flow_flags`]'s subtree-wide summary.
	pub fn intrinsic_flags(&self) -> FlowFlags {
		intrinsic_flags(&self.kind)
	}

	pub fn invalidate_flags(&self) {
		self.flags.set(None);
	}

	/// All direct children, in slot order, used by the default
	/// `Descendants`/`Children` traversal and by flow-flags derivation.
	pub fn children(&self) -> Vec<NodeId> {
		kind_children(&self.kind)
	}
}

/// The `NodeId`s embedded in `kind`, in slot order. Factored out of
/// [`ILInstruction::children`] so [`crate::ilast::function::ILFunction::insert_node`]
/// can link a freshly embedded child's `parent` back to its new owner before
/// the node even has an id of its own to hand out.
pub(crate) fn kind_children<'l>(kind: &InstructionKind<'l>) -> Vec<NodeId> {
	use InstructionKind::*;
	match kind {
		Nop | LdLoc(_) | LdLoca(_) | LdNull | LdStr(_) | LdcI4(_) | LdcI8(_) | LdcR4(_) | LdcR8(_)
		| LdsFld { .. } | LdsFlda { .. } | Rethrow | Token { .. } | LdFtn(_) | YieldBreak => Vec::new(),
		StLoc { value, .. } => vec![*value],
		Call { args, .. } => args.clone(),
		NewObj { args, .. } => args.clone(),
		LdObj { target, .. } => vec![*target],
		StObj { target, value, .. } => vec![*target, *value],
		LdFld { target, .. } => vec![*target],
		LdFlda { target, .. } => vec![*target],
		StFld { target, value, .. } => vec![*target, *value],
		StsFld { value, .. } => vec![*value],
		Box { value, .. } => vec![*value],
		Unbox { value, .. } => vec![*value],
		CastClass { value, .. } => vec![*value],
		IsInst { value, .. } => vec![*value],
		CompEquals { left, right } | CompNotEquals { left, right } => vec![*left, *right],
		LogicNot(inner) => vec![*inner],
		Add { left, right, .. } | Sub { left, right, .. } | Mul { left, right, .. } => vec![*left, *right],
		Div { left, right } => vec![*left, *right],
		Block { instructions, .. } => instructions.clone(),
		BlockContainer { blocks, .. } => blocks.clone(),
		Branch { .. } => Vec::new(),
		Leave { value, .. } => value.iter().copied().collect(),
		Return(value) => value.iter().copied().collect(),
		Throw(value) => vec![*value],
		IfInstruction { condition, true_branch, false_branch } => {
			let mut out = vec![*condition, *true_branch];
			out.extend(*false_branch);
			out
		}
		SwitchInstruction { value, sections } => {
			let mut out = vec![*value];
			out.extend(sections.iter().map(|s| s.body));
			out
		}
		TryCatch { try_block, handlers } => {
			let mut out = vec![*try_block];
			out.extend(handlers.iter().flat_map(|h| h.filter.into_iter().chain(std::iter::once(h.body))));
			out
		}
		TryFinally { try_block, finally_block } => vec![*try_block, *finally_block],
		TryFault { try_block, fault_block } => vec![*try_block, *fault_block],
		LockInstruction { value, body } => vec![*value, *body],
		UsingInstruction { resource, body } => vec![*resource, *body],

		LdVirtFtn { target, .. } => vec![*target],
		DelegateConstruction { target, .. } => target.iter().copied().collect(),
		StringToInt { value, .. } => vec![*value],
		ForEachInstruction { collection, body, .. } => vec![*collection, *body],
		NullCoalescing { left, right } => vec![*left, *right],
		NullConditional { target, body } => vec![*target, *body],
		StringConcat { parts } => parts.clone(),
		TupleExpression { elements, .. } => elements.clone(),
		TupleDeconstruction { value, .. } => vec![*value],
		ObjectInitializer { construction, initializers } => {
			let mut out = vec![*construction];
			out.extend(initializers.iter().map(|(_, v)| *v));
			out
		}
		YieldReturn(value) => vec![*value],
		AwaitInstruction(task) => vec![*task],
	}
}

impl<'l> ILInstruction<'l> {
	/// `true` for `LdLoc`/`LdLoca`, the kinds the mutation API treats as a
	/// variable *load* when maintaining use counters.
	pub fn loaded_variable(&self) -> Option<VariableId> {
		match self.kind {
			InstructionKind::LdLoc(v) | InstructionKind::LdLoca(v) => Some(v),
			_ => None,
		}
	}

	/// `true` for `StLoc`, the kind the mutation API treats as a variable
	/// *store*.
	pub fn stored_variable(&self) -> Option<VariableId> {
		match self.kind {
			InstructionKind::StLoc { variable, .. } => Some(variable),
			_ => None,
		}
	}
}

/// Per-kind intrinsic flags, fixed independent of children (ECMA-335-level
/// knowledge of what each opcode *itself* can do).
fn intrinsic_flags(kind: &InstructionKind) -> FlowFlags {
	use InstructionKind::*;
	match kind {
		Nop | LdLoc(_) | LdLoca(_) | LdNull | LdStr(_) | LdcI4(_) | LdcI8(_) | LdcR4(_) | LdcR8(_)
		| CompEquals { .. } | CompNotEquals { .. } | LogicNot(_) | LdFld { .. } | LdFlda { .. }
		| LdsFld { .. } | LdsFlda { .. } | IsInst { .. } | Box { .. } => FlowFlags::empty(),

		StLoc { .. } | StFld { .. } | StsFld { .. } | StObj { .. } => FlowFlags::SIDE_EFFECTS,

		Div { .. } => FlowFlags::MAY_THROW,
		Add { checked, .. } | Sub { checked, .. } | Mul { checked, .. } => {
			if *checked {
				FlowFlags::MAY_THROW
			} else {
				FlowFlags::empty()
			}
		}

		Call { .. } | NewObj { .. } => FlowFlags::MAY_THROW | FlowFlags::SIDE_EFFECTS,
		LdObj { .. } | CastClass { .. } | Unbox { .. } => FlowFlags::MAY_THROW,

		Token { .. } => FlowFlags::MAY_THROW | FlowFlags::SIDE_EFFECTS,

		Block { .. } => FlowFlags::empty(),
		BlockContainer { .. } => FlowFlags::empty(),

		Branch { .. } => FlowFlags::CONTROL_FLOW | FlowFlags::MAY_BRANCH | FlowFlags::END_POINT_UNREACHABLE,
		Leave { .. } => FlowFlags::CONTROL_FLOW | FlowFlags::MAY_BRANCH | FlowFlags::END_POINT_UNREACHABLE,
		Return(_) => FlowFlags::CONTROL_FLOW | FlowFlags::END_POINT_UNREACHABLE,
		Throw(_) => FlowFlags::MAY_THROW | FlowFlags::END_POINT_UNREACHABLE,
		Rethrow => FlowFlags::MAY_THROW | FlowFlags::END_POINT_UNREACHABLE,

		IfInstruction { .. } => FlowFlags::empty(),
		SwitchInstruction { .. } => FlowFlags::MAY_BRANCH,
		TryCatch { .. } | TryFinally { .. } | TryFault { .. } => FlowFlags::empty(),

		LockInstruction { .. } | UsingInstruction { .. } => FlowFlags::SIDE_EFFECTS,

		LdFtn(_) => FlowFlags::empty(),
		LdVirtFtn { .. } => FlowFlags::MAY_THROW,
		DelegateConstruction { .. } => FlowFlags::MAY_THROW | FlowFlags::SIDE_EFFECTS,
		StringToInt { .. } => FlowFlags::empty(),
		ForEachInstruction { .. } => FlowFlags::MAY_THROW | FlowFlags::SIDE_EFFECTS,
		NullCoalescing { .. } | NullConditional { .. } => FlowFlags::empty(),
		StringConcat { .. } => FlowFlags::MAY_THROW | FlowFlags::SIDE_EFFECTS,
		TupleExpression { .. } => FlowFlags::empty(),
		TupleDeconstruction { .. } => FlowFlags::SIDE_EFFECTS,
		ObjectInitializer { .. } => FlowFlags::MAY_THROW | FlowFlags::SIDE_EFFECTS,
		YieldReturn(_) | YieldBreak => FlowFlags::CONTROL_FLOW | FlowFlags::SIDE_EFFECTS,
		AwaitInstruction(_) => FlowFlags::MAY_THROW | FlowFlags::SIDE_EFFECTS,
	}
}
