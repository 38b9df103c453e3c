//! The pattern-matching vocabulary ("match DSL") every transform pass is
//! built from: boolean predicates over a single [`NodeId`] that, on
//! success, bind whatever sub-instructions or variables the pattern names.
//!
//! These never mutate the tree and never fail loudly — a predicate that
//! doesn't match the node in front of it just returns `false`, which is
//! expected control flow for a recognizer probing a block position, not an
//! error (see `DESIGN.md`'s note on `TransformFailure` vs. plain mismatch).

use crate::ilast::arena::NodeId;
use crate::ilast::function::ILFunction;
use crate::ilast::instruction::InstructionKind;
use crate::ilast::variable::VariableId;
use crate::typesystem::Type;

pub fn match_ld_loc<'l>(function: &ILFunction<'l>, node: NodeId, variable: &mut VariableId) -> bool {
	match function.node(node).kind {
		InstructionKind::LdLoc(v) => {
			*variable = v;
			true
		}
		_ => false,
	}
}

pub fn match_ld_loca<'l>(function: &ILFunction<'l>, node: NodeId, variable: &mut VariableId) -> bool {
	match function.node(node).kind {
		InstructionKind::LdLoca(v) => {
			*variable = v;
			true
		}
		_ => false,
	}
}

pub fn match_st_loc<'l>(function: &ILFunction<'l>, node: NodeId, variable: &mut VariableId, value: &mut NodeId) -> bool {
	match function.node(node).kind {
		InstructionKind::StLoc { variable: v, value: val } => {
			*variable = v;
			*value = val;
			true
		}
		_ => false,
	}
}

pub fn match_ld_null<'l>(function: &ILFunction<'l>, node: NodeId) -> bool {
	matches!(function.node(node).kind, InstructionKind::LdNull)
}

pub fn match_nop<'l>(function: &ILFunction<'l>, node: NodeId) -> bool {
	matches!(function.node(node).kind, InstructionKind::Nop)
}

pub fn match_ld_str<'l>(function: &ILFunction<'l>, node: NodeId, value: &mut String) -> bool {
	match &function.node(node).kind {
		InstructionKind::LdStr(s) => {
			*value = s.clone();
			true
		}
		_ => false,
	}
}

/// Binds the constant value regardless of what it is — the overload
/// vocabulary names both `MatchLdcI4(&out)` and `MatchLdcI4(expected)`;
/// [`match_ldc_i4_value`] below is the latter.
pub fn match_ldc_i4<'l>(function: &ILFunction<'l>, node: NodeId, value: &mut i32) -> bool {
	match function.node(node).kind {
		InstructionKind::LdcI4(i) => {
			*value = i;
			true
		}
		_ => false,
	}
}

pub fn match_ldc_i4_value<'l>(function: &ILFunction<'l>, node: NodeId, expected: i32) -> bool {
	matches!(function.node(node).kind, InstructionKind::LdcI4(i) if i == expected)
}

pub fn match_branch<'l>(function: &ILFunction<'l>, node: NodeId, target: &mut NodeId) -> bool {
	match function.node(node).kind {
		InstructionKind::Branch { target: t } => {
			*target = t;
			true
		}
		_ => false,
	}
}

/// `Leave` targeting `container` specifically — a `Leave` targeting some
/// other enclosing container does not match.
pub fn match_leave<'l>(function: &ILFunction<'l>, node: NodeId, container: NodeId, value: &mut Option<NodeId>) -> bool {
	match function.node(node).kind {
		InstructionKind::Leave { container: c, value: v } if c == container => {
			*value = v;
			true
		}
		_ => false,
	}
}

/// Requires the else-branch to be a fallthrough (absent) or an empty `Nop`
/// block, per the documented restriction on this predicate.
pub fn match_if_instruction<'l>(function: &ILFunction<'l>, node: NodeId, condition: &mut NodeId, true_branch: &mut NodeId) -> bool {
	match &function.node(node).kind {
		InstructionKind::IfInstruction { condition: c, true_branch: t, false_branch } => {
			let else_ok = match false_branch {
				None => true,
				Some(b) => is_empty_fallthrough(function, *b),
			};
			if !else_ok {
				return false;
			}
			*condition = *c;
			*true_branch = *t;
			true
		}
		_ => false,
	}
}

fn is_empty_fallthrough<'l>(function: &ILFunction<'l>, node: NodeId) -> bool {
	match &function.node(node).kind {
		InstructionKind::Nop => true,
		InstructionKind::Block { instructions, .. } => instructions.iter().all(|i| matches!(function.node(*i).kind, InstructionKind::Nop)),
		_ => false,
	}
}

pub fn match_comp_equals<'l>(function: &ILFunction<'l>, node: NodeId, left: &mut NodeId, right: &mut NodeId) -> bool {
	match function.node(node).kind {
		InstructionKind::CompEquals { left: l, right: r } => {
			*left = l;
			*right = r;
			true
		}
		_ => false,
	}
}

pub fn match_comp_not_equals<'l>(function: &ILFunction<'l>, node: NodeId, left: &mut NodeId, right: &mut NodeId) -> bool {
	match function.node(node).kind {
		InstructionKind::CompNotEquals { left: l, right: r } => {
			*left = l;
			*right = r;
			true
		}
		_ => false,
	}
}

pub fn match_logic_not<'l>(function: &ILFunction<'l>, node: NodeId, inner: &mut NodeId) -> bool {
	match function.node(node).kind {
		InstructionKind::LogicNot(i) => {
			*inner = i;
			true
		}
		_ => false,
	}
}

pub fn match_ld_obj<'l>(function: &ILFunction<'l>, node: NodeId, target: &mut NodeId, object_type: &mut Type<'l>) -> bool {
	match function.node(node).kind {
		InstructionKind::LdObj { target: t, object_type: ty } => {
			*target = t;
			*object_type = ty;
			true
		}
		_ => false,
	}
}

pub fn match_st_obj<'l>(function: &ILFunction<'l>, node: NodeId, target: &mut NodeId, value: &mut NodeId, object_type: &mut Type<'l>) -> bool {
	match function.node(node).kind {
		InstructionKind::StObj { target: t, value: v, object_type: ty } => {
			*target = t;
			*value = v;
			*object_type = ty;
			true
		}
		_ => false,
	}
}

pub fn match_lds_flda<'l>(function: &ILFunction<'l>, node: NodeId, field: &mut Option<&'l crate::typesystem::Field<'l>>) -> bool {
	match function.node(node).kind {
		InstructionKind::LdsFlda { field: f } => {
			*field = Some(f);
			true
		}
		_ => false,
	}
}

pub fn match_box<'l>(function: &ILFunction<'l>, node: NodeId, value: &mut NodeId, box_type: &mut Type<'l>) -> bool {
	match function.node(node).kind {
		InstructionKind::Box { value: v, box_type: ty } => {
			*value = v;
			*box_type = ty;
			true
		}
		_ => false,
	}
}

pub fn match_unbox<'l>(function: &ILFunction<'l>, node: NodeId, value: &mut NodeId, unbox_type: &mut Type<'l>) -> bool {
	match function.node(node).kind {
		InstructionKind::Unbox { value: v, unbox_type: ty } => {
			*value = v;
			*unbox_type = ty;
			true
		}
		_ => false,
	}
}

/// Structural equality against a pattern tree rooted at `pattern`, up to
/// which variable/field/method each side references — a literal
/// re-implementation of `Match(other)` would need an expected-vs-actual
/// binding environment; here both sides are real subtrees of the same
/// function, so structural equality reduces to comparing resolved
/// referents directly.
pub fn structurally_equal<'l>(function: &ILFunction<'l>, a: NodeId, b: NodeId) -> bool {
	if a == b {
		return true;
	}
	let (kind_a, kind_b) = (&function.node(a).kind, &function.node(b).kind);
	if std::mem::discriminant(kind_a) != std::mem::discriminant(kind_b) {
		return false;
	}
	let children_a = function.node(a).children();
	let children_b = function.node(b).children();
	if children_a.len() != children_b.len() {
		return false;
	}
	match (kind_a, kind_b) {
		(InstructionKind::LdLoc(x), InstructionKind::LdLoc(y)) => x == y,
		(InstructionKind::LdLoca(x), InstructionKind::LdLoca(y)) => x == y,
		(InstructionKind::LdcI4(x), InstructionKind::LdcI4(y)) => x == y,
		(InstructionKind::LdStr(x), InstructionKind::LdStr(y)) => x == y,
		(InstructionKind::LdNull, InstructionKind::LdNull) | (InstructionKind::Nop, InstructionKind::Nop) => true,
		_ => children_a.iter().zip(children_b.iter()).all(|(x, y)| structurally_equal(function, *x, *y)),
	}
}
