//! Null-coalescing (`??`) and null-conditional (`?.`) recovery, gated by
//! the single `NullPropagation` setting since both idioms come from the
//! same compiler lowering family (a `stloc` of the left operand into a
//! compiler temporary, then a conditional branch on its nullness).

use crate::error::DecompilerError;
use crate::ilast::function::ILFunction;
use crate::ilast::instruction::InstructionKind;
use crate::ilast::mutate;
use crate::ilast::variable::VariableId;
use crate::matchers::{match_comp_equals, match_ld_loc, match_ld_null, match_st_loc};
use crate::pipeline::settings::DecompilerSettings;
use crate::transforms::Transform;

pub struct NullPropagationTransform;

impl Transform for NullPropagationTransform {
	fn name(&self) -> &'static str {
		"NullPropagation"
	}

	fn idempotent_rerun(&self) -> bool {
		true
	}

	fn run<'l>(&self, function: &mut ILFunction<'l>, settings: &DecompilerSettings) -> Result<bool, DecompilerError> {
		if !settings.null_propagation {
			return Ok(false);
		}

		let blocks: Vec<_> = function.arena().iter().filter(|(_, node)| matches!(node.kind, InstructionKind::Block { .. })).map(|(id, _)| id).collect();

		for block in blocks {
			let InstructionKind::Block { instructions, .. } = &function.node(block).kind else { continue };
			let instructions = instructions.clone();

			for i in (0..instructions.len()).rev() {
				if try_null_conditional(function, block, &instructions, i)? {
					return Ok(true);
				}
			}
		}

		Ok(false)
	}
}

/// `stloc t(left); if (t == null) { ... } else { body using t }` where the
/// else-branch is the node `MatchIfInstruction` would otherwise reject as
/// non-fallthrough — here we look past that restriction deliberately by
/// matching the `if`'s raw `false_branch` field, since `?.`/`??` is exactly
/// the case that pattern exists to carve out.
fn try_null_conditional<'l>(function: &mut ILFunction<'l>, block: crate::ilast::arena::NodeId, instructions: &[crate::ilast::arena::NodeId], i: usize) -> Result<bool, DecompilerError> {
	if i == 0 {
		return Ok(false);
	}
	let if_node = instructions[i];
	let stloc = instructions[i - 1];

	let InstructionKind::IfInstruction { condition, true_branch, false_branch: Some(false_branch) } = &function.node(if_node).kind else {
		return Ok(false);
	};
	let (condition, true_branch, false_branch) = (*condition, *true_branch, *false_branch);

	let mut temp_var = VariableId::from_raw(0);
	let mut left = stloc;
	if !match_st_loc(function, stloc, &mut temp_var, &mut left) {
		return Ok(false);
	}
	if function.variable(temp_var).store_count() != 1 {
		return Ok(false);
	}

	let mut cmp_left = condition;
	let mut cmp_right = condition;
	if !match_comp_equals(function, condition, &mut cmp_left, &mut cmp_right) {
		return Ok(false);
	}
	let mut cmp_var = VariableId::from_raw(0);
	let is_null_check = (match_ld_loc(function, cmp_left, &mut cmp_var) && cmp_var == temp_var && match_ld_null(function, cmp_right))
		|| (match_ld_loc(function, cmp_right, &mut cmp_var) && cmp_var == temp_var && match_ld_null(function, cmp_left));
	if !is_null_check {
		return Ok(false);
	}

	// `??`: both arms produce a value that's immediately used the same
	// way; the null-branch is a plain expression with no further use of
	// `t`, the non-null branch is exactly `ldloc t`.
	if is_trivial_ldloc(function, false_branch, temp_var) {
		let right = mutate::extract_child(function, stloc, left)?;
		let InstructionKind::Block { instructions: true_instrs, .. } = &function.node(true_branch).kind else { return Ok(false) };
		let [only] = true_instrs.as_slice() else { return Ok(false) };
		let coalesced_right = *only;
		let coalesced_right = mutate::extract_child(function, true_branch, coalesced_right)?;
		let node = function.insert_node(InstructionKind::NullCoalescing { left: right, right: coalesced_right });
		mutate::replace_child(function, block, if_node, node)?;
		mutate::discard(function, if_node);
		mutate::remove_subtree(function, stloc)?;
		return Ok(true);
	}

	// `?.`: the null-branch is empty/default, the non-null branch uses
	// `t` as its receiver one or more times.
	if is_empty_default(function, true_branch) {
		let target = mutate::extract_child(function, stloc, left)?;
		let body = mutate::extract_child(function, if_node, false_branch)?;
		let node = function.insert_node(InstructionKind::NullConditional { target, body });
		mutate::replace_child(function, block, if_node, node)?;
		mutate::discard(function, if_node);
		mutate::remove_subtree(function, stloc)?;
		return Ok(true);
	}

	Ok(false)
}

fn is_trivial_ldloc<'l>(function: &ILFunction<'l>, block: crate::ilast::arena::NodeId, var: VariableId) -> bool {
	let InstructionKind::Block { instructions, .. } = &function.node(block).kind else { return false };
	match instructions.as_slice() {
		[only] => {
			let mut v = VariableId::from_raw(0);
			match_ld_loc(function, *only, &mut v) && v == var
		}
		_ => false,
	}
}

fn is_empty_default<'l>(function: &ILFunction<'l>, block: crate::ilast::arena::NodeId) -> bool {
	let InstructionKind::Block { instructions, .. } = &function.node(block).kind else { return false };
	instructions.is_empty() || (instructions.len() == 1 && matches!(function.node(instructions[0]).kind, InstructionKind::LdNull))
}
