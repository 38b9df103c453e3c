//! `foreach` recovery over the enumerator pattern: a `using`-recovered (or
//! raw `TryFinally`-disposed) enumerator whose try-block is a `while(true)`
//! loop of `MoveNext()`/`get_Current()` collapsed into `ForEachInstruction`.
//!
//! Runs after [`crate::transforms::using_statement`] in the declared
//! pipeline order so it can match against an already-recognized
//! `UsingInstruction` rather than re-deriving the dispose wrapping itself.

use crate::error::DecompilerError;
use crate::ilast::function::ILFunction;
use crate::ilast::instruction::InstructionKind;
use crate::ilast::mutate;
use crate::ilast::variable::VariableId;
use crate::matchers::match_st_loc;
use crate::pipeline::settings::DecompilerSettings;
use crate::transforms::well_known::{is_get_current, is_get_enumerator, is_move_next};
use crate::transforms::Transform;

pub struct ForEachTransform;

impl Transform for ForEachTransform {
	fn name(&self) -> &'static str {
		"ForEachStatement"
	}

	fn idempotent_rerun(&self) -> bool {
		true
	}

	fn run<'l>(&self, function: &mut ILFunction<'l>, settings: &DecompilerSettings) -> Result<bool, DecompilerError> {
		if !settings.for_each_statement {
			return Ok(false);
		}

		let usings: Vec<_> = function.arena().iter().filter(|(_, node)| matches!(node.kind, InstructionKind::UsingInstruction { .. })).map(|(id, _)| id).collect();

		for using_node in usings {
			if try_foreach(function, using_node)? {
				return Ok(true);
			}
		}

		Ok(false)
	}
}

/// `resource` must have been initialized directly from `GetEnumerator()`
/// and `body` must be a single `BlockContainer` implementing `while(true) {
/// if (!MoveNext()) break; item = get_Current(); <loop body> }`. Only the
/// shape where the whole using-body is exactly this loop (nothing else
/// runs inside the `using`) is recognized.
fn try_foreach<'l>(function: &mut ILFunction<'l>, using_node: crate::ilast::arena::NodeId) -> Result<bool, DecompilerError> {
	let InstructionKind::UsingInstruction { resource, body } = &function.node(using_node).kind else { return Ok(false) };
	let (resource, body) = (*resource, *body);

	let InstructionKind::Call { method: enumerator_method, .. } = &function.node(resource).kind else { return Ok(false) };
	if !is_get_enumerator(enumerator_method) {
		return Ok(false);
	}

	let InstructionKind::Block { instructions: body_instructions, .. } = &function.node(body).kind else { return Ok(false) };
	let body_instructions = body_instructions.clone();
	let [loop_container] = body_instructions.as_slice() else { return Ok(false) };
	let InstructionKind::BlockContainer { entry_point, blocks } = &function.node(*loop_container).kind else { return Ok(false) };
	if blocks.len() != 1 {
		return Ok(false);
	}
	let entry_point = *entry_point;

	let InstructionKind::Block { instructions: loop_instructions, .. } = &function.node(entry_point).kind else { return Ok(false) };
	let loop_instructions = loop_instructions.clone();
	let [move_next_check, item_stloc, rest @ ..] = loop_instructions.as_slice() else { return Ok(false) };

	let InstructionKind::IfInstruction { condition, true_branch, false_branch: None } = &function.node(*move_next_check).kind else {
		return Ok(false);
	};
	let (condition, true_branch) = (*condition, *true_branch);
	let InstructionKind::LogicNot(inner) = &function.node(condition).kind else { return Ok(false) };
	let InstructionKind::Call { method: move_next_method, .. } = &function.node(*inner).kind else { return Ok(false) };
	if !is_move_next(move_next_method) {
		return Ok(false);
	}
	let InstructionKind::Block { instructions: break_instructions, .. } = &function.node(true_branch).kind else { return Ok(false) };
	let [leave] = break_instructions.as_slice() else { return Ok(false) };
	if !matches!(function.node(*leave).kind, InstructionKind::Leave { container: c, value: None } if *c == *loop_container) {
		return Ok(false);
	}

	let mut item_var = VariableId::from_raw(0);
	let mut current_call = *item_stloc;
	if !match_st_loc(function, *item_stloc, &mut item_var, &mut current_call) {
		return Ok(false);
	}
	let InstructionKind::Call { method: current_method, .. } = &function.node(current_call).kind else { return Ok(false) };
	if !is_get_current(current_method) {
		return Ok(false);
	}

	let loop_body = function.insert_node(InstructionKind::Block { instructions: Vec::new(), incoming_edge_count: 1 });
	for &instruction in rest {
		let extracted = mutate::extract_child(function, entry_point, instruction)?;
		mutate::append_to_block(function, loop_body, extracted)?;
	}

	let collection = mutate::extract_child(function, using_node, resource)?;
	let for_each = function.insert_node(InstructionKind::ForEachInstruction { item_variable: item_var, collection, body: loop_body });

	let parent = function.node(using_node).parent.ok_or_else(|| DecompilerError::InvariantViolation("using node has no parent".into()))?;
	mutate::replace_child(function, parent, using_node, for_each)?;
	mutate::discard(function, using_node);
	Ok(true)
}
