//! Tuple recovery (§4.F, gated by `Tuples`): collapses a
//! `System.ValueTuple` construction into `(e0, e1, ...)` literal form, and
//! a single-definition tuple-typed temporary whose `ItemN` fields are
//! immediately copied out into `(a, b, ...) = value` deconstruction form.

use crate::error::DecompilerError;
use crate::ilast::function::ILFunction;
use crate::ilast::instruction::InstructionKind;
use crate::ilast::mutate;
use crate::ilast::variable::VariableId;
use crate::matchers::match_st_loc;
use crate::pipeline::settings::DecompilerSettings;
use crate::transforms::well_known::{is_value_tuple, tuple_item_index};
use crate::transforms::Transform;
use crate::typesystem::Type;

pub struct TupleTransform;

impl Transform for TupleTransform {
	fn name(&self) -> &'static str {
		"Tuples"
	}

	fn idempotent_rerun(&self) -> bool {
		true
	}

	fn run<'l>(&self, function: &mut ILFunction<'l>, settings: &DecompilerSettings) -> Result<bool, DecompilerError> {
		if !settings.tuples {
			return Ok(false);
		}

		let constructions: Vec<_> = function
			.arena()
			.iter()
			.filter(|(_, node)| matches!(&node.kind, InstructionKind::NewObj { constructor, .. } if is_value_tuple(&Type::ValueType(constructor.declaring_type))))
			.map(|(id, _)| id)
			.collect();
		for node in constructions {
			if try_tuple_expression(function, node)? {
				return Ok(true);
			}
		}

		let blocks: Vec<_> = function.arena().iter().filter(|(_, node)| matches!(node.kind, InstructionKind::Block { .. })).map(|(id, _)| id).collect();
		for block in blocks {
			let InstructionKind::Block { instructions, .. } = &function.node(block).kind else { continue };
			let instructions = instructions.clone();
			if try_tuple_deconstruction(function, block, &instructions)? {
				return Ok(true);
			}
		}

		Ok(false)
	}
}

fn try_tuple_expression<'l>(function: &mut ILFunction<'l>, newobj: crate::ilast::arena::NodeId) -> Result<bool, DecompilerError> {
	let InstructionKind::NewObj { constructor, args } = &function.node(newobj).kind else { return Ok(false) };
	let tuple_type = Type::ValueType(constructor.declaring_type);
	let args = args.clone();
	if args.is_empty() {
		return Ok(false);
	}

	let mut elements = Vec::new();
	for arg in args {
		elements.push(mutate::extract_child(function, newobj, arg)?);
	}

	let node = function.insert_node(InstructionKind::TupleExpression { elements, tuple_type });
	let parent = function.node(newobj).parent.ok_or_else(|| DecompilerError::InvariantViolation("tuple newobj has no parent".into()))?;
	mutate::replace_child(function, parent, newobj, node)?;
	mutate::discard(function, newobj);
	Ok(true)
}

/// `stloc t(value); ldloc t -> LdFld Item1 -> stloc a; ldloc t -> LdFld
/// Item2 -> stloc b; ...` immediately following, each field read exactly
/// once and `t` itself never read again afterward.
fn try_tuple_deconstruction<'l>(function: &mut ILFunction<'l>, block: crate::ilast::arena::NodeId, instructions: &[crate::ilast::arena::NodeId]) -> Result<bool, DecompilerError> {
	for start in 0..instructions.len() {
		let stloc = instructions[start];
		let mut tuple_var = VariableId::from_raw(0);
		let mut value = stloc;
		if !match_st_loc(function, stloc, &mut tuple_var, &mut value) {
			continue;
		}
		let InstructionKind::StLoc { .. } = &function.node(stloc).kind else { continue };
		if !is_value_tuple(&function.variable(tuple_var).variable_type) {
			continue;
		}
		if function.variable(tuple_var).store_count() != 1 {
			continue;
		}

		let mut element_vars: Vec<(usize, VariableId)> = Vec::new();
		let mut consumed = 1;
		for &extractor in &instructions[start + 1..] {
			let InstructionKind::StLoc { variable: element_var, value: field_read } = &function.node(extractor).kind else { break };
			let (element_var, field_read) = (*element_var, *field_read);
			let InstructionKind::LdFld { target, field } = &function.node(field_read).kind else { break };
			let (target, field_name) = (*target, field.name);
			let Some(index) = tuple_item_index(field_name) else { break };
			let mut loaded = VariableId::from_raw(0);
			if !crate::matchers::match_ld_loc(function, target, &mut loaded) || loaded != tuple_var {
				break;
			}
			if element_vars.iter().any(|(i, _)| *i == index) {
				break;
			}
			element_vars.push((index, element_var));
			consumed += 1;
		}

		if element_vars.len() < 2 || function.variable(tuple_var).load_count() as usize != element_vars.len() {
			continue;
		}
		element_vars.sort_by_key(|(i, _)| *i);
		if element_vars.iter().enumerate().any(|(expected, (i, _))| *i != expected) {
			continue;
		}

		let elements: Vec<VariableId> = element_vars.into_iter().map(|(_, v)| v).collect();
		let extracted_value = mutate::extract_child(function, stloc, value)?;
		let node = function.insert_node(InstructionKind::TupleDeconstruction { elements, value: extracted_value });
		mutate::replace_child(function, block, stloc, node)?;
		mutate::discard(function, stloc);
		for &extractor in &instructions[start + 1..start + consumed] {
			mutate::remove_subtree(function, extractor)?;
		}
		return Ok(true);
	}
	Ok(false)
}
