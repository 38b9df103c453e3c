//! `using` recovery: a `TryFinally` whose finally-block disposes the
//! resource stored by the try's setup `stloc`, collapsed to
//! `UsingInstruction`.
//!
//! Two finally shapes are accepted: an unconditional `Dispose()` call, and
//! the null-guarded `if (resource != null) resource.Dispose();` form the
//! Roslyn compiler emits for reference-typed resources. A value-typed
//! resource (no null check possible) uses the unconditional shape.

use crate::error::DecompilerError;
use crate::ilast::function::ILFunction;
use crate::ilast::instruction::InstructionKind;
use crate::ilast::mutate;
use crate::ilast::variable::VariableId;
use crate::matchers::{match_comp_not_equals, match_ld_loc, match_ld_null, match_if_instruction, match_st_loc};
use crate::pipeline::settings::DecompilerSettings;
use crate::transforms::well_known::is_dispose;
use crate::transforms::Transform;

pub struct UsingStatementTransform;

impl Transform for UsingStatementTransform {
	fn name(&self) -> &'static str {
		"UsingStatement"
	}

	fn idempotent_rerun(&self) -> bool {
		true
	}

	fn run<'l>(&self, function: &mut ILFunction<'l>, settings: &DecompilerSettings) -> Result<bool, DecompilerError> {
		if !settings.using_statement {
			return Ok(false);
		}

		let blocks: Vec<_> = function.arena().iter().filter(|(_, node)| matches!(node.kind, InstructionKind::Block { .. })).map(|(id, _)| id).collect();

		for block in blocks {
			let InstructionKind::Block { instructions, .. } = &function.node(block).kind else { continue };
			let instructions = instructions.clone();

			for i in (1..instructions.len()).rev() {
				let try_finally = instructions[i];
				if !matches!(function.node(try_finally).kind, InstructionKind::TryFinally { .. }) {
					continue;
				}
				let stloc = instructions[i - 1];
				if try_using(function, block, stloc, try_finally)? {
					return Ok(true);
				}
			}
		}

		Ok(false)
	}
}

fn try_using<'l>(
	function: &mut ILFunction<'l>,
	block: crate::ilast::arena::NodeId,
	stloc: crate::ilast::arena::NodeId,
	try_finally: crate::ilast::arena::NodeId,
) -> Result<bool, DecompilerError> {
	let mut resource_var = VariableId::from_raw(0);
	let mut resource_init = stloc;
	if !match_st_loc(function, stloc, &mut resource_var, &mut resource_init) {
		return Ok(false);
	}
	if function.variable(resource_var).store_count() != 1 {
		return Ok(false);
	}

	let InstructionKind::TryFinally { try_block, finally_block } = &function.node(try_finally).kind else { return Ok(false) };
	let (try_block, finally_block) = (*try_block, *finally_block);

	let InstructionKind::Block { instructions: finally_instructions, .. } = &function.node(finally_block).kind else { return Ok(false) };
	let finally_instructions = finally_instructions.clone();

	let dispose_call = match finally_instructions.as_slice() {
		[only] => *only,
		[if_node, leave] if matches!(function.node(*leave).kind, InstructionKind::Leave { value: None, .. }) => {
			let mut condition = *if_node;
			let mut true_branch = *if_node;
			if !match_if_instruction(function, *if_node, &mut condition, &mut true_branch) {
				return Ok(false);
			}
			let mut left = condition;
			let mut right = condition;
			if !match_comp_not_equals(function, condition, &mut left, &mut right) {
				return Ok(false);
			}
			let mut var = VariableId::from_raw(0);
			let null_on_other_side = match_ld_loc(function, left, &mut var) && var == resource_var && match_ld_null(function, right)
				|| match_ld_loc(function, right, &mut var) && var == resource_var && match_ld_null(function, left);
			if !null_on_other_side {
				return Ok(false);
			}
			let InstructionKind::Block { instructions: body, .. } = &function.node(true_branch).kind else { return Ok(false) };
			let [only] = body.as_slice() else { return Ok(false) };
			*only
		}
		_ => return Ok(false),
	};

	let InstructionKind::Call { method, is_virtual: _, args } = &function.node(dispose_call).kind else { return Ok(false) };
	if !is_dispose(method) || args.len() != 1 {
		return Ok(false);
	}
	let mut dispose_target = VariableId::from_raw(0);
	if !match_ld_loc(function, args[0], &mut dispose_target) || dispose_target != resource_var {
		return Ok(false);
	}

	let resource = mutate::extract_child(function, stloc, resource_init)?;
	let try_block = mutate::extract_child(function, try_finally, try_block)?;
	let using_node = function.insert_node(InstructionKind::UsingInstruction { resource, body: try_block });

	mutate::replace_child(function, block, try_finally, using_node)?;
	mutate::discard(function, try_finally);
	mutate::remove_subtree(function, stloc)?;
	Ok(true)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ilast::variable::VariableKind;
	use crate::metadata::heaps::table::{MethodAttributes, MethodImplAttributes};
	use crate::typesystem::{Method, PrimitiveType, Type};

	fn leaked_class<'l>() -> &'l crate::typesystem::types::Class<'l> {
		Box::leak(Box::new(crate::typesystem::types::Class {
			name: "C",
			namespace: "N",
			is_value_type: false,
			is_interface: false,
			is_sealed: false,
			is_abstract: false,
			generic_param_count: 0,
			base: std::cell::Cell::new(None),
			fields: std::cell::Cell::new(None),
			methods: std::cell::Cell::new(None),
		}))
	}

	fn leaked_method<'l>(name: &'l str, declaring_type: &'l crate::typesystem::types::Class<'l>) -> &'l Method<'l> {
		Box::leak(Box::new(Method {
			name,
			declaring_type,
			return_type: Type::Primitive(PrimitiveType::Void),
			parameters: &[],
			attributes: MethodAttributes::empty(),
			impl_attributes: MethodImplAttributes::empty(),
			generic_param_count: 0,
			rva: 1,
		}))
	}

	/// `stloc r(value); try { call Foo(); } finally { call r.Dispose(); }`
	/// with the unconditional (value-type resource) finally shape.
	#[test]
	fn recognizes_unconditional_dispose() {
		let class = leaked_class();
		let dispose = leaked_method("Dispose", class);
		let foo = leaked_method("Foo", class);

		let mut function = ILFunction::new(foo);
		let resource = function.declare_variable(VariableKind::Local, Type::ValueType(class));

		let ld_null = function.insert_node(InstructionKind::LdNull);
		let stloc = function.insert_node(InstructionKind::StLoc { variable: resource, value: ld_null });

		let foo_call = function.insert_node(InstructionKind::Call { method: foo, is_virtual: false, args: vec![] });
		let try_block = function.insert_node(InstructionKind::Block { instructions: vec![foo_call], incoming_edge_count: 1 });

		let ld_loc = function.insert_node(InstructionKind::LdLoc(resource));
		let dispose_call = function.insert_node(InstructionKind::Call { method: dispose, is_virtual: true, args: vec![ld_loc] });
		let finally_block = function.insert_node(InstructionKind::Block { instructions: vec![dispose_call], incoming_edge_count: 1 });

		let try_finally = function.insert_node(InstructionKind::TryFinally { try_block, finally_block });

		let InstructionKind::BlockContainer { entry_point, .. } = &function.node(function.root).kind else { panic!() };
		let entry = *entry_point;
		mutate::append_to_block(&mut function, entry, stloc).unwrap();
		mutate::append_to_block(&mut function, entry, try_finally).unwrap();

		assert_eq!(function.variable(resource).store_count(), 1);
		assert_eq!(function.variable(resource).load_count(), 1);

		let changed = UsingStatementTransform.run(&mut function, &DecompilerSettings::default()).unwrap();
		assert!(changed);

		let InstructionKind::Block { instructions, .. } = &function.node(entry).kind else { panic!() };
		assert_eq!(instructions.len(), 1);
		assert!(matches!(function.node(instructions[0]).kind, InstructionKind::UsingInstruction { .. }));
		assert_eq!(function.variable(resource).store_count(), 0);
		assert_eq!(function.variable(resource).load_count(), 0);
	}
}
