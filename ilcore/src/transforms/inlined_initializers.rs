//! Inlined-initializer recovery: a `newobj` stored to a single-definition
//! temporary, followed immediately by a run of field stores onto that same
//! temporary and nothing else, collapsed into `new T { Field = value, ... }`
//! at the temporary's one remaining use site.
//!
//! Not gated by a named setting (§6 lists none for it) — like
//! [`crate::transforms::delegate_construction`], this recovers a
//! data-flow fact (the temporary never escapes except through these
//! stores) rather than a configurable surface-syntax choice.

use std::collections::HashSet;

use crate::error::DecompilerError;
use crate::ilast::arena::NodeId;
use crate::ilast::function::ILFunction;
use crate::ilast::instruction::InstructionKind;
use crate::ilast::mutate;
use crate::ilast::variable::VariableId;
use crate::matchers::{match_ld_loc, match_st_loc};
use crate::pipeline::settings::DecompilerSettings;
use crate::transforms::Transform;
use crate::typesystem::Field;

pub struct InlinedInitializersTransform;

impl Transform for InlinedInitializersTransform {
	fn name(&self) -> &'static str {
		"InlinedInitializers"
	}

	fn idempotent_rerun(&self) -> bool {
		true
	}

	fn run<'l>(&self, function: &mut ILFunction<'l>, _settings: &DecompilerSettings) -> Result<bool, DecompilerError> {
		let blocks: Vec<_> = function.arena().iter().filter(|(_, node)| matches!(node.kind, InstructionKind::Block { .. })).map(|(id, _)| id).collect();

		for block in blocks {
			let InstructionKind::Block { instructions, .. } = &function.node(block).kind else { continue };
			let instructions = instructions.clone();
			if try_inlined_initializer(function, block, &instructions)? {
				return Ok(true);
			}
		}

		Ok(false)
	}
}

fn try_inlined_initializer<'l>(function: &mut ILFunction<'l>, block: NodeId, instructions: &[NodeId]) -> Result<bool, DecompilerError> {
	for start in 0..instructions.len() {
		let stloc = instructions[start];
		let mut temp = VariableId::from_raw(0);
		let mut ctor_value = stloc;
		if !match_st_loc(function, stloc, &mut temp, &mut ctor_value) {
			continue;
		}
		if !matches!(function.node(ctor_value).kind, InstructionKind::NewObj { .. }) {
			continue;
		}
		if function.variable(temp).store_count() != 1 {
			continue;
		}

		let mut field_stores: Vec<(NodeId, &'l Field<'l>, NodeId)> = Vec::new();
		let mut seen_fields: HashSet<*const Field<'l>> = HashSet::new();
		for &candidate in &instructions[start + 1..] {
			let InstructionKind::StFld { target, field, value } = &function.node(candidate).kind else { break };
			let (target, field, value) = (*target, *field, *value);
			let mut target_var = VariableId::from_raw(0);
			if !match_ld_loc(function, target, &mut target_var) || target_var != temp {
				break;
			}
			if !seen_fields.insert(field as *const _) {
				break;
			}
			field_stores.push((candidate, field, value));
		}

		if field_stores.is_empty() {
			continue;
		}
		// one load per field-store target, plus exactly one remaining use
		// elsewhere — anything else (the temporary escaping before the run
		// finishes, a field read back) disqualifies the region.
		if function.variable(temp).load_count() as usize != field_stores.len() + 1 {
			continue;
		}

		let run: HashSet<NodeId> = std::iter::once(stloc).chain(field_stores.iter().map(|(id, ..)| *id)).collect();
		let remaining_uses: Vec<NodeId> = function
			.arena()
			.iter()
			.filter(|(id, node)| !run.contains(id) && matches!(node.kind, InstructionKind::LdLoc(v) if v == temp))
			.map(|(id, _)| id)
			.collect();
		let [use_site] = remaining_uses.as_slice() else { continue };
		let use_site = *use_site;
		let use_parent = function.node(use_site).parent.ok_or_else(|| DecompilerError::InvariantViolation("dangling temporary use".into()))?;

		let construction = mutate::extract_child(function, stloc, ctor_value)?;
		let mut bound_initializers = Vec::with_capacity(field_stores.len());
		for (store, field, value) in &field_stores {
			let extracted = mutate::extract_child(function, *store, *value)?;
			bound_initializers.push((*field, extracted));
		}

		let node = function.insert_node(InstructionKind::ObjectInitializer { construction, initializers: bound_initializers });
		mutate::replace_child(function, use_parent, use_site, node)?;
		mutate::discard(function, use_site);

		mutate::remove_subtree(function, stloc)?;
		for (store, ..) in &field_stores {
			mutate::remove_subtree(function, *store)?;
		}

		return Ok(true);
	}
	Ok(false)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ilast::variable::VariableKind;
	use crate::metadata::heaps::table::{FieldAttributes, MethodAttributes, MethodImplAttributes};
	use crate::typesystem::types::Class;
	use crate::typesystem::{Method, PrimitiveType, Type};

	fn leaked_class<'l>() -> &'l Class<'l> {
		Box::leak(Box::new(Class {
			name: "Point",
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

	fn leaked_field<'l>(name: &'l str, declaring_type: &'l Class<'l>) -> &'l Field<'l> {
		Box::leak(Box::new(Field { name, declaring_type, field_type: Type::Primitive(PrimitiveType::I4), attributes: FieldAttributes::empty(), constant_value: None }))
	}

	fn leaked_ctor<'l>(declaring_type: &'l Class<'l>) -> &'l Method<'l> {
		Box::leak(Box::new(Method {
			name: ".ctor",
			declaring_type,
			return_type: Type::Primitive(PrimitiveType::Void),
			parameters: &[],
			attributes: MethodAttributes::empty(),
			impl_attributes: MethodImplAttributes::empty(),
			generic_param_count: 0,
			rva: 1,
		}))
	}

	/// `stloc t(newobj Point()); stfld t.X(1); stfld t.Y(2); stloc result(ldloc
	/// t)` collapses to `stloc result(new Point { X = 1, Y = 2 })`, fully
	/// eliminating `t`.
	#[test]
	fn recognizes_field_initializer_run() {
		let class = leaked_class();
		let ctor = leaked_ctor(class);
		let field_x = leaked_field("X", class);
		let field_y = leaked_field("Y", class);
		let owner = leaked_ctor(class);

		let mut function = ILFunction::new(owner);
		let temp = function.declare_variable(VariableKind::StackSlot, Type::Class(class));
		let result = function.declare_variable(VariableKind::Local, Type::Class(class));

		let newobj = function.insert_node(InstructionKind::NewObj { constructor: ctor, args: vec![] });
		let stloc_temp = function.insert_node(InstructionKind::StLoc { variable: temp, value: newobj });

		let ld_x_target = function.insert_node(InstructionKind::LdLoc(temp));
		let one = function.insert_node(InstructionKind::LdcI4(1));
		let stfld_x = function.insert_node(InstructionKind::StFld { target: ld_x_target, field: field_x, value: one });

		let ld_y_target = function.insert_node(InstructionKind::LdLoc(temp));
		let two = function.insert_node(InstructionKind::LdcI4(2));
		let stfld_y = function.insert_node(InstructionKind::StFld { target: ld_y_target, field: field_y, value: two });

		let ld_temp_final = function.insert_node(InstructionKind::LdLoc(temp));
		let stloc_result = function.insert_node(InstructionKind::StLoc { variable: result, value: ld_temp_final });

		let InstructionKind::BlockContainer { entry_point, .. } = &function.node(function.root).kind else { panic!() };
		let entry = *entry_point;
		for node in [stloc_temp, stfld_x, stfld_y, stloc_result] {
			mutate::append_to_block(&mut function, entry, node).unwrap();
		}

		assert_eq!(function.variable(temp).store_count(), 1);
		assert_eq!(function.variable(temp).load_count(), 3);

		let changed = InlinedInitializersTransform.run(&mut function, &DecompilerSettings::default()).unwrap();
		assert!(changed);

		let InstructionKind::Block { instructions, .. } = &function.node(entry).kind else { panic!() };
		assert_eq!(instructions.len(), 1);
		let InstructionKind::StLoc { value, .. } = &function.node(instructions[0]).kind else { panic!("expected stloc result") };
		let InstructionKind::ObjectInitializer { initializers, .. } = &function.node(*value).kind else { panic!("expected ObjectInitializer") };
		assert_eq!(initializers.len(), 2);
		assert_eq!(function.variable(temp).store_count(), 0);
		assert_eq!(function.variable(temp).load_count(), 0);
	}
}
