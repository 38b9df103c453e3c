//! Iterator-state-machine unwinding (§4.F): the narrow, intra-procedural
//! slice of the real recovery this core implements.
//!
//! The full recovery (given a compiler-generated `MoveNext` state-machine
//! *type*, synthesize a fresh iterator *method* body driven by the state
//! transitions across its whole `switch (state)` dispatch) is a whole-type
//! analysis that sits above a single [`ILFunction`] — it belongs to the
//! pipeline layer that stitches a state machine's fields and its
//! `MoveNext` body back into the original method's signature, not to a
//! single-function transform pass. What *is* in scope here, and what every
//! later pass (the control-flow structurer, the printer) actually
//! consumes, is recognizing the two fixed low-level shapes Roslyn lowers
//! `yield return`/`yield break` to, wherever they already appear in a
//! function body: `this.<>2__current = value; [this.<>1__state = n;]
//! return true;` and a bare `return false;` once at least one `yield` has
//! already been recovered in this function (guarding against misfiring on
//! an ordinary `bool`-returning method).

use crate::error::DecompilerError;
use crate::ilast::arena::NodeId;
use crate::ilast::function::ILFunction;
use crate::ilast::instruction::InstructionKind;
use crate::ilast::mutate;
use crate::matchers::match_ldc_i4_value;
use crate::pipeline::settings::DecompilerSettings;
use crate::transforms::well_known::{is_iterator_current_field, is_iterator_state_field};
use crate::transforms::Transform;

pub struct IteratorTransform;

impl Transform for IteratorTransform {
	fn name(&self) -> &'static str {
		"Iterators"
	}

	fn idempotent_rerun(&self) -> bool {
		true
	}

	fn run<'l>(&self, function: &mut ILFunction<'l>, settings: &DecompilerSettings) -> Result<bool, DecompilerError> {
		if !settings.iterators {
			return Ok(false);
		}

		let blocks: Vec<_> = function.arena().iter().filter(|(_, node)| matches!(node.kind, InstructionKind::Block { .. })).map(|(id, _)| id).collect();

		for &block in &blocks {
			let InstructionKind::Block { instructions, .. } = &function.node(block).kind else { continue };
			let instructions = instructions.clone();
			if try_yield_return(function, block, &instructions)? {
				return Ok(true);
			}
		}

		if has_recovered_yield(function) {
			for &block in &blocks {
				let InstructionKind::Block { instructions, .. } = &function.node(block).kind else { continue };
				let instructions = instructions.clone();
				if try_yield_break(function, block, &instructions)? {
					return Ok(true);
				}
			}
		}

		Ok(false)
	}
}

fn has_recovered_yield(function: &ILFunction) -> bool {
	function.arena().iter().any(|(_, node)| matches!(node.kind, InstructionKind::YieldReturn(_) | InstructionKind::YieldBreak))
}

/// `[stfld state(n);] stfld current(value); return true;` — the state
/// store is optional and consumed along with the rest of the region when
/// present, but its absence doesn't block recognition (some lowerings
/// reorder it earlier in the block, outside this fixed three/two
/// instruction window; those are left for a later run once intervening
/// instructions have been reduced by other passes).
fn try_yield_return<'l>(function: &mut ILFunction<'l>, block: NodeId, instructions: &[NodeId]) -> Result<bool, DecompilerError> {
	for i in 1..instructions.len() {
		let ret = instructions[i];
		let InstructionKind::Return(Some(ret_value)) = &function.node(ret).kind else { continue };
		if !match_ldc_i4_value(function, *ret_value, 1) {
			continue;
		}

		let current_store = instructions[i - 1];
		let InstructionKind::StFld { field, value, .. } = &function.node(current_store).kind else { continue };
		if !is_iterator_current_field(field) {
			continue;
		}
		let value = *value;

		let mut consumed_start = i - 1;
		if i >= 2 {
			if let InstructionKind::StFld { field: state_field, .. } = &function.node(instructions[i - 2]).kind {
				if is_iterator_state_field(state_field) {
					consumed_start = i - 2;
				}
			}
		}

		let extracted_value = mutate::extract_child(function, current_store, value)?;
		let yield_node = function.insert_node(InstructionKind::YieldReturn(extracted_value));
		mutate::replace_child(function, block, current_store, yield_node)?;
		mutate::discard(function, current_store);
		mutate::remove_subtree(function, ret)?;
		if consumed_start < i - 1 {
			mutate::remove_subtree(function, instructions[consumed_start])?;
		}
		return Ok(true);
	}
	Ok(false)
}

fn try_yield_break<'l>(function: &mut ILFunction<'l>, block: NodeId, instructions: &[NodeId]) -> Result<bool, DecompilerError> {
	for &ret in instructions {
		let InstructionKind::Return(Some(value)) = &function.node(ret).kind else { continue };
		if !match_ldc_i4_value(function, *value, 0) {
			continue;
		}
		let yield_break = function.insert_node(InstructionKind::YieldBreak);
		mutate::replace_child(function, block, ret, yield_break)?;
		mutate::discard(function, ret);
		return Ok(true);
	}
	Ok(false)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::metadata::heaps::table::{FieldAttributes, MethodAttributes, MethodImplAttributes};
	use crate::typesystem::types::Class;
	use crate::typesystem::{Field, Method, PrimitiveType, Type};

	fn leaked_class<'l>() -> &'l Class<'l> {
		Box::leak(Box::new(Class {
			name: "<Iter>d__0",
			namespace: "N",
			is_value_type: false,
			is_interface: false,
			is_sealed: true,
			is_abstract: false,
			generic_param_count: 0,
			base: std::cell::Cell::new(None),
			fields: std::cell::Cell::new(None),
			methods: std::cell::Cell::new(None),
		}))
	}

	fn leaked_field<'l>(name: &'l str, declaring_type: &'l Class<'l>, ty: Type<'l>) -> &'l Field<'l> {
		Box::leak(Box::new(Field { name, declaring_type, field_type: ty, attributes: FieldAttributes::empty(), constant_value: None }))
	}

	fn leaked_move_next<'l>(declaring_type: &'l Class<'l>) -> &'l Method<'l> {
		Box::leak(Box::new(Method {
			name: "MoveNext",
			declaring_type,
			return_type: Type::Primitive(PrimitiveType::Boolean),
			parameters: &[],
			attributes: MethodAttributes::empty(),
			impl_attributes: MethodImplAttributes::empty(),
			generic_param_count: 0,
			rva: 1,
		}))
	}

	/// `stfld this.<>1__state(-1); stfld this.<>2__current(ldloc v); return
	/// true;` collapses to `yield return v;`, and a later `return false;`
	/// in the same function then collapses to `yield break;`.
	#[test]
	fn recognizes_yield_return_then_yield_break() {
		let class = leaked_class();
		let state_field = leaked_field("<>1__state", class, Type::Primitive(PrimitiveType::I4));
		let current_field = leaked_field("<>2__current", class, Type::Primitive(PrimitiveType::I4));
		let method = leaked_move_next(class);

		let mut function = ILFunction::new(method);
		let this_var = function.declare_variable(crate::ilast::variable::VariableKind::Parameter, Type::Class(class));
		let v = function.declare_variable(crate::ilast::variable::VariableKind::Local, Type::Primitive(PrimitiveType::I4));

		let ld_this_state = function.insert_node(InstructionKind::LdLoc(this_var));
		let neg_one = function.insert_node(InstructionKind::LdcI4(-1));
		let stfld_state = function.insert_node(InstructionKind::StFld { target: ld_this_state, field: state_field, value: neg_one });

		let ld_this_current = function.insert_node(InstructionKind::LdLoc(this_var));
		let ld_v = function.insert_node(InstructionKind::LdLoc(v));
		let stfld_current = function.insert_node(InstructionKind::StFld { target: ld_this_current, field: current_field, value: ld_v });

		let one = function.insert_node(InstructionKind::LdcI4(1));
		let ret_true = function.insert_node(InstructionKind::Return(Some(one)));

		let zero = function.insert_node(InstructionKind::LdcI4(0));
		let ret_false = function.insert_node(InstructionKind::Return(Some(zero)));

		let InstructionKind::BlockContainer { entry_point, .. } = &function.node(function.root).kind else { panic!() };
		let entry = *entry_point;
		for node in [stfld_state, stfld_current, ret_true, ret_false] {
			mutate::append_to_block(&mut function, entry, node).unwrap();
		}

		let settings = DecompilerSettings::default();
		let changed = IteratorTransform.run(&mut function, &settings).unwrap();
		assert!(changed);
		let changed = IteratorTransform.run(&mut function, &settings).unwrap();
		assert!(changed);

		let InstructionKind::Block { instructions, .. } = &function.node(entry).kind else { panic!() };
		assert_eq!(instructions.len(), 2);
		assert!(matches!(function.node(instructions[0]).kind, InstructionKind::YieldReturn(_)));
		assert!(matches!(function.node(instructions[1]).kind, InstructionKind::YieldBreak));
	}
}
