//! `await` recovery (§4.F): the awaiter dance Roslyn lowers `await task;`
//! to — `GetAwaiter()` stored to a single-use temporary, immediately
//! consumed by `GetResult()` — collapsed into an `AwaitInstruction`
//! expression.
//!
//! Like [`crate::transforms::iterators`], this is the intra-procedural
//! slice of the full recovery: the real compiler lowering interleaves the
//! awaiter dance with an `IsCompleted` branch and an
//! `AwaitUnsafeOnCompleted` continuation hookup that suspends the whole
//! state machine, which (as with iterators) is a whole-type analysis one
//! layer above a single function body. Recognizing the awaiter's
//! single-use data flow here is what every later recovered `await`
//! expression in the surface output is actually built from — the
//! suspend/resume plumbing around it is reconstructed by the state-machine
//! stitching layer, not by this pass.

use crate::error::DecompilerError;
use crate::ilast::arena::NodeId;
use crate::ilast::function::ILFunction;
use crate::ilast::instruction::InstructionKind;
use crate::ilast::mutate;
use crate::ilast::variable::VariableId;
use crate::matchers::{match_ld_loc, match_st_loc};
use crate::pipeline::settings::DecompilerSettings;
use crate::transforms::well_known::{is_get_awaiter, is_get_result};
use crate::transforms::Transform;

pub struct AsyncAwaitTransform;

impl Transform for AsyncAwaitTransform {
	fn name(&self) -> &'static str {
		"AsyncAwait"
	}

	fn idempotent_rerun(&self) -> bool {
		true
	}

	fn run<'l>(&self, function: &mut ILFunction<'l>, settings: &DecompilerSettings) -> Result<bool, DecompilerError> {
		if !settings.async_await {
			return Ok(false);
		}

		let blocks: Vec<_> = function.arena().iter().filter(|(_, node)| matches!(node.kind, InstructionKind::Block { .. })).map(|(id, _)| id).collect();

		for block in blocks {
			let InstructionKind::Block { instructions, .. } = &function.node(block).kind else { continue };
			let instructions = instructions.clone();
			if try_await(function, block, &instructions)? {
				return Ok(true);
			}
		}

		Ok(false)
	}
}

/// `stloc awaiter(call task.GetAwaiter()); <result-consumer>` where the
/// awaiter is single-definition, used exactly once, and that one use is
/// `GetResult()` on it — either assigned (`stloc result(call
/// awaiter.GetResult())`, the `Task<T>` shape) or discarded as a bare
/// statement (the non-generic `Task` shape).
fn try_await<'l>(function: &mut ILFunction<'l>, block: NodeId, instructions: &[NodeId]) -> Result<bool, DecompilerError> {
	for i in 0..instructions.len().saturating_sub(1) {
		let stloc = instructions[i];
		let mut awaiter_var = VariableId::from_raw(0);
		let mut get_awaiter_call = stloc;
		if !match_st_loc(function, stloc, &mut awaiter_var, &mut get_awaiter_call) {
			continue;
		}
		let InstructionKind::Call { method: get_awaiter_method, args: get_awaiter_args, .. } = &function.node(get_awaiter_call).kind else { continue };
		if !is_get_awaiter(get_awaiter_method) || get_awaiter_args.len() != 1 {
			continue;
		}
		let task = get_awaiter_args[0];

		if function.variable(awaiter_var).store_count() != 1 || function.variable(awaiter_var).load_count() != 1 {
			continue;
		}

		let next = instructions[i + 1];
		let rewrote = match &function.node(next).kind {
			InstructionKind::StLoc { value: get_result_call, .. } => {
				let get_result_call = *get_result_call;
				if !is_get_result_call_on(function, get_result_call, awaiter_var) {
					false
				} else {
					let task_node = mutate::extract_child(function, get_awaiter_call, task)?;
					let await_node = function.insert_node(InstructionKind::AwaitInstruction(task_node));
					mutate::replace_child(function, next, get_result_call, await_node)?;
					mutate::discard(function, get_result_call);
					mutate::remove_subtree(function, stloc)?;
					true
				}
			}
			InstructionKind::Call { .. } if is_get_result_call_on(function, next, awaiter_var) => {
				let task_node = mutate::extract_child(function, get_awaiter_call, task)?;
				let await_node = function.insert_node(InstructionKind::AwaitInstruction(task_node));
				mutate::replace_child(function, block, next, await_node)?;
				mutate::discard(function, next);
				mutate::remove_subtree(function, stloc)?;
				true
			}
			_ => false,
		};

		if rewrote {
			return Ok(true);
		}
	}
	Ok(false)
}

fn is_get_result_call_on<'l>(function: &ILFunction<'l>, node: NodeId, awaiter_var: VariableId) -> bool {
	let InstructionKind::Call { method, args, .. } = &function.node(node).kind else { return false };
	if !is_get_result(method) || args.len() != 1 {
		return false;
	}
	let mut v = VariableId::from_raw(0);
	match_ld_loc(function, args[0], &mut v) && v == awaiter_var
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ilast::variable::VariableKind;
	use crate::metadata::heaps::table::{MethodAttributes, MethodImplAttributes};
	use crate::typesystem::types::Class;
	use crate::typesystem::{Method, PrimitiveType, Type};

	fn leaked_class<'l>(name: &'l str) -> &'l Class<'l> {
		Box::leak(Box::new(Class {
			name,
			namespace: "System.Runtime.CompilerServices",
			is_value_type: true,
			is_interface: false,
			is_sealed: true,
			is_abstract: false,
			generic_param_count: 0,
			base: std::cell::Cell::new(None),
			fields: std::cell::Cell::new(None),
			methods: std::cell::Cell::new(None),
		}))
	}

	fn leaked_method<'l>(name: &'l str, declaring_type: &'l Class<'l>, return_type: Type<'l>) -> &'l Method<'l> {
		Box::leak(Box::new(Method {
			name,
			declaring_type,
			return_type,
			parameters: &[],
			attributes: MethodAttributes::empty(),
			impl_attributes: MethodImplAttributes::empty(),
			generic_param_count: 0,
			rva: 1,
		}))
	}

	/// `stloc awaiter(call task.GetAwaiter()); stloc result(call
	/// awaiter.GetResult())` collapses to `stloc result(await task)`.
	#[test]
	fn recognizes_await_with_result() {
		let task_class = leaked_class("Task`1");
		let awaiter_class = leaked_class("TaskAwaiter`1");
		let get_awaiter = leaked_method("GetAwaiter", task_class, Type::ValueType(awaiter_class));
		let get_result = leaked_method("GetResult", awaiter_class, Type::Primitive(PrimitiveType::I4));
		let owner = leaked_method("MoveNext", task_class, Type::Primitive(PrimitiveType::Void));

		let mut function = ILFunction::new(owner);
		let task_var = function.declare_variable(VariableKind::Local, Type::ValueType(task_class));
		let awaiter_var = function.declare_variable(VariableKind::StackSlot, Type::ValueType(awaiter_class));
		let result_var = function.declare_variable(VariableKind::Local, Type::Primitive(PrimitiveType::I4));

		let ld_task = function.insert_node(InstructionKind::LdLoc(task_var));
		let get_awaiter_call = function.insert_node(InstructionKind::Call { method: get_awaiter, is_virtual: false, args: vec![ld_task] });
		let stloc_awaiter = function.insert_node(InstructionKind::StLoc { variable: awaiter_var, value: get_awaiter_call });

		let ld_awaiter = function.insert_node(InstructionKind::LdLoc(awaiter_var));
		let get_result_call = function.insert_node(InstructionKind::Call { method: get_result, is_virtual: false, args: vec![ld_awaiter] });
		let stloc_result = function.insert_node(InstructionKind::StLoc { variable: result_var, value: get_result_call });

		let InstructionKind::BlockContainer { entry_point, .. } = &function.node(function.root).kind else { panic!() };
		let entry = *entry_point;
		mutate::append_to_block(&mut function, entry, stloc_awaiter).unwrap();
		mutate::append_to_block(&mut function, entry, stloc_result).unwrap();

		let changed = AsyncAwaitTransform.run(&mut function, &DecompilerSettings::default()).unwrap();
		assert!(changed);

		let InstructionKind::Block { instructions, .. } = &function.node(entry).kind else { panic!() };
		assert_eq!(instructions.len(), 1);
		let InstructionKind::StLoc { value, .. } = &function.node(instructions[0]).kind else { panic!("expected stloc result") };
		assert!(matches!(function.node(*value).kind, InstructionKind::AwaitInstruction(_)));
		assert_eq!(function.variable(awaiter_var).store_count(), 0);
		assert_eq!(function.variable(awaiter_var).load_count(), 0);
		assert_eq!(function.variable(task_var).load_count(), 1);
	}
}
