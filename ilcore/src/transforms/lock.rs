//! `lock` recovery (§4.F canonical example): three shapes of
//! `Monitor.Enter`/`Exit` bracketing collapsed into `LockInstruction`.
//!
//! Each recognizer restricts to its pattern with no extraneous
//! instructions inside the recognized region; a near-miss (an extra
//! statement, a second use of the lock object, a finally that does
//! anything besides the matching `Exit`) is left untouched rather than
//! partially rewritten, per §8's "byte-identical on a single added/removed
//! instruction" property.

use crate::error::DecompilerError;
use crate::ilast::function::ILFunction;
use crate::ilast::instruction::InstructionKind;
use crate::ilast::mutate;
use crate::ilast::variable::VariableId;
use crate::matchers::{match_ld_loc, match_ldc_i4_value, match_st_loc};
use crate::pipeline::settings::DecompilerSettings;
use crate::transforms::well_known::{is_monitor_enter, is_monitor_exit};
use crate::transforms::Transform;

pub struct LockTransform;

impl Transform for LockTransform {
	fn name(&self) -> &'static str {
		"LockStatement"
	}

	fn idempotent_rerun(&self) -> bool {
		true
	}

	fn run<'l>(&self, function: &mut ILFunction<'l>, settings: &DecompilerSettings) -> Result<bool, DecompilerError> {
		if !settings.lock_statement {
			return Ok(false);
		}

		let blocks: Vec<_> = function.arena().iter().filter(|(_, node)| matches!(node.kind, InstructionKind::Block { .. })).map(|(id, _)| id).collect();

		for block in blocks {
			let InstructionKind::Block { instructions, .. } = &function.node(block).kind else { continue };
			let instructions = instructions.clone();

			for i in (0..instructions.len()).rev() {
				let try_finally = instructions[i];
				if !matches!(function.node(try_finally).kind, InstructionKind::TryFinally { .. }) {
					continue;
				}

				if try_legacy_v2(function, block, &instructions, i)?
					|| try_flag_guarded(function, block, &instructions, i, true)?
					|| try_flag_guarded(function, block, &instructions, i, false)?
				{
					return Ok(true);
				}
			}
		}

		Ok(false)
	}
}

/// `stloc lockObj(value); call Monitor.Enter(lockObj); try { body } finally
/// { call Monitor.Exit(lockObj) }`.
fn try_legacy_v2<'l>(function: &mut ILFunction<'l>, block: crate::ilast::arena::NodeId, instructions: &[crate::ilast::arena::NodeId], i: usize) -> Result<bool, DecompilerError> {
	if i < 2 {
		return Ok(false);
	}
	let stloc = instructions[i - 2];
	let enter_call = instructions[i - 1];
	let try_finally = instructions[i];

	let mut lock_obj = VariableId::from_raw(0);
	let mut value = try_finally;
	if !match_st_loc(function, stloc, &mut lock_obj, &mut value) {
		return Ok(false);
	}
	if function.variable(lock_obj).store_count() != 1 {
		return Ok(false);
	}

	let InstructionKind::Call { method: enter_method, args: enter_args, .. } = &function.node(enter_call).kind else {
		return Ok(false);
	};
	if !is_monitor_enter(enter_method, 1) {
		return Ok(false);
	}
	let mut enter_arg_var = VariableId::from_raw(0);
	if enter_args.len() != 1 || !match_ld_loc(function, enter_args[0], &mut enter_arg_var) || enter_arg_var != lock_obj {
		return Ok(false);
	}

	let InstructionKind::TryFinally { try_block, finally_block } = &function.node(try_finally).kind else { return Ok(false) };
	let (try_block, finally_block) = (*try_block, *finally_block);

	let InstructionKind::Block { instructions: finally_instructions, .. } = &function.node(finally_block).kind else { return Ok(false) };
	if finally_instructions.len() != 2 {
		return Ok(false);
	}
	let (exit_call, leave) = (finally_instructions[0], finally_instructions[1]);
	let InstructionKind::Call { method: exit_method, args: exit_args, .. } = &function.node(exit_call).kind else { return Ok(false) };
	if !is_monitor_exit(exit_method) {
		return Ok(false);
	}
	let mut exit_arg_var = VariableId::from_raw(0);
	if exit_args.len() != 1 || !match_ld_loc(function, exit_args[0], &mut exit_arg_var) || exit_arg_var != lock_obj {
		return Ok(false);
	}
	if !matches!(function.node(leave).kind, InstructionKind::Leave { value: None, .. }) {
		return Ok(false);
	}

	let value = mutate::extract_child(function, stloc, value)?;
	let try_block = mutate::extract_child(function, try_finally, try_block)?;
	let lock_node = function.insert_node(InstructionKind::LockInstruction { value, body: try_block });

	mutate::replace_child(function, block, try_finally, lock_node)?;
	mutate::discard(function, try_finally);
	mutate::remove_subtree(function, stloc)?;
	mutate::remove_subtree(function, enter_call)?;
	Ok(true)
}

/// The `v4`/Roslyn shapes: `stloc flag(false); [stloc obj(value);] try {
/// call Enter(<obj source>, ldloca flag); body } finally { if (flag) call
/// Exit(obj) }`. `object_stored_first` selects Roslyn's ordering (the
/// object stored before the flag, outside the `Enter` call) versus v4's
/// (the object stored as the `Enter` call's own first argument).
fn try_flag_guarded<'l>(
	function: &mut ILFunction<'l>,
	block: crate::ilast::arena::NodeId,
	instructions: &[crate::ilast::arena::NodeId],
	i: usize,
	object_stored_first: bool,
) -> Result<bool, DecompilerError> {
	let needed = if object_stored_first { 2 } else { 1 };
	if i < needed {
		return Ok(false);
	}
	let try_finally = instructions[i];

	let (obj_stloc, flag_stloc) = if object_stored_first { (Some(instructions[i - 2]), instructions[i - 1]) } else { (None, instructions[i - 1]) };

	let mut flag_var = VariableId::from_raw(0);
	let mut flag_init = flag_stloc;
	if !match_st_loc(function, flag_stloc, &mut flag_var, &mut flag_init) || !match_ldc_i4_value(function, flag_init, 0) {
		return Ok(false);
	}
	if function.variable(flag_var).store_count() != 1 {
		return Ok(false);
	}

	let mut obj_var_from_outer = None;
	let mut obj_value_outer = flag_stloc;
	if let Some(obj_stloc) = obj_stloc {
		let mut v = VariableId::from_raw(0);
		if !match_st_loc(function, obj_stloc, &mut v, &mut obj_value_outer) {
			return Ok(false);
		}
		obj_var_from_outer = Some(v);
	}

	let InstructionKind::TryFinally { try_block, finally_block } = &function.node(try_finally).kind else { return Ok(false) };
	let (try_block, finally_block) = (*try_block, *finally_block);

	let InstructionKind::Block { instructions: try_instructions, .. } = &function.node(try_block).kind else { return Ok(false) };
	let try_instructions: Vec<crate::ilast::arena::NodeId> = try_instructions.clone();
	let Some(&enter_call) = try_instructions.first() else { return Ok(false) };

	let InstructionKind::Call { method: enter_method, args: enter_args, .. } = &function.node(enter_call).kind else { return Ok(false) };
	if !is_monitor_enter(enter_method, 2) || enter_args.len() != 2 {
		return Ok(false);
	}
	let (arg_obj, arg_flag) = (enter_args[0], enter_args[1]);

	let mut flda_var = VariableId::from_raw(0);
	if !crate::matchers::match_ld_loca(function, arg_flag, &mut flda_var) || flda_var != flag_var {
		return Ok(false);
	}

	let (obj_var, obj_value): (VariableId, crate::ilast::arena::NodeId) = if object_stored_first {
		let mut v = VariableId::from_raw(0);
		if !match_ld_loc(function, arg_obj, &mut v) || Some(v) != obj_var_from_outer {
			return Ok(false);
		}
		(v, obj_value_outer)
	} else {
		let mut v = VariableId::from_raw(0);
		let mut value = arg_obj;
		if !match_st_loc(function, arg_obj, &mut v, &mut value) {
			return Ok(false);
		}
		(v, value)
	};
	if function.variable(obj_var).store_count() != 1 {
		return Ok(false);
	}

	let InstructionKind::Block { instructions: finally_instructions, .. } = &function.node(finally_block).kind else { return Ok(false) };
	let Some(&if_node) = finally_instructions.first() else { return Ok(false) };
	if finally_instructions.len() > 2 {
		return Ok(false);
	}
	if let Some(&second) = finally_instructions.get(1) {
		if !matches!(function.node(second).kind, InstructionKind::Leave { value: None, .. }) {
			return Ok(false);
		}
	}

	let mut condition = if_node;
	let mut exit_call = if_node;
	if !crate::matchers::match_if_instruction(function, if_node, &mut condition, &mut exit_call) {
		return Ok(false);
	}
	let mut cond_var = VariableId::from_raw(0);
	if !match_ld_loc(function, condition, &mut cond_var) || cond_var != flag_var {
		return Ok(false);
	}

	let InstructionKind::Block { instructions: exit_body, .. } = &function.node(exit_call).kind else { return Ok(false) };
	let [exit_call_node] = exit_body.as_slice() else { return Ok(false) };
	let exit_call_node = *exit_call_node;
	let InstructionKind::Call { method: exit_method, args: exit_args, .. } = &function.node(exit_call_node).kind else { return Ok(false) };
	if !is_monitor_exit(exit_method) {
		return Ok(false);
	}
	let mut exit_arg_var = VariableId::from_raw(0);
	if exit_args.len() != 1 || !match_ld_loc(function, exit_args[0], &mut exit_arg_var) || exit_arg_var != obj_var {
		return Ok(false);
	}

	// The region is fully validated; only now do we start mutating.
	let value = if object_stored_first {
		let obj_stloc = obj_stloc.unwrap();
		mutate::extract_child(function, obj_stloc, obj_value_outer)?
	} else {
		// `arg_obj` is itself the `stloc obj(value)` node, inlined as the
		// call's first argument; pull `value` out from underneath it.
		mutate::extract_child(function, arg_obj, obj_value)?
	};

	let try_body_without_enter: Vec<_> = try_instructions[1..].to_vec();
	let lock_body = function.insert_node(InstructionKind::Block { instructions: Vec::new(), incoming_edge_count: 1 });
	for instruction in &try_body_without_enter {
		let extracted = mutate::extract_child(function, try_block, *instruction)?;
		mutate::append_to_block(function, lock_body, extracted)?;
	}

	let lock_node = function.insert_node(InstructionKind::LockInstruction { value, body: lock_body });
	mutate::replace_child(function, block, try_finally, lock_node)?;
	mutate::discard(function, try_finally);
	mutate::remove_subtree(function, flag_stloc)?;
	if let Some(obj_stloc) = obj_stloc {
		mutate::remove_subtree(function, obj_stloc)?;
	}
	Ok(true)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ilast::arena::NodeId;
	use crate::ilast::variable::VariableKind;
	use crate::metadata::heaps::table::{MethodAttributes, MethodImplAttributes};
	use crate::typesystem::{Method, Parameter, PrimitiveType, Type};

	fn make_method<'l>(name: &'l str, declaring_type: &'l crate::typesystem::types::Class<'l>, param_count: usize) -> Method<'l> {
		let params: Vec<Parameter<'l>> = (0..param_count)
			.map(|i| Parameter { name: "a", parameter_type: Type::Primitive(PrimitiveType::Object), attributes: Default::default(), sequence: i as u16 + 1 })
			.collect();
		let params: &'l [Parameter<'l>] = Box::leak(params.into_boxed_slice());
		Method {
			name,
			declaring_type,
			return_type: Type::Primitive(PrimitiveType::Void),
			parameters: params,
			attributes: MethodAttributes::STATIC,
			impl_attributes: MethodImplAttributes::empty(),
			generic_param_count: 0,
			rva: 1,
		}
	}

	fn make_class<'l>(namespace: &'l str, name: &'l str) -> crate::typesystem::types::Class<'l> {
		crate::typesystem::types::Class {
			name,
			namespace,
			is_value_type: false,
			is_interface: false,
			is_sealed: false,
			is_abstract: false,
			generic_param_count: 0,
			base: std::cell::Cell::new(None),
			fields: std::cell::Cell::new(None),
			methods: std::cell::Cell::new(None),
		}
	}

	/// Builds `stloc lockObj(ldnull); call Monitor.Enter(ldloc lockObj); try
	/// { call Foo() } finally { call Monitor.Exit(ldloc lockObj); leave }`
	/// directly inside a function's entry block, and asserts that running
	/// [`LockTransform`] collapses it to a single `LockInstruction` with
	/// `lockObj` fully eliminated.
	#[test]
	fn recognizes_legacy_v2_shape() {
		let monitor_class = Box::leak(Box::new(make_class("System.Threading", "Monitor")));
		let foo_class = Box::leak(Box::new(make_class("N", "C")));
		let enter = Box::leak(Box::new(make_method("Enter", monitor_class, 1)));
		let exit = Box::leak(Box::new(make_method("Exit", monitor_class, 1)));
        let foo = Box::leak(Box::new(make_method("Foo", foo_class, 0)));

		let mut function = ILFunction::new(foo);
		let lock_obj = function.declare_variable(VariableKind::Local, Type::Primitive(PrimitiveType::Object));

		let ld_null = function.insert_node(InstructionKind::LdNull);
		let stloc = function.insert_node(InstructionKind::StLoc { variable: lock_obj, value: ld_null });

		let ld_loc_enter = function.insert_node(InstructionKind::LdLoc(lock_obj));
		let enter_call = function.insert_node(InstructionKind::Call { method: enter, is_virtual: false, args: vec![ld_loc_enter] });

		let foo_call = function.insert_node(InstructionKind::Call { method: foo, is_virtual: false, args: vec![] });
		let try_block = function.insert_node(InstructionKind::Block { instructions: vec![foo_call], incoming_edge_count: 1 });

		let ld_loc_exit = function.insert_node(InstructionKind::LdLoc(lock_obj));
		let exit_call = function.insert_node(InstructionKind::Call { method: exit, is_virtual: false, args: vec![ld_loc_exit] });
		let leave_container = function.root;
		let leave = function.insert_node(InstructionKind::Leave { container: leave_container, value: None });
		let finally_block = function.insert_node(InstructionKind::Block { instructions: vec![exit_call, leave], incoming_edge_count: 1 });

		let try_finally = function.insert_node(InstructionKind::TryFinally { try_block, finally_block });

		let entry = function_entry_block(&function);
		attach_all(&mut function, entry, &[stloc, enter_call, try_finally]);

		assert_eq!(function.variable(lock_obj).store_count(), 1);
		assert_eq!(function.variable(lock_obj).load_count(), 2);

		let changed = LockTransform.run(&mut function, &DecompilerSettings::default()).unwrap();
		assert!(changed);

		let InstructionKind::Block { instructions, .. } = &function.node(entry).kind else { panic!("entry not a block") };
		assert_eq!(instructions.len(), 1);
		assert!(matches!(function.node(instructions[0]).kind, InstructionKind::LockInstruction { .. }));
		assert_eq!(function.variable(lock_obj).store_count(), 0);
		assert_eq!(function.variable(lock_obj).load_count(), 0);
	}

	/// Roslyn's shape: `stloc obj(ldnull); stloc flag(false); try {
	/// call Enter(ldloc obj, ldloca flag); call Foo() } finally { if (flag) {
	/// call Exit(ldloc obj) } leave }`, with `obj` stored outside the
	/// `Enter` call (ahead of the flag) rather than inlined as its argument.
	#[test]
	fn recognizes_roslyn_flag_guarded_shape() {
		let monitor_class = Box::leak(Box::new(make_class("System.Threading", "Monitor")));
		let foo_class = Box::leak(Box::new(make_class("N", "C")));
		let enter = Box::leak(Box::new(make_method("Enter", monitor_class, 2)));
		let exit = Box::leak(Box::new(make_method("Exit", monitor_class, 1)));
		let foo = Box::leak(Box::new(make_method("Foo", foo_class, 0)));

		let mut function = ILFunction::new(foo);
		let obj_var = function.declare_variable(VariableKind::Local, Type::Primitive(PrimitiveType::Object));
		let flag_var = function.declare_variable(VariableKind::Local, Type::Primitive(PrimitiveType::Boolean));

		let obj_value = function.insert_node(InstructionKind::LdNull);
		let obj_stloc = function.insert_node(InstructionKind::StLoc { variable: obj_var, value: obj_value });

		let flag_value = function.insert_node(InstructionKind::LdcI4(0));
		let flag_stloc = function.insert_node(InstructionKind::StLoc { variable: flag_var, value: flag_value });

		let ld_obj_enter = function.insert_node(InstructionKind::LdLoc(obj_var));
		let ld_loca_flag = function.insert_node(InstructionKind::LdLoca(flag_var));
		let enter_call = function.insert_node(InstructionKind::Call { method: enter, is_virtual: false, args: vec![ld_obj_enter, ld_loca_flag] });

		let foo_call = function.insert_node(InstructionKind::Call { method: foo, is_virtual: false, args: vec![] });
		let try_block = function.insert_node(InstructionKind::Block { instructions: vec![enter_call, foo_call], incoming_edge_count: 1 });

		let ld_flag_cond = function.insert_node(InstructionKind::LdLoc(flag_var));
		let ld_obj_exit = function.insert_node(InstructionKind::LdLoc(obj_var));
		let exit_call = function.insert_node(InstructionKind::Call { method: exit, is_virtual: false, args: vec![ld_obj_exit] });
		let exit_body = function.insert_node(InstructionKind::Block { instructions: vec![exit_call], incoming_edge_count: 1 });
		let if_node = function.insert_node(InstructionKind::IfInstruction { condition: ld_flag_cond, true_branch: exit_body, false_branch: None });
		let leave = function.insert_node(InstructionKind::Leave { container: function.root, value: None });
		let finally_block = function.insert_node(InstructionKind::Block { instructions: vec![if_node, leave], incoming_edge_count: 1 });

		let try_finally = function.insert_node(InstructionKind::TryFinally { try_block, finally_block });

		let entry = function_entry_block(&function);
		attach_all(&mut function, entry, &[obj_stloc, flag_stloc, try_finally]);

		let changed = LockTransform.run(&mut function, &DecompilerSettings::default()).unwrap();
		assert!(changed);

		let InstructionKind::Block { instructions, .. } = &function.node(entry).kind else { panic!("entry not a block") };
		assert_eq!(instructions.len(), 1);
		assert!(matches!(function.node(instructions[0]).kind, InstructionKind::LockInstruction { .. }));
		assert_eq!(function.variable(obj_var).store_count(), 0);
		assert_eq!(function.variable(obj_var).load_count(), 0);
		assert_eq!(function.variable(flag_var).store_count(), 0);
		assert_eq!(function.variable(flag_var).load_count(), 0);
	}

	/// The v4 shape: `stloc flag(false); try { call Enter(stloc obj(ldnull),
	/// ldloca flag); call Foo() } finally { if (flag) { call Exit(ldloc obj)
	/// } leave }`, with the object store inlined as the `Enter` call's own
	/// first argument rather than a separate statement.
	#[test]
	fn recognizes_v4_flag_guarded_shape() {
		let monitor_class = Box::leak(Box::new(make_class("System.Threading", "Monitor")));
		let foo_class = Box::leak(Box::new(make_class("N", "C")));
		let enter = Box::leak(Box::new(make_method("Enter", monitor_class, 2)));
		let exit = Box::leak(Box::new(make_method("Exit", monitor_class, 1)));
		let foo = Box::leak(Box::new(make_method("Foo", foo_class, 0)));

		let mut function = ILFunction::new(foo);
		let obj_var = function.declare_variable(VariableKind::Local, Type::Primitive(PrimitiveType::Object));
		let flag_var = function.declare_variable(VariableKind::Local, Type::Primitive(PrimitiveType::Boolean));

		let flag_value = function.insert_node(InstructionKind::LdcI4(0));
		let flag_stloc = function.insert_node(InstructionKind::StLoc { variable: flag_var, value: flag_value });

		let obj_value = function.insert_node(InstructionKind::LdNull);
		let obj_stloc_arg = function.insert_node(InstructionKind::StLoc { variable: obj_var, value: obj_value });
		let ld_loca_flag = function.insert_node(InstructionKind::LdLoca(flag_var));
		let enter_call = function.insert_node(InstructionKind::Call { method: enter, is_virtual: false, args: vec![obj_stloc_arg, ld_loca_flag] });

		let foo_call = function.insert_node(InstructionKind::Call { method: foo, is_virtual: false, args: vec![] });
		let try_block = function.insert_node(InstructionKind::Block { instructions: vec![enter_call, foo_call], incoming_edge_count: 1 });

		let ld_flag_cond = function.insert_node(InstructionKind::LdLoc(flag_var));
		let ld_obj_exit = function.insert_node(InstructionKind::LdLoc(obj_var));
		let exit_call = function.insert_node(InstructionKind::Call { method: exit, is_virtual: false, args: vec![ld_obj_exit] });
		let exit_body = function.insert_node(InstructionKind::Block { instructions: vec![exit_call], incoming_edge_count: 1 });
		let if_node = function.insert_node(InstructionKind::IfInstruction { condition: ld_flag_cond, true_branch: exit_body, false_branch: None });
		let leave = function.insert_node(InstructionKind::Leave { container: function.root, value: None });
		let finally_block = function.insert_node(InstructionKind::Block { instructions: vec![if_node, leave], incoming_edge_count: 1 });

		let try_finally = function.insert_node(InstructionKind::TryFinally { try_block, finally_block });

		let entry = function_entry_block(&function);
		attach_all(&mut function, entry, &[flag_stloc, try_finally]);

		let changed = LockTransform.run(&mut function, &DecompilerSettings::default()).unwrap();
		assert!(changed);

		let InstructionKind::Block { instructions, .. } = &function.node(entry).kind else { panic!("entry not a block") };
		assert_eq!(instructions.len(), 1);
		assert!(matches!(function.node(instructions[0]).kind, InstructionKind::LockInstruction { .. }));
		assert_eq!(function.variable(obj_var).store_count(), 0);
		assert_eq!(function.variable(obj_var).load_count(), 0);
		assert_eq!(function.variable(flag_var).store_count(), 0);
		assert_eq!(function.variable(flag_var).load_count(), 0);
	}

	#[test]
	fn disabled_setting_leaves_tree_untouched() {
		let foo_class = Box::leak(Box::new(make_class("N", "C")));
		let foo = Box::leak(Box::new(make_method("Foo", foo_class, 0)));
		let mut function = ILFunction::new(foo);
		let mut settings = DecompilerSettings::default();
		settings.lock_statement = false;
		assert!(!LockTransform.run(&mut function, &settings).unwrap());
	}

	fn function_entry_block<'l>(function: &ILFunction<'l>) -> NodeId {
		let InstructionKind::BlockContainer { entry_point, .. } = &function.node(function.root).kind else { panic!("root not a container") };
		*entry_point
	}

	fn attach_all<'l>(function: &mut ILFunction<'l>, block: NodeId, nodes: &[NodeId]) {
		for node in nodes {
			mutate::append_to_block(function, block, *node).unwrap();
		}
	}
}
