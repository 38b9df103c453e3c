//! Delegate-construction recovery: a `newobj` on a delegate type's
//! fixed two-argument constructor (a target — `null` for a static method
//! group — and a bound method pointer) collapsed into the single
//! `DelegateConstruction` expression it represents.
//!
//! Not gated by a named setting (§6 lists none for it): a delegate's
//! constructor shape is an ECMA-335 fixture, not a compiler idiom a reader
//! could plausibly want to see un-recovered.

use crate::error::DecompilerError;
use crate::ilast::arena::NodeId;
use crate::ilast::function::ILFunction;
use crate::ilast::instruction::InstructionKind;
use crate::ilast::mutate;
use crate::matchers::{match_ld_null, structurally_equal};
use crate::pipeline::settings::DecompilerSettings;
use crate::transforms::Transform;
use crate::typesystem::Type;

pub struct DelegateConstructionTransform;

impl Transform for DelegateConstructionTransform {
	fn name(&self) -> &'static str {
		"DelegateConstruction"
	}

	fn idempotent_rerun(&self) -> bool {
		true
	}

	fn run<'l>(&self, function: &mut ILFunction<'l>, _settings: &DecompilerSettings) -> Result<bool, DecompilerError> {
		let candidates: Vec<_> = function
			.arena()
			.iter()
			.filter(|(_, node)| matches!(&node.kind, InstructionKind::NewObj { constructor, args } if is_delegate_constructor(constructor) && args.len() == 2))
			.map(|(id, _)| id)
			.collect();

		for newobj in candidates {
			if try_delegate_construction(function, newobj)? {
				return Ok(true);
			}
		}

		Ok(false)
	}
}

/// The delegate constructor's fixed ECMA-335 shape: a two-parameter
/// `.ctor(object target, IntPtr method)` the runtime special-cases — no
/// other constructor has this exact name/arity combination on a type the
/// metadata reader hands us as a delegate's declaring type.
fn is_delegate_constructor(constructor: &crate::typesystem::Method) -> bool {
	constructor.name == ".ctor" && constructor.parameters.len() == 2
}

/// `newobj DelegateType(target, ldftn Method)` or `newobj
/// DelegateType(target, ldvirtftn Method)` (the virtual-dispatch form,
/// whose own embedded target must match the constructor's first argument
/// — the compiler loads the receiver once, duplicates it for both slots).
fn try_delegate_construction<'l>(function: &mut ILFunction<'l>, newobj: NodeId) -> Result<bool, DecompilerError> {
	let InstructionKind::NewObj { constructor, args } = &function.node(newobj).kind else { return Ok(false) };
	let args = args.clone();
	let delegate_type = Type::Class(constructor.declaring_type);
	let (target_arg, method_arg) = (args[0], args[1]);

	let method = match &function.node(method_arg).kind {
		InstructionKind::LdFtn(method) => *method,
		InstructionKind::LdVirtFtn { target, method } => {
			if !structurally_equal(function, *target, target_arg) {
				return Ok(false);
			}
			*method
		}
		_ => return Ok(false),
	};

	let target = if match_ld_null(function, target_arg) { None } else { Some(mutate::extract_child(function, newobj, target_arg)?) };

	let node = function.insert_node(InstructionKind::DelegateConstruction { target, method, delegate_type });
	let parent = function.node(newobj).parent.ok_or_else(|| DecompilerError::InvariantViolation("delegate newobj has no parent".into()))?;
	mutate::replace_child(function, parent, newobj, node)?;
	mutate::discard(function, newobj);
	Ok(true)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ilast::variable::VariableKind;
	use crate::metadata::heaps::table::{MethodAttributes, MethodImplAttributes};
	use crate::typesystem::types::Class;
	use crate::typesystem::{Method, Parameter, PrimitiveType};

	fn leaked_class<'l>(namespace: &'l str, name: &'l str) -> &'l Class<'l> {
		Box::leak(Box::new(Class {
			name,
			namespace,
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

	fn leaked_ctor<'l>(declaring_type: &'l Class<'l>) -> &'l Method<'l> {
		let params: &'l [Parameter<'l>] = Box::leak(Box::new([
			Parameter { name: "target", parameter_type: Type::Primitive(PrimitiveType::Object), attributes: Default::default(), sequence: 1 },
			Parameter { name: "method", parameter_type: Type::Primitive(PrimitiveType::I), attributes: Default::default(), sequence: 2 },
		]));
		Box::leak(Box::new(Method {
			name: ".ctor",
			declaring_type,
			return_type: Type::Primitive(PrimitiveType::Void),
			parameters: params,
			attributes: MethodAttributes::empty(),
			impl_attributes: MethodImplAttributes::empty(),
			generic_param_count: 0,
			rva: 1,
		}))
	}

	fn leaked_method<'l>(name: &'l str, declaring_type: &'l Class<'l>, is_static: bool) -> &'l Method<'l> {
		Box::leak(Box::new(Method {
			name,
			declaring_type,
			return_type: Type::Primitive(PrimitiveType::Void),
			parameters: &[],
			attributes: if is_static { MethodAttributes::STATIC } else { MethodAttributes::empty() },
			impl_attributes: MethodImplAttributes::empty(),
			generic_param_count: 0,
			rva: 1,
		}))
	}

	/// `newobj Action::.ctor(ldnull, ldftn C.Handler)` — a static method
	/// group converted to a delegate.
	#[test]
	fn recognizes_static_method_group() {
		let delegate_class = leaked_class("System", "Action");
		let host_class = leaked_class("N", "C");
		let ctor = leaked_ctor(delegate_class);
		let handler = leaked_method("Handler", host_class, true);
		let owner = leaked_method("Owner", host_class, true);

		let mut function = ILFunction::new(owner);
		let ld_null = function.insert_node(InstructionKind::LdNull);
		let ld_ftn = function.insert_node(InstructionKind::LdFtn(handler));
		let newobj = function.insert_node(InstructionKind::NewObj { constructor: ctor, args: vec![ld_null, ld_ftn] });

		let InstructionKind::BlockContainer { entry_point, .. } = &function.node(function.root).kind else { panic!() };
		let entry = *entry_point;
		mutate::append_to_block(&mut function, entry, newobj).unwrap();

		let changed = DelegateConstructionTransform.run(&mut function, &DecompilerSettings::default()).unwrap();
		assert!(changed);

		let InstructionKind::Block { instructions, .. } = &function.node(entry).kind else { panic!() };
		assert_eq!(instructions.len(), 1);
		let InstructionKind::DelegateConstruction { target, method, .. } = &function.node(instructions[0]).kind else { panic!("expected DelegateConstruction") };
		assert!(target.is_none());
		assert_eq!(method.name, "Handler");
	}

	/// `newobj Action::.ctor(ldloc self, ldvirtftn C.Handler)` — a virtual
	/// instance method group; the target argument and `ldvirtftn`'s own
	/// target must match structurally.
	#[test]
	fn recognizes_virtual_instance_method_group() {
		let delegate_class = leaked_class("System", "Action");
		let host_class = leaked_class("N", "C");
		let ctor = leaked_ctor(delegate_class);
		let handler = leaked_method("Handler", host_class, false);
		let owner = leaked_method("Owner", host_class, false);

		let mut function = ILFunction::new(owner);
		let this_var = function.declare_variable(VariableKind::Parameter, Type::Class(host_class));

		let ld_loc_ctor_arg = function.insert_node(InstructionKind::LdLoc(this_var));
		let ld_loc_virtftn_target = function.insert_node(InstructionKind::LdLoc(this_var));
		let ld_virt_ftn = function.insert_node(InstructionKind::LdVirtFtn { target: ld_loc_virtftn_target, method: handler });
		let newobj = function.insert_node(InstructionKind::NewObj { constructor: ctor, args: vec![ld_loc_ctor_arg, ld_virt_ftn] });

		let InstructionKind::BlockContainer { entry_point, .. } = &function.node(function.root).kind else { panic!() };
		let entry = *entry_point;
		mutate::append_to_block(&mut function, entry, newobj).unwrap();

		let changed = DelegateConstructionTransform.run(&mut function, &DecompilerSettings::default()).unwrap();
		assert!(changed);

		let InstructionKind::Block { instructions, .. } = &function.node(entry).kind else { panic!() };
		let InstructionKind::DelegateConstruction { target, method, .. } = &function.node(instructions[0]).kind else { panic!("expected DelegateConstruction") };
		assert!(target.is_some());
		assert_eq!(method.name, "Handler");
		assert_eq!(function.variable(this_var).load_count(), 1);
	}
}
