//! Decoded custom-attribute values (ECMA-335 §II.23.3) — just the fixed
//! argument list, which is all the transform passes that consult
//! attributes (`[CompilerGenerated]`, `[AsyncStateMachine]`,
//! `[IteratorStateMachine]`) ever need; named-argument decoding is left
//! for a caller that actually needs it.

use crate::typesystem::members::ConstantValue;
use crate::typesystem::types::Class;

#[derive(Debug)]
pub struct CustomAttributeValue<'l> {
	pub attribute_type: &'l Class<'l>,
	pub fixed_args: Vec<ConstantValue<'l>>,
}

/// `[assembly: InternalsVisibleTo("Other.Assembly")]`, consulted when
/// resolving whether a non-public member reference from another assembly
/// is actually visible.
#[derive(Debug, Clone)]
pub struct InternalsVisibleTo {
	pub assembly_name: String,
}

pub fn well_known_attribute_name(full_name: &str) -> Option<WellKnownAttribute> {
	Some(match full_name {
		"System.Runtime.CompilerServices.CompilerGeneratedAttribute" => WellKnownAttribute::CompilerGenerated,
		"System.Runtime.CompilerServices.AsyncStateMachineAttribute" => WellKnownAttribute::AsyncStateMachine,
		"System.Runtime.CompilerServices.IteratorStateMachineAttribute" => WellKnownAttribute::IteratorStateMachine,
		"System.Runtime.CompilerServices.ExtensionAttribute" => WellKnownAttribute::Extension,
		"System.ObsoleteAttribute" => WellKnownAttribute::Obsolete,
		_ => return None,
	})
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum WellKnownAttribute {
	CompilerGenerated,
	AsyncStateMachine,
	IteratorStateMachine,
	Extension,
	Obsolete,
}
