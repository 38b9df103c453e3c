//! Name-based recognizers for BCL members every idiom-recovery pass in
//! this module needs to single out: `Monitor.Enter`/`Exit`,
//! `string.op_Equality`, `Dictionary<,>.TryGetValue`, `IDisposable.Dispose`,
//! `IEnumerable.GetEnumerator`, `string.Concat`, the `ValueTuple` family.
//!
//! These compare `Class::name`/`namespace` and `Method::name` rather than
//! metadata tokens, since a recognizer runs against whichever assembly the
//! reference was resolved from (the BCL reference assembly, not
//! necessarily the one being decompiled) — see §9's open question on
//! preferring structural equality over reference equality for exactly this
//! reason.

use crate::typesystem::{Field, Method, Type};

fn declaring_type_is<'l>(method: &Method<'l>, namespace: &str, name: &str) -> bool {
	method.declaring_type.namespace == namespace && method.declaring_type.name == name
}

pub fn is_monitor_enter(method: &Method, arity: usize) -> bool {
	method.name == "Enter" && declaring_type_is(method, "System.Threading", "Monitor") && method.parameters.len() == arity
}

pub fn is_monitor_exit(method: &Method) -> bool {
	method.name == "Exit" && declaring_type_is(method, "System.Threading", "Monitor") && method.parameters.len() == 1
}

pub fn is_string_equality(method: &Method) -> bool {
	(method.name == "op_Equality" || method.name == "Equals") && declaring_type_is(method, "System", "String")
}

pub fn is_string_inequality(method: &Method) -> bool {
	method.name == "op_Inequality" && declaring_type_is(method, "System", "String")
}

pub fn is_string_concat(method: &Method) -> bool {
	method.name == "Concat" && declaring_type_is(method, "System", "String")
}

pub fn is_dictionary_try_get_value(method: &Method) -> bool {
	method.name == "TryGetValue" && method.declaring_type.name == "Dictionary`2" && method.declaring_type.namespace == "System.Collections.Generic"
}

pub fn is_hashtable_get_item(method: &Method) -> bool {
	method.name == "get_Item" && declaring_type_is(method, "System.Collections", "Hashtable")
}

pub fn is_dictionary_add(method: &Method) -> bool {
	method.name == "Add" && method.declaring_type.name == "Dictionary`2" && method.declaring_type.namespace == "System.Collections.Generic"
}

pub fn is_hashtable_add(method: &Method) -> bool {
	method.name == "Add" && declaring_type_is(method, "System.Collections", "Hashtable")
}

pub fn is_compute_string_hash(method: &Method) -> bool {
	method.name == "ComputeStringHash"
}

pub fn is_dispose(method: &Method) -> bool {
	method.name == "Dispose" && method.parameters.is_empty()
}

pub fn is_get_enumerator(method: &Method) -> bool {
	method.name == "GetEnumerator" && method.parameters.is_empty()
}

pub fn is_move_next(method: &Method) -> bool {
	method.name == "MoveNext" && method.parameters.is_empty()
}

pub fn is_get_current(method: &Method) -> bool {
	method.name == "get_Current" && method.parameters.is_empty()
}

pub fn is_array_get_length(method: &Method) -> bool {
	method.name == "get_Length" && method.parameters.is_empty()
}

pub fn is_value_tuple(ty: &Type) -> bool {
	match ty {
		Type::ValueType(class) | Type::GenericInstance { generic: class, .. } => class.namespace == "System" && class.name.starts_with("ValueTuple`"),
		_ => false,
	}
}

/// `Item1`..`Item8` — `ValueTuple`'s positional field names, 1-based.
pub fn tuple_item_index(field_name: &str) -> Option<usize> {
	let digits = field_name.strip_prefix("Item")?;
	let n: usize = digits.parse().ok()?;
	(1..=8).contains(&n).then_some(n - 1)
}

pub fn is_get_awaiter(method: &Method) -> bool {
	method.name == "GetAwaiter" && method.parameters.is_empty()
}

pub fn is_get_result(method: &Method) -> bool {
	method.name == "GetResult" && method.parameters.is_empty()
}

/// Roslyn's iterator state machine names its current-value backing field
/// `<>2__current` (a second `<>7__wrapped...` slot exists for disposal
/// bookkeeping we don't need here); older csc-generated state machines used
/// a different numbering, so fall back to any field ending `__current`.
pub fn is_iterator_current_field(field: &Field) -> bool {
	field.name == "<>2__current" || field.name.ends_with("__current")
}

/// Roslyn's iterator/async state-machine state slot, `<>1__state`.
pub fn is_iterator_state_field(field: &Field) -> bool {
	field.name == "<>1__state" || field.name.ends_with("__state")
}
