//! The resolved type graph: [`Type`] is the value every other module
//! (the ILAst, the dataflow lattice, the transform passes) actually
//! matches on, as opposed to the raw [`crate::metadata::il::TypeSignature`]
//! it is resolved from.

use std::cell::Cell;
use std::fmt::{Display, Formatter};

use derivative::Derivative;

use crate::typesystem::members::{Field, Method};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PrimitiveType {
	Void,
	Boolean,
	Char,
	I1,
	U1,
	I2,
	U2,
	I4,
	U4,
	I8,
	U8,
	R4,
	R8,
	I,
	U,
	String,
	Object,
	TypedReference,
}

impl Display for PrimitiveType {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			Self::Void => "void",
			Self::Boolean => "bool",
			Self::Char => "char",
			Self::I1 => "sbyte",
			Self::U1 => "byte",
			Self::I2 => "short",
			Self::U2 => "ushort",
			Self::I4 => "int",
			Self::U4 => "uint",
			Self::I8 => "long",
			Self::U8 => "ulong",
			Self::R4 => "float",
			Self::R8 => "double",
			Self::I => "nint",
			Self::U => "nuint",
			Self::String => "string",
			Self::Object => "object",
			Self::TypedReference => "System.TypedReference",
		};
		write!(f, "{name}")
	}
}

/// Every type shape the signature grammar can produce, resolved against
/// this assembly's (and its references') metadata.
#[derive(Debug, Copy, Clone)]
pub enum Type<'l> {
	Primitive(PrimitiveType),
	Class(&'l Class<'l>),
	ValueType(&'l Class<'l>),
	SzArray(&'l Type<'l>),
	Array { element: &'l Type<'l>, rank: u32 },
	Pointer(Option<&'l Type<'l>>),
	ByRef(&'l Type<'l>),
	GenericTypeParam { owner: &'l Class<'l>, index: u32 },
	GenericMethodParam { owner: &'l Method<'l>, index: u32 },
	GenericInstance { generic: &'l Class<'l>, args: &'l [Type<'l>] },
}

impl<'l> Type<'l> {
	pub fn is_value_type(&self) -> bool {
		match self {
			Type::Primitive(p) => !matches!(p, PrimitiveType::String | PrimitiveType::Object),
			Type::ValueType(_) => true,
			Type::GenericInstance { generic, .. } => generic.is_value_type,
			_ => false,
		}
	}
}

impl<'l> Display for Type<'l> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Type::Primitive(p) => write!(f, "{p}"),
			Type::Class(c) | Type::ValueType(c) => write!(f, "{}", c.name),
			Type::SzArray(t) => write!(f, "{t}[]"),
			Type::Array { element, rank } => write!(f, "{element}[{}]", ",".repeat((*rank as usize).saturating_sub(1))),
			Type::Pointer(Some(t)) => write!(f, "{t}*"),
			Type::Pointer(None) => write!(f, "void*"),
			Type::ByRef(t) => write!(f, "ref {t}"),
			Type::GenericTypeParam { index, .. } => write!(f, "!{index}"),
			Type::GenericMethodParam { index, .. } => write!(f, "!!{index}"),
			Type::GenericInstance { generic, args } => {
				write!(f, "{}<", generic.name)?;
				for (i, arg) in args.iter().enumerate() {
					if i > 0 {
						write!(f, ", ")?;
					}
					write!(f, "{arg}")?;
				}
				write!(f, ">")
			}
		}
	}
}

/// A fully-qualified class or value-type name, lazily populated with the
/// fields and methods its `TypeDef` row names.
///
/// `fields`/`methods` start `Cell::new(None)`; the first caller through
/// [`crate::typesystem::resolver::TypeSystemView::resolve_members`] wins
/// the race to populate them (see `DESIGN.md` for why a plain `Cell`
/// compare-and-set, rather than a `Mutex`, is sufficient here: every
/// writer computes the same value from the same immutable metadata, so a
/// duplicate write is wasted work, never a correctness issue).
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Class<'l> {
	pub name: &'l str,
	pub namespace: &'l str,
	pub is_value_type: bool,
	pub is_interface: bool,
	pub is_sealed: bool,
	pub is_abstract: bool,
	pub generic_param_count: u32,
	pub base: Cell<Option<&'l Type<'l>>>,
	#[derivative(Debug = "ignore")]
	pub fields: Cell<Option<&'l [Field<'l>]>>,
	#[derivative(Debug = "ignore")]
	pub methods: Cell<Option<&'l [Method<'l>]>>,
}

impl<'l> Eq for Class<'l> {}
impl<'l> PartialEq for Class<'l> {
	fn eq(&self, other: &Self) -> bool {
		std::ptr::eq(self, other)
	}
}
impl<'l> std::hash::Hash for Class<'l> {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		(self as *const Self).hash(state)
	}
}
