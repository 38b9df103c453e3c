//! Fields, methods and parameters as the type-system view exposes them —
//! resolved types, not the raw blob encodings in [`crate::metadata::il`].

use derivative::Derivative;

use crate::metadata::heaps::table::{FieldAttributes, MethodAttributes, MethodImplAttributes, ParamAttributes};
use crate::typesystem::types::{Class, Type};

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Field<'l> {
	pub name: &'l str,
	pub declaring_type: &'l Class<'l>,
	pub field_type: Type<'l>,
	pub attributes: FieldAttributes,
	pub constant_value: Option<ConstantValue<'l>>,
}

impl<'l> Field<'l> {
	pub fn is_static(&self) -> bool {
		self.attributes.contains(FieldAttributes::STATIC)
	}
}

#[derive(Debug, Copy, Clone)]
pub enum ConstantValue<'l> {
	Bool(bool),
	Char(u16),
	I1(i8),
	U1(u8),
	I2(i16),
	U2(u16),
	I4(i32),
	U4(u32),
	I8(i64),
	U8(u64),
	R4(f32),
	R8(f64),
	String(&'l str),
	Null,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Parameter<'l> {
	pub name: &'l str,
	pub parameter_type: Type<'l>,
	pub attributes: ParamAttributes,
	pub sequence: u16,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Method<'l> {
	pub name: &'l str,
	pub declaring_type: &'l Class<'l>,
	pub return_type: Type<'l>,
	pub parameters: &'l [Parameter<'l>],
	pub attributes: MethodAttributes,
	pub impl_attributes: MethodImplAttributes,
	pub generic_param_count: u32,
	pub rva: u32,
}

impl<'l> Method<'l> {
	pub fn is_static(&self) -> bool {
		self.attributes.contains(MethodAttributes::STATIC)
	}

	pub fn is_abstract(&self) -> bool {
		self.attributes.contains(MethodAttributes::ABSTRACT)
	}

	pub fn has_body(&self) -> bool {
		self.rva != 0
	}
}
