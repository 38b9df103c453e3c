//! Resolving metadata tokens and signatures against one loaded assembly's
//! type-system view: `TypeDef` rows become [`Class`] handles, `TypeSpec`/
//! signature blobs become [`Type`] values, lazily and memoized so the same
//! class resolved from two different call sites returns the identical
//! `&'l Class<'l>` pointer.

use std::cell::RefCell;
use std::io::Cursor;

use fxhash::FxHashMap;

use crate::error::{DecompilerError, MetadataError};
use crate::metadata::assembly::Assembly;
use crate::metadata::heaps::table::TypeAttributes;
use crate::metadata::il::{ElementType, TypeSignature};
use crate::metadata::token::TypeDefIndex;
use crate::typesystem::context::Context;
use crate::typesystem::members::{Field, Method, Parameter};
use crate::typesystem::substitution::GenericContext;
use crate::typesystem::types::{Class, PrimitiveType, Type};

pub struct TypeSystemView<'l> {
	context: &'l Context<'l>,
	assembly: &'l Assembly<'l>,
	classes: RefCell<FxHashMap<usize, &'l Class<'l>>>,
}

impl<'l> TypeSystemView<'l> {
	pub fn new(context: &'l Context<'l>, assembly: &'l Assembly<'l>) -> Self {
		Self { context, assembly, classes: RefCell::new(FxHashMap::default()) }
	}

	/// Resolves a `TypeDef` row to its `Class` handle, allocating and
	/// caching it the first time. Fields and methods are *not* populated
	/// here — see [`Self::resolve_members`] — so resolving a type doesn't
	/// force resolution of every type it mentions.
	pub fn resolve_type_def(&self, index: TypeDefIndex) -> Result<&'l Class<'l>, MetadataError> {
		let Some(row_idx) = index.idx() else {
			return Err(MetadataError::InvalidToken(0));
		};

		if let Some(class) = self.classes.borrow().get(&row_idx) {
			return Ok(class);
		}

		let row = self
			.assembly
			.tables()
			.type_def
			.rows()
			.get(row_idx)
			.ok_or(MetadataError::InvalidToken(row_idx as u32))?;

		let strings = &self.assembly.heaps.strings;
		let bump = self.context.bump();

		let owner_token = crate::metadata::token::MetadataToken::new(
			crate::metadata::heaps::table::TableTag::TypeDef,
			row_idx + 1,
		);
		let generic_param_count = self
			.assembly
			.tables()
			.generic_param
			.rows()
			.iter()
			.filter(|gp| gp.owner.token() == owner_token)
			.count() as u32;

		let class = bump.alloc(Class {
			name: bump.alloc_str(&strings.get(row.name)),
			namespace: bump.alloc_str(&strings.get(row.namespace)),
			is_value_type: false, // fixed up below, once `base` is known to be System.ValueType/Enum
			is_interface: row.flags.contains(TypeAttributes::INTERFACE),
			is_sealed: row.flags.contains(TypeAttributes::SEALED),
			is_abstract: row.flags.contains(TypeAttributes::ABSTRACT),
			generic_param_count,
			base: std::cell::Cell::new(None),
			fields: std::cell::Cell::new(None),
			methods: std::cell::Cell::new(None),
		});

		self.classes.borrow_mut().insert(row_idx, class);
		Ok(class)
	}

	/// Populates `class.fields`/`class.methods` from the `TypeDef` row's
	/// field/method-list run (ECMA-335's "each row's member list extends
	/// to the next row's start, or the table end for the last row").
	pub fn resolve_members(&self, index: TypeDefIndex, class: &'l Class<'l>) -> Result<(), MetadataError> {
		if class.fields.get().is_some() {
			return Ok(());
		}

		let Some(row_idx) = index.idx() else { return Ok(()) };
		let type_defs = self.assembly.tables().type_def.rows();
		let row = type_defs.get(row_idx).ok_or(MetadataError::InvalidToken(row_idx as u32))?;

		let bump = self.context.bump();
		let strings = &self.assembly.heaps.strings;
		let blobs = &self.assembly.heaps.blobs;

		// A `TypeDef` row's member lists run from its own start index up to
		// (not including) the next row's start index, or the table end for
		// the last row (ECMA-335 §II.22.37).
		let field_rows = self.assembly.tables().field.rows();
		let field_start = row.field_list.0;
		let field_end = type_defs.get(row_idx + 1).map(|next| next.field_list.0).unwrap_or(field_rows.len() + 1);
		let mut fields = Vec::new();
		for field_idx in field_start..field_end {
			let Some(field_row) = field_rows.get(field_idx - 1) else { break };
			let mut cursor = blobs.cursor_at(field_row.signature);
			let field_type = self.read_field_type(&mut cursor).unwrap_or(Type::Primitive(PrimitiveType::Object));
			fields.push(Field {
				name: bump.alloc_str(&strings.get(field_row.name)),
				declaring_type: class,
				field_type,
				attributes: field_row.flags,
				constant_value: None,
			});
		}

		let method_rows = self.assembly.tables().method_def.rows();
		let method_start = row.method_list.0;
		let method_end = type_defs.get(row_idx + 1).map(|next| next.method_list.0).unwrap_or(method_rows.len() + 1);
		let mut methods = Vec::new();
		for method_idx in method_start..method_end {
			let Some(method_row) = method_rows.get(method_idx - 1) else { break };
			let mut cursor = blobs.cursor_at(method_row.signature);
			let signature = crate::metadata::il::MethodSignature::read(&mut cursor).ok();
			let (return_type, params) = match &signature {
				Some(sig) => {
					let ret = self.signature_to_type(&sig.return_type);
					let params: Vec<Parameter> = sig
						.params
						.iter()
						.enumerate()
						.map(|(i, p)| Parameter {
							name: bump.alloc_str(&format!("arg{i}")),
							parameter_type: self.signature_to_type(p),
							attributes: Default::default(),
							sequence: i as u16 + 1,
						})
						.collect();
					(ret, params)
				}
				None => (Type::Primitive(PrimitiveType::Void), Vec::new()),
			};

			let method_owner_token = crate::metadata::token::MetadataToken::new(
				crate::metadata::heaps::table::TableTag::MethodDef,
				method_idx,
			);
			let method_generic_param_count = self
				.assembly
				.tables()
				.generic_param
				.rows()
				.iter()
				.filter(|gp| gp.owner.token() == method_owner_token)
				.count() as u32;

			methods.push(Method {
				name: bump.alloc_str(&strings.get(method_row.name)),
				declaring_type: class,
				return_type,
				parameters: bump.alloc_slice_fill_iter(params.into_iter()),
				attributes: method_row.flags,
				impl_attributes: method_row.impl_flags,
				generic_param_count: method_generic_param_count,
				rva: method_row.rva,
			});
		}

		class.fields.set(Some(bump.alloc_slice_fill_iter(fields.into_iter())));
		class.methods.set(Some(bump.alloc_slice_fill_iter(methods.into_iter())));
		Ok(())
	}

	fn signature_to_type(&self, sig: &TypeSignature) -> Type<'l> {
		self.resolve_type_signature(sig, GenericContext::empty())
	}

	/// Resolves a decoded signature type into the `Type` graph, recursing
	/// through arrays/pointers/generics and substituting any generic
	/// parameters per `generics`.
	pub fn resolve_type_signature(&self, sig: &TypeSignature, generics: GenericContext<'l>) -> Type<'l> {
		let bump = self.context.bump();
		match sig {
			TypeSignature::Primitive(element) => Type::Primitive(primitive_of(*element)),
			TypeSignature::ValueType(coded) | TypeSignature::Class(coded) => {
				let is_value = matches!(sig, TypeSignature::ValueType(_));
				match self.resolve_coded_type(coded.token().row(), coded.token()) {
					Ok(class) => if is_value { Type::ValueType(class) } else { Type::Class(class) },
					Err(_) => Type::Primitive(PrimitiveType::Object),
				}
			}
			TypeSignature::SzArray(elem) => {
				let t = self.resolve_type_signature(elem, generics);
				Type::SzArray(bump.alloc(t))
			}
			TypeSignature::Array { element, rank, .. } => {
				let t = self.resolve_type_signature(element, generics);
				Type::Array { element: bump.alloc(t), rank: *rank }
			}
			TypeSignature::Ptr(Some(inner)) => {
				let t = self.resolve_type_signature(inner, generics);
				Type::Pointer(Some(bump.alloc(t)))
			}
			TypeSignature::Ptr(None) => Type::Pointer(None),
			TypeSignature::ByRef(inner) | TypeSignature::Pinned(inner) => {
				let t = self.resolve_type_signature(inner, generics);
				Type::ByRef(bump.alloc(t))
			}
			TypeSignature::Var(index) => generics.class_args.get(*index as usize).copied().unwrap_or(Type::Primitive(PrimitiveType::Object)),
			TypeSignature::MVar(index) => generics.method_args.get(*index as usize).copied().unwrap_or(Type::Primitive(PrimitiveType::Object)),
			TypeSignature::GenericInst { generic, args } => {
				let resolved_args: Vec<Type<'l>> = args.iter().map(|a| self.resolve_type_signature(a, generics)).collect();
				match self.resolve_type_signature(generic, generics) {
					Type::Class(c) | Type::ValueType(c) => {
						Type::GenericInstance { generic: c, args: bump.alloc_slice_copy(&resolved_args) }
					}
					other => other,
				}
			}
			TypeSignature::FnPtr(_) => Type::Primitive(PrimitiveType::I),
		}
	}

	/// FIELD signatures (ECMA-335 §II.23.2.4) are a lone `0x06` calling-
	/// convention byte followed by the field's type.
	fn read_field_type(&self, cursor: &mut Cursor<&[u8]>) -> std::io::Result<Type<'l>> {
		let mut prefix = [0u8; 1];
		std::io::Read::read_exact(cursor, &mut prefix)?;
		let sig = TypeSignature::read(cursor)?;
		Ok(self.signature_to_type(&sig))
	}

	fn resolve_coded_type(&self, row: usize, token: crate::metadata::token::MetadataToken) -> Result<&'l Class<'l>, MetadataError> {
		use crate::metadata::heaps::table::TableTag;
		match token.tag() {
			TableTag::TypeDef => self.resolve_type_def(TypeDefIndex::new(row)),
			_ => Err(MetadataError::UnsupportedTable(token.tag() as u8)),
		}
	}

	/// Resolves a type by its reflection-format name (`Namespace.Name`),
	/// searching this assembly's `TypeDef` table by linear scan — fine for
	/// the handful of well-known-type lookups the transform passes do
	/// (`System.String`, state-machine interfaces, ...), not meant for bulk
	/// resolution.
	pub fn find_type(&self, reflection_name: &str) -> Result<Option<&'l Class<'l>>, DecompilerError> {
		let parsed = crate::typesystem::reflection_name::parse(reflection_name)?;
		let strings = &self.assembly.heaps.strings;
		for (i, row) in self.assembly.tables().type_def.rows().iter().enumerate() {
			if strings.get(row.name) == parsed.segments[0] && strings.get(row.namespace) == parsed.namespace.clone().unwrap_or_default() {
				return Ok(Some(self.resolve_type_def(TypeDefIndex::new(i + 1))?));
			}
		}
		Ok(None)
	}
}

fn primitive_of(element: ElementType) -> PrimitiveType {
	match element {
		ElementType::Void => PrimitiveType::Void,
		ElementType::Boolean => PrimitiveType::Boolean,
		ElementType::Char => PrimitiveType::Char,
		ElementType::I1 => PrimitiveType::I1,
		ElementType::U1 => PrimitiveType::U1,
		ElementType::I2 => PrimitiveType::I2,
		ElementType::U2 => PrimitiveType::U2,
		ElementType::I4 => PrimitiveType::I4,
		ElementType::U4 => PrimitiveType::U4,
		ElementType::I8 => PrimitiveType::I8,
		ElementType::U8 => PrimitiveType::U8,
		ElementType::R4 => PrimitiveType::R4,
		ElementType::R8 => PrimitiveType::R8,
		ElementType::I => PrimitiveType::I,
		ElementType::U => PrimitiveType::U,
		ElementType::String => PrimitiveType::String,
		ElementType::Object => PrimitiveType::Object,
		ElementType::TypedByRef => PrimitiveType::TypedReference,
		_ => PrimitiveType::Object,
	}
}
