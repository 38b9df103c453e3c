//! The `#~` table stream: a header naming which of the ~40 ECMA-335
//! metadata tables are present and how many rows each has, followed by the
//! rows themselves in ascending table-ID order.
//!
//! Every table ECMA-335 defines is accounted for in [`TableTag`] (coded
//! indices need to size themselves against tables they can point into even
//! when we never materialize that table's rows), but only the subset a
//! decompiler actually consumes is parsed into a typed row array. A module
//! that uses `ClassLayout`, `FieldRVA` or any other table outside that set
//! fails to load with [`MetadataError::UnsupportedTable`] rather than
//! panicking.

use std::io::{Cursor, Read};
use std::sync::Arc;

use ilcore_derive::{FromRepr, MetadataTableRow};

use crate::error::MetadataError;
use crate::metadata::heaps::blob::BlobIndex;
use crate::metadata::heaps::guid::GuidIndex;
use crate::metadata::heaps::string::StringIndex;
use crate::metadata::token::{
	CustomAttributeType, EventIndex, FieldIndex, GenericParamIndex, HasConstant, HasCustomAttribute,
	HasDeclSecurity, HasFieldMarshal, HasSemantics, IndexSizes, Implementation, MemberForwarded,
	MemberRefParent, MethodDefIndex, MethodDefOrRef, ModuleRefIndex, ParamIndex, PropertyIndex,
	ResolutionScope, TypeDefIndex, TypeDefOrRef, TypeOrMethodDef,
};
use crate::metadata::FromByteStream;

#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, FromRepr)]
pub enum TableTag {
	Module = 0x00,
	TypeRef = 0x01,
	TypeDef = 0x02,
	Field = 0x04,
	MethodDef = 0x06,
	Param = 0x08,
	InterfaceImpl = 0x09,
	MemberRef = 0x0A,
	Constant = 0x0B,
	CustomAttribute = 0x0C,
	FieldMarshal = 0x0D,
	DeclSecurity = 0x0E,
	ClassLayout = 0x0F,
	FieldLayout = 0x10,
	StandAloneSig = 0x11,
	EventMap = 0x12,
	Event = 0x14,
	PropertyMap = 0x15,
	Property = 0x17,
	MethodSemantics = 0x18,
	MethodImpl = 0x19,
	ModuleRef = 0x1A,
	TypeSpec = 0x1B,
	ImplMap = 0x1C,
	FieldRVA = 0x1D,
	Assembly = 0x20,
	AssemblyRef = 0x23,
	File = 0x26,
	ExportedType = 0x27,
	ManifestResource = 0x28,
	NestedClass = 0x29,
	GenericParam = 0x2A,
	MethodSpec = 0x2B,
	GenericParamConstraint = 0x2C,
}

impl TableTag {
	/// One past the highest table ID ECMA-335 defines among the tags above;
	/// sizes the row-count array every coded index is measured against.
	pub const RANGE: usize = 0x2D;

	const ALL: &'static [TableTag] = &[
		Self::Module,
		Self::TypeRef,
		Self::TypeDef,
		Self::Field,
		Self::MethodDef,
		Self::Param,
		Self::InterfaceImpl,
		Self::MemberRef,
		Self::Constant,
		Self::CustomAttribute,
		Self::FieldMarshal,
		Self::DeclSecurity,
		Self::ClassLayout,
		Self::FieldLayout,
		Self::StandAloneSig,
		Self::EventMap,
		Self::Event,
		Self::PropertyMap,
		Self::Property,
		Self::MethodSemantics,
		Self::MethodImpl,
		Self::ModuleRef,
		Self::TypeSpec,
		Self::ImplMap,
		Self::FieldRVA,
		Self::Assembly,
		Self::AssemblyRef,
		Self::File,
		Self::ExportedType,
		Self::ManifestResource,
		Self::NestedClass,
		Self::GenericParam,
		Self::MethodSpec,
		Self::GenericParamConstraint,
	];
}

pub trait MetadataTable {
	fn len(&self) -> usize;
	fn tag(&self) -> TableTag;
	fn row_size(&self) -> usize;
}

macro_rules! impl_flags_from_byte_stream {
	($($ty: ident: $repr: ty),* $(,)?) => {
		$(
			impl FromByteStream for $ty {
				type Deps = Arc<IndexSizes>;
				fn read(stream: &mut Cursor<&[u8]>, _: &Self::Deps) -> std::io::Result<Self> {
					let mut bytes = [0; std::mem::size_of::<$repr>()];
					stream.read_exact(&mut bytes)?;
					Ok(Self::from_bits_retain(<$repr>::from_le_bytes(bytes)))
				}
			}
		)*
	};
}

bitflags::bitflags! {
	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct TypeAttributes: u32 {
		const PUBLIC = 0x0000_0001;
		const NESTED_PUBLIC = 0x0000_0002;
		const NESTED_PRIVATE = 0x0000_0003;
		const NESTED_FAMILY = 0x0000_0004;
		const INTERFACE = 0x0000_0020;
		const ABSTRACT = 0x0000_0080;
		const SEALED = 0x0000_0100;
		const SPECIAL_NAME = 0x0000_0400;
		const IMPORT = 0x0000_1000;
		const SERIALIZABLE = 0x0000_2000;
		const WINDOWS_RUNTIME = 0x0000_4000;
		const BEFORE_FIELD_INIT = 0x0010_0000;
		const RT_SPECIAL_NAME = 0x0000_0800;
		const HAS_SECURITY = 0x0004_0000;
	}

	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct FieldAttributes: u16 {
		const PRIVATE = 0x0001;
		const FAM_AND_ASSEM = 0x0002;
		const ASSEMBLY = 0x0003;
		const FAMILY = 0x0004;
		const FAM_OR_ASSEM = 0x0005;
		const PUBLIC = 0x0006;
		const STATIC = 0x0010;
		const INIT_ONLY = 0x0020;
		const LITERAL = 0x0040;
		const NOT_SERIALIZED = 0x0080;
		const SPECIAL_NAME = 0x0200;
		const PINVOKE_IMPL = 0x2000;
		const RT_SPECIAL_NAME = 0x0400;
		const HAS_FIELD_MARSHAL = 0x1000;
		const HAS_DEFAULT = 0x8000;
		const HAS_FIELD_RVA = 0x0100;
	}

	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct MethodAttributes: u16 {
		const PRIVATE = 0x0001;
		const FAM_AND_ASSEM = 0x0002;
		const ASSEMBLY = 0x0003;
		const FAMILY = 0x0004;
		const FAM_OR_ASSEM = 0x0005;
		const PUBLIC = 0x0006;
		const STATIC = 0x0010;
		const FINAL = 0x0020;
		const VIRTUAL = 0x0040;
		const HIDE_BY_SIG = 0x0080;
		const NEW_SLOT = 0x0100;
		const STRICT = 0x0200;
		const ABSTRACT = 0x0400;
		const SPECIAL_NAME = 0x0800;
		const PINVOKE_IMPL = 0x2000;
		const RT_SPECIAL_NAME = 0x1000;
		const HAS_SECURITY = 0x4000;
		const REQUIRE_SEC_OBJECT = 0x8000;
	}

	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct MethodImplAttributes: u16 {
		const IL = 0x0000;
		const NATIVE = 0x0001;
		const OPTIL = 0x0002;
		const RUNTIME = 0x0003;
		const UNMANAGED = 0x0004;
		const NO_INLINING = 0x0008;
		const FORWARD_REF = 0x0010;
		const SYNCHRONIZED = 0x0020;
		const NO_OPTIMIZATION = 0x0040;
		const PRESERVE_SIG = 0x0080;
		const AGGRESSIVE_INLINING = 0x0100;
		const AGGRESSIVE_OPTIMIZATION = 0x0200;
		const INTERNAL_CALL = 0x1000;
	}

	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct ParamAttributes: u16 {
		const IN = 0x0001;
		const OUT = 0x0002;
		const OPTIONAL = 0x0010;
		const HAS_DEFAULT = 0x1000;
		const HAS_FIELD_MARSHAL = 0x2000;
	}

	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct EventAttributes: u16 {
		const SPECIAL_NAME = 0x0200;
		const RT_SPECIAL_NAME = 0x0400;
	}

	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct PropertyAttributes: u16 {
		const SPECIAL_NAME = 0x0200;
		const RT_SPECIAL_NAME = 0x0400;
		const HAS_DEFAULT = 0x1000;
	}

	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct MethodSemanticsAttributes: u16 {
		const SETTER = 0x0001;
		const GETTER = 0x0002;
		const OTHER = 0x0004;
		const ADD_ON = 0x0008;
		const REMOVE_ON = 0x0010;
		const FIRE = 0x0020;
	}

	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct GenericParamAttributes: u16 {
		const COVARIANT = 0x0001;
		const CONTRAVARIANT = 0x0002;
		const REFERENCE_TYPE_CONSTRAINT = 0x0004;
		const NOT_NULLABLE_VALUE_TYPE_CONSTRAINT = 0x0008;
		const DEFAULT_CONSTRUCTOR_CONSTRAINT = 0x0010;
	}

	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct AssemblyFlags: u32 {
		const PUBLIC_KEY = 0x0001;
		const RETARGETABLE = 0x0100;
		const DISABLE_JIT_COMPILE_OPTIMIZER = 0x4000;
		const ENABLE_JIT_COMPILE_TRACKING = 0x8000;
	}
}

impl_flags_from_byte_stream!(
	TypeAttributes: u32,
	FieldAttributes: u16,
	MethodAttributes: u16,
	MethodImplAttributes: u16,
	ParamAttributes: u16,
	EventAttributes: u16,
	PropertyAttributes: u16,
	MethodSemanticsAttributes: u16,
	GenericParamAttributes: u16,
	AssemblyFlags: u32,
);

#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, FromRepr)]
pub enum AssemblyHashAlgorithm {
	None = 0x0000,
	MD5 = 0x8003,
	Sha1 = 0x8004,
	Sha256 = 0x800c,
	Sha384 = 0x800d,
	Sha512 = 0x800e,
}

impl FromByteStream for AssemblyHashAlgorithm {
	type Deps = Arc<IndexSizes>;
	fn read(stream: &mut Cursor<&[u8]>, _: &Self::Deps) -> std::io::Result<Self> {
		let mut bytes = [0u8; 4];
		stream.read_exact(&mut bytes)?;
		Self::from_repr(u32::from_le_bytes(bytes)).ok_or_else(|| std::io::ErrorKind::InvalidData.into())
	}
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct Module {
	pub generation: u16,
	pub name: StringIndex,
	pub mvid: GuidIndex,
	pub enc_id: GuidIndex,
	pub enc_base_id: GuidIndex,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct TypeRef {
	pub resolution_scope: ResolutionScope,
	pub name: StringIndex,
	pub namespace: StringIndex,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct TypeDef {
	pub flags: TypeAttributes,
	pub name: StringIndex,
	pub namespace: StringIndex,
	pub extends: TypeDefOrRef,
	pub field_list: FieldIndex,
	pub method_list: MethodDefIndex,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct Field {
	pub flags: FieldAttributes,
	pub name: StringIndex,
	pub signature: BlobIndex,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct MethodDef {
	pub rva: u32,
	pub impl_flags: MethodImplAttributes,
	pub flags: MethodAttributes,
	pub name: StringIndex,
	pub signature: BlobIndex,
	pub param_list: ParamIndex,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct Param {
	pub flags: ParamAttributes,
	pub sequence: u16,
	pub name: StringIndex,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct InterfaceImpl {
	pub class: TypeDefIndex,
	pub interface: TypeDefOrRef,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct MemberRef {
	pub class: MemberRefParent,
	pub name: StringIndex,
	pub signature: BlobIndex,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct Constant {
	pub kind: u8,
	pub padding: u8,
	pub parent: HasConstant,
	pub value: BlobIndex,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct CustomAttribute {
	pub parent: HasCustomAttribute,
	pub constructor: CustomAttributeType,
	pub value: BlobIndex,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct FieldMarshal {
	pub parent: HasFieldMarshal,
	pub native_type: BlobIndex,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct DeclSecurity {
	pub action: u16,
	pub parent: HasDeclSecurity,
	pub permission_set: BlobIndex,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct StandAloneSig {
	pub signature: BlobIndex,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct EventMap {
	pub parent: TypeDefIndex,
	pub event_list: EventIndex,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct Event {
	pub flags: EventAttributes,
	pub name: StringIndex,
	pub event_type: TypeDefOrRef,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct PropertyMap {
	pub parent: TypeDefIndex,
	pub property_list: PropertyIndex,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct Property {
	pub flags: PropertyAttributes,
	pub name: StringIndex,
	pub signature: BlobIndex,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct MethodSemantics {
	pub semantics: MethodSemanticsAttributes,
	pub method: MethodDefIndex,
	pub association: HasSemantics,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct MethodImpl {
	pub class: TypeDefIndex,
	pub method_body: MethodDefOrRef,
	pub method_declaration: MethodDefOrRef,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct ModuleRef {
	pub name: StringIndex,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct TypeSpec {
	pub signature: BlobIndex,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct Assembly {
	pub hash_algorithm: AssemblyHashAlgorithm,
	pub major_version: u16,
	pub minor_version: u16,
	pub build_number: u16,
	pub revision_number: u16,
	pub flags: AssemblyFlags,
	pub public_key: BlobIndex,
	pub name: StringIndex,
	pub culture: StringIndex,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct AssemblyRef {
	pub major_version: u16,
	pub minor_version: u16,
	pub build_number: u16,
	pub revision_number: u16,
	pub flags: AssemblyFlags,
	pub public_key_or_token: BlobIndex,
	pub name: StringIndex,
	pub culture: StringIndex,
	pub hash_value: BlobIndex,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct NestedClass {
	pub nested_class: TypeDefIndex,
	pub enclosing_class: TypeDefIndex,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct GenericParam {
	pub number: u16,
	pub flags: GenericParamAttributes,
	pub owner: TypeOrMethodDef,
	pub name: StringIndex,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct MethodSpec {
	pub method: MethodDefOrRef,
	pub instantiation: BlobIndex,
}

#[derive(Debug, Clone, MetadataTableRow)]
pub struct GenericParamConstraint {
	pub owner: GenericParamIndex,
	pub constraint: TypeDefOrRef,
}

// `FieldMarshal`'s row struct exists (above) because `HasFieldMarshal`
// needs somewhere to point, but the table itself is outside the
// implemented set below; `MemberForwarded`/`Implementation` likewise name
// tables (`File`, `ExportedType`, `ManifestResource`) this crate never
// materializes. Suppress the resulting dead-code warnings rather than
// drop the coded-index target, since dropping it would make those coded
// indices unable to size themselves against the full ECMA-335 tag set.
#[allow(dead_code)]
fn _unused_coded_index_targets(_: MemberForwarded, _: Implementation) {}

/// All metadata tables parsed out of one `#~` stream, each wrapped in the
/// reader type `#[derive(MetadataTableRow)]` generated for it.
#[derive(Debug, Default)]
pub struct TableHeap {
	pub sizes: Option<Arc<IndexSizes>>,
	pub module: ModuleTable,
	pub type_ref: TypeRefTable,
	pub type_def: TypeDefTable,
	pub field: FieldTable,
	pub method_def: MethodDefTable,
	pub param: ParamTable,
	pub interface_impl: InterfaceImplTable,
	pub member_ref: MemberRefTable,
	pub constant: ConstantTable,
	pub custom_attribute: CustomAttributeTable,
	pub decl_security: DeclSecurityTable,
	pub stand_alone_sig: StandAloneSigTable,
	pub event_map: EventMapTable,
	pub event: EventTable,
	pub property_map: PropertyMapTable,
	pub property: PropertyTable,
	pub method_semantics: MethodSemanticsTable,
	pub method_impl: MethodImplTable,
	pub module_ref: ModuleRefTable,
	pub type_spec: TypeSpecTable,
	pub assembly: AssemblyTable,
	pub assembly_ref: AssemblyRefTable,
	pub nested_class: NestedClassTable,
	pub generic_param: GenericParamTable,
	pub method_spec: MethodSpecTable,
	pub generic_param_constraint: GenericParamConstraintTable,
}

impl TableHeap {
	pub fn read(data: &[u8]) -> Result<Self, MetadataError> {
		let mut cursor = Cursor::new(data);

		let mut header = [0u8; 6];
		cursor.read_exact(&mut header)?;
		let heap_sizes = header[4];

		let mut valid_bytes = [0u8; 8];
		cursor.read_exact(&mut valid_bytes)?;
		let valid = u64::from_le_bytes(valid_bytes);

		let mut sorted_bytes = [0u8; 8];
		cursor.read_exact(&mut sorted_bytes)?;
		let _sorted = u64::from_le_bytes(sorted_bytes);

		let mut table_rows = [0u32; TableTag::RANGE];
		let mut present = Vec::new();
		for tag in TableTag::ALL {
			if valid & (1 << (*tag as u64)) != 0 {
				let mut bytes = [0u8; 4];
				cursor.read_exact(&mut bytes)?;
				table_rows[*tag as usize] = u32::from_le_bytes(bytes);
				present.push(*tag);
			}
		}

		let sizes = IndexSizes::new(heap_sizes, table_rows);
		let mut heap = Self { sizes: Some(sizes.clone()), ..Default::default() };

		for tag in present {
			let len = table_rows[tag as usize] as usize;
			match tag {
				TableTag::Module => heap.module = ModuleTable::read(&mut cursor, &sizes, len)?,
				TableTag::TypeRef => heap.type_ref = TypeRefTable::read(&mut cursor, &sizes, len)?,
				TableTag::TypeDef => heap.type_def = TypeDefTable::read(&mut cursor, &sizes, len)?,
				TableTag::Field => heap.field = FieldTable::read(&mut cursor, &sizes, len)?,
				TableTag::MethodDef => heap.method_def = MethodDefTable::read(&mut cursor, &sizes, len)?,
				TableTag::Param => heap.param = ParamTable::read(&mut cursor, &sizes, len)?,
				TableTag::InterfaceImpl => heap.interface_impl = InterfaceImplTable::read(&mut cursor, &sizes, len)?,
				TableTag::MemberRef => heap.member_ref = MemberRefTable::read(&mut cursor, &sizes, len)?,
				TableTag::Constant => heap.constant = ConstantTable::read(&mut cursor, &sizes, len)?,
				TableTag::CustomAttribute => heap.custom_attribute = CustomAttributeTable::read(&mut cursor, &sizes, len)?,
				TableTag::DeclSecurity => heap.decl_security = DeclSecurityTable::read(&mut cursor, &sizes, len)?,
				TableTag::StandAloneSig => heap.stand_alone_sig = StandAloneSigTable::read(&mut cursor, &sizes, len)?,
				TableTag::EventMap => heap.event_map = EventMapTable::read(&mut cursor, &sizes, len)?,
				TableTag::Event => heap.event = EventTable::read(&mut cursor, &sizes, len)?,
				TableTag::PropertyMap => heap.property_map = PropertyMapTable::read(&mut cursor, &sizes, len)?,
				TableTag::Property => heap.property = PropertyTable::read(&mut cursor, &sizes, len)?,
				TableTag::MethodSemantics => heap.method_semantics = MethodSemanticsTable::read(&mut cursor, &sizes, len)?,
				TableTag::MethodImpl => heap.method_impl = MethodImplTable::read(&mut cursor, &sizes, len)?,
				TableTag::ModuleRef => heap.module_ref = ModuleRefTable::read(&mut cursor, &sizes, len)?,
				TableTag::TypeSpec => heap.type_spec = TypeSpecTable::read(&mut cursor, &sizes, len)?,
				TableTag::Assembly => heap.assembly = AssemblyTable::read(&mut cursor, &sizes, len)?,
				TableTag::AssemblyRef => heap.assembly_ref = AssemblyRefTable::read(&mut cursor, &sizes, len)?,
				TableTag::NestedClass => heap.nested_class = NestedClassTable::read(&mut cursor, &sizes, len)?,
				TableTag::GenericParam => heap.generic_param = GenericParamTable::read(&mut cursor, &sizes, len)?,
				TableTag::MethodSpec => heap.method_spec = MethodSpecTable::read(&mut cursor, &sizes, len)?,
				TableTag::GenericParamConstraint => {
					heap.generic_param_constraint = GenericParamConstraintTable::read(&mut cursor, &sizes, len)?
				}
				other if len == 0 => continue,
				other => return Err(MetadataError::UnsupportedTable(other as u8)),
			}
		}

		Ok(heap)
	}
}
