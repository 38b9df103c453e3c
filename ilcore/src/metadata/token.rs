//! Metadata tokens, simple table-row indices and coded indices.
//!
//! This mirrors ECMA-335 §II.22/§II.24: every cross-reference inside a
//! metadata stream is either a *simple index* (a 1-based row number into one
//! specific table) or a *coded index* (a row number plus a small tag
//! selecting which of a handful of tables it points into). Both kinds are
//! variable-width: 2 bytes while every candidate table fits in 16 bits, 4
//! bytes once any of them would overflow that.
//!
//! A metadata token and a table tag share the same ECMA-335 table-ID byte,
//! so [`TableTag`] doubles as the token-kind discriminant.

use std::fmt::{Debug, Formatter};
use std::io::{Cursor, ErrorKind, Read};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::metadata::heaps::table::TableTag;
use crate::metadata::FromByteStream;

/// A resolved reference into a metadata table: the table kind plus a
/// 1-based row index. Every handle the resolver hands callers is, at
/// bottom, one of these.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct MetadataToken(u32);

impl MetadataToken {
	pub fn new(tag: TableTag, row: usize) -> Self {
		debug_assert!(row <= 0x00FF_FFFF);
		Self(((tag as u32) << 24) | (row as u32 & 0x00FF_FFFF))
	}

	#[inline]
	pub fn tag(&self) -> TableTag {
		TableTag::from_repr(self.0 >> 24).expect("token built from an invalid tag")
	}

	/// 1-based row index. `0` means "nil token".
	#[inline]
	pub fn row(&self) -> usize {
		(self.0 & 0x00FF_FFFF) as usize
	}

	#[inline]
	pub fn is_nil(&self) -> bool {
		self.row() == 0
	}

	#[inline]
	pub fn raw(&self) -> u32 {
		self.0
	}
}

impl TryFrom<u32> for MetadataToken {
	type Error = ();
	fn try_from(value: u32) -> Result<Self, Self::Error> {
		match TableTag::from_repr(value >> 24) {
			Some(_) => Ok(Self(value)),
			None => Err(()),
		}
	}
}

impl Debug for MetadataToken {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "MetadataToken::{:?}({})", self.tag(), self.row())
	}
}

impl FromByteStream for MetadataToken {
	type Deps = ();
	fn read(stream: &mut Cursor<&[u8]>, _: &()) -> std::io::Result<Self> {
		let value = u32::read(stream, &())?;
		MetadataToken::try_from(value).map_err(|_| ErrorKind::InvalidData.into())
	}
}

/// Row-count-dependent widths of every index kind found in the `#~` stream,
/// computed once from the table header and threaded through every
/// subsequent row read.
#[derive(Debug, Clone)]
pub struct IndexSizes {
	pub string: usize,
	pub guid: usize,
	pub blob: usize,
	pub table_rows: [u32; TableTag::RANGE],
}

impl IndexSizes {
	pub fn new(heap_sizes: u8, table_rows: [u32; TableTag::RANGE]) -> Arc<Self> {
		Arc::new(Self {
			string: 2 + 2 * ((heap_sizes & 0x1) != 0) as usize,
			guid: 2 + 2 * ((heap_sizes & 0x2) != 0) as usize,
			blob: 2 + 2 * ((heap_sizes & 0x4) != 0) as usize,
			table_rows,
		})
	}

	#[inline]
	fn rows_of(&self, tag: TableTag) -> u32 {
		self.table_rows[tag as usize]
	}

	fn simple_index_size(&self, tag: TableTag) -> usize {
		2 + 2 * (self.rows_of(tag) > 0xFFFF) as usize
	}

	fn coded_index_size(&self, tags: &[TableTag]) -> usize {
		let max_rows = tags.iter().map(|t| self.rows_of(*t)).max().unwrap_or(0);
		let bits = tag_bits(tags.len());
		2 + 2 * (max_rows > (1u32 << (16 - bits))) as usize
	}
}

fn tag_bits(variant_count: usize) -> u32 {
	match variant_count {
		0 | 1 => 0,
		n => 32 - ((n - 1) as u32).leading_zeros(),
	}
}

/// A 1-based row index into exactly one metadata table.
pub struct RowIndex<Tag: TableRowTag>(pub usize, PhantomData<Tag>);

impl<Tag: TableRowTag> RowIndex<Tag> {
	/// Builds a row index from a 1-based row number (`0` means nil).
	pub fn new(row: usize) -> Self {
		Self(row, PhantomData)
	}

	#[inline]
	pub fn idx(&self) -> Option<usize> {
		match self.0 {
			0 => None,
			row => Some(row - 1),
		}
	}
}

impl<Tag: TableRowTag> Copy for RowIndex<Tag> {}
impl<Tag: TableRowTag> Clone for RowIndex<Tag> {
	fn clone(&self) -> Self {
		*self
	}
}
impl<Tag: TableRowTag> Debug for RowIndex<Tag> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{:?}({})", Tag::TAG, self.0)
	}
}

pub trait TableRowTag {
	const TAG: TableTag;
}

impl<Tag: TableRowTag> FromByteStream for RowIndex<Tag> {
	type Deps = Arc<IndexSizes>;
	fn read(stream: &mut Cursor<&[u8]>, sizes: &Self::Deps) -> std::io::Result<Self> {
		let size = sizes.simple_index_size(Tag::TAG);
		let mut bytes = [0u8; 4];
		stream.read_exact(&mut bytes[..size])?;
		Ok(Self(u32::from_le_bytes(bytes) as usize, PhantomData))
	}
}

/// A reference that may land in any of `Self::TABLES`, disambiguated by a
/// small tag occupying the low bits of the encoded value.
pub trait CodedIndexKind {
	const TABLES: &'static [TableTag];
}

pub struct CodedIndex<Kind: CodedIndexKind>(MetadataToken, PhantomData<Kind>);

impl<Kind: CodedIndexKind> CodedIndex<Kind> {
	#[inline]
	pub fn token(&self) -> MetadataToken {
		self.0
	}

	/// Builds a coded index directly from an already-tagged token, for
	/// callers (such as the signature-blob grammar) that decode the
	/// table/row pair by hand rather than through [`FromByteStream`].
	pub fn from_token_unchecked(raw: u32) -> Self {
		Self(MetadataToken::try_from(raw).expect("raw token must name a valid table"), PhantomData)
	}
}

impl<Kind: CodedIndexKind> Copy for CodedIndex<Kind> {}
impl<Kind: CodedIndexKind> Clone for CodedIndex<Kind> {
	fn clone(&self) -> Self {
		*self
	}
}
impl<Kind: CodedIndexKind> Debug for CodedIndex<Kind> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		Debug::fmt(&self.0, f)
	}
}

impl<Kind: CodedIndexKind> FromByteStream for CodedIndex<Kind> {
	type Deps = Arc<IndexSizes>;
	fn read(stream: &mut Cursor<&[u8]>, sizes: &Self::Deps) -> std::io::Result<Self> {
		let size = sizes.coded_index_size(Kind::TABLES);
		let mut bytes = [0u8; 4];
		stream.read_exact(&mut bytes[..size])?;
		let value = u32::from_le_bytes(bytes);

		let bits = tag_bits(Kind::TABLES.len());
		let mask = (1u32 << bits) - 1;
		let tag = (value & mask) as usize;
		let row = (value >> bits) as usize;

		let table = *Kind::TABLES.get(tag).ok_or(ErrorKind::InvalidData)?;
		Ok(Self(MetadataToken::new(table, row), PhantomData))
	}
}

/// Marker types selecting which coded-index family a field belongs to.
/// Kept as zero-sized types (rather than one macro-generated newtype per
/// kind) so the derive on table rows can stay a plain `<FieldType>::read`.
pub mod coded {
	use super::{CodedIndexKind, TableTag};

	macro_rules! define_coded_index_kind {
		($($name: ident: [$($table: ident),+ $(,)?]),* $(,)?) => {
			$(
				pub struct $name;
				impl CodedIndexKind for $name {
					const TABLES: &'static [TableTag] = &[$(TableTag::$table),+];
				}
			)*
		};
	}

	define_coded_index_kind! {
		TypeDefOrRef: [TypeDef, TypeRef, TypeSpec],
		HasConstant: [Field, Param, Property],
		HasCustomAttribute: [
			MethodDef, Field, TypeRef, TypeDef, Param, InterfaceImpl, MemberRef,
			Module, DeclSecurity, Property, Event, StandAloneSig, ModuleRef,
			TypeSpec, Assembly, AssemblyRef, File, ExportedType,
			ManifestResource, GenericParam, GenericParamConstraint, MethodSpec
		],
		HasFieldMarshal: [Field, Param],
		HasDeclSecurity: [TypeDef, MethodDef, Assembly],
		MemberRefParent: [TypeDef, TypeRef, ModuleRef, MethodDef, TypeSpec],
		HasSemantics: [Event, Property],
		MethodDefOrRef: [MethodDef, MemberRef],
		MemberForwarded: [Field, MethodDef],
		Implementation: [File, AssemblyRef, ExportedType],
		CustomAttributeType: [MethodDef, MemberRef],
		ResolutionScope: [Module, ModuleRef, AssemblyRef, TypeRef],
		TypeOrMethodDef: [TypeDef, MethodDef],
	}
}

pub type TypeDefOrRef = CodedIndex<coded::TypeDefOrRef>;
pub type HasConstant = CodedIndex<coded::HasConstant>;
pub type HasCustomAttribute = CodedIndex<coded::HasCustomAttribute>;
pub type HasFieldMarshal = CodedIndex<coded::HasFieldMarshal>;
pub type HasDeclSecurity = CodedIndex<coded::HasDeclSecurity>;
pub type MemberRefParent = CodedIndex<coded::MemberRefParent>;
pub type HasSemantics = CodedIndex<coded::HasSemantics>;
pub type MethodDefOrRef = CodedIndex<coded::MethodDefOrRef>;
pub type MemberForwarded = CodedIndex<coded::MemberForwarded>;
pub type Implementation = CodedIndex<coded::Implementation>;
pub type CustomAttributeType = CodedIndex<coded::CustomAttributeType>;
pub type ResolutionScope = CodedIndex<coded::ResolutionScope>;
pub type TypeOrMethodDef = CodedIndex<coded::TypeOrMethodDef>;

macro_rules! define_row_index {
	($($name: ident -> $tag: ident),* $(,)?) => {
		$(
			pub struct $name;
			impl TableRowTag for $name {
				const TAG: TableTag = TableTag::$tag;
			}
		)*
	};
}

pub mod row {
	use super::{TableRowTag, TableTag};
	define_row_index! {
		TypeDef -> TypeDef,
		Field -> Field,
		MethodDef -> MethodDef,
		Param -> Param,
		Event -> Event,
		Property -> Property,
		ModuleRef -> ModuleRef,
		GenericParam -> GenericParam,
	}
}

pub type TypeDefIndex = RowIndex<row::TypeDef>;
pub type FieldIndex = RowIndex<row::Field>;
pub type MethodDefIndex = RowIndex<row::MethodDef>;
pub type ParamIndex = RowIndex<row::Param>;
pub type EventIndex = RowIndex<row::Event>;
pub type PropertyIndex = RowIndex<row::Property>;
pub type ModuleRefIndex = RowIndex<row::ModuleRef>;
pub type GenericParamIndex = RowIndex<row::GenericParam>;
