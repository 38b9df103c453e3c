//! The CLI header (ECMA-335 §II.25.3.3) and the top-level [`Assembly`]
//! type that ties a PE image's metadata heaps, method bodies and entry
//! point together into something the type-system view can resolve
//! against.

use std::sync::Arc;

use crate::error::MetadataError;
use crate::metadata::heaps::MetadataHeaps;
use crate::metadata::il::MethodBody;
use crate::metadata::pe::PeFile;
use crate::metadata::token::MethodDefIndex;

bitflags::bitflags! {
	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct RuntimeFlags: u32 {
		const IL_ONLY = 0x0000_0001;
		const REQUIRE_32_BIT = 0x0000_0002;
		const STRONG_NAME_SIGNED = 0x0000_0008;
		const NATIVE_ENTRYPOINT = 0x0000_0010;
		const TRACK_DEBUG_DATA = 0x0001_0000;
		const PREFER_32_BIT = 0x0002_0000;
	}
}

#[derive(Debug, Clone, Copy)]
pub struct CliHeader {
	pub major_runtime_version: u16,
	pub minor_runtime_version: u16,
	pub metadata_rva: u32,
	pub metadata_size: u32,
	pub flags: RuntimeFlags,
	pub entry_point_token: u32,
}

impl CliHeader {
	fn parse(bytes: &[u8]) -> Result<Self, MetadataError> {
		let truncated = || MetadataError::TruncatedStream("CLI header".into());
		let read_u16 = |at: usize| -> Result<u16, MetadataError> {
			Ok(u16::from_le_bytes(bytes.get(at..at + 2).ok_or_else(truncated)?.try_into().unwrap()))
		};
		let read_u32 = |at: usize| -> Result<u32, MetadataError> {
			Ok(u32::from_le_bytes(bytes.get(at..at + 4).ok_or_else(truncated)?.try_into().unwrap()))
		};

		Ok(Self {
			major_runtime_version: read_u16(4)?,
			minor_runtime_version: read_u16(6)?,
			metadata_rva: read_u32(8)?,
			metadata_size: read_u32(12)?,
			flags: RuntimeFlags::from_bits_retain(read_u32(16)?),
			entry_point_token: read_u32(20)?,
		})
	}
}

/// A loaded .NET assembly: its PE/CLI headers plus the parsed metadata
/// heaps. Method bodies are resolved lazily from RVAs recorded in
/// [`crate::metadata::heaps::table::MethodDef`] rows, not eagerly decoded
/// at load time.
pub struct Assembly<'d> {
	pe: PeFile<'d>,
	pub header: CliHeader,
	pub heaps: MetadataHeaps,
}

impl<'d> Assembly<'d> {
	pub fn read(data: &'d [u8]) -> Result<Self, MetadataError> {
		let pe = PeFile::parse(data)?;
		let cli_dir = pe.cli_header_directory();
		let cli_bytes = pe.resolve_rva(cli_dir.rva).ok_or(MetadataError::TruncatedStream("CLI header".into()))?;
		let header = CliHeader::parse(cli_bytes)?;

		let metadata_bytes =
			pe.resolve_rva(header.metadata_rva).ok_or(MetadataError::TruncatedStream("metadata root".into()))?;
		let metadata_bytes = &metadata_bytes[..header.metadata_size as usize];
		let heaps = MetadataHeaps::read(metadata_bytes)?;

		Ok(Self { pe, header, heaps })
	}

	/// Resolves and decodes the IL body of `method`, returning `None` for
	/// methods with no RVA (abstract, P/Invoke, runtime-provided).
	pub fn method_body(&self, method: MethodDefIndex) -> Result<Option<MethodBody>, MetadataError> {
		let Some(idx) = method.idx() else { return Ok(None) };
		let row = self.heaps.tables.method_def.rows().get(idx).ok_or(MetadataError::InvalidToken(0))?;
		if row.rva == 0 {
			return Ok(None);
		}
		let bytes = self.pe.resolve_rva(row.rva).ok_or(MetadataError::TruncatedStream("method body".into()))?;
		Ok(Some(MethodBody::read(bytes)?))
	}

	pub fn tables(&self) -> &Arc<crate::metadata::heaps::table::TableHeap> {
		&self.heaps.tables
	}
}
