//! The four metadata heaps (`#Strings`, `#US`, `#GUID`, `#Blob`) and the
//! `#~` table stream built on top of them.

pub mod blob;
pub mod guid;
pub mod string;
pub mod table;

use std::sync::Arc;

use crate::error::MetadataError;
use crate::metadata::heaps::blob::BlobHeap;
use crate::metadata::heaps::guid::GuidHeap;
use crate::metadata::heaps::string::{StringHeap, UserStringHeap};
use crate::metadata::heaps::table::TableHeap;

/// The metadata root described by ECMA-335 §II.24.2.1, parsed down into its
/// component heaps.
pub struct MetadataHeaps {
	pub strings: StringHeap,
	pub user_strings: UserStringHeap,
	pub guids: GuidHeap,
	pub blobs: BlobHeap,
	pub tables: Arc<TableHeap>,
}

impl MetadataHeaps {
	pub fn read(data: &[u8]) -> Result<Self, MetadataError> {
		let root = MetadataRootHeader::read(data)?;

		let mut strings = None;
		let mut user_strings = None;
		let mut guids = None;
		let mut blobs = None;
		let mut tables = None;

		for stream in &root.streams {
			let bytes = data
				.get(stream.offset as usize..(stream.offset + stream.size) as usize)
				.ok_or(MetadataError::TruncatedStream(stream.name.clone()))?;

			match stream.name.as_str() {
				"#Strings" => strings = Some(StringHeap::new(bytes)),
				"#US" => user_strings = Some(UserStringHeap::new(bytes)),
				"#GUID" => guids = Some(GuidHeap::new(bytes)),
				"#Blob" => blobs = Some(BlobHeap::new(bytes)),
				"#~" | "#-" => tables = Some(TableHeap::read(bytes)?),
				_ => {}
			}
		}

		Ok(Self {
			strings: strings.unwrap_or_default(),
			user_strings: user_strings.unwrap_or_default(),
			guids: guids.unwrap_or_default(),
			blobs: blobs.unwrap_or_default(),
			tables: Arc::new(tables.ok_or(MetadataError::MissingStream("#~"))?),
		})
	}
}

struct StreamHeader {
	offset: u32,
	size: u32,
	name: String,
}

struct MetadataRootHeader {
	streams: Vec<StreamHeader>,
}

impl MetadataRootHeader {
	fn read(data: &[u8]) -> Result<Self, MetadataError> {
		const SIGNATURE: u32 = 0x424A_5342;

		let mut cursor = std::io::Cursor::new(data);
		let signature = read_u32(&mut cursor)?;
		if signature != SIGNATURE {
			return Err(MetadataError::BadSignature(signature));
		}

		let _major = read_u16(&mut cursor)?;
		let _minor = read_u16(&mut cursor)?;
		let _reserved = read_u32(&mut cursor)?;
		let version_len = read_u32(&mut cursor)?;
		skip(&mut cursor, round4(version_len))?;
		let _flags = read_u16(&mut cursor)?;
		let stream_count = read_u16(&mut cursor)?;

		let mut streams = Vec::with_capacity(stream_count as usize);
		for _ in 0..stream_count {
			let offset = read_u32(&mut cursor)?;
			let size = read_u32(&mut cursor)?;
			let name = read_c_str(&mut cursor)?;
			streams.push(StreamHeader { offset, size, name });
		}

		Ok(Self { streams })
	}
}

fn round4(len: u32) -> u32 {
	(len + 3) & !3
}

fn read_u16(cursor: &mut std::io::Cursor<&[u8]>) -> Result<u16, MetadataError> {
	use std::io::Read;
	let mut bytes = [0u8; 2];
	cursor.read_exact(&mut bytes).map_err(|_| MetadataError::TruncatedStream("metadata root".into()))?;
	Ok(u16::from_le_bytes(bytes))
}

fn read_u32(cursor: &mut std::io::Cursor<&[u8]>) -> Result<u32, MetadataError> {
	use std::io::Read;
	let mut bytes = [0u8; 4];
	cursor.read_exact(&mut bytes).map_err(|_| MetadataError::TruncatedStream("metadata root".into()))?;
	Ok(u32::from_le_bytes(bytes))
}

fn skip(cursor: &mut std::io::Cursor<&[u8]>, n: u32) -> Result<(), MetadataError> {
	cursor.set_position(cursor.position() + n as u64);
	Ok(())
}

fn read_c_str(cursor: &mut std::io::Cursor<&[u8]>) -> Result<String, MetadataError> {
	use std::io::Read;
	let start = cursor.position() as usize;
	let data = *cursor.get_ref();
	let end = data[start..].iter().position(|&b| b == 0).map(|i| start + i).ok_or(MetadataError::TruncatedStream("stream name".into()))?;
	let name = String::from_utf8_lossy(&data[start..end]).into_owned();
	let padded_len = round4((end - start + 1) as u32);
	cursor.set_position((start + padded_len as usize) as u64);
	let _ = Read::by_ref(cursor);
	Ok(name)
}
