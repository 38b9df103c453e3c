//! `#Strings` and `#US` heaps: flat, null-terminated (`#Strings`) or
//! length-prefixed (`#US`) UTF-8/UTF-16 blobs addressed by byte offset.

use std::io::{Cursor, Read};
use std::sync::Arc;

use crate::metadata::token::IndexSizes;
use crate::metadata::FromByteStream;

/// An offset into `#Strings`. `0` is always the empty string.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct StringIndex(pub u32);

impl FromByteStream for StringIndex {
	type Deps = Arc<IndexSizes>;
	fn read(stream: &mut Cursor<&[u8]>, sizes: &Self::Deps) -> std::io::Result<Self> {
		let mut bytes = [0u8; 4];
		stream.read_exact(&mut bytes[..sizes.string])?;
		Ok(Self(u32::from_le_bytes(bytes)))
	}
}

#[derive(Debug, Clone, Default)]
pub struct StringHeap {
	data: Arc<[u8]>,
}

impl StringHeap {
	pub fn new(data: &[u8]) -> Self {
		Self { data: Arc::from(data) }
	}

	/// Decodes the NUL-terminated UTF-8 string starting at `index`, losslessly
	/// replacing any invalid sequences (ECMA-335 only mandates ASCII-safe
	/// identifiers are well-formed; vendor tooling occasionally emits worse).
	pub fn get(&self, index: StringIndex) -> String {
		let start = index.0 as usize;
		if start >= self.data.len() {
			return String::new();
		}
		let end = self.data[start..].iter().position(|&b| b == 0).map(|i| start + i).unwrap_or(self.data.len());
		String::from_utf8_lossy(&self.data[start..end]).into_owned()
	}
}

/// An offset into `#US`, which stores length-prefixed UTF-16 string
/// literals referenced by `ldstr`.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct UserStringIndex(pub u32);

#[derive(Debug, Clone, Default)]
pub struct UserStringHeap {
	data: Arc<[u8]>,
}

impl UserStringHeap {
	pub fn new(data: &[u8]) -> Self {
		Self { data: Arc::from(data) }
	}

	pub fn get(&self, index: UserStringIndex) -> String {
		let start = index.0 as usize;
		let Some(len) = crate::metadata::read_compressed_u32(&mut Cursor::new(&self.data[start..])).ok() else {
			return String::new();
		};
		let header_len = compressed_u32_len(len);
		let body_start = start + header_len;
		// The trailing byte is a "has non-ASCII" flag, not string content.
		let body_len = (len as usize).saturating_sub(1);
		let body = self.data.get(body_start..body_start + body_len).unwrap_or(&[]);
		let units: Vec<u16> = body.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
		String::from_utf16_lossy(&units)
	}
}

fn compressed_u32_len(value: u32) -> usize {
	match value {
		0..=0x7F => 1,
		0x80..=0x3FFF => 2,
		_ => 4,
	}
}
