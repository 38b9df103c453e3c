//! `#Blob` heap: each entry is a compressed-length prefix followed by that
//! many raw bytes (ECMA-335 §II.24.2.4). Signatures, constant values and
//! custom attribute blobs all live here.

use std::io::Cursor;
use std::sync::Arc;

use crate::metadata::token::IndexSizes;
use crate::metadata::{read_compressed_u32, FromByteStream};

#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct BlobIndex(pub u32);

impl FromByteStream for BlobIndex {
	type Deps = Arc<IndexSizes>;
	fn read(stream: &mut Cursor<&[u8]>, sizes: &Self::Deps) -> std::io::Result<Self> {
		let mut bytes = [0u8; 4];
		std::io::Read::read_exact(stream, &mut bytes[..sizes.blob])?;
		Ok(Self(u32::from_le_bytes(bytes)))
	}
}

#[derive(Debug, Clone, Default)]
pub struct BlobHeap {
	data: Arc<[u8]>,
}

impl BlobHeap {
	pub fn new(data: &[u8]) -> Self {
		Self { data: Arc::from(data) }
	}

	/// Returns the raw bytes of the blob at `index`, not including its
	/// length prefix.
	pub fn get(&self, index: BlobIndex) -> &[u8] {
		let start = index.0 as usize;
		if start >= self.data.len() {
			return &[];
		}
		let mut cursor = Cursor::new(&self.data[start..]);
		let Ok(len) = read_compressed_u32(&mut cursor) else {
			return &[];
		};
		let body_start = start + cursor.position() as usize;
		self.data.get(body_start..body_start + len as usize).unwrap_or(&[])
	}

	pub fn cursor_at(&self, index: BlobIndex) -> Cursor<&[u8]> {
		Cursor::new(self.get(index))
	}
}
