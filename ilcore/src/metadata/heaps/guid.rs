//! `#GUID` heap: a flat array of 16-byte GUIDs, 1-indexed (index `0` means
//! "no GUID").

use std::io::Cursor;
use std::sync::Arc;

use uuid::Uuid;

use crate::metadata::token::IndexSizes;
use crate::metadata::FromByteStream;

#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct GuidIndex(pub u32);

impl FromByteStream for GuidIndex {
	type Deps = Arc<IndexSizes>;
	fn read(stream: &mut Cursor<&[u8]>, sizes: &Self::Deps) -> std::io::Result<Self> {
		let mut bytes = [0u8; 4];
		std::io::Read::read_exact(stream, &mut bytes[..sizes.guid])?;
		Ok(Self(u32::from_le_bytes(bytes)))
	}
}

#[derive(Debug, Clone, Default)]
pub struct GuidHeap {
	data: Arc<[u8]>,
}

impl GuidHeap {
	pub fn new(data: &[u8]) -> Self {
		Self { data: Arc::from(data) }
	}

	pub fn get(&self, index: GuidIndex) -> Option<Uuid> {
		if index.0 == 0 {
			return None;
		}
		let start = (index.0 as usize - 1) * 16;
		let bytes: [u8; 16] = self.data.get(start..start + 16)?.try_into().ok()?;
		Some(Uuid::from_bytes_le(bytes))
	}
}
