//! Just enough of the PE/COFF format (ECMA-335 §II.25) to find the CLI
//! header and resolve RVAs into file offsets. A full PE parser (resources,
//! relocations, imports) is out of scope: this crate only needs what
//! stands between "bytes on disk" and "the `#~` stream".

use crate::error::MetadataError;

const DOS_HEADER_LFANEW_OFFSET: usize = 0x3C;
const PE_SIGNATURE: u32 = 0x0000_4550; // "PE\0\0"

#[derive(Debug, Clone, Copy)]
pub struct SectionHeader {
	pub virtual_address: u32,
	pub virtual_size: u32,
	pub raw_data_pointer: u32,
	pub raw_data_size: u32,
}

impl SectionHeader {
	fn contains(&self, rva: u32) -> bool {
		rva >= self.virtual_address && rva < self.virtual_address + self.virtual_size.max(self.raw_data_size)
	}
}

#[derive(Debug, Clone, Copy)]
pub struct DataDirectory {
	pub rva: u32,
	pub size: u32,
}

/// A PE image with enough of its section table resolved to translate RVAs,
/// plus the 16 standard data directories (the CLI header lives at index 14).
pub struct PeFile<'d> {
	pub data: &'d [u8],
	pub sections: Vec<SectionHeader>,
	pub data_directories: [DataDirectory; 16],
}

impl<'d> PeFile<'d> {
	pub fn parse(data: &'d [u8]) -> Result<Self, MetadataError> {
		let truncated = || MetadataError::TruncatedStream("PE header".into());

		let lfanew = *data.get(DOS_HEADER_LFANEW_OFFSET..DOS_HEADER_LFANEW_OFFSET + 4).ok_or_else(truncated)?;
		let lfanew = u32::from_le_bytes(lfanew.try_into().unwrap()) as usize;

		let signature = u32::from_le_bytes(data.get(lfanew..lfanew + 4).ok_or_else(truncated)?.try_into().unwrap());
		if signature != PE_SIGNATURE {
			return Err(MetadataError::BadSignature(signature));
		}

		let coff_header = lfanew + 4;
		let number_of_sections = u16::from_le_bytes(data[coff_header + 2..coff_header + 4].try_into().unwrap());
		let optional_header_size = u16::from_le_bytes(data[coff_header + 16..coff_header + 18].try_into().unwrap());
		let optional_header = coff_header + 20;

		let magic = u16::from_le_bytes(data[optional_header..optional_header + 2].try_into().unwrap());
		let is_pe32_plus = magic == 0x20b;
		let data_dir_offset = optional_header + if is_pe32_plus { 112 } else { 96 };

		let mut data_directories = [DataDirectory { rva: 0, size: 0 }; 16];
		for (i, dir) in data_directories.iter_mut().enumerate() {
			let base = data_dir_offset + i * 8;
			dir.rva = u32::from_le_bytes(data.get(base..base + 4).ok_or_else(truncated)?.try_into().unwrap());
			dir.size = u32::from_le_bytes(data.get(base + 4..base + 8).ok_or_else(truncated)?.try_into().unwrap());
		}

		let section_table = optional_header + optional_header_size as usize;
		let mut sections = Vec::with_capacity(number_of_sections as usize);
		for i in 0..number_of_sections as usize {
			let base = section_table + i * 40;
			let row = data.get(base..base + 40).ok_or_else(truncated)?;
			sections.push(SectionHeader {
				virtual_size: u32::from_le_bytes(row[8..12].try_into().unwrap()),
				virtual_address: u32::from_le_bytes(row[12..16].try_into().unwrap()),
				raw_data_size: u32::from_le_bytes(row[16..20].try_into().unwrap()),
				raw_data_pointer: u32::from_le_bytes(row[20..24].try_into().unwrap()),
			});
		}

		Ok(Self { data, sections, data_directories })
	}

	pub fn resolve_rva(&self, rva: u32) -> Option<&'d [u8]> {
		if rva == 0 {
			return None;
		}
		let section = self.sections.iter().find(|s| s.contains(rva))?;
		let file_offset = section.raw_data_pointer + (rva - section.virtual_address);
		self.data.get(file_offset as usize..)
	}

	/// Data directory index 14, the CLI (COM+ 2.0) header, per ECMA-335
	/// §II.25.3.3.
	pub fn cli_header_directory(&self) -> DataDirectory {
		self.data_directories[14]
	}
}
