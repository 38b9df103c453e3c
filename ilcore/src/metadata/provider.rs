//! External interfaces a caller plugs in: debug symbols are not part of
//! ECMA-335 metadata proper (they live in a separate PDB, embedded or
//! portable), so this crate only defines the contract and ships a
//! no-op implementation.

/// One mapping from an IL offset to a source location, as recorded by a
/// portable PDB's sequence-point blob.
#[derive(Debug, Clone)]
pub struct SequencePoint {
	pub il_offset: u32,
	pub start_line: u32,
	pub start_column: u32,
	pub end_line: u32,
	pub end_column: u32,
	pub document: Option<String>,
}

/// A hidden sequence point (`start_line == 0xFEEFEE`) marks IL the
/// compiler generated with no corresponding source text — state-machine
/// plumbing, `using` disposal, etc. Transform passes consult this to
/// avoid surfacing source lines the user never wrote.
impl SequencePoint {
	pub fn is_hidden(&self) -> bool {
		self.start_line == 0xFEEFEE
	}
}

/// Source-level names for a method's local variables, keyed by slot index
/// in the local-variable signature. Release builds with no PDB leave this
/// entirely absent, in which case the pipeline falls back to synthesized
/// names (`V_0`, `V_1`, ...).
pub trait DebugSymbolProvider: Send + Sync {
	fn sequence_points(&self, method_token: u32) -> Vec<SequencePoint>;
	fn local_variable_name(&self, method_token: u32, slot: u32) -> Option<String>;
}

/// The provider used when no PDB was supplied: every query returns empty,
/// and every pass that consults debug symbols degrades to its
/// symbol-less fallback.
pub struct NoDebugSymbols;

impl DebugSymbolProvider for NoDebugSymbols {
	fn sequence_points(&self, _method_token: u32) -> Vec<SequencePoint> {
		Vec::new()
	}

	fn local_variable_name(&self, _method_token: u32, _slot: u32) -> Option<String> {
		None
	}
}
