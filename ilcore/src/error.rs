//! Error taxonomy shared by every stage of the decompilation pipeline.
//!
//! Kept as plain enums with hand-written `Display`/`From` impls, matching
//! the rest of this crate's preference for explicit, inspectable error
//! values over a derive macro hiding the wiring.

use std::fmt::{Display, Formatter};
use std::io;

/// Failures while reading the PE image and its embedded CLI metadata.
/// Anything under this variant means the input bytes themselves are
/// untrustworthy, not that a later pass misbehaved.
#[derive(Debug)]
pub enum MetadataError {
	BadSignature(u32),
	MissingStream(&'static str),
	TruncatedStream(String),
	UnsupportedTable(u8),
	InvalidCodedIndex,
	InvalidToken(u32),
	Io(io::Error),
}

impl Display for MetadataError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::BadSignature(got) => write!(f, "bad metadata root signature: {got:#010x}"),
			Self::MissingStream(name) => write!(f, "required stream {name} is absent"),
			Self::TruncatedStream(name) => write!(f, "stream {name} ends before its declared contents"),
			Self::UnsupportedTable(tag) => write!(f, "table {tag:#04x} is present but not supported"),
			Self::InvalidCodedIndex => write!(f, "coded index tag does not name a known table"),
			Self::InvalidToken(raw) => write!(f, "metadata token {raw:#010x} does not name a known table"),
			Self::Io(err) => write!(f, "{err}"),
		}
	}
}

impl std::error::Error for MetadataError {}

impl From<io::Error> for MetadataError {
	fn from(err: io::Error) -> Self {
		Self::Io(err)
	}
}

/// Top-level error type surfaced by the decompilation pipeline.
///
/// Pattern mismatches inside a transform pass are not represented here:
/// a pass that does not recognize its input simply returns `false` and
/// leaves the instruction tree untouched. This enum is reserved for
/// things that stop the pipeline rather than just skip one rewrite.
#[derive(Debug)]
pub enum DecompilerError {
	/// The input assembly's metadata or IL does not conform to ECMA-335.
	MalformedMetadata(MetadataError),
	/// An internal invariant the ILAst is supposed to uphold (block
	/// termination, load/store counts, ...) was found violated, almost
	/// always indicating a bug in an earlier transform pass rather than
	/// a malformed input.
	InvariantViolation(String),
	/// A reflection-format type name failed to parse.
	ReflectionNameParse { input: String, position: usize, message: String },
	/// A transform pass recognized its input but could not complete the
	/// rewrite (as opposed to simply not matching, which is not an error).
	TransformFailure { pass: &'static str, message: String },
	/// The caller's cancellation token was observed tripped.
	Cancelled,
}

impl Display for DecompilerError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::MalformedMetadata(err) => write!(f, "malformed metadata: {err}"),
			Self::InvariantViolation(msg) => write!(f, "invariant violation: {msg}"),
			Self::ReflectionNameParse { input, position, message } => {
				write!(f, "failed to parse reflection name {input:?} at byte {position}: {message}")
			}
			Self::TransformFailure { pass, message } => write!(f, "transform `{pass}` failed: {message}"),
			Self::Cancelled => write!(f, "decompilation was cancelled"),
		}
	}
}

impl std::error::Error for DecompilerError {}

impl From<MetadataError> for DecompilerError {
	fn from(err: MetadataError) -> Self {
		Self::MalformedMetadata(err)
	}
}

pub type Result<T> = std::result::Result<T, DecompilerError>;
