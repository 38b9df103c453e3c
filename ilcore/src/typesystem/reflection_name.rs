//! Parsing .NET reflection-format type names: `Namespace.Outer+Nested\`1[[System.Int32, mscorlib]]*[]&`.
//!
//! This grammar shows up wherever a type is referenced by string rather
//! than by metadata token — `typeof(x).AssemblyQualifiedName`,
//! `Type.GetType`, custom-attribute-encoded `System.Type` arguments. It is
//! unrelated to (and stricter than) the CIL type-signature blob grammar in
//! [`crate::metadata::il`].

use crate::error::DecompilerError;

#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionTypeName {
	/// Outer-to-inner segments split on `+` (nested-type separator).
	pub segments: Vec<String>,
	pub namespace: Option<String>,
	/// Backtick-arity of the innermost segment, e.g. `` `1 `` in `List\`1`.
	pub generic_arity: u32,
	pub generic_args: Vec<ReflectionTypeName>,
	pub array_ranks: Vec<u32>,
	pub pointer_depth: u32,
	pub is_by_ref: bool,
	pub assembly: Option<String>,
}

struct Parser<'a> {
	input: &'a str,
	bytes: &'a [u8],
	pos: usize,
}

type ParseResult<T> = Result<T, DecompilerError>;

impl<'a> Parser<'a> {
	fn new(input: &'a str) -> Self {
		Self { input, bytes: input.as_bytes(), pos: 0 }
	}

	fn error(&self, message: impl Into<String>) -> DecompilerError {
		DecompilerError::ReflectionNameParse { input: self.input.to_string(), position: self.pos, message: message.into() }
	}

	fn peek(&self) -> Option<u8> {
		self.bytes.get(self.pos).copied()
	}

	fn bump(&mut self) -> Option<u8> {
		let b = self.peek()?;
		self.pos += 1;
		Some(b)
	}

	/// Reads up to (not including) any of `stop`, honoring `\`-escapes for
	/// the characters reflection names treat as structural (`+`, `` ` ``,
	/// `[`, `]`, `,`, `&`, `*`, `\`).
	fn read_identifier(&mut self, stop: &[u8]) -> ParseResult<String> {
		let mut out = String::new();
		while let Some(b) = self.peek() {
			if b == b'\\' {
				self.bump();
				match self.bump() {
					Some(escaped) => out.push(escaped as char),
					None => return Err(self.error("dangling escape at end of input")),
				}
				continue;
			}
			if stop.contains(&b) {
				break;
			}
			self.bump();
			out.push(b as char);
		}
		if out.is_empty() {
			return Err(self.error("expected an identifier"));
		}
		Ok(out)
	}

	fn parse_type(&mut self) -> ParseResult<ReflectionTypeName> {
		let qualified_outer = self.read_identifier(&[b'+', b'`', b'[', b']', b',', b'&', b'*'])?;
		let (namespace, outer_unqualified) = split_namespace(&qualified_outer);
		let mut segments = vec![outer_unqualified];

		while self.peek() == Some(b'+') {
			self.bump();
			let seg = self.read_identifier(&[b'+', b'`', b'[', b']', b',', b'&', b'*'])?;
			segments.push(seg);
		}

		let mut generic_arity = 0;
		if self.peek() == Some(b'`') {
			self.bump();
			let digits = self.read_digits()?;
			generic_arity = digits.parse().map_err(|_| self.error("malformed generic arity"))?;
		}

		let mut generic_args = Vec::new();
		let mut array_ranks = Vec::new();
		let mut pointer_depth = 0;
		let mut is_by_ref = false;

		if self.peek() == Some(b'[') {
			// Ambiguous production: `[[...]]` is a bound-generic-args list,
			// `[]`/`[,]`/`[*]` is an array-rank suffix. Disambiguate by
			// peeking one byte past the `[`.
			if self.bytes.get(self.pos + 1) == Some(&b'[') {
				generic_args = self.parse_generic_args()?;
			}
		}

		loop {
			match self.peek() {
				Some(b'[') if !is_by_ref => array_ranks.push(self.parse_array_rank()?),
				Some(b'*') if !is_by_ref => {
					self.bump();
					pointer_depth += 1;
				}
				Some(b'&') if !is_by_ref => {
					self.bump();
					is_by_ref = true;
				}
				Some(b @ (b'[' | b'*' | b'&')) => return Err(self.error(format!("`{}` suffix after `&`", b as char))),
				_ => break,
			}
		}

		let assembly = if self.peek() == Some(b',') {
			self.bump();
			while self.peek() == Some(b' ') {
				self.bump();
			}
			Some(self.read_identifier(&[b']'])?)
		} else {
			None
		};

		Ok(ReflectionTypeName { segments, namespace, generic_arity, generic_args, array_ranks, pointer_depth, is_by_ref, assembly })
	}

	fn read_digits(&mut self) -> ParseResult<String> {
		let mut out = String::new();
		while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
			out.push(self.bump().unwrap() as char);
		}
		if out.is_empty() {
			return Err(self.error("expected digits"));
		}
		Ok(out)
	}

	fn parse_generic_args(&mut self) -> ParseResult<Vec<ReflectionTypeName>> {
		self.expect(b'[')?;
		let mut args = Vec::new();
		loop {
			self.expect(b'[')?;
			args.push(self.parse_type()?);
			self.expect(b']')?;
			match self.peek() {
				Some(b',') => {
					self.bump();
				}
				Some(b']') => {
					self.bump();
					break;
				}
				_ => return Err(self.error("expected `,` or `]` in generic argument list")),
			}
		}
		Ok(args)
	}

	fn parse_array_rank(&mut self) -> ParseResult<u32> {
		self.expect(b'[')?;
		let mut rank = 1;
		while self.peek() == Some(b',') {
			self.bump();
			rank += 1;
		}
		if self.peek() == Some(b'*') {
			self.bump();
		}
		self.expect(b']')?;
		Ok(rank)
	}

	fn expect(&mut self, byte: u8) -> ParseResult<()> {
		match self.bump() {
			Some(b) if b == byte => Ok(()),
			_ => Err(self.error(format!("expected `{}`", byte as char))),
		}
	}
}

impl ReflectionTypeName {
	/// Renders the canonical reflection-format string this name parses back
	/// into. Nested generic arguments never carry their assembly qualifier
	/// (it's accepted on parse but not meaningful to the bound-args grammar,
	/// per the outer `Dictionary\`2[[K],[V]]` shape) — only the outermost
	/// name's own `assembly` is emitted.
	pub fn reflection_name(&self) -> String {
		self.format(true)
	}

	fn format(&self, include_assembly: bool) -> String {
		let mut out = String::new();
		if let Some(ns) = &self.namespace {
			out.push_str(ns);
			out.push('.');
		}
		out.push_str(&self.segments.join("+"));
		if self.generic_arity > 0 {
			out.push('`');
			out.push_str(&self.generic_arity.to_string());
		}
		if !self.generic_args.is_empty() {
			out.push('[');
			for (i, arg) in self.generic_args.iter().enumerate() {
				if i > 0 {
					out.push(',');
				}
				out.push('[');
				out.push_str(&arg.format(false));
				out.push(']');
			}
			out.push(']');
		}
		for rank in &self.array_ranks {
			out.push('[');
			out.push_str(&",".repeat((*rank as usize).saturating_sub(1)));
			out.push(']');
		}
		for _ in 0..self.pointer_depth {
			out.push('*');
		}
		if self.is_by_ref {
			out.push('&');
		}
		if include_assembly {
			if let Some(assembly) = &self.assembly {
				out.push_str(", ");
				out.push_str(assembly);
			}
		}
		out
	}
}

impl std::fmt::Display for ReflectionTypeName {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.reflection_name())
	}
}

fn split_namespace(qualified: &str) -> (Option<String>, String) {
	match qualified.rfind('.') {
		Some(idx) => (Some(qualified[..idx].to_string()), qualified[idx + 1..].to_string()),
		None => (None, qualified.to_string()),
	}
}

/// Parses a reflection-format type name. Returns an error rather than a
/// best-effort partial result on any malformed input — callers that want
/// leniency are expected to catch and fall back explicitly.
pub fn parse(input: &str) -> Result<ReflectionTypeName, DecompilerError> {
	let mut parser = Parser::new(input);
	let name = parser.parse_type()?;
	if parser.pos != parser.bytes.len() {
		return Err(parser.error("trailing input after type name"));
	}
	Ok(name)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_simple_name() {
		let parsed = parse("System.String").unwrap();
		assert_eq!(parsed.namespace.as_deref(), Some("System"));
		assert_eq!(parsed.segments, vec!["String"]);
	}

	#[test]
	fn parses_nested_type() {
		let parsed = parse("Namespace.Outer+Inner").unwrap();
		assert_eq!(parsed.namespace.as_deref(), Some("Namespace"));
		assert_eq!(parsed.segments, vec!["Outer", "Inner"]);
	}

	#[test]
	fn parses_generic_arity_without_args() {
		let parsed = parse("System.Collections.Generic.List`1").unwrap();
		assert_eq!(parsed.generic_arity, 1);
		assert!(parsed.generic_args.is_empty());
	}

	#[test]
	fn parses_bound_generic_args() {
		let parsed = parse("System.Collections.Generic.Dictionary`2[[System.String],[System.Int32]]").unwrap();
		assert_eq!(parsed.generic_arity, 2);
		assert_eq!(parsed.generic_args.len(), 2);
		assert_eq!(parsed.generic_args[0].segments, vec!["String"]);
		assert_eq!(parsed.generic_args[1].segments, vec!["Int32"]);
	}

	#[test]
	fn parses_array_and_byref_suffixes() {
		let parsed = parse("System.Int32[]&").unwrap();
		assert_eq!(parsed.array_ranks, vec![1]);
		assert!(parsed.is_by_ref);
	}

	#[test]
	fn rejects_suffix_after_byref() {
		assert!(parse("System.Int32&[]").is_err());
		assert!(parse("System.Int32&*").is_err());
		assert!(parse("System.Int32&&").is_err());
	}

	#[test]
	fn parses_multi_dimensional_array() {
		let parsed = parse("System.Int32[,,]").unwrap();
		assert_eq!(parsed.array_ranks, vec![3]);
	}

	#[test]
	fn parses_pointer_suffix() {
		let parsed = parse("System.Int32*").unwrap();
		assert_eq!(parsed.pointer_depth, 1);
	}

	#[test]
	fn parses_assembly_qualified_name() {
		let parsed = parse("System.Int32, mscorlib").unwrap();
		assert_eq!(parsed.assembly.as_deref(), Some("mscorlib"));
	}

	#[test]
	fn rejects_unterminated_generic_args() {
		assert!(parse("List`1[[System.String]").is_err());
	}

	#[test]
	fn rejects_dangling_escape() {
		assert!(parse("System.Foo\\").is_err());
	}

	#[test]
	fn generic_instance_canonicalizes_dropping_nested_assembly() {
		let parsed = parse("System.Action`1[[System.String, mscorlib]]").unwrap();
		assert_eq!(parsed.reflection_name(), "System.Action`1[[System.String]]");
	}

	#[test]
	fn round_trips_through_reflection_name() {
		for input in [
			"System.String",
			"Namespace.Outer+Inner",
			"System.Collections.Generic.List`1",
			"System.Collections.Generic.Dictionary`2[[System.String],[System.Int32]]",
			"System.Int32[]&",
			"System.Int32[,,]",
			"System.Int32*",
		] {
			let parsed = parse(input).unwrap();
			let reparsed = parse(&parsed.reflection_name()).unwrap();
			assert_eq!(parsed, reparsed);
		}
	}
}
