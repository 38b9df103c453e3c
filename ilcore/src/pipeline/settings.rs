//! `DecompilerSettings` (§6): the named booleans gating every optional
//! recovery pass. A disabled recovery is a hard invariant, not a
//! suggestion — the surface output must then contain the equivalent
//! low-level construct, so every pass in [`crate::transforms`] checks its
//! own flag before touching the tree.

use crate::error::DecompilerError;

macro_rules! settings {
	($($field:ident: $default:expr => $name:literal),+ $(,)?) => {
		/// `#[serde(default)]` fills any field absent from a loaded TOML
		/// document from [`Default::default`] rather than erroring, so a
		/// settings file only needs to name the flags it wants to flip;
		/// `deny_unknown_fields` still rejects a typo'd or unrecognized key.
		#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
		#[serde(deny_unknown_fields, default)]
		pub struct DecompilerSettings {
			$(pub $field: bool,)+
		}

		impl Default for DecompilerSettings {
			fn default() -> Self {
				Self { $($field: $default,)+ }
			}
		}

		impl DecompilerSettings {
			/// Recognized setting names, for validating an externally loaded
			/// settings file before applying it.
			pub const NAMES: &'static [&'static str] = &[$($name),+];

			/// Applies `name = value`, rejecting anything not in [`Self::NAMES`]
			/// at load time rather than silently ignoring a typo.
			pub fn set(&mut self, name: &str, value: bool) -> Result<(), DecompilerError> {
				match name {
					$($name => { self.$field = value; Ok(()) })+
					_ => Err(DecompilerError::InvariantViolation(format!("unknown setting `{name}`"))),
				}
			}
		}
	};
}

settings! {
	lock_statement: true => "LockStatement",
	using_statement: true => "UsingStatement",
	switch_statement_on_string: true => "SwitchStatementOnString",
	for_each_statement: true => "ForEachStatement",
	null_propagation: true => "NullPropagation",
	iterators: true => "Iterators",
	async_await: true => "AsyncAwait",
	tuples: true => "Tuples",
	expand_member_definitions: false => "ExpandMemberDefinitions",
	show_debug_info: false => "ShowDebugInfo",
	show_xml_documentation: false => "ShowXmlDocumentation",
	hide_empty_metadata_tables: true => "HideEmptyMetadataTables",
}

impl DecompilerSettings {
	/// Loads a settings file in the field-name casing used by [`Self`]
	/// (`lock_statement`, not `LockStatement` — [`Self::NAMES`]/[`Self::set`]
	/// are for the PascalCase names §6 gives the settings, used when an
	/// embedder applies overrides one at a time rather than from a file).
	pub fn load_toml(document: &str) -> Result<Self, DecompilerError> {
		toml::from_str(document).map_err(|err| DecompilerError::InvariantViolation(format!("invalid settings document: {err}")))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_specification() {
		let settings = DecompilerSettings::default();
		assert!(settings.lock_statement);
		assert!(!settings.expand_member_definitions);
		assert!(!settings.show_debug_info);
		assert!(!settings.show_xml_documentation);
		assert!(settings.hide_empty_metadata_tables);
	}

	#[test]
	fn unknown_setting_is_rejected() {
		let mut settings = DecompilerSettings::default();
		assert!(settings.set("NotARealSetting", true).is_err());
	}

	#[test]
	fn known_setting_round_trips() {
		let mut settings = DecompilerSettings::default();
		settings.set("LockStatement", false).unwrap();
		assert!(!settings.lock_statement);
	}

	#[test]
	fn toml_document_overrides_only_named_fields() {
		let settings = DecompilerSettings::load_toml("lock_statement = false\ntuples = false\n").unwrap();
		assert!(!settings.lock_statement);
		assert!(!settings.tuples);
		assert!(settings.using_statement);
	}

	#[test]
	fn toml_document_rejects_unknown_field() {
		assert!(DecompilerSettings::load_toml("not_a_real_field = true\n").is_err());
	}
}
