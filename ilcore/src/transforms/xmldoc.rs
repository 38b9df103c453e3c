//! XML-doc attachment's place in the pipeline.
//!
//! Attaching `<summary>`/`<param>` text pulled from a `.xml` documentation
//! file to the members referenced by a decompiled body is a presentation
//! concern the printer layer owns, not a tree rewrite: there is no node in
//! [`crate::ilast::instruction::InstructionKind`] a doc comment could attach
//! to without also meaning something to every other pass that walks the
//! tree. This pass is the documented no-op placeholder that keeps the
//! pipeline's fixed ordering (§4.G) accurate — it runs last, reports no
//! change, and the `show_xml_documentation` setting it would otherwise gate
//! is read only where the printer renders a member reference.

use crate::error::DecompilerError;
use crate::ilast::function::ILFunction;
use crate::pipeline::settings::DecompilerSettings;
use crate::transforms::Transform;

pub struct XmlDocTransform;

impl Transform for XmlDocTransform {
	fn name(&self) -> &'static str {
		"XmlDoc"
	}

	fn idempotent_rerun(&self) -> bool {
		true
	}

	fn run<'l>(&self, _function: &mut ILFunction<'l>, _settings: &DecompilerSettings) -> Result<bool, DecompilerError> {
		Ok(false)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::metadata::heaps::table::{MethodAttributes, MethodImplAttributes};
	use crate::typesystem::types::Class;
	use crate::typesystem::{Method, PrimitiveType, Type};

	fn leaked_method<'l>() -> &'l Method<'l> {
		let class: &'l Class<'l> = Box::leak(Box::new(Class {
			name: "C",
			namespace: "N",
			is_value_type: false,
			is_interface: false,
			is_sealed: false,
			is_abstract: false,
			generic_param_count: 0,
			base: std::cell::Cell::new(None),
			fields: std::cell::Cell::new(None),
			methods: std::cell::Cell::new(None),
		}));
		Box::leak(Box::new(Method {
			name: "M",
			declaring_type: class,
			return_type: Type::Primitive(PrimitiveType::Void),
			parameters: &[],
			attributes: MethodAttributes::empty(),
			impl_attributes: MethodImplAttributes::empty(),
			generic_param_count: 0,
			rva: 1,
		}))
	}

	#[test]
	fn never_reports_a_change() {
		let mut function = ILFunction::new(leaked_method());
		let changed = XmlDocTransform.run(&mut function, &DecompilerSettings::default()).unwrap();
		assert!(!changed);
	}
}
