//! Whole-module decompilation (§5 "may parallelize across methods"): run
//! [`run_pipeline`] over every method body in a module, fanning out across
//! a thread pool when the `parallel` feature is enabled.
//!
//! Each [`ILFunction`] owns its own arena and variable table, so methods
//! have no mutable state in common — only the type-system view they were
//! built against is shared, and it is already safe for concurrent readers
//! (§4.A). This module carries no synchronization of its own; it is purely
//! a fan-out convenience over [`run_pipeline`].

use crate::cancellation::CancellationToken;
use crate::ilast::function::ILFunction;
use crate::pipeline::driver::{run_pipeline, PipelineOutcome};
use crate::pipeline::settings::DecompilerSettings;
use crate::transforms::Transform;

/// Runs the given passes over every function, sequentially in order. The
/// baseline behavior with the `parallel` feature disabled — correct for a
/// single-method embedding, and the fallback this crate ships without
/// pulling in a thread pool nobody asked for.
pub fn run_pipeline_for_module<'l>(
	functions: &mut [ILFunction<'l>],
	settings: &DecompilerSettings,
	passes: &[Box<dyn Transform>],
	cancellation: Option<&CancellationToken>,
) -> Vec<PipelineOutcome> {
	functions.iter_mut().map(|function| run_pipeline(function, settings, passes, cancellation)).collect()
}

#[cfg(feature = "parallel")]
pub fn run_pipeline_for_module_parallel<'l>(
	functions: &mut [ILFunction<'l>],
	settings: &DecompilerSettings,
	passes: &[Box<dyn Transform>],
	cancellation: Option<&CancellationToken>,
) -> Vec<PipelineOutcome> {
	use rayon::prelude::*;

	functions.par_iter_mut().map(|function| run_pipeline(function, settings, passes, cancellation)).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::metadata::heaps::table::{MethodAttributes, MethodImplAttributes};
	use crate::pipeline::default_passes;
	use crate::typesystem::types::Class;
	use crate::typesystem::{Method, PrimitiveType, Type};

	fn leaked_method<'l>(name: &'l str) -> &'l Method<'l> {
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
			name,
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
	fn runs_every_function_independently() {
		let mut functions = vec![ILFunction::new(leaked_method("A")), ILFunction::new(leaked_method("B"))];
		let passes = default_passes();
		let outcomes = run_pipeline_for_module(&mut functions, &DecompilerSettings::default(), &passes, None);
		assert_eq!(outcomes.len(), 2);
		assert!(outcomes.iter().all(|outcome| outcome.failure.is_none()));
	}
}
