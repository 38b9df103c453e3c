//! The pipeline driver (§4.G): the fixed, declared order every transform
//! pass runs in, plus the driver loop in [`driver`] that walks that order
//! and the per-pass observability records in [`step`].

pub mod driver;
pub mod module;
pub mod settings;
pub mod step;

pub use driver::{run_pipeline, PipelineOutcome};
pub use settings::DecompilerSettings;
pub use step::{FailedStep, Step};

#[cfg(feature = "parallel")]
pub use module::run_pipeline_for_module_parallel;
pub use module::run_pipeline_for_module;

use crate::transforms::{
	async_await::AsyncAwaitTransform, delegate_construction::DelegateConstructionTransform, foreach::ForEachTransform,
	inlined_initializers::InlinedInitializersTransform, iterators::IteratorTransform, lock::LockTransform,
	null_propagation::NullPropagationTransform, string_concat::StringConcatTransform,
	switch_on_string::SwitchOnStringTransform, tuples::TupleTransform, using_statement::UsingStatementTransform,
	xmldoc::XmlDocTransform, Transform,
};

/// The declared pass order (§4.F "Ordering"). Block-local idioms that
/// don't depend on anything else recognized first (lock, using, string
/// switch), then the idioms built out of those ("higher-level" shapes are
/// recognized after their lower-level pieces are in their final homes —
/// `foreach` over an already-recognized `using`d enumerator, for
/// instance), then whole-function structural rewrites (iterators, async)
/// last since they restructure the entire body around a recovered state
/// machine. XML-doc attachment runs last: it only annotates, never
/// rewrites, so its position relative to everything else is immaterial,
/// but running it last means it sees the function's final shape.
pub fn default_passes() -> Vec<Box<dyn Transform>> {
	vec![
		Box::new(LockTransform),
		Box::new(UsingStatementTransform),
		Box::new(SwitchOnStringTransform),
		Box::new(ForEachTransform),
		Box::new(NullPropagationTransform),
		Box::new(StringConcatTransform),
		Box::new(TupleTransform),
		Box::new(DelegateConstructionTransform),
		Box::new(InlinedInitializersTransform),
		Box::new(IteratorTransform),
		Box::new(AsyncAwaitTransform),
		Box::new(XmlDocTransform),
	]
}
