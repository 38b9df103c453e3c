//! Transform passes (§4.F): independent rewriters, each recognizing one
//! compiler idiom and replacing it with its higher-level construct. Every
//! pass is gated by a setting and never mutates when its pattern doesn't
//! match exactly — a near-miss is left untouched rather than partially
//! rewritten.

pub mod async_await;
pub mod delegate_construction;
pub mod foreach;
pub mod inlined_initializers;
pub mod iterators;
pub mod lock;
pub mod null_propagation;
pub mod string_concat;
pub mod switch_on_string;
pub mod tuples;
pub mod using_statement;
pub(crate) mod well_known;
pub mod xmldoc;

use crate::error::DecompilerError;
use crate::ilast::function::ILFunction;
use crate::pipeline::settings::DecompilerSettings;

/// A single rewriter over a whole function body. `run` returns whether it
/// changed anything, which the driver in [`crate::pipeline::driver`] uses
/// to decide whether a re-runnable pass needs another pass.
pub trait Transform {
	fn name(&self) -> &'static str;

	/// Whether this pass is safe (and useful) to run again on its own
	/// output within the same pipeline pass of the fixpoint loop.
	fn idempotent_rerun(&self) -> bool {
		false
	}

	fn run<'l>(&self, function: &mut ILFunction<'l>, settings: &DecompilerSettings) -> Result<bool, DecompilerError>;
}
