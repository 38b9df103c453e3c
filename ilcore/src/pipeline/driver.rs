//! The pipeline driver (§4.G): runs a fixed ordered sequence of
//! [`Transform`] passes over one [`ILFunction`], re-running the ones
//! marked re-runnable to a local fixpoint, and turning a pass failure into
//! a per-method record instead of aborting the rest of the assembly.

use crate::cancellation::CancellationToken;
use crate::error::DecompilerError;
use crate::ilast::function::ILFunction;
use crate::pipeline::settings::DecompilerSettings;
use crate::pipeline::step::{FailedStep, Step};
use crate::transforms::Transform;

/// A cap on re-running one idempotent pass within a single driver
/// invocation — a bug that makes a pass keep reporting `changed = true`
/// forever should not hang the pipeline.
const MAX_RERUNS_PER_PASS: u32 = 16;

pub struct PipelineOutcome {
	pub steps: Vec<Step>,
	/// `Some` when a pass failed outright; the caller's per-method handling
	/// (emit a placeholder, keep going with the rest of the assembly) lives
	/// one layer up, outside this crate's scope.
	pub failure: Option<FailedStep>,
}

/// Runs `passes` over `function` in the given order. Each pass is first
/// run once; if [`Transform::idempotent_rerun`] returns `true` for it,
/// it's re-run immediately while it keeps reporting changes, up to
/// [`MAX_RERUNS_PER_PASS`].
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(method = %function.method.name)))]
pub fn run_pipeline<'l>(
	function: &mut ILFunction<'l>,
	settings: &DecompilerSettings,
	passes: &[Box<dyn Transform>],
	cancellation: Option<&CancellationToken>,
) -> PipelineOutcome {
	let mut steps = Vec::new();

	for pass in passes {
		let mut iteration = 0;
		loop {
			if let Some(token) = cancellation {
				if token.is_cancelled() {
					return PipelineOutcome {
						steps,
						failure: Some(FailedStep { pass: pass.name(), iteration, message: "cancelled".to_string() }),
					};
				}
			}

			match pass.run(function, settings) {
				Ok(changed) => {
					#[cfg(feature = "tracing")]
					tracing::debug!(pass = pass.name(), iteration, changed, "pipeline step");
					steps.push(Step { pass: pass.name(), iteration, changed });
					iteration += 1;
					if !changed || !pass.idempotent_rerun() || iteration >= MAX_RERUNS_PER_PASS {
						break;
					}
				}
				Err(err) => {
					#[cfg(feature = "tracing")]
					tracing::warn!(pass = pass.name(), iteration, error = %err, "pipeline step failed");
					return PipelineOutcome {
						steps,
						failure: Some(FailedStep { pass: pass.name(), iteration, message: format_error(&err) }),
					};
				}
			}
		}
	}

	PipelineOutcome { steps, failure: None }
}

fn format_error(err: &DecompilerError) -> String {
	err.to_string()
}
