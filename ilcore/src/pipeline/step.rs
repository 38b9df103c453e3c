//! Per-pass observability records (§4.F "the driver records, before each
//! pass, a step marker"). Consumed by the test suite and any debugging UI
//! outside this crate's scope.

/// One pass's entry in the driver's trace: which pass ran, on which
/// iteration of the fixpoint loop it was, and whether it actually changed
/// the tree.
#[derive(Debug, Clone)]
pub struct Step {
	pub pass: &'static str,
	pub iteration: u32,
	pub changed: bool,
}

/// Recorded when a pass fails outright (as opposed to simply not
/// matching) — the driver's "which pass + which block triggered the
/// failure" diagnostic (§4.F).
#[derive(Debug, Clone)]
pub struct FailedStep {
	pub pass: &'static str,
	pub iteration: u32,
	pub message: String,
}
