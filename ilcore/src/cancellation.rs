//! Cooperative cancellation (§5): a flag polled at pass boundaries and at
//! each top-level block a long-running pass visits, never preempted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cheap to clone and share across the methods a whole-module run fans
/// out across; signaling one handle signals every clone.
#[derive(Clone, Default)]
pub struct CancellationToken {
	flag: Arc<AtomicBool>,
}

impl CancellationToken {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.flag.store(true, Ordering::Release);
	}

	pub fn is_cancelled(&self) -> bool {
		self.flag.load(Ordering::Acquire)
	}
}
