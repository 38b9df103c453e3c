//! `SimplifySwitchInstruction` (§4.E item 3): collapse sections that
//! target the same block, keep the label sets a disjoint partition, and
//! put the default section (the one with no explicit labels — the
//! fallthrough target of the CIL `switch` opcode) last.

use crate::ilast::arena::NodeId;
use crate::ilast::function::ILFunction;
use crate::ilast::instruction::{InstructionKind, SwitchSection};

/// Runs the normalization in place. Returns `false` (leaving the switch
/// untouched) if two sections disagree on the same label — a genuine
/// conflict the recognizer declines to paper over, per §4.F's "conflicts
/// abort the rewrite" rule for the idioms built on top of this.
pub fn simplify_switch<'l>(function: &mut ILFunction<'l>, switch: NodeId) -> bool {
	let InstructionKind::SwitchInstruction { sections, .. } = &function.node(switch).kind else {
		return false;
	};
	let sections = sections.clone();

	if !labels_form_a_partition(&sections) {
		return false;
	}

	let merged = merge_by_target(sections);
	let (mut non_default, default): (Vec<_>, Vec<_>) = merged.into_iter().partition(|s| !s.labels.is_empty());
	non_default.extend(default);

	if let InstructionKind::SwitchInstruction { sections, .. } = &mut function.arena_mut().get_mut(switch).kind {
		*sections = non_default;
	}
	true
}

/// Every explicit (non-default) label must appear in exactly one section.
fn labels_form_a_partition(sections: &[SwitchSection]) -> bool {
	let mut seen = std::collections::HashSet::new();
	for section in sections {
		for label in &section.labels {
			if !seen.insert(*label) {
				return false;
			}
		}
	}
	true
}

/// Collapses consecutive-or-not sections that share a `body` target into
/// one, unioning their label sets — `SimplifySwitchInstruction`'s
/// "collapse sections sharing a target" rule.
fn merge_by_target(sections: Vec<SwitchSection>) -> Vec<SwitchSection> {
	let mut merged: Vec<SwitchSection> = Vec::new();
	for section in sections {
		if let Some(existing) = merged.iter_mut().find(|s: &&mut SwitchSection| s.body == section.body) {
			existing.labels.extend(section.labels);
		} else {
			merged.push(section);
		}
	}
	merged
}
