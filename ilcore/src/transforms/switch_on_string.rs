//! Switch-on-string recovery (§4.F): four compiler shapes collapsed to a
//! single `SwitchInstruction` over a synthesized `StringToInt` dispatch
//! key. Recognizers run in order of how much of the method they need to
//! see: the single-block cascading-ifs shape first, then the two
//! multi-block lazy-table shapes, then the Roslyn hash-switch shape (which
//! is itself a `SwitchInstruction` already, just keyed on a hash instead of
//! an ordinal).
//!
//! Every shape's precondition set ends with the same check: the observed
//! `(literal, target)` pairs must form a function (no literal mapping to
//! two different targets) and the label set covering `0..literals.len()`
//! must be a disjoint partition once merged with the default — the same
//! property `crate::cfg::switches::simplify_switch` enforces on every
//! other switch source.

use std::collections::HashMap;

use crate::error::DecompilerError;
use crate::ilast::arena::NodeId;
use crate::ilast::function::ILFunction;
use crate::ilast::instruction::{InstructionKind, SwitchSection};
use crate::ilast::mutate;
use crate::ilast::variable::VariableId;
use crate::matchers::{match_branch, match_comp_equals, match_if_instruction, match_ld_loc, match_ld_str, match_ldc_i4, match_ld_loca};
use crate::pipeline::settings::DecompilerSettings;
use crate::transforms::well_known::{is_compute_string_hash, is_dictionary_add, is_dictionary_try_get_value, is_hashtable_add, is_hashtable_get_item, is_string_equality};
use crate::transforms::Transform;

pub struct SwitchOnStringTransform;

impl Transform for SwitchOnStringTransform {
	fn name(&self) -> &'static str {
		"SwitchStatementOnString"
	}

	fn idempotent_rerun(&self) -> bool {
		true
	}

	fn run<'l>(&self, function: &mut ILFunction<'l>, settings: &DecompilerSettings) -> Result<bool, DecompilerError> {
		if !settings.switch_statement_on_string {
			return Ok(false);
		}

		let blocks: Vec<_> = function.arena().iter().filter(|(_, node)| matches!(node.kind, InstructionKind::Block { .. })).map(|(id, _)| id).collect();

		for block in &blocks {
			if try_cascading_ifs(function, *block)? {
				return Ok(true);
			}
		}
		for block in &blocks {
			if try_dictionary(function, *block)? {
				return Ok(true);
			}
		}
		for block in &blocks {
			if try_hashtable(function, *block)? {
				return Ok(true);
			}
		}

		let switches: Vec<_> = function.arena().iter().filter(|(_, node)| matches!(node.kind, InstructionKind::SwitchInstruction { .. })).map(|(id, _)| id).collect();
		for switch_node in switches {
			if try_roslyn_hash_switch(function, switch_node)? {
				return Ok(true);
			}
		}

		Ok(false)
	}
}

/// A chain of `if (string.op_Equality(v, "lit")) goto caseN;` tests
/// against the same variable, immediately one after another at the top
/// of `block`. Fires only with at least three cases (§4.F).
fn try_cascading_ifs<'l>(function: &mut ILFunction<'l>, block: NodeId) -> Result<bool, DecompilerError> {
	let InstructionKind::Block { instructions, .. } = &function.node(block).kind else { return Ok(false) };
	let instructions = instructions.clone();

	// The run of recognizable `if (v == "lit") goto target;` tests starts at
	// the top of the block; the first instruction that doesn't fit the shape
	// (the block's terminator, almost always a single unconditional branch)
	// ends the run and becomes the default arm.
	let mut switch_var: Option<VariableId> = None;
	let mut pairs: Vec<(String, NodeId)> = Vec::new();
	let mut run_len = 0usize;

	for &instruction in &instructions {
		let Some((var, literal, target)) = match_string_equality_if(function, instruction) else { break };
		if let Some(expected) = switch_var {
			if expected != var {
				break;
			}
		} else {
			switch_var = Some(var);
		}
		pairs.push((literal, target));
		run_len += 1;
	}

	if pairs.len() < 3 {
		return Ok(false);
	}
	let Some(switch_var) = switch_var else { return Ok(false) };

	// Disambiguate duplicates: a literal appearing twice with different
	// targets means the chain isn't a clean function and we bail.
	let mut seen: HashMap<String, NodeId> = HashMap::new();
	for (literal, target) in &pairs {
		if let Some(existing) = seen.get(literal) {
			if existing != target {
				return Ok(false);
			}
		} else {
			seen.insert(literal.clone(), *target);
		}
	}

	let literals: Vec<String> = {
		let mut out = Vec::new();
		for (l, _) in &pairs {
			if !out.contains(l) {
				out.push(l.clone());
			}
		}
		out
	};

	let mut sections: Vec<SwitchSection> = Vec::new();
	for (index, literal) in literals.iter().enumerate() {
		let target = pairs.iter().find(|(l, _)| l == literal).unwrap().1;
		let body = mutate::extract_child(function, find_parent_if(function, &instructions[..run_len], target)?, target)?;
		sections.push(SwitchSection { labels: vec![index as i64], body });
	}

	let default_label = literals.len() as i64;
	let (default_body, default_placeholder) = match instructions.get(run_len).copied() {
		Some(tail) => {
			let extracted = mutate::extract_child(function, block, tail)?;
			let InstructionKind::Block { instructions: current, .. } = &function.node(block).kind else {
				unreachable!("block stays a Block across extract_child")
			};
			let placeholder = current[run_len];
			let wrapped = function.insert_node(InstructionKind::Block { instructions: vec![extracted], incoming_edge_count: 1 });
			(wrapped, Some(placeholder))
		}
		None => (function.insert_node(InstructionKind::Block { instructions: Vec::new(), incoming_edge_count: 1 }), None),
	};
	sections.push(SwitchSection { labels: vec![default_label], body: default_body });

	let value = function.insert_node(InstructionKind::LdLoc(switch_var));
	let key = function.insert_node(InstructionKind::StringToInt { value, literals });
	let switch_node = function.insert_node(InstructionKind::SwitchInstruction { value: key, sections });

	let first_if = instructions[0];
	mutate::replace_child(function, block, first_if, switch_node)?;
	for &instruction in &instructions[1..run_len] {
		mutate::remove_subtree(function, instruction)?;
	}
	if let Some(placeholder) = default_placeholder {
		mutate::remove_subtree(function, placeholder)?;
	}

	Ok(true)
}

/// `Dictionary<string,int>`-backed dispatch: a lazy `if (field == null) {
/// field = new Dictionary<string,int>(); field.Add("lit", 0); ... }`
/// immediately followed by `if (field.TryGetValue(v, out num)) { switch
/// (num) {...} } else { <default> }`. The dictionary's instance isn't
/// re-verified against the lazily-initialized field identity (a
/// lazy-init block and lookup block may legitimately reference the
/// dictionary through different temporaries the compiler introduced);
/// only the `Add` calls' literal/ordinal pairs and the lookup's `out`
/// variable are load-bearing.
fn try_dictionary<'l>(function: &mut ILFunction<'l>, block: NodeId) -> Result<bool, DecompilerError> {
	let InstructionKind::Block { instructions, .. } = &function.node(block).kind else { return Ok(false) };
	let instructions = instructions.clone();

	for i in 0..instructions.len().saturating_sub(1) {
		if try_dictionary_at(function, block, &instructions, i)? {
			return Ok(true);
		}
	}
	Ok(false)
}

fn try_dictionary_at<'l>(function: &mut ILFunction<'l>, block: NodeId, instructions: &[NodeId], i: usize) -> Result<bool, DecompilerError> {
	let init_if = instructions[i];
	let lookup_if = instructions[i + 1];

	let Some(init_block) = null_guarded_init_block(function, init_if) else { return Ok(false) };
	let InstructionKind::Block { instructions: init_instructions, .. } = &function.node(init_block).kind else { return Ok(false) };
	let Some(literal_pairs) = collect_literal_map(function, init_instructions, false) else { return Ok(false) };

	let InstructionKind::IfInstruction { condition, true_branch, false_branch } = &function.node(lookup_if).kind else { return Ok(false) };
	let (condition, true_branch, false_branch) = (*condition, *true_branch, *false_branch);
	let Some(default_body) = false_branch else { return Ok(false) };

	let InstructionKind::Call { method, args, .. } = &function.node(condition).kind else { return Ok(false) };
	if !is_dictionary_try_get_value(method) || args.len() != 3 {
		return Ok(false);
	}
	let mut key_var = VariableId::from_raw(0);
	if !match_ld_loc(function, args[1], &mut key_var) {
		return Ok(false);
	}
	let mut out_var = VariableId::from_raw(0);
	if !match_ld_loca(function, args[2], &mut out_var) {
		return Ok(false);
	}

	let InstructionKind::Block { instructions: true_instructions, .. } = &function.node(true_branch).kind else { return Ok(false) };
	let [inner_switch] = true_instructions.as_slice() else { return Ok(false) };
	let inner_switch = *inner_switch;
	let InstructionKind::SwitchInstruction { value: switch_value, sections: inner_sections } = &function.node(inner_switch).kind else { return Ok(false) };
	let (switch_value, inner_sections) = (*switch_value, inner_sections.clone());
	let mut switch_key_var = VariableId::from_raw(0);
	if !match_ld_loc(function, switch_value, &mut switch_key_var) || switch_key_var != out_var {
		return Ok(false);
	}

	let Some((literals, sections)) = build_sections_from_ordinals(&literal_pairs, &inner_sections) else { return Ok(false) };

	let default_target = mutate::extract_child(function, lookup_if, default_body)?;
	let mut final_sections = build_final_sections(function, inner_switch, &sections)?;
	final_sections.push(SwitchSection { labels: vec![literals.len() as i64], body: default_target });

	let new_value = function.insert_node(InstructionKind::LdLoc(key_var));
	let key = function.insert_node(InstructionKind::StringToInt { value: new_value, literals });
	let switch_node = function.insert_node(InstructionKind::SwitchInstruction { value: key, sections: final_sections });

	mutate::replace_child(function, block, init_if, switch_node)?;
	mutate::discard(function, init_if);
	mutate::remove_subtree(function, lookup_if)?;
	Ok(true)
}

/// Legacy `Hashtable`-backed dispatch: the same lazy-init shape as
/// [`try_dictionary`], but the lookup is `stloc boxed(get_Item(field, v));
/// if (boxed == null) goto default; stloc num(Unbox<int>(boxed)); switch
/// (num) {...}` — `get_Item` returns a boxed `object`, so the null check
/// and unboxing are explicit instructions rather than `TryGetValue`'s
/// single bool test.
fn try_hashtable<'l>(function: &mut ILFunction<'l>, block: NodeId) -> Result<bool, DecompilerError> {
	let InstructionKind::Block { instructions, .. } = &function.node(block).kind else { return Ok(false) };
	let instructions = instructions.clone();

	for i in 0..instructions.len().saturating_sub(4) {
		if try_hashtable_at(function, block, &instructions, i)? {
			return Ok(true);
		}
	}
	Ok(false)
}

fn try_hashtable_at<'l>(function: &mut ILFunction<'l>, block: NodeId, instructions: &[NodeId], i: usize) -> Result<bool, DecompilerError> {
	let init_if = instructions[i];
	let (boxed_stloc, null_check_if, num_stloc, switch_node) = (instructions[i + 1], instructions[i + 2], instructions[i + 3], instructions[i + 4]);

	let Some(init_block) = null_guarded_init_block(function, init_if) else { return Ok(false) };
	let InstructionKind::Block { instructions: init_instructions, .. } = &function.node(init_block).kind else { return Ok(false) };
	let Some(literal_pairs) = collect_literal_map(function, init_instructions, true) else { return Ok(false) };

	let mut boxed_var = VariableId::from_raw(0);
	let mut get_item_call = boxed_stloc;
	if !crate::matchers::match_st_loc(function, boxed_stloc, &mut boxed_var, &mut get_item_call) {
		return Ok(false);
	}
	let InstructionKind::Call { method, args, .. } = &function.node(get_item_call).kind else { return Ok(false) };
	if !is_hashtable_get_item(method) || args.len() != 2 {
		return Ok(false);
	}
	let mut key_var = VariableId::from_raw(0);
	if !match_ld_loc(function, args[1], &mut key_var) {
		return Ok(false);
	}

	let InstructionKind::IfInstruction { condition, true_branch: default_target, false_branch: None } = &function.node(null_check_if).kind else { return Ok(false) };
	let (condition, default_target) = (*condition, *default_target);
	let mut cond_left = condition;
	let mut cond_right = condition;
	if !match_comp_equals(function, condition, &mut cond_left, &mut cond_right) {
		return Ok(false);
	}
	let (boxed_side, null_side) = if matches!(function.node(cond_right).kind, InstructionKind::LdNull) { (cond_left, cond_right) } else { (cond_right, cond_left) };
	if !matches!(function.node(null_side).kind, InstructionKind::LdNull) {
		return Ok(false);
	}
	let mut boxed_cond_var = VariableId::from_raw(0);
	if !match_ld_loc(function, boxed_side, &mut boxed_cond_var) || boxed_cond_var != boxed_var {
		return Ok(false);
	}

	let mut num_var = VariableId::from_raw(0);
	let mut unbox_node = num_stloc;
	if !crate::matchers::match_st_loc(function, num_stloc, &mut num_var, &mut unbox_node) {
		return Ok(false);
	}
	let InstructionKind::Unbox { value: unboxed_value, .. } = &function.node(unbox_node).kind else { return Ok(false) };
	let mut unboxed_var = VariableId::from_raw(0);
	if !match_ld_loc(function, *unboxed_value, &mut unboxed_var) || unboxed_var != boxed_var {
		return Ok(false);
	}

	let InstructionKind::SwitchInstruction { value: switch_value, sections: inner_sections } = &function.node(switch_node).kind else { return Ok(false) };
	let (switch_value, inner_sections) = (*switch_value, inner_sections.clone());
	let mut switch_key_var = VariableId::from_raw(0);
	if !match_ld_loc(function, switch_value, &mut switch_key_var) || switch_key_var != num_var {
		return Ok(false);
	}

	let Some((literals, sections)) = build_sections_from_ordinals(&literal_pairs, &inner_sections) else { return Ok(false) };

	let default_target = mutate::extract_child(function, null_check_if, default_target)?;
	let mut final_sections = build_final_sections(function, switch_node, &sections)?;
	final_sections.push(SwitchSection { labels: vec![literals.len() as i64], body: default_target });

	let new_value = function.insert_node(InstructionKind::LdLoc(key_var));
	let key = function.insert_node(InstructionKind::StringToInt { value: new_value, literals });
	let new_switch = function.insert_node(InstructionKind::SwitchInstruction { value: key, sections: final_sections });

	mutate::replace_child(function, block, init_if, new_switch)?;
	mutate::discard(function, init_if);
	mutate::remove_subtree(function, boxed_stloc)?;
	mutate::remove_subtree(function, null_check_if)?;
	mutate::remove_subtree(function, num_stloc)?;
	mutate::remove_subtree(function, switch_node)?;
	Ok(true)
}

/// `if (field == null) { init }`, no else. Returns the init (true) block.
fn null_guarded_init_block<'l>(function: &ILFunction<'l>, if_node: NodeId) -> Option<NodeId> {
	let mut condition = if_node;
	let mut true_branch = if_node;
	if !match_if_instruction(function, if_node, &mut condition, &mut true_branch) {
		return None;
	}
	let mut left = condition;
	let mut right = condition;
	if !match_comp_equals(function, condition, &mut left, &mut right) {
		return None;
	}
	let (field_side, null_side) = if matches!(function.node(right).kind, InstructionKind::LdNull) { (left, right) } else { (right, left) };
	if !matches!(function.node(null_side).kind, InstructionKind::LdNull) {
		return None;
	}
	if !matches!(function.node(field_side).kind, InstructionKind::LdsFld { .. }) {
		return None;
	}
	Some(true_branch)
}

/// Scans `instructions` for `Add("lit", value)` calls and returns each
/// `(literal, ordinal)` pair, `value` read as a boxed `LdcI4` for
/// `hashtable` or a bare `LdcI4` for a generic dictionary. `None` if no
/// `Add` call is found or one doesn't fit the expected shape.
fn collect_literal_map<'l>(function: &ILFunction<'l>, instructions: &[NodeId], hashtable: bool) -> Option<Vec<(String, i64)>> {
	let mut pairs = Vec::new();
	for &instr in instructions {
		let InstructionKind::Call { method, args, .. } = &function.node(instr).kind else { continue };
		let is_add = if hashtable { is_hashtable_add(method) } else { is_dictionary_add(method) };
		if !is_add {
			continue;
		}
		if args.len() != 3 {
			return None;
		}
		let mut literal = String::new();
		if !match_ld_str(function, args[1], &mut literal) {
			return None;
		}
		let ordinal = if hashtable {
			let InstructionKind::Box { value, .. } = &function.node(args[2]).kind else { return None };
			let mut n = 0i32;
			if !match_ldc_i4(function, *value, &mut n) {
				return None;
			}
			n as i64
		} else {
			let mut n = 0i32;
			if !match_ldc_i4(function, args[2], &mut n) {
				return None;
			}
			n as i64
		};
		pairs.push((literal, ordinal));
	}
	(!pairs.is_empty()).then_some(pairs)
}

/// Re-indexes `inner_sections`' ordinal labels against `literal_pairs`
/// (ordinal → literal), producing the ordered `literals` list and, for
/// each non-default section, the set of `literals` indices that dispatch
/// to it. `None` if a label has no matching literal or the mapping isn't
/// a function (two different bodies claiming the same ordinal).
fn build_sections_from_ordinals(literal_pairs: &[(String, i64)], inner_sections: &[SwitchSection]) -> Option<(Vec<String>, Vec<(Vec<i64>, NodeId)>)> {
	let mut literals: Vec<String> = Vec::new();
	let mut sections: Vec<(Vec<i64>, NodeId)> = Vec::new();

	for section in inner_sections {
		if section.labels.is_empty() {
			continue;
		}
		let mut indices = Vec::new();
		for label in &section.labels {
			let (literal, _) = literal_pairs.iter().find(|(_, n)| *n == *label)?;
			let index = match literals.iter().position(|l| l == literal) {
				Some(index) => index,
				None => {
					literals.push(literal.clone());
					literals.len() - 1
				}
			};
			indices.push(index as i64);
		}
		sections.push((indices, section.body));
	}

	let mut seen = std::collections::HashSet::new();
	for (indices, _) in &sections {
		for index in indices {
			if !seen.insert(*index) {
				return None;
			}
		}
	}

	Some((literals, sections))
}

/// Extracts each section's body out from under `owner` (the switch node
/// that still owns them) and returns the corresponding [`SwitchSection`]s,
/// ready to be spliced into the replacement switch.
fn build_final_sections<'l>(function: &mut ILFunction<'l>, owner: NodeId, sections: &[(Vec<i64>, NodeId)]) -> Result<Vec<SwitchSection>, DecompilerError> {
	let mut out = Vec::with_capacity(sections.len());
	for (labels, body) in sections {
		let extracted = mutate::extract_child(function, owner, *body)?;
		out.push(SwitchSection { labels: labels.clone(), body: extracted });
	}
	Ok(out)
}

/// Roslyn's `ComputeStringHash(s)`-keyed dispatch: an int `SwitchInstruction`
/// whose sections each run a short chain of `if (s == "lit") goto caseN;`
/// tests against the original string (resolving hash collisions within a
/// bucket), falling through to the default section when none match.
fn try_roslyn_hash_switch<'l>(function: &mut ILFunction<'l>, switch_node: NodeId) -> Result<bool, DecompilerError> {
	let InstructionKind::SwitchInstruction { value, sections } = &function.node(switch_node).kind else { return Ok(false) };
	let (value, sections) = (*value, sections.clone());

	let InstructionKind::Call { method, args, .. } = &function.node(value).kind else { return Ok(false) };
	if !is_compute_string_hash(method) || args.len() != 1 {
		return Ok(false);
	}
	let mut switch_var = VariableId::from_raw(0);
	if !match_ld_loc(function, args[0], &mut switch_var) {
		return Ok(false);
	}

	let mut pairs: Vec<(String, NodeId)> = Vec::new();
	let mut default_section_index = None;
	for (index, section) in sections.iter().enumerate() {
		if section.labels.is_empty() {
			default_section_index = Some(index);
			continue;
		}
		let InstructionKind::Block { instructions: bucket_instructions, .. } = &function.node(section.body).kind else { return Ok(false) };
		let mut found_any = false;
		for &instr in bucket_instructions {
			let Some((var, literal, target)) = match_string_equality_if(function, instr) else { continue };
			if var != switch_var {
				return Ok(false);
			}
			pairs.push((literal, target));
			found_any = true;
		}
		if !found_any {
			return Ok(false);
		}
	}
	let Some(default_section_index) = default_section_index else { return Ok(false) };
	if pairs.len() < 3 {
		return Ok(false);
	}

	let mut seen: HashMap<String, NodeId> = HashMap::new();
	for (literal, target) in &pairs {
		if let Some(existing) = seen.get(literal) {
			if existing != target {
				return Ok(false);
			}
		} else {
			seen.insert(literal.clone(), *target);
		}
	}

	let literals: Vec<String> = {
		let mut order: Vec<&String> = Vec::new();
		for (l, _) in &pairs {
			if !order.contains(&l) {
				order.push(l);
			}
		}
		order.into_iter().cloned().collect()
	};

	let mut new_sections: Vec<SwitchSection> = Vec::new();
	for (index, literal) in literals.iter().enumerate() {
		let target = pairs.iter().find(|(l, _)| l == literal).unwrap().1;
		let owning_if = find_owning_if_in_sections(function, &sections, target)?;
		let body = mutate::extract_child(function, owning_if, target)?;
		new_sections.push(SwitchSection { labels: vec![index as i64], body });
	}
	let default_body = mutate::extract_child(function, switch_node, sections[default_section_index].body)?;
	new_sections.push(SwitchSection { labels: vec![literals.len() as i64], body: default_body });

	let new_value = function.insert_node(InstructionKind::LdLoc(switch_var));
	let key = function.insert_node(InstructionKind::StringToInt { value: new_value, literals });
	let new_switch = function.insert_node(InstructionKind::SwitchInstruction { value: key, sections: new_sections });

	let parent = function.node(switch_node).parent.ok_or_else(|| DecompilerError::InvariantViolation("switch-on-string: hash switch has no parent".into()))?;
	mutate::replace_child(function, parent, switch_node, new_switch)?;
	mutate::discard(function, switch_node);
	Ok(true)
}

/// Walks every non-default section's body block looking for the `if`
/// that owns `target` as its true-branch — the hash-switch analogue of
/// [`find_parent_if`], scoped to a whole switch's sections instead of a
/// single block's instruction run.
fn find_owning_if_in_sections<'l>(function: &ILFunction<'l>, sections: &[SwitchSection], target: NodeId) -> Result<NodeId, DecompilerError> {
	for section in sections {
		if section.labels.is_empty() {
			continue;
		}
		let InstructionKind::Block { instructions, .. } = &function.node(section.body).kind else { continue };
		if let Ok(owning) = find_parent_if(function, instructions, target) {
			return Ok(owning);
		}
	}
	Err(DecompilerError::InvariantViolation("switch-on-string: hash switch case target has no owning if".into()))
}

/// Each case's target lived as the true-branch of its own `if`; by the
/// time we extract it we've already discarded the wrapping `if`'s
/// identity, so walk the (still-intact) original instruction slice to
/// find which `if` owned this particular target block.
fn find_parent_if<'l>(function: &ILFunction<'l>, candidates: &[NodeId], target: NodeId) -> Result<NodeId, DecompilerError> {
	for &candidate in candidates {
		let mut condition = candidate;
		let mut true_branch = candidate;
		if match_if_instruction(function, candidate, &mut condition, &mut true_branch) && true_branch == target {
			return Ok(candidate);
		}
	}
	Err(DecompilerError::InvariantViolation("switch-on-string: case target has no owning if".into()))
}

fn match_string_equality_if<'l>(function: &ILFunction<'l>, node: NodeId) -> Option<(VariableId, String, NodeId)> {
	let mut condition = node;
	let mut true_branch = node;
	if !match_if_instruction(function, node, &mut condition, &mut true_branch) {
		return None;
	}
	let mut left = condition;
	let mut right = condition;
	if !match_comp_equals(function, condition, &mut left, &mut right) {
		return None;
	}
	let InstructionKind::Call { method, args, .. } = &function.node(left).kind else { return None };
	if !is_string_equality(method) || args.len() != 2 {
		return None;
	}
	let (arg0, arg1) = (args[0], args[1]);
	let _ = right;

	let mut var = VariableId::from_raw(0);
	let mut literal = String::new();
	let (var, literal) = if match_ld_loc(function, arg0, &mut var) && match_ld_str(function, arg1, &mut literal) {
		(var, literal)
	} else if match_ld_loc(function, arg1, &mut var) && match_ld_str(function, arg0, &mut literal) {
		(var, literal)
	} else {
		return None;
	};

	let InstructionKind::Block { instructions, .. } = &function.node(true_branch).kind else { return None };
	let [only] = instructions.as_slice() else { return None };
	let mut branch_target = *only;
	if !match_branch(function, *only, &mut branch_target) {
		return None;
	}

	Some((var, literal, true_branch))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ilast::function::ILFunction;
	use crate::ilast::variable::VariableKind;
	use crate::metadata::heaps::table::{MethodAttributes, MethodImplAttributes};
	use crate::typesystem::types::Class;
	use crate::typesystem::{Method, Parameter, PrimitiveType, Type};

	#[test]
	fn duplicate_literal_with_same_target_is_not_a_conflict() {
		let mut seen: HashMap<String, NodeId> = HashMap::new();
		seen.insert("A".into(), NodeId::from_raw(1));
		assert_eq!(seen.get("A").copied(), Some(NodeId::from_raw(1)));
	}

	fn make_class<'l>(namespace: &'l str, name: &'l str) -> Class<'l> {
		Class {
			name,
			namespace,
			is_value_type: false,
			is_interface: false,
			is_sealed: false,
			is_abstract: false,
			generic_param_count: 0,
			base: std::cell::Cell::new(None),
			fields: std::cell::Cell::new(None),
			methods: std::cell::Cell::new(None),
		}
	}

	fn make_method<'l>(name: &'l str, declaring_type: &'l Class<'l>, param_types: &[PrimitiveType]) -> Method<'l> {
		let params: Vec<Parameter<'l>> = param_types
			.iter()
			.enumerate()
			.map(|(i, ty)| Parameter { name: "a", parameter_type: Type::Primitive(*ty), attributes: Default::default(), sequence: i as u16 + 1 })
			.collect();
		let params: &'l [Parameter<'l>] = Box::leak(params.into_boxed_slice());
		Method {
			name,
			declaring_type,
			return_type: Type::Primitive(PrimitiveType::Boolean),
			parameters: params,
			attributes: MethodAttributes::STATIC,
			impl_attributes: MethodImplAttributes::empty(),
			generic_param_count: 0,
			rva: 1,
		}
	}

	fn function_entry_block<'l>(function: &ILFunction<'l>) -> NodeId {
		let InstructionKind::BlockContainer { entry_point, .. } = &function.node(function.root).kind else { panic!("root not a container") };
		*entry_point
	}

	/// `if (v == "a") goto A; if (v == "b") goto B; if (v == "c") goto C;`
	/// at the tail of the entry block, falling through to a default goto
	/// afterwards. Asserts the run collapses to a single `SwitchInstruction`
	/// keyed on a `StringToInt(v, ["a", "b", "c"])`.
	#[test]
	fn recognizes_cascading_string_switch() {
		let string_class = Box::leak(Box::new(make_class("System", "String")));
		let op_equality = Box::leak(Box::new(make_method("op_Equality", string_class, &[PrimitiveType::String, PrimitiveType::String])));
		let foo_class = Box::leak(Box::new(make_class("N", "C")));
		let foo = Box::leak(Box::new(make_method("Foo", foo_class, &[])));

		let mut function = ILFunction::new(foo);
		let v = function.declare_variable(VariableKind::Local, Type::Primitive(PrimitiveType::String));
		let root = function.root;

		let mut case_wrappers = Vec::new();
		let mut if_nodes = Vec::new();
		for literal in ["a", "b", "c"] {
			let target_block = function.insert_node(InstructionKind::Block { instructions: Vec::new(), incoming_edge_count: 1 });
			let branch = function.insert_node(InstructionKind::Branch { target: target_block });
			let true_branch = function.insert_node(InstructionKind::Block { instructions: vec![branch], incoming_edge_count: 1 });

			let ld_v = function.insert_node(InstructionKind::LdLoc(v));
			let ld_lit = function.insert_node(InstructionKind::LdStr(literal.to_string()));
			let call = function.insert_node(InstructionKind::Call { method: op_equality, is_virtual: false, args: vec![ld_v, ld_lit] });
			let ld_true = function.insert_node(InstructionKind::LdcI4(1));
			let condition = function.insert_node(InstructionKind::CompEquals { left: call, right: ld_true });
			let if_node = function.insert_node(InstructionKind::IfInstruction { condition, true_branch, false_branch: None });

			case_wrappers.push(true_branch);
			if_nodes.push(if_node);
		}

		let default_branch = function.insert_node(InstructionKind::Leave { container: root, value: None });
		let mut entry_instructions = if_nodes.clone();
		entry_instructions.push(default_branch);
		for node in &entry_instructions {
			mutate::append_to_block(&mut function, function_entry_block(&function), *node).unwrap();
		}

		let changed = SwitchOnStringTransform.run(&mut function, &DecompilerSettings::default()).unwrap();
		assert!(changed);

		let InstructionKind::Block { instructions, .. } = &function.node(function_entry_block(&function)).kind else { panic!("entry not a block") };
		assert_eq!(instructions.len(), 1);
		let InstructionKind::SwitchInstruction { value, sections } = &function.node(instructions[0]).kind else { panic!("expected SwitchInstruction") };
		let InstructionKind::StringToInt { literals, .. } = &function.node(*value).kind else { panic!("expected StringToInt key") };
		assert_eq!(literals, &vec!["a".to_string(), "b".to_string(), "c".to_string()]);
		assert_eq!(sections.len(), 4);
		assert_eq!(sections[3].labels, vec![3]);
		for (index, wrapper) in case_wrappers.iter().enumerate() {
			assert_eq!(sections[index].body, *wrapper);
		}
	}
}
