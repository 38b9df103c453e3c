//! Generic substitution modeled as a plain value threaded through
//! resolution calls, rather than mutated onto the `Type`/`Method` graph
//! itself — the same generic `List<T>` method is resolved once and reused
//! under every instantiation, with the instantiation supplied at the call
//! site instead of baked into a cloned copy of the member.

use crate::typesystem::context::Context;
use crate::typesystem::types::Type;

/// The type arguments in scope while resolving a member reference:
/// `class_args[i]` replaces `Type::GenericTypeParam { index: i, .. }`,
/// `method_args[i]` replaces `Type::GenericMethodParam { index: i, .. }`.
#[derive(Copy, Clone)]
pub struct GenericContext<'l> {
	pub class_args: &'l [Type<'l>],
	pub method_args: &'l [Type<'l>],
}

impl<'l> GenericContext<'l> {
	pub fn empty() -> Self {
		Self { class_args: &[], method_args: &[] }
	}

	pub fn substitute(&self, ctx: &Context<'l>, ty: &Type<'l>) -> Type<'l> {
		match ty {
			Type::GenericTypeParam { index, .. } => {
				self.class_args.get(*index as usize).copied().unwrap_or(*ty)
			}
			Type::GenericMethodParam { index, .. } => {
				self.method_args.get(*index as usize).copied().unwrap_or(*ty)
			}
			Type::SzArray(element) => {
				let substituted = self.substitute(ctx, element);
				Type::SzArray(ctx.bump().alloc(substituted))
			}
			Type::Array { element, rank } => {
				let substituted = self.substitute(ctx, element);
				Type::Array { element: ctx.bump().alloc(substituted), rank: *rank }
			}
			Type::Pointer(Some(inner)) => {
				let substituted = self.substitute(ctx, inner);
				Type::Pointer(Some(ctx.bump().alloc(substituted)))
			}
			Type::ByRef(inner) => {
				let substituted = self.substitute(ctx, inner);
				Type::ByRef(ctx.bump().alloc(substituted))
			}
			Type::GenericInstance { generic, args } => {
				let substituted: Vec<Type<'l>> = args.iter().map(|a| self.substitute(ctx, a)).collect();
				Type::GenericInstance { generic, args: ctx.bump().alloc_slice_copy(&substituted) }
			}
			other => *other,
		}
	}
}
