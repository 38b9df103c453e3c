//! The in-memory IL instruction tree: an arena of [`InstructionKind`] nodes
//! addressed by stable [`arena::NodeId`]s, owned per-method by
//! [`function::ILFunction`], rewritten in place through [`mutate`].

pub mod arena;
pub mod block;
pub mod flags;
pub mod function;
pub mod instruction;
pub mod mutate;
pub mod variable;

pub use arena::{Arena, NodeId};
pub use flags::FlowFlags;
pub use function::ILFunction;
pub use instruction::{ExceptionHandlerClause, ILInstruction, InstructionKind, SwitchSection};
pub use variable::{Variable, VariableId, VariableKind};
