//! The type-system view: a resolved, arena-backed projection of an
//! assembly's metadata tables into the `Type`/`Method`/`Field` graph every
//! later stage (the ILAst, the transform passes) actually programs
//! against.
//!
//! Resolution is lazy and memoized — a [`Class`] is a thin, `Copy`able
//! handle until something asks for its fields or methods, at which point
//! [`Context::bump`]-arena storage is populated once and cached behind a
//! `Cell`. See `DESIGN.md` for why this follows the single-writer,
//! compare-and-set-free "first populate wins" idiom rather than a mutex.

pub mod attributes;
pub mod context;
pub mod members;
pub mod reflection_name;
pub mod resolver;
pub mod substitution;
pub mod types;
pub mod view;

pub use context::Context;
pub use members::{Field, Method, Parameter};
pub use types::{PrimitiveType, Type};
pub use view::TypeSystemView;
