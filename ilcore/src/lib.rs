//! `ilcore`: the IL-to-high-level-AST decompilation core.
//!
//! Given a compiled assembly's metadata, this crate builds an in-memory IL
//! instruction tree ([`ilast`]) for each method body and runs it through an
//! ordered sequence of [`transforms`] — each one recognizing a
//! compiler-emitted idiom (a `lock` block, a `using` block, a string
//! switch, an iterator or `async` state machine, ...) and rewriting it into
//! the higher-level construct it actually came from. The transforms lean on
//! two pieces of shared infrastructure: a generic forward [`dataflow`]
//! framework and a family of structural [`matchers`]; structural recovery
//! of loops/conditionals/switch shape lives in [`cfg`].
//!
//! Everything above the ILAst is resolved against a lazily-materialized
//! [`typesystem`] view over the raw [`metadata`] tables. [`pipeline`] is the
//! driver that orders the passes, iterates re-runnable ones to a local
//! fixpoint, and turns a failing pass into a per-method record rather than
//! aborting the rest of the assembly.
//!
//! What this crate does *not* do: parse a PE image end to end beyond what
//! [`metadata`] needs, pretty-print the recovered AST back to source text,
//! or persist any of it — those are external collaborators (see
//! `DESIGN.md`).

pub mod cancellation;
pub mod cfg;
pub mod dataflow;
pub mod error;
pub mod ilast;
pub mod matchers;
pub mod metadata;
pub mod pipeline;
pub mod transforms;
pub mod typesystem;

pub use error::{DecompilerError, MetadataError, Result};
