//! The arena and assembly cache every resolved type-system entity is
//! allocated out of and keyed against.

use std::cell::RefCell;
use std::pin::Pin;

use bumpalo::Bump;
use fxhash::FxHashMap;

use crate::error::MetadataError;
use crate::metadata::assembly::Assembly;
use crate::typesystem::resolver::{AssemblyResolver, DefaultAssemblyResolver};

/// Owns the arena every `Type`/`Method`/`Field` handle with lifetime `'l`
/// borrows from, plus the cache of assemblies already loaded into it.
///
/// The arena is boxed and pinned so its address is stable for the
/// lifetime of the `Context`; [`Context::bump`] hands out `&'l Bump`
/// references whose lifetime is tied to `&self` rather than to the
/// `Pin<Box<_>>`'s own borrow, which is what lets resolved entities
/// outlive the call that produced them without the whole arena moving
/// out from under earlier allocations.
pub struct Context<'l> {
	arena: Pin<Box<Bump>>,
	assemblies: RefCell<FxHashMap<String, &'l Assembly<'l>>>,
	resolver: RefCell<Box<dyn AssemblyResolver>>,
}

impl<'l> Context<'l> {
	pub fn new() -> Self {
		Self::with_resolver(Box::new(DefaultAssemblyResolver::default()))
	}

	pub fn with_resolver(resolver: Box<dyn AssemblyResolver>) -> Self {
		Self { arena: Box::pin(Bump::new()), assemblies: RefCell::new(FxHashMap::default()), resolver: RefCell::new(resolver) }
	}

	/// # Safety
	/// The returned reference's lifetime is extended from the arena's
	/// actual borrow to `'l`. This is sound only because the arena is
	/// never reset or dropped before `'l` ends — `Context` owns it for
	/// its entire lifetime and never exposes a way to reset it early.
	pub fn bump(&self) -> &'l Bump {
		unsafe { std::mem::transmute::<&Bump, &'l Bump>(&self.arena) }
	}

	pub fn load(&self, name: &str) -> Result<&'l Assembly<'l>, MetadataError> {
		if let Some(assembly) = self.assemblies.borrow().get(name) {
			return Ok(assembly);
		}

		let path = self
			.resolver
			.borrow_mut()
			.resolve(name)
			.ok_or_else(|| MetadataError::MissingStream("assembly resolution failed"))?;
		let bytes = Self::read_file(&path)?;
		let bytes = self.bump().alloc_slice_copy(&bytes);
		let assembly = self.bump().alloc(Assembly::read(bytes)?);

		self.assemblies.borrow_mut().insert(name.to_string(), assembly);
		Ok(assembly)
	}

	#[cfg(feature = "memmap2")]
	fn read_file(path: impl AsRef<std::path::Path>) -> Result<Vec<u8>, MetadataError> {
		let file = std::fs::File::open(path).map_err(MetadataError::Io)?;
		let mapping = unsafe { memmap2::Mmap::map(&file) }.map_err(MetadataError::Io)?;
		Ok(mapping.to_vec())
	}

	#[cfg(not(feature = "memmap2"))]
	fn read_file(path: impl AsRef<std::path::Path>) -> Result<Vec<u8>, MetadataError> {
		std::fs::read(path).map_err(MetadataError::Io)
	}
}

impl<'l> Default for Context<'l> {
	fn default() -> Self {
		Self::new()
	}
}
