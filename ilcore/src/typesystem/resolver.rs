//! Locating a referenced assembly (an `AssemblyRef` row's name) on disk.
//! Decompiling a method that touches another assembly's types needs that
//! assembly loaded too; how to find it is caller-pluggable.

use rust_search::SearchBuilder;

pub trait AssemblyResolver: Send {
	fn resolve(&mut self, name: &str) -> Option<String>;
}

/// Searches a fixed set of directories (application base, GAC-like probe
/// paths) for a file named `{name}.dll`. Good enough for decompiling a
/// single assembly against its immediate dependencies; anything fancier
/// (NuGet cache probing, version unification) is caller territory.
pub struct DefaultAssemblyResolver {
	pub search_paths: Vec<String>,
}

impl Default for DefaultAssemblyResolver {
	fn default() -> Self {
		Self { search_paths: vec![".".to_string()] }
	}
}

impl AssemblyResolver for DefaultAssemblyResolver {
	#[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
	fn resolve(&mut self, name: &str) -> Option<String> {
		let file_name = format!("{name}.dll");
		for path in &self.search_paths {
			let results = SearchBuilder::default().location(path).search_input(&file_name).limit(1).build().collect::<Vec<_>>();
			if let Some(found) = results.into_iter().next() {
				return Some(found);
			}
		}
		None
	}
}
