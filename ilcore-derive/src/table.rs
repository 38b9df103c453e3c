use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Field, Type};

pub fn derive(tokens: proc_macro::TokenStream) -> TokenStream {
	let DeriveInput { ident, data, .. } = syn::parse(tokens).unwrap();

	let data = match data {
		Data::Struct(data) => data,
		Data::Enum(_) => panic!("Enums are not supported"),
		Data::Union(_) => panic!("Unions are not supported"),
	};

	const SELF_DESCRIBING: &[&str] = &["u8", "u16", "u32", "u64", "i8", "i16", "i32", "i64", "f32", "f64"];

	let table_ident = format_ident!("{}Table", ident);
	let reads = data.fields.iter().map(|Field { ident, ty, .. }| match ty {
		Type::Path(path) => match path.path.get_ident() {
			Some(ty_ident) if ty_ident == "StringIndex" => quote! {
				#ident: StringIndex::read(stream, &sizes.clone())?
			},
			Some(ty_ident) if SELF_DESCRIBING.iter().any(|s| ty_ident == s) => quote! {
				#ident: <#ty>::read(stream, &())?
			},
			_ => quote!(#ident: <#ty>::read(stream, sizes)?),
		},
		_ => quote!(#ident: <#ty>::read(stream, sizes)?),
	});

	quote! {
		#[derive(Debug, Default)]
		pub struct #table_ident {
			row_size: usize,
			rows: Vec<#ident>,
		}

		impl #table_ident {
			pub fn read(stream: &mut std::io::Cursor<&[u8]>, sizes: &std::sync::Arc<crate::metadata::token::IndexSizes>, len: usize) -> std::io::Result<Self> {
				let start = stream.position() as usize;

				let mut rows = Vec::with_capacity(len);
				for _ in 0..len {
					rows.push(#ident { #(#reads),* })
				}

				let row_size = match len {
					0 => 0,
					_ => (stream.position() as usize - start) / len,
				};
				Ok(Self { rows, row_size })
			}
		}

		impl MetadataTable for #table_ident {
			fn len(&self) -> usize {
				self.rows.len()
			}

			fn tag(&self) -> TableTag {
				TableTag::#ident
			}

			fn row_size(&self) -> usize {
				self.row_size
			}
		}

		impl #table_ident {
			pub fn rows(&self) -> &[#ident] {
				&self.rows
			}
		}
	}
}
