//! Derive macro for the `ExternalSize` trait of `v8-host-bridge`.
//!
//! The bridge accounts every proxy payload it keeps alive on behalf of the
//! guest collector. Payload types describe their footprint with
//! `#[derive(ExternalSize)]`:
//!
//! ```ignore
//! use v8_host_bridge::DeriveExternalSize;
//!
//! #[derive(DeriveExternalSize)]
//! #[gc(self_size)]
//! struct Wrapper {
//!     #[gc(track)]
//!     name: String,
//!     id: u64,
//! }
//! ```
//!
//! Enums are supported: each variant contributes the sum of its tracked
//! fields.
//!
//! ```ignore
//! #[derive(DeriveExternalSize)]
//! enum Payload {
//!     Value(#[gc(track)] HostValue),
//!     Method { #[gc(track)] name: String },
//!     Empty,
//! }
//! ```
//!
//! Inside the bridge crate itself use `#[gc(crate_path = "crate")]`.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, parse_macro_input};

/// Derive macro for implementing `ExternalSize`.
///
/// # Attributes
///
/// - `#[gc(track)]` on a field: include the field's external size
/// - `#[gc(self_size)]` on the type: add `size_of::<Self>()`
/// - `#[gc(crate_path = "path")]` on the type: override the crate path
///   (default: `v8_host_bridge`)
#[proc_macro_derive(ExternalSize, attributes(gc))]
pub fn derive_external_size(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let options = match TypeOptions::parse(&input) {
        Ok(options) => options,
        Err(e) => return e.to_compile_error().into(),
    };
    let crate_path = &options.crate_path;

    let body = match &input.data {
        Data::Struct(data) => struct_body(&data.fields, crate_path),
        Data::Enum(data) => {
            let arms = data.variants.iter().map(|variant| {
                let ident = &variant.ident;
                let (pattern, sum) = variant_arm(&variant.fields, crate_path);
                quote! { Self::#ident #pattern => #sum, }
            });
            quote! {
                match self {
                    #(#arms)*
                }
            }
        }
        Data::Union(_) => {
            return syn::Error::new_spanned(&input, "ExternalSize cannot be derived for unions")
                .to_compile_error()
                .into();
        }
    };

    let self_size = if options.self_size {
        quote! { ::std::mem::size_of::<Self>() + }
    } else {
        quote! {}
    };

    let expanded = quote! {
        impl #impl_generics #crate_path::ExternalSize for #name #ty_generics #where_clause {
            fn external_size(&self) -> usize {
                #self_size (#body)
            }
        }
    };

    TokenStream::from(expanded)
}

struct TypeOptions {
    crate_path: proc_macro2::TokenStream,
    self_size: bool,
}

impl TypeOptions {
    fn parse(input: &DeriveInput) -> syn::Result<Self> {
        let mut crate_path = None;
        let mut self_size = false;

        for attr in input.attrs.iter().filter(|a| a.path().is_ident("gc")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("crate_path") {
                    let value: syn::LitStr = meta.value()?.parse()?;
                    let path: syn::Path = value.parse()?;
                    crate_path = Some(quote! { #path });
                    Ok(())
                } else if meta.path.is_ident("self_size") {
                    self_size = true;
                    Ok(())
                } else {
                    Err(meta.error("expected `crate_path = \"...\"` or `self_size`"))
                }
            })?;
        }

        Ok(Self {
            crate_path: crate_path.unwrap_or_else(|| quote! { v8_host_bridge }),
            self_size,
        })
    }
}

fn struct_body(fields: &Fields, crate_path: &proc_macro2::TokenStream) -> proc_macro2::TokenStream {
    let tracked: Vec<_> = match fields {
        Fields::Named(named) => named
            .named
            .iter()
            .filter(|f| is_tracked(f))
            .map(|f| {
                let name = &f.ident;
                quote! { #crate_path::ExternalSize::external_size(&self.#name) }
            })
            .collect(),
        Fields::Unnamed(unnamed) => unnamed
            .unnamed
            .iter()
            .enumerate()
            .filter(|(_, f)| is_tracked(f))
            .map(|(i, _)| {
                let index = syn::Index::from(i);
                quote! { #crate_path::ExternalSize::external_size(&self.#index) }
            })
            .collect(),
        Fields::Unit => vec![],
    };

    sum(tracked)
}

/// Builds the match pattern and the size expression for one enum variant.
fn variant_arm(
    fields: &Fields,
    crate_path: &proc_macro2::TokenStream,
) -> (proc_macro2::TokenStream, proc_macro2::TokenStream) {
    match fields {
        Fields::Named(named) => {
            let tracked: Vec<_> = named
                .named
                .iter()
                .filter(|f| is_tracked(f))
                .filter_map(|f| f.ident.as_ref())
                .collect();
            let terms = tracked
                .iter()
                .map(|ident| quote! { #crate_path::ExternalSize::external_size(#ident) })
                .collect();
            (quote! { { #(#tracked,)* .. } }, sum(terms))
        }
        Fields::Unnamed(unnamed) => {
            let mut bindings = Vec::new();
            let mut terms = Vec::new();
            for (i, field) in unnamed.unnamed.iter().enumerate() {
                if is_tracked(field) {
                    let binding = format_ident!("__field{}", i);
                    terms.push(quote! { #crate_path::ExternalSize::external_size(#binding) });
                    bindings.push(quote! { #binding });
                } else {
                    bindings.push(quote! { _ });
                }
            }
            (quote! { ( #(#bindings),* ) }, sum(terms))
        }
        Fields::Unit => (quote! {}, quote! { 0 }),
    }
}

fn sum(terms: Vec<proc_macro2::TokenStream>) -> proc_macro2::TokenStream {
    if terms.is_empty() {
        quote! { 0 }
    } else {
        quote! { 0 #(+ #terms)* }
    }
}

fn is_tracked(field: &syn::Field) -> bool {
    field.attrs.iter().any(|attr| {
        if !attr.path().is_ident("gc") {
            return false;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("track") {
                Ok(())
            } else {
                Err(meta.error("expected `track`"))
            }
        })
        .is_ok()
    })
}
