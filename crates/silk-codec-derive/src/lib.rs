//! Utility macros for building on-disk flow-record layouts.
//!
//! This should be used only within the `silk-codec` crate. Common utilities
//! shared with `silk-schema`/`silk-io` live in `silk-dtyp-derive`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{
    Expr, ExprLit, Fields, ItemStruct, Lit, Meta,
    parse::{Parse, ParseStream, Result},
    parse_macro_input,
};

#[derive(Debug)]
struct FlowRecordAttr {
    value: u16,
}

impl Parse for FlowRecordAttr {
    fn parse(input: ParseStream) -> Result<Self> {
        let meta: Meta = input.parse()?;

        match meta {
            Meta::NameValue(nv) if nv.path.is_ident("length") => {
                if let Expr::Lit(ExprLit {
                    lit: Lit::Int(lit), ..
                }) = nv.value
                {
                    let value: u16 = lit.base10_parse()?;
                    Ok(FlowRecordAttr { value })
                } else {
                    Err(syn::Error::new_spanned(
                        nv.value,
                        "expected integer literal",
                    ))
                }
            }
            _ => Err(syn::Error::new_spanned(meta, "expected `length = <u16>`")),
        }
    }
}

/// Proc-macro for declaring a fixed-width on-disk flow-record layout.
///
/// `#[flow_record(length = <u16>)]` adds `#[binrw::binrw] #[brw(big)]` plus a
/// compile-time-checked `RECORD_LENGTH` const, and rewrites any field named
/// `reserved` into a zero-filled, read-discarded padding field (mirroring the
/// message-layer convention of stamping out padding/size bookkeeping by hand).
#[proc_macro_attribute]
pub fn flow_record(attr: TokenStream, input: TokenStream) -> TokenStream {
    let attr = parse_macro_input!(attr as FlowRecordAttr);
    let mut item = parse_macro_input!(input as ItemStruct);
    let name = item.ident.clone();
    let length = attr.value;

    if let Fields::Named(ref mut fields) = item.fields {
        for field in fields.named.iter_mut() {
            if field.ident.as_ref().is_some_and(|id| *id == "reserved") {
                if field.vis != syn::Visibility::Inherited {
                    return syn::Error::new_spanned(
                        &field.vis,
                        "reserved field must have no visibility defined",
                    )
                    .to_compile_error()
                    .into();
                }

                let line_number = proc_macro2::Span::call_site().start().line;
                field.ident = Some(syn::Ident::new(
                    &format!("_reserved{line_number}"),
                    proc_macro2::Span::call_site(),
                ));
                field.attrs.push(syn::parse_quote! { #[br(temp)] });

                let default_bw_calc = if let syn::Type::Array(arr) = &field.ty {
                    let len = arr.len.clone();
                    syn::parse_quote! { #[bw(calc = [0; #len])] }
                } else {
                    syn::parse_quote! { #[bw(calc = Default::default())] }
                };
                field.attrs.push(default_bw_calc);
            }
        }
    }

    TokenStream::from(quote! {
        #[binrw::binrw]
        #[brw(big)]
        #[derive(Debug, Clone, PartialEq)]
        #item

        impl #name {
            /// On-disk size of this record layout, in bytes.
            pub const RECORD_LENGTH: u16 = #length;
        }
    })
}
