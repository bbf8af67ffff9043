//! Derive macros for `silk-dtyp`, and general `silk*` crates.
//!
//! This crate should not be depended on directly; its macros are
//! re-exported from `silk_dtyp`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{Fields, ItemStruct, parse_macro_input};

/// Returns the bit width of a bitfield-compatible field type, used to
/// compute the packed byte size of an `#[mbitfield]` struct.
///
/// Understands `bool` (1 bit), the unsigned integer primitives, and
/// `modular_bitfield`'s generated `B1..B63` specifiers.
fn field_bits(ty: &syn::Type) -> Option<u32> {
    let syn::Type::Path(p) = ty else {
        return None;
    };
    let ident = p.path.segments.last()?.ident.to_string();
    match ident.as_str() {
        "bool" => Some(1),
        "u8" => Some(8),
        "u16" => Some(16),
        "u32" => Some(32),
        "u64" => Some(64),
        _ => {
            let rest = ident.strip_prefix('B')?;
            rest.parse::<u32>().ok()
        }
    }
}

/// Declares a packed, bit-level record field group.
///
/// `#[silk_dtyp::mbitfield]` forwards the struct to
/// `#[modular_bitfield::bitfield]` (so `bool`/`B3`/`B21`/... fields pack
/// tightly, MSB-first, as the on-disk formats require), and additionally
/// derives `binrw::BinRead`/`BinWrite` for the packed representation by
/// reading/writing the struct's exact byte width big-endian and round
/// tripping it through `from_bytes`/`into_bytes`.
///
/// The packed bit width must be a multiple of 8; this is checked at
/// macro-expansion time from the declared field types.
#[proc_macro_attribute]
pub fn mbitfield(_attr: TokenStream, input: TokenStream) -> TokenStream {
    let item = parse_macro_input!(input as ItemStruct);
    let name = &item.ident;

    let total_bits: Option<u32> = match &item.fields {
        Fields::Named(fields) => fields
            .named
            .iter()
            .map(|f| field_bits(&f.ty))
            .try_fold(0u32, |acc, b| b.map(|b| acc + b)),
        _ => None,
    };

    let Some(total_bits) = total_bits else {
        return syn::Error::new_spanned(
            &item.fields,
            "mbitfield: all fields must be bool, u8/16/32/64, or a modular_bitfield B<N> specifier",
        )
        .to_compile_error()
        .into();
    };

    if total_bits % 8 != 0 {
        return syn::Error::new_spanned(
            &item.fields,
            format!("mbitfield: packed width must be a multiple of 8 bits, got {total_bits}"),
        )
        .to_compile_error()
        .into();
    }
    let n_bytes = (total_bits / 8) as usize;

    TokenStream::from(quote! {
        #[modular_bitfield::bitfield]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #item

        impl binrw::BinRead for #name {
            type Args<'a> = ();

            fn read_options<R: ::std::io::Read + ::std::io::Seek>(
                reader: &mut R,
                _endian: binrw::Endian,
                _args: Self::Args<'_>,
            ) -> binrw::BinResult<Self> {
                let mut buf = [0u8; #n_bytes];
                reader.read_exact(&mut buf).map_err(|e| binrw::Error::Io(e))?;
                Ok(Self::from_bytes(buf))
            }
        }

        impl binrw::BinWrite for #name {
            type Args<'a> = ();

            fn write_options<W: ::std::io::Write + ::std::io::Seek>(
                &self,
                writer: &mut W,
                _endian: binrw::Endian,
                _args: Self::Args<'_>,
            ) -> binrw::BinResult<()> {
                writer
                    .write_all(&self.into_bytes())
                    .map_err(|e| binrw::Error::Io(e))
            }
        }
    })
}
