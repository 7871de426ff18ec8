extern crate proc_macro;
use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Lit, Meta};

/// Name used for a field in error messages.
///
/// Defaults to the Rust identifier; `#[wire = "CntRate0"]` overrides it with the
/// name PicoQuant uses for the field.
fn wire_name(field: &syn::Field) -> syn::Result<String> {
    for attr in &field.attrs {
        if !attr.path.is_ident("wire") {
            continue;
        }
        match attr.parse_meta()? {
            Meta::NameValue(nv) => match nv.lit {
                Lit::Str(s) => return Ok(s.value()),
                other => return Err(syn::Error::new_spanned(other, "expected a string literal")),
            },
            other => return Err(syn::Error::new_spanned(other, "expected #[wire = \"Name\"]")),
        }
    }
    Ok(field.ident.as_ref().map(|i| i.to_string()).unwrap_or_default())
}

// example use
// #[derive(ReadFields)]
// struct Tail { #[wire = "CntRate0"] cnt_rate0: i32, records: i32 }
//
// Fields are read one after the other in declaration order, which makes the
// struct definition the byte layout of the file.
#[proc_macro_derive(ReadFields, attributes(wire))]
pub fn derive_read_fields(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = input.ident;

    let fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(named) => named.named,
            _ => {
                return syn::Error::new_spanned(name, "ReadFields needs named fields")
                    .to_compile_error()
                    .into()
            }
        },
        _ => {
            return syn::Error::new_spanned(name, "ReadFields only supports structs")
                .to_compile_error()
                .into()
        }
    };

    let mut reads = Vec::with_capacity(fields.len());
    for field in fields.iter() {
        let ident = &field.ident;
        let ty = &field.ty;
        let label = match wire_name(field) {
            Ok(label) => label,
            Err(err) => return err.to_compile_error().into(),
        };
        reads.push(quote! {
            #ident: <#ty as crate::parsers::pt3::header::ReadField>::read_field(reader, #label, offset)?
        });
    }

    let output = quote! {
        impl crate::parsers::pt3::header::ReadField for #name {
            fn read_field<R: std::io::Read>(
                reader: &mut R,
                _field: &'static str,
                offset: &mut u64,
            ) -> Result<Self, crate::errors::DecodeError> {
                Ok(Self {
                    #(#reads,)*
                })
            }
        }
    };
    output.into()
}
