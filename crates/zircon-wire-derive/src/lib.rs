use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields};

/// Determine the `#[repr(...)]` type on an enum. Returns the ident (e.g. `u16`).
fn repr_type(attrs: &[syn::Attribute]) -> Option<syn::Ident> {
    for attr in attrs {
        if !attr.path().is_ident("repr") {
            continue;
        }
        let mut found = None;
        let _ = attr.parse_nested_meta(|meta| {
            if let Some(ident) = meta.path.get_ident() {
                let s = ident.to_string();
                if matches!(s.as_str(), "u8" | "u16" | "u32" | "u64") {
                    found = Some(ident.clone());
                }
            }
            Ok(())
        });
        if found.is_some() {
            return found;
        }
    }
    None
}

// ---------------------------------------------------------------------------
// WireSerialize
// ---------------------------------------------------------------------------

#[proc_macro_derive(WireSerialize)]
pub fn derive_wire_serialize(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = match &input.data {
        Data::Struct(data_struct) => {
            let body = serialize_fields(&data_struct.fields);
            quote! {
                impl #impl_generics zircon_wire::WireSerialize for #name #ty_generics #where_clause {
                    fn wire_serialize(&self, buf: &mut Vec<u8>) -> Result<(), zircon_wire::WireError> {
                        #body
                        Ok(())
                    }
                }
            }
        }
        Data::Enum(_) => {
            let repr = repr_type(&input.attrs)
                .expect("WireSerialize on enums requires a #[repr(uN)] attribute");
            quote! {
                impl #impl_generics zircon_wire::WireSerialize for #name #ty_generics #where_clause {
                    fn wire_serialize(&self, buf: &mut Vec<u8>) -> Result<(), zircon_wire::WireError> {
                        let v = *self as #repr;
                        zircon_wire::WireSerialize::wire_serialize(&v, buf)
                    }
                }
            }
        }
        Data::Union(_) => panic!("WireSerialize cannot be derived for unions"),
    };

    TokenStream::from(expanded)
}

fn serialize_fields(fields: &Fields) -> proc_macro2::TokenStream {
    match fields {
        Fields::Named(named) => {
            let stmts: Vec<_> = named
                .named
                .iter()
                .map(|f| {
                    let ident = f.ident.as_ref().unwrap();
                    quote! {
                        zircon_wire::WireSerialize::wire_serialize(&self.#ident, buf)?;
                    }
                })
                .collect();
            quote! { #(#stmts)* }
        }
        Fields::Unnamed(unnamed) => {
            let stmts: Vec<_> = unnamed
                .unnamed
                .iter()
                .enumerate()
                .map(|(i, _)| {
                    let index = syn::Index::from(i);
                    quote! {
                        zircon_wire::WireSerialize::wire_serialize(&self.#index, buf)?;
                    }
                })
                .collect();
            quote! { #(#stmts)* }
        }
        Fields::Unit => quote! {},
    }
}

// ---------------------------------------------------------------------------
// WireDeserialize
// ---------------------------------------------------------------------------

#[proc_macro_derive(WireDeserialize)]
pub fn derive_wire_deserialize(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = match &input.data {
        Data::Struct(data_struct) => {
            let (bindings, construct) = deserialize_fields(&data_struct.fields);
            quote! {
                impl #impl_generics zircon_wire::WireDeserialize for #name #ty_generics #where_clause {
                    fn wire_deserialize(buf: &[u8], offset: &mut usize) -> Result<Self, zircon_wire::WireError> {
                        #bindings
                        Ok(#construct)
                    }
                }
            }
        }
        Data::Enum(_) => {
            let repr = repr_type(&input.attrs)
                .expect("WireDeserialize on enums requires a #[repr(uN)] attribute");
            quote! {
                impl #impl_generics zircon_wire::WireDeserialize for #name #ty_generics #where_clause {
                    fn wire_deserialize(buf: &[u8], offset: &mut usize) -> Result<Self, zircon_wire::WireError> {
                        let v = <#repr as zircon_wire::WireDeserialize>::wire_deserialize(buf, offset)?;
                        <#name as TryFrom<#repr>>::try_from(v)
                            .map_err(|_| zircon_wire::WireError::InvalidEnumVariant {
                                enum_name: stringify!(#name),
                                value: v as u64,
                            })
                    }
                }
            }
        }
        Data::Union(_) => panic!("WireDeserialize cannot be derived for unions"),
    };

    TokenStream::from(expanded)
}

/// Returns (binding_statements, constructor_expression).
fn deserialize_fields(fields: &Fields) -> (proc_macro2::TokenStream, proc_macro2::TokenStream) {
    match fields {
        Fields::Named(named) => {
            let mut bindings = Vec::new();
            let mut field_inits = Vec::new();

            for (i, f) in named.named.iter().enumerate() {
                let ident = f.ident.as_ref().unwrap();
                // Prefixed variable names avoid shadowing the `buf`/`offset`
                // parameters.
                let var =
                    syn::Ident::new(&format!("__wire_field_{}", i), proc_macro2::Span::call_site());
                bindings.push(quote! {
                    let #var = zircon_wire::WireDeserialize::wire_deserialize(buf, offset)?;
                });
                field_inits.push(quote! { #ident: #var });
            }

            let bindings = quote! { #(#bindings)* };
            let construct = quote! { Self { #(#field_inits),* } };
            (bindings, construct)
        }
        Fields::Unnamed(unnamed) => {
            let mut bindings = Vec::new();
            let mut field_names = Vec::new();

            for (i, _) in unnamed.unnamed.iter().enumerate() {
                let var = syn::Ident::new(&format!("__field{}", i), proc_macro2::Span::call_site());
                bindings.push(quote! {
                    let #var = zircon_wire::WireDeserialize::wire_deserialize(buf, offset)?;
                });
                field_names.push(var);
            }

            let bindings = quote! { #(#bindings)* };
            let construct = quote! { Self(#(#field_names),*) };
            (bindings, construct)
        }
        Fields::Unit => (quote! {}, quote! { Self }),
    }
}
