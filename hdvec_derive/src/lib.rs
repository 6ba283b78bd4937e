//! `#[derive(DeviceCopy)]` for hdvec element types.
//!
//! The derive emits the unsafe marker impl together with a hidden function that names every field
//! type in a `DeviceCopy` bound, so a field that cannot be moved to a device is a compile error
//! rather than undefined behaviour.

extern crate proc_macro;

use proc_macro::TokenStream as BaseTokenStream;
use proc_macro2::{Ident, Span, TokenStream};
use quote::quote;
use syn::{
    parse_macro_input, parse_quote, Data, DataEnum, DataStruct, DataUnion, DeriveInput, Field,
    Fields, Generics, TypeParamBound,
};

#[proc_macro_derive(DeviceCopy)]
pub fn derive_device_copy(input: BaseTokenStream) -> BaseTokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    BaseTokenStream::from(impl_device_copy(&ast))
}

fn impl_device_copy(input: &DeriveInput) -> TokenStream {
    let input_type = &input.ident;

    let field_checks = match input.data {
        Data::Struct(ref data_struct) => check_struct(data_struct),
        Data::Enum(ref data_enum) => check_enum(data_enum),
        Data::Union(ref data_union) => check_union(data_union),
    };

    let verify_fn = Ident::new(
        &format!("__verify_{}_can_implement_DeviceCopy", input_type),
        Span::call_site(),
    );

    let generics = bound_type_params(&input.generics);
    let (impl_generics, type_generics, where_clause) = generics.split_for_impl();

    quote! {
        unsafe impl #impl_generics ::hdvec::DeviceCopy for #input_type #type_generics #where_clause {}

        #[doc(hidden)]
        #[allow(non_snake_case, dead_code, unused_variables)]
        fn #verify_fn #impl_generics(value: &#input_type #type_generics) #where_clause {
            #field_checks
        }
    }
}

fn bound_type_params(generics: &Generics) -> Generics {
    let mut bounded = generics.clone();
    let bound: TypeParamBound = parse_quote!(::hdvec::DeviceCopy);
    for type_param in bounded.type_params_mut() {
        type_param.bounds.push(bound.clone());
    }
    bounded
}

fn fields_of(fields: &Fields) -> Vec<&Field> {
    match fields {
        Fields::Named(named) => named.named.iter().collect(),
        Fields::Unnamed(unnamed) => unnamed.unnamed.iter().collect(),
        Fields::Unit => Vec::new(),
    }
}

fn check_struct(s: &DataStruct) -> TokenStream {
    let checks = check_fields(&fields_of(&s.fields));
    quote!( #(#checks)* )
}

fn check_enum(e: &DataEnum) -> TokenStream {
    let checks: Vec<TokenStream> = e
        .variants
        .iter()
        .flat_map(|variant| check_fields(&fields_of(&variant.fields)))
        .collect();
    quote!( #(#checks)* )
}

fn check_union(u: &DataUnion) -> TokenStream {
    let fields: Vec<&Field> = u.fields.named.iter().collect();
    let checks = check_fields(&fields);
    quote!( #(#checks)* )
}

fn check_fields(fields: &[&Field]) -> Vec<TokenStream> {
    fields
        .iter()
        .map(|field| {
            let field_type = &field.ty;
            quote! {
                {
                    fn assert_impl<T: ::hdvec::DeviceCopy + ?Sized>() {}
                    assert_impl::<#field_type>();
                }
            }
        })
        .collect()
}
