//! Derive macros for `brrtmediator` message types.
//!
//! ```rust,ignore
//! use brrtmediator::{Notification, Request};
//!
//! #[derive(Request)]
//! #[request(response = String)]
//! struct Echo {
//!     msg: String,
//! }
//!
//! #[derive(Notification)]
//! struct UserCreated {
//!     id: u64,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse::{Parse, ParseStream},
    parse_macro_input, parse_quote, DeriveInput, Ident, Result as SynResult, Token, Type,
};

/// Arguments of `#[request(response = Type)]`.
struct RequestArgs {
    response: Type,
}

impl Parse for RequestArgs {
    fn parse(input: ParseStream) -> SynResult<Self> {
        let key: Ident = input.parse()?;
        if key != "response" {
            return Err(syn::Error::new(
                key.span(),
                format!("unexpected request attribute `{}`, expected `response`", key),
            ));
        }
        input.parse::<Token![=]>()?;
        let response: Type = input.parse()?;
        if input.peek(Token![,]) {
            input.parse::<Token![,]>()?;
        }
        if !input.is_empty() {
            return Err(input.error("unexpected tokens after response type"));
        }
        Ok(RequestArgs { response })
    }
}

fn response_type(input: &DeriveInput) -> SynResult<Type> {
    let mut response: Option<Type> = None;
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("request")) {
        if response.is_some() {
            return Err(syn::Error::new_spanned(
                attr,
                "duplicate #[request(...)] attribute",
            ));
        }
        response = Some(attr.parse_args::<RequestArgs>()?.response);
    }
    // No attribute means a command-style request with a unit response.
    Ok(response.unwrap_or_else(|| parse_quote!(())))
}

fn expand_request(input: &DeriveInput) -> TokenStream2 {
    let response = match response_type(input) {
        Ok(ty) => ty,
        Err(err) => return err.to_compile_error(),
    };
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    quote! {
        impl #impl_generics ::brrtmediator::Request for #name #ty_generics #where_clause {
            type Response = #response;
        }
    }
}

fn expand_notification(input: &DeriveInput) -> TokenStream2 {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    quote! {
        impl #impl_generics ::brrtmediator::Notification for #name #ty_generics #where_clause {}
    }
}

/// Implements `brrtmediator::Request`.
///
/// The response type comes from `#[request(response = T)]` and defaults to `()`.
#[proc_macro_derive(Request, attributes(request))]
pub fn derive_request(item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    expand_request(&input).into()
}

/// Implements `brrtmediator::Notification`.
#[proc_macro_derive(Notification)]
pub fn derive_notification(item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    expand_notification(&input).into()
}
