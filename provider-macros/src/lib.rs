//! Procedural macros for Allure suites.
//!
//! `#[allure_suite]` turns an inherent impl block into a suite: it collects
//! the test methods and lifecycle hooks of the block and implements
//! `allure_provider::Suite` with the matching registration table.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, FnArg, ImplItem, ImplItemFn, ItemImpl, LitStr};

/// Method name prefix marking a test.
const TEST_PREFIX: &str = "test";

/// Method names recognised as lifecycle hooks.
const HOOKS: [&str; 4] = ["before_all", "before_each", "after_each", "after_all"];

/// Generates the `Suite` implementation for an impl block.
///
/// Methods whose name starts with `test` are registered as tests, in
/// declaration order. Methods named `before_all`, `before_each`,
/// `after_each` and `after_all` become hooks. Every collected method must
/// take `&self` and the test handle. Other methods are left alone.
///
/// # Examples
///
/// ```ignore
/// use allure_provider::prelude::*;
///
/// struct AuthSuite;
///
/// #[allure_suite("Authentication")]
/// impl AuthSuite {
///     fn before_each(&self, t: &T) {
///         t.step("create user", |_| {});
///     }
///
///     fn test_login(&self, t: &T) {
///         t.assert().is_true(true);
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn allure_suite(attr: TokenStream, item: TokenStream) -> TokenStream {
    let suite_name = if attr.is_empty() {
        None
    } else {
        Some(parse_macro_input!(attr as LitStr))
    };
    let input = parse_macro_input!(item as ItemImpl);

    expand_allure_suite(input, suite_name)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn expand_allure_suite(
    input: ItemImpl,
    suite_name: Option<LitStr>,
) -> syn::Result<proc_macro2::TokenStream> {
    if let Some((_, path, _)) = &input.trait_ {
        return Err(syn::Error::new_spanned(
            path,
            "#[allure_suite] goes on an inherent impl block",
        ));
    }
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "#[allure_suite] does not support generic suites",
        ));
    }

    let mut registrations = Vec::new();
    for item in &input.items {
        let ImplItem::Fn(method) = item else {
            continue;
        };
        let name = method.sig.ident.to_string();
        if name.starts_with(TEST_PREFIX) {
            check_signature(method)?;
            let ident = &method.sig.ident;
            registrations.push(quote! { .test(#name, Self::#ident) });
        } else if HOOKS.contains(&name.as_str()) {
            check_signature(method)?;
            let ident = &method.sig.ident;
            let register = format_ident!("{}", name);
            registrations.push(quote! { .#register(Self::#ident) });
        }
    }

    let self_ty = &input.self_ty;
    let name_override = suite_name.map(|name| {
        quote! {
            fn suite_name(&self) -> ::std::string::String {
                ::std::string::String::from(#name)
            }
        }
    });

    Ok(quote! {
        #input

        impl ::allure_provider::Suite for #self_ty {
            fn registry() -> ::allure_provider::Registry<Self> {
                ::allure_provider::Registry::new()
                    #(#registrations)*
            }

            #name_override
        }
    })
}

/// Collected methods take `&self` plus one argument (the test handle) and
/// return nothing.
fn check_signature(method: &ImplItemFn) -> syn::Result<()> {
    let sig = &method.sig;
    let receiver_ok = matches!(
        sig.inputs.first(),
        Some(FnArg::Receiver(r)) if r.reference.is_some() && r.mutability.is_none()
    );
    if !receiver_ok || sig.inputs.len() != 2 {
        return Err(syn::Error::new_spanned(
            sig,
            "suite methods must have the signature `fn(&self, t: &T)`",
        ));
    }
    if sig.asyncness.is_some() {
        return Err(syn::Error::new_spanned(
            sig.asyncness,
            "suite methods cannot be async; use `t.async_step` instead",
        ));
    }
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &sig.generics,
            "suite methods cannot be generic",
        ));
    }
    if !matches!(sig.output, syn::ReturnType::Default) {
        return Err(syn::Error::new_spanned(
            &sig.output,
            "suite methods return nothing; record failures through the handle",
        ));
    }
    Ok(())
}
