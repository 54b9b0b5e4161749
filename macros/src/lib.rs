use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, ItemFn};

/// Marks a scenario/property test function. Enforces the same signature
/// discipline a plain `#[test]` relies on implicitly (no arguments, no
/// return value) and expands to one.
#[proc_macro_attribute]
pub fn vm_test(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    if !input.sig.inputs.is_empty() {
        return syn::Error::new_spanned(input.sig.inputs, "vm_test functions must have no arguments")
            .to_compile_error()
            .into();
    }
    match input.sig.output {
        syn::ReturnType::Default => {}
        syn::ReturnType::Type(_, _) => {
            return syn::Error::new_spanned(input.sig.output, "vm_test functions must not return a value")
                .to_compile_error()
                .into();
        }
    }

    let output = quote! {
        #[test]
        #input
    };

    output.into()
}
