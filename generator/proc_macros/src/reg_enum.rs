use crate::common::{enum_values, expand_call, expand_named_enum};
use proc_macro2::*;
use quote::quote;
use syn::*;

pub fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return Error::new(Span::call_site(), "reg_enum takes no arguments!").to_compile_error();
    }
    let e: ItemEnum = expand_call!(parse2(item.clone()));
    let variants = expand_call!(enum_values(&e));
    let output = expand_named_enum(&e.ident, &variants);
    quote! {
        #item
        #output
    }
}
