mod common;
mod define_regs;
mod reg_enum;

#[proc_macro_attribute]
pub fn reg_enum(
    attr: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let attr = proc_macro2::TokenStream::from(attr);
    let item = proc_macro2::TokenStream::from(item);
    let output: proc_macro2::TokenStream = reg_enum::expand(attr, item);
    proc_macro::TokenStream::from(output)
}

#[proc_macro]
pub fn define_regs(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = proc_macro2::TokenStream::from(input);
    let output: proc_macro2::TokenStream = define_regs::expand(input);
    proc_macro::TokenStream::from(output)
}
