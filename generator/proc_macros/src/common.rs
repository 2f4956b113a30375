use proc_macro2::*;
use quote::quote;
use syn::parse::*;
use syn::*;

macro_rules! expand_call {
    ($exp:expr) => {
        match $exp {
            Ok(result) => result,
            Err(err) => return err.to_compile_error(),
        }
    };
}
pub(crate) use expand_call;

mod kind_kw {
    syn::custom_keyword!(Normal);
    syn::custom_keyword!(Command);
    syn::custom_keyword!(Control);
}

#[derive(Debug)]
pub(crate) enum FieldKind {
    Normal,
    Command,
    Control,
}

impl FieldKind {
    pub(crate) fn expand(&self) -> TokenStream {
        match self {
            FieldKind::Normal => quote! {FieldKind::Normal},
            FieldKind::Command => quote! {FieldKind::Command},
            FieldKind::Control => quote! {FieldKind::Control},
        }
    }
}

impl Parse for FieldKind {
    fn parse(input: ParseStream) -> Result<Self> {
        if input.parse::<kind_kw::Normal>().is_ok() {
            Ok(FieldKind::Normal)
        } else if input.parse::<kind_kw::Command>().is_ok() {
            Ok(FieldKind::Command)
        } else if input.parse::<kind_kw::Control>().is_ok() {
            Ok(FieldKind::Control)
        } else {
            Err(input.error("Invalid field kind!"))
        }
    }
}

pub(crate) fn opt_str(s: &Option<LitStr>) -> TokenStream {
    match s {
        Some(s) => quote! {Some(#s)},
        None => quote! {None},
    }
}

/// `NamedEnum` and `GenHeader` impls shared by `#[reg_enum]` and `define_regs!`.
pub(crate) fn expand_named_enum(name: &Ident, variants: &[(String, TokenStream)]) -> TokenStream {
    let name_s = name.to_string();
    let entries = variants.iter().map(|(ident_s, value)| {
        quote! {
            EnumVariant {name: #ident_s, value: (#value) as usize},
        }
    });
    quote! {
        impl NamedEnum for #name {
            fn variants() -> Vec<EnumVariant> {
                vec![#(#entries)*]
            }
        }

        impl GenHeader for #name {
            fn render_name() -> &'static str {
                #name_s
            }
            fn gen_c_header<W: std::io::Write>(header: &mut W) -> std::io::Result<()> {
                writeln!(header,"typedef enum {{")?;
                for f in <Self as NamedEnum>::variants() {
                    writeln!(header,"    {} = {},", f.name, f.value)?;
                }
                writeln!(header,"}} {};", Self::render_name())?;
                Ok(())
            }
        }
    }
}

/// Variant values of a plain enum; implicit discriminants continue from the last explicit one.
pub(crate) fn enum_values(e: &ItemEnum) -> Result<Vec<(String, TokenStream)>> {
    let mut last: Option<TokenStream> = None;
    let mut offset = 0usize;
    e.variants
        .iter()
        .map(|v| {
            if !matches!(v.fields, Fields::Unit) {
                return Err(Error::new(
                    v.ident.span(),
                    "Register naming enums must be fieldless!",
                ));
            }
            let off = Literal::usize_unsuffixed(offset);
            let value = match &v.discriminant {
                Some((_, expr)) => {
                    last = Some(quote! {#expr});
                    offset = 0;
                    quote! {#expr}
                }
                None => match &last {
                    Some(base) => quote! {(#base) + #off},
                    None => quote! {#off},
                },
            };
            offset += 1;
            Ok((v.ident.to_string(), value))
        })
        .collect()
}
