use crate::common::{expand_call, expand_named_enum, opt_str, FieldKind};
use proc_macro2::*;
use quote::quote;
use syn::parse::*;
use syn::punctuated::*;
use syn::*;

pub fn expand(input: TokenStream) -> TokenStream {
    let map: RegTable = expand_call!(parse2(input));
    let output = expand_call!(map.expand());
    quote! {
        #output
    }
}

#[derive(Debug)]
struct RegTable {
    is_pub: bool,
    name: Ident,
    regs: Punctuated<Reg, Token![;]>,
}

impl RegTable {
    fn expand(&self) -> Result<TokenStream> {
        let name = &self.name;
        let vis = if self.is_pub {
            quote! {pub}
        } else {
            quote! {}
        };
        let idents = self.regs.iter().map(|r| &r.name).collect::<Vec<_>>();
        let values = (0..self.regs.len())
            .map(|i| (idents[i].to_string(), quote! {#i}))
            .collect::<Vec<_>>();
        let named = expand_named_enum(name, &values);
        let defs = self
            .regs
            .iter()
            .enumerate()
            .map(|(i, r)| r.expand_def(i))
            .collect::<Result<Vec<_>>>()?;
        Ok(quote! {
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            #vis enum #name {
                #(#idents,)*
            }
            #named
            impl #name {
                pub fn defs() -> Vec<RegDef> {
                    vec![#(#defs,)*]
                }
                pub fn gen_table_header<W: std::io::Write>(header: &mut W) -> std::io::Result<()> {
                    let table = Self::render_name().from_case(Case::UpperCamel).to_case(Case::UpperSnake);
                    for d in Self::defs() {
                        let reg = Self::name_of(d.id).unwrap_or("").from_case(Case::UpperCamel).to_case(Case::UpperSnake);
                        writeln!(header, "#define {}_{}_OFFSET {:#x}", table, reg, d.offset)?;
                        for f in d.fields.iter() {
                            let field_name = format!("{}_{}_{}", table, reg, f.name.from_case(Case::Snake).to_case(Case::UpperSnake));
                            writeln!(header, "#define {}_POS {}", &field_name, f.start)?;
                            writeln!(header, "#define {}_MASK {:#x}", &field_name, field_mask(f.start, f.width))?;
                        }
                    }
                    Ok(())
                }
            }
        })
    }
}

impl Parse for RegTable {
    fn parse(input: ParseStream) -> Result<Self> {
        let is_pub = if input.peek(Token![pub]) {
            input.parse::<Token![pub]>()?;
            true
        } else {
            false
        };
        let name: Ident = input.parse::<Ident>()?;
        let content: ParseBuffer;
        braced!(content in input);
        Ok(RegTable {
            is_pub,
            name,
            regs: content.parse_terminated(Reg::parse, Token![;])?,
        })
    }
}

#[derive(Debug)]
struct Reg {
    name: Ident,
    flags: Punctuated<Ident, Token![|]>,
    ctor: Ident,
    offset: LitInt,
    condition: Option<LitStr>,
    fields: Punctuated<Field, Token![;]>,
}

impl Reg {
    fn expand_def(&self, i: usize) -> Result<TokenStream> {
        let flags = self.flags.iter().map(|f| quote! {RegType::#f});
        let ctor_s = self.ctor.to_string();
        let size = if ctor_s.ends_with("64") {
            quote! {RegSize::U64}
        } else {
            quote! {RegSize::U32}
        };
        let offset = &self.offset;
        let condition = opt_str(&self.condition);
        let fields = self
            .fields
            .iter()
            .enumerate()
            .map(|(id, f)| f.expand_def(id));
        Ok(quote! {
            RegDef {
                id: #i,
                offset: #offset,
                size: #size,
                ty: RegType::empty() #(| #flags)*,
                ctor: #ctor_s,
                condition: #condition,
                fields: vec![#(#fields,)*],
            }
        })
    }
}

impl Parse for Reg {
    fn parse(input: ParseStream) -> Result<Self> {
        let name = input.parse::<Ident>()?;
        let content: ParseBuffer;
        parenthesized!(content in input);
        let flags = Punctuated::<Ident, Token![|]>::parse_separated_nonempty(&content)?;
        input.parse::<Token![:]>()?;
        let ctor = input.parse::<Ident>()?;
        input.parse::<Token![,]>()?;
        let offset = input.parse::<LitInt>()?;
        let condition = if input.peek(Token![if]) {
            input.parse::<Token![if]>()?;
            Some(input.parse::<LitStr>()?)
        } else {
            None
        };
        let fields = if input.peek(token::Brace) {
            let content: ParseBuffer;
            braced!(content in input);
            content.parse_terminated(Field::parse, Token![;])?
        } else {
            Punctuated::new()
        };
        Ok(Reg {
            name,
            flags,
            ctor,
            offset,
            condition,
            fields,
        })
    }
}

#[derive(Debug)]
struct Field {
    name: Ident,
    kind: Option<FieldKind>,
    start: LitInt,
    width: LitInt,
    condition: Option<LitStr>,
}

impl Field {
    fn expand_def(&self, id: usize) -> TokenStream {
        let name_s = self.name.to_string();
        let start = &self.start;
        let width = &self.width;
        let kind = match &self.kind {
            Some(k) => {
                let k = k.expand();
                quote! {Some(#k)}
            }
            None => quote! {None},
        };
        let condition = opt_str(&self.condition);
        quote! {
            BitFieldDef {
                id: #id,
                name: #name_s,
                start: #start,
                width: #width,
                kind: #kind,
                condition: #condition,
            }
        }
    }
}

impl Parse for Field {
    fn parse(input: ParseStream) -> Result<Self> {
        let name = input.parse::<Ident>()?;
        let kind = if input.peek(token::Paren) {
            let content: ParseBuffer;
            parenthesized!(content in input);
            Some(content.parse::<FieldKind>()?)
        } else {
            None
        };
        input.parse::<Token![:]>()?;
        let start = input.parse::<LitInt>()?;
        input.parse::<Token![,]>()?;
        let width = input.parse::<LitInt>()?;
        let condition = if input.peek(Token![if]) {
            input.parse::<Token![if]>()?;
            Some(input.parse::<LitStr>()?)
        } else {
            None
        };
        Ok(Field {
            name,
            kind,
            start,
            width,
            condition,
        })
    }
}
