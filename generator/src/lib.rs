mod register;
pub use bitflags;
pub use convert_case::*;
pub use reg_model_generator_macros::*;
pub use register::*;

#[derive(Debug, Clone)]
pub struct EnumVariant {
    pub name: &'static str,
    pub value: usize,
}

/// Naming enum of a register table. Ids used by `RegDef`s are the variant values.
pub trait NamedEnum {
    fn variants() -> Vec<EnumVariant>;
    fn count() -> usize {
        Self::variants().len()
    }
    fn name_of(id: usize) -> Option<&'static str> {
        Self::variants()
            .into_iter()
            .find(|v| v.value == id)
            .map(|v| v.name)
    }
}

#[derive(Debug)]
pub enum HeaderType {
    C,
}

impl HeaderType {
    pub fn from_lang(lang: &str) -> Option<HeaderType> {
        match lang {
            "c" => Some(HeaderType::C),
            _ => None,
        }
    }
}

pub trait GenHeader {
    fn render_name() -> &'static str;
    fn gen_header<W: std::io::Write>(
        header_type: &HeaderType,
        header: &mut W,
    ) -> std::io::Result<()> {
        writeln!(header, "")?;
        match header_type {
            HeaderType::C => Self::gen_c_header(header),
        }?;
        writeln!(header, "")?;
        Ok(())
    }

    fn gen_c_header<W: std::io::Write>(_header: &mut W) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!("{}: unsupported gen_c_header!", Self::render_name()),
        ))
    }
}

pub trait ObjGenHeader {
    fn gen_header<W: std::io::Write>(
        &self,
        header_type: &HeaderType,
        header: &mut W,
    ) -> std::io::Result<()> {
        writeln!(header, "")?;
        match header_type {
            HeaderType::C => self.gen_c_header(header),
        }?;
        writeln!(header, "")?;
        Ok(())
    }

    fn gen_c_header<W: std::io::Write>(&self, _header: &mut W) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "unsupported gen_c_header!",
        ))
    }
}

/// Bit mask of `width` bits starting at `start`.
pub const fn field_mask(start: u32, width: u32) -> u64 {
    if width == 0 {
        0
    } else if width >= 64 {
        u64::MAX << start
    } else {
        ((1u64 << width) - 1) << start
    }
}
