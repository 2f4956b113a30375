use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RegType: u32 {
        const RW = 1 << 0;
        const RO = 1 << 1;
        const WO = 1 << 2;
        const CMD = 1 << 3;
        const EVENT = 1 << 4;
        const BUFFER = 1 << 5;
        const VOLATILE_RW = 1 << 6;
        const NO_VALUE = 1 << 7;
        const NO_VALUE_FILTER = 1 << 8;
        const NO_FORCE = 1 << 9;
        const CANNOT_READ_DIRECTLY = 1 << 10;
        const INITIALIZE_AT_CREATION = 1 << 11;
        const FLASH = 1 << 12;
        const INT = 1 << 13;
    }
}

impl RegType {
    /// Looks a single flag up by name, ignoring case and underscores,
    /// so `VolatileRw`, `volatile_rw` and `VOLATILE_RW` are the same flag.
    pub fn from_loose_name(name: &str) -> Option<RegType> {
        let wanted = name.replace('_', "");
        RegType::all()
            .iter_names()
            .find(|(n, _)| n.replace('_', "").eq_ignore_ascii_case(&wanted))
            .map(|(_, f)| f)
    }

    /// Parses `|` joined flag names, `-` or an empty string meaning no flags.
    pub fn parse_flags(s: &str) -> Option<RegType> {
        let s = s.trim();
        if s.is_empty() || s == "-" {
            return Some(RegType::empty());
        }
        s.split('|')
            .map(|n| RegType::from_loose_name(n.trim()))
            .try_fold(RegType::empty(), |acc, f| f.map(|f| acc | f))
    }

    pub fn is_read_only(&self) -> bool {
        self.contains(RegType::RO)
    }

    pub fn is_write_only(&self) -> bool {
        self.contains(RegType::WO)
    }

    pub fn has_no_value(&self) -> bool {
        self.contains(RegType::NO_VALUE)
    }

    pub fn is_cmd_or_event(&self) -> bool {
        self.intersects(RegType::CMD | RegType::EVENT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegSize {
    U32,
    U64,
}

impl RegSize {
    pub fn bytes(&self) -> usize {
        match self {
            RegSize::U32 => 4,
            RegSize::U64 => 8,
        }
    }
    pub fn bits(&self) -> u32 {
        self.bytes() as u32 * 8
    }
    pub fn full_mask(&self) -> u64 {
        match self {
            RegSize::U32 => 0xffff_ffff,
            RegSize::U64 => u64::MAX,
        }
    }
    pub fn from_bytes(bytes: usize) -> Option<RegSize> {
        match bytes {
            4 => Some(RegSize::U32),
            8 => Some(RegSize::U64),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Normal,
    Command,
    Control,
}

impl FieldKind {
    /// `-`, `auto` and `BitField` leave the choice to the owning register.
    pub fn from_placeholder(s: &str) -> Option<Option<FieldKind>> {
        match s.to_ascii_lowercase().as_str() {
            "-" | "auto" | "bitfield" => Some(None),
            "normal" => Some(Some(FieldKind::Normal)),
            "cmd" | "command" | "event" => Some(Some(FieldKind::Command)),
            "control" => Some(Some(FieldKind::Control)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BitFieldDef {
    pub id: usize,
    pub name: &'static str,
    pub start: u32,
    pub width: u32,
    pub kind: Option<FieldKind>,
    pub condition: Option<&'static str>,
}

#[derive(Debug, Clone)]
pub struct RegDef {
    pub id: usize,
    pub offset: u64,
    pub size: RegSize,
    pub ty: RegType,
    pub ctor: &'static str,
    pub condition: Option<&'static str>,
    pub fields: Vec<BitFieldDef>,
}

impl RegDef {
    pub fn new(id: usize, offset: u64, ty: RegType) -> Self {
        RegDef {
            id,
            offset,
            size: RegSize::U32,
            ty,
            ctor: "Reg32",
            condition: None,
            fields: vec![],
        }
    }

    pub fn with_ctor(mut self, ctor: &'static str, size: RegSize) -> Self {
        self.ctor = ctor;
        self.size = size;
        self
    }

    pub fn with_condition(mut self, condition: &'static str) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_field(mut self, name: &'static str, start: u32, width: u32) -> Self {
        let id = self.fields.len();
        self.fields.push(BitFieldDef {
            id,
            name,
            start,
            width,
            kind: None,
            condition: None,
        });
        self
    }
}
