use std::fmt;

#[derive(Debug)]
pub enum Error {
    FieldRange {
        field: String,
        start: u32,
        width: u32,
        bits: u32,
    },
    NameCollision(String),
    Parse {
        line: usize,
        text: String,
        reason: String,
    },
    UnresolvedRef(String),
    UnknownRegType(String),
    BadCtorArgs {
        ty: String,
        reason: String,
    },
    UnknownName(String),
    BufferOverflow {
        name: String,
        requested: usize,
        capacity: usize,
    },
    UnsupportedWidth(usize),
    NotScalar(String),
    Detached(String),
    Condition(String),
    Sealed(String),
    Driver(String),
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::FieldRange {
                field,
                start,
                width,
                bits,
            } => write!(
                f,
                "bitfield {} (start {}, width {}) exceeds {} register bits",
                field, start, width, bits
            ),
            Error::NameCollision(name) => write!(f, "name '{}' is already in use", name),
            Error::Parse { line, text, reason } => {
                write!(f, "line {}: {}: '{}'", line, reason, text)
            }
            Error::UnresolvedRef(r) => write!(f, "unresolved object reference '{}'", r),
            Error::UnknownRegType(t) => write!(f, "unknown register type '{}'", t),
            Error::BadCtorArgs { ty, reason } => {
                write!(f, "cannot construct '{}': {}", ty, reason)
            }
            Error::UnknownName(name) => write!(f, "unrecognized register/field name '{}'", name),
            Error::BufferOverflow {
                name,
                requested,
                capacity,
            } => write!(
                f,
                "{}: transfer of {} bytes exceeds buffer capacity {}",
                name, requested, capacity
            ),
            Error::UnsupportedWidth(w) => write!(f, "unsupported register width {} bytes", w),
            Error::NotScalar(name) => write!(f, "{} is not a scalar register", name),
            Error::Detached(name) => write!(f, "{} has no owning register", name),
            Error::Condition(c) => write!(f, "bad condition: {}", c),
            Error::Sealed(name) => write!(f, "{} is sealed, resources can not be reassigned", name),
            Error::Driver(e) => write!(f, "driver error: {}", e),
            Error::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl std::convert::From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl std::convert::From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Error::Condition(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
