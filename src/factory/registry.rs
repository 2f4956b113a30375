use crate::error::*;
use crate::reg::*;
use reg_model_generator::RegSize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Resolved argument of a register constructor: another register, a field, or
/// a plain integer.
#[derive(Debug, Clone)]
pub enum CtorArg {
    Reg(Arc<Reg>),
    Field(Arc<BitField>),
    Int(i64),
}

impl CtorArg {
    fn kind_name(&self) -> &'static str {
        match self {
            CtorArg::Reg(_) => "register",
            CtorArg::Field(_) => "field",
            CtorArg::Int(_) => "integer",
        }
    }
}

pub type RegCtor = Arc<dyn Fn(RegSpec, &[CtorArg]) -> Result<Arc<Reg>> + Send + Sync>;

/// Register type name to constructor table. Names are matched exactly.
#[derive(Clone)]
pub struct RegTypeRegistry {
    ctors: HashMap<String, RegCtor>,
}

impl std::fmt::Debug for RegTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = self.names();
        names.sort();
        f.debug_struct("RegTypeRegistry").field("ctors", &names).finish()
    }
}

impl Default for RegTypeRegistry {
    fn default() -> Self {
        let mut reg = RegTypeRegistry {
            ctors: HashMap::new(),
        };
        reg.register("Reg32", |spec, args| {
            no_args("Reg32", args)?;
            Ok(Reg::mem(RegSpec {
                size: RegSize::U32,
                ..spec
            }))
        });
        reg.register("Reg64", |spec, args| {
            no_args("Reg64", args)?;
            Ok(Reg::mem(RegSpec {
                size: RegSize::U64,
                ..spec
            }))
        });
        reg.register("RegAddrData", addr_data);
        reg.register("RegDuplicate", duplicate);
        reg.register("RegBuffer", |spec, args| {
            let ty = "RegBuffer";
            if args.len() != 1 {
                return Err(bad(ty, "expects a capacity"));
            }
            let capacity = capacity_arg(ty, args, 0)?;
            Ok(Reg::new(spec, RegKind::Buffer(BufferRegion::new(capacity))))
        });
        reg.register("RegFlashBuffer", flash_buffer);
        reg
    }
}

impl RegTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the constructor for `name`.
    pub fn register<F>(&mut self, name: &str, ctor: F)
    where
        F: Fn(RegSpec, &[CtorArg]) -> Result<Arc<Reg>> + Send + Sync + 'static,
    {
        self.ctors.insert(name.to_string(), Arc::new(ctor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ctors.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.ctors.keys().map(|k| k.as_str()).collect()
    }

    pub fn construct(&self, name: &str, spec: RegSpec, args: &[CtorArg]) -> Result<Arc<Reg>> {
        let ctor = self
            .ctors
            .get(name)
            .ok_or_else(|| Error::UnknownRegType(name.to_string()))?;
        ctor(spec, args)
    }
}

fn bad(ty: &str, reason: &str) -> Error {
    Error::BadCtorArgs {
        ty: ty.to_string(),
        reason: reason.to_string(),
    }
}

fn no_args(ty: &str, args: &[CtorArg]) -> Result<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(bad(ty, &format!("takes no arguments, got {}", args.len())))
    }
}

fn unexpected(ty: &str, i: usize, want: &str, got: Option<&CtorArg>) -> Error {
    bad(
        ty,
        &format!(
            "argument {} should be a {}, got {}",
            i,
            want,
            got.map_or("nothing", |a| a.kind_name())
        ),
    )
}

fn field_arg(ty: &str, args: &[CtorArg], i: usize) -> Result<Arc<BitField>> {
    match args.get(i) {
        Some(CtorArg::Field(f)) => Ok(f.clone()),
        other => Err(unexpected(ty, i, "field", other)),
    }
}

fn reg_arg(ty: &str, args: &[CtorArg], i: usize) -> Result<Arc<Reg>> {
    match args.get(i) {
        Some(CtorArg::Reg(r)) => Ok(r.clone()),
        other => Err(unexpected(ty, i, "register", other)),
    }
}

fn int_arg(ty: &str, args: &[CtorArg], i: usize) -> Result<i64> {
    match args.get(i) {
        Some(CtorArg::Int(v)) => Ok(*v),
        other => Err(unexpected(ty, i, "integer", other)),
    }
}

fn capacity_arg(ty: &str, args: &[CtorArg], i: usize) -> Result<usize> {
    let v = int_arg(ty, args, i)?;
    if v <= 0 {
        return Err(bad(ty, &format!("capacity {} is not positive", v)));
    }
    Ok(v as usize)
}

// addr, data [, rw [, read_val, write_val]]
fn addr_data(spec: RegSpec, args: &[CtorArg]) -> Result<Arc<Reg>> {
    let ty = "RegAddrData";
    let addr = field_arg(ty, args, 0)?;
    let data = field_arg(ty, args, 1)?;
    let mut ad = match args.len() {
        2 => AddrData::new(addr, data, None),
        3 | 5 => AddrData::new(addr, data, Some(field_arg(ty, args, 2)?)),
        n => return Err(bad(ty, &format!("takes 2, 3 or 5 arguments, got {}", n))),
    };
    if args.len() == 5 {
        ad = ad.with_indicator_values(int_arg(ty, args, 3)? as u64, int_arg(ty, args, 4)? as u64);
    }
    let size = ad.data_field().reg()?.size();
    Ok(Reg::new(RegSpec { size, ..spec }, RegKind::AddrData(ad)))
}

fn duplicate(spec: RegSpec, args: &[CtorArg]) -> Result<Arc<Reg>> {
    let ty = "RegDuplicate";
    let regs = (0..args.len())
        .map(|i| reg_arg(ty, args, i))
        .collect::<Result<Vec<_>>>()?;
    let dup = Duplicate::new(regs)?;
    let size = dup.regs()[0].size();
    if dup.regs().iter().any(|r| r.size() != size) {
        return Err(bad(ty, "backing registers differ in size"));
    }
    Ok(Reg::new(RegSpec { size, ..spec }, RegKind::Dup(dup)))
}

// capacity, cmd field, reset command, data register, busy field [, timeout ms]
fn flash_buffer(spec: RegSpec, args: &[CtorArg]) -> Result<Arc<Reg>> {
    let ty = "RegFlashBuffer";
    if args.len() != 5 && args.len() != 6 {
        return Err(bad(ty, &format!("takes 5 or 6 arguments, got {}", args.len())));
    }
    let mut flash = FlashBuffer::new(
        capacity_arg(ty, args, 0)?,
        field_arg(ty, args, 1)?,
        int_arg(ty, args, 2)? as u64,
        reg_arg(ty, args, 3)?,
        field_arg(ty, args, 4)?,
    );
    if args.len() == 6 {
        let ms = int_arg(ty, args, 5)?;
        if ms < 0 {
            return Err(bad(ty, "negative timeout"));
        }
        flash = flash.with_timeout(Duration::from_millis(ms as u64));
    }
    Ok(Reg::new(spec, RegKind::Flash(flash)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SimDriver;
    use crate::reg::test_helper::*;
    use reg_model_generator::RegType;

    #[test]
    fn default_ctors_test() {
        let d = Arc::new(SimDriver::new());
        let registry = RegTypeRegistry::default();
        let r64 = registry
            .construct("Reg64", spec("cnt", 0x40, RegType::RW, &d), &[])
            .unwrap();
        assert_eq!(r64.size(), RegSize::U64);
        let buf = registry
            .construct(
                "RegBuffer",
                spec("wave", 0x1000, RegType::BUFFER, &d),
                &[CtorArg::Int(256)],
            )
            .unwrap();
        assert_eq!(buf.as_buffer().unwrap().capacity(), 256);
        assert_eq!(registry.names().len(), 6);
    }

    #[test]
    fn ctor_errors_test() {
        let d = Arc::new(SimDriver::new());
        let registry = RegTypeRegistry::default();
        assert!(matches!(
            registry.construct("Reg16", spec("x", 0, RegType::RW, &d), &[]),
            Err(Error::UnknownRegType(_))
        ));
        assert!(matches!(
            registry.construct("Reg32", spec("x", 0, RegType::RW, &d), &[CtorArg::Int(1)]),
            Err(Error::BadCtorArgs { .. })
        ));
        assert!(matches!(
            registry.construct("RegBuffer", spec("x", 0, RegType::BUFFER, &d), &[]),
            Err(Error::BadCtorArgs { .. })
        ));
        let ctrl = mem_reg("ctrl", 0, RegType::RW, &d);
        assert!(matches!(
            registry.construct(
                "RegAddrData",
                spec("x", 0, RegType::RW, &d),
                &[CtorArg::Reg(ctrl.clone()), CtorArg::Reg(ctrl)]
            ),
            Err(Error::BadCtorArgs { .. })
        ));
    }

    #[test]
    fn composite_ctors_test() {
        let d = Arc::new(SimDriver::new());
        let registry = RegTypeRegistry::default();
        let ctrl = mem_reg("spi", 0x100, RegType::RW, &d);
        let data = ctrl.add_field(None, "data", 0, 16, None).unwrap();
        let addr = ctrl.add_field(None, "addr", 16, 8, None).unwrap();
        let ad = registry
            .construct(
                "RegAddrData",
                spec("gain", 0x3, RegType::RW, &d),
                &[CtorArg::Field(addr), CtorArg::Field(data)],
            )
            .unwrap();
        assert_eq!(ad.kind().type_name(), "AddrData");

        let a = mem_reg("a", 0x0, RegType::RW, &d);
        let b = mem_reg("b", 0x4, RegType::RW, &d);
        let dup = registry
            .construct(
                "RegDuplicate",
                spec("ab", 0x0, RegType::RW, &d),
                &[CtorArg::Reg(a), CtorArg::Reg(b)],
            )
            .unwrap();
        assert_eq!(dup.kind().type_name(), "Duplicate");
    }

    #[test]
    fn custom_ctor_test() {
        let d = Arc::new(SimDriver::new());
        let mut registry = RegTypeRegistry::new();
        registry.register("RegStatus", |spec, _args| {
            Ok(Reg::mem(RegSpec {
                ty: spec.ty | RegType::VOLATILE_RW,
                ..spec
            }))
        });
        let r = registry
            .construct("RegStatus", spec("st", 0x8, RegType::RO, &d), &[])
            .unwrap();
        assert!(r.ty().contains(RegType::VOLATILE_RW));
        assert!(registry.contains("RegStatus"));
    }
}
