mod cond;
mod parser;
mod registry;
pub use cond::*;
pub use parser::*;
pub use registry::*;

use crate::driver::RegDriver;
use crate::error::*;
use crate::logger::{LogContext, FACTORY_TAR};
use crate::manager::RegManager;
use crate::reg::{BitField, Reg, RegArray, RegSpec};
use crate::reg_set::DirtyBit;
use reg_model_generator::*;
use std::sync::Arc;

/// Builds register graphs from `RegDef` tables and definition streams.
/// Holds one driver per address space; tables are built on the first one.
pub struct RegFactory {
    drivers: Vec<Arc<dyn RegDriver>>,
    log: Arc<LogContext>,
    registry: RegTypeRegistry,
}

impl RegFactory {
    pub fn new(drivers: Vec<Arc<dyn RegDriver>>, log: Arc<LogContext>) -> Self {
        RegFactory {
            drivers,
            log,
            registry: RegTypeRegistry::default(),
        }
    }

    pub fn registry(&self) -> &RegTypeRegistry {
        &self.registry
    }
    pub fn registry_mut(&mut self) -> &mut RegTypeRegistry {
        &mut self.registry
    }
    pub fn log(&self) -> &Arc<LogContext> {
        &self.log
    }

    pub fn driver(&self, bar: usize) -> Result<Arc<dyn RegDriver>> {
        self.drivers
            .get(bar)
            .cloned()
            .ok_or_else(|| Error::Driver(format!("no driver for bar {}", bar)))
    }

    fn build(
        &self,
        ctor: &str,
        name: String,
        offset: u64,
        size: RegSize,
        ty: RegType,
        bar: usize,
        args: &[CtorArg],
    ) -> Result<Arc<Reg>> {
        let spec = RegSpec {
            name,
            offset,
            size,
            ty,
            driver: self.driver(bar)?,
            log: self.log.clone(),
        };
        let reg = self.registry.construct(ctor, spec, args)?;
        tracing::debug!(target: FACTORY_TAR, "created {:?} by {}", reg, ctor);
        Ok(reg)
    }

    fn init_at_creation(reg: &Reg) -> Result<()> {
        if reg.ty().contains(RegType::INITIALIZE_AT_CREATION) {
            reg.read()?;
        }
        Ok(())
    }

    pub fn create_regs<E: NamedEnum>(
        &self,
        defs: &[RegDef],
        settings: &dyn Settings,
    ) -> Result<RegArray> {
        self.create_regs_in::<E>(0, defs, settings)
    }

    /// Builds the registers of a table on address space `bar`. The array has a
    /// slot for every enum value and every definition id; skipped definitions
    /// leave their slot empty.
    pub fn create_regs_in<E: NamedEnum>(
        &self,
        bar: usize,
        defs: &[RegDef],
        settings: &dyn Settings,
    ) -> Result<RegArray> {
        let len = defs
            .iter()
            .map(|d| d.id + 1)
            .max()
            .unwrap_or(0)
            .max(E::count());
        let mut regs: Vec<Option<Arc<Reg>>> = vec![None; len];
        for def in defs {
            if let Some(cond) = def.condition {
                if !evaluate(cond, settings)? {
                    tracing::debug!(target: FACTORY_TAR, "skip reg {}: {}", def.id, cond);
                    continue;
                }
            }
            let name = E::name_of(def.id)
                .map(|n| n.to_string())
                .unwrap_or_else(|| format!("Reg{}", def.id));
            if regs[def.id].is_some() {
                return Err(Error::NameCollision(name));
            }
            let reg = self.build(def.ctor, name, def.offset, def.size, def.ty, bar, &[])?;
            self.create_fields(&reg, &def.fields, settings)?;
            Self::init_at_creation(&reg)?;
            regs[def.id] = Some(reg);
        }
        Ok(Arc::new(regs))
    }

    pub fn create_group<E: NamedEnum>(
        &self,
        manager: &mut RegManager,
        group: &str,
        defs: &[RegDef],
        settings: &dyn Settings,
    ) -> Result<Arc<DirtyBit>> {
        let regs = self.create_regs::<E>(defs, settings)?;
        manager.add_group(group, regs)
    }

    /// Adds the fields of `defs` to `reg` at their id slots. Without an
    /// explicit kind the register type picks one.
    pub fn create_fields(
        &self,
        reg: &Arc<Reg>,
        defs: &[BitFieldDef],
        settings: &dyn Settings,
    ) -> Result<Vec<Arc<BitField>>> {
        let mut fields = vec![];
        for def in defs {
            if let Some(cond) = def.condition {
                if !evaluate(cond, settings)? {
                    continue;
                }
            }
            if reg.field_at(def.id).is_some() || reg.field(def.name).is_some() {
                return Err(Error::NameCollision(format!("{}:{}", reg.name(), def.name)));
            }
            fields.push(reg.add_field(Some(def.id), def.name, def.start, def.width, def.kind)?);
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverOp, SimDriver};
    use std::collections::HashMap;

    #[reg_enum]
    enum ScopeRegs {
        Ctrl,
        Status,
        Trigger = 4,
    }

    fn factory(d: &Arc<SimDriver>) -> RegFactory {
        RegFactory::new(
            vec![d.clone() as Arc<dyn RegDriver>],
            Arc::new(LogContext::default()),
        )
    }

    fn defs() -> Vec<RegDef> {
        vec![
            RegDef::new(ScopeRegs::Ctrl as usize, 0x0, RegType::RW)
                .with_field("en", 0, 1)
                .with_field("gain", 4, 3),
            RegDef::new(
                ScopeRegs::Status as usize,
                0x4,
                RegType::RO | RegType::INITIALIZE_AT_CREATION,
            ),
            RegDef::new(ScopeRegs::Trigger as usize, 0x10, RegType::EVENT).with_field("arm", 0, 1),
            RegDef::new(6, 0x18, RegType::RW)
                .with_ctor("Reg64", RegSize::U64)
                .with_condition("Model match ^dso"),
        ]
    }

    #[test]
    fn create_regs_test() {
        let d = Arc::new(SimDriver::new());
        d.poke(0x4, 0x5);
        let regs = factory(&d)
            .create_regs::<ScopeRegs>(&defs(), &HashMap::new())
            .unwrap();
        assert_eq!(regs.len(), 7);
        assert!(regs[2].is_none());
        assert!(regs[6].is_none());
        let ctrl = regs[0].as_ref().unwrap();
        assert_eq!(ctrl.name(), "Ctrl");
        assert_eq!(ctrl.field("gain").unwrap().mask(), 0x70);
        let status = regs[1].as_ref().unwrap();
        assert_eq!(status.cached(), 0x5);
        assert_eq!(d.ops(), vec![DriverOp::Read32(0x4)]);
        let trigger = regs[4].as_ref().unwrap();
        assert_eq!(trigger.field("arm").unwrap().kind(), FieldKind::Command);
    }

    #[test]
    fn create_regs_condition_test() {
        let d = Arc::new(SimDriver::new());
        let settings: HashMap<String, String> =
            [("Model".to_string(), "DSO-X".to_string())].into_iter().collect();
        let regs = factory(&d)
            .create_regs::<ScopeRegs>(&defs(), &settings)
            .unwrap();
        let wide = regs[6].as_ref().unwrap();
        assert_eq!(wide.name(), "Reg6");
        assert_eq!(wide.size(), RegSize::U64);
    }

    #[test]
    fn create_group_test() {
        let d = Arc::new(SimDriver::new());
        let mut m = RegManager::new();
        let f = factory(&d);
        let dirty = f
            .create_group::<ScopeRegs>(&mut m, "scope", &defs(), &HashMap::new())
            .unwrap();
        m.register("scope", "Ctrl").unwrap().set_value(1).unwrap();
        assert!(dirty.is_set());
        let dup = vec![RegDef::new(0, 0x0, RegType::RW), RegDef::new(0, 0x4, RegType::RW)];
        assert!(matches!(
            f.create_regs::<ScopeRegs>(&dup, &HashMap::new()),
            Err(Error::NameCollision(_))
        ));
        let unknown = vec![RegDef::new(0, 0x0, RegType::RW).with_ctor("Reg16", RegSize::U32)];
        assert!(matches!(
            f.create_regs::<ScopeRegs>(&unknown, &HashMap::new()),
            Err(Error::UnknownRegType(_))
        ));
    }

    #[test]
    fn create_fields_test() {
        let d = Arc::new(SimDriver::new());
        let f = factory(&d);
        let reg = f
            .build("Reg32", "cfg".to_string(), 0x20, RegSize::U32, RegType::RW, 0, &[])
            .unwrap();
        let defs = vec![
            BitFieldDef {
                id: 2,
                name: "mode",
                start: 8,
                width: 4,
                kind: Some(FieldKind::Control),
                condition: None,
            },
            BitFieldDef {
                id: 0,
                name: "opt",
                start: 0,
                width: 1,
                kind: None,
                condition: Some("Opt == 1"),
            },
        ];
        let fields = f.create_fields(&reg, &defs, &HashMap::new()).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(reg.field_at(2).unwrap().kind(), FieldKind::Control);
        assert!(reg.field_at(0).is_none());
        assert!(matches!(
            f.create_fields(&reg, &defs[..1], &HashMap::new()),
            Err(Error::NameCollision(_))
        ));
        let too_wide = [BitFieldDef {
            id: 3,
            name: "wide",
            start: 30,
            width: 4,
            kind: None,
            condition: None,
        }];
        assert!(matches!(
            f.create_fields(&reg, &too_wide, &HashMap::new()),
            Err(Error::FieldRange { .. })
        ));
        assert!(f.driver(1).is_err());
    }
}
