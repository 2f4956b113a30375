#[cfg(test)]
mod enum_tests {
    use reg_model_generator::*;

    #[reg_enum]
    #[derive(Debug, Clone, Copy)]
    enum TriggerReg {
        Arm = 0,
        Fire,
        Reset = 4,
        Status,
    }

    #[test]
    fn reg_enum_values_test() {
        let _ = TriggerReg::Arm;
        let _ = TriggerReg::Fire;
        let _ = TriggerReg::Reset;
        let _ = TriggerReg::Status;
        let vs = TriggerReg::variants();
        assert_eq!(vs.len(), 4);
        assert_eq!(TriggerReg::name_of(1), Some("Fire"));
        assert_eq!(TriggerReg::name_of(5), Some("Status"));
        assert_eq!(TriggerReg::name_of(2), None);
        assert_eq!(TriggerReg::count(), 4);
    }

    #[test]
    fn gen_enum_header_test() {
        let mut c_header = vec![];
        TriggerReg::gen_header(&HeaderType::C, &mut c_header).unwrap();
        let s = String::from_utf8_lossy(&c_header);
        println!("{}", s);
        assert!(s.contains("Reset = 4,"));
        assert!(s.contains("} TriggerReg;"));
    }
}

#[cfg(test)]
mod table_tests {
    use reg_model_generator::*;

    define_regs! {
        pub AdcRegs {
            Ctrl(RW): Reg32, 0x0 {
                enable: 0, 1;
                gain(Control): 4, 3;
                boost: 8, 1 if "Model == 2400";
            };
            Status(RO | VOLATILE_RW): Reg32, 0x4;
            Trigger(CMD): Reg32, 0x8 {
                fire: 0, 1;
                arm: 1, 1;
            };
            Timestamp(RO): Reg64, 0x10 if "Option match ^ts";
        }
    }

    #[test]
    fn gen_defs_test() {
        let defs = AdcRegs::defs();
        assert_eq!(defs.len(), 4);
        assert_eq!(AdcRegs::count(), 4);
        assert_eq!(AdcRegs::name_of(AdcRegs::Trigger as usize), Some("Trigger"));

        let ctrl = &defs[AdcRegs::Ctrl as usize];
        assert_eq!(ctrl.offset, 0);
        assert_eq!(ctrl.ty, RegType::RW);
        assert_eq!(ctrl.fields.len(), 3);
        assert_eq!(ctrl.fields[1].name, "gain");
        assert_eq!(ctrl.fields[1].kind, Some(FieldKind::Control));
        assert_eq!(ctrl.fields[2].condition, Some("Model == 2400"));

        let status = &defs[AdcRegs::Status as usize];
        assert_eq!(status.ty, RegType::RO | RegType::VOLATILE_RW);
        assert!(status.fields.is_empty());

        let ts = &defs[AdcRegs::Timestamp as usize];
        assert_eq!(ts.size, RegSize::U64);
        assert_eq!(ts.ctor, "Reg64");
        assert_eq!(ts.offset, 0x10);
    }

    #[test]
    fn gen_table_header_test() {
        let mut c_header = vec![];
        AdcRegs::gen_table_header(&mut c_header).unwrap();
        let s = String::from_utf8_lossy(&c_header);
        println!("{}", s);
        assert!(s.contains("#define ADC_REGS_TRIGGER_OFFSET 0x8"));
        assert!(s.contains("#define ADC_REGS_CTRL_GAIN_MASK 0x70"));
    }
}
