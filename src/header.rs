use crate::manager::RegManager;
use crate::reg::RegKind;
use reg_model_generator::*;

fn c_name(s: &str) -> String {
    s.to_case(Case::UpperSnake)
}

impl ObjGenHeader for RegManager {
    fn gen_c_header<W: std::io::Write>(&self, header: &mut W) -> std::io::Result<()> {
        // sets only regroup registers already listed under their own group
        for (group, regs) in self.groups().filter(|(g, _)| self.reg_set(g).is_none()) {
            let group_name = c_name(group);
            writeln!(header, "// {}", group)?;
            for r in regs.iter().flatten() {
                let reg_name = format!("{}_{}", group_name, c_name(r.name()));
                writeln!(header, "#define {}_OFFSET {:#x}", reg_name, r.offset())?;
                match r.kind() {
                    RegKind::Buffer(b) => {
                        writeln!(header, "#define {}_SIZE {:#x}", reg_name, b.capacity())?
                    }
                    RegKind::Flash(f) => {
                        writeln!(header, "#define {}_SIZE {:#x}", reg_name, f.capacity())?
                    }
                    _ => {}
                }
                for f in r.fields() {
                    let field_name = format!("{}_{}", reg_name, c_name(f.short_name()));
                    writeln!(header, "#define {}_POS {}", field_name, f.start())?;
                    writeln!(header, "#define {}_MASK {:#x}", field_name, f.mask())?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{RegDriver, SimDriver};
    use crate::factory::RegFactory;
    use crate::logger::LogContext;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[test]
    fn manager_c_header_test() {
        let f = RegFactory::new(
            vec![Arc::new(SimDriver::new()) as Arc<dyn RegDriver>],
            Arc::new(LogContext::default()),
        );
        let mut m = RegManager::new();
        let text = "
front_end
adc_ctrl 0x10 Reg32 - RW
  gain 4 3
wave 0x1000 RegBuffer - Buffer|NoValue 256
set pair front_end.adc_ctrl front_end.wave
";
        f.parse_stream(text.as_bytes(), &mut m, &HashMap::new())
            .unwrap();
        let mut out = vec![];
        m.gen_header(&HeaderType::C, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("#define FRONT_END_ADC_CTRL_OFFSET 0x10\n"));
        assert!(out.contains("#define FRONT_END_ADC_CTRL_GAIN_POS 4\n"));
        assert!(out.contains("#define FRONT_END_ADC_CTRL_GAIN_MASK 0x70\n"));
        assert!(out.contains("#define FRONT_END_WAVE_SIZE 0x100\n"));
        assert!(!out.contains("PAIR_"));
    }
}
