use super::*;
use crate::reg_set::RegSet;
use std::io::BufRead;

pub const DEFAULT_GROUP: &str = "default";
const CONDITION_KW: &str = "if";
const SET_KW: &str = "set";
const SUPERGROUP_KW: &str = "supergroup";

// A register line has at least: name offset type field-kind flags
const REG_MIN_TOKENS: usize = 5;

fn is_separator(c: char) -> bool {
    c.is_whitespace() || c == ','
}

/// Splits a line into tokens and the raw condition text after `if`. A token
/// starting with `#` or `//` ends the line; the condition is kept verbatim.
fn split_line(line: &str) -> (Vec<&str>, Option<&str>) {
    let mut tokens = vec![];
    let mut rest = line;
    loop {
        rest = rest.trim_start_matches(is_separator);
        if rest.is_empty() || rest.starts_with('#') || rest.starts_with("//") {
            return (tokens, None);
        }
        let end = rest.find(is_separator).unwrap_or(rest.len());
        let (token, tail) = rest.split_at(end);
        if token == CONDITION_KW {
            return (tokens, Some(tail.trim()));
        }
        tokens.push(token);
        rest = tail;
    }
}

fn is_keyword_line(tokens: &[&str], kw: &str) -> bool {
    tokens.len() >= 3 && tokens[0].eq_ignore_ascii_case(kw) && parse_int(tokens[1]).is_none()
}

enum OpenReg {
    None,
    Reg(Arc<Reg>, Option<FieldKind>),
    // condition was false, its fields are skipped too
    Skipped,
}

struct PendingGroup {
    name: String,
    regs: Vec<Option<Arc<Reg>>>,
    explicit: bool,
}

impl PendingGroup {
    fn new(name: &str, explicit: bool) -> Self {
        PendingGroup {
            name: name.to_string(),
            regs: vec![],
            explicit,
        }
    }

    fn find(&self, name: &str) -> Option<Arc<Reg>> {
        self.regs
            .iter()
            .flatten()
            .find(|r| r.name() == name)
            .cloned()
    }

    fn commit(self, manager: &mut RegManager) -> Result<()> {
        if !self.explicit && self.regs.is_empty() {
            return Ok(());
        }
        manager.add_group(&self.name, Arc::new(self.regs))?;
        Ok(())
    }
}

struct StreamParser<'a> {
    factory: &'a RegFactory,
    settings: &'a dyn Settings,
    group: PendingGroup,
    open: OpenReg,
    bar: usize,
    created: usize,
    // added once every group is committed
    supergroups: Vec<(String, Vec<String>)>,
    line: usize,
    text: String,
}

impl<'a> StreamParser<'a> {
    fn error(&self, reason: &str) -> Error {
        Error::Parse {
            line: self.line,
            text: self.text.clone(),
            reason: reason.to_string(),
        }
    }

    fn parse_line(
        &mut self,
        manager: &mut RegManager,
        tokens: &[&str],
        cond: Option<&str>,
    ) -> Result<()> {
        let is_set = is_keyword_line(tokens, SET_KW);
        let is_supergroup = is_keyword_line(tokens, SUPERGROUP_KW);
        let is_keyword = is_set || is_supergroup;
        let is_field = !is_keyword && tokens.len() == 3 && !matches!(self.open, OpenReg::None);
        let is_reg = !is_keyword && tokens.len() >= REG_MIN_TOKENS;
        if cond.is_some() && !(is_field || is_reg || is_keyword) {
            return Err(self.error(
                "conditions are only allowed on register, bitfield, set and supergroup lines",
            ));
        }
        let included = match cond {
            Some("") => return Err(self.error("empty condition")),
            Some(c) => evaluate(c, self.settings)?,
            None => true,
        };
        if is_keyword {
            self.open = OpenReg::None;
            if !included {
                tracing::debug!(target: FACTORY_TAR, "line {}: skip {} {}", self.line, tokens[0], tokens[1]);
                return Ok(());
            }
            return if is_set {
                self.reg_set(manager, tokens)
            } else {
                self.supergroups.push((
                    tokens[1].to_string(),
                    tokens[2..].iter().map(|t| t.to_string()).collect(),
                ));
                Ok(())
            };
        }
        match tokens.len() {
            1 => {
                let group = std::mem::replace(&mut self.group, PendingGroup::new(tokens[0], true));
                group.commit(manager)?;
                self.open = OpenReg::None;
                Ok(())
            }
            2 if tokens[0].eq_ignore_ascii_case("bar") => {
                let bar = parse_int(tokens[1])
                    .filter(|b| *b >= 0)
                    .ok_or_else(|| self.error("bad bar index"))? as usize;
                self.factory.driver(bar)?;
                self.bar = bar;
                self.open = OpenReg::None;
                Ok(())
            }
            _ if is_field => {
                if included {
                    self.field(tokens)
                } else {
                    Ok(())
                }
            }
            _ if is_reg => {
                if included {
                    self.register(manager, tokens)
                } else {
                    tracing::debug!(target: FACTORY_TAR, "line {}: skip {}", self.line, tokens[0]);
                    self.open = OpenReg::Skipped;
                    Ok(())
                }
            }
            _ => Err(self.error(
                "expected a group header, 'bar N', a bitfield triplet, a register definition, a set or a supergroup",
            )),
        }
    }

    /// `set name Group.Register...`: members keep the listed order.
    fn reg_set(&mut self, manager: &mut RegManager, tokens: &[&str]) -> Result<()> {
        let mut regs = vec![];
        for t in tokens[2..].iter() {
            match self.ctor_arg(manager, t)? {
                CtorArg::Reg(r) => regs.push(Some(r)),
                _ => return Err(self.error("set members must be registers")),
            }
        }
        if tokens[1] == self.group.name {
            return Err(Error::NameCollision(tokens[1].to_string()));
        }
        manager.add_reg_set(RegSet::new(tokens[1], Arc::new(regs)))?;
        Ok(())
    }

    fn register(&mut self, manager: &RegManager, tokens: &[&str]) -> Result<()> {
        let name = tokens[0];
        let offset = match parse_int(tokens[1]) {
            Some(o) if o >= 0 => o as u64,
            Some(_) => return Err(self.error("negative offset")),
            None => return Err(self.error("bad offset")),
        };
        let ctor = tokens[2];
        let kind = FieldKind::from_placeholder(tokens[3])
            .ok_or_else(|| self.error("unknown bitfield type"))?;
        let ty = RegType::parse_flags(tokens[4]).ok_or_else(|| self.error("unknown register flag"))?;
        let args = tokens[REG_MIN_TOKENS..]
            .iter()
            .map(|t| self.ctor_arg(manager, t))
            .collect::<Result<Vec<_>>>()?;
        if self.group.find(name).is_some() {
            return Err(Error::NameCollision(format!("{}.{}", self.group.name, name)));
        }
        let size = if ctor.ends_with("64") {
            RegSize::U64
        } else {
            RegSize::U32
        };
        let reg = self
            .factory
            .build(ctor, name.to_string(), offset, size, ty, self.bar, &args)?;
        RegFactory::init_at_creation(&reg)?;
        self.group.regs.push(Some(reg.clone()));
        self.open = OpenReg::Reg(reg, kind);
        self.created += 1;
        Ok(())
    }

    fn field(&mut self, tokens: &[&str]) -> Result<()> {
        let (reg, kind) = match &self.open {
            OpenReg::Reg(reg, kind) => (reg.clone(), *kind),
            _ => return Ok(()),
        };
        let num = |t: &str| {
            parse_int(t)
                .filter(|v| *v >= 0 && *v <= u32::MAX as i64)
                .map(|v| v as u32)
        };
        let (start, width) = match (num(tokens[1]), num(tokens[2])) {
            (Some(s), Some(w)) => (s, w),
            _ => return Err(self.error("bad bitfield start or width")),
        };
        if reg.field(tokens[0]).is_some() {
            return Err(Error::NameCollision(format!("{}:{}", reg.name(), tokens[0])));
        }
        reg.add_field(None, tokens[0], start, width, kind)?;
        Ok(())
    }

    /// Integer literal, or `Group.Register[.Field]` looked up in the group
    /// being built first, then in `manager`.
    fn ctor_arg(&self, manager: &RegManager, token: &str) -> Result<CtorArg> {
        if let Some(v) = parse_int(token) {
            return Ok(CtorArg::Int(v));
        }
        let unresolved = || Error::UnresolvedRef(token.to_string());
        let parts = token.split('.').collect::<Vec<_>>();
        let (group, reg_name, field) = match parts.as_slice() {
            [g, r] => (*g, *r, None),
            [g, r, f] => (*g, *r, Some(*f)),
            _ => return Err(unresolved()),
        };
        let local = if group == self.group.name {
            self.group.find(reg_name)
        } else {
            None
        };
        let reg = local
            .or_else(|| manager.find(group, reg_name))
            .ok_or_else(unresolved)?;
        match field {
            Some(f) => reg.field(f).map(CtorArg::Field).ok_or_else(unresolved),
            None => Ok(CtorArg::Reg(reg)),
        }
    }
}

impl RegFactory {
    /// Populates `manager` from a register definition stream. Returns the
    /// number of registers created.
    ///
    /// ```text
    /// adc                                     # group header
    /// bar 1                                   # address space of what follows
    /// ctrl  0x10 Reg32 -   RW                 # name offset type field-kind flags [refs]
    ///   en    0 1                             # bitfield: name start width
    ///   gain  4 3
    /// mirror 0x0 RegDuplicate - RW adc.ctrl dac.ctrl
    /// opt   0x14 Reg32 -   RW if Model match ^dso
    /// set pair adc.ctrl adc.opt               # register set, written together
    /// supergroup analog adc dac               # added after all groups
    /// ```
    ///
    /// Everything after `if` is the condition, comments included.
    pub fn parse_stream<R: BufRead>(
        &self,
        reader: R,
        manager: &mut RegManager,
        settings: &dyn Settings,
    ) -> Result<usize> {
        let mut p = StreamParser {
            factory: self,
            settings,
            group: PendingGroup::new(DEFAULT_GROUP, false),
            open: OpenReg::None,
            bar: 0,
            created: 0,
            supergroups: vec![],
            line: 0,
            text: String::new(),
        };
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let (tokens, cond) = split_line(&line);
            if tokens.is_empty() {
                continue;
            }
            p.line = i + 1;
            p.text = line.trim().to_string();
            p.parse_line(manager, &tokens, cond)?;
        }
        let StreamParser {
            group,
            created,
            supergroups,
            ..
        } = p;
        group.commit(manager)?;
        for (name, members) in supergroups {
            let members = members.iter().map(|m| m.as_str()).collect::<Vec<_>>();
            manager.add_supergroup(&name, &members)?;
        }
        tracing::debug!(target: FACTORY_TAR, "parsed {} registers", created);
        Ok(created)
    }
}
