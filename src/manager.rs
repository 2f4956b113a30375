use crate::error::*;
use crate::reg::{BitField, Reg, RegArray, RegKind, Resource};
use crate::reg_set::{DirtyBit, RegSet};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

pub const ALL_GROUPS: &str = "*";

#[derive(Debug)]
struct RegGroup {
    name: String,
    regs: RegArray,
    dirty: Arc<DirtyBit>,
}

#[derive(Debug)]
struct SuperGroup {
    name: String,
    members: Vec<String>,
}

/// Catalog of register groups, register sets and supergroups. Everything is
/// kept in insertion order; lookups that may match several registers return
/// the first one in that order.
#[derive(Debug, Default)]
pub struct RegManager {
    groups: Vec<RegGroup>,
    sets: Vec<Arc<RegSet>>,
    supergroups: Vec<SuperGroup>,
    addr_index: OnceLock<HashMap<u64, Arc<Reg>>>,
    // keyed by `group[name]`
    name_index: OnceLock<HashMap<String, Arc<Reg>>>,
    sealed: bool,
}

/// Key of a register in the name index: `group[name]`.
pub fn index_key(group: &str, name: &str) -> String {
    format!("{}[{}]", group, name)
}

/// Splits a `group[name]` key.
pub fn split_index_key(key: &str) -> Option<(&str, &str)> {
    let (group, rest) = key.split_once('[')?;
    let name = rest.strip_suffix(']')?;
    if group.is_empty() || name.is_empty() {
        None
    } else {
        Some((group, name))
    }
}

impl RegManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn invalidate(&mut self) {
        self.addr_index = OnceLock::new();
        self.name_index = OnceLock::new();
    }

    fn group_pos(&self, name: &str) -> Option<usize> {
        self.groups.iter().position(|g| g.name == name)
    }

    fn name_taken(&self, name: &str) -> bool {
        self.group_pos(name).is_some()
            || self.sets.iter().any(|s| s.name() == name)
            || self.supergroups.iter().any(|s| s.name == name)
    }

    /// Adds a group and attaches a fresh dirty bit to its registers. Adding
    /// the same array under the same name again returns the existing bit.
    pub fn add_group(&mut self, name: &str, regs: RegArray) -> Result<Arc<DirtyBit>> {
        let dirty = Arc::new(DirtyBit::new(name));
        self.add_group_with_dirty(name, regs, dirty)
    }

    /// Like `add_group`, with a dirty bit the caller already attached.
    pub fn add_group_with_dirty(
        &mut self,
        name: &str,
        regs: RegArray,
        dirty: Arc<DirtyBit>,
    ) -> Result<Arc<DirtyBit>> {
        if let Some(pos) = self.group_pos(name) {
            let g = &self.groups[pos];
            if Arc::ptr_eq(&g.regs, &regs) {
                return Ok(g.dirty.clone());
            }
            return Err(Error::NameCollision(name.to_string()));
        }
        if self.name_taken(name) {
            return Err(Error::NameCollision(name.to_string()));
        }
        for r in regs.iter().flatten() {
            r.attach_dirty_bit(dirty.clone());
        }
        tracing::debug!(target: crate::logger::FACTORY_TAR, "add group {} ({} slots)", name, regs.len());
        self.groups.push(RegGroup {
            name: name.to_string(),
            regs,
            dirty: dirty.clone(),
        });
        self.invalidate();
        Ok(dirty)
    }

    /// Removes a group, or the group backing a register set together with
    /// the set. Its registers stop setting the group's dirty bit.
    pub fn remove_group(&mut self, name: &str) {
        if let Some(pos) = self.group_pos(name) {
            let g = self.groups.remove(pos);
            for r in g.regs.iter().flatten() {
                r.detach_dirty_bit(&g.dirty);
            }
            self.sets.retain(|s| s.name() != name);
            self.invalidate();
        }
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &RegArray)> {
        self.groups.iter().map(|g| (g.name.as_str(), &g.regs))
    }

    /// A group's registers, or the concatenation of a supergroup's members.
    pub fn get_group(&self, name: &str) -> Option<RegArray> {
        if let Some(pos) = self.group_pos(name) {
            return Some(self.groups[pos].regs.clone());
        }
        let sg = self.supergroups.iter().find(|s| s.name == name)?;
        let regs = sg
            .members
            .iter()
            .filter_map(|m| self.group_pos(m))
            .flat_map(|pos| self.groups[pos].regs.iter().cloned())
            .collect::<Vec<_>>();
        Some(Arc::new(regs))
    }

    pub fn group_dirty(&self, name: &str) -> Option<Arc<DirtyBit>> {
        self.group_pos(name).map(|pos| self.groups[pos].dirty.clone())
    }

    /// Adds the set as a group sharing the set's dirty bit, then keeps the
    /// set itself for `reg_set`/`reg_sets`.
    pub fn add_reg_set(&mut self, set: RegSet) -> Result<Arc<RegSet>> {
        if self.name_taken(set.name()) {
            return Err(Error::NameCollision(set.name().to_string()));
        }
        self.add_group_with_dirty(set.name(), set.regs().clone(), set.dirty().clone())?;
        let set = Arc::new(set);
        self.sets.push(set.clone());
        Ok(set)
    }

    pub fn reg_set(&self, name: &str) -> Option<Arc<RegSet>> {
        self.sets.iter().find(|s| s.name() == name).cloned()
    }

    pub fn reg_sets(&self) -> impl Iterator<Item = &Arc<RegSet>> {
        self.sets.iter()
    }

    /// Applies every dirty register set, or all of them when `force`d.
    /// Returns the number of sets written.
    pub fn apply_reg_sets(&self, force: bool) -> Result<usize> {
        let mut written = 0;
        for s in self.sets.iter() {
            if s.apply(force)? {
                written += 1;
            }
        }
        Ok(written)
    }

    pub fn add_supergroup(&mut self, name: &str, members: &[&str]) -> Result<()> {
        if self.name_taken(name) {
            return Err(Error::NameCollision(name.to_string()));
        }
        if let Some(m) = members.iter().find(|m| self.group_pos(m).is_none()) {
            return Err(Error::UnknownName(m.to_string()));
        }
        self.supergroups.push(SuperGroup {
            name: name.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
        });
        Ok(())
    }

    pub fn supergroups(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.supergroups
            .iter()
            .map(|s| (s.name.as_str(), s.members.as_slice()))
    }

    fn all_regs(&self) -> impl Iterator<Item = &Arc<Reg>> {
        self.groups.iter().flat_map(|g| g.regs.iter().flatten())
    }

    /// Register mapped at `offset`. Address-data registers live in a device
    /// internal address space and are never matched.
    pub fn find_by_address(&self, offset: u64) -> Option<Arc<Reg>> {
        self.addr_index
            .get_or_init(|| {
                let mut index = HashMap::new();
                for r in self.all_regs() {
                    if !matches!(r.kind(), RegKind::AddrData(_)) {
                        index.entry(r.offset()).or_insert_with(|| r.clone());
                    }
                }
                index
            })
            .get(&offset)
            .cloned()
    }

    fn names(&self) -> &HashMap<String, Arc<Reg>> {
        self.name_index.get_or_init(|| {
            let mut index = HashMap::new();
            for g in self.groups.iter() {
                for r in g.regs.iter().flatten() {
                    index
                        .entry(index_key(&g.name, r.name()))
                        .or_insert_with(|| r.clone());
                }
            }
            index
        })
    }

    /// Looks a register up by its `group[name]` key. Only plain groups and
    /// register sets are indexed.
    pub fn lookup(&self, key: &str) -> Option<Arc<Reg>> {
        self.names().get(key).cloned()
    }

    /// `group` is a group, a supergroup, or `*` for every group in order.
    pub fn find(&self, group: &str, name: &str) -> Option<Arc<Reg>> {
        if group == ALL_GROUPS {
            return self
                .groups
                .iter()
                .find_map(|g| self.lookup(&index_key(&g.name, name)));
        }
        if self.group_pos(group).is_some() {
            return self.lookup(&index_key(group, name));
        }
        self.get_group(group)?
            .iter()
            .flatten()
            .find(|r| r.name() == name)
            .cloned()
    }

    pub fn register(&self, group: &str, name: &str) -> Result<Arc<Reg>> {
        self.find(group, name)
            .ok_or_else(|| Error::UnknownName(format!("{}.{}", group, name)))
    }

    /// `path` is `register:field`.
    pub fn field(&self, group: &str, path: &str) -> Result<Arc<BitField>> {
        let unknown = || Error::UnknownName(format!("{}.{}", group, path));
        let (reg, field) = path.split_once(':').ok_or_else(unknown)?;
        self.find(group, reg)
            .and_then(|r| r.field(field))
            .ok_or_else(unknown)
    }

    pub fn force_dirty(&self) {
        for r in self.all_regs() {
            r.force_dirty();
        }
    }

    pub fn force_dirty_group(&self, name: &str) -> Result<()> {
        let regs = self
            .get_group(name)
            .ok_or_else(|| Error::UnknownName(name.to_string()))?;
        for r in regs.iter().flatten() {
            r.force_dirty();
        }
        Ok(())
    }

    fn apply_regs(g: &RegGroup, force: bool) -> Result<usize> {
        let mut writes = 0;
        for r in g.regs.iter().flatten() {
            if r.apply(None, force)? {
                writes += 1;
            }
        }
        g.dirty.clear();
        Ok(writes)
    }

    /// Applies every dirty group, or every group when `force`d, and clears
    /// the group dirty bits. Returns the number of hardware writes issued.
    pub fn apply_all(&self, force: bool) -> Result<usize> {
        let mut writes = 0;
        for g in self.groups.iter() {
            if force || g.dirty.is_set() {
                writes += Self::apply_regs(g, force)?;
            }
        }
        Ok(writes)
    }

    /// `apply_all` for one group; a supergroup applies each member group.
    pub fn apply_group(&self, name: &str, force: bool) -> Result<usize> {
        let members = match self.group_pos(name) {
            Some(pos) => vec![pos],
            None => self
                .supergroups
                .iter()
                .find(|s| s.name == name)
                .ok_or_else(|| Error::UnknownName(name.to_string()))?
                .members
                .iter()
                .filter_map(|m| self.group_pos(m))
                .collect(),
        };
        let mut writes = 0;
        for pos in members {
            let g = &self.groups[pos];
            if force || g.dirty.is_set() {
                writes += Self::apply_regs(g, force)?;
            }
        }
        Ok(writes)
    }

    /// Puts every register of `group` under one shared resource.
    pub fn share_resource(&self, group: &str) -> Result<Arc<Resource>> {
        if self.sealed {
            return Err(Error::Sealed(group.to_string()));
        }
        let regs = self
            .get_group(group)
            .ok_or_else(|| Error::UnknownName(group.to_string()))?;
        let res = Resource::new();
        for r in regs.iter().flatten() {
            r.set_resource(res.clone())?;
        }
        Ok(res)
    }

    /// Ends the setup phase; resources can no longer be reassigned.
    pub fn seal(&mut self) {
        for r in self.all_regs() {
            r.seal();
        }
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}
