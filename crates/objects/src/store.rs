//! Local and global object maps with generation-checked handles.
//!
//! Commands never hold references into the store. They resolve names to
//! [`ObjectHandle`]s once, during initialization, and go through the store on
//! every access. Removing or promoting an object bumps its slot generation,
//! so an old handle fails with [`ObjectError::StaleHandle`] instead of
//! silently reading whatever took its place.

use indexmap::IndexMap;
use tracing::debug;

use crate::{MissionObject, ObjectError, SolarSystem, Spacecraft};

/// Which object map a handle points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Local,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    pub scope: Scope,
    slot: usize,
    generation: u32,
}

#[derive(Debug, Clone, Default)]
struct Slot {
    generation: u32,
    object: Option<MissionObject>,
}

#[derive(Debug, Clone, Default)]
struct Arena {
    slots: Vec<Slot>,
    names: IndexMap<String, usize>,
    free: Vec<usize>,
}

impl Arena {
    fn insert(&mut self, scope: Scope, object: MissionObject) -> ObjectHandle {
        let name = object.name().to_string();
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot].object = Some(object);
                slot
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    object: Some(object),
                });
                self.slots.len() - 1
            }
        };
        self.names.insert(name, slot);
        ObjectHandle {
            scope,
            slot,
            generation: self.slots[slot].generation,
        }
    }

    fn handle(&self, scope: Scope, name: &str) -> Option<ObjectHandle> {
        let slot = *self.names.get(name)?;
        Some(ObjectHandle {
            scope,
            slot,
            generation: self.slots[slot].generation,
        })
    }

    fn get(&self, handle: ObjectHandle) -> Option<&MissionObject> {
        self.slots
            .get(handle.slot)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.object.as_ref())
    }

    fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut MissionObject> {
        self.slots
            .get_mut(handle.slot)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.object.as_mut())
    }

    fn remove(&mut self, name: &str) -> Option<MissionObject> {
        let slot = self.names.shift_remove(name)?;
        let entry = &mut self.slots[slot];
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(slot);
        entry.object.take()
    }

    fn clear(&mut self) {
        for slot in &mut self.slots {
            if slot.object.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        self.free = (0..self.slots.len()).rev().collect();
        self.names.clear();
    }
}

/// Owner of every configured object plus the celestial body registry.
#[derive(Debug, Clone, Default)]
pub struct ObjectStore {
    local: Arena,
    global: Arena,
    solar_system: SolarSystem,
}

impl ObjectStore {
    pub fn new(solar_system: SolarSystem) -> Self {
        Self {
            solar_system,
            ..Self::default()
        }
    }

    pub fn solar_system(&self) -> &SolarSystem {
        &self.solar_system
    }

    pub fn set_solar_system(&mut self, solar_system: SolarSystem) {
        self.solar_system = solar_system;
    }

    /// Add `object` to the local map.
    ///
    /// Re-adding an identical object is a no-op that returns `Ok(false)`; a
    /// different object under an existing name is rejected.
    pub fn add(&mut self, object: MissionObject) -> Result<bool, ObjectError> {
        if let Some(existing) = self.by_name(object.name()) {
            if *existing == object {
                debug!(name = object.name(), "object already present; skipping");
                return Ok(false);
            }
            return Err(ObjectError::Duplicate(object.name().to_string()));
        }
        self.local.insert(Scope::Local, object);
        Ok(true)
    }

    /// Move every object flagged global from the local map into the global map.
    ///
    /// Handles issued for promoted objects become stale.
    pub fn promote_globals(&mut self) -> usize {
        let names: Vec<String> = self
            .local
            .names
            .iter()
            .filter(|(_, slot)| {
                self.local.slots[**slot]
                    .object
                    .as_ref()
                    .is_some_and(MissionObject::is_global)
            })
            .map(|(name, _)| name.clone())
            .collect();
        for name in &names {
            if let Some(object) = self.local.remove(name) {
                self.global.remove(name);
                self.global.insert(Scope::Global, object);
            }
        }
        if !names.is_empty() {
            debug!(count = names.len(), "promoted objects to the global map");
        }
        names.len()
    }

    /// Look a name up in the local map, then the global map.
    pub fn resolve(&self, name: &str) -> Option<ObjectHandle> {
        self.local
            .handle(Scope::Local, name)
            .or_else(|| self.global.handle(Scope::Global, name))
    }

    pub fn require(&self, name: &str) -> Result<ObjectHandle, ObjectError> {
        self.resolve(name)
            .ok_or_else(|| ObjectError::NotFound(name.to_string()))
    }

    pub fn get(&self, handle: ObjectHandle) -> Result<&MissionObject, ObjectError> {
        self.arena(handle.scope)
            .get(handle)
            .ok_or_else(|| stale(handle))
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Result<&mut MissionObject, ObjectError> {
        let arena = match handle.scope {
            Scope::Local => &mut self.local,
            Scope::Global => &mut self.global,
        };
        arena.get_mut(handle).ok_or_else(|| stale(handle))
    }

    pub fn by_name(&self, name: &str) -> Option<&MissionObject> {
        self.resolve(name).and_then(|h| self.get(h).ok())
    }

    pub fn by_name_mut(&mut self, name: &str) -> Option<&mut MissionObject> {
        let handle = self.resolve(name)?;
        self.get_mut(handle).ok()
    }

    pub fn spacecraft(&self, handle: ObjectHandle) -> Result<&Spacecraft, ObjectError> {
        let object = self.get(handle)?;
        object.as_spacecraft().ok_or_else(|| ObjectError::WrongKind {
            name: object.name().to_string(),
            expected: "Spacecraft",
            found: object.type_name(),
        })
    }

    pub fn spacecraft_mut(&mut self, handle: ObjectHandle) -> Result<&mut Spacecraft, ObjectError> {
        let object = self.get_mut(handle)?;
        let (name, found) = (object.name().to_string(), object.type_name());
        object.as_spacecraft_mut().ok_or(ObjectError::WrongKind {
            name,
            expected: "Spacecraft",
            found,
        })
    }

    /// Handles of every spacecraft, local map first.
    pub fn spacecraft_handles(&self) -> Vec<ObjectHandle> {
        self.handles()
            .filter(|h| matches!(self.get(*h), Ok(MissionObject::Spacecraft(_))))
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.local
            .names
            .keys()
            .chain(self.global.names.keys())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.local.names.len() + self.global.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remove(&mut self, name: &str) -> Option<MissionObject> {
        self.local.remove(name).or_else(|| self.global.remove(name))
    }

    /// Rename an object in whichever map holds it.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), ObjectError> {
        if self.resolve(new).is_some() {
            return Err(ObjectError::Duplicate(new.to_string()));
        }
        let handle = self.require(old)?;
        let arena = match handle.scope {
            Scope::Local => &mut self.local,
            Scope::Global => &mut self.global,
        };
        let mut object = arena.remove(old).ok_or_else(|| stale(handle))?;
        object.set_name(new);
        arena.insert(handle.scope, object);
        Ok(())
    }

    /// Fill in derived references, such as each spacecraft's central-body mu.
    pub fn wire_references(&mut self) -> Result<(), ObjectError> {
        let handles = self.spacecraft_handles();
        for handle in handles {
            let body = self.spacecraft(handle)?.central_body.clone();
            let mu = self.solar_system.mu(&body)?;
            self.spacecraft_mut(handle)?.central_mu = mu;
        }
        Ok(())
    }

    /// Copies of the objects behind `handles`, for later [`Self::restore`].
    pub fn snapshot(
        &self,
        handles: &[ObjectHandle],
    ) -> Result<Vec<(ObjectHandle, MissionObject)>, ObjectError> {
        handles
            .iter()
            .map(|h| self.get(*h).map(|o| (*h, o.clone())))
            .collect()
    }

    pub fn restore(&mut self, snapshot: &[(ObjectHandle, MissionObject)]) -> Result<(), ObjectError> {
        for (handle, object) in snapshot {
            *self.get_mut(*handle)? = object.clone();
        }
        Ok(())
    }

    /// Drop every object in both maps; the body registry is kept.
    pub fn clear(&mut self) {
        self.local.clear();
        self.global.clear();
    }

    fn arena(&self, scope: Scope) -> &Arena {
        match scope {
            Scope::Local => &self.local,
            Scope::Global => &self.global,
        }
    }

    fn handles(&self) -> impl Iterator<Item = ObjectHandle> + '_ {
        let local = self
            .local
            .names
            .keys()
            .filter_map(|n| self.local.handle(Scope::Local, n));
        let global = self
            .global
            .names
            .keys()
            .filter_map(|n| self.global.handle(Scope::Global, n));
        local.chain(global)
    }
}

fn stale(handle: ObjectHandle) -> ObjectError {
    ObjectError::StaleHandle(format!("{:?} slot {}", handle.scope, handle.slot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Variable;

    fn variable(name: &str, value: f64, global: bool) -> MissionObject {
        MissionObject::Variable(Variable {
            name: name.into(),
            value,
            global,
        })
    }

    #[test]
    fn identical_re_add_is_a_no_op_but_conflicts_fail() {
        let mut store = ObjectStore::default();
        assert_eq!(store.add(variable("x", 1.0, false)), Ok(true));
        assert_eq!(store.add(variable("x", 1.0, false)), Ok(false));
        assert_eq!(
            store.add(variable("x", 2.0, false)),
            Err(ObjectError::Duplicate("x".into()))
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn removed_handles_go_stale() {
        let mut store = ObjectStore::default();
        store.add(variable("x", 1.0, false)).unwrap();
        let handle = store.require("x").unwrap();
        store.remove("x");
        store.add(variable("y", 3.0, false)).unwrap();
        assert!(matches!(store.get(handle), Err(ObjectError::StaleHandle(_))));
        assert_eq!(store.by_name("y").map(MissionObject::name), Some("y"));
    }

    #[test]
    fn globals_move_to_the_global_map() {
        let mut store = ObjectStore::default();
        store.add(variable("g", 1.0, true)).unwrap();
        store.add(variable("l", 1.0, false)).unwrap();
        assert_eq!(store.promote_globals(), 1);
        assert_eq!(store.require("g").unwrap().scope, Scope::Global);
        assert_eq!(store.require("l").unwrap().scope, Scope::Local);
    }

    #[test]
    fn wiring_fills_central_body_mu() {
        let mut store = ObjectStore::default();
        let mut sc = Spacecraft::new("Sat");
        sc.central_body = "Luna".into();
        sc.central_mu = 0.0;
        store.add(MissionObject::Spacecraft(sc)).unwrap();
        store.wire_references().unwrap();
        let handle = store.require("Sat").unwrap();
        let mu = store.spacecraft(handle).unwrap().central_mu;
        assert!((mu - mcs_core::constants::MU_MOON).abs() < 1e-9);
    }
}
