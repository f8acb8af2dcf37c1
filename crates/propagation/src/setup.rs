//! A propagator setup: integrator plus force model bound to spacecraft.

use mcs_core::time::Epoch;
use mcs_objects::{ObjectHandle, ObjectStore, PropagatorSettings, SolarSystem};
use tracing::trace;

use crate::{
    ForceModel, Integrator, PointMassForce, PropState, PropagationError,
    PropagationStateManager, create_integrator,
};

/// Saved integration state for rewinding a setup to the start of a step.
#[derive(Debug, Clone, PartialEq)]
pub struct PropSnapshot {
    state: PropState,
    step_s: f64,
}

#[derive(Debug)]
pub struct PropSetup {
    name: String,
    integrator: Box<dyn Integrator>,
    force: PointMassForce,
    manager: PropagationStateManager,
    state: PropState,
}

impl PropSetup {
    pub fn new(
        settings: &PropagatorSettings,
        solar_system: &SolarSystem,
    ) -> Result<Self, PropagationError> {
        let integrator = create_integrator(settings)
            .ok_or_else(|| PropagationError::UnknownIntegrator(settings.integrator.clone()))?;
        let force = PointMassForce::new(solar_system, &settings.central_body, &settings.point_masses)?;
        Ok(Self {
            name: settings.name.clone(),
            integrator,
            force,
            manager: PropagationStateManager::default(),
            state: PropState {
                base_epoch: Epoch::default(),
                elapsed_s: 0.0,
                data: Vec::new(),
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn integrator_type(&self) -> &'static str {
        self.integrator.type_name()
    }

    /// Bind spacecraft and load their current states.
    pub fn bind(
        &mut self,
        store: &ObjectStore,
        handles: &[ObjectHandle],
    ) -> Result<(), PropagationError> {
        if handles.is_empty() {
            return Err(PropagationError::NothingToPropagate {
                propagator: self.name.clone(),
            });
        }
        let (manager, epoch) = PropagationStateManager::bind(store, handles)?;
        self.manager = manager;
        self.state.base_epoch = epoch;
        self.state.elapsed_s = 0.0;
        self.manager.gather(store, &mut self.state.data)?;
        self.force.update_time_dependent(&epoch);
        Ok(())
    }

    /// Re-read the bound spacecraft; elapsed time restarts at zero.
    pub fn reload(&mut self, store: &ObjectStore) -> Result<(), PropagationError> {
        let handles = self.manager.handles().to_vec();
        if handles.is_empty() {
            return Err(PropagationError::NotBound(self.name.clone()));
        }
        self.bind(store, &handles)
    }

    pub fn spacecraft(&self) -> &[ObjectHandle] {
        self.manager.handles()
    }

    pub fn spacecraft_names(&self) -> &[String] {
        self.manager.names()
    }

    pub fn state(&self) -> &PropState {
        &self.state
    }

    pub fn epoch(&self) -> Epoch {
        self.state.epoch()
    }

    pub fn elapsed_s(&self) -> f64 {
        self.state.elapsed_s
    }

    pub fn set_direction(&mut self, backward: bool) {
        self.integrator.set_direction(backward);
    }

    /// One integrator-chosen step; returns the signed step taken.
    pub fn step(&mut self) -> Result<f64, PropagationError> {
        let dt = self
            .integrator
            .step(&self.force, self.state.elapsed_s, &mut self.state.data)?;
        self.state.elapsed_s += dt;
        trace!(propagator = %self.name, dt, elapsed = self.state.elapsed_s, "step");
        Ok(dt)
    }

    /// Step by exactly `dt` seconds.
    pub fn step_by(&mut self, dt: f64) -> Result<(), PropagationError> {
        self.integrator
            .step_by(&self.force, self.state.elapsed_s, &mut self.state.data, dt)?;
        self.state.elapsed_s += dt;
        Ok(())
    }

    /// Write the integration state back to the bound spacecraft.
    pub fn publish(&self, store: &mut ObjectStore) -> Result<(), PropagationError> {
        self.manager.scatter(store, &self.state.data, self.state.epoch())
    }

    pub fn snapshot(&self) -> PropSnapshot {
        PropSnapshot {
            state: self.state.clone(),
            step_s: self.integrator.step_size(),
        }
    }

    pub fn restore(&mut self, snapshot: &PropSnapshot) {
        self.state.clone_from(&snapshot.state);
        self.integrator.set_step_size(snapshot.step_s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcs_objects::{MissionObject, Spacecraft};

    fn store_with(names: &[&str]) -> ObjectStore {
        let mut store = ObjectStore::default();
        for name in names {
            store
                .add(MissionObject::Spacecraft(Spacecraft::new(name)))
                .unwrap();
        }
        store
    }

    #[test]
    fn mismatched_epochs_fail_to_bind() {
        let mut store = store_with(&["A", "B"]);
        let b = store.require("B").unwrap();
        let sc = store.spacecraft_mut(b).unwrap();
        sc.epoch = sc.epoch.add_seconds(30.0);
        let handles = [store.require("A").unwrap(), b];
        let mut setup =
            PropSetup::new(&PropagatorSettings::new("Prop"), store.solar_system()).unwrap();
        assert!(matches!(
            setup.bind(&store, &handles),
            Err(PropagationError::EpochMismatch { .. })
        ));
    }

    #[test]
    fn restore_rewinds_state_and_elapsed_time() {
        let store = store_with(&["Sat"]);
        let handle = store.require("Sat").unwrap();
        let mut setup =
            PropSetup::new(&PropagatorSettings::new("Prop"), store.solar_system()).unwrap();
        setup.bind(&store, &[handle]).unwrap();
        let snapshot = setup.snapshot();
        setup.step().unwrap();
        assert!(setup.elapsed_s() > 0.0);
        setup.restore(&snapshot);
        assert_eq!(setup.elapsed_s(), 0.0);
        assert_eq!(setup.state(), &snapshot.state);
    }

    #[test]
    fn publish_moves_spacecraft_epoch() {
        let mut store = store_with(&["Sat"]);
        let handle = store.require("Sat").unwrap();
        let start = store.spacecraft(handle).unwrap().epoch;
        let mut setup =
            PropSetup::new(&PropagatorSettings::new("Prop"), store.solar_system()).unwrap();
        setup.bind(&store, &[handle]).unwrap();
        setup.step_by(120.0).unwrap();
        setup.publish(&mut store).unwrap();
        let sc = store.spacecraft(handle).unwrap();
        assert!((sc.epoch.seconds_since(&start) - 120.0).abs() < 1e-9);
    }
}
