//! Packing of spacecraft states into one contiguous integration vector.

use mcs_core::time::Epoch;
use mcs_objects::{ObjectHandle, ObjectStore, SPACECRAFT_STATE_SIZE};

use crate::PropagationError;

/// Epochs closer than this are treated as identical when binding spacecraft.
const EPOCH_MATCH_S: f64 = 1.0e-6;

/// Integration state: reference epoch, signed seconds since it, and packed data.
#[derive(Debug, Clone, PartialEq)]
pub struct PropState {
    pub base_epoch: Epoch,
    pub elapsed_s: f64,
    pub data: Vec<f64>,
}

impl PropState {
    pub fn epoch(&self) -> Epoch {
        self.base_epoch.add_seconds(self.elapsed_s)
    }
}

/// Maps each propagated spacecraft to its slice of [`PropState::data`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropagationStateManager {
    handles: Vec<ObjectHandle>,
    names: Vec<String>,
}

impl PropagationStateManager {
    /// Bind spacecraft in order. All of them must share one epoch.
    pub fn bind(
        store: &ObjectStore,
        handles: &[ObjectHandle],
    ) -> Result<(Self, Epoch), PropagationError> {
        let mut names = Vec::with_capacity(handles.len());
        let mut epoch: Option<Epoch> = None;
        for handle in handles {
            let sc = store.spacecraft(*handle)?;
            match epoch {
                None => epoch = Some(sc.epoch),
                Some(expected) if sc.epoch.seconds_since(&expected).abs() > EPOCH_MATCH_S => {
                    return Err(PropagationError::EpochMismatch {
                        spacecraft: sc.name.clone(),
                        expected: expected.to_string(),
                        found: sc.epoch.to_string(),
                    });
                }
                Some(_) => {}
            }
            names.push(sc.name.clone());
        }
        let epoch = epoch.ok_or_else(|| PropagationError::NotBound(String::new()))?;
        Ok((
            Self {
                handles: handles.to_vec(),
                names,
            },
            epoch,
        ))
    }

    pub fn handles(&self) -> &[ObjectHandle] {
        &self.handles
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn dimension(&self) -> usize {
        self.handles.len() * SPACECRAFT_STATE_SIZE
    }

    /// Copy the bound spacecraft states into `data`.
    pub fn gather(&self, store: &ObjectStore, data: &mut Vec<f64>) -> Result<(), PropagationError> {
        data.clear();
        for handle in &self.handles {
            data.extend_from_slice(&store.spacecraft(*handle)?.state);
        }
        Ok(())
    }

    /// Write `data` and `epoch` back to the bound spacecraft.
    pub fn scatter(
        &self,
        store: &mut ObjectStore,
        data: &[f64],
        epoch: Epoch,
    ) -> Result<(), PropagationError> {
        for (handle, chunk) in self
            .handles
            .iter()
            .zip(data.chunks_exact(SPACECRAFT_STATE_SIZE))
        {
            let sc = store.spacecraft_mut(*handle)?;
            sc.state.copy_from_slice(chunk);
            sc.epoch = epoch;
        }
        Ok(())
    }
}
