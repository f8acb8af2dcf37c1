use std::thread;
use std::time::Duration;

use mcs_command::{
    CommandError, ExecStatus, GenMode, InitContext, Publisher, RunContext, Sequence, Subscriber,
    initialize_command,
};
use mcs_config::{MissionFile, RunSettings};
use mcs_objects::{CoordinateSystem, MissionObject, ObjectStore, SolarSystem, objects_from_mission};
use tracing::{debug, error, info, instrument, warn};

use crate::SandboxError;
use crate::interrupt::{InterruptSource, NeverInterrupt, RunState};

/// Name of the frame every run is expressed in unless overridden.
pub const DEFAULT_INTERNAL_CS: &str = "EarthMJ2000Eq";

const PAUSE_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Initialized,
}

/// What a completed `execute` did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Top-level commands that ran to completion, the `NoOp` head included.
    pub commands_executed: usize,
    /// Non-fatal diagnostics raised during the run.
    pub warnings: Vec<String>,
    /// The run ended at a `Stop` command.
    pub stopped_by_command: bool,
}

/// Owns the objects, the publisher, and the sequence for one run at a time.
#[derive(Debug)]
pub struct Sandbox {
    store: ObjectStore,
    publisher: Publisher,
    settings: RunSettings,
    sequence: Option<Sequence>,
    internal_cs: String,
    interrupt: Box<dyn InterruptSource>,
    phase: Phase,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new(RunSettings::default())
    }
}

impl Sandbox {
    pub fn new(settings: RunSettings) -> Self {
        Self {
            store: ObjectStore::default(),
            publisher: Publisher::with_history_limit(settings.sample_history),
            settings,
            sequence: None,
            internal_cs: DEFAULT_INTERNAL_CS.into(),
            interrupt: Box::new(NeverInterrupt),
            phase: Phase::Idle,
        }
    }

    /// Sandbox holding every object a mission file describes.
    pub fn from_mission(file: &MissionFile) -> Result<Self, SandboxError> {
        let mut sandbox = Self::new(file.settings.clone());
        if !file.bodies.is_empty() {
            sandbox
                .store
                .set_solar_system(SolarSystem::from_configs(&file.bodies));
        }
        for object in objects_from_mission(file) {
            sandbox.add_object(object)?;
        }
        Ok(sandbox)
    }

    /// Add a copy of `object`; re-adding an equal object is a no-op returning `false`.
    pub fn add_object(&mut self, object: MissionObject) -> Result<bool, SandboxError> {
        let added = self.store.add(object)?;
        self.phase = Phase::Idle;
        Ok(added)
    }

    pub fn set_internal_coord_system(&mut self, name: &str) {
        self.internal_cs = name.to_string();
        self.phase = Phase::Idle;
    }

    pub fn set_sequence(&mut self, sequence: Sequence) {
        self.sequence = Some(sequence);
        self.phase = Phase::Idle;
    }

    pub fn sequence(&self) -> Option<&Sequence> {
        self.sequence.as_ref()
    }

    pub fn sequence_mut(&mut self) -> Option<&mut Sequence> {
        self.phase = Phase::Idle;
        self.sequence.as_mut()
    }

    pub fn set_interrupt_source(&mut self, source: Box<dyn InterruptSource>) {
        self.interrupt = source;
    }

    pub fn add_subscriber(&mut self, subscriber: Box<dyn Subscriber>) {
        self.publisher.subscribe(subscriber);
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ObjectStore {
        &mut self.store
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn is_initialized(&self) -> bool {
        self.phase == Phase::Initialized
    }

    /// Validate the setup, then bind and initialize every command.
    ///
    /// Command failures are collected and reported together.
    #[instrument(level = "info", skip_all)]
    pub fn initialize(&mut self) -> Result<(), SandboxError> {
        self.phase = Phase::Idle;
        let sequence = self.sequence.as_mut().ok_or(SandboxError::NoSequence)?;
        match sequence.head() {
            Some(head) if head.type_name() == "NoOp" => {}
            Some(head) => return Err(SandboxError::BadHead(head.type_name().to_string())),
            None => return Err(SandboxError::NoSequence),
        }

        match self.store.by_name(&self.internal_cs) {
            Some(MissionObject::CoordinateSystem(_)) => {}
            Some(_) => return Err(SandboxError::UnknownCoordinateSystem(self.internal_cs.clone())),
            None if self.internal_cs == DEFAULT_INTERNAL_CS => {
                self.store
                    .add(MissionObject::CoordinateSystem(CoordinateSystem::earth_mj2000_eq()))?;
            }
            None => return Err(SandboxError::UnknownCoordinateSystem(self.internal_cs.clone())),
        }

        self.store.wire_references()?;
        let promoted = self.store.promote_globals();
        self.publisher.clear();
        debug!(objects = self.store.len(), promoted, "objects ready");

        let mut messages = Vec::new();
        let mut ctx = InitContext::new(&mut self.store, &mut self.publisher, &self.settings);
        for command in sequence.commands_mut() {
            if let Err(err) = initialize_command(command.as_mut(), &mut ctx) {
                messages.extend(err.messages());
            }
        }
        if !messages.is_empty() {
            for message in &messages {
                error!("{message}");
            }
            return Err(SandboxError::Initialization(messages));
        }
        self.phase = Phase::Initialized;
        info!(commands = sequence.len(), "sandbox initialized");
        Ok(())
    }

    /// Run the sequence to its end, a `Stop` command, or an interrupt.
    ///
    /// The sequence is reset afterwards either way, so it can run again.
    #[instrument(level = "info", skip_all)]
    pub fn execute(&mut self) -> Result<RunSummary, SandboxError> {
        if self.phase != Phase::Initialized {
            return Err(SandboxError::NotInitialized);
        }
        let mut summary = RunSummary::default();
        let outcome = self.run(&mut summary);
        if let Some(sequence) = self.sequence.as_mut() {
            sequence.run_complete();
        }
        let flushed = self.publisher.flush_buffers();
        outcome?;
        flushed.map_err(CommandError::from)?;
        info!(
            commands = summary.commands_executed,
            warnings = summary.warnings.len(),
            "run complete"
        );
        Ok(summary)
    }

    fn run(&mut self, summary: &mut RunSummary) -> Result<(), SandboxError> {
        let Self {
            store,
            publisher,
            settings,
            sequence,
            interrupt,
            ..
        } = self;
        let sequence = sequence.as_mut().ok_or(SandboxError::NoSequence)?;
        let commands = sequence.commands_mut();
        let poll_every = settings.command_poll_frequency.max(1);
        let mut calls = 0usize;
        let mut poll_now = false;
        let mut index = 0;
        while index < commands.len() {
            if poll_now || calls % poll_every == 0 {
                wait_while_paused(interrupt.as_mut())?;
                poll_now = false;
            }
            calls += 1;
            let command = &mut commands[index];
            let mut ctx = RunContext::new(store, publisher, settings, &mut summary.warnings);
            match command.execute(&mut ctx) {
                Ok(ExecStatus::Done) => {
                    index += 1;
                    summary.commands_executed += 1;
                }
                Ok(ExecStatus::Continue) => {}
                Ok(ExecStatus::Yield) => poll_now = true,
                Err(CommandError::Stopped) => {
                    info!("mission sequence stopped by a Stop command");
                    summary.stopped_by_command = true;
                    break;
                }
                Err(CommandError::Interrupted(reason)) => {
                    warn!("{reason}");
                    return Err(SandboxError::Interrupted(reason));
                }
                Err(err) => {
                    let line = command.generating_string(GenMode::NoComments, "", false);
                    let err = err.in_command(line);
                    error!("{err}");
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    /// Drop subscribers, objects, and the sequence, returning to an empty idle sandbox.
    pub fn clear(&mut self) {
        self.publisher.unsubscribe_all();
        self.publisher.clear();
        self.store.clear();
        self.sequence = None;
        self.internal_cs = DEFAULT_INTERNAL_CS.into();
        self.phase = Phase::Idle;
        debug!("sandbox cleared");
    }
}

fn wait_while_paused(source: &mut dyn InterruptSource) -> Result<(), SandboxError> {
    let mut announced = false;
    loop {
        match source.poll() {
            RunState::Running => {
                if announced {
                    info!("run resumed");
                }
                return Ok(());
            }
            RunState::Paused => {
                if !announced {
                    info!("run paused");
                    announced = true;
                }
                thread::sleep(PAUSE_POLL);
            }
            RunState::Idle => {
                warn!("run stopped by the interrupt source");
                return Err(SandboxError::Interrupted("stopped by the user".into()));
            }
        }
    }
}
