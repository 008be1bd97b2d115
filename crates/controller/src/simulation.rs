use simlink_client::{ClientError, Control, SimulatorClient};
use simlink_present::{FrameRecorder, PresentError, Presenter, RigSpec};
use simlink_provision::{
    ControlMismatch, DescriptorRef, EntityDescriptor, EntityState, ManagedEntity, ProvisionError,
};
use simlink_session::{Session, SessionError};

use crate::{readback, scheduler, teardown};

/// Errors from driving a simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error("failed to set up frame recording")]
    Recording(#[source] PresentError),
    #[error("no entity at index {index} ({count} provisioned)")]
    UnknownEntity { index: usize, count: usize },
    #[error(transparent)]
    Control(#[from] ControlMismatch),
    #[error("step {step}: failed to apply controls")]
    Apply {
        step: u64,
        #[source]
        source: ClientError,
    },
    #[error("step {step}: tick failed")]
    Tick {
        step: u64,
        #[source]
        source: SessionError,
    },
    #[error("failed to read state of entity {entity}")]
    ReadBack {
        entity: DescriptorRef,
        #[source]
        source: ClientError,
    },
    #[error("teardown was incomplete")]
    Teardown(#[source] SessionError),
    #[error("simulation has been destroyed")]
    Destroyed,
}

/// A provisioned scenario running in lock-step with the simulator.
pub struct Simulation<C: SimulatorClient> {
    session: Session<C>,
    entities: Vec<ManagedEntity>,
    presenters: Vec<Box<dyn Presenter>>,
    steps: u64,
    destroyed: bool,
}

impl<C: SimulatorClient> Simulation<C> {
    /// Provision `descriptors` into `session`.
    ///
    /// When the session renders, the first descriptor gets a camera rig and
    /// `presenter` receives one frame per step; with `record` set, frames are
    /// also written to the configured directory. If provisioning fails the
    /// session is closed before the error is returned.
    pub fn new(
        mut session: Session<C>,
        descriptors: &[EntityDescriptor],
        presenter: Option<Box<dyn Presenter>>,
    ) -> Result<Self, SimulationError> {
        let _span = tracing::info_span!("simulation_new", session = %session.id()).entered();
        let rig = RigSpec::from_config(session.config());

        let mut presenters: Vec<Box<dyn Presenter>> = Vec::new();
        match (&rig, presenter) {
            (Some(_), Some(presenter)) => presenters.push(presenter),
            (None, Some(_)) => tracing::warn!("rendering is disabled, presenter will not be used"),
            _ => {}
        }
        if rig.as_ref().is_some_and(|spec| spec.recording) {
            let dir = session.config().record_dir.clone();
            match FrameRecorder::create(&dir) {
                Ok(recorder) => presenters.push(Box::new(recorder)),
                Err(err) => {
                    close_after_failure(&mut session);
                    return Err(SimulationError::Recording(err));
                }
            }
        }

        let client = session.client_mut()?;
        let entities = match simlink_provision::provision(client, descriptors, rig.as_ref()) {
            Ok(entities) => entities,
            Err(err) => {
                close_after_failure(&mut session);
                return Err(err.into());
            }
        };
        tracing::info!(
            entities = entities.len(),
            presenters = presenters.len(),
            "simulation ready"
        );

        Ok(Self {
            session,
            entities,
            presenters,
            steps: 0,
            destroyed: false,
        })
    }

    pub fn session(&self) -> &Session<C> {
        &self.session
    }

    pub fn entities(&self) -> &[ManagedEntity] {
        &self.entities
    }

    pub fn entity(&self, index: usize) -> Result<&ManagedEntity, SimulationError> {
        self.entities.get(index).ok_or(SimulationError::UnknownEntity {
            index,
            count: self.entities.len(),
        })
    }

    /// Steps completed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn ensure_live(&self) -> Result<(), SimulationError> {
        if self.destroyed {
            return Err(SimulationError::Destroyed);
        }
        Ok(())
    }

    /// Queue `control` for entity `index`, to be applied at the start of the
    /// next step. Replaces and returns any command already queued.
    pub fn enqueue(&mut self, index: usize, control: Control) -> Result<Option<Control>, SimulationError> {
        self.ensure_live()?;
        let count = self.entities.len();
        let entity = self
            .entities
            .get_mut(index)
            .ok_or(SimulationError::UnknownEntity { index, count })?;
        Ok(entity.enqueue(control)?)
    }

    /// Run one step and return the fresh state of every entity, in
    /// provisioning order.
    pub fn step(&mut self) -> Result<Vec<EntityState>, SimulationError> {
        self.ensure_live()?;
        let step = self.steps + 1;
        let _span = tracing::info_span!("step", step).entered();

        let client = self.session.client_mut()?;
        let applied = scheduler::apply_pending(client, &mut self.entities)
            .map_err(|source| SimulationError::Apply { step, source })?;

        let frame = self
            .session
            .tick()
            .map_err(|source| SimulationError::Tick { step, source })?;
        self.steps = step;
        tracing::debug!(frame, applied, "world advanced");

        let client = self.session.client_mut()?;
        scheduler::present(client, &self.entities, step, &mut self.presenters);

        scheduler::read_back(client, &mut self.entities)
            .map_err(|(entity, source)| SimulationError::ReadBack { entity, source })
    }

    /// Read entity `index` back from the simulator now, outside the step
    /// cycle, and store the result as its last-known state.
    pub fn read_state(&mut self, index: usize) -> Result<EntityState, SimulationError> {
        self.ensure_live()?;
        let count = self.entities.len();
        let client = self.session.client_mut()?;
        let entity = self
            .entities
            .get_mut(index)
            .ok_or(SimulationError::UnknownEntity { index, count })?;
        let state = readback::read_state(client, entity.actor()).map_err(|source| {
            SimulationError::ReadBack {
                entity: entity.descriptor().clone(),
                source,
            }
        })?;
        entity.record_state(state);
        Ok(state)
    }

    /// Release every entity, flush with one tick and close the session.
    ///
    /// Every step is attempted even if an earlier one fails; the first
    /// failure is returned. A second call does nothing.
    pub fn destroy(&mut self) -> Result<(), SimulationError> {
        if self.destroyed {
            tracing::debug!("simulation already destroyed");
            return Ok(());
        }
        self.destroyed = true;
        let _span = tracing::info_span!("destroy", session = %self.session.id()).entered();
        let entities = std::mem::take(&mut self.entities);
        let released = entities.len();
        let mut first_error: Option<SessionError> = None;

        let released_errors = self
            .session
            .client_mut()
            .map(|client| teardown::release_entities(client, entities));
        match released_errors {
            Ok(errors) => {
                if let Some(err) = errors.into_iter().next() {
                    first_error.get_or_insert(SessionError::Client(err));
                }
                if let Err(err) = self.session.tick() {
                    tracing::warn!(error = %err, "flush tick failed");
                    first_error.get_or_insert(err);
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "session closed before entities were released");
                first_error.get_or_insert(err);
            }
        }
        if let Err(err) = self.session.close() {
            first_error.get_or_insert(err);
        }
        for presenter in self.presenters.iter_mut() {
            if let Err(err) = presenter.finish() {
                tracing::warn!(error = %err, "presenter failed to finish");
            }
        }
        self.presenters.clear();

        match first_error {
            Some(err) => Err(SimulationError::Teardown(err)),
            None => {
                tracing::info!(released, steps = self.steps, "simulation destroyed");
                Ok(())
            }
        }
    }
}

impl<C: SimulatorClient> Drop for Simulation<C> {
    fn drop(&mut self) {
        if let Err(err) = self.destroy() {
            tracing::warn!(error = %err, "teardown on drop failed");
        }
    }
}

fn close_after_failure<C: SimulatorClient>(session: &mut Session<C>) {
    if let Err(err) = session.close() {
        tracing::warn!(error = %err, "failed to close session after setup failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec2;
    use simlink_client::{LoopbackClient, LoopbackServer, SimEvent, VehicleControl, WalkerControl};
    use simlink_session::SessionConfig;

    fn open(server: &LoopbackServer, config: SessionConfig) -> Session<LoopbackClient> {
        Session::open(config, server).unwrap()
    }

    fn car() -> EntityDescriptor {
        EntityDescriptor::new("vehicle.audi.tt", DVec2::ZERO)
    }

    fn pedestrian() -> EntityDescriptor {
        EntityDescriptor::new("walker.pedestrian.0001", DVec2::new(0.0, 8.0))
    }

    #[test]
    fn step_returns_one_state_per_entity() {
        let server = LoopbackServer::new();
        let mut sim = Simulation::new(open(&server, SessionConfig::default()), &[car(), pedestrian()], None)
            .unwrap();
        let states = sim.step().unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(sim.steps(), 1);
        for state in &states {
            assert_eq!(state.speed, state.velocity.x.hypot(state.velocity.y));
        }
        assert_eq!(sim.entity(1).unwrap().state(), Some(&states[1]));
    }

    #[test]
    fn control_is_applied_before_the_tick_and_observed_after() {
        let server = LoopbackServer::new();
        let mut sim =
            Simulation::new(open(&server, SessionConfig::default()), &[car()], None).unwrap();
        sim.enqueue(0, VehicleControl::throttle(1.0).into()).unwrap();
        assert!(sim.entity(0).unwrap().pending().is_some());

        let frame_before = server.frame();
        let state = sim.step().unwrap().remove(0);
        let events = server.events();
        let applied = events
            .iter()
            .rposition(|e| matches!(e, SimEvent::ControlApplied { .. }))
            .unwrap();
        let ticked = events
            .iter()
            .position(|e| *e == SimEvent::Ticked { frame: frame_before + 1 })
            .unwrap();
        assert!(applied < ticked);
        assert!(sim.entity(0).unwrap().pending().is_none());
        // heading 0 is north
        assert!(state.velocity.y > 0.0);
        assert!(state.speed > 0.0);
    }

    #[test]
    fn wrong_control_kind_is_rejected() {
        let server = LoopbackServer::new();
        let mut sim =
            Simulation::new(open(&server, SessionConfig::default()), &[car(), pedestrian()], None)
                .unwrap();
        assert!(matches!(
            sim.enqueue(0, WalkerControl::default().into()),
            Err(SimulationError::Control(_))
        ));
        assert!(matches!(
            sim.enqueue(5, VehicleControl::throttle(1.0).into()),
            Err(SimulationError::UnknownEntity { index: 5, count: 2 })
        ));
        assert_eq!(sim.enqueue(1, WalkerControl::default().into()).unwrap(), None);
    }

    #[test]
    fn failed_provisioning_closes_the_session() {
        let server = LoopbackServer::new().rejecting_spawn_attempt(2);
        let session = open(&server, SessionConfig::default());
        assert!(server.world_settings().synchronous_mode);

        let err = Simulation::new(session, &[car(), car()], None).err().unwrap();
        assert!(matches!(err, SimulationError::Provision(ProvisionError::Spawn(_))));
        assert!(server.live_actors().is_empty());
        assert!(!server.world_settings().synchronous_mode);
        assert!(!server.traffic_synchronous());
    }

    #[test]
    fn destroy_twice_destroys_once() {
        let server = LoopbackServer::new();
        let mut sim =
            Simulation::new(open(&server, SessionConfig::default()), &[car(), pedestrian()], None)
                .unwrap();
        sim.step().unwrap();
        sim.destroy().unwrap();
        let events_after_first = server.events().len();
        sim.destroy().unwrap();
        drop(sim);

        assert_eq!(server.events().len(), events_after_first);
        let destroys = server
            .events()
            .iter()
            .filter(|e| matches!(e, SimEvent::Destroyed { .. }))
            .count();
        // car, walker, controller
        assert_eq!(destroys, 3);
        assert!(server.live_actors().is_empty());
    }

    #[test]
    fn operations_after_destroy_are_refused() {
        let server = LoopbackServer::new();
        let mut sim =
            Simulation::new(open(&server, SessionConfig::default()), &[car()], None).unwrap();
        sim.destroy().unwrap();
        assert!(sim.is_destroyed());
        assert!(matches!(sim.step(), Err(SimulationError::Destroyed)));
        assert!(matches!(sim.read_state(0), Err(SimulationError::Destroyed)));
        assert!(matches!(
            sim.enqueue(0, VehicleControl::throttle(1.0).into()),
            Err(SimulationError::Destroyed)
        ));
    }

    #[test]
    fn drop_tears_everything_down() {
        let server = LoopbackServer::new();
        {
            let _sim =
                Simulation::new(open(&server, SessionConfig::default()), &[pedestrian()], None)
                    .unwrap();
            assert_eq!(server.live_actors().len(), 2);
        }
        assert!(server.live_actors().is_empty());
        assert!(!server.world_settings().synchronous_mode);
    }

    #[test]
    fn empty_scenario_still_settles_and_steps() {
        let server = LoopbackServer::new();
        let mut sim = Simulation::new(open(&server, SessionConfig::default()), &[], None).unwrap();
        assert_eq!(server.frame(), 2);
        assert!(sim.step().unwrap().is_empty());
        assert_eq!(server.frame(), 3);
    }

    #[test]
    fn read_state_outside_a_step() {
        let server = LoopbackServer::new();
        let descriptor = car().with_speed(2.0);
        let mut sim =
            Simulation::new(open(&server, SessionConfig::default()), &[descriptor], None).unwrap();
        let state = sim.read_state(0).unwrap();
        assert!((state.speed - 2.0).abs() < 1e-5);
        assert!(matches!(
            sim.read_state(3),
            Err(SimulationError::UnknownEntity { index: 3, .. })
        ));
    }

    #[test]
    fn recording_writes_a_frame_per_step() {
        let dir = tempfile::tempdir().unwrap();
        let server = LoopbackServer::new();
        let config = SessionConfig {
            render: true,
            record: true,
            record_dir: dir.path().join("frames"),
            display: [4, 3],
            ..SessionConfig::default()
        };
        let mut sim = Simulation::new(open(&server, config), &[car(), pedestrian()], None).unwrap();
        assert!(sim.entity(0).unwrap().rig().is_some());
        assert!(sim.entity(1).unwrap().rig().is_none());
        for _ in 0..3 {
            sim.step().unwrap();
        }
        let mid_run = FrameRecorder::open(dir.path().join("frames")).unwrap();
        assert!(mid_run.manifest().entries.is_empty());
        sim.destroy().unwrap();

        let recorder = FrameRecorder::open(dir.path().join("frames")).unwrap();
        assert_eq!(recorder.manifest().entries.len(), 3);
        recorder.verify().unwrap();
    }
}
