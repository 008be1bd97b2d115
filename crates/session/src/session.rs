use std::path::PathBuf;

use simlink_client::{ClientError, Connector, SimulatorClient, WorldSettings};
use uuid::Uuid;

use crate::config::{ConfigError, MapSource, SessionConfig};

/// Errors from opening, using or closing a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not connect to simulator at {address}:{port}")]
    Connection {
        address: String,
        port: u16,
        #[source]
        source: ClientError,
    },
    #[error("failed to load map {map}")]
    WorldLoad {
        map: String,
        #[source]
        source: ClientError,
    },
    #[error("failed to read track description {}", path.display())]
    TrackRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to configure world")]
    WorldConfig(#[source] ClientError),
    #[error("failed to restore world settings")]
    Restore(#[source] ClientError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("session {0} is closed")]
    Closed(Uuid),
}

/// World settings checked out by a session, to be checked back in on close.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SettingsLease {
    baseline: WorldSettings,
}

impl SettingsLease {
    /// Settings the world had before the session took it over.
    pub fn baseline(&self) -> &WorldSettings {
        &self.baseline
    }

    /// Ambient real-time mode applied on top of whatever the world has now:
    /// synchronous mode off, no fixed timestep.
    fn release_onto(&self, current: WorldSettings) -> WorldSettings {
        WorldSettings {
            synchronous_mode: false,
            fixed_delta_seconds: None,
            ..current
        }
    }
}

/// One active connection plus the world configuration it holds.
pub struct Session<C: SimulatorClient> {
    id: Uuid,
    config: SessionConfig,
    client: C,
    lease: Option<SettingsLease>,
    closed: bool,
}

impl<C: SimulatorClient> Session<C> {
    /// Connect, load the world, apply weather and enter synchronous fixed-step mode.
    ///
    /// Any failure is fatal; if synchronous mode was partially enabled it is
    /// rolled back before the error is returned.
    pub fn open<K>(config: SessionConfig, connector: &K) -> Result<Self, SessionError>
    where
        K: Connector<Client = C>,
    {
        config.validate()?;
        let id = Uuid::new_v4();
        let _span = tracing::info_span!("session_open", session = %id).entered();

        let endpoint = config.endpoint();
        let mut client =
            connector
                .connect(&endpoint)
                .map_err(|source| SessionError::Connection {
                    address: endpoint.address.clone(),
                    port: endpoint.port,
                    source,
                })?;
        tracing::info!(address = %endpoint.address, port = endpoint.port, "connected to simulator");

        load_map(&mut client, &config.map)?;
        tracing::info!(map = %config.map.label(), "world loaded");

        if let Some(weather) = &config.weather {
            client
                .set_weather(weather)
                .map_err(SessionError::WorldConfig)?;
            tracing::debug!(?weather, "weather applied");
        }

        let baseline = client
            .world_settings()
            .map_err(SessionError::WorldConfig)?;

        let mut session = Self {
            id,
            config,
            client,
            lease: Some(SettingsLease { baseline }),
            closed: false,
        };
        if let Err(err) = session.enter_synchronous(baseline) {
            if let Err(cleanup) = session.close() {
                tracing::warn!(error = %cleanup, "failed to undo partial synchronous setup");
            }
            return Err(err);
        }
        Ok(session)
    }

    fn enter_synchronous(&mut self, baseline: WorldSettings) -> Result<(), SessionError> {
        self.client
            .set_traffic_synchronous(true)
            .map_err(SessionError::WorldConfig)?;
        let settings = WorldSettings {
            synchronous_mode: true,
            fixed_delta_seconds: Some(self.config.timestep),
            ..baseline
        };
        self.client
            .apply_world_settings(&settings)
            .map_err(SessionError::WorldConfig)?;
        tracing::info!(timestep = self.config.timestep, "synchronous mode enabled");
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn lease(&self) -> Option<&SettingsLease> {
        self.lease.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Direct access to the connection, refused once the session is closed.
    pub fn client_mut(&mut self) -> Result<&mut C, SessionError> {
        if self.closed {
            return Err(SessionError::Closed(self.id));
        }
        Ok(&mut self.client)
    }

    /// Advance the world one fixed timestep.
    pub fn tick(&mut self) -> Result<u64, SessionError> {
        Ok(self.client_mut()?.tick()?)
    }

    /// Hand the world back in ambient real-time mode: synchronous mode off,
    /// fixed timestep cleared, traffic control asynchronous.
    ///
    /// Every restore step is attempted even if an earlier one fails; the
    /// first failure is returned. Calling `close` again is a no-op.
    pub fn close(&mut self) -> Result<(), SessionError> {
        if self.closed {
            tracing::debug!(session = %self.id, "session already closed");
            return Ok(());
        }
        self.closed = true;
        let mut first_error = None;

        if let Some(lease) = self.lease.take() {
            let current = match self.client.world_settings() {
                Ok(current) => current,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to read world settings, releasing from baseline");
                    first_error.get_or_insert(err);
                    lease.baseline
                }
            };
            let restored = lease.release_onto(current);
            if let Err(err) = self.client.apply_world_settings(&restored) {
                tracing::warn!(error = %err, "failed to restore world settings");
                first_error.get_or_insert(err);
            }
        }
        if let Err(err) = self.client.set_traffic_synchronous(false) {
            tracing::warn!(error = %err, "failed to disable traffic synchronous mode");
            first_error.get_or_insert(err);
        }

        match first_error {
            Some(err) => Err(SessionError::Restore(err)),
            None => {
                tracing::info!(session = %self.id, "session closed, synchronous mode released");
                Ok(())
            }
        }
    }
}

impl<C: SimulatorClient> Drop for Session<C> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.close() {
                tracing::warn!(session = %self.id, error = %err, "session close on drop failed");
            }
        }
    }
}

fn load_map<C: SimulatorClient>(client: &mut C, map: &MapSource) -> Result<(), SessionError> {
    match map {
        MapSource::Name(name) => client
            .load_world(name)
            .map_err(|source| SessionError::WorldLoad {
                map: name.clone(),
                source,
            }),
        MapSource::Track(path) => {
            let track = std::fs::read_to_string(path).map_err(|source| SessionError::TrackRead {
                path: path.clone(),
                source,
            })?;
            client
                .generate_world(&track)
                .map_err(|source| SessionError::WorldLoad {
                    map: path.display().to_string(),
                    source,
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simlink_client::{LoopbackServer, SimEvent, Weather};

    fn position(events: &[SimEvent], pred: impl Fn(&SimEvent) -> bool) -> usize {
        events.iter().position(pred).expect("event not found")
    }

    #[test]
    fn open_enters_synchronous_fixed_step() {
        let server = LoopbackServer::new();
        let config = SessionConfig {
            timestep: 0.05,
            ..SessionConfig::default()
        };
        let session = Session::open(config, &server).unwrap();

        let settings = server.world_settings();
        assert!(settings.synchronous_mode);
        assert_eq!(settings.fixed_delta_seconds, Some(0.05));
        assert!(server.traffic_synchronous());
        assert_eq!(server.current_map().as_deref(), Some("Town01"));
        assert_eq!(session.lease().unwrap().baseline(), &WorldSettings::default());
    }

    #[test]
    fn synchronous_flags_are_the_last_configuration_step() {
        let server = LoopbackServer::new();
        let config = SessionConfig {
            weather: Some(Weather::Preset("WetNoon".into())),
            ..SessionConfig::default()
        };
        let _session = Session::open(config, &server).unwrap();

        let events = server.events();
        let loaded = position(&events, |e| matches!(e, SimEvent::WorldLoaded { .. }));
        let weather = position(&events, |e| matches!(e, SimEvent::WeatherSet { .. }));
        let traffic = position(&events, |e| {
            matches!(e, SimEvent::TrafficSynchronous { enabled: true })
        });
        let settings = position(&events, |e| matches!(e, SimEvent::SettingsApplied { .. }));
        assert!(loaded < weather);
        assert!(weather < traffic);
        assert!(traffic < settings);
        assert_eq!(settings, events.len() - 1);
    }

    #[test]
    fn close_restores_ambient_mode() {
        let server = LoopbackServer::new();
        let mut session = Session::open(SessionConfig::default(), &server).unwrap();
        session.close().unwrap();

        assert_eq!(server.world_settings(), WorldSettings::default());
        assert!(!server.traffic_synchronous());
        assert!(session.is_closed());
    }

    #[test]
    fn close_leaves_ambient_mode_even_if_another_client_was_synchronous() {
        let server = LoopbackServer::new();
        let prior = WorldSettings {
            synchronous_mode: true,
            fixed_delta_seconds: Some(0.02),
            no_rendering_mode: true,
        };
        server.set_world_settings(prior);

        let mut session = Session::open(SessionConfig::default(), &server).unwrap();
        assert_eq!(server.world_settings().fixed_delta_seconds, Some(0.1));
        assert_eq!(session.lease().unwrap().baseline(), &prior);
        session.close().unwrap();

        let released = server.world_settings();
        assert!(!released.synchronous_mode);
        assert_eq!(released.fixed_delta_seconds, None);
        assert!(released.no_rendering_mode);
        assert!(!server.traffic_synchronous());
    }

    #[test]
    fn unreadable_settings_still_release_sync_and_report() {
        // read 1 is the baseline at open, read 2 happens in close
        let server = LoopbackServer::new().failing_settings_read(2);
        let mut session = Session::open(SessionConfig::default(), &server).unwrap();
        let err = session.close().unwrap_err();
        assert!(matches!(err, SessionError::Restore(ClientError::Remote(_))));
        assert!(!server.world_settings().synchronous_mode);
        assert_eq!(server.world_settings().fixed_delta_seconds, None);
        assert!(!server.traffic_synchronous());
    }

    #[test]
    fn close_twice_restores_once() {
        let server = LoopbackServer::new();
        let mut session = Session::open(SessionConfig::default(), &server).unwrap();
        session.close().unwrap();
        session.close().unwrap();
        drop(session);

        let applied = server
            .events()
            .iter()
            .filter(|e| matches!(e, SimEvent::SettingsApplied { .. }))
            .count();
        // one on open, one on close
        assert_eq!(applied, 2);
    }

    #[test]
    fn drop_closes_the_session() {
        let server = LoopbackServer::new();
        {
            let _session = Session::open(SessionConfig::default(), &server).unwrap();
            assert!(server.world_settings().synchronous_mode);
        }
        assert!(!server.world_settings().synchronous_mode);
        assert!(!server.traffic_synchronous());
    }

    #[test]
    fn refused_connection_is_a_connection_error() {
        let server = LoopbackServer::new().refusing_connections("no route");
        let err = Session::open(SessionConfig::default(), &server).err().unwrap();
        assert!(matches!(err, SessionError::Connection { port: 2000, .. }));
    }

    #[test]
    fn oversized_timeout_is_a_config_error_not_a_panic() {
        let server = LoopbackServer::new();
        let config = SessionConfig {
            timeout_secs: 1e30,
            ..SessionConfig::default()
        };
        let err = Session::open(config, &server).err().unwrap();
        assert!(matches!(err, SessionError::Config(ConfigError::InvalidTimeout(_))));
        assert!(server.events().is_empty());
    }

    #[test]
    fn unknown_map_is_a_world_load_error() {
        let server = LoopbackServer::new();
        let config = SessionConfig {
            map: MapSource::Name("Atlantis".into()),
            ..SessionConfig::default()
        };
        let err = Session::open(config, &server).err().unwrap();
        assert!(matches!(err, SessionError::WorldLoad { ref map, .. } if map == "Atlantis"));
        assert!(!server.world_settings().synchronous_mode);
        assert!(!server.traffic_synchronous());
    }

    #[test]
    fn track_file_is_streamed_to_generate_world() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.xodr");
        std::fs::write(&path, "<?xml version=\"1.0\"?>\n<OpenDRIVE>\n</OpenDRIVE>\n").unwrap();
        let server = LoopbackServer::new();
        let config = SessionConfig {
            map: MapSource::Track(path),
            ..SessionConfig::default()
        };
        let _session = Session::open(config, &server).unwrap();
        assert!(
            server
                .events()
                .iter()
                .any(|e| matches!(e, SimEvent::WorldGenerated { bytes } if *bytes > 0))
        );
    }

    #[test]
    fn missing_track_file_is_reported() {
        let server = LoopbackServer::new();
        let config = SessionConfig {
            map: MapSource::Track(PathBuf::from("/nonexistent/track.xodr")),
            ..SessionConfig::default()
        };
        let err = Session::open(config, &server).err().unwrap();
        assert!(matches!(err, SessionError::TrackRead { .. }));
    }

    #[test]
    fn unknown_weather_preset_leaves_world_untouched() {
        let server = LoopbackServer::new();
        let config = SessionConfig {
            weather: Some(Weather::Preset("Blizzard".into())),
            ..SessionConfig::default()
        };
        let err = Session::open(config, &server).err().unwrap();
        assert!(matches!(err, SessionError::WorldConfig(_)));
        assert!(!server.world_settings().synchronous_mode);
        assert!(!server.traffic_synchronous());
    }

    #[test]
    fn invalid_config_never_connects() {
        let server = LoopbackServer::new();
        let config = SessionConfig {
            timestep: 0.0,
            ..SessionConfig::default()
        };
        let err = Session::open(config, &server).err().unwrap();
        assert!(matches!(err, SessionError::Config(ConfigError::InvalidTimestep(_))));
        assert!(server.events().is_empty());
    }

    #[test]
    fn closed_session_rejects_ticks() {
        let server = LoopbackServer::new();
        let mut session = Session::open(SessionConfig::default(), &server).unwrap();
        assert_eq!(session.tick().unwrap(), 1);
        session.close().unwrap();
        assert!(matches!(session.tick(), Err(SessionError::Closed(_))));
        assert_eq!(server.frame(), 1);
    }
}
