use std::path::Path;

use anyhow::{Context, bail};
use serde::Deserialize;
use simlink_client::{Control, VehicleControl, WalkerControl};
use simlink_provision::EntityDescriptor;
use simlink_session::SessionConfig;

fn default_steps() -> u64 {
    10
}

/// A scenario file: session settings, entities and a control schedule.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub entities: Vec<EntityDescriptor>,
    #[serde(default = "default_steps")]
    pub steps: u64,
    #[serde(default)]
    pub controls: Vec<ScheduledControl>,
}

/// A command queued for `entity` right before step `step` (1-based).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduledControl {
    pub step: u64,
    pub entity: usize,
    #[serde(default)]
    pub vehicle: Option<VehicleControl>,
    #[serde(default)]
    pub walker: Option<WalkerControl>,
}

impl ScheduledControl {
    pub fn control(&self) -> anyhow::Result<Control> {
        match (self.vehicle, self.walker) {
            (Some(vehicle), None) => Ok(vehicle.into()),
            (None, Some(walker)) => Ok(walker.into()),
            _ => bail!(
                "control for entity {} at step {} must set exactly one of `vehicle` or `walker`",
                self.entity,
                self.step
            ),
        }
    }
}

impl ScenarioFile {
    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        let scenario: Self = serde_yaml::from_str(text).context("invalid scenario YAML")?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.session.validate()?;
        for scheduled in &self.controls {
            scheduled.control()?;
            if scheduled.entity >= self.entities.len() {
                bail!(
                    "control at step {} targets entity {} but only {} are declared",
                    scheduled.step,
                    scheduled.entity,
                    self.entities.len()
                );
            }
            if scheduled.step == 0 || scheduled.step > self.steps {
                bail!(
                    "control for entity {} is scheduled at step {}, outside 1..={}",
                    scheduled.entity,
                    scheduled.step,
                    self.steps
                );
            }
        }
        Ok(())
    }

    /// Controls to queue before `step`.
    pub fn controls_at(&self, step: u64) -> impl Iterator<Item = &ScheduledControl> {
        self.controls.iter().filter(move |c| c.step == step)
    }
}
