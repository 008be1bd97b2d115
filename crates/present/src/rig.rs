use glam::Vec3;
use simlink_common::{ActorId, NativeTransform, Rotation};
use simlink_session::{CameraMount, SessionConfig};

/// Blueprint spawned for the presentation camera.
pub const CAMERA_BLUEPRINT: &str = "sensor.camera.rgb";

/// How the presentation camera should be built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigSpec {
    pub mount: CameraMount,
    pub width: u32,
    pub height: u32,
    /// Horizontal field of view in degrees.
    pub fov: f32,
    /// Frames from this rig are also written to disk.
    pub recording: bool,
}

impl RigSpec {
    /// `None` when the session does not render.
    pub fn from_config(config: &SessionConfig) -> Option<Self> {
        if !config.render {
            return None;
        }
        let [width, height] = config.display;
        Some(Self {
            mount: config.camera,
            width,
            height,
            fov: 90.0,
            recording: config.record,
        })
    }

    /// Camera transform relative to the entity it is attached to.
    pub fn mount_transform(&self) -> NativeTransform {
        match self.mount {
            CameraMount::Chase => NativeTransform::new(
                Vec3::new(-5.5, 0.0, 2.8),
                Rotation {
                    pitch: -15.0,
                    ..Rotation::default()
                },
            ),
            CameraMount::Hood => {
                NativeTransform::new(Vec3::new(1.6, 0.0, 1.7), Rotation::default())
            }
        }
    }

    /// Blueprint attributes the camera is spawned with.
    pub fn attributes(&self) -> [(&'static str, String); 3] {
        [
            ("image_size_x", self.width.to_string()),
            ("image_size_y", self.height.to_string()),
            ("fov", self.fov.to_string()),
        ]
    }
}

/// A spawned camera attached to the primary entity. Owns its sensor actor.
#[derive(Debug, PartialEq)]
pub struct CameraRig {
    pub sensor: ActorId,
    pub spec: RigSpec,
}
