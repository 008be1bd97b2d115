use simlink_client::{ClientError, SimulatorClient};
use simlink_common::ActorId;
use simlink_provision::EntityState;

/// Pull one actor's transform and velocities and convert them to scenario
/// convention.
pub fn read_state<C: SimulatorClient>(
    client: &mut C,
    actor: ActorId,
) -> Result<EntityState, ClientError> {
    let transform = client.actor_transform(actor)?;
    let velocity = client.actor_velocity(actor)?;
    let angular_velocity = client.actor_angular_velocity(actor)?;

    let pose = simlink_coords::to_scenario_pose(&transform);
    let velocity = simlink_coords::to_scenario_velocity(velocity);
    Ok(EntityState {
        position: pose.position,
        elevation: pose.elevation,
        heading: pose.heading,
        velocity,
        speed: velocity.x.hypot(velocity.y),
        angular_speed: simlink_coords::to_scenario_angular_speed(angular_velocity),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{DVec2, Vec3};
    use simlink_client::{Connector, Endpoint, LoopbackServer};
    use simlink_common::{NativeTransform, Rotation};
    use std::time::Duration;

    #[test]
    fn state_is_converted_and_speed_matches_velocity() {
        let server = LoopbackServer::new();
        let mut client = server
            .connect(&Endpoint {
                address: "127.0.0.1".into(),
                port: 2000,
                timeout: Duration::from_secs(1),
            })
            .unwrap();
        let bp = client.find_blueprint("vehicle.audi.tt").unwrap();
        let transform = NativeTransform::new(Vec3::new(10.0, -20.0, 0.3), Rotation::from_yaw(-90.0));
        let actor = client.try_spawn_actor(&bp, &transform, None).unwrap().unwrap().id;
        client.set_target_velocity(actor, Vec3::new(3.0, -4.0, 0.0)).unwrap();

        let state = read_state(&mut client, actor).unwrap();
        assert!((state.position - DVec2::new(10.0, 20.0)).length() < 1e-5);
        assert!((state.elevation - 0.3).abs() < 1e-5);
        assert!(state.heading.abs() < 1e-6);
        assert!((state.velocity - DVec2::new(3.0, 4.0)).length() < 1e-5);
        assert_eq!(state.speed, state.velocity.x.hypot(state.velocity.y));
        assert!((state.speed - 5.0).abs() < 1e-5);
    }

    #[test]
    fn missing_actor_is_an_error() {
        let server = LoopbackServer::new();
        let mut client = server
            .connect(&Endpoint {
                address: "127.0.0.1".into(),
                port: 2000,
                timeout: Duration::from_secs(1),
            })
            .unwrap();
        assert_eq!(
            read_state(&mut client, ActorId(7)),
            Err(ClientError::ActorNotFound(ActorId(7)))
        );
    }
}
