//! A vehicle primary and a pedestrian, three steps with throttle queued on the
//! vehicle before step 2, then teardown.

use glam::DVec2;
use simlink_client::{Control, LoopbackServer, SimEvent, VehicleControl, WorldSettings};
use simlink_controller::Simulation;
use simlink_provision::EntityDescriptor;
use simlink_session::{Session, SessionConfig};

fn position(events: &[SimEvent], target: &SimEvent) -> usize {
    events
        .iter()
        .position(|e| e == target)
        .unwrap_or_else(|| panic!("{target:?} not found"))
}

#[test]
fn vehicle_and_pedestrian_scenario() {
    let server = LoopbackServer::new();
    let prior = WorldSettings {
        synchronous_mode: false,
        fixed_delta_seconds: Some(0.2),
        no_rendering_mode: false,
    };
    server.set_world_settings(prior);

    let session = Session::open(SessionConfig::default(), &server).unwrap();
    let descriptors = [
        EntityDescriptor::new("vehicle.lincoln.mkz", DVec2::new(0.0, 0.0)).with_role_name("ego"),
        EntityDescriptor::new("walker.pedestrian.0002", DVec2::new(6.0, 12.0)),
    ];
    let mut sim = Simulation::new(session, &descriptors, None).unwrap();
    let vehicle = sim.entities()[0].actor();
    let walker = sim.entities()[1].actor();
    let controller = sim.entities()[1].controller().unwrap();
    let settled_at = server.events().len();

    let first = sim.step().unwrap();
    let step1_frame = server.frame();
    let throttle = Control::from(VehicleControl::throttle(0.8));
    sim.enqueue(0, throttle).unwrap();
    let second = sim.step().unwrap();
    let step2_frame = server.frame();
    let third = sim.step().unwrap();

    assert_eq!(first[0].speed, 0.0);
    assert!(second[0].speed > 0.0);
    assert!(third[0].speed > second[0].speed);
    for state in first.iter().chain(&second).chain(&third) {
        assert_eq!(state.speed, state.velocity.x.hypot(state.velocity.y));
    }

    sim.destroy().unwrap();
    let events = server.events();

    // exactly one control reaches the vehicle after provisioning, between
    // step 1's tick and step 2's tick
    let applied: Vec<usize> = events
        .iter()
        .enumerate()
        .skip(settled_at)
        .filter_map(|(i, e)| match e {
            SimEvent::ControlApplied { id, control } if *id == vehicle => {
                assert_eq!(*control, throttle);
                Some(i)
            }
            _ => None,
        })
        .collect();
    assert_eq!(applied.len(), 1);
    let tick1 = position(&events, &SimEvent::Ticked { frame: step1_frame });
    let tick2 = position(&events, &SimEvent::Ticked { frame: step2_frame });
    assert!(tick1 < applied[0] && applied[0] < tick2);

    // controller is stopped before the pedestrian goes away
    let stopped = position(&events, &SimEvent::ControllerStopped { id: controller });
    let controller_gone = position(&events, &SimEvent::Destroyed { id: controller });
    let walker_gone = position(&events, &SimEvent::Destroyed { id: walker });
    assert!(stopped < walker_gone);
    assert!(controller_gone < walker_gone);

    assert!(server.live_actors().is_empty());
    let released = server.world_settings();
    assert_eq!(released.synchronous_mode, prior.synchronous_mode);
    assert_eq!(released.fixed_delta_seconds, None);
    assert!(!server.traffic_synchronous());
}

#[test]
fn presentation_does_not_change_cadence_or_state() {
    let run = |render: bool| {
        let dir = tempfile::tempdir().unwrap();
        let server = LoopbackServer::new();
        let config = SessionConfig {
            render,
            record: render,
            record_dir: dir.path().to_path_buf(),
            display: [8, 6],
            ..SessionConfig::default()
        };
        let session = Session::open(config, &server).unwrap();
        let descriptors = [EntityDescriptor::new("vehicle.audi.tt", DVec2::new(1.0, 2.0))
            .with_heading(0.5)
            .with_speed(3.0)];
        let mut sim = Simulation::new(session, &descriptors, None).unwrap();
        sim.enqueue(0, VehicleControl::throttle(0.5).into()).unwrap();
        let mut states = Vec::new();
        for _ in 0..4 {
            states.extend(sim.step().unwrap());
        }
        sim.destroy().unwrap();
        let ticks = server
            .events()
            .iter()
            .filter(|e| matches!(e, SimEvent::Ticked { .. }))
            .count();
        (states, ticks)
    };

    let (plain, plain_ticks) = run(false);
    let (rendered, rendered_ticks) = run(true);
    assert_eq!(plain_ticks, rendered_ticks);
    assert_eq!(plain, rendered);
}

#[test]
fn rollback_leaves_no_actors_for_any_failing_position() {
    for k in 1..=4 {
        let server = LoopbackServer::new().rejecting_spawn_attempt(k);
        let session = Session::open(SessionConfig::default(), &server).unwrap();
        let descriptors = [
            EntityDescriptor::new("vehicle.audi.tt", DVec2::ZERO),
            EntityDescriptor::new("walker.pedestrian.0001", DVec2::new(3.0, 0.0)),
            EntityDescriptor::new("vehicle.tesla.model3", DVec2::new(9.0, 0.0)),
        ];
        assert!(Simulation::new(session, &descriptors, None).is_err(), "attempt {k}");
        assert!(server.live_actors().is_empty(), "attempt {k}");
        assert!(!server.world_settings().synchronous_mode, "attempt {k}");
    }
}
