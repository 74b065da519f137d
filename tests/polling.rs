//! Background polling against a simulated controller. Time is paused so
//! tick arithmetic is exact.

use bacpoll_core::{ControllerFixture, Device, Error, ObjectFixture, PollCommand, PollState, SimulatedController};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

async fn setup(points: u32) -> (Arc<SimulatedController>, Device) {
    let mut fixture = ControllerFixture::new("FCU-3", "3:7", 307);
    for i in 1..=points {
        fixture = fixture.with_object(ObjectFixture::numeric(
            "analogInput",
            i,
            &format!("ZN-T-{}", i),
            21.0,
            "degreesCelsius",
        ));
    }
    let sim = Arc::new(SimulatedController::new(fixture));
    let device = Device::connect("3:7", 307, sim.clone()).await.unwrap();
    (sim, device)
}

#[tokio::test(start_paused = true)]
async fn start_stop_transitions() {
    let (_sim, device) = setup(2).await;
    assert_eq!(device.poll_state(), PollState::Stopped);

    assert_eq!(assert_ok!(device.poll(5u64)), PollState::Running(Duration::from_secs(5)));
    assert_eq!(device.stop_polling(), PollState::Stopped);
    assert_eq!(device.stop_polling(), PollState::Stopped);

    assert_ok!(device.poll(5u64));
    assert_ok!(device.poll(5u64));
    tokio::time::sleep(Duration::from_millis(1)).await;
    let stats = device.poll_stats();
    assert_eq!(stats.live_tasks, 1);
    assert_eq!(stats.tasks_spawned, 3);

    assert_eq!(assert_ok!(device.poll(0u64)), PollState::Stopped);
    assert_eq!(assert_ok!(device.poll(false)), PollState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn each_tick_reads_every_point() {
    let (sim, device) = setup(30).await;
    sim.clear_requests();

    device.start_polling(Duration::from_secs(10)).unwrap();
    tokio::time::sleep(Duration::from_secs(25)).await;
    device.stop_polling();

    // Ticks at 0s, 10s and 20s, 30 points in chunks of 25 and 5
    assert_eq!(sim.multi_read_requests().len(), 6);
    assert!(device.iter().all(|p| p.history_len() == 3));
    assert_eq!(device.poll_stats().cycles_completed, 3);
}

#[tokio::test(start_paused = true)]
async fn no_reads_after_stop() {
    let (sim, device) = setup(3).await;
    device.start_polling(Duration::from_secs(1)).unwrap();
    tokio::time::sleep(Duration::from_millis(4500)).await;

    device.stop_polling();
    let reads = sim.stats().multi_reads;
    assert!(reads >= 4);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(sim.stats().multi_reads, reads);
    assert_eq!(device.poll_stats().live_tasks, 0);
}

#[tokio::test(start_paused = true)]
async fn slow_controller_never_sees_overlapping_cycles() {
    let (sim, device) = setup(4).await;
    sim.set_latency(Duration::from_millis(1800));

    device.start_polling(Duration::from_secs(1)).unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    device.stop_polling();

    assert_eq!(sim.stats().max_in_flight, 1);
    let stats = device.poll_stats();
    assert!(stats.ticks_skipped > 0);
    assert!(stats.cycles_started < 10);
}

#[tokio::test(start_paused = true)]
async fn restart_does_not_overlap_running_cycle() {
    let (sim, device) = setup(2).await;
    sim.set_latency(Duration::from_secs(3));

    device.start_polling(Duration::from_secs(1)).unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    // The first cycle is still waiting on the controller
    device.start_polling(Duration::from_secs(1)).unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    device.stop_polling();

    assert_eq!(sim.stats().max_in_flight, 1);
}

#[tokio::test(start_paused = true)]
async fn stop_lets_in_flight_read_land() {
    let (sim, device) = setup(2).await;
    sim.set_latency(Duration::from_secs(3));
    sim.clear_requests();

    device.start_polling(Duration::from_secs(1)).unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    // The first cycle is waiting on the controller
    assert_eq!(device.stop_polling(), PollState::Stopped);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(device.iter().all(|p| p.history_len() == 1));
    assert_eq!(sim.multi_read_requests().len(), 1);
    assert_eq!(device.poll_stats().cycles_completed, 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_device_stops_polling() {
    let (sim, device) = setup(2).await;
    let discovery_reads = sim.stats().multi_reads;
    device.start_polling(Duration::from_secs(1)).unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    // Ticks at 0s and 1s
    let reads = sim.stats().multi_reads;
    assert_eq!(reads - discovery_reads, 2);
    drop(device);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(sim.stats().multi_reads, reads);
}

#[tokio::test(start_paused = true)]
async fn unreachable_cycles_keep_polling() {
    let (sim, device) = setup(2).await;
    sim.set_reachable(false);

    device.start_polling(Duration::from_secs(1)).unwrap();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(device.poll_stats().cycles_failed, 3);
    assert!(device.poll_state().is_running());

    sim.set_reachable(true);
    tokio::time::sleep(Duration::from_secs(1)).await;
    device.stop_polling();

    assert_eq!(device.poll_stats().cycles_completed, 1);
    assert!(device.iter().all(|p| p.history_len() == 1));
}

#[tokio::test(start_paused = true)]
async fn unrecognised_command_is_a_conflict() {
    let (_sim, device) = setup(1).await;
    let err = assert_err!("every so often".parse::<PollCommand>());
    assert!(matches!(err, Error::ConfigurationConflict(_)));
    assert_eq!(device.poll_state(), PollState::Stopped);
}
