use ampsim::charger::{ChargeState, Charger};
use ampsim::config::{DeviceConfig, Vendor};
use chrono::{DateTime, Duration, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn device_config(session_start_parameter: f64) -> DeviceConfig {
    DeviceConfig {
        vendor: Vendor::Circontrol,
        port: 8002,
        session_start_parameter,
        phases: 3,
        max_current: 32.0,
        persistence_id: None,
        seed: None,
    }
}

fn at(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
}

fn charger_at(parameter: f64, seed: u64, start: DateTime<Utc>) -> Charger {
    Charger::new_at(
        &device_config(parameter),
        None,
        StdRng::seed_from_u64(seed),
        start,
    )
    .unwrap()
}

#[test]
fn deterministic_idle_ends_at_top_of_next_hour() {
    // Parameter 0, constructed at 12:00:30: the idle phase ends exactly at
    // 13:00:00.
    let charger = charger_at(0.0, 1, at("2024-05-04T12:00:30Z"));
    assert_eq!(charger.state(), ChargeState::Idle);
    assert_eq!(charger.next_state_change(), at("2024-05-04T13:00:00Z"));
}

#[test]
fn deterministic_devices_converge_to_same_minute_of_hour() {
    // Same parameter, different construction instants within the hour: both
    // devices realign to minute 7 past the next hour.
    let early = charger_at(7.0, 1, at("2024-05-04T12:00:30Z"));
    let late = charger_at(7.0, 2, at("2024-05-04T12:40:00Z"));

    assert_eq!(early.next_state_change(), at("2024-05-04T13:07:00Z"));
    assert_eq!(late.next_state_change(), at("2024-05-04T13:07:00Z"));
}

#[test]
fn deterministic_transition_fires_when_due() {
    let mut charger = charger_at(0.0, 1, at("2024-05-04T12:00:30Z"));

    // Not yet due at the exact pinned instant
    charger.tick(at("2024-05-04T13:00:00Z"));
    assert_eq!(charger.state(), ChargeState::Idle);

    charger.tick(at("2024-05-04T13:00:01Z"));
    assert_eq!(charger.state(), ChargeState::PluggedBeforeCharge);
}

#[test]
fn deterministic_non_idle_durations_share_the_hour() {
    let mut charger = charger_at(0.0, 1, at("2024-05-04T12:00:30Z"));
    let now = at("2024-05-04T13:00:01Z");
    charger.tick(now);
    assert_eq!(charger.state(), ChargeState::PluggedBeforeCharge);

    // Plugged weight is 3 of 356 minutes, compressed into a 60 minute cycle
    let expected_ms = (3.0 / 356.0 * 60.0 * 60_000.0_f64).round() as i64;
    let actual_ms = (charger.next_state_change() - now).num_milliseconds();
    assert!((actual_ms - expected_ms).abs() <= 1);
}

#[test]
fn randomized_durations_never_drop_below_one_minute() {
    // A tiny weight pushes every sampled duration under the floor
    for seed in 0..20 {
        let start = at("2024-05-04T12:00:30Z");
        let charger = charger_at(-0.0001, seed, start);
        let duration = charger.next_state_change() - start;
        assert!(
            duration >= Duration::minutes(1),
            "seed {} produced duration {:?}",
            seed,
            duration
        );
    }
}

#[test]
fn randomized_schedules_differ_by_seed() {
    let start = at("2024-05-04T12:00:30Z");
    let a = charger_at(-1.0, 1, start);
    let b = charger_at(-1.0, 2, start);
    assert_ne!(a.next_state_change(), b.next_state_change());
}
