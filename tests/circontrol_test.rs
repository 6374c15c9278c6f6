use ampsim::charger::{ChargeState, Charger};
use ampsim::circontrol::CircontrolDevice;
use ampsim::config::{DeviceConfig, Vendor};
use ampsim::device::Device;
use chrono::{Duration, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn device_config() -> DeviceConfig {
    DeviceConfig {
        vendor: Vendor::Circontrol,
        port: 8002,
        session_start_parameter: 0.0,
        phases: 3,
        max_current: 32.0,
        persistence_id: None,
        seed: Some(42),
    }
}

fn idle_device() -> CircontrolDevice {
    let charger = Charger::new_at(
        &device_config(),
        None,
        StdRng::seed_from_u64(42),
        Utc::now(),
    )
    .unwrap();
    CircontrolDevice::with_charger(charger, 8002)
}

/// Walk a charger into the charging state using explicit tick times
/// anchored at the current wall clock.
fn charging_device() -> CircontrolDevice {
    let start = Utc::now();
    let mut charger =
        Charger::new_at(&device_config(), None, StdRng::seed_from_u64(42), start).unwrap();
    let mut now = start;
    while charger.state() != ChargeState::Charging {
        now = charger.next_state_change() + Duration::seconds(1);
        charger.tick(now);
    }
    CircontrolDevice::with_charger(charger, 8002)
}

const CURRENT_16: &str = "<device><id>EVCommDevice</id><current>16</current></device>";

#[test]
fn socket_info_lists_capabilities() {
    let device = idle_device();
    let response = device.handle_read("/services/cpi/socketInfo.xml");

    assert_eq!(response.content_type, "text/xml");
    assert!(response.body.contains("<socketsInfo>"));
    assert!(response.body.contains("<supportedCurrent>32</supportedCurrent>"));
    assert!(response.body.contains("<connectorType>62196 TYPE 2</connectorType>"));
}

#[test]
fn charge_state_code_follows_session_state() {
    let device = idle_device();
    let body = device.handle_read("/services/cpi/chargeState.xml").body;
    assert!(body.contains("<state>0</state>"));
    assert!(body.contains("<connected>F</connected>"));
    assert!(!body.contains("<socket>"));

    let device = charging_device();
    let body = device.handle_read("/services/cpi/chargeState.xml").body;
    assert!(body.contains("<state>8</state>"));
    assert!(body.contains("<connected>T</connected>"));
    assert!(body.contains("<locked>T</locked>"));
    assert!(body.contains("<socket>"));
}

#[test]
fn pause_reports_stopped_code_and_omits_socket_block() {
    let mut device = charging_device();

    let response = device.handle_write("/services/cpi/stopCharge.xml", "");
    assert!(response.body.is_empty());
    assert_eq!(device.charger().requested_current(), Some(0.0));

    let state_body = device.handle_read("/services/cpi/chargeState.xml").body;
    assert!(state_body.contains("<state>10</state>"));

    // Not charging anymore: the inner status block disappears
    let info_body = device.handle_read("/services/cpi/chargeInfo.xml").body;
    assert!(!info_body.contains("<socket>"));
}

#[test]
fn resume_restores_device_maximum() {
    let mut device = charging_device();
    device.handle_write("/services/cpi/stopCharge.xml", "");
    assert_eq!(device.charger().requested_current(), Some(0.0));

    device.handle_write("/services/cpi/startCharge.xml", "");
    assert_eq!(device.charger().requested_current(), Some(32.0));

    let body = device.handle_read("/services/cpi/chargeState.xml").body;
    assert!(body.contains("<state>8</state>"));
    assert!(body.contains("<socket>"));
}

#[test]
fn reduce_current_applies_in_any_state() {
    let mut device = idle_device();
    device.handle_write("/services/cpi/reduceCurrent.xml", CURRENT_16);
    assert_eq!(device.charger().requested_current(), Some(16.0));
}

#[test]
fn plug_current_only_applies_while_charging() {
    let mut device = idle_device();
    device.handle_write("/services/cpi/plugCurrent.xml", CURRENT_16);
    assert_eq!(device.charger().requested_current(), None);

    let mut device = charging_device();
    device.handle_write("/services/cpi/plugCurrent.xml", CURRENT_16);
    assert_eq!(device.charger().requested_current(), Some(16.0));
}

#[test]
fn missing_or_malformed_current_is_not_applied() {
    let mut device = idle_device();

    device.handle_write("/services/cpi/reduceCurrent.xml", "<device></device>");
    assert_eq!(device.charger().requested_current(), None);

    device.handle_write(
        "/services/cpi/reduceCurrent.xml",
        "<device><current>plenty</current></device>",
    );
    assert_eq!(device.charger().requested_current(), None);
}

#[test]
fn charge_info_carries_session_energy() {
    let device = charging_device();
    let body = device.handle_read("/services/cpi/chargeInfo.xml").body;

    assert!(body.contains("<chargesInfo>"));
    assert!(body.contains("<userType>RFID</userType>"));
    assert!(body.contains("<activeEnergy>"));
    assert!(body.contains("<partialActiveEnergy>"));
}

#[test]
fn unknown_paths_fall_back_without_error() {
    let mut device = idle_device();

    let read = device.handle_read("/services/cpi/unknown.xml");
    assert_eq!(read.content_type, "application/json");

    let write = device.handle_write("/services/cpi/unknown.xml", "");
    assert!(write.body.is_empty());
}
