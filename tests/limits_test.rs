use ampsim::limits::CurrentLimits;

#[test]
fn minimum_of_all_caps_wins() {
    let mut limits = CurrentLimits::new(32.0);
    assert_eq!(limits.resolve(true), 32.0);

    limits.cable_max = Some(20.0);
    assert_eq!(limits.resolve(true), 20.0);

    limits.requested = Some(16.0);
    assert_eq!(limits.resolve(true), 16.0);

    // A cap above the device ceiling does not raise the result
    limits.requested = Some(64.0);
    assert_eq!(limits.resolve(true), 20.0);
}

#[test]
fn zero_when_not_delivering() {
    let mut limits = CurrentLimits::new(32.0);
    limits.requested = Some(16.0);
    assert_eq!(limits.resolve(false), 0.0);
}

#[test]
fn explicit_zero_cap_differs_from_unset() {
    let mut limits = CurrentLimits::new(32.0);

    limits.requested = None;
    assert_eq!(limits.resolve(true), 32.0);

    // Some(0.0) is a meaningful pause signal
    limits.requested = Some(0.0);
    assert_eq!(limits.resolve(true), 0.0);
    assert_ne!(limits.requested, None);
}
