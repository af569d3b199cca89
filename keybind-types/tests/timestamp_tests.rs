use keybind_types::{Clock, ManualClock, SystemClock, Timestamp};
use std::time::Duration;

#[test]
fn now_is_after_epoch() {
    assert!(Timestamp::now().as_millis() > 0);
}

#[test]
fn saturating_add_adds_millis() {
    let t = Timestamp::from_millis(1_000);
    assert_eq!(t.saturating_add(Duration::from_secs(86_400)).as_millis(), 86_401_000);
}

#[test]
fn saturating_add_clamps() {
    let t = Timestamp::from_millis(u64::MAX - 1);
    assert_eq!(t.saturating_add(Duration::from_secs(10)).as_millis(), u64::MAX);
}

#[test]
fn until_is_zero_once_passed() {
    let early = Timestamp::from_millis(100);
    let late = Timestamp::from_millis(250);
    assert_eq!(early.until(late), Duration::from_millis(150));
    assert_eq!(late.until(early), Duration::ZERO);
}

#[test]
fn ordering() {
    assert!(Timestamp::from_millis(1) < Timestamp::from_millis(2));
}

#[test]
fn serializes_as_number() {
    let json = serde_json::to_string(&Timestamp::from_millis(42)).unwrap();
    assert_eq!(json, "42");
}

#[test]
fn manual_clock_moves_only_when_told() {
    let clock = ManualClock::new(Timestamp::from_millis(10));
    assert_eq!(clock.now().as_millis(), 10);
    clock.advance(5);
    assert_eq!(clock.now().as_millis(), 15);
    clock.set(Timestamp::from_millis(3));
    assert_eq!(clock.now().as_millis(), 3);
}

#[test]
fn system_clock_tracks_wall_time() {
    let before = Timestamp::now();
    let read = SystemClock.now();
    assert!(read >= before);
}
