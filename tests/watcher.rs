//! End-to-end scenarios for the per-expander edge watcher: software
//! debounce, callback ordering, listener clearing and teardown.

mod common;

use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::sleep;
use std::time::Duration;

use common::FakeChip;
use portmux::{Context, Mcp23017, Port, PortEvent};

/// Comfortably longer than the 10 ms poll cadence plus the debounce
/// intervals used below.
const SETTLE: Duration = Duration::from_millis(250);

fn setup(debounce_ms: u64) -> (Context, FakeChip, portmux::Interface) {
    let _ = env_logger::builder().is_test(true).try_init();
    let ctx = Context::new();
    ctx.settings().set_debounce(Duration::from_millis(debounce_ms));
    let chip = FakeChip::new();
    let iface = Mcp23017::open(&ctx, chip.clone(), 0x20).unwrap();
    (ctx, chip, iface)
}

fn channel_listener(port: &Port, rising: bool) -> Receiver<PortEvent> {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let callback = move |event: PortEvent| {
        let _ = tx.lock().unwrap().send(event);
    };
    if rising {
        port.on_rising(callback).unwrap();
    } else {
        port.on_falling(callback).unwrap();
    }
    rx
}

#[test]
fn rising_edge_fires_exactly_once_per_listener() {
    let (ctx, chip, iface) = setup(40);
    let port = iface.get_port(5).unwrap();
    port.set_as_input().unwrap();

    let rising = channel_listener(&port, true);
    let falling = channel_listener(&port, false);

    chip.set_input_level(5, true);
    sleep(SETTLE);

    assert_eq!(
        rising.try_recv().unwrap(),
        PortEvent { number: 5, value: true }
    );
    assert!(rising.try_recv().is_err(), "rising fired more than once");
    assert!(falling.try_recv().is_err(), "falling must not fire");

    ctx.cleanup().unwrap();
}

#[test]
fn flip_that_reverts_within_debounce_fires_nothing() {
    let (ctx, chip, iface) = setup(150);
    let port = iface.get_port(5).unwrap();
    port.set_as_input().unwrap();
    let rising = channel_listener(&port, true);

    chip.set_input_level(5, true);
    sleep(Duration::from_millis(40));
    chip.set_input_level(5, false);
    sleep(SETTLE);

    assert!(rising.try_recv().is_err(), "bounce must be discarded");

    ctx.cleanup().unwrap();
}

#[test]
fn listeners_fire_in_registration_order() {
    let (ctx, chip, iface) = setup(20);
    let port = iface.get_port(3).unwrap();
    port.set_as_input().unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    let first = Arc::clone(&order);
    port.on_rising(move |_| first.lock().unwrap().push("a")).unwrap();
    let second = Arc::clone(&order);
    port.on_rising(move |_| second.lock().unwrap().push("b")).unwrap();

    chip.set_input_level(3, true);
    sleep(SETTLE);

    assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);

    ctx.cleanup().unwrap();
}

#[test]
fn cleared_listeners_never_fire_again() {
    let (ctx, chip, iface) = setup(20);
    let port = iface.get_port(5).unwrap();
    port.set_as_input().unwrap();

    let rising = channel_listener(&port, true);
    let falling = channel_listener(&port, false);
    port.clear_value_change_listeners();

    chip.set_input_level(5, true);
    sleep(SETTLE);
    chip.set_input_level(5, false);
    sleep(SETTLE);

    assert!(rising.try_recv().is_err());
    assert!(falling.try_recv().is_err());

    ctx.cleanup().unwrap();
}

#[test]
fn ports_are_watched_independently() {
    let (ctx, chip, iface) = setup(20);
    let gpa = iface.get_port(5).unwrap();
    let gpb = iface.get_port(13).unwrap();
    gpa.set_as_input().unwrap();
    gpb.set_as_input().unwrap();

    let gpa_rising = channel_listener(&gpa, true);
    let gpb_rising = channel_listener(&gpb, true);

    chip.set_input_level(13, true);
    sleep(SETTLE);

    assert!(gpa_rising.try_recv().is_err());
    assert_eq!(
        gpb_rising.try_recv().unwrap(),
        PortEvent { number: 13, value: true }
    );

    ctx.cleanup().unwrap();
}

#[test]
fn read_failures_skip_the_port_without_killing_the_watcher() {
    let (ctx, chip, iface) = setup(20);
    let port = iface.get_port(5).unwrap();
    port.set_as_input().unwrap();
    let rising = channel_listener(&port, true);

    chip.fail_reads(true);
    chip.set_input_level(5, true);
    sleep(SETTLE);
    assert!(rising.try_recv().is_err(), "no commit while reads fail");

    chip.fail_reads(false);
    sleep(SETTLE);
    assert_eq!(
        rising.try_recv().unwrap(),
        PortEvent { number: 5, value: true }
    );

    ctx.cleanup().unwrap();
}

#[test]
fn switching_to_output_drops_the_ports_listeners() {
    let (ctx, chip, iface) = setup(20);
    let port = iface.get_port(7).unwrap();
    port.set_as_input().unwrap();
    let rising = channel_listener(&port, true);

    port.set_as_output().unwrap();
    chip.set_input_level(7, true);
    sleep(SETTLE);

    assert!(rising.try_recv().is_err());

    ctx.cleanup().unwrap();
}

#[test]
fn callback_clearing_its_own_listeners_does_not_wedge_the_watcher() {
    let (ctx, chip, iface) = setup(20);
    let port = iface.get_port(5).unwrap();
    port.set_as_input().unwrap();

    // The callback runs on the watcher thread and drops the last listener,
    // which stops that same watcher.
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let self_port = port.clone();
    port.on_rising(move |event| {
        self_port.clear_value_change_listeners();
        let _ = tx.lock().unwrap().send(event);
    })
    .unwrap();

    chip.set_input_level(5, true);
    let event = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("callback never ran");
    assert_eq!(event, PortEvent { number: 5, value: true });

    // Listeners are gone; a later falling edge stays silent.
    chip.set_input_level(5, false);
    sleep(SETTLE);
    assert!(rx.try_recv().is_err());

    ctx.cleanup().unwrap();
}

#[test]
fn cleanup_stops_the_watcher_and_is_idempotent() {
    let (ctx, chip, iface) = setup(20);
    let port = iface.get_port(5).unwrap();
    port.set_as_input().unwrap();
    let rising = channel_listener(&port, true);

    ctx.cleanup().unwrap();
    ctx.cleanup().unwrap();

    chip.set_input_level(5, true);
    sleep(SETTLE);
    assert!(rising.try_recv().is_err(), "no callbacks after cleanup");
}

#[test]
fn debounce_setting_is_read_fresh_each_iteration() {
    let (ctx, chip, iface) = setup(10_000);
    let port = iface.get_port(5).unwrap();
    port.set_as_input().unwrap();
    let rising = channel_listener(&port, true);

    chip.set_input_level(5, true);
    sleep(Duration::from_millis(100));
    assert!(rising.try_recv().is_err(), "10s debounce still pending");

    // Shrinking the interval takes effect on the next poll iteration; the
    // pending change has long outlived the new interval.
    ctx.settings().set_debounce(Duration::from_millis(20));
    sleep(SETTLE);
    assert_eq!(
        rising.try_recv().unwrap(),
        PortEvent { number: 5, value: true }
    );

    ctx.cleanup().unwrap();
}
