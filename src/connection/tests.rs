use async_trait::async_trait;
use proptest::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::*;
use crate::device::bluetoothctl::normalize_address;
use crate::device::loopback::{LoopbackCall, LoopbackControl, LoopbackFactory};
use crate::device::payload::FilePayloadLoader;
use crate::runtime::WorkKind;
use crate::device::{
    AssumeElevated, Collaborators, DeviceDescriptor, DeviceError, DeviceRegistry, PairedDevice,
    PairingRemover, PrivilegeCheck, UnpairOutcome,
};
use crate::session::{ButtonId, ConnectionState};

const CONSOLE: &str = "AA:BB:CC:DD:EE:FF";
const OTHER_CONSOLE: &str = "11:22:33:44:55:66";
const FRESH_PEER: &str = "7C:BB:8A:00:00:01";

struct StaticRegistry(Vec<DeviceDescriptor>);

#[async_trait]
impl DeviceRegistry for StaticRegistry {
    async fn list_paired_devices(&self) -> Result<Vec<DeviceDescriptor>, DeviceError> {
        Ok(self.0.clone())
    }

    fn address_of(&self, descriptor: &DeviceDescriptor) -> Result<String, DeviceError> {
        normalize_address(&descriptor.id)
    }
}

struct StaticRemover(UnpairOutcome);

#[async_trait]
impl PairingRemover for StaticRemover {
    async fn remove_pairing(&self, _address: &str, _timeout: Duration) -> UnpairOutcome {
        self.0.clone()
    }
}

struct Unprivileged;

impl PrivilegeCheck for Unprivileged {
    fn is_elevated(&self) -> bool {
        false
    }
}

fn build(
    bridge: Bridge,
    privilege: Arc<dyn PrivilegeCheck>,
    settings: CoordinatorSettings,
) -> (ConnectionCoordinator, LoopbackControl) {
    let (factory, control) = LoopbackFactory::new();
    let collaborators = Collaborators {
        factory: Arc::new(factory),
        registry: Arc::new(StaticRegistry(vec![
            DeviceDescriptor {
                id: "98:b6:e9:12:34:56".to_string(),
                name: "Nintendo Switch".to_string(),
            },
            DeviceDescriptor {
                id: "/org/bluez/hci0/dev_broken".to_string(),
                name: "Nintendo Switch".to_string(),
            },
        ])),
        remover: Arc::new(StaticRemover(UnpairOutcome::Removed)),
        loader: Arc::new(FilePayloadLoader),
        privilege,
    };
    (
        ConnectionCoordinator::new(bridge, collaborators, settings),
        control,
    )
}

fn coordinator_with(settings: CoordinatorSettings) -> (ConnectionCoordinator, LoopbackControl) {
    let bridge = Bridge::start(512).unwrap();
    build(bridge, Arc::new(AssumeElevated), settings)
}

fn coordinator() -> (ConnectionCoordinator, LoopbackControl) {
    coordinator_with(CoordinatorSettings::default())
}

/// Polls until `done` holds or five seconds pass.
fn settle(
    coordinator: &mut ConnectionCoordinator,
    done: impl Fn(&ConnectionCoordinator) -> bool,
) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        coordinator.poll();
        if done(coordinator) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Polls until an event matching `wanted` shows up, dropping the others.
fn wait_event(
    coordinator: &mut ConnectionCoordinator,
    wanted: impl Fn(&CoordinatorEvent) -> bool,
) -> Option<CoordinatorEvent> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        coordinator.poll();
        if let Some(event) = coordinator.take_events().into_iter().find(|e| wanted(e)) {
            return Some(event);
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    None
}

fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

fn connected_to(address: &str) -> (ConnectionCoordinator, LoopbackControl) {
    let (mut coordinator, control) = coordinator();
    coordinator.connect(ConnectRequest::to(address)).unwrap();
    assert!(settle(&mut coordinator, |c| c.session().is_connected()));
    (coordinator, control)
}

fn temp_file(name: &str, data: &[u8]) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("procontrol-coordinator-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

#[test]
fn reconnects_to_the_console_that_was_lost() {
    let (mut coordinator, control) = connected_to(CONSOLE);
    assert_eq!(coordinator.session().address(), Some(CONSOLE));
    assert_eq!(coordinator.session().last_known_address(), Some(CONSOLE));
    assert!(coordinator.session().connected_since().is_some());
    assert!(coordinator.is_monitoring());
    assert_eq!(coordinator.press(ButtonId::A), DispatchResult::Sent);

    control.drop_link();
    assert_eq!(
        coordinator.check_health(),
        Some(LivenessFailure::TransportClosing)
    );

    let session = coordinator.session();
    assert_eq!(session.connection_state(), ConnectionState::Lost);
    assert_eq!(session.last_known_address(), Some(CONSOLE));
    assert_eq!(session.address(), None);
    assert!(coordinator.buttons().all_released());
    assert!(!coordinator.has_connection());
    assert!(!coordinator.is_monitoring());

    // Loss is reported exactly once
    assert_eq!(coordinator.check_health(), None);
    assert!(!coordinator.handle_connection_lost(LivenessFailure::SocketMissing));
    let losses: Vec<_> = coordinator
        .take_events()
        .into_iter()
        .filter(|e| matches!(e, CoordinatorEvent::ConnectionLost { .. }))
        .collect();
    assert_eq!(
        losses,
        vec![CoordinatorEvent::ConnectionLost {
            last_known_address: Some(CONSOLE.to_string()),
            reason: LivenessFailure::TransportClosing,
        }]
    );

    coordinator.reconnect().unwrap();
    assert_eq!(
        coordinator.session().connection_state(),
        ConnectionState::Connecting
    );
    assert!(settle(&mut coordinator, |c| c.session().is_connected()));
    assert_eq!(
        control.create_requests(),
        vec![Some(CONSOLE.to_string()), Some(CONSOLE.to_string())]
    );
}

#[test]
fn fresh_pairing_ignores_every_remembered_address() {
    let (mut coordinator, control) = connected_to(CONSOLE);
    control.drop_link();
    coordinator.check_health();

    coordinator.connect(ConnectRequest::fresh()).unwrap();
    assert_eq!(coordinator.session().address(), None);
    assert!(settle(&mut coordinator, |c| c.session().is_connected()));

    assert_eq!(control.create_requests().last(), Some(&None));
    assert_eq!(
        coordinator.session().last_known_address(),
        Some(FRESH_PEER)
    );
}

#[test]
fn unknown_peer_leaves_nothing_to_remember() {
    let (mut coordinator, control) = connected_to(CONSOLE);
    coordinator.disconnect();

    control.set_fresh_peer(None);
    coordinator.connect(ConnectRequest::fresh()).unwrap();
    assert!(settle(&mut coordinator, |c| c.session().is_connected()));
    assert_eq!(coordinator.session().address(), None);
    assert_eq!(coordinator.session().last_known_address(), None);
}

#[test]
fn second_connect_while_connecting_is_rejected() {
    let (mut coordinator, control) = coordinator();
    control.set_connect_delay(Duration::from_millis(150));

    coordinator.connect(ConnectRequest::to(CONSOLE)).unwrap();
    assert_eq!(
        coordinator.connect(ConnectRequest::to(CONSOLE)),
        Err(ConnectionError::AlreadyConnecting)
    );
    assert_eq!(
        coordinator.connect(ConnectRequest::fresh()),
        Err(ConnectionError::AlreadyConnecting)
    );
    assert_eq!(
        coordinator.reconnect(),
        Err(ConnectionError::AlreadyConnecting)
    );

    assert!(settle(&mut coordinator, |c| c.session().is_connected()));
    assert_eq!(
        coordinator.connect(ConnectRequest::to(OTHER_CONSOLE)),
        Err(ConnectionError::AlreadyConnecting)
    );
    assert_eq!(control.connections_created(), 1);
}

#[test]
fn press_and_release_keep_their_order() {
    let (mut coordinator, control) = connected_to(CONSOLE);
    control.clear_calls();

    for _ in 0..100 {
        assert_eq!(coordinator.press(ButtonId::A), DispatchResult::Sent);
        assert!(coordinator.buttons().is_pressed(ButtonId::A));
        assert_eq!(coordinator.release(ButtonId::A), DispatchResult::Sent);
        assert!(!coordinator.buttons().is_pressed(ButtonId::A));
    }

    assert!(wait_until(|| control.calls().len() >= 200));
    let calls = control.calls();
    assert_eq!(calls.len(), 200);
    for pair in calls.chunks(2) {
        assert_eq!(
            pair,
            &[
                LoopbackCall::Press(ButtonId::A),
                LoopbackCall::Release(ButtonId::A)
            ][..]
        );
    }
}

#[test]
fn buttons_are_rejected_while_not_connected() {
    let (mut coordinator, control) = coordinator();
    assert_eq!(coordinator.press(ButtonId::Home), DispatchResult::Rejected);
    assert_eq!(coordinator.release(ButtonId::Home), DispatchResult::Rejected);
    assert!(coordinator.buttons().all_released());

    std::thread::sleep(Duration::from_millis(20));
    assert!(control.calls().is_empty());
}

#[test]
fn disconnect_forgets_the_console() {
    let (mut coordinator, control) = connected_to(CONSOLE);
    coordinator.press(ButtonId::B);
    coordinator.take_events();

    coordinator.disconnect();

    let session = coordinator.session();
    assert_eq!(session.connection_state(), ConnectionState::Idle);
    assert_eq!(session.address(), None);
    assert_eq!(session.last_known_address(), None);
    assert!(session.connected_since().is_none());
    assert!(coordinator.buttons().all_released());
    assert!(!coordinator.has_connection());
    assert_eq!(coordinator.take_events(), vec![CoordinatorEvent::Disconnected]);
    assert!(wait_until(|| control.calls().contains(&LoopbackCall::Close)));

    assert_eq!(coordinator.reconnect(), Err(ConnectionError::AddressRequired));

    // Second disconnect is a no-op
    coordinator.disconnect();
    assert!(coordinator.take_events().is_empty());
}

#[test]
fn disconnect_during_connect_discards_the_late_result() {
    let (mut coordinator, control) = coordinator();
    control.set_connect_delay(Duration::from_millis(100));

    coordinator.connect(ConnectRequest::to(CONSOLE)).unwrap();
    assert!(wait_until(|| !control.create_requests().is_empty()));
    coordinator.disconnect();
    assert_eq!(
        coordinator.session().connection_state(),
        ConnectionState::Idle
    );

    assert!(settle(&mut coordinator, |_| control
        .calls()
        .contains(&LoopbackCall::Close)));
    assert_eq!(
        coordinator.session().connection_state(),
        ConnectionState::Idle
    );
    assert!(!coordinator.has_connection());
    assert!(!coordinator.is_monitoring());
    assert!(!coordinator
        .take_events()
        .iter()
        .any(|e| matches!(e, CoordinatorEvent::Connected { .. })));
}

#[test]
fn connect_without_root_is_refused() {
    let bridge = Bridge::start(8).unwrap();
    let (mut coordinator, control) = build(
        bridge,
        Arc::new(Unprivileged),
        CoordinatorSettings::default(),
    );

    assert_eq!(
        coordinator.connect(ConnectRequest::to(CONSOLE)),
        Err(ConnectionError::PermissionDenied)
    );
    assert_eq!(coordinator.reconnect(), Err(ConnectionError::AddressRequired));
    assert_eq!(
        coordinator.session().connection_state(),
        ConnectionState::Idle
    );

    std::thread::sleep(Duration::from_millis(20));
    assert!(control.create_requests().is_empty());
}

#[test]
fn connect_without_runtime_fails_synchronously() {
    let (mut coordinator, control) = build(
        Bridge::unavailable(),
        Arc::new(AssumeElevated),
        CoordinatorSettings::default(),
    );

    assert_eq!(
        coordinator.connect(ConnectRequest::to(CONSOLE)),
        Err(ConnectionError::RuntimeUnavailable)
    );
    assert_eq!(
        coordinator.session().connection_state(),
        ConnectionState::Idle
    );
    assert_eq!(coordinator.session().address(), None);
    assert_eq!(
        coordinator.refresh_paired_devices(),
        Err(ConnectionError::RuntimeUnavailable)
    );
    assert!(control.create_requests().is_empty());
}

#[test]
fn construction_failure_returns_to_idle_and_keeps_the_address() {
    let (mut coordinator, control) = coordinator();
    control.fail_next_connect("adapter busy");

    coordinator.connect(ConnectRequest::to(CONSOLE)).unwrap();
    let failed = wait_event(&mut coordinator, |e| {
        matches!(e, CoordinatorEvent::ConnectFailed { .. })
    });
    match failed {
        Some(CoordinatorEvent::ConnectFailed { message }) => {
            assert!(message.contains("adapter busy"), "{}", message)
        }
        other => panic!("expected a connect failure, got {:?}", other),
    }

    let session = coordinator.session();
    assert_eq!(session.connection_state(), ConnectionState::Idle);
    assert_eq!(session.address(), Some(CONSOLE));
    assert_eq!(session.last_known_address(), None);
    assert!(!coordinator.has_connection());

    // Retrying without an address reuses the chosen one
    coordinator.connect(ConnectRequest::default()).unwrap();
    assert!(settle(&mut coordinator, |c| c.session().is_connected()));
    assert_eq!(
        control.create_requests(),
        vec![Some(CONSOLE.to_string()), Some(CONSOLE.to_string())]
    );
}

#[test]
fn explicit_address_wins_over_the_chosen_one() {
    let (mut coordinator, control) = coordinator();
    control.fail_next_connect("timeout");
    coordinator.connect(ConnectRequest::to(CONSOLE)).unwrap();
    assert!(settle(&mut coordinator, |c| c.session().connection_state()
        == ConnectionState::Idle));

    coordinator
        .connect(ConnectRequest::to(format!("  {}  ", OTHER_CONSOLE)))
        .unwrap();
    assert!(settle(&mut coordinator, |c| c.session().is_connected()));
    assert_eq!(
        control.create_requests().last(),
        Some(&Some(OTHER_CONSOLE.to_string()))
    );
}

#[test]
fn no_address_and_no_fresh_start_requires_a_selection() {
    let (mut coordinator, control) = coordinator();
    assert_eq!(
        coordinator.connect(ConnectRequest::default()),
        Err(ConnectionError::AddressRequired)
    );
    assert_eq!(
        coordinator.connect(ConnectRequest::to("   ")),
        Err(ConnectionError::AddressRequired)
    );
    assert_eq!(coordinator.reconnect(), Err(ConnectionError::AddressRequired));
    assert!(control.create_requests().is_empty());
}

#[test]
fn every_liveness_indicator_triggers_a_loss() {
    let (mut coordinator, control) = connected_to(CONSOLE);
    control.detach_protocol();
    assert_eq!(
        coordinator.check_health(),
        Some(LivenessFailure::ProtocolDetached)
    );

    coordinator.reconnect().unwrap();
    assert!(settle(&mut coordinator, |c| c.session().is_connected()));
    assert_eq!(coordinator.check_health(), None);

    control.remove_socket();
    assert_eq!(
        coordinator.check_health(),
        Some(LivenessFailure::SocketMissing)
    );
    assert_eq!(
        coordinator.session().connection_state(),
        ConnectionState::Lost
    );
}

#[test]
fn health_is_only_probed_once_the_interval_elapsed() {
    let (mut coordinator, control) = connected_to(CONSOLE);
    control.drop_link();

    assert_eq!(coordinator.tick(Instant::now()), None);
    assert!(coordinator.session().is_connected());

    assert_eq!(
        coordinator.tick(Instant::now() + Duration::from_secs(2)),
        Some(LivenessFailure::TransportClosing)
    );
    assert_eq!(
        coordinator.session().connection_state(),
        ConnectionState::Lost
    );
}

#[test]
fn auto_reconnect_starts_right_after_a_loss() {
    let settings = CoordinatorSettings {
        auto_reconnect: true,
        ..CoordinatorSettings::default()
    };
    let (mut coordinator, control) = coordinator_with(settings);
    coordinator.connect(ConnectRequest::to(CONSOLE)).unwrap();
    assert!(settle(&mut coordinator, |c| c.session().is_connected()));

    control.drop_link();
    coordinator.check_health();
    assert_eq!(
        coordinator.session().connection_state(),
        ConnectionState::Connecting
    );
    assert!(settle(&mut coordinator, |c| c.session().is_connected()));
    assert_eq!(control.connections_created(), 2);
}

#[test]
fn payload_follows_load_and_eject() {
    let path = temp_file("mario.bin", &[0x04, 0x01, 0x02]);
    let (mut coordinator, control) = connected_to(CONSOLE);

    coordinator.load_payload(path.clone()).unwrap();
    let loaded = wait_event(&mut coordinator, |e| {
        matches!(e, CoordinatorEvent::PayloadLoaded { .. })
    });
    assert_eq!(
        loaded,
        Some(CoordinatorEvent::PayloadLoaded {
            name: "mario.bin".to_string()
        })
    );
    assert_eq!(
        coordinator.session().auxiliary_payload_name(),
        Some("mario.bin")
    );
    assert!(control
        .calls()
        .contains(&LoopbackCall::SetPayload(Some("mario.bin".to_string()))));

    coordinator.eject_payload().unwrap();
    assert_eq!(coordinator.session().auxiliary_payload_name(), None);
    assert!(wait_until(|| control
        .calls()
        .contains(&LoopbackCall::SetPayload(None))));

    // Loss clears a loaded payload too
    coordinator.load_payload(path).unwrap();
    assert!(settle(&mut coordinator, |c| c
        .session()
        .auxiliary_payload_name()
        .is_some()));
    control.drop_link();
    coordinator.check_health();
    assert_eq!(coordinator.session().auxiliary_payload_name(), None);
}

#[test]
fn payload_errors_are_reported() {
    let (mut coordinator, _control) = coordinator();
    let empty = temp_file("empty.bin", &[]);
    assert_eq!(
        coordinator.load_payload(empty.clone()),
        Err(ConnectionError::NotConnected)
    );
    assert_eq!(
        coordinator.eject_payload(),
        Err(ConnectionError::NotConnected)
    );

    coordinator.connect(ConnectRequest::to(CONSOLE)).unwrap();
    assert!(settle(&mut coordinator, |c| c.session().is_connected()));
    coordinator.load_payload(empty).unwrap();
    let failed = wait_event(&mut coordinator, |e| {
        matches!(e, CoordinatorEvent::PayloadFailed { .. })
    });
    assert!(failed.is_some());
    assert_eq!(coordinator.session().auxiliary_payload_name(), None);
}

#[test]
fn device_scan_skips_unresolvable_entries() {
    let (mut coordinator, _control) = coordinator();
    coordinator.refresh_paired_devices().unwrap();

    let devices = wait_event(&mut coordinator, |e| {
        matches!(e, CoordinatorEvent::PairedDevices(_))
    });
    assert_eq!(
        devices,
        Some(CoordinatorEvent::PairedDevices(vec![PairedDevice {
            address: "98:B6:E9:12:34:56".to_string(),
            name: "Nintendo Switch".to_string(),
        }]))
    );
}

#[test]
fn unpair_reports_the_outcome() {
    let (mut coordinator, _control) = coordinator();
    coordinator.unpair(CONSOLE).unwrap();

    let finished = wait_event(&mut coordinator, |e| {
        matches!(e, CoordinatorEvent::UnpairFinished { .. })
    });
    assert_eq!(
        finished,
        Some(CoordinatorEvent::UnpairFinished {
            address: CONSOLE.to_string(),
            outcome: UnpairOutcome::Removed,
        })
    );
}

#[test]
fn shutdown_closes_the_link_and_stops_the_runtime() {
    let (mut coordinator, control) = connected_to(CONSOLE);
    assert!(coordinator.shutdown(Duration::from_secs(2)));

    assert_eq!(
        coordinator.session().connection_state(),
        ConnectionState::Idle
    );
    assert!(control.calls().contains(&LoopbackCall::Close));
    assert!(!coordinator.bridge().is_running());
    assert_eq!(
        coordinator.connect(ConnectRequest::to(CONSOLE)),
        Err(ConnectionError::RuntimeUnavailable)
    );
}

#[test]
fn shutdown_drops_input_still_waiting_in_the_queue() {
    let (mut coordinator, control) = connected_to(CONSOLE);
    control.clear_calls();

    // Keep the worker busy so the press below is still queued
    coordinator
        .bridge()
        .submit(WorkKind::Close, async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(WorkOutput::Closed)
        })
        .unwrap();
    assert_eq!(coordinator.press(ButtonId::A), DispatchResult::Sent);

    assert!(coordinator.shutdown(Duration::from_secs(2)));
    assert_eq!(control.calls(), vec![LoopbackCall::Close]);
}

#[test]
fn failed_submit_keeps_the_button_pressed() {
    let bridge = Bridge::start(1).unwrap();
    let (mut coordinator, _control) =
        build(bridge, Arc::new(AssumeElevated), CoordinatorSettings::default());
    coordinator.connect(ConnectRequest::to(CONSOLE)).unwrap();
    assert!(settle(&mut coordinator, |c| c.session().is_connected()));

    let (started_tx, started_rx) = std::sync::mpsc::channel::<()>();
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    coordinator
        .bridge()
        .submit(WorkKind::Close, async move {
            let _ = started_tx.send(());
            let _ = release_rx.await;
            Ok(WorkOutput::Closed)
        })
        .unwrap();
    started_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    coordinator
        .bridge()
        .submit(WorkKind::Close, async { Ok(WorkOutput::Closed) })
        .unwrap();

    assert_eq!(coordinator.press(ButtonId::X), DispatchResult::SubmitFailed);
    assert!(coordinator.buttons().is_pressed(ButtonId::X));
    assert!(coordinator.session().is_connected());

    release_tx.send(()).unwrap();
    assert!(coordinator.shutdown(Duration::from_secs(2)));
}

#[derive(Debug, Clone)]
enum Op {
    ConnectTo(usize),
    ConnectFresh,
    ConnectPreferred,
    Reconnect,
    Disconnect,
    Lose,
    Press(usize),
}

const ADDRESSES: [&str; 3] = [CONSOLE, OTHER_CONSOLE, "98:B6:E9:12:34:56"];

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..ADDRESSES.len()).prop_map(Op::ConnectTo),
        Just(Op::ConnectFresh),
        Just(Op::ConnectPreferred),
        Just(Op::Reconnect),
        Just(Op::Disconnect),
        Just(Op::Lose),
        (0..ButtonId::ALL.len()).prop_map(Op::Press),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn lifecycle_invariants_hold(ops in prop::collection::vec(op(), 1..16)) {
        let (mut coordinator, control) = coordinator();

        for op in ops {
            let before = coordinator.session().connection_state();
            let last_before = coordinator.session().last_known_address().map(str::to_string);

            match &op {
                Op::ConnectTo(i) => {
                    let _ = coordinator.connect(ConnectRequest::to(ADDRESSES[*i]));
                }
                Op::ConnectFresh => {
                    let _ = coordinator.connect(ConnectRequest::fresh());
                }
                Op::ConnectPreferred => {
                    let _ = coordinator.connect(ConnectRequest::default());
                }
                Op::Reconnect => {
                    let _ = coordinator.reconnect();
                }
                Op::Disconnect => coordinator.disconnect(),
                Op::Lose => {
                    control.drop_link();
                    let _ = coordinator.check_health();
                }
                Op::Press(i) => {
                    let _ = coordinator.press(ButtonId::ALL[*i]);
                }
            }
            let settled = settle(&mut coordinator, |c| {
                c.session().connection_state() != ConnectionState::Connecting
            });
            prop_assert!(settled);

            let after = coordinator.session().connection_state();
            prop_assert_eq!(coordinator.has_connection(), after == ConnectionState::Connected);
            prop_assert_eq!(coordinator.is_monitoring(), after == ConnectionState::Connected);
            if after != ConnectionState::Connected {
                prop_assert!(coordinator.buttons().all_released());
                prop_assert_eq!(coordinator.session().auxiliary_payload_name(), None);
            }
            if after == ConnectionState::Lost {
                prop_assert_eq!(coordinator.session().address(), None);
                prop_assert!(matches!(before, ConnectionState::Connected | ConnectionState::Lost));
            }

            match op {
                Op::Disconnect if before == ConnectionState::Connected => {
                    prop_assert_eq!(after, ConnectionState::Idle);
                    prop_assert_eq!(coordinator.session().last_known_address(), None);
                }
                Op::Lose if before == ConnectionState::Connected => {
                    prop_assert_eq!(after, ConnectionState::Lost);
                    prop_assert_eq!(
                        coordinator.session().last_known_address().map(str::to_string),
                        last_before
                    );
                }
                _ => {}
            }
        }
    }
}
