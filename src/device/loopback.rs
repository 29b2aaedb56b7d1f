//! In-process controller backend
//!
//! Accepts every connection without touching Bluetooth and records each call in
//! order. A [`LoopbackControl`] handle steers it from the outside: fail the
//! next construction, slow the handshake down, or break the link in one of the
//! ways a real HID transport silently dies.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use super::{
    AuxiliaryPayload, ConnectionFactory, ControllerProtocol, ControllerState, ControllerType,
    DeviceError, Transport,
};
use crate::session::ButtonId;

const FRESH_PAIRING_PEER: &str = "7C:BB:8A:00:00:01";

/// One recorded call against the loopback backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopbackCall {
    Create {
        controller: ControllerType,
        previous_address: Option<String>,
    },
    Connect,
    Press(ButtonId),
    Release(ButtonId),
    SetPayload(Option<String>),
    Close,
}

#[derive(Debug, Default)]
struct LinkState {
    closing: AtomicBool,
    socket_missing: AtomicBool,
    detached: AtomicBool,
}

#[derive(Debug)]
struct Shared {
    calls: Vec<LoopbackCall>,
    fail_next_connect: Option<String>,
    connect_delay: Duration,
    fresh_peer: Option<String>,
    links: Vec<Arc<LinkState>>,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            fail_next_connect: None,
            connect_delay: Duration::ZERO,
            fresh_peer: Some(FRESH_PAIRING_PEER.to_string()),
            links: Vec::new(),
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Steering and inspection handle for the loopback backend
#[derive(Debug, Clone, Default)]
pub struct LoopbackControl {
    shared: Arc<Mutex<Shared>>,
}

impl LoopbackControl {
    pub fn calls(&self) -> Vec<LoopbackCall> {
        lock(&self.shared).calls.clone()
    }

    /// Number of transport/protocol pairs built so far.
    pub fn connections_created(&self) -> usize {
        lock(&self.shared).links.len()
    }

    /// Previous-address arguments the factory was invoked with, in order.
    pub fn create_requests(&self) -> Vec<Option<String>> {
        lock(&self.shared)
            .calls
            .iter()
            .filter_map(|call| match call {
                LoopbackCall::Create {
                    previous_address, ..
                } => Some(previous_address.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn fail_next_connect(&self, message: impl Into<String>) {
        lock(&self.shared).fail_next_connect = Some(message.into());
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        lock(&self.shared).connect_delay = delay;
    }

    /// Peer reported after a fresh pairing; `None` simulates an unreadable socket.
    pub fn set_fresh_peer(&self, address: Option<String>) {
        lock(&self.shared).fresh_peer = address;
    }

    /// Marks the newest transport as closing.
    pub fn drop_link(&self) {
        if let Some(link) = lock(&self.shared).links.last() {
            link.closing.store(true, Ordering::SeqCst);
        }
    }

    /// Unbinds the newest protocol from its transport.
    pub fn detach_protocol(&self) {
        if let Some(link) = lock(&self.shared).links.last() {
            link.detached.store(true, Ordering::SeqCst);
        }
    }

    /// Removes the interrupt socket from the newest transport.
    pub fn remove_socket(&self) {
        if let Some(link) = lock(&self.shared).links.last() {
            link.socket_missing.store(true, Ordering::SeqCst);
        }
    }

    pub fn clear_calls(&self) {
        lock(&self.shared).calls.clear();
    }

    fn record(&self, call: LoopbackCall) {
        debug!("Loopback call: {:?}", call);
        lock(&self.shared).calls.push(call);
    }
}

/// [`ConnectionFactory`] producing loopback links
#[derive(Debug, Clone, Default)]
pub struct LoopbackFactory {
    control: LoopbackControl,
}

impl LoopbackFactory {
    pub fn new() -> (Self, LoopbackControl) {
        let control = LoopbackControl::default();
        (
            Self {
                control: control.clone(),
            },
            control,
        )
    }
}

#[async_trait]
impl ConnectionFactory for LoopbackFactory {
    async fn create_connection(
        &self,
        controller: ControllerType,
        previous_address: Option<String>,
    ) -> Result<(Arc<dyn Transport>, Arc<dyn ControllerProtocol>), DeviceError> {
        self.control.record(LoopbackCall::Create {
            controller,
            previous_address: previous_address.clone(),
        });

        let (delay, failure, fresh_peer) = {
            let mut shared = lock(&self.control.shared);
            (
                shared.connect_delay,
                shared.fail_next_connect.take(),
                shared.fresh_peer.clone(),
            )
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = failure {
            return Err(DeviceError::Transport(message));
        }

        let link = Arc::new(LinkState::default());
        lock(&self.control.shared).links.push(link.clone());

        let peer = previous_address.or(fresh_peer);
        info!(
            "Loopback {} link ready (peer {:?})",
            controller.as_str(),
            peer
        );

        let transport: Arc<dyn Transport> = Arc::new(LoopbackTransport {
            link: link.clone(),
            peer,
            control: self.control.clone(),
        });
        let protocol: Arc<dyn ControllerProtocol> = Arc::new(LoopbackProtocol {
            link: link.clone(),
            controller: Arc::new(LoopbackController {
                link,
                control: self.control.clone(),
            }),
        });
        Ok((transport, protocol))
    }
}

#[derive(Debug)]
struct LoopbackTransport {
    link: Arc<LinkState>,
    peer: Option<String>,
    control: LoopbackControl,
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn is_closing(&self) -> bool {
        self.link.closing.load(Ordering::SeqCst)
    }

    fn has_interrupt_socket(&self) -> bool {
        !self.link.socket_missing.load(Ordering::SeqCst)
    }

    fn peer_address(&self) -> Option<String> {
        self.peer.clone()
    }

    async fn close(&self) -> Result<(), DeviceError> {
        self.control.record(LoopbackCall::Close);
        self.link.closing.store(true, Ordering::SeqCst);
        self.link.socket_missing.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
struct LoopbackProtocol {
    link: Arc<LinkState>,
    controller: Arc<LoopbackController>,
}

impl ControllerProtocol for LoopbackProtocol {
    fn is_attached(&self) -> bool {
        !self.link.detached.load(Ordering::SeqCst)
    }

    fn controller_state(&self) -> Arc<dyn ControllerState> {
        self.controller.clone()
    }
}

#[derive(Debug)]
struct LoopbackController {
    link: Arc<LinkState>,
    control: LoopbackControl,
}

impl LoopbackController {
    fn ensure_open(&self) -> Result<(), DeviceError> {
        if self.link.closing.load(Ordering::SeqCst) {
            return Err(DeviceError::Transport("link is closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ControllerState for LoopbackController {
    async fn connect(&self) -> Result<(), DeviceError> {
        self.ensure_open()?;
        self.control.record(LoopbackCall::Connect);
        Ok(())
    }

    async fn set_auxiliary_payload(
        &self,
        payload: Option<AuxiliaryPayload>,
    ) -> Result<(), DeviceError> {
        self.ensure_open()?;
        self.control.record(LoopbackCall::SetPayload(
            payload.map(|payload| payload.name().to_string()),
        ));
        Ok(())
    }

    async fn button_press(&self, button: ButtonId) -> Result<(), DeviceError> {
        self.ensure_open()?;
        self.control.record(LoopbackCall::Press(button));
        Ok(())
    }

    async fn button_release(&self, button: ButtonId) -> Result<(), DeviceError> {
        self.ensure_open()?;
        self.control.record(LoopbackCall::Release(button));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_pairing_reports_the_discovered_peer() {
        let (factory, control) = LoopbackFactory::new();
        let (transport, protocol) = factory
            .create_connection(ControllerType::ProController, None)
            .await
            .unwrap();

        assert_eq!(transport.peer_address().as_deref(), Some(FRESH_PAIRING_PEER));
        assert!(protocol.is_attached());
        assert_eq!(control.create_requests(), vec![None]);
    }

    #[tokio::test]
    async fn failure_is_consumed_by_one_attempt() {
        let (factory, control) = LoopbackFactory::new();
        control.fail_next_connect("adapter busy");

        let first = factory
            .create_connection(ControllerType::ProController, None)
            .await;
        assert!(matches!(first, Err(DeviceError::Transport(m)) if m == "adapter busy"));
        assert_eq!(control.connections_created(), 0);

        let second = factory
            .create_connection(ControllerType::ProController, None)
            .await;
        assert!(second.is_ok());
        assert_eq!(control.connections_created(), 1);
    }

    #[tokio::test]
    async fn closed_link_rejects_controller_calls() {
        let (factory, control) = LoopbackFactory::new();
        let (transport, protocol) = factory
            .create_connection(ControllerType::ProController, Some("AA:BB:CC:DD:EE:FF".into()))
            .await
            .unwrap();
        let state = protocol.controller_state();
        state.button_press(ButtonId::A).await.unwrap();

        transport.close().await.unwrap();
        assert!(transport.is_closing());
        assert!(!transport.has_interrupt_socket());
        assert!(state.button_release(ButtonId::A).await.is_err());
        assert_eq!(control.calls().last(), Some(&LoopbackCall::Close));
    }
}
