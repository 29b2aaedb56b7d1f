//! Connection Coordinator - owner of the console link lifecycle
//!
//! Drives the [`Session`] state machine, holds the single [`ConnectionHandle`]
//! and turns background completions into state transitions and UI events.
//! Every method runs on the foreground; anything that could block is queued on
//! the [`Bridge`] and picked up again in [`ConnectionCoordinator::poll`].

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::dispatcher::{DispatchResult, InputDispatcher};
use super::error::ConnectionError;
use super::monitor::{HealthMonitor, Liveness, LivenessFailure};
use super::{Bridge, ConnectionHandle, WorkOutput};
use crate::config::AppConfig;
use crate::device::{Collaborators, ControllerType, PairedDevice, UnpairOutcome};
use crate::runtime::{Completion, Outcome, WorkHandle, WorkKind};
use crate::session::{ButtonId, ButtonState, ConnectionState, Session};

/// Tunables the coordinator reads from the application config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub controller_type: ControllerType,
    pub monitor_interval: Duration,
    pub unpair_timeout: Duration,
    pub auto_reconnect: bool,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for CoordinatorSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            controller_type: config.controller_type,
            monitor_interval: config.monitor_interval(),
            unpair_timeout: config.unpair_timeout(),
            auto_reconnect: config.auto_reconnect,
        }
    }
}

/// Arguments of a connect attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Explicit console address; wins over anything remembered
    pub address: Option<String>,
    /// Ignore every address and start a fresh pairing
    pub start_fresh: bool,
}

impl ConnectRequest {
    pub fn to(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            start_fresh: false,
        }
    }

    pub fn fresh() -> Self {
        Self {
            address: None,
            start_fresh: true,
        }
    }
}

/// Notifications for the UI, drained with [`ConnectionCoordinator::take_events`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    Connecting {
        address: Option<String>,
    },
    Connected {
        address: Option<String>,
    },
    ConnectFailed {
        message: String,
    },
    Disconnected,
    ConnectionLost {
        last_known_address: Option<String>,
        reason: LivenessFailure,
    },
    PayloadLoaded {
        name: String,
    },
    PayloadEjected,
    PayloadFailed {
        message: String,
    },
    PairedDevices(Vec<PairedDevice>),
    DeviceScanFailed {
        message: String,
    },
    UnpairFinished {
        address: String,
        outcome: UnpairOutcome,
    },
}

pub struct ConnectionCoordinator {
    bridge: Bridge,
    collaborators: Collaborators,
    settings: CoordinatorSettings,
    session: Session,
    dispatcher: InputDispatcher,
    monitor: HealthMonitor,
    connection: Option<ConnectionHandle>,
    pending_connect: Option<WorkHandle>,
    events: VecDeque<CoordinatorEvent>,
}

impl ConnectionCoordinator {
    pub fn new(bridge: Bridge, collaborators: Collaborators, settings: CoordinatorSettings) -> Self {
        let dispatcher = InputDispatcher::new(bridge.clone(), collaborators.loader.clone());
        let monitor = HealthMonitor::new(settings.monitor_interval);
        Self {
            bridge,
            collaborators,
            settings,
            session: Session::new(),
            dispatcher,
            monitor,
            connection: None,
            pending_connect: None,
            events: VecDeque::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn buttons(&self) -> &ButtonState {
        self.dispatcher.buttons()
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_active()
    }

    pub fn take_events(&mut self) -> Vec<CoordinatorEvent> {
        self.events.drain(..).collect()
    }

    /// Starts a connect attempt. Returns once the attempt is queued; the
    /// outcome arrives through [`poll`](Self::poll).
    pub fn connect(&mut self, request: ConnectRequest) -> Result<(), ConnectionError> {
        if !self.collaborators.privilege.is_elevated() {
            warn!("Refusing to connect without root privileges");
            return Err(ConnectionError::PermissionDenied);
        }

        match self.session.connection_state() {
            ConnectionState::Connecting | ConnectionState::Connected => {
                debug!(
                    "Connect ignored, session is {:?}",
                    self.session.connection_state()
                );
                return Err(ConnectionError::AlreadyConnecting);
            }
            ConnectionState::Idle | ConnectionState::Lost => {}
        }

        let chosen = request
            .address
            .map(|address| address.trim().to_string())
            .filter(|address| !address.is_empty())
            .or_else(|| self.session.address().map(str::to_string))
            .or_else(|| self.session.last_known_address().map(str::to_string));

        if chosen.is_none() && !request.start_fresh {
            info!("No console address known, a device has to be selected first");
            return Err(ConnectionError::AddressRequired);
        }
        let target = if request.start_fresh { None } else { chosen };

        info!(
            "Starting connection. Start fresh: {}, reconnect address: {:?}",
            request.start_fresh, target
        );

        let factory = self.collaborators.factory.clone();
        let controller_type = self.settings.controller_type;
        let previous_address = target.clone();
        let handle = self
            .bridge
            .submit(WorkKind::Connect, async move {
                let (transport, protocol) = factory
                    .create_connection(controller_type, previous_address)
                    .await
                    .map_err(|e| ConnectionError::TransportConstructionFailed(e.to_string()))
                    .map_err(|e| e.to_string())?;
                let connection = ConnectionHandle::new(transport, protocol);

                if let Err(e) = connection.controller().connect().await {
                    if let Err(close_error) = connection.transport().close().await {
                        warn!("Failed to close half-open transport: {}", close_error);
                    }
                    return Err(ConnectionError::TransportConstructionFailed(e.to_string()).to_string());
                }
                Ok(WorkOutput::Connected(connection))
            })
            .map_err(|e| {
                error!("Could not queue connect attempt: {}", e);
                ConnectionError::from(e)
            })?;

        self.pending_connect = Some(handle);
        self.session.set_address(target.clone());
        self.session.transition(ConnectionState::Connecting);
        self.events
            .push_back(CoordinatorEvent::Connecting { address: target });
        Ok(())
    }

    /// Connects to the last console that was connected successfully.
    pub fn reconnect(&mut self) -> Result<(), ConnectionError> {
        match self.session.connection_state() {
            ConnectionState::Lost | ConnectionState::Idle => {}
            ConnectionState::Connecting | ConnectionState::Connected => {
                return Err(ConnectionError::AlreadyConnecting)
            }
        }

        let Some(address) = self.session.last_known_address().map(str::to_string) else {
            info!("No previous address available for reconnect");
            return Err(ConnectionError::AddressRequired);
        };

        info!("Reconnecting to {}", address);
        self.connect(ConnectRequest::to(address))
    }

    /// User initiated teardown. Forgets every address, so there is no
    /// one-click reconnect afterwards.
    pub fn disconnect(&mut self) {
        match self.session.connection_state() {
            ConnectionState::Connected | ConnectionState::Connecting => {}
            state => {
                debug!("Disconnect ignored, session is {:?}", state);
                return;
            }
        }

        info!("Disconnecting from {:?}", self.session.address());
        if let Some(pending) = self.pending_connect.take() {
            self.bridge.cancel(&pending);
        }
        self.monitor.stop();
        if let Some(connection) = self.connection.take() {
            self.close_in_background(connection);
        }

        self.session.set_address(None);
        self.session.set_last_known_address(None);
        self.session.set_auxiliary_payload_name(None);
        self.dispatcher.reset();
        self.session.transition(ConnectionState::Idle);
        self.events.push_back(CoordinatorEvent::Disconnected);
    }

    /// Teardown after the transport died. Keeps the last known address for
    /// reconnect. Returns `false` when there was nothing to lose.
    pub fn handle_connection_lost(&mut self, reason: LivenessFailure) -> bool {
        if self.session.connection_state() != ConnectionState::Connected {
            debug!(
                "Loss ignored ({}), session is {:?}",
                reason,
                self.session.connection_state()
            );
            return false;
        }

        warn!("Connection lost detected - {}", reason);
        self.monitor.stop();
        if let Some(connection) = self.connection.take() {
            self.close_in_background(connection);
        }

        self.session.set_address(None);
        self.session.set_auxiliary_payload_name(None);
        self.dispatcher.reset();
        self.session.transition(ConnectionState::Lost);

        let last_known_address = self.session.last_known_address().map(str::to_string);
        info!(
            "Connection lost. Preserved last address {:?} for reconnect",
            last_known_address
        );
        self.events.push_back(CoordinatorEvent::ConnectionLost {
            last_known_address,
            reason,
        });

        if self.settings.auto_reconnect {
            if let Err(e) = self.reconnect() {
                warn!("Automatic reconnect failed: {}", e);
            }
        }
        true
    }

    /// Probes the active connection once. Returns the failure that triggered a
    /// loss, if any.
    pub fn check_health(&mut self) -> Option<LivenessFailure> {
        if !self.session.is_connected() {
            return None;
        }
        let connection = self.connection.as_ref()?;

        match HealthMonitor::inspect(connection) {
            Liveness::Alive => None,
            Liveness::Failed(reason) => {
                warn!("{}", ConnectionError::LivenessCheckFailed(reason));
                self.handle_connection_lost(reason);
                Some(reason)
            }
        }
    }

    /// Frame hook: runs the health probe whenever its interval has elapsed.
    pub fn tick(&mut self, now: Instant) -> Option<LivenessFailure> {
        if self.monitor.is_due(now) {
            self.check_health()
        } else {
            None
        }
    }

    pub fn press(&mut self, button: ButtonId) -> DispatchResult {
        self.dispatcher
            .on_press(&self.session, self.connection.as_ref(), button)
    }

    pub fn release(&mut self, button: ButtonId) -> DispatchResult {
        self.dispatcher
            .on_release(&self.session, self.connection.as_ref(), button)
    }

    pub fn load_payload(&mut self, path: impl Into<PathBuf>) -> Result<(), ConnectionError> {
        self.dispatcher
            .load_payload(&self.session, self.connection.as_ref(), path.into())
            .map(|_| ())
    }

    pub fn eject_payload(&mut self) -> Result<(), ConnectionError> {
        self.dispatcher
            .eject_payload(&mut self.session, self.connection.as_ref())
            .map(|_| ())
    }

    /// Queues a paired-device scan; answered by `PairedDevices` or
    /// `DeviceScanFailed`.
    pub fn refresh_paired_devices(&mut self) -> Result<(), ConnectionError> {
        let registry = self.collaborators.registry.clone();
        self.bridge.submit(WorkKind::DeviceScan, async move {
            let descriptors = registry
                .list_paired_devices()
                .await
                .map_err(|e| format!("Error getting paired devices: {}", e))?;

            let mut devices = Vec::with_capacity(descriptors.len());
            for descriptor in descriptors {
                match registry.address_of(&descriptor) {
                    Ok(address) => devices.push(PairedDevice {
                        address,
                        name: descriptor.name,
                    }),
                    Err(e) => warn!("Could not get address for {}: {}", descriptor.id, e),
                }
            }
            Ok(WorkOutput::PairedDevices(devices))
        })?;
        Ok(())
    }

    /// Queues removal of the OS pairing for `address`.
    pub fn unpair(&mut self, address: impl Into<String>) -> Result<(), ConnectionError> {
        let address = address.into();
        let remover = self.collaborators.remover.clone();
        let limit = self.settings.unpair_timeout;
        self.bridge.submit(WorkKind::Unpair, async move {
            let outcome = remover.remove_pairing(&address, limit).await;
            Ok(WorkOutput::Unpaired { address, outcome })
        })?;
        Ok(())
    }

    /// Applies every completion delivered since the last call. Frame hook.
    pub fn poll(&mut self) {
        for completion in self.bridge.try_completions() {
            self.apply_completion(completion);
        }
    }

    /// Tears everything down and stops the background runtime. Returns
    /// `false` if the runtime did not stop within `timeout`.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        info!("Shutting down connection coordinator");
        // Queued input must not reach the console after this point
        self.bridge.cancel_pending();
        self.disconnect();
        self.monitor.stop();
        if let Some(pending) = self.pending_connect.take() {
            self.bridge.cancel(&pending);
        }
        if let Some(connection) = self.connection.take() {
            self.close_in_background(connection);
        }
        self.bridge.stop(timeout)
    }

    fn close_in_background(&self, connection: ConnectionHandle) {
        let submitted = self.bridge.submit(WorkKind::Close, async move {
            connection
                .transport()
                .close()
                .await
                .map(|_| WorkOutput::Closed)
                .map_err(|e| format!("Failed to close transport: {}", e))
        });
        if let Err(e) = submitted {
            warn!("Could not queue transport close: {}", e);
        }
    }

    fn apply_completion(&mut self, completion: Completion<WorkOutput>) {
        match completion.kind {
            WorkKind::Connect => self.finish_connect(completion),
            WorkKind::Close => match completion.outcome {
                Outcome::Failed(message) => warn!("{}", message),
                _ => debug!("Transport closed ({:?})", completion.id),
            },
            WorkKind::ButtonEvent => match completion.outcome {
                Outcome::Succeeded(WorkOutput::ButtonSent { button, pressed }) => {
                    let action = if pressed { "press" } else { "release" };
                    debug!("Console received {} of {}", action, button);
                }
                Outcome::Failed(message) => {
                    error!("Error handling button event: {}", message);
                }
                _ => {}
            },
            WorkKind::LoadPayload => match completion.outcome {
                Outcome::Succeeded(WorkOutput::PayloadLoaded { name }) => {
                    info!("Loaded amiibo: {}", name);
                    self.dispatcher
                        .payload_loaded(&mut self.session, name.clone());
                    self.events
                        .push_back(CoordinatorEvent::PayloadLoaded { name });
                }
                Outcome::Failed(message) => {
                    error!("{}", message);
                    self.events
                        .push_back(CoordinatorEvent::PayloadFailed { message });
                }
                other => unexpected(completion.kind, &other),
            },
            WorkKind::EjectPayload => match completion.outcome {
                Outcome::Succeeded(WorkOutput::PayloadEjected) => {
                    info!("Amiibo ejected");
                    self.events.push_back(CoordinatorEvent::PayloadEjected);
                }
                Outcome::Failed(message) => {
                    error!("{}", message);
                    self.events
                        .push_back(CoordinatorEvent::PayloadFailed { message });
                }
                other => unexpected(completion.kind, &other),
            },
            WorkKind::DeviceScan => match completion.outcome {
                Outcome::Succeeded(WorkOutput::PairedDevices(devices)) => {
                    self.events
                        .push_back(CoordinatorEvent::PairedDevices(devices));
                }
                Outcome::Failed(message) => {
                    error!("{}", message);
                    self.events
                        .push_back(CoordinatorEvent::DeviceScanFailed { message });
                }
                other => unexpected(completion.kind, &other),
            },
            WorkKind::Unpair => match completion.outcome {
                Outcome::Succeeded(WorkOutput::Unpaired { address, outcome }) => {
                    info!("Unpair {}: {}", address, outcome);
                    self.events
                        .push_back(CoordinatorEvent::UnpairFinished { address, outcome });
                }
                other => unexpected(completion.kind, &other),
            },
        }
    }

    fn finish_connect(&mut self, completion: Completion<WorkOutput>) {
        let is_current = self
            .pending_connect
            .as_ref()
            .is_some_and(|pending| pending.id() == completion.id);
        if is_current {
            self.pending_connect = None;
        }
        let stale = completion.cancelled
            || !is_current
            || self.session.connection_state() != ConnectionState::Connecting;

        match completion.outcome {
            Outcome::Succeeded(WorkOutput::Connected(connection)) if stale => {
                warn!("Discarding stale connection result ({:?})", completion.id);
                self.close_in_background(connection);
            }
            Outcome::Succeeded(WorkOutput::Connected(connection)) => self.on_connected(connection),
            Outcome::Failed(message) if stale => {
                debug!("Ignoring stale connect failure: {}", message);
            }
            Outcome::Failed(message) => {
                error!("Connection failed: {}", message);
                self.session.transition(ConnectionState::Idle);
                self.events
                    .push_back(CoordinatorEvent::ConnectFailed { message });
            }
            Outcome::Skipped => debug!("Connect attempt {:?} was skipped", completion.id),
            other => unexpected(completion.kind, &other),
        }
    }

    fn on_connected(&mut self, connection: ConnectionHandle) {
        if let Some(previous) = self.connection.take() {
            warn!("Replacing a connection that was never torn down");
            self.close_in_background(previous);
        }

        let address = connection
            .transport()
            .peer_address()
            .or_else(|| self.session.address().map(str::to_string));
        match &address {
            Some(address) => {
                info!("Stored address for reconnect: {}", address);
                self.session.set_last_known_address(Some(address.clone()));
            }
            None => warn!("Connected, but the console address is unknown"),
        }

        self.session.set_address(address.clone());
        self.connection = Some(connection);
        self.session.transition(ConnectionState::Connected);
        self.monitor.start(Instant::now());
        debug!("Liveness check every {:?}", self.monitor.interval());
        self.events
            .push_back(CoordinatorEvent::Connected { address });
    }
}

fn unexpected(kind: WorkKind, outcome: &Outcome<WorkOutput>) {
    match outcome {
        Outcome::Skipped => debug!("{:?} skipped", kind),
        other => warn!("Unexpected result for {:?}: {:?}", kind, other),
    }
}
