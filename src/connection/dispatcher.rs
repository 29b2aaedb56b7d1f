//! Input Dispatcher - button and payload events into the background runtime
//!
//! Every UI press/release updates [`ButtonState`] synchronously, so the pad
//! renders immediately, and then queues a fire-and-forget unit on the bridge.
//! The bridge runs units in submission order, which keeps press/release of the
//! same button in the order the UI issued them.

use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::error::ConnectionError;
use super::{Bridge, ConnectionHandle, WorkOutput};
use crate::device::PayloadLoader;
use crate::runtime::{WorkHandle, WorkKind};
use crate::session::{ButtonId, ButtonState, Session};

/// What happened to one press/release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResult {
    /// Queued for the transport
    Sent,
    /// Not connected; nothing changed
    Rejected,
    /// Button state updated but the bridge refused the unit
    SubmitFailed,
}

pub struct InputDispatcher {
    bridge: Bridge,
    buttons: ButtonState,
    loader: Arc<dyn PayloadLoader>,
}

fn require_connected<'a>(
    session: &Session,
    connection: Option<&'a ConnectionHandle>,
) -> Result<&'a ConnectionHandle, ConnectionError> {
    match connection {
        Some(connection) if session.is_connected() => Ok(connection),
        _ => Err(ConnectionError::NotConnected),
    }
}

impl InputDispatcher {
    pub fn new(bridge: Bridge, loader: Arc<dyn PayloadLoader>) -> Self {
        Self {
            bridge,
            buttons: ButtonState::new(),
            loader,
        }
    }

    pub fn buttons(&self) -> &ButtonState {
        &self.buttons
    }

    /// Releases every button. Called whenever the session leaves `Connected`.
    pub fn reset(&mut self) {
        if !self.buttons.all_released() {
            debug!("Releasing buttons {:?}", self.buttons.pressed());
        }
        self.buttons.reset();
    }

    pub fn on_press(
        &mut self,
        session: &Session,
        connection: Option<&ConnectionHandle>,
        button: ButtonId,
    ) -> DispatchResult {
        self.dispatch(session, connection, button, true)
    }

    pub fn on_release(
        &mut self,
        session: &Session,
        connection: Option<&ConnectionHandle>,
        button: ButtonId,
    ) -> DispatchResult {
        self.dispatch(session, connection, button, false)
    }

    fn dispatch(
        &mut self,
        session: &Session,
        connection: Option<&ConnectionHandle>,
        button: ButtonId,
        pressed: bool,
    ) -> DispatchResult {
        let action = if pressed { "press" } else { "release" };
        let Ok(connection) = require_connected(session, connection) else {
            debug!(
                "Ignoring {} of {}: session is {:?}",
                action,
                button,
                session.connection_state()
            );
            return DispatchResult::Rejected;
        };

        self.buttons.set(button, pressed);

        let controller = connection.controller().clone();
        let issued = Local::now();
        let submitted = self.bridge.submit(WorkKind::ButtonEvent, async move {
            let result = if pressed {
                controller.button_press(button).await
            } else {
                controller.button_release(button).await
            };
            result
                .map(|_| WorkOutput::ButtonSent { button, pressed })
                .map_err(|e| format!("{} of {} failed: {}", action, button, e))
        });

        match submitted {
            Ok(_) => {
                debug!(
                    "Button {} {} at {}",
                    button,
                    action,
                    issued.format("%H:%M:%S.%3f")
                );
                DispatchResult::Sent
            }
            Err(e) => {
                // Visual state stays as is; rolling back would race a retry
                error!("Error handling button {} {}: {}", action, button, e);
                DispatchResult::SubmitFailed
            }
        }
    }

    /// Loads an amiibo dump and attaches it to the controller, all on the
    /// background runtime. The session is updated when the unit completes.
    pub fn load_payload(
        &mut self,
        session: &Session,
        connection: Option<&ConnectionHandle>,
        path: PathBuf,
    ) -> Result<WorkHandle, ConnectionError> {
        let connection = require_connected(session, connection)?;
        let controller = connection.controller().clone();
        let loader = self.loader.clone();

        info!("Loading payload from {}", path.display());
        let handle = self.bridge.submit(WorkKind::LoadPayload, async move {
            let payload = loader
                .load_from_file(&path)
                .await
                .map_err(|e| format!("Failed to load amiibo: {}", e))?;
            let name = payload.name().to_string();
            controller
                .set_auxiliary_payload(Some(payload))
                .await
                .map_err(|e| format!("Failed to load amiibo: {}", e))?;
            Ok(WorkOutput::PayloadLoaded { name })
        })?;
        Ok(handle)
    }

    pub fn eject_payload(
        &mut self,
        session: &mut Session,
        connection: Option<&ConnectionHandle>,
    ) -> Result<WorkHandle, ConnectionError> {
        let connection = require_connected(session, connection)?;
        let controller = connection.controller().clone();

        let handle = self.bridge.submit(WorkKind::EjectPayload, async move {
            controller
                .set_auxiliary_payload(None)
                .await
                .map(|_| WorkOutput::PayloadEjected)
                .map_err(|e| format!("Failed to eject amiibo: {}", e))
        })?;

        info!("Ejecting payload {:?}", session.auxiliary_payload_name());
        session.set_auxiliary_payload_name(None);
        Ok(handle)
    }

    /// Records a payload the background runtime attached successfully.
    pub fn payload_loaded(&mut self, session: &mut Session, name: String) {
        if session.is_connected() {
            session.set_auxiliary_payload_name(Some(name));
        } else {
            debug!("Payload {} finished loading after the session ended", name);
        }
    }
}
