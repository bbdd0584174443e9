//! Connection callbacks for the spectrogram service.
//!
//! Keeps the producer's client gate in step with connections and applies
//! `cmd:value` commands sent by clients.

use std::sync::Arc;

use specmux_core::ConnectionId;
use specmux_server::{BroadcastRouter, Handler};
use tracing::{debug, error, info, warn};

use crate::command::ClientCommand;
use crate::producer::SpectrogramProducer;

/// [`Handler`] wired to one [`SpectrogramProducer`].
pub struct SpectrogramHandler {
    producer: Arc<SpectrogramProducer>,
    router: BroadcastRouter,
    log_permission: String,
}

impl SpectrogramHandler {
    /// `log_permission` is the tag granted by `logs:1`.
    pub fn new(
        producer: Arc<SpectrogramProducer>,
        router: BroadcastRouter,
        log_permission: impl Into<String>,
    ) -> Self {
        Self {
            producer,
            router,
            log_permission: log_permission.into(),
        }
    }

    /// The producer this handler drives.
    pub fn producer(&self) -> &Arc<SpectrogramProducer> {
        &self.producer
    }

    fn apply(&self, id: ConnectionId, command: ClientCommand) {
        match command {
            ClientCommand::Center(hz) => {
                self.producer.set_center(hz as f64);
                info!(conn_id = %id, center = hz, "center frequency changed");
            }
            ClientCommand::Span(hz) => {
                self.producer.set_span(hz as f64);
                info!(conn_id = %id, span = hz, "span changed");
            }
            ClientCommand::Logs(enabled) => {
                let result = if enabled {
                    self.router.grant_permission(id, &self.log_permission)
                } else {
                    self.router.revoke_permission(id, &self.log_permission)
                };
                match result {
                    Ok(_) => debug!(conn_id = %id, enabled, "log subscription updated"),
                    Err(err) => warn!(conn_id = %id, error = %err, "log subscription failed"),
                }
            }
        }
    }
}

impl Handler for SpectrogramHandler {
    fn on_connect(&mut self, id: ConnectionId) {
        let attached = self.producer.gate().attach();
        info!(conn_id = %id, attached, "client attached");
    }

    fn on_disconnect(&mut self, id: ConnectionId) {
        let attached = self.producer.gate().detach();
        info!(conn_id = %id, attached, "client detached");
    }

    fn on_message(&mut self, id: ConnectionId, text: &str) {
        info!(conn_id = %id, text, "message received");
        match text.parse::<ClientCommand>() {
            Ok(command) => self.apply(id, command),
            Err(err) => warn!(conn_id = %id, error = %err, "ignoring client message"),
        }
    }

    fn on_error(&mut self, id: ConnectionId, reason: &str) {
        let attached = self.producer.gate().detach();
        error!(conn_id = %id, reason, attached, "connection failed");
    }
}
