//! Tracing layer that forwards log lines to permitted connections.
//!
//! Each event becomes one text message:
//!
//! ```text
//! [14:02:11] specmux_spectrum::producer: spectrum published recipients=2
//! ```
//!
//! and is queued with [`BroadcastRouter::broadcast_to_permission`]. Events
//! emitted while a line is being forwarded (the router logs too) are not
//! forwarded again. Debug and trace events from the delivery path itself
//! are never forwarded: each forwarded line is drained, and a per-drain
//! trace line would produce the next one.

use std::cell::Cell;
use std::fmt::Write as _;

use chrono::Local;
use specmux_core::LogLevel;
use specmux_core::logging::ExtraLayer;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Registry;
use tracing_subscriber::filter::{Filtered, LevelFilter};
use tracing_subscriber::layer::{Context, Layer};

use crate::websocket::broadcast::BroadcastRouter;

thread_local! {
    static FORWARDING: Cell<bool> = const { Cell::new(false) };
}

/// Targets whose chatter is caused by forwarding itself.
const DELIVERY_TARGETS: [&str; 2] = ["specmux_server::websocket", "specmux_server::engine"];

fn is_delivery_chatter(event: &Event<'_>) -> bool {
    let meta = event.metadata();
    *meta.level() > Level::INFO
        && DELIVERY_TARGETS
            .iter()
            .any(|prefix| meta.target().starts_with(prefix))
}

/// Marks the current thread as forwarding until dropped.
struct ForwardGuard;

impl ForwardGuard {
    fn enter() -> Option<Self> {
        FORWARDING.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(Self)
            }
        })
    }
}

impl Drop for ForwardGuard {
    fn drop(&mut self) {
        FORWARDING.with(|flag| flag.set(false));
    }
}

/// Forwards formatted events to connections holding a permission tag.
pub struct WebSocketLogLayer {
    router: BroadcastRouter,
    permission: String,
}

impl WebSocketLogLayer {
    /// Forward to connections of `router` that hold `permission`.
    pub fn new(router: BroadcastRouter, permission: impl Into<String>) -> Self {
        Self {
            router,
            permission: permission.into(),
        }
    }

    /// Box the layer behind a level filter for [`specmux_core::init_logging`].
    pub fn boxed_with_level(self, level: LogLevel) -> ExtraLayer {
        let filtered: Filtered<Self, LevelFilter, Registry> =
            self.with_filter(level.as_level_filter());
        Box::new(filtered)
    }
}

/// Collects the message and remaining fields of an event.
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }
}

fn format_line(event: &Event<'_>) -> String {
    let mut visitor = LineVisitor::default();
    event.record(&mut visitor);
    format!(
        "[{}] {}: {}{}",
        Local::now().format("%H:%M:%S"),
        event.metadata().target(),
        visitor.message,
        visitor.fields
    )
}

impl<S: Subscriber> Layer<S> for WebSocketLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if is_delivery_chatter(event) {
            return;
        }
        let Some(_guard) = ForwardGuard::enter() else {
            return;
        };
        if self.router.connection_count() == 0 {
            return;
        }
        let line = format_line(event);
        let _ = self.router.broadcast_to_permission(line, &self.permission);
    }
}
