//! Forwarding of `tracing` events to a line-oriented sink.
//!
//! The pushdown core logs through `tracing`. Inside a backend the sink is
//! the server log (see `pg::install_log_forwarding`); tests capture lines
//! in memory.

use std::fmt::{self, Write as _};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// A [`Layer`] that renders each event as `message key=value ...` and hands
/// it to `sink` together with the event level.
pub struct ForwardLayer<F> {
    sink: F,
}

impl<F> ForwardLayer<F>
where
    F: Fn(Level, &str) + Send + Sync + 'static,
{
    pub fn new(sink: F) -> Self {
        ForwardLayer { sink }
    }
}

impl<S, F> Layer<S> for ForwardLayer<F>
where
    S: Subscriber,
    F: Fn(Level, &str) + Send + Sync + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut line = EventLine::default();
        event.record(&mut line);
        (self.sink)(*event.metadata().level(), &line.finish());
    }
}

#[derive(Default)]
struct EventLine {
    message: String,
    fields: String,
}

impl EventLine {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for EventLine {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}
