use crate::model::ClosureEvent;
use tokio::sync::mpsc;
use tracing::warn;

/// Receiver of closure notifications, invoked synchronously once per closure
/// during a pass. Implementations must not block for long.
pub trait ClosureSink: Send {
    fn on_position_closed(&mut self, event: &ClosureEvent);
}

impl<F> ClosureSink for F
where
    F: FnMut(&ClosureEvent) + Send,
{
    fn on_position_closed(&mut self, event: &ClosureEvent) {
        self(event)
    }
}

impl ClosureSink for Vec<ClosureEvent> {
    fn on_position_closed(&mut self, event: &ClosureEvent) {
        self.push(event.clone());
    }
}

impl ClosureSink for mpsc::UnboundedSender<ClosureEvent> {
    fn on_position_closed(&mut self, event: &ClosureEvent) {
        if self.send(event.clone()).is_err() {
            warn!(position_id = %event.position_id, "Closure receiver dropped - notification lost");
        }
    }
}

/// Sink that drops every notification.
pub struct NullSink;

impl ClosureSink for NullSink {
    fn on_position_closed(&mut self, _event: &ClosureEvent) {}
}
