use cadence_core::session::{EventSink, UiEvent};
use tokio::sync::mpsc;

/// Forwards UI events into an unbounded channel.
///
/// A closed receiver only means the UI went away; events are then dropped.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::UnboundedSender<UiEvent>) -> Self {
        Self { tx }
    }

    /// Creates a sink together with the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: UiEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            tracing::trace!("[Session] dropped {} event, no receiver", name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::session::UiEventKind;

    #[test]
    fn forwards_and_tolerates_closed_receiver() {
        let (sink, mut rx) = ChannelEventSink::channel();
        sink.emit(UiEvent::new("s", UiEventKind::Compacted));
        assert_eq!(rx.try_recv().unwrap().name(), "compacted");

        drop(rx);
        sink.emit(UiEvent::new("s", UiEventKind::Compacted));
    }
}
