/// An event stamped with its position in the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event<E> {
    /// 0-based, strictly increasing across the lifetime of the bus.
    pub seq: u64,
    pub kind: E,
}

/// Synchronous, ordered event log for local observers.
///
/// Emitters push; observers read or drain on their own schedule. Sequence
/// numbers keep counting across drains so an observer can tell whether it
/// missed anything.
#[derive(Debug)]
pub struct EventBus<E> {
    events: Vec<Event<E>>,
    next_seq: u64,
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn emit(&mut self, kind: E) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push(Event { seq, kind });
        seq
    }

    pub fn events(&self) -> &[Event<E>] {
        &self.events
    }

    pub fn drain(&mut self) -> Vec<Event<E>> {
        std::mem::take(&mut self.events)
    }

    /// Total number of events ever emitted.
    pub fn emitted(&self) -> u64 {
        self.next_seq
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::EventBus;

    #[test]
    fn records_events_in_order() {
        let mut bus = EventBus::new();
        bus.emit("a");
        bus.emit("b");
        let kinds: Vec<_> = bus.events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec!["a", "b"]);
        assert_eq!(bus.events()[1].seq, 1);
    }

    #[test]
    fn drain_clears_events_but_not_sequence() {
        let mut bus = EventBus::new();
        bus.emit(1u8);
        let drained = bus.drain();
        assert_eq!(drained.len(), 1);
        assert!(bus.events().is_empty());

        let seq = bus.emit(2u8);
        assert_eq!(seq, 1);
        assert_eq!(bus.emitted(), 2);
    }
}
