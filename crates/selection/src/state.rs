use foundation::EntityId;

/// The single source of truth for "what is selected".
///
/// `previous` always holds the value `current` had right before the latest
/// change. Only the controller mutates it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    current: Option<EntityId>,
    previous: Option<EntityId>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&EntityId> {
        self.current.as_ref()
    }

    pub fn previous(&self) -> Option<&EntityId> {
        self.previous.as_ref()
    }

    pub fn is_selected(&self, id: &EntityId) -> bool {
        self.current.as_ref() == Some(id)
    }

    /// Installs `next` and returns the value it overwrote.
    pub(crate) fn replace(&mut self, next: Option<EntityId>) -> Option<EntityId> {
        let old = std::mem::replace(&mut self.current, next);
        self.previous = old.clone();
        old
    }
}

#[cfg(test)]
mod tests {
    use super::SelectionState;
    use foundation::EntityId;

    fn id(s: &str) -> Option<EntityId> {
        EntityId::parse(s)
    }

    #[test]
    fn starts_empty() {
        let s = SelectionState::new();
        assert!(s.current().is_none());
        assert!(s.previous().is_none());
    }

    #[test]
    fn previous_tracks_overwritten_value() {
        let mut s = SelectionState::new();
        let seq = [id("aaa111"), id("bbb222"), None, id("bbb222"), id("bbb222")];
        let mut before = None;
        for next in seq {
            let old = s.replace(next.clone());
            assert_eq!(old, before);
            assert_eq!(s.previous().cloned(), before);
            assert_eq!(s.current().cloned(), next);
            before = next;
        }
    }

    #[test]
    fn is_selected_matches_current_only() {
        let mut s = SelectionState::new();
        s.replace(id("aaa111"));
        s.replace(id("bbb222"));
        assert!(s.is_selected(&EntityId::parse("bbb222").unwrap()));
        assert!(!s.is_selected(&EntityId::parse("aaa111").unwrap()));
    }
}
