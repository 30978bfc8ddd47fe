use std::collections::BTreeMap;

/// Named monotonic counters.
///
/// Backed by a sorted map so snapshots come out in a stable order for logs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Counters {
    counters: BTreeMap<&'static str, u64>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn inc(&mut self, name: &'static str) {
        self.add(name, 1);
    }

    pub fn add(&mut self, name: &'static str, by: u64) {
        *self.counters.entry(name).or_insert(0) += by;
    }

    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        self.counters.iter().map(|(k, v)| (*k, *v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::Counters;

    #[test]
    fn counters_accumulate() {
        let mut c = Counters::new();
        c.inc("a");
        c.add("a", 2);
        assert_eq!(c.get("a"), 3);
        assert_eq!(c.get("missing"), 0);
    }

    #[test]
    fn snapshot_is_stably_sorted() {
        let mut c = Counters::new();
        c.inc("join_ok");
        c.inc("data");
        c.inc("stale_reply");
        let names: Vec<_> = c.snapshot().into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["data", "join_ok", "stale_reply"]);
    }
}
