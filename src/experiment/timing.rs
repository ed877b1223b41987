//! Wall-clock timings of named operations

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// Elapsed seconds per named operation, in first-recorded order.
/// Recording a name again overwrites its value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingTable {
    entries: Vec<(String, f64)>,
}

impl TimingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: impl Into<String>, seconds: f64) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = seconds,
            None => self.entries.push((name, seconds)),
        }
    }

    /// Run `f`, recording its duration under `name` when it succeeds
    pub fn time<T, F>(&mut self, name: impl Into<String>, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let name = name.into();
        let start = Instant::now();
        let out = f()?;
        let seconds = start.elapsed().as_secs_f64();
        debug!(operation = %name, seconds, "Timed");
        self.record(name, seconds);
        Ok(out)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, s)| *s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, s)| (n.as_str(), *s))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::XaiError;

    #[test]
    fn test_record_overwrites_in_place() {
        let mut t = TimingTable::new();
        t.record("kt", 1.0);
        t.record("random", 2.0);
        t.record("kt", 3.0);
        let names: Vec<&str> = t.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["kt", "random"]);
        assert_eq!(t.get("kt"), Some(3.0));
    }

    #[test]
    fn test_time_records_success_only() {
        let mut t = TimingTable::new();
        let v = t.time("ok", || Ok(5)).unwrap();
        assert_eq!(v, 5);
        assert!(t.get("ok").unwrap() >= 0.0);

        let err: Result<()> = t.time("fail", || Err(XaiError::ComputationError("boom".into())));
        assert!(err.is_err());
        assert!(t.get("fail").is_none());
        assert_eq!(t.len(), 1);
    }
}
