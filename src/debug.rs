use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Conditional tracing for one invocation. Quiet unless `--debug` is set;
/// counters are accumulated either way and emitted with the summary.
#[derive(Clone)]
pub(crate) struct DebugLogger {
    enabled: bool,
    counters: Arc<Mutex<HashMap<String, u64>>>,
}

impl DebugLogger {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            counters: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn log(&self, message: impl AsRef<str>) {
        if self.enabled {
            eprintln!("[pagediff] {}", message.as_ref());
        }
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if let Ok(mut counters) = self.counters.lock() {
            let entry = counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    pub fn emit_summary(&self, context: &str) {
        if !self.enabled {
            return;
        }
        if let Ok(mut counters) = self.counters.lock() {
            let mut entries: Vec<(String, u64)> = counters.drain().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            eprintln!("[pagediff] summary {}:", context);
            for (key, value) in entries {
                eprintln!("[pagediff]   {} = {}", key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_saturate() {
        let logger = DebugLogger::new(false);
        logger.increment("marker.lookup_miss", 2);
        logger.increment("marker.lookup_miss", 3);
        logger.increment("overflow", u64::MAX);
        logger.increment("overflow", 10);
        let counters = logger.counters.lock().expect("lock");
        assert_eq!(counters["marker.lookup_miss"], 5);
        assert_eq!(counters["overflow"], u64::MAX);
    }
}
