use crate::error::AdmissionError;
use crate::identity::ClientId;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window counter store.
///
/// One ordered timestamp sequence per client, shared between the short
/// rate-check window and the longer bookkeeping window: entries are only
/// physically dropped once they fall past the retention horizon, while
/// the rate check just counts the suffix inside its own window. A single
/// mutex over the whole map keeps prune-count-append atomic per call; a
/// poisoned lock surfaces as [`AdmissionError::StorePoisoned`] so the
/// controller can fail open.
pub struct CounterStore {
    windows: Mutex<HashMap<ClientId, VecDeque<Instant>>>,
    rate_window: Duration,
    retention: Duration,
}

impl CounterStore {
    pub fn new(rate_window: Duration, retention: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            rate_window,
            retention,
        }
    }

    /// Record a request at `now` and return the pre-append count: how many
    /// requests this client already made inside the rate window, not
    /// counting this one. Entries past the retention horizon are dropped
    /// on the way.
    pub fn record_and_count(&self, id: &ClientId, now: Instant) -> Result<u32, AdmissionError> {
        let mut windows = self.lock()?;
        let seq = windows.entry(id.clone()).or_default();
        drop_stale(seq, now, self.retention);
        let count = seq
            .iter()
            .rev()
            .take_while(|&&ts| now.saturating_duration_since(ts) < self.rate_window)
            .count() as u32;
        seq.push_back(now);
        Ok(count)
    }

    /// Drop this client's entries past the retention horizon; remove the
    /// key entirely once the sequence is empty.
    pub fn prune(&self, id: &ClientId, now: Instant) -> Result<(), AdmissionError> {
        let mut windows = self.lock()?;
        if let Some(seq) = windows.get_mut(id) {
            drop_stale(seq, now, self.retention);
            if seq.is_empty() {
                windows.remove(id);
            }
        }
        Ok(())
    }

    /// Sweep every client, keeping only sequences with entries inside the
    /// retention horizon. Returns how many keys were removed.
    pub fn prune_idle(&self, now: Instant) -> Result<usize, AdmissionError> {
        let mut windows = self.lock()?;
        let before = windows.len();
        windows.retain(|_, seq| {
            drop_stale(seq, now, self.retention);
            !seq.is_empty()
        });
        Ok(before - windows.len())
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> Result<usize, AdmissionError> {
        Ok(self.lock()?.len())
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<ClientId, VecDeque<Instant>>>, AdmissionError>
    {
        self.windows
            .lock()
            .map_err(|e| AdmissionError::StorePoisoned(e.to_string()))
    }

    /// Poison the store's mutex by panicking while holding it, so tests
    /// can drive the internal-fault path.
    #[cfg(test)]
    pub fn poison_lock(&self) {
        std::thread::scope(|s| {
            let _ = s
                .spawn(|| {
                    let _guard = self.windows.lock().unwrap();
                    panic!("poisoning counter store lock");
                })
                .join();
        });
    }
}

// Entries arrive in time order, so stale ones sit at the front.
fn drop_stale(seq: &mut VecDeque<Instant>, now: Instant, retention: Duration) {
    while seq
        .front()
        .is_some_and(|&ts| now.saturating_duration_since(ts) >= retention)
    {
        seq.pop_front();
    }
}
