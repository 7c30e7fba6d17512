use crate::identity::ClientId;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Ban registry: one ban-start timestamp per client.
///
/// Presence of an entry does not mean the ban is active; staleness is
/// resolved lazily against the caller's timestamp, and an expired entry
/// is evicted at that point. No background sweep is required for
/// correctness, only for memory (see [`BanRegistry::evict_expired`]).
pub struct BanRegistry {
    bans: DashMap<ClientId, Instant>,
    duration: Duration,
}

impl BanRegistry {
    pub fn new(duration: Duration) -> Self {
        Self {
            bans: DashMap::new(),
            duration,
        }
    }

    /// Ban the client starting at `now`. Idempotent: re-banning an
    /// already-banned client just resets its expiry clock forward.
    pub fn ban(&self, id: &ClientId, now: Instant) {
        self.bans.insert(id.clone(), now);
    }

    /// Is the client banned at `now`? An expired entry is removed here,
    /// at read time.
    pub fn is_banned(&self, id: &ClientId, now: Instant) -> bool {
        let expired = match self.bans.get(id) {
            None => return false,
            Some(start) => now.saturating_duration_since(*start) >= self.duration,
        };
        if expired {
            self.bans
                .remove_if(id, |_, &start| {
                    now.saturating_duration_since(start) >= self.duration
                });
            return false;
        }
        true
    }

    /// Lift a ban regardless of expiry.
    #[cfg(test)]
    pub fn clear(&self, id: &ClientId) {
        self.bans.remove(id);
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn evict_expired(&self, now: Instant) -> usize {
        let before = self.bans.len();
        self.bans
            .retain(|_, &mut start| now.saturating_duration_since(start) < self.duration);
        before - self.bans.len()
    }

    /// Number of bans active at `now`.
    pub fn active_bans(&self, now: Instant) -> usize {
        self.bans
            .iter()
            .filter(|entry| now.saturating_duration_since(*entry.value()) < self.duration)
            .count()
    }
}
