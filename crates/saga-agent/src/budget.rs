use saga_core::{BudgetMetadata, DiffFetchRecord};

/// Conservative bytes-per-token ratio used for the running token estimate.
pub const BYTES_PER_TOKEN: u64 = 4;

/// Limits applied to a single analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetLimits {
    pub max_fetches: u32,
    pub max_bytes_per_fetch: u64,
    pub max_tokens: u64,
}

impl BudgetLimits {
    pub fn from_config(agent: &saga_core::config::AgentConfig) -> Self {
        Self {
            max_fetches: agent.max_diff_fetches,
            max_bytes_per_fetch: agent.max_diff_bytes,
            max_tokens: agent.max_total_tokens,
        }
    }
}

/// Tracks diff fetches for one run and decides when to deny more.
///
/// Create one per analysis run; never share across runs.
#[derive(Debug, Clone)]
pub struct BudgetTracker {
    limits: BudgetLimits,
    fetch_count: u32,
    total_bytes: u64,
    estimated_tokens: u64,
    log: Vec<DiffFetchRecord>,
}

impl BudgetTracker {
    pub fn new(limits: BudgetLimits) -> Self {
        Self {
            limits,
            fetch_count: 0,
            total_bytes: 0,
            estimated_tokens: 0,
            log: Vec::new(),
        }
    }

    pub fn limits(&self) -> BudgetLimits {
        self.limits
    }

    pub fn fetch_count(&self) -> u32 {
        self.fetch_count
    }

    pub fn estimated_tokens(&self) -> u64 {
        self.estimated_tokens
    }

    /// `Err(reason)` once the fetch count or the token estimate has reached
    /// its limit, checked in that order.
    pub fn can_fetch_more(&self) -> Result<(), String> {
        if self.fetch_count >= self.limits.max_fetches {
            return Err(format!(
                "diff fetch limit reached ({}/{} fetches used)",
                self.fetch_count, self.limits.max_fetches
            ));
        }
        if self.estimated_tokens >= self.limits.max_tokens {
            return Err(format!(
                "token budget reached (~{} of {} estimated tokens used)",
                self.estimated_tokens, self.limits.max_tokens
            ));
        }
        Ok(())
    }

    /// Whether a diff of `size_bytes` fits the per-fetch cap.
    pub fn fits_single_fetch(&self, size_bytes: u64) -> bool {
        size_bytes <= self.limits.max_bytes_per_fetch
    }

    /// Charge a fetch. Does not re-check the limits: callers must consult
    /// [`can_fetch_more`](Self::can_fetch_more) first, or use
    /// [`try_record_fetch`](Self::try_record_fetch).
    pub fn record_fetch(&mut self, sha: &str, size_bytes: u64, reason: &str) {
        self.fetch_count += 1;
        self.total_bytes += size_bytes;
        self.estimated_tokens += size_bytes / BYTES_PER_TOKEN;
        self.log.push(DiffFetchRecord {
            sha: sha.to_string(),
            size_bytes,
            reason: reason.to_string(),
            timestamp: saga_core::now_rfc3339(),
        });
    }

    /// Check and charge in one step; refuses without charging when exhausted.
    pub fn try_record_fetch(
        &mut self,
        sha: &str,
        size_bytes: u64,
        reason: &str,
    ) -> Result<(), String> {
        self.can_fetch_more()?;
        self.record_fetch(sha, size_bytes, reason);
        Ok(())
    }

    pub fn snapshot(&self) -> BudgetMetadata {
        BudgetMetadata {
            fetch_count: self.fetch_count,
            total_bytes: self.total_bytes,
            estimated_tokens: self.estimated_tokens,
            fetch_log: self.log.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_fetches: u32, max_tokens: u64) -> BudgetLimits {
        BudgetLimits {
            max_fetches,
            max_bytes_per_fetch: 10_000,
            max_tokens,
        }
    }

    #[test]
    fn fresh_tracker_allows() {
        let t = BudgetTracker::new(limits(3, 1_000));
        assert!(t.can_fetch_more().is_ok());
        assert_eq!(t.snapshot(), BudgetMetadata::default());
    }

    #[test]
    fn exhausted_at_fetch_limit() {
        let mut t = BudgetTracker::new(limits(3, 1_000_000));
        for i in 0..3 {
            assert!(t.can_fetch_more().is_ok());
            t.record_fetch(&format!("c{i}"), 100, "check scope");
        }
        let reason = t.can_fetch_more().unwrap_err();
        assert!(reason.contains("fetch limit"), "{reason}");
    }

    #[test]
    fn exhausted_at_token_limit() {
        let mut t = BudgetTracker::new(limits(10, 500));
        t.record_fetch("c1", 1_996, "x");
        assert_eq!(t.estimated_tokens(), 499);
        assert!(t.can_fetch_more().is_ok());
        t.record_fetch("c2", 4, "x");
        let reason = t.can_fetch_more().unwrap_err();
        assert!(reason.contains("token"), "{reason}");
    }

    #[test]
    fn token_estimate_is_deterministic() {
        let mut t = BudgetTracker::new(limits(10, 1_000_000));
        t.record_fetch("c1", 1000, "a");
        t.record_fetch("c2", 2000, "b");
        let snap = t.snapshot();
        assert_eq!(snap.estimated_tokens, 750);
        assert_eq!(snap.total_bytes, 3000);
        assert_eq!(snap.fetch_count, 2);
        assert_eq!(snap.fetch_log.len(), 2);
        assert_eq!(snap.fetch_log[1].sha, "c2");
        assert_eq!(snap.fetch_log[1].reason, "b");
    }

    #[test]
    fn record_fetch_does_not_recheck() {
        let mut t = BudgetTracker::new(limits(1, 1_000_000));
        t.record_fetch("c1", 10, "a");
        t.record_fetch("c2", 10, "b");
        assert_eq!(t.fetch_count(), 2);
    }

    #[test]
    fn try_record_refuses_when_exhausted() {
        let mut t = BudgetTracker::new(limits(1, 1_000_000));
        assert!(t.try_record_fetch("c1", 10, "a").is_ok());
        assert!(t.try_record_fetch("c2", 10, "b").is_err());
        assert_eq!(t.fetch_count(), 1);
        assert_eq!(t.snapshot().fetch_log.len(), 1);
    }

    #[test]
    fn per_fetch_cap() {
        let t = BudgetTracker::new(limits(1, 1));
        assert!(t.fits_single_fetch(10_000));
        assert!(!t.fits_single_fetch(10_001));
    }
}
