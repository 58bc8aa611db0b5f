//! USB permission tracking
//!
//! Each device has at most one permission wait in flight. A wait is keyed by
//! the device identifier and tagged with a ticket, so a late timeout for an
//! earlier wait can never resolve a newer one.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Outcome of a permission wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PermissionStatus {
    /// Permission granted
    Granted,
    /// User or system refused
    Denied,
    /// No answer within the configured bound
    TimedOut,
    /// Still waiting for the native callback
    Pending,
}

impl std::fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionStatus::Granted => write!(f, "granted"),
            PermissionStatus::Denied => write!(f, "denied"),
            PermissionStatus::TimedOut => write!(f, "timed_out"),
            PermissionStatus::Pending => write!(f, "pending"),
        }
    }
}

/// Identifies one permission wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PermissionTicket(Uuid);

impl PermissionTicket {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for PermissionTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct PendingPermission {
    pub ticket: PermissionTicket,
    pub requested_at: Instant,
    pub deadline: Option<Instant>,
}

/// Pending permission waits keyed by device identifier
#[derive(Debug)]
pub struct PermissionTracker {
    timeout: Option<Duration>,
    pending: HashMap<String, PendingPermission>,
}

impl PermissionTracker {
    /// A zero timeout waits forever
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout: (!timeout.is_zero()).then_some(timeout),
            pending: HashMap::new(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Start (or restart) the wait for `device_id`
    pub fn begin(&mut self, device_id: &str, now: Instant) -> PermissionTicket {
        let ticket = PermissionTicket::new();
        let previous = self.pending.insert(
            device_id.to_string(),
            PendingPermission {
                ticket,
                requested_at: now,
                deadline: self.timeout.map(|t| now + t),
            },
        );
        if previous.is_some() {
            log::debug!("Restarted permission wait for {}", device_id);
        }
        ticket
    }

    /// Resolve the wait for `device_id`; only the first caller gets it back
    pub fn resolve(&mut self, device_id: &str) -> Option<PendingPermission> {
        self.pending.remove(device_id)
    }

    /// Resolve only if `ticket` is still the current wait
    pub fn resolve_ticket(
        &mut self,
        device_id: &str,
        ticket: PermissionTicket,
    ) -> Option<PendingPermission> {
        match self.pending.get(device_id) {
            Some(p) if p.ticket == ticket => self.pending.remove(device_id),
            _ => None,
        }
    }

    /// Ticket of the wait in flight for `device_id`
    pub fn ticket(&self, device_id: &str) -> Option<PermissionTicket> {
        self.pending.get(device_id).map(|p| p.ticket)
    }

    pub fn is_pending(&self, device_id: &str) -> bool {
        self.pending.contains_key(device_id)
    }

    pub fn status(&self, device_id: &str) -> Option<PermissionStatus> {
        self.is_pending(device_id).then_some(PermissionStatus::Pending)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Earliest deadline among pending waits
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().filter_map(|p| p.deadline).min()
    }

    /// Remove and return every wait whose deadline has passed
    pub fn take_expired(&mut self, now: Instant) -> Vec<(String, PermissionTicket)> {
        let expired: Vec<(String, PermissionTicket)> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline.is_some_and(|d| d <= now))
            .map(|(id, p)| (id.clone(), p.ticket))
            .collect();
        for (id, _) in &expired {
            self.pending.remove(id);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_exactly_once() {
        let mut tracker = PermissionTracker::new(Duration::from_secs(30));
        let now = Instant::now();
        tracker.begin("cam0", now);
        assert_eq!(tracker.status("cam0"), Some(PermissionStatus::Pending));
        assert!(tracker.resolve("cam0").is_some());
        assert!(tracker.resolve("cam0").is_none());
        assert!(tracker.take_expired(now + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn test_restart_replaces_ticket() {
        let mut tracker = PermissionTracker::new(Duration::from_secs(30));
        let now = Instant::now();
        let first = tracker.begin("cam0", now);
        let second = tracker.begin("cam0", now + Duration::from_secs(10));
        assert_ne!(first, second);
        assert!(tracker.resolve_ticket("cam0", first).is_none());
        assert_eq!(tracker.ticket("cam0"), Some(second));
        assert_eq!(tracker.pending_count(), 1);

        // the restarted wait has a later deadline
        assert!(tracker.take_expired(now + Duration::from_secs(31)).is_empty());
        let expired = tracker.take_expired(now + Duration::from_secs(40));
        assert_eq!(expired, vec![("cam0".to_string(), second)]);
    }

    #[test]
    fn test_independent_devices() {
        let mut tracker = PermissionTracker::new(Duration::from_secs(5));
        let now = Instant::now();
        tracker.begin("cam0", now);
        tracker.begin("cam1", now + Duration::from_secs(3));
        assert_eq!(tracker.next_deadline(), Some(now + Duration::from_secs(5)));

        let expired = tracker.take_expired(now + Duration::from_secs(6));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, "cam0");
        assert!(tracker.is_pending("cam1"));
    }

    #[test]
    fn test_zero_timeout_never_expires() {
        let mut tracker = PermissionTracker::new(Duration::ZERO);
        let now = Instant::now();
        tracker.begin("cam0", now);
        assert!(tracker.next_deadline().is_none());
        assert!(tracker.take_expired(now + Duration::from_secs(3600)).is_empty());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(PermissionStatus::TimedOut.to_string(), "timed_out");
        assert_eq!(PermissionStatus::Granted.to_string(), "granted");
    }
}
