//! "Any client attached" gate.
//!
//! Updated on connect and disconnect instead of scanning connections for
//! every spectrum. Counted, so one client leaving does not close the gate
//! while others remain.

use parking_lot::Mutex;

/// Count of attached clients behind its own lock.
#[derive(Debug, Default)]
pub struct ClientGate {
    attached: Mutex<usize>,
}

impl ClientGate {
    /// Create a closed gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a client. Returns the new count.
    pub fn attach(&self) -> usize {
        let mut attached = self.attached.lock();
        *attached += 1;
        *attached
    }

    /// Forget a client. Returns the new count; never goes below zero.
    pub fn detach(&self) -> usize {
        let mut attached = self.attached.lock();
        *attached = attached.saturating_sub(1);
        *attached
    }

    /// Whether at least one client is attached.
    pub fn is_open(&self) -> bool {
        *self.attached.lock() > 0
    }

    /// Attached clients.
    pub fn count(&self) -> usize {
        *self.attached.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_closed() {
        let gate = ClientGate::new();
        assert!(!gate.is_open());
        assert_eq!(gate.count(), 0);
    }

    #[test]
    fn open_while_any_attached() {
        let gate = ClientGate::new();
        assert_eq!(gate.attach(), 1);
        assert_eq!(gate.attach(), 2);
        assert_eq!(gate.detach(), 1);
        assert!(gate.is_open());
        assert_eq!(gate.detach(), 0);
        assert!(!gate.is_open());
    }

    #[test]
    fn extra_detach_saturates() {
        let gate = ClientGate::new();
        assert_eq!(gate.detach(), 0);
        let _ = gate.attach();
        assert!(gate.is_open());
    }
}
