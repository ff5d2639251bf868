//! Online status oracle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Reports whether the device can currently reach the network.
///
/// Any `Fn() -> bool` closure is a network status oracle.
pub trait NetworkStatus: Send + Sync {
    /// Returns true if the device is online.
    fn is_online(&self) -> bool;
}

impl<F> NetworkStatus for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_online(&self) -> bool {
        self()
    }
}

/// Oracle that always reports online. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl NetworkStatus for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// A switchable oracle, handy for tests and for platforms that push
/// connectivity changes instead of answering queries.
#[derive(Debug, Clone)]
pub struct NetworkSwitch {
    online: Arc<AtomicBool>,
}

impl NetworkSwitch {
    /// Creates a switch in the given state.
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    /// Sets the reported state. Clones share it.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl NetworkStatus for NetworkSwitch {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_oracles() {
        let offline = || false;
        assert!(!offline.is_online());
        assert!(AlwaysOnline.is_online());
    }

    #[test]
    fn switch_clones_share_state() {
        let switch = NetworkSwitch::new(true);
        let handle = switch.clone();
        handle.set_online(false);
        assert!(!switch.is_online());
    }
}
