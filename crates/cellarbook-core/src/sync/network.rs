//! Network state as seen by the sync workers

use std::sync::atomic::{AtomicU8, Ordering};

/// Kind of connectivity currently available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkKind {
    /// Wi-Fi, ethernet or another flat-rate link
    Unmetered,
    /// Cellular or another metered link
    Metered,
    Offline,
}

impl NetworkKind {
    const fn to_u8(self) -> u8 {
        match self {
            Self::Unmetered => 0,
            Self::Metered => 1,
            Self::Offline => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unmetered,
            1 => Self::Metered,
            _ => Self::Offline,
        }
    }
}

/// Source of the current network kind.
pub trait NetworkMonitor: Send + Sync {
    fn current(&self) -> NetworkKind;
}

/// Fixed (but settable) network state for desktops, the CLI and tests.
#[derive(Debug)]
pub struct StaticNetwork {
    kind: AtomicU8,
}

impl StaticNetwork {
    #[must_use]
    pub const fn new(kind: NetworkKind) -> Self {
        Self {
            kind: AtomicU8::new(kind.to_u8()),
        }
    }

    pub fn set(&self, kind: NetworkKind) {
        self.kind.store(kind.to_u8(), Ordering::Relaxed);
    }
}

impl Default for StaticNetwork {
    fn default() -> Self {
        Self::new(NetworkKind::Unmetered)
    }
}

impl NetworkMonitor for StaticNetwork {
    fn current(&self) -> NetworkKind {
        NetworkKind::from_u8(self.kind.load(Ordering::Relaxed))
    }
}
