//! Destination health state model.
//!
//! # States
//! - Unknown: never evaluated, or the check type is disabled
//! - Healthy: the check passed
//! - Unhealthy: the check failed; excluded while its check type is enabled
//!
//! # Design Decisions
//! - Active and passive results are kept side by side in a [`CompositeHealth`]
//! - The composite is packed into one byte and swapped atomically, so readers
//!   never observe one field updated and the other stale
//! - Updates go through a compare-and-swap loop; concurrent writers to the
//!   same destination never lose each other's change

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

/// Tri-state health of a single check type.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum DestinationHealth {
    #[default]
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for DestinationHealth {
    fn from(val: u8) -> Self {
        match val {
            1 => DestinationHealth::Healthy,
            2 => DestinationHealth::Unhealthy,
            _ => DestinationHealth::Unknown,
        }
    }
}

impl fmt::Display for DestinationHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DestinationHealth::Unknown => "unknown",
            DestinationHealth::Healthy => "healthy",
            DestinationHealth::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// Active and passive health of a destination. Immutable; use
/// [`change_active`](Self::change_active) / [`change_passive`](Self::change_passive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CompositeHealth {
    pub active: DestinationHealth,
    pub passive: DestinationHealth,
}

impl CompositeHealth {
    pub const fn new(active: DestinationHealth, passive: DestinationHealth) -> Self {
        Self { active, passive }
    }

    /// A copy with only the active health replaced.
    #[must_use]
    pub const fn change_active(self, active: DestinationHealth) -> Self {
        Self {
            active,
            passive: self.passive,
        }
    }

    /// A copy with only the passive health replaced.
    #[must_use]
    pub const fn change_passive(self, passive: DestinationHealth) -> Self {
        Self {
            active: self.active,
            passive,
        }
    }

    fn pack(self) -> u8 {
        (self.active as u8) | ((self.passive as u8) << 2)
    }

    fn unpack(bits: u8) -> Self {
        Self {
            active: DestinationHealth::from(bits & 0b11),
            passive: DestinationHealth::from((bits >> 2) & 0b11),
        }
    }
}

/// Atomically published [`CompositeHealth`].
#[derive(Debug, Default)]
pub struct AtomicCompositeHealth {
    bits: AtomicU8,
}

impl AtomicCompositeHealth {
    pub fn new(health: CompositeHealth) -> Self {
        Self {
            bits: AtomicU8::new(health.pack()),
        }
    }

    pub fn load(&self) -> CompositeHealth {
        CompositeHealth::unpack(self.bits.load(Ordering::Acquire))
    }

    pub fn store(&self, health: CompositeHealth) {
        self.bits.store(health.pack(), Ordering::Release);
    }

    /// Apply `f` until it lands without interference. Returns `(previous, current)`.
    pub fn update<F>(&self, mut f: F) -> (CompositeHealth, CompositeHealth)
    where
        F: FnMut(CompositeHealth) -> CompositeHealth,
    {
        let mut current = self.bits.load(Ordering::Acquire);
        loop {
            let previous = CompositeHealth::unpack(current);
            let next = f(previous);
            if next == previous {
                return (previous, previous);
            }
            match self.bits.compare_exchange_weak(
                current,
                next.pack(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return (previous, next),
                Err(actual) => current = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use DestinationHealth::*;

    #[test]
    fn test_change_replaces_one_field() {
        let health = CompositeHealth::new(Healthy, Unhealthy);

        let active = health.change_active(Unknown);
        assert_eq!(active, CompositeHealth::new(Unknown, Unhealthy));

        let passive = health.change_passive(Healthy);
        assert_eq!(passive, CompositeHealth::new(Healthy, Healthy));

        // Original untouched
        assert_eq!(health, CompositeHealth::new(Healthy, Unhealthy));
    }

    #[test]
    fn test_pack_round_trip_covers_all_states() {
        for active in [Unknown, Healthy, Unhealthy] {
            for passive in [Unknown, Healthy, Unhealthy] {
                let health = CompositeHealth::new(active, passive);
                assert_eq!(AtomicCompositeHealth::new(health).load(), health);
            }
        }
    }

    #[test]
    fn test_update_reports_transition() {
        let health = AtomicCompositeHealth::default();
        let (before, after) = health.update(|h| h.change_passive(Unhealthy));
        assert_eq!(before, CompositeHealth::default());
        assert_eq!(after, CompositeHealth::new(Unknown, Unhealthy));

        let (before, after) = health.update(|h| h.change_passive(Unhealthy));
        assert_eq!(before, after);
    }

    #[test]
    fn test_concurrent_updates_do_not_lose_fields() {
        let health = Arc::new(AtomicCompositeHealth::default());
        let mut handles = Vec::new();
        for i in 0..8 {
            let health = health.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    if i % 2 == 0 {
                        health.update(|h| h.change_active(Healthy));
                    } else {
                        health.update(|h| h.change_passive(Unhealthy));
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(health.load(), CompositeHealth::new(Healthy, Unhealthy));
    }
}
