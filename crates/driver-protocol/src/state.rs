use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

// Packed status byte: lower bits hold DriverStatus, top bit is the busy flag
pub const STATE_MASK: u8 = 0x7F; // 0b01111111
pub const LOCK_FLAG: u8 = 0x80; // 0b10000000

/// Externally visible status of one driver layer
///
/// Only state-entry handlers change it; every change is broadcast as the
/// matching report (see [`crate::DriverEvent::for_status`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum DriverStatus {
    /// Actor not started yet
    #[default]
    Unknown,
    Disabled,
    Enabled,
    FatalError,
}

impl DriverStatus {
    /// Convert status to u8 value for atomic storage
    pub fn to_u8(self) -> u8 {
        match self {
            DriverStatus::Unknown => 0,
            DriverStatus::Disabled => 1,
            DriverStatus::Enabled => 2,
            DriverStatus::FatalError => 3,
        }
    }

    /// Convert u8 value back to status (masks out busy bit)
    /// Returns None if value is invalid
    pub fn from_u8(value: u8) -> Option<Self> {
        match value & STATE_MASK {
            0 => Some(DriverStatus::Unknown),
            1 => Some(DriverStatus::Disabled),
            2 => Some(DriverStatus::Enabled),
            3 => Some(DriverStatus::FatalError),
            _ => None,
        }
    }
}

/// Lock-free mirror of an actor's status and busy flag
///
/// The owning actor writes it from its entry handlers; any number of clones
/// may read it without messaging the actor.
#[derive(Debug, Clone, Default)]
pub struct SharedStatus {
    packed: Arc<AtomicU8>,
}

impl SharedStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> DriverStatus {
        DriverStatus::from_u8(self.packed.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub fn is_busy(&self) -> bool {
        self.packed.load(Ordering::Acquire) & LOCK_FLAG != 0
    }

    pub fn set_status(&self, status: DriverStatus) {
        let _ = self
            .packed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |old| {
                Some((old & LOCK_FLAG) | status.to_u8())
            });
    }

    pub fn set_busy(&self, busy: bool) {
        if busy {
            self.packed.fetch_or(LOCK_FLAG, Ordering::AcqRel);
        } else {
            self.packed.fetch_and(STATE_MASK, Ordering::AcqRel);
        }
    }
}

/// A state that sits in a tree of superstates
///
/// Events a state does not handle are offered to `parent()`; the root
/// returns `None`.
pub trait Hierarchy: Copy + Eq + std::fmt::Debug {
    fn parent(self) -> Option<Self>;

    /// Path from the root down to (and including) `self`
    fn path_from_root(self) -> Vec<Self> {
        let mut path = vec![self];
        let mut current = self;
        while let Some(parent) = current.parent() {
            path.push(parent);
            current = parent;
        }
        path.reverse();
        path
    }

    /// True if `self` is `ancestor` or nested somewhere below it
    fn is_within(self, ancestor: Self) -> bool {
        let mut current = Some(self);
        while let Some(state) = current {
            if state == ancestor {
                return true;
            }
            current = state.parent();
        }
        false
    }
}

/// # Device Layer State Machine
///
/// ```text
/// Backstop
///  ├── Disabled ──Enable──► Starting ──proceed──► Idle
///  ├── Starting ──retries exhausted──► Error
///  ├── Enabled
///  │    ├── Idle ──Read──► Busy/Read
///  │    │        ──Write─► Busy/Write
///  │    └── Busy ──busy window exhausted──► Idle
///  │         ├── Read  ──complete / lockup exhausted──► Idle
///  │         │         ──bus error──► Error
///  │         └── Write (same as Read)
///  └── Error ──Enable──► Starting
///
///  Backstop: bus not ready / Disable ──► Disabled (from anywhere)
/// ```
///
/// ## State Invariants
///
/// - **Disabled**: no transaction held, requests rejected
/// - **Starting**: init timer armed, waiting for the proceed self-post
/// - **Idle**: correlation epoch fresh, no timers armed
/// - **Busy**: busy-window timer armed, exactly one transaction held
/// - **Read/Write**: lockup timer armed, at most one bus request outstanding
/// - **Error**: no transaction held, waiting for Enable or Disable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DeviceState {
    Backstop,
    Disabled,
    Starting,
    Enabled,
    Idle,
    Busy,
    Read,
    Write,
    Error,
}

impl Hierarchy for DeviceState {
    fn parent(self) -> Option<Self> {
        use DeviceState::*;
        match self {
            Backstop => None,
            Disabled | Starting | Enabled | Error => Some(Backstop),
            Idle | Busy => Some(Enabled),
            Read | Write => Some(Busy),
        }
    }
}

/// # API Layer State Machine
///
/// ```text
/// Backstop
///  ├── Disabled ──Enable──► Starting ──device Ready──► Idle
///  ├── Starting ──device Error / init timeout──► Error
///  ├── Enabled
///  │    ├── Idle ──request──► Busy
///  │    └── Busy ──device reply / busy timeout──► Idle
///  │              (new requests deferred, bounded)
///  └── Error ──Enable──► Starting
///
///  Backstop: Disable ──► Disabled, device Error report ──► Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ApiState {
    Backstop,
    Disabled,
    Starting,
    Enabled,
    Idle,
    Busy,
    Error,
}

impl Hierarchy for ApiState {
    fn parent(self) -> Option<Self> {
        use ApiState::*;
        match self {
            Backstop => None,
            Disabled | Starting | Enabled | Error => Some(Backstop),
            Idle | Busy => Some(Enabled),
        }
    }
}
