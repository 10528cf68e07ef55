//! Centralized configuration constants for the driver actors
//!
//! All timeout, retry and capacity defaults are defined here with the
//! reasoning behind them. Runtime overrides go through [`crate::config`].
//!
//! **Before changing any constant:**
//! 1. Read its full documentation comment
//! 2. Check the ordering constraints between the two layers (below)
//! 3. Update the documentation with your findings
//!
//! The timings are nested: a device-layer transaction (all retries
//! included) must finish inside the device busy window, and the device busy
//! window must fit inside the API busy window, otherwise the API layer gives
//! up on transactions the device layer would still have completed.

/// Device-layer timing and limits
pub mod device {
    /// Lockup timeout for a single bus transfer attempt (milliseconds)
    ///
    /// **Value**: 20ms
    ///
    /// **Rationale**: A register transfer of up to 20 bytes takes well under
    /// 1ms at 400kHz, even with clock stretching. A reply that has not arrived
    /// after 20ms means the executor or the bus is stuck, not slow.
    pub const LOCKUP_TIMEOUT_MS: u64 = 20;

    /// Init-phase timeout while Starting (milliseconds)
    ///
    /// **Value**: 500ms
    ///
    /// **Rationale**: Cold start has to wait for the bus to report ready,
    /// which can include the executor's own power-up and bus recovery.
    pub const INIT_TIMEOUT_MS: u64 = 500;

    /// Busy window: longest time a transaction may hold the device layer (milliseconds)
    ///
    /// **Value**: 100ms
    ///
    /// **Rationale**: Must exceed the worst case of the lockup path,
    /// (MAX_RETRIES + 1) * LOCKUP_TIMEOUT_MS = 80ms, so that the lockup path
    /// normally decides the outcome and the window only catches a wedged
    /// actor.
    pub const BUSY_WINDOW_MS: u64 = 100;

    /// Retries after a timeout before the attempt is declared failed
    ///
    /// **Value**: 3 (so 4 attempts in total)
    ///
    /// **Trade-offs**:
    /// - Fewer: a single glitch on a noisy bus fails the request
    /// - More: pushes the lockup path past BUSY_WINDOW_MS
    pub const MAX_RETRIES: u8 = 3;

    /// Largest read or write the device layer accepts (bytes)
    ///
    /// **Value**: 20 bytes
    ///
    /// **Rationale**: Size of the transfer buffer on the peripheral side.
    pub const MAX_TRANSFER_LEN: usize = 20;
}

/// API-layer timing and limits
pub mod api {
    /// How long Starting waits for the device layer's ready report (milliseconds)
    ///
    /// **Value**: 1000ms
    ///
    /// **Rationale**: Twice the device init timeout, so the device layer's
    /// own retries run to completion before the API layer gives up.
    pub const INIT_TIMEOUT_MS: u64 = 1000;

    /// Busy window for one forwarded transaction (milliseconds)
    ///
    /// **Value**: 250ms
    ///
    /// **Rationale**: Larger than the device busy window (100ms) plus
    /// mailbox latency, so a device-layer timeout is always reported before
    /// the API layer's own.
    pub const BUSY_WINDOW_MS: u64 = 250;

    /// Requests held while a transaction is in flight
    ///
    /// **Value**: 5
    ///
    /// **Rationale**: Covers a burst of register accesses from one client.
    /// Anything beyond that is dropped (backpressure by drop).
    pub const DEFERRED_CAPACITY: usize = 5;
}

/// Initial `actor_debug!` threshold for both layers
pub const DEFAULT_DEBUG_LEVEL: u8 = 1;
