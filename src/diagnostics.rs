//! Bounded diagnostics channel for non-fatal engine events.
//!
//! The engine never prints, never propagates and never acts on its own
//! warnings: registry collisions, duplicate plugin names, invalid tree
//! shapes and faulting hooks are all recorded here and the primary
//! operation continues. The host decides what to do with them.
//!
//! The channel is a fixed-size ring with FIFO eviction, so a misbehaving
//! plugin that faults on every call cannot grow memory without bound. An
//! eviction counter survives eviction itself; a high count means sustained
//! fault volume even when the entries are gone.
//!
//! # Concurrency
//!
//! `RwLock`-based: concurrent readers, exclusive writers. Clones share the
//! same buffer, so an engine and the host's monitoring task can hold the
//! channel independently. Poisoned locks are recovered, never propagated -
//! a panicking reader must not take the diagnostics trail down with it.
//!
//! # Example
//!
//! ```rust
//! use relay_errors::diagnostics::{DiagnosticOrigin, DiagnosticsChannel};
//!
//! let channel = DiagnosticsChannel::new(128);
//! channel.warn(DiagnosticOrigin::Registry, "code `dup` redefined");
//!
//! for entry in channel.recent(10) {
//!     eprintln!("[{}] {}: {}", entry.severity, entry.origin, entry.message);
//! }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::LogLevel;

// ============================================================================
// Diagnostic Entry
// ============================================================================

/// Where a diagnostic was raised.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiagnosticOrigin {
    /// Registry construction: collisions, invalid shapes, reserved ids.
    Registry,
    /// The engine's own control path (e.g. the global unknown mapper).
    Engine,
    /// A named plugin hook.
    Plugin {
        /// The plugin's declared name.
        name: Arc<str>,
        /// Which hook faulted: `on_unknown`, `on_create`, `on_serialize`
        /// or `on_deserialize`.
        hook: &'static str,
    },
}

impl DiagnosticOrigin {
    /// Origin for a named plugin hook.
    #[inline]
    pub fn plugin(name: impl Into<Arc<str>>, hook: &'static str) -> Self {
        Self::Plugin {
            name: name.into(),
            hook,
        }
    }
}

impl fmt::Display for DiagnosticOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry => f.write_str("registry"),
            Self::Engine => f.write_str("engine"),
            Self::Plugin { name, hook } => write!(f, "plugin `{name}` ({hook})"),
        }
    }
}

/// A single recorded event.
///
/// Uses `Arc<str>` so snapshot queries clone entries with refcount bumps
/// rather than string copies, the same trade the ring makes for eviction.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    /// Unix timestamp (seconds) at recording time.
    pub timestamp: u64,
    /// Severity of the event. Warnings for policy overrides, errors for
    /// faulting hooks.
    pub severity: LogLevel,
    /// Component that raised the event.
    pub origin: DiagnosticOrigin,
    /// Human-readable description.
    pub message: Arc<str>,
}

// ============================================================================
// Fixed-Size Ring
// ============================================================================

/// Fixed-size ring with exact allocation (no growth).
struct Ring {
    entries: Box<[Option<Diagnostic>]>,
    tail: usize,
    head: usize,
    len: usize,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Self {
            entries: std::iter::repeat_with(|| None)
                .take(capacity)
                .collect::<Box<[Option<Diagnostic>]>>(),
            tail: 0,
            head: 0,
            len: 0,
        }
    }

    /// Insert, returning the evicted entry when full.
    fn push(&mut self, entry: Diagnostic) -> Option<Diagnostic> {
        let evicted = self.entries[self.tail].replace(entry);
        self.tail = (self.tail + 1) % self.entries.len();

        if self.len < self.entries.len() {
            self.len += 1;
        } else {
            self.head = (self.head + 1) % self.entries.len();
        }

        evicted
    }

    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    fn iter(&self) -> impl DoubleEndedIterator<Item = &Diagnostic> {
        let head = self.head;
        let len = self.len;
        let cap = self.entries.len();

        (0..len).filter_map(move |i| {
            let idx = (head + i) % cap;
            self.entries[idx].as_ref()
        })
    }

    fn clear(&mut self) {
        for entry in self.entries.iter_mut() {
            *entry = None;
        }
        self.head = 0;
        self.tail = 0;
        self.len = 0;
    }
}

// ============================================================================
// Channel
// ============================================================================

/// Shared, bounded sink for engine diagnostics.
///
/// Cheap to clone; clones observe and record into the same ring.
pub struct DiagnosticsChannel {
    buffer: Arc<RwLock<Ring>>,
    capacity: usize,
    eviction_count: Arc<AtomicU64>,
}

impl DiagnosticsChannel {
    /// Create a channel holding at most `capacity` entries.
    ///
    /// A capacity of zero is bumped to one; a channel that can hold
    /// nothing would silently drop every fault.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Arc::new(RwLock::new(Ring::new(capacity))),
            capacity,
            eviction_count: Arc::new(AtomicU64::new(0)),
        }
    }

    #[inline]
    fn read_buffer(&self) -> RwLockReadGuard<'_, Ring> {
        match self.buffer.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[inline]
    fn write_buffer(&self) -> RwLockWriteGuard<'_, Ring> {
        match self.buffer.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Record an event at an explicit severity.
    pub fn record(
        &self,
        severity: LogLevel,
        origin: DiagnosticOrigin,
        message: impl Into<Arc<str>>,
    ) {
        let entry = Diagnostic {
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| d.as_secs()),
            severity,
            origin,
            message: message.into(),
        };

        let mut buffer = self.write_buffer();
        if buffer.push(entry).is_some() {
            self.eviction_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a warning (policy overrides, skipped definitions).
    #[inline]
    pub fn warn(&self, origin: DiagnosticOrigin, message: impl Into<Arc<str>>) {
        self.record(LogLevel::Warn, origin, message);
    }

    /// Record an error (faulting hooks).
    #[inline]
    pub fn error(&self, origin: DiagnosticOrigin, message: impl Into<Arc<str>>) {
        self.record(LogLevel::Error, origin, message);
    }

    /// The N most recent entries, newest first.
    pub fn recent(&self, count: usize) -> Vec<Diagnostic> {
        let buffer = self.read_buffer();
        buffer.iter().rev().take(count).cloned().collect()
    }

    /// All retained entries, oldest first.
    pub fn all(&self) -> Vec<Diagnostic> {
        let buffer = self.read_buffer();
        buffer.iter().cloned().collect()
    }

    /// Retained entries matching a predicate, oldest first.
    ///
    /// ```rust
    /// # use relay_errors::diagnostics::{DiagnosticOrigin, DiagnosticsChannel};
    /// # let channel = DiagnosticsChannel::new(8);
    /// let from_plugins = channel.filtered(|d| {
    ///     matches!(d.origin, DiagnosticOrigin::Plugin { .. })
    /// });
    /// ```
    pub fn filtered<F>(&self, predicate: F) -> Vec<Diagnostic>
    where
        F: Fn(&Diagnostic) -> bool,
    {
        let buffer = self.read_buffer();
        buffer.iter().filter(|d| predicate(d)).cloned().collect()
    }

    /// Number of retained entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.read_buffer().len()
    }

    /// True if nothing has been recorded (or everything was cleared).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of entries dropped to make room since creation.
    #[inline]
    pub fn eviction_count(&self) -> u64 {
        self.eviction_count.load(Ordering::Relaxed)
    }

    /// Drop all retained entries. The eviction counter is kept.
    pub fn clear(&self) {
        self.write_buffer().clear();
    }

    /// Maximum number of retained entries.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Clone for DiagnosticsChannel {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
            capacity: self.capacity,
            eviction_count: Arc::clone(&self.eviction_count),
        }
    }
}

impl fmt::Debug for DiagnosticsChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticsChannel")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("evictions", &self.eviction_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
