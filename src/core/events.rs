// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Event plumbing between the converter core and its host.
//!
//! The core runs on one worker and reports through a sink; the host may
//! request cancellation through a shared flag. Events are delivered in
//! production order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Events surfaced to the host while a conversion runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Progress { percent: u8 },
    Log { level: LogLevel, message: String },
    Warning { offset: Option<usize>, message: String },
    Cancelled { last_addr: u32 },
    Done { total_vectors: u64 },
}

pub trait EventSink {
    fn emit(&mut self, event: Event);
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: Event) {}
}

/// Collects events for inspection; used by tests and batch hosts.
#[derive(Debug, Default)]
pub struct CollectSink {
    pub events: Vec<Event>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Event> {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::Warning { .. }))
    }
}

impl EventSink for CollectSink {
    fn emit(&mut self, event: Event) {
        self.events.push(event);
    }
}

/// Cooperative single-bit cancellation flag shared with the host thread.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Emits a Progress event roughly every `interval` consumed bytes.
#[derive(Debug)]
pub struct ProgressTracker {
    total: usize,
    interval: usize,
    next_mark: usize,
}

impl ProgressTracker {
    pub const DEFAULT_INTERVAL: usize = 64 * 1024;

    pub fn new(total: usize) -> Self {
        Self::with_interval(total, Self::DEFAULT_INTERVAL)
    }

    pub fn with_interval(total: usize, interval: usize) -> Self {
        Self {
            total,
            interval: interval.max(1),
            next_mark: interval.max(1),
        }
    }

    /// Call with the current consumed-byte offset; emits at most one
    /// Progress event per interval crossing.
    pub fn update(&mut self, consumed: usize, sink: &mut dyn EventSink) {
        if consumed < self.next_mark {
            return;
        }
        while self.next_mark <= consumed {
            self.next_mark += self.interval;
        }
        sink.emit(Event::Progress {
            percent: self.percent(consumed),
        });
    }

    pub fn percent(&self, consumed: usize) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((consumed.min(self.total) as u64 * 100) / self.total as u64) as u8
    }
}
