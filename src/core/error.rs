// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Error types, diagnostics, and reporting for the converter.

use std::fmt;
use std::sync::Arc;

/// Categories of converter errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertErrorKind {
    Lex,
    Parse,
    SymbolTable,
    WaveformContext,
    VectorWidth,
    Unsupported,
    WftLimit,
    ChannelMapConflict,
    ChannelMapParse,
    AddressOverflow,
    Cli,
    Io,
    Cancelled,
}

impl ConvertErrorKind {
    /// Everything except a cancellation is fatal; deny-listed constructs
    /// never reach this type (they are reported as warnings and skipped).
    pub fn is_fatal(self) -> bool {
        self != ConvertErrorKind::Cancelled
    }
}

/// A converter error with a kind, message, and optional source offset.
#[derive(Debug, Clone)]
pub struct ConvertError {
    kind: ConvertErrorKind,
    message: String,
    offset: Option<usize>,
    block: Option<String>,
}

impl ConvertError {
    pub fn new(kind: ConvertErrorKind, msg: &str, param: Option<&str>) -> Self {
        Self {
            kind,
            message: format_error(msg, param),
            offset: None,
            block: None,
        }
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Attach the top-level block the error was found in (e.g. "Timing").
    pub fn with_block(mut self, block: &str) -> Self {
        self.block = Some(block.to_string());
        self
    }

    pub fn kind(&self) -> ConvertErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    pub fn block(&self) -> Option<&str> {
        self.block.as_deref()
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.block, self.offset) {
            (Some(block), Some(offset)) => {
                write!(f, "{} (in {block}, byte {offset})", self.message)
            }
            (None, Some(offset)) => write!(f, "{} (byte {offset})", self.message),
            (Some(block), None) => write!(f, "{} (in {block})", self.message),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ConvertError {}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A diagnostic message with source location and context.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub(crate) offset: Option<usize>,
    pub(crate) code: String,
    pub(crate) severity: Severity,
    pub(crate) error: ConvertError,
    pub(crate) excerpt: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, error: ConvertError) -> Self {
        Self {
            offset: error.offset(),
            code: default_diagnostic_code(error.kind()).to_string(),
            severity,
            error,
            excerpt: None,
        }
    }

    pub fn with_offset(mut self, offset: Option<usize>) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_excerpt(mut self, excerpt: Option<String>) -> Self {
        self.excerpt = excerpt;
        self
    }

    pub fn format(&self) -> String {
        let sev = match self.severity {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        let loc = match self.offset {
            Some(offset) => format!("byte {offset}: "),
            None => String::new(),
        };
        let mut out = format!("{loc}{sev} [{}] - {}", self.code, self.error.message());
        if let Some(excerpt) = &self.excerpt {
            out.push('\n');
            out.push_str(excerpt);
        }
        out
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    pub fn message(&self) -> &str {
        self.error.message()
    }

    pub fn error(&self) -> &ConvertError {
        &self.error
    }
}

/// Report from a conversion that ran to completion (or was cancelled).
#[derive(Debug)]
pub struct RunReport {
    diagnostics: Vec<Diagnostic>,
    total_vectors: u64,
    cancelled: bool,
    last_addr: Option<u32>,
}

impl RunReport {
    pub fn new(diagnostics: Vec<Diagnostic>, total_vectors: u64) -> Self {
        Self {
            diagnostics,
            total_vectors,
            cancelled: false,
            last_addr: None,
        }
    }

    pub fn cancelled(diagnostics: Vec<Diagnostic>, total_vectors: u64, last_addr: u32) -> Self {
        Self {
            diagnostics,
            total_vectors,
            cancelled: true,
            last_addr: Some(last_addr),
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn total_vectors(&self) -> u64 {
        self.total_vectors
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn last_addr(&self) -> Option<u32> {
        self.last_addr
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }
}

/// Error from a failed conversion run.
#[derive(Debug)]
pub struct RunError {
    error: ConvertError,
    diagnostics: Vec<Diagnostic>,
    source: Arc<Vec<u8>>,
}

impl RunError {
    pub fn new(error: ConvertError, diagnostics: Vec<Diagnostic>, source: Arc<Vec<u8>>) -> Self {
        Self {
            error,
            diagnostics,
            source,
        }
    }

    pub fn bare(error: ConvertError) -> Self {
        Self {
            error,
            diagnostics: Vec::new(),
            source: Arc::new(Vec::new()),
        }
    }

    pub fn error(&self) -> &ConvertError {
        &self.error
    }

    pub fn kind(&self) -> ConvertErrorKind {
        self.error.kind()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn source(&self) -> &[u8] {
        &self.source
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for RunError {}

fn default_diagnostic_code(kind: ConvertErrorKind) -> &'static str {
    match kind {
        ConvertErrorKind::Lex => "pat001",
        ConvertErrorKind::Parse => "pat002",
        ConvertErrorKind::SymbolTable => "pat101",
        ConvertErrorKind::WaveformContext => "pat201",
        ConvertErrorKind::VectorWidth => "pat202",
        ConvertErrorKind::Unsupported => "pat203",
        ConvertErrorKind::WftLimit => "pat301",
        ConvertErrorKind::ChannelMapConflict => "pat302",
        ConvertErrorKind::ChannelMapParse => "pat303",
        ConvertErrorKind::AddressOverflow => "pat304",
        ConvertErrorKind::Cli => "pat401",
        ConvertErrorKind::Io => "pat501",
        ConvertErrorKind::Cancelled => "pat901",
    }
}

/// Format an error message with an optional parameter.
pub fn format_error(msg: &str, param: Option<&str>) -> String {
    match param {
        Some(p) => format!("{msg}: {p}"),
        None => msg.to_string(),
    }
}
