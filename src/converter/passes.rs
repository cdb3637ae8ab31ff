// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Conversion run orchestration.
//!
//! Owns the CLI-driven run flow and the two-phase conversion sequence:
//! phase 1 parses every header block into the symbol tables, phase 2
//! streams the pattern body through the lowering engine into the
//! emitter. Input and output handles are scoped to the run and released
//! on every path.

use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;

use clap::Parser as _;

use crate::core::error::{
    ConvertError, ConvertErrorKind, Diagnostic, RunError, RunReport, Severity,
};
use crate::core::events::{CancelFlag, Event, EventSink, LogLevel, ProgressTracker};
use crate::core::parser::Parser;
use crate::core::symbol_table::SymbolTables;
use crate::core::timing::WftTable;
use crate::report::excerpt_at;

use super::cli::{validate_cli, Cli};
use super::engine::Engine;
use super::gasc::GascEmitter;
use super::vct::VctEmitter;
use super::{ConvertRequest, Emitter, Target};

/// Waveform tables addressable by the VCT RRADR field.
const VCT_WFT_LIMIT: usize = 8;

pub(super) fn run(sink: &mut dyn EventSink) -> Result<RunReport, RunError> {
    let cli = Cli::parse();
    run_with_cli(&cli, sink)
}

pub(super) fn run_with_cli(cli: &Cli, sink: &mut dyn EventSink) -> Result<RunReport, RunError> {
    let request = validate_cli(cli)?;
    convert(&request, sink)
}

/// Records warnings as report diagnostics while forwarding every event.
struct TeeSink<'a> {
    inner: &'a mut dyn EventSink,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> TeeSink<'a> {
    fn new(inner: &'a mut dyn EventSink) -> Self {
        Self {
            inner,
            diagnostics: Vec::new(),
        }
    }
}

impl EventSink for TeeSink<'_> {
    fn emit(&mut self, event: Event) {
        if let Event::Warning { offset, message } = &event {
            let mut error = ConvertError::new(ConvertErrorKind::Parse, message, None);
            if let Some(offset) = offset {
                error = error.with_offset(*offset);
            }
            self.diagnostics
                .push(Diagnostic::new(Severity::Warning, error));
        }
        self.inner.emit(event);
    }
}

/// Core entry point: convert one STIL source into the requested target.
pub fn convert(request: &ConvertRequest, sink: &mut dyn EventSink) -> Result<RunReport, RunError> {
    let source = std::fs::read(&request.source_path).map_err(|err| {
        RunError::bare(ConvertError::new(
            ConvertErrorKind::Io,
            &format!("Error reading source file: {err}"),
            Some(request.source_path.to_string_lossy().as_ref()),
        ))
    })?;
    let source = Arc::new(source);

    let mut tee = TeeSink::new(sink);
    match convert_streams(request, &source, &mut tee) {
        Ok(Outcome {
            total_vectors,
            cancelled: Some(last_addr),
        }) => Ok(RunReport::cancelled(
            tee.diagnostics,
            total_vectors,
            last_addr,
        )),
        Ok(Outcome {
            total_vectors,
            cancelled: None,
        }) => Ok(RunReport::new(tee.diagnostics, total_vectors)),
        Err(error) => {
            let excerpt = error
                .offset()
                .map(|offset| excerpt_at(&source, offset, 40));
            let mut diagnostics = tee.diagnostics;
            diagnostics.push(Diagnostic::new(Severity::Error, error.clone()).with_excerpt(excerpt));
            Err(RunError::new(error, diagnostics, source))
        }
    }
}

struct Outcome {
    total_vectors: u64,
    cancelled: Option<u32>,
}

fn convert_streams(
    request: &ConvertRequest,
    source: &[u8],
    sink: &mut TeeSink<'_>,
) -> Result<Outcome, ConvertError> {
    let mut tables = SymbolTables::new();
    tables.wfts = WftTable::with_limit(match request.target {
        Target::Vct => Some(VCT_WFT_LIMIT),
        Target::Gasc => None,
    });

    let mut parser = Parser::new(source, &request.deny_list);
    let found = parser.parse_header(&mut tables, sink)?;
    if !found {
        return Err(ConvertError::new(
            ConvertErrorKind::Parse,
            "No Pattern block in source",
            None,
        ));
    }
    tables.finalize()?;
    sink.emit(Event::Log {
        level: LogLevel::Info,
        message: format!(
            "Header parsed: {} signals, {} groups, {} waveform tables",
            tables.signals.len(),
            tables.groups.names().count(),
            tables.wfts.len()
        ),
    });

    let out_file = File::create(&request.output_path).map_err(|err| {
        ConvertError::new(
            ConvertErrorKind::Io,
            &format!("Error creating output file: {err}"),
            Some(request.output_path.to_string_lossy().as_ref()),
        )
    })?;
    let writer = BufWriter::new(out_file);
    let source_name = request
        .source_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| request.source_path.to_string_lossy().into_owned());

    match request.target {
        Target::Vct => {
            let emitter = VctEmitter::new(
                writer,
                &tables,
                &request.channel_map,
                &source_name,
                sink,
            )?;
            stream_pattern(&mut parser, &tables, &request.cancel, emitter, sink)
        }
        Target::Gasc => {
            let emitter = GascEmitter::new(writer, &tables)?;
            stream_pattern(&mut parser, &tables, &request.cancel, emitter, sink)
        }
    }
}

/// Phase 2: pull pattern statements through the engine into the emitter.
fn stream_pattern<E: Emitter>(
    parser: &mut Parser<'_>,
    tables: &SymbolTables,
    cancel: &CancelFlag,
    mut emitter: E,
    sink: &mut TeeSink<'_>,
) -> Result<Outcome, ConvertError> {
    let mut engine = Engine::new(tables, cancel.clone());
    let mut tracker = ProgressTracker::new(parser.source_len());

    let streamed = (|| -> Result<(), ConvertError> {
        while let Some(stmt) = parser.next_pattern_stmt(sink)? {
            engine.process(&stmt, sink, &mut emitter)?;
            tracker.update(parser.offset(), sink);
        }
        Ok(())
    })();

    match streamed {
        Ok(()) => {
            emitter.finish()?;
            sink.emit(Event::Done {
                total_vectors: engine.emitted(),
            });
            Ok(Outcome {
                total_vectors: engine.emitted(),
                cancelled: None,
            })
        }
        Err(error) if error.kind() == ConvertErrorKind::Cancelled => {
            // Controlled termination: the output stays structurally
            // parseable up to the last emitted address.
            emitter.finish()?;
            let last_addr = engine.last_addr();
            sink.emit(Event::Cancelled { last_addr });
            Ok(Outcome {
                total_vectors: engine.emitted(),
                cancelled: Some(last_addr),
            })
        }
        Err(error) => Err(error),
    }
}
