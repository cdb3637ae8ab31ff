// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for patForge.

use std::io::{self, Write};

use clap::Parser;
use serde_json::json;

use patforge::converter::cli::{Cli, OutputFormat};
use patforge::converter::run_with_cli;
use patforge::core::events::{Event, EventSink};

/// Routes core events to stderr, honoring --quiet.
struct ConsoleSink {
    quiet: bool,
}

impl EventSink for ConsoleSink {
    fn emit(&mut self, event: Event) {
        if self.quiet {
            return;
        }
        match event {
            Event::Progress { percent } => {
                let _ = write!(io::stderr(), "\r{percent:>3}%");
            }
            Event::Log { level, message } => {
                eprintln!("{}: {message}", level.as_str());
            }
            Event::Warning { offset, message } => match offset {
                Some(offset) => eprintln!("WARNING (byte {offset}): {message}"),
                None => eprintln!("WARNING: {message}"),
            },
            Event::Cancelled { last_addr } => {
                eprintln!("\rCancelled at address 0x{last_addr:06X}");
            }
            Event::Done { total_vectors } => {
                eprintln!("\rDone: {total_vectors} vectors");
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let mut sink = ConsoleSink { quiet: cli.quiet };

    match run_with_cli(&cli, &mut sink) {
        Ok(report) => {
            if cli.format == OutputFormat::Json {
                let summary = json!({
                    "vectors": report.total_vectors(),
                    "warnings": report.warning_count(),
                    "cancelled": report.was_cancelled(),
                    "last_addr": report.last_addr(),
                });
                println!("{summary}");
            }
            if report.was_cancelled() {
                std::process::exit(2);
            }
        }
        Err(err) => {
            if cli.format == OutputFormat::Json {
                let summary = json!({
                    "error": err.to_string(),
                    "kind": format!("{:?}", err.kind()),
                });
                println!("{summary}");
            } else {
                for diag in err.diagnostics() {
                    eprintln!("{}", diag.format());
                }
                eprintln!("{err}");
            }
            std::process::exit(1);
        }
    }
}
