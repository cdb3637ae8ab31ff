// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line interface parsing and argument validation.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use crate::core::channel_map::ChannelMap;
use crate::core::error::{ConvertError, ConvertErrorKind, RunError};
use crate::core::events::CancelFlag;

use super::{ConvertRequest, Target};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const LONG_ABOUT: &str = "STIL test-vector translator for the 256-channel HTOL tester.

Reads a STIL file, lowers its Pattern body (repeat expansion, procedure
and macro inlining, loop tracking, waveform substitution), and writes a
VCT or GASC pattern file. The VCT target needs a signal-to-channel map,
given as a Signal,Channel CSV table or a JSON object of channel arrays.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TargetArg {
    Vct,
    Gasc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "patforge",
    version = VERSION,
    about = "STIL to VCT/GASC pattern translator",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    /// Path to the STIL source file
    pub input: PathBuf,
    #[arg(
        short = 'o',
        long = "outfile",
        value_name = "FILE",
        long_help = "Output filename. Defaults to the input base with the target's extension."
    )]
    pub outfile: Option<PathBuf>,
    #[arg(
        short = 't',
        long = "target",
        value_enum,
        default_value_t = TargetArg::Vct,
        long_help = "Select the output pattern format."
    )]
    pub target: TargetArg,
    #[arg(
        short = 'm',
        long = "channel-map",
        value_name = "FILE",
        long_help = "Signal-to-channel map (CSV or .json). Required for the vct target."
    )]
    pub channel_map: Option<PathBuf>,
    #[arg(
        long = "deny",
        value_name = "NAME",
        action = ArgAction::Append,
        long_help = "Statement name to warn about and skip (e.g. ScanChain). Repeatable."
    )]
    pub deny: Vec<String>,
    #[arg(
        long = "format",
        value_enum,
        default_value_t = OutputFormat::Text,
        long_help = "Select CLI output format. text is default; json prints a machine-readable run summary."
    )]
    pub format: OutputFormat,
    #[arg(
        short = 'q',
        long = "quiet",
        action = ArgAction::SetTrue,
        long_help = "Suppress progress and warning output for successful runs."
    )]
    pub quiet: bool,
}

/// Validate CLI arguments into a conversion request.
pub fn validate_cli(cli: &Cli) -> Result<ConvertRequest, RunError> {
    let target = match cli.target {
        TargetArg::Vct => Target::Vct,
        TargetArg::Gasc => Target::Gasc,
    };

    let channel_map = match (&cli.channel_map, target) {
        (Some(path), _) => ChannelMap::from_path(path).map_err(RunError::bare)?,
        (None, Target::Vct) => {
            return Err(RunError::bare(ConvertError::new(
                ConvertErrorKind::Cli,
                "The vct target requires --channel-map",
                None,
            )));
        }
        (None, Target::Gasc) => ChannelMap::new(),
    };

    let output_path = match &cli.outfile {
        Some(path) => path.clone(),
        None => cli.input.with_extension(target.extension()),
    };
    if output_path == cli.input {
        return Err(RunError::bare(ConvertError::new(
            ConvertErrorKind::Cli,
            "Output path equals the input path",
            Some(output_path.to_string_lossy().as_ref()),
        )));
    }

    Ok(ConvertRequest {
        source_path: cli.input.clone(),
        output_path,
        target,
        channel_map,
        deny_list: cli.deny.clone(),
        cancel: CancelFlag::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser as _;

    #[test]
    fn vct_without_channel_map_is_refused() {
        let cli = Cli::parse_from(["patforge", "in.stil"]);
        let err = validate_cli(&cli).expect_err("missing map");
        assert_eq!(err.kind(), ConvertErrorKind::Cli);
    }

    #[test]
    fn gasc_defaults_output_extension() {
        let cli = Cli::parse_from(["patforge", "dir/in.stil", "--target", "gasc"]);
        let request = validate_cli(&cli).expect("valid");
        assert_eq!(request.output_path, PathBuf::from("dir/in.gasc"));
        assert!(request.channel_map.is_empty());
    }

    #[test]
    fn deny_list_accumulates() {
        let cli = Cli::parse_from([
            "patforge",
            "in.stil",
            "--target",
            "gasc",
            "--deny",
            "ScanChain",
            "--deny",
            "Shift",
        ]);
        let request = validate_cli(&cli).expect("valid");
        assert_eq!(request.deny_list, vec!["ScanChain", "Shift"]);
    }
}
