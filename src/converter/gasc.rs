// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! GASC pattern text emitter.
//!
//! Free-form output: a HEADER listing the declared signals, the signal
//! and timing declarations re-emitted in STIL syntax (so they re-parse
//! to the same symbol tables), and one SPM_PATTERN (SCAN) block. No
//! channel map is consulted.

use std::io::Write;

use crate::core::error::{ConvertError, ConvertErrorKind};
use crate::core::symbol_table::SymbolTables;

use super::engine::{LoweredVector, PatternSink};
use super::Emitter;

const HEADER_WRAP_COLUMN: usize = 75;

pub struct GascEmitter<W: Write> {
    out: W,
}

impl<W: Write> GascEmitter<W> {
    pub fn new(mut out: W, tables: &SymbolTables) -> Result<Self, ConvertError> {
        write_framing(&mut out, tables).map_err(io_error)?;
        Ok(Self { out })
    }
}

fn write_framing<W: Write>(out: &mut W, tables: &SymbolTables) -> std::io::Result<()> {
    writeln!(out, "HEADER")?;
    let names: Vec<&str> = tables.signals.iter().map(|s| s.name.as_str()).collect();
    let mut column = 5usize;
    write!(out, "     ")?;
    for (i, name) in names.iter().enumerate() {
        let last = i + 1 == names.len();
        let sep = if last { ";" } else { "," };
        if column + name.len() + 1 > HEADER_WRAP_COLUMN && i > 0 {
            writeln!(out)?;
            write!(out, "     ")?;
            column = 5;
        }
        write!(out, "{name}{sep}")?;
        column += name.len() + 1;
    }
    writeln!(out)?;
    writeln!(out)?;

    write_signals(out, tables)?;
    write_signal_groups(out, tables)?;
    write_timing(out, tables)?;

    writeln!(out, "SPM_PATTERN (SCAN) {{")?;
    Ok(())
}

fn write_signals<W: Write>(out: &mut W, tables: &SymbolTables) -> std::io::Result<()> {
    writeln!(out, "Signals {{")?;
    for signal in tables.signals.iter() {
        match signal.default_wfc {
            Some(wfc) => writeln!(
                out,
                "  {} {} {{ Default {wfc}; }}",
                signal.name,
                signal.direction.as_str()
            )?,
            None => writeln!(out, "  {} {};", signal.name, signal.direction.as_str())?,
        }
    }
    writeln!(out, "}}")?;
    Ok(())
}

fn write_signal_groups<W: Write>(out: &mut W, tables: &SymbolTables) -> std::io::Result<()> {
    if tables.groups.names().next().is_none() {
        return Ok(());
    }
    writeln!(out, "SignalGroups {{")?;
    for name in tables.groups.names() {
        let members = tables.groups.members(name).unwrap_or(&[]);
        writeln!(out, "  {name} = '{}';", members.join(" + "))?;
    }
    writeln!(out, "}}")?;
    Ok(())
}

fn write_timing<W: Write>(out: &mut W, tables: &SymbolTables) -> std::io::Result<()> {
    if tables.wfts.is_empty() {
        return Ok(());
    }
    writeln!(out, "Timing {{")?;
    for wft in tables.wfts.iter() {
        writeln!(out, "  WaveformTable {} {{", wft.name)?;
        if let Some(period) = &wft.period {
            writeln!(out, "    Period '{period}';")?;
        }
        writeln!(out, "    Waveforms {{")?;
        let mut last_sigref: Option<&str> = None;
        for entry in &wft.entries {
            if last_sigref != Some(entry.sigref.as_str()) {
                if last_sigref.is_some() {
                    writeln!(out, "      }}")?;
                }
                writeln!(out, "      {} {{", entry.sigref)?;
                last_sigref = Some(entry.sigref.as_str());
            }
            let edges: Vec<String> = entry
                .edges
                .iter()
                .map(|edge| format!("'{}' {};", edge.time, edge.events.join("/")))
                .collect();
            writeln!(out, "        {} {{ {} }}", entry.wfcs, edges.join(" "))?;
        }
        if last_sigref.is_some() {
            writeln!(out, "      }}")?;
        }
        writeln!(out, "    }}")?;
        writeln!(out, "  }}")?;
    }
    writeln!(out, "}}")?;
    Ok(())
}

impl<W: Write> PatternSink for GascEmitter<W> {
    fn vector(&mut self, vector: &LoweredVector) -> Result<(), ConvertError> {
        let wfcs: String = vector.driven.iter().collect();
        let mut line = format!("       *{wfcs}*");
        if !vector.micro.is_adv() {
            line.push('#');
            line.push_str(&vector.micro.format());
        }
        if vector.wft_changed {
            if let Some(wft) = &vector.wft_name {
                line.push(';');
                line.push_str(wft);
            }
        }
        for label in &vector.labels {
            line.push(':');
            line.push_str(label);
        }
        writeln!(self.out, "{line}").map_err(io_error)
    }
}

impl<W: Write> Emitter for GascEmitter<W> {
    /// Closing marker; written on success and on cancellation, never
    /// after a fatal error.
    fn finish(&mut self) -> Result<(), ConvertError> {
        writeln!(self.out, "}}").map_err(io_error)?;
        self.out.flush().map_err(io_error)
    }
}

fn io_error(err: std::io::Error) -> ConvertError {
    ConvertError::new(
        ConvertErrorKind::Io,
        &format!("Error writing GASC output: {err}"),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::engine::Micro;
    use crate::core::events::CollectSink;
    use crate::core::parser::Parser;

    const SRC: &str = "Signals { a In; b Out; }\nSignalGroups { pair = 'a + b'; }\n\
        Timing { WaveformTable w { Period '100ns'; Waveforms { a { 01 { '0ns' D/U; } } } } }\n";

    fn tables_for(src: &str) -> SymbolTables {
        let mut sink = CollectSink::new();
        let mut tables = SymbolTables::new();
        let mut parser = Parser::new(src.as_bytes(), &[]);
        parser.parse_header(&mut tables, &mut sink).expect("header");
        tables.finalize().expect("finalize");
        tables
    }

    fn lowered(addr: u32, micro: Micro, driven: Vec<char>) -> LoweredVector {
        LoweredVector {
            addr,
            micro,
            wft_name: Some("w".to_string()),
            wft_id: 0,
            wft_changed: false,
            labels: Vec::new(),
            driven,
        }
    }

    #[test]
    fn vector_lines_carry_declared_signal_count() {
        let tables = tables_for(SRC);
        let mut out = Vec::new();
        let mut emitter = GascEmitter::new(&mut out, &tables).expect("emitter");
        emitter
            .vector(&lowered(0, Micro::Mssa, vec!['D', 'X']))
            .expect("vector");
        emitter
            .vector(&lowered(1, Micro::Adv, vec!['U', 'X']))
            .expect("vector");
        emitter.finish().expect("finish");

        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("       *DX*#MSSA\n"));
        // The implicit ADV is omitted.
        assert!(text.contains("       *UX*\n"));
        assert!(text.trim_end().ends_with('}'));
    }

    #[test]
    fn wft_change_and_label_render_as_suffixes() {
        let tables = tables_for(SRC);
        let mut out = Vec::new();
        let mut emitter = GascEmitter::new(&mut out, &tables).expect("emitter");
        let mut vector = lowered(0, Micro::Rpt(5), vec!['D', 'X']);
        vector.wft_changed = true;
        vector.labels = vec!["top".to_string()];
        emitter.vector(&vector).expect("vector");

        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("       *DX*#RPT 5;w:top\n"));
    }

    #[test]
    fn declarations_round_trip_through_the_parser() {
        let tables = tables_for(SRC);
        let mut out = Vec::new();
        let emitter = GascEmitter::new(&mut out, &tables).expect("emitter");
        drop(emitter);

        let text = String::from_utf8(out).expect("utf8");
        let decls = &text[..text.find("SPM_PATTERN").expect("pattern block")];
        let again = tables_for(decls);

        assert_eq!(again.signals.len(), tables.signals.len());
        assert_eq!(
            again.groups.members("pair"),
            tables.groups.members("pair")
        );
        let wft = tables.wfts.get("w").expect("wft");
        let wft2 = again.wfts.get("w").expect("wft");
        assert_eq!(wft.period, wft2.period);
        assert_eq!(wft.entries, wft2.entries);
        assert_eq!(wft.substitution("a"), wft2.substitution("a"));
    }

    #[test]
    fn header_wraps_long_signal_lists() {
        let mut src = String::from("Signals { ");
        for i in 0..40 {
            src.push_str(&format!("signal_number_{i} In; "));
        }
        src.push('}');
        let tables = tables_for(&src);
        let mut out = Vec::new();
        let emitter = GascEmitter::new(&mut out, &tables).expect("emitter");
        drop(emitter);

        let text = String::from_utf8(out).expect("utf8");
        let header_end = text.find("\n\n").expect("blank line");
        for line in text[..header_end].lines().skip(1) {
            assert!(line.len() <= HEADER_WRAP_COLUMN + 24);
            assert!(line.starts_with("     "));
        }
        assert!(text[..header_end].trim_end().ends_with(';'));
    }
}
