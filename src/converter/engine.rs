// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Pattern lowering engine.
//!
//! Consumes pattern statements and produces lowered vector events:
//! repeats expanded, procedures and macros inlined, loop and match-loop
//! nesting tracked against the LI0-LI3/JNI0-JNI3 register set, waveform
//! substitution applied, and exactly one micro-instruction assigned per
//! emitted address.

use std::collections::HashMap;

use crate::core::error::{ConvertError, ConvertErrorKind};
use crate::core::events::{CancelFlag, Event, EventSink};
use crate::core::parser::{Stmt, VecAssign, WfcPiece};
use crate::core::symbol_table::SymbolTables;

pub const MAX_LOOP_DEPTH: usize = 4;
pub const MAX_ADDRESS: u32 = 0xFF_FFFF;

/// Micro-instruction attached to a lowered vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Micro {
    Mssa,
    Adv,
    Halt,
    Jump(String),
    Iddq,
    Rpt(u64),
    Li(u8, u64),
    Jni(u8),
    Imatch,
    Mbgn,
    Mend,
    Call(String),
    Ret,
}

impl Micro {
    pub fn is_adv(&self) -> bool {
        matches!(self, Micro::Adv)
    }

    pub fn format(&self) -> String {
        match self {
            Micro::Mssa => "MSSA".to_string(),
            Micro::Adv => "ADV".to_string(),
            Micro::Halt => "HALT".to_string(),
            Micro::Jump(label) => format!("JUMP {label}"),
            Micro::Iddq => "IDDQ".to_string(),
            Micro::Rpt(count) => format!("RPT {count}"),
            Micro::Li(index, count) => format!("LI{index} {count}"),
            Micro::Jni(index) => format!("JNI{index}"),
            Micro::Imatch => "IMATCH".to_string(),
            Micro::Mbgn => "MBGN".to_string(),
            Micro::Mend => "MEND".to_string(),
            Micro::Call(name) => format!("CALL {name}"),
            Micro::Ret => "RET".to_string(),
        }
    }
}

/// One emitted event: the resolved per-signal WFC array in declared
/// signal order, the waveform-table context, the micro-instruction, the
/// running address, and any labels waiting on this event.
#[derive(Debug, Clone)]
pub struct LoweredVector {
    pub addr: u32,
    pub micro: Micro,
    pub wft_name: Option<String>,
    pub wft_id: u8,
    pub wft_changed: bool,
    pub labels: Vec<String>,
    pub driven: Vec<char>,
}

/// Consumer of lowered vector events; implemented by the emitters.
pub trait PatternSink {
    fn vector(&mut self, vector: &LoweredVector) -> Result<(), ConvertError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    Loop,
    MatchLoop,
}

/// Loop-state stack entry; mirrors the LI/JNI register pair the target
/// hardware tracks per nesting level.
#[derive(Debug, Clone)]
#[allow(dead_code)]
struct LoopFrame {
    kind: LoopKind,
    count: u64,
    start_addr: u32,
}

/// How a loop body is lowered, decided from its direct statements.
enum BodyShape {
    /// Exactly one V: collapse to RPT/IMATCH without a loop frame.
    Single,
    /// Two direct Vs: open/close micro pair around the body.
    Pair,
    /// No direct V but nested loops only: open/close around the nest.
    NestedOnly,
}

pub struct Engine<'a> {
    tables: &'a SymbolTables,
    cancel: CancelFlag,
    state: Vec<char>,
    signal_names: Vec<String>,
    signal_index: HashMap<String, usize>,
    current_wft: Option<usize>,
    wft_changed: bool,
    loop_stack: Vec<LoopFrame>,
    addr: u32,
    emitted: u64,
    pending_labels: Vec<String>,
}

impl<'a> Engine<'a> {
    pub fn new(tables: &'a SymbolTables, cancel: CancelFlag) -> Self {
        let signal_names: Vec<String> =
            tables.signals.iter().map(|s| s.name.clone()).collect();
        let signal_index: HashMap<String, usize> = signal_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        let state: Vec<char> = tables
            .signals
            .iter()
            .map(|s| s.default_wfc.unwrap_or('X'))
            .collect();

        Self {
            tables,
            cancel,
            state,
            signal_names,
            signal_index,
            current_wft: None,
            wft_changed: false,
            loop_stack: Vec::new(),
            addr: 0,
            emitted: 0,
            pending_labels: Vec::new(),
        }
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn last_addr(&self) -> u32 {
        self.addr.saturating_sub(1)
    }

    #[cfg(test)]
    pub(crate) fn set_addr_for_tests(&mut self, addr: u32) {
        self.addr = addr;
    }

    /// Lower one pattern statement. The cancellation flag is checked at
    /// every statement boundary, including inlined and loop-body ones;
    /// a single vector is never interrupted.
    pub fn process(
        &mut self,
        stmt: &Stmt,
        sink: &mut dyn EventSink,
        out: &mut dyn PatternSink,
    ) -> Result<(), ConvertError> {
        if self.cancel.is_requested() {
            return Err(ConvertError::new(
                ConvertErrorKind::Cancelled,
                "Conversion cancelled",
                None,
            ));
        }

        match stmt {
            Stmt::Label { name } => {
                self.pending_labels.push(name.clone());
                Ok(())
            }
            Stmt::Waveform { name } => self.switch_wft(name),
            Stmt::Vector { assigns, offset } => self.lower_vector(assigns, *offset, None, out),
            Stmt::Stop => self.emit_sticky(Micro::Halt, out),
            Stmt::Goto { label } => self.emit_sticky(Micro::Jump(label.clone()), out),
            Stmt::IddqTestPoint => self.emit_sticky(Micro::Iddq, out),
            Stmt::Return => self.emit_sticky(Micro::Ret, out),
            Stmt::Call { name, offset } => self.inline(name, *offset, false, sink, out),
            Stmt::Macro { name, offset } => self.inline(name, *offset, true, sink, out),
            Stmt::Loop {
                count,
                body,
                offset,
            } => self.lower_loop(LoopKind::Loop, *count, body, *offset, sink, out),
            Stmt::MatchLoop {
                count,
                body,
                offset,
            } => self.lower_loop(LoopKind::MatchLoop, *count, body, *offset, sink, out),
        }
    }

    fn switch_wft(&mut self, name: &str) -> Result<(), ConvertError> {
        match self.tables.wfts.id(name) {
            Some(id) => {
                self.current_wft = Some(id);
                self.wft_changed = true;
                Ok(())
            }
            None => Err(ConvertError::new(
                ConvertErrorKind::SymbolTable,
                "W names an undeclared waveform table",
                Some(name),
            )),
        }
    }

    /// Splice a procedure or macro body into the statement stream. The
    /// waveform-table context flows across the boundary in both
    /// directions. Recursion is impossible here; the symbol-table build
    /// refused cyclic definitions.
    fn inline(
        &mut self,
        name: &str,
        offset: usize,
        is_macro: bool,
        sink: &mut dyn EventSink,
        out: &mut dyn PatternSink,
    ) -> Result<(), ConvertError> {
        let table = if is_macro {
            &self.tables.macros
        } else {
            &self.tables.procedures
        };
        let Some(body) = table.get(name) else {
            let what = if is_macro { "Macro" } else { "Procedure" };
            sink.emit(Event::Warning {
                offset: Some(offset),
                message: format!("{what} '{name}' not found; emitting CALL"),
            });
            return self.emit_sticky(Micro::Call(name.to_string()), out);
        };
        let body = body.clone();
        for stmt in body.iter() {
            self.process(stmt, sink, out)?;
        }
        Ok(())
    }

    fn lower_loop(
        &mut self,
        kind: LoopKind,
        count: u64,
        body: &[Stmt],
        offset: usize,
        sink: &mut dyn EventSink,
        out: &mut dyn PatternSink,
    ) -> Result<(), ConvertError> {
        let shape = self.classify_body(body, offset)?;

        match shape {
            BodyShape::Single => {
                let single = match kind {
                    LoopKind::Loop => Micro::Rpt(count),
                    LoopKind::MatchLoop => Micro::Imatch,
                };
                for stmt in body {
                    match stmt {
                        Stmt::Vector { assigns, offset } => {
                            self.lower_vector(assigns, *offset, Some(single.clone()), out)?;
                        }
                        other => self.process(other, sink, out)?,
                    }
                }
                Ok(())
            }
            BodyShape::Pair | BodyShape::NestedOnly => {
                let depth = self.loop_stack.len();
                if depth >= MAX_LOOP_DEPTH {
                    return Err(ConvertError::new(
                        ConvertErrorKind::Unsupported,
                        "Loop nesting exceeds the supported depth of 4",
                        None,
                    )
                    .with_offset(offset));
                }
                let index = depth as u8;
                self.loop_stack.push(LoopFrame {
                    kind,
                    count,
                    start_addr: self.addr,
                });

                let open = match kind {
                    LoopKind::Loop => Micro::Li(index, count),
                    LoopKind::MatchLoop => Micro::Mbgn,
                };
                self.emit_sticky(open, out)?;

                let close = match kind {
                    LoopKind::Loop => Micro::Jni(index),
                    LoopKind::MatchLoop => Micro::Mend,
                };
                let last_v = body
                    .iter()
                    .rposition(|stmt| matches!(stmt, Stmt::Vector { .. }));

                for (i, stmt) in body.iter().enumerate() {
                    if Some(i) == last_v {
                        if let Stmt::Vector { assigns, offset } = stmt {
                            self.lower_vector(assigns, *offset, Some(close.clone()), out)?;
                            continue;
                        }
                    }
                    self.process(stmt, sink, out)?;
                }
                if last_v.is_none() {
                    self.emit_sticky(close, out)?;
                }

                self.loop_stack.pop();
                Ok(())
            }
        }
    }

    /// Classify a loop body by its direct statements. One V collapses,
    /// two get an open/close pair, a pure nest of loops gets the pair
    /// around it; anything else is outside the documented policy.
    fn classify_body(&self, body: &[Stmt], offset: usize) -> Result<BodyShape, ConvertError> {
        let mut v_count = 0usize;
        let mut loop_count = 0usize;
        let mut other = 0usize;
        for stmt in body {
            match stmt {
                Stmt::Vector { .. } => v_count += 1,
                Stmt::Loop { .. } | Stmt::MatchLoop { .. } => loop_count += 1,
                Stmt::Label { .. } | Stmt::Waveform { .. } => {}
                _ => other += 1,
            }
        }

        match v_count {
            1 if loop_count == 0 && other == 0 => Ok(BodyShape::Single),
            2 if other == 0 => Ok(BodyShape::Pair),
            0 if loop_count > 0 && other == 0 => Ok(BodyShape::NestedOnly),
            _ => Err(ConvertError::new(
                ConvertErrorKind::Unsupported,
                "Loop body must hold 1 or 2 V statements or nested loops only",
                None,
            )
            .with_offset(offset)),
        }
    }

    /// Expand one V statement into the sticky per-signal state and emit.
    fn lower_vector(
        &mut self,
        assigns: &[VecAssign],
        offset: usize,
        micro: Option<Micro>,
        out: &mut dyn PatternSink,
    ) -> Result<(), ConvertError> {
        if self.current_wft.is_none() {
            return Err(ConvertError::new(
                ConvertErrorKind::WaveformContext,
                "V before the first W: no waveform table selected",
                None,
            )
            .with_offset(offset));
        }

        for assign in assigns {
            let signals = self.tables.resolve_target(&assign.target).ok_or_else(|| {
                ConvertError::new(
                    ConvertErrorKind::SymbolTable,
                    "Vector assigns to an undeclared signal or group",
                    Some(&assign.target),
                )
                .with_offset(offset)
            })?;

            let wfcs = expand_pieces(&assign.pieces);
            if wfcs.len() != signals.len() {
                let detail = format!(
                    "{} needs {} characters, got {}",
                    assign.target,
                    signals.len(),
                    wfcs.len()
                );
                return Err(ConvertError::new(
                    ConvertErrorKind::VectorWidth,
                    "Vector data width does not match the signal list",
                    Some(&detail),
                )
                .with_offset(offset));
            }

            for (name, wfc) in signals.iter().zip(wfcs) {
                if let Some(&i) = self.signal_index.get(name) {
                    self.state[i] = wfc;
                }
            }
        }

        self.emit(micro.unwrap_or(Micro::Adv), out)
    }

    /// Emit a micro-only event carrying the current sticky state.
    fn emit_sticky(
        &mut self,
        micro: Micro,
        out: &mut dyn PatternSink,
    ) -> Result<(), ConvertError> {
        self.emit(micro, out)
    }

    fn emit(&mut self, micro: Micro, out: &mut dyn PatternSink) -> Result<(), ConvertError> {
        if self.addr > MAX_ADDRESS {
            return Err(ConvertError::new(
                ConvertErrorKind::AddressOverflow,
                "Vector address exceeds 0xFFFFFF",
                None,
            ));
        }

        let micro = if self.addr == 0 && micro.is_adv() {
            Micro::Mssa
        } else {
            micro
        };

        let table = self.current_wft.and_then(|id| self.tables.wfts.by_id(id));
        let wft_name = table.map(|t| t.name.clone());
        let wft_id = self.current_wft.unwrap_or(0) as u8;

        let driven: Vec<char> = self
            .signal_names
            .iter()
            .zip(&self.state)
            .map(|(name, &raw)| match table {
                Some(table) => table.drive(name, raw),
                None => raw,
            })
            .collect();

        let vector = LoweredVector {
            addr: self.addr,
            micro,
            wft_name,
            wft_id,
            wft_changed: std::mem::take(&mut self.wft_changed),
            labels: std::mem::take(&mut self.pending_labels),
            driven,
        };
        out.vector(&vector)?;

        self.addr += 1;
        self.emitted += 1;
        Ok(())
    }
}

/// Expand `\rN C` repeats in place and flatten the pieces to characters.
pub fn expand_pieces(pieces: &[WfcPiece]) -> Vec<char> {
    let mut out = Vec::new();
    for piece in pieces {
        match piece {
            WfcPiece::Chars(text) => out.extend(text.chars()),
            WfcPiece::Repeat { count, wfc } => {
                out.extend(std::iter::repeat(*wfc).take(*count as usize));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::CollectSink;
    use crate::core::parser::Parser;

    /// Collects lowered vectors for assertions.
    #[derive(Default)]
    struct VecOut {
        vectors: Vec<LoweredVector>,
    }

    impl PatternSink for VecOut {
        fn vector(&mut self, vector: &LoweredVector) -> Result<(), ConvertError> {
            self.vectors.push(vector.clone());
            Ok(())
        }
    }

    const PREAMBLE: &str = "STIL 1.0;\nSignals { a In; b0 In; b1 In; b2 In; b3 In; }\n\
        SignalGroups { bus = 'b0 + b1 + b2 + b3'; }\n\
        Timing { WaveformTable w { Period '100ns'; Waveforms { a { 01 { '0ns' D/U; } } \
        bus { 01 { '0ns' D/U; } } } } }\n";

    fn run(pattern: &str) -> Result<(Vec<LoweredVector>, CollectSink), ConvertError> {
        let src = format!("{PREAMBLE}Pattern p {{\n{pattern}\n}}\n");
        let mut sink = CollectSink::new();
        let mut tables = SymbolTables::new();
        let mut parser = Parser::new(src.as_bytes(), &[]);
        parser.parse_header(&mut tables, &mut sink)?;
        tables.finalize()?;

        let mut out = VecOut::default();
        let mut engine = Engine::new(&tables, CancelFlag::new());
        while let Some(stmt) = parser.next_pattern_stmt(&mut sink)? {
            engine.process(&stmt, &mut sink, &mut out)?;
        }
        Ok((out.vectors, sink))
    }

    fn micros(vectors: &[LoweredVector]) -> Vec<String> {
        vectors.iter().map(|v| v.micro.format()).collect()
    }

    #[test]
    fn minimal_pattern_assigns_mssa_adv_halt() {
        let (vectors, _) = run("W w; V { a = 0; } V { a = 1; } Stop;").expect("lower");
        assert_eq!(micros(&vectors), vec!["MSSA", "ADV", "HALT"]);
        assert_eq!(vectors[0].driven[0], 'D');
        assert_eq!(vectors[1].driven[0], 'U');
        // HALT repeats the sticky state.
        assert_eq!(vectors[2].driven[0], 'U');
        let addrs: Vec<u32> = vectors.iter().map(|v| v.addr).collect();
        assert_eq!(addrs, vec![0, 1, 2]);
    }

    #[test]
    fn vector_before_w_is_refused() {
        let err = run("V { a = 0; }").expect_err("no waveform context");
        assert_eq!(err.kind(), ConvertErrorKind::WaveformContext);
    }

    #[test]
    fn repeat_expansion_fills_group() {
        let (vectors, _) = run("W w; V { bus = \\r4 0; }").expect("lower");
        assert_eq!(vectors.len(), 1);
        for i in 1..=4 {
            assert_eq!(vectors[0].driven[i], 'D');
        }
    }

    #[test]
    fn width_mismatch_is_refused() {
        let err = run("W w; V { bus = 000; }").expect_err("width");
        assert_eq!(err.kind(), ConvertErrorKind::VectorWidth);
    }

    #[test]
    fn single_v_loop_collapses_to_rpt() {
        let (vectors, _) = run("W w; Loop 50 { V { a = 1; } }").expect("lower");
        assert_eq!(micros(&vectors), vec!["RPT 50"]);
        assert_eq!(vectors[0].addr, 0);
    }

    #[test]
    fn two_v_loop_opens_and_closes() {
        let (vectors, _) = run("W w; Loop 3 { V { a = 0; } V { a = 1; } }").expect("lower");
        assert_eq!(micros(&vectors), vec!["LI0 3", "ADV", "JNI0"]);
        let addrs: Vec<u32> = vectors.iter().map(|v| v.addr).collect();
        assert_eq!(addrs, vec![0, 1, 2]);
    }

    #[test]
    fn nested_loops_use_rising_indices() {
        let (vectors, _) =
            run("W w; Loop 2 { Loop 2 { V { a = 0; } V { a = 1; } } }").expect("lower");
        assert_eq!(
            micros(&vectors),
            vec!["LI0 2", "LI1 2", "ADV", "JNI1", "JNI0"]
        );
    }

    #[test]
    fn loop_depth_boundary() {
        let nest4 = "W w; Loop 2 { Loop 2 { Loop 2 { Loop 2 { V { a = 0; } V { a = 1; } } } } }";
        let (vectors, _) = run(nest4).expect("depth 4 is supported");
        assert!(micros(&vectors).contains(&"LI3 2".to_string()));

        let nest5 = "W w; Loop 2 { Loop 2 { Loop 2 { Loop 2 { Loop 2 { \
                     V { a = 0; } V { a = 1; } } } } } }";
        let err = run(nest5).expect_err("depth 5 fails");
        assert_eq!(err.kind(), ConvertErrorKind::Unsupported);
    }

    #[test]
    fn three_v_loop_is_unsupported() {
        let err =
            run("W w; Loop 2 { V { a = 0; } V { a = 1; } V { a = 0; } }").expect_err("3 Vs");
        assert_eq!(err.kind(), ConvertErrorKind::Unsupported);
    }

    #[test]
    fn empty_loop_is_unsupported() {
        let err = run("W w; Loop 2 { }").expect_err("empty body");
        assert_eq!(err.kind(), ConvertErrorKind::Unsupported);
    }

    #[test]
    fn single_v_matchloop_is_imatch() {
        let (vectors, _) = run("W w; MatchLoop 10 { V { a = 1; } }").expect("lower");
        assert_eq!(micros(&vectors), vec!["IMATCH"]);
    }

    #[test]
    fn multi_v_matchloop_brackets_body() {
        let (vectors, _) =
            run("W w; MatchLoop 10 { V { a = 0; } V { a = 1; } }").expect("lower");
        assert_eq!(micros(&vectors), vec!["MBGN", "ADV", "MEND"]);
    }

    #[test]
    fn stickiness_carries_unassigned_signals() {
        let (vectors, _) =
            run("W w; V { a = 1; bus = 0000; } V { bus = 1111; }").expect("lower");
        // `a` was not assigned in the second vector.
        assert_eq!(vectors[1].driven[0], 'U');
    }

    #[test]
    fn unknown_procedure_becomes_call_with_warning() {
        let (vectors, sink) = run("W w; V { a = 0; } Call nowhere; Stop;").expect("lower");
        assert_eq!(micros(&vectors), vec!["MSSA", "CALL nowhere", "HALT"]);
        assert_eq!(sink.warnings().count(), 1);
    }

    #[test]
    fn goto_and_iddq_emit_micro_only_events() {
        let (vectors, _) =
            run("W w; V { a = 0; } Goto top; IddqTestPoint;").expect("lower");
        assert_eq!(micros(&vectors), vec!["MSSA", "JUMP top", "IDDQ"]);
    }

    #[test]
    fn labels_attach_to_next_event() {
        let (vectors, _) = run("W w; top: V { a = 0; }").expect("lower");
        assert_eq!(vectors[0].labels, vec!["top".to_string()]);
    }

    #[test]
    fn consecutive_labels_accumulate_in_order() {
        let (vectors, _) = run("W w; one: two: V { a = 0; }").expect("lower");
        assert_eq!(vectors[0].labels, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn procedure_inlining_matches_direct_text() {
        let src_inline = "W w; V { a = 0; } V { a = 1; } Stop;";
        let src_call = "Call p2; Stop;";
        let (direct, _) = run(src_inline).expect("direct");

        let full = format!(
            "{PREAMBLE}Procedures {{ p2 {{ W w; V {{ a = 0; }} V {{ a = 1; }} }} }}\n\
             Pattern p {{ {src_call} }}"
        );
        let mut sink = CollectSink::new();
        let mut tables = SymbolTables::new();
        let mut parser = Parser::new(full.as_bytes(), &[]);
        parser.parse_header(&mut tables, &mut sink).expect("header");
        tables.finalize().expect("finalize");
        let mut out = VecOut::default();
        let mut engine = Engine::new(&tables, CancelFlag::new());
        while let Some(stmt) = parser.next_pattern_stmt(&mut sink).expect("stmt") {
            engine.process(&stmt, &mut sink, &mut out).expect("lower");
        }

        assert_eq!(micros(&direct), micros(&out.vectors));
        for (a, b) in direct.iter().zip(&out.vectors) {
            assert_eq!(a.driven, b.driven);
            assert_eq!(a.addr, b.addr);
        }
    }

    #[test]
    fn address_overflow_boundary() {
        let src = format!("{PREAMBLE}Pattern p {{ W w; }}");
        let mut sink = CollectSink::new();
        let mut tables = SymbolTables::new();
        let mut parser = Parser::new(src.as_bytes(), &[]);
        parser.parse_header(&mut tables, &mut sink).expect("header");
        tables.finalize().expect("finalize");

        let mut out = VecOut::default();
        let mut engine = Engine::new(&tables, CancelFlag::new());
        let w = parser
            .next_pattern_stmt(&mut sink)
            .expect("stmt")
            .expect("some");
        engine.process(&w, &mut sink, &mut out).expect("W");

        engine.set_addr_for_tests(MAX_ADDRESS);
        let vector = Stmt::Vector {
            assigns: vec![],
            offset: 0,
        };
        engine
            .process(&vector, &mut sink, &mut out)
            .expect("address 0xFFFFFF is emittable");
        assert_eq!(out.vectors.last().map(|v| v.addr), Some(MAX_ADDRESS));

        let err = engine
            .process(&vector, &mut sink, &mut out)
            .expect_err("address 0x1000000 overflows");
        assert_eq!(err.kind(), ConvertErrorKind::AddressOverflow);
    }

    #[test]
    fn cancellation_stops_at_statement_boundary() {
        let src = format!("{PREAMBLE}Pattern p {{ W w; V {{ a = 0; }} V {{ a = 1; }} }}");
        let mut sink = CollectSink::new();
        let mut tables = SymbolTables::new();
        let mut parser = Parser::new(src.as_bytes(), &[]);
        parser.parse_header(&mut tables, &mut sink).expect("header");
        tables.finalize().expect("finalize");

        let cancel = CancelFlag::new();
        let mut out = VecOut::default();
        let mut engine = Engine::new(&tables, cancel.clone());

        let first = parser
            .next_pattern_stmt(&mut sink)
            .expect("stmt")
            .expect("some");
        engine.process(&first, &mut sink, &mut out).expect("W");
        cancel.request();
        let second = parser
            .next_pattern_stmt(&mut sink)
            .expect("stmt")
            .expect("some");
        let err = engine.process(&second, &mut sink, &mut out).expect_err("cancelled");
        assert_eq!(err.kind(), ConvertErrorKind::Cancelled);
    }
}
