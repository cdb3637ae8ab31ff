// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Header symbol tables: signals, signal groups, procedures and macros.
//!
//! The tables are filled during the header phase and frozen before any
//! pattern statement is lowered; after `finalize` they are read-only.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::core::error::{ConvertError, ConvertErrorKind};
use crate::core::parser::Stmt;
use crate::core::timing::WftTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    InOut,
    Supply,
    Pseudo,
}

impl Direction {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "In" => Some(Direction::In),
            "Out" => Some(Direction::Out),
            "InOut" => Some(Direction::InOut),
            "Supply" => Some(Direction::Supply),
            "Pseudo" => Some(Direction::Pseudo),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::In => "In",
            Direction::Out => "Out",
            Direction::InOut => "InOut",
            Direction::Supply => "Supply",
            Direction::Pseudo => "Pseudo",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub name: String,
    pub direction: Direction,
    pub default_wfc: Option<char>,
}

/// Declared signals in insertion order with a name index.
#[derive(Debug, Default)]
pub struct SignalTable {
    signals: Vec<Signal>,
    index: HashMap<String, usize>,
}

impl SignalTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, signal: Signal) -> Result<(), ConvertError> {
        if self.index.contains_key(&signal.name) {
            return Err(ConvertError::new(
                ConvertErrorKind::SymbolTable,
                "Signal declared more than once",
                Some(&signal.name),
            ));
        }
        self.index.insert(signal.name.clone(), self.signals.len());
        self.signals.push(signal);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Signal> {
        self.index.get(name).map(|&i| &self.signals[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Signal> {
        self.signals.iter()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

/// Signal groups. Member lists may name other groups; `resolve_all`
/// flattens every group to signal names once, refusing cycles.
#[derive(Debug, Default)]
pub struct GroupTable {
    members: HashMap<String, Vec<String>>,
    order: Vec<String>,
    flat: HashMap<String, Arc<Vec<String>>>,
}

impl GroupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, members: Vec<String>) -> Result<(), ConvertError> {
        if self.members.contains_key(name) {
            return Err(ConvertError::new(
                ConvertErrorKind::SymbolTable,
                "Signal group declared more than once",
                Some(name),
            ));
        }
        self.members.insert(name.to_string(), members);
        self.order.push(name.to_string());
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.order.iter()
    }

    pub fn members(&self, name: &str) -> Option<&[String]> {
        self.members.get(name).map(|m| m.as_slice())
    }

    /// Flattened signal list; valid after `resolve_all`.
    pub fn flat(&self, name: &str) -> Option<&Arc<Vec<String>>> {
        self.flat.get(name)
    }

    pub fn resolve_all(&mut self, signals: &SignalTable) -> Result<(), ConvertError> {
        let order = self.order.clone();
        for name in &order {
            let mut visiting = Vec::new();
            let flat = self.flatten(name, signals, &mut visiting)?;
            self.flat.insert(name.clone(), Arc::new(flat));
        }
        Ok(())
    }

    fn flatten(
        &self,
        name: &str,
        signals: &SignalTable,
        visiting: &mut Vec<String>,
    ) -> Result<Vec<String>, ConvertError> {
        if visiting.iter().any(|seen| seen == name) {
            return Err(ConvertError::new(
                ConvertErrorKind::SymbolTable,
                "Signal group cycle",
                Some(name),
            ));
        }
        if let Some(done) = self.flat.get(name) {
            return Ok(done.as_ref().clone());
        }
        visiting.push(name.to_string());

        let members = self.members.get(name).ok_or_else(|| {
            ConvertError::new(
                ConvertErrorKind::SymbolTable,
                "Unknown signal group",
                Some(name),
            )
        })?;

        let mut flat = Vec::with_capacity(members.len());
        for member in members {
            if signals.contains(member) {
                flat.push(member.clone());
            } else if self.members.contains_key(member) {
                flat.extend(self.flatten(member, signals, visiting)?);
            } else {
                return Err(ConvertError::new(
                    ConvertErrorKind::SymbolTable,
                    "Signal group member is neither a signal nor a group",
                    Some(member),
                ));
            }
        }

        visiting.pop();
        Ok(flat)
    }
}

/// Named statement lists shared by Procedures and MacroDefs.
#[derive(Debug, Default)]
pub struct ProcedureTable {
    defs: HashMap<String, Arc<Vec<Stmt>>>,
    order: Vec<String>,
}

impl ProcedureTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, body: Vec<Stmt>) -> Result<(), ConvertError> {
        if self.defs.contains_key(name) {
            return Err(ConvertError::new(
                ConvertErrorKind::SymbolTable,
                "Procedure declared more than once",
                Some(name),
            ));
        }
        self.defs.insert(name.to_string(), Arc::new(body));
        self.order.push(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Vec<Stmt>>> {
        self.defs.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}

/// All header tables. Frozen after `finalize`.
#[derive(Debug, Default)]
pub struct SymbolTables {
    pub signals: SignalTable,
    pub groups: GroupTable,
    pub wfts: WftTable,
    pub procedures: ProcedureTable,
    pub macros: ProcedureTable,
}

impl SymbolTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten groups, expand waveform tables, and refuse recursive
    /// procedure/macro definitions so the lowering stage sees a DAG.
    pub fn finalize(&mut self) -> Result<(), ConvertError> {
        self.groups.resolve_all(&self.signals)?;
        self.wfts.finalize(&self.groups)?;
        check_inlining_cycles(&self.procedures, &self.macros)?;
        Ok(())
    }

    /// Resolve a vector assignment target to its flat signal list.
    pub fn resolve_target(&self, name: &str) -> Option<Vec<String>> {
        if let Some(flat) = self.groups.flat(name) {
            return Some(flat.as_ref().clone());
        }
        if self.signals.contains(name) {
            return Some(vec![name.to_string()]);
        }
        None
    }
}

/// A node in the inlining reference graph: procedure or macro by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InlineNode {
    is_macro: bool,
    name: String,
}

/// DFS over the Call/Macro reference graph with a visiting set. A cycle
/// (including self-reference) is a malformed symbol table.
fn check_inlining_cycles(
    procedures: &ProcedureTable,
    macros: &ProcedureTable,
) -> Result<(), ConvertError> {
    let mut done: HashSet<InlineNode> = HashSet::new();
    let roots: Vec<InlineNode> = procedures
        .names()
        .map(|name| InlineNode {
            is_macro: false,
            name: name.clone(),
        })
        .chain(macros.names().map(|name| InlineNode {
            is_macro: true,
            name: name.clone(),
        }))
        .collect();

    for root in roots {
        let mut visiting = Vec::new();
        visit(&root, procedures, macros, &mut visiting, &mut done)?;
    }
    Ok(())
}

fn visit(
    node: &InlineNode,
    procedures: &ProcedureTable,
    macros: &ProcedureTable,
    visiting: &mut Vec<InlineNode>,
    done: &mut HashSet<InlineNode>,
) -> Result<(), ConvertError> {
    if done.contains(node) {
        return Ok(());
    }
    if visiting.contains(node) {
        return Err(ConvertError::new(
            ConvertErrorKind::SymbolTable,
            "Recursive procedure or macro definition",
            Some(&node.name),
        ));
    }
    let body = if node.is_macro {
        macros.get(&node.name)
    } else {
        procedures.get(&node.name)
    };
    let Some(body) = body else {
        // Unknown callee; the lowering engine reports it when reached.
        return Ok(());
    };

    visiting.push(node.clone());
    for (is_macro, name) in collect_callees(body) {
        let next = InlineNode { is_macro, name };
        visit(&next, procedures, macros, visiting, done)?;
    }
    visiting.pop();
    done.insert(node.clone());
    Ok(())
}

fn collect_callees(body: &[Stmt]) -> Vec<(bool, String)> {
    let mut out = Vec::new();
    for stmt in body {
        match stmt {
            Stmt::Call { name, .. } => out.push((false, name.clone())),
            Stmt::Macro { name, .. } => out.push((true, name.clone())),
            Stmt::Loop { body, .. } | Stmt::MatchLoop { body, .. } => {
                out.extend(collect_callees(body));
            }
            _ => {}
        }
    }
    out
}
