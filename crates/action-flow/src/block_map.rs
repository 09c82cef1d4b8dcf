//! Jump tables for block constructs, built once per run.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::types::{Action, ActionKind, BlockKind};

/// Structural irregularities found while building the map.
///
/// They never change execution: unmatched constructs fall through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructureDiagnostic {
    /// `end` with no open block
    UnmatchedEnd { index: usize },
    /// `else` with no open `if` lacking an `else`
    OrphanElse { index: usize },
    /// `else` bound to an `if` across another open block
    ElseCrossesBlock { else_index: usize, if_index: usize },
    /// Block start never closed by an `end`
    UnclosedBlock { index: usize, block: BlockKind },
}

impl fmt::Display for StructureDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructureDiagnostic::UnmatchedEnd { index } => {
                write!(f, "end at {index} has no matching block start")
            }
            StructureDiagnostic::OrphanElse { index } => {
                write!(f, "else at {index} has no enclosing if")
            }
            StructureDiagnostic::ElseCrossesBlock {
                else_index,
                if_index,
            } => write!(
                f,
                "else at {else_index} binds to if at {if_index} across an inner open block"
            ),
            StructureDiagnostic::UnclosedBlock { index, block } => {
                write!(f, "{block:?} at {index} is never closed")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlockMap {
    start_to_end: BTreeMap<usize, usize>,
    start_to_else: BTreeMap<usize, usize>,
    else_to_end: BTreeMap<usize, usize>,
    end_to_start: BTreeMap<usize, usize>,
    diagnostics: Vec<StructureDiagnostic>,
}

struct OpenBlock {
    kind: BlockKind,
    index: usize,
}

impl BlockMap {
    /// Single left-to-right stack-matching pass.
    pub fn build(actions: &[Action]) -> Self {
        let mut map = BlockMap::default();
        let mut stack: Vec<OpenBlock> = Vec::new();

        for (index, action) in actions.iter().enumerate() {
            if let Some(kind) = action.kind.block_start() {
                stack.push(OpenBlock { kind, index });
                continue;
            }
            match action.kind {
                ActionKind::Else => {
                    let mut crossed = false;
                    let target = stack.iter().rev().find_map(|open| {
                        if open.kind == BlockKind::If && !map.start_to_else.contains_key(&open.index)
                        {
                            Some(open.index)
                        } else {
                            crossed = true;
                            None
                        }
                    });
                    match target {
                        Some(if_index) => {
                            map.start_to_else.insert(if_index, index);
                            if crossed {
                                map.diagnostics.push(StructureDiagnostic::ElseCrossesBlock {
                                    else_index: index,
                                    if_index,
                                });
                            }
                        }
                        None => map
                            .diagnostics
                            .push(StructureDiagnostic::OrphanElse { index }),
                    }
                }
                ActionKind::End => match stack.pop() {
                    Some(open) => {
                        map.start_to_end.insert(open.index, index);
                        map.end_to_start.insert(index, open.index);
                        if let Some(&else_index) = map.start_to_else.get(&open.index) {
                            map.else_to_end.insert(else_index, index);
                        }
                    }
                    None => map
                        .diagnostics
                        .push(StructureDiagnostic::UnmatchedEnd { index }),
                },
                _ => {}
            }
        }

        for open in stack {
            map.diagnostics.push(StructureDiagnostic::UnclosedBlock {
                index: open.index,
                block: open.kind,
            });
        }
        map
    }

    /// Matching `end` of a block start
    pub fn end_of(&self, start: usize) -> Option<usize> {
        self.start_to_end.get(&start).copied()
    }

    /// `else` recorded for an `if`
    pub fn else_of(&self, start: usize) -> Option<usize> {
        self.start_to_else.get(&start).copied()
    }

    /// `end` closing the block an `else` belongs to
    pub fn end_of_else(&self, else_index: usize) -> Option<usize> {
        self.else_to_end.get(&else_index).copied()
    }

    /// Block start matched by an `end`
    pub fn start_of(&self, end: usize) -> Option<usize> {
        self.end_to_start.get(&end).copied()
    }

    pub fn diagnostics(&self) -> &[StructureDiagnostic] {
        &self.diagnostics
    }

    /// Number of matched blocks
    pub fn block_count(&self) -> usize {
        self.start_to_end.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn program(types: &[&str]) -> Vec<Action> {
        types
            .iter()
            .map(|ty| {
                let raw: Value = match *ty {
                    "if" | "while" => json!({"type": ty, "value": "true"}),
                    "repeat" => json!({"type": "repeat", "value": 1}),
                    "foreach" => json!({"type": "foreach", "value": "{$items}"}),
                    "wait" => json!({"type": "wait", "value": 1}),
                    other => json!({"type": other}),
                };
                serde_json::from_value(raw).unwrap()
            })
            .collect()
    }

    #[test]
    fn if_else_end_triple() {
        let map = BlockMap::build(&program(&["if", "wait", "else", "wait", "end"]));
        assert_eq!(map.end_of(0), Some(4));
        assert_eq!(map.else_of(0), Some(2));
        assert_eq!(map.end_of_else(2), Some(4));
        assert_eq!(map.start_of(4), Some(0));
        assert!(map.diagnostics().is_empty());
    }

    #[test]
    fn nested_blocks_form_a_bijection() {
        let actions = program(&[
            "while", "repeat", "wait", "end", "foreach", "if", "end", "end", "end", "on_error",
            "wait", "end",
        ]);
        let map = BlockMap::build(&actions);
        let expected = [(0, 8), (1, 3), (4, 7), (5, 6), (9, 11)];
        assert_eq!(map.block_count(), expected.len());
        for (start, end) in expected {
            assert_eq!(map.end_of(start), Some(end));
            assert_eq!(map.start_of(end), Some(start));
        }
        assert!(map.diagnostics().is_empty());
    }

    #[test]
    fn else_binds_to_nearest_open_if() {
        let map = BlockMap::build(&program(&["if", "if", "else", "end", "else", "end"]));
        assert_eq!(map.else_of(1), Some(2));
        assert_eq!(map.else_of(0), Some(4));
        assert_eq!(map.end_of_else(2), Some(3));
        assert_eq!(map.end_of_else(4), Some(5));
    }

    #[test]
    fn malformed_nesting_is_reported_not_rejected() {
        let map = BlockMap::build(&program(&["end", "else", "if", "while", "else", "end"]));
        assert_eq!(map.start_of(0), None);
        assert_eq!(map.else_of(2), Some(4));
        assert_eq!(map.end_of(3), Some(5));
        assert_eq!(map.end_of(2), None);
        assert_eq!(
            map.diagnostics(),
            &[
                StructureDiagnostic::UnmatchedEnd { index: 0 },
                StructureDiagnostic::OrphanElse { index: 1 },
                StructureDiagnostic::ElseCrossesBlock {
                    else_index: 4,
                    if_index: 2
                },
                StructureDiagnostic::UnclosedBlock {
                    index: 2,
                    block: BlockKind::If
                },
            ]
        );
    }
}
