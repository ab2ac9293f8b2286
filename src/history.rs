use std::collections::VecDeque;

use crate::geometry::Outline;
use crate::selection::{Selection, SelectionData};

// ============================================================================
// COMMAND TRAIT
// ============================================================================

/// Trait for undoable/redoable selection edits.
pub trait Command: Send + Sync {
    fn undo(&self, selection: &mut Selection);
    fn redo(&self, selection: &mut Selection);
    fn description(&self) -> String;
    fn memory_size(&self) -> usize;
}

// ============================================================================
// SELECTION COMMAND - before/after snapshot of the whole selection state
// ============================================================================

/// Stores the selection before and after an edit.
pub struct SelectionCommand {
    description: String,
    before: SelectionData,
    after: Option<SelectionData>,
}

impl SelectionCommand {
    /// Create before performing the edit. Call `set_after()` once it is done.
    pub fn new(description: impl Into<String>, selection: &Selection) -> Self {
        Self {
            description: description.into(),
            before: selection.save(),
            after: None,
        }
    }

    /// Capture the "after" state.
    pub fn set_after(&mut self, selection: &Selection) {
        self.after = Some(selection.save());
    }

    /// Run `edit` against `selection` and record it as one command.
    pub fn record(
        description: impl Into<String>,
        selection: &mut Selection,
        edit: impl FnOnce(&mut Selection),
    ) -> Self {
        let mut cmd = Self::new(description, selection);
        edit(selection);
        cmd.set_after(selection);
        cmd
    }

    pub fn before(&self) -> &SelectionData {
        &self.before
    }
}

fn outline_bytes(o: &Outline) -> usize {
    o.point_count() * std::mem::size_of::<[f64; 2]>() + o.figure_count() * std::mem::size_of::<Vec<u8>>()
}

fn snapshot_bytes(data: &SelectionData) -> usize {
    std::mem::size_of::<SelectionData>() + outline_bytes(&data.base_path) + outline_bytes(&data.continuation)
}

impl Command for SelectionCommand {
    fn undo(&self, selection: &mut Selection) {
        selection.restore(&self.before);
    }

    fn redo(&self, selection: &mut Selection) {
        if let Some(ref after) = self.after {
            selection.restore(after);
        }
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn memory_size(&self) -> usize {
        snapshot_bytes(&self.before) + self.after.as_ref().map_or(0, snapshot_bytes)
    }
}

// ============================================================================
// HISTORY MANAGER - undo/redo stacks with count and memory limits
// ============================================================================

pub struct HistoryManager {
    undo_stack: VecDeque<Box<dyn Command>>,
    redo_stack: VecDeque<Box<dyn Command>>,
    max_history_size: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across both stacks.
    total_memory: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(50)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size,
            max_memory_bytes: Some(16 * 1024 * 1024),
            total_memory: 0,
        }
    }

    pub fn set_memory_limit(&mut self, max_bytes: Option<usize>) {
        self.max_memory_bytes = max_bytes;
        self.prune();
    }

    pub fn push(&mut self, command: Box<dyn Command>) {
        for cmd in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(cmd.memory_size());
        }

        self.total_memory += command.memory_size();
        self.undo_stack.push_back(command);
        self.prune();
    }

    /// Record `edit` as a [`SelectionCommand`] and push it.
    pub fn record(
        &mut self,
        description: impl Into<String>,
        selection: &mut Selection,
        edit: impl FnOnce(&mut Selection),
    ) {
        let cmd = SelectionCommand::record(description, selection, edit);
        self.push(Box::new(cmd));
    }

    pub fn undo(&mut self, selection: &mut Selection) -> Option<String> {
        let command = self.undo_stack.pop_back()?;
        let description = command.description();
        command.undo(selection);
        self.redo_stack.push_back(command);
        Some(description)
    }

    pub fn redo(&mut self, selection: &mut Selection) -> Option<String> {
        let command = self.redo_stack.pop_back()?;
        let description = command.description();
        command.redo(selection);
        self.undo_stack.push_back(command);
        Some(description)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.back().map(|c| c.description())
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.back().map(|c| c.description())
    }

    /// All undo descriptions, most recent first.
    pub fn undo_history(&self) -> Vec<String> {
        self.undo_stack.iter().rev().map(|c| c.description()).collect()
    }

    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_history_size {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            }
        }

        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.undo_stack.len() > 1 {
                if let Some(removed) = self.undo_stack.pop_front() {
                    self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
    }

    /// Undo `steps` commands (0 = nothing).
    pub fn undo_to(&mut self, steps: usize, selection: &mut Selection) {
        for _ in 0..steps {
            if self.undo(selection).is_none() {
                break;
            }
        }
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}
