//! Breakpoints, single-step mode, and the enable flag (spec §4.10).
//! `step` consults [`Debugger::has_breakpoint`] before fetching and
//! [`Debugger::single_step`] after executing, both surfaced as
//! [`crate::error::StepOutcome`] variants rather than faults.

use utils::collections::SlotTable;

pub const MAX_BREAKPOINTS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TooManyBreakpoints;

pub struct Debugger {
    enabled: bool,
    single_step: bool,
    breakpoints: SlotTable<u32, MAX_BREAKPOINTS>,
}

impl Debugger {
    pub fn new() -> Self {
        Self {
            enabled: false,
            single_step: false,
            breakpoints: SlotTable::new(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_single_step(&mut self, on: bool) {
        self.single_step = on;
    }

    pub fn single_step(&self) -> bool {
        self.single_step
    }

    pub fn add_breakpoint(&mut self, addr: u32) -> Result<(), TooManyBreakpoints> {
        if self.has_breakpoint(addr) {
            return Ok(());
        }
        self.breakpoints.insert(addr).map(|_| ()).ok_or(TooManyBreakpoints)
    }

    pub fn remove_breakpoint(&mut self, addr: u32) {
        let slot = self.breakpoints.iter().find(|(_, &a)| a == addr).map(|(i, _)| i);
        if let Some(i) = slot {
            self.breakpoints.remove(i);
        }
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    pub fn has_breakpoint(&self, addr: u32) -> bool {
        self.enabled && self.breakpoints.iter().any(|(_, &a)| a == addr)
    }
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakpoints_only_match_when_debugger_enabled() {
        let mut dbg = Debugger::new();
        dbg.add_breakpoint(0x100).unwrap();
        assert!(!dbg.has_breakpoint(0x100));
        dbg.set_enabled(true);
        assert!(dbg.has_breakpoint(0x100));
    }

    #[test]
    fn sixteenth_breakpoint_is_rejected() {
        let mut dbg = Debugger::new();
        for addr in 0..MAX_BREAKPOINTS as u32 {
            dbg.add_breakpoint(addr * 4).unwrap();
        }
        assert_eq!(dbg.add_breakpoint(0xFFFF), Err(TooManyBreakpoints));
    }

    #[test]
    fn remove_then_clear() {
        let mut dbg = Debugger::new();
        dbg.set_enabled(true);
        dbg.add_breakpoint(0x10).unwrap();
        dbg.add_breakpoint(0x20).unwrap();
        dbg.remove_breakpoint(0x10);
        assert!(!dbg.has_breakpoint(0x10));
        assert!(dbg.has_breakpoint(0x20));
        dbg.clear_breakpoints();
        assert!(!dbg.has_breakpoint(0x20));
    }
}
