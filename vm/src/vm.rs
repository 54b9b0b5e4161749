//! The root VM object (spec §9): one value owning the address space,
//! register file, interrupt controller, thread table, device models, JIT
//! cache, debugger, GDB stub, and console sink. The executor and syscall
//! layer (`execute::execute`, `syscall::dispatch`) take `&mut Vm` rather
//! than owning any of this state — the monolithic struct the source kept
//! by embedding every subsystem's state by value is re-expressed here as
//! a root value owning several sub-state structs instead of one flat
//! bag of fields.

use alloc::boxed::Box;
use alloc::vec::Vec;

use drivers::{Display, FileSystem, Keyboard, Mouse, Network, Storage, Timer};
use logger::{NullSink, Sink};

use crate::config::VmConfig;
use crate::debugger::Debugger;
use crate::decode::Instruction;
use crate::error::{StepOutcome, VmFault};
use crate::execute::{self, ControlFlow};
use crate::gdb::GdbStub;
use crate::heap::Heap;
use crate::interrupts::InterruptController;
use crate::jit::JitCache;
use crate::memory::{AddressSpace, Protection, MEM_SIZE};
use crate::opcode::Opcode;
use crate::registers::Registers;
use crate::sched::ThreadTable;
use crate::syscall;

/// The VM core. Every method is single-threaded: calling `step`/`run`
/// concurrently with `read_memory`/`write_memory`/`raise_irq` on the same
/// instance is undefined (spec §5); separate instances are independent.
pub struct Vm {
    pub regs: Registers,
    pub mem: AddressSpace,
    pub interrupts: InterruptController,
    pub threads: ThreadTable,
    pub display: Display,
    pub keyboard: Keyboard,
    pub mouse: Mouse,
    pub timer: Timer,
    pub storage: Storage,
    pub network: Network,
    pub fs: FileSystem,
    pub heap: Heap,
    pub jit: JitCache,
    pub debugger: Debugger,
    pub gdb: GdbStub,
    pub sink: Box<dyn Sink>,
    pub exit_code: Option<u32>,
    instructions_retired: u64,
    config: VmConfig,
}

impl Vm {
    /// Create a VM that discards console output (spec §6 "optional
    /// console/log sink").
    pub fn new(config: VmConfig) -> Self {
        Self::with_sink(config, Box::new(NullSink))
    }

    /// Create a VM routing PRINT output and diagnostic log lines to
    /// `sink`.
    pub fn with_sink(config: VmConfig, sink: Box<dyn Sink>) -> Self {
        let heap = Heap::new(config.heap_base(), config.heap_capacity());
        let mut jit = JitCache::new(config.jit_buffer_cap);
        jit.set_enabled(config.jit_enabled);
        let mut gdb = GdbStub::new();
        if config.gdb_enabled {
            gdb.start();
        }
        let mut vm = Self {
            regs: Registers::new(),
            mem: AddressSpace::new(),
            interrupts: InterruptController::new(),
            threads: ThreadTable::new(),
            display: Display::new(),
            keyboard: Keyboard::new(),
            mouse: Mouse::new(),
            timer: Timer::new(),
            storage: Storage::new(),
            network: Network::new(),
            fs: FileSystem::new(),
            heap,
            jit,
            debugger: Debugger::new(),
            gdb,
            sink,
            exit_code: None,
            instructions_retired: 0,
            config,
        };
        vm.init();
        vm
    }

    /// Restore every documented default (spec §3 "Ownership and
    /// lifecycle"): PC=0, SP=top-4, FP=SP, halted=false, default page
    /// layout, every device queue emptied, one main thread.
    pub fn init(&mut self) {
        self.mem
            .reset_layout(self.config.code_pages.clone(), self.config.heap_pages.clone(), self.config.stack_pages.clone());
        self.regs.reset(MEM_SIZE as u32);
        self.interrupts.reset();
        self.threads.reset();
        self.display.reset();
        self.keyboard.reset();
        self.mouse.reset();
        self.timer.reset();
        self.storage.reset();
        self.network.reset();
        self.fs.reset();
        self.heap.reset();
        self.jit.clear_cache();
        self.debugger.reset();
        self.gdb.reset();
        self.exit_code = None;
        self.instructions_retired = 0;
    }

    /// Alias for [`Self::init`] (spec §6 lists `init` and `reset` as
    /// distinct entry points with identical documented effect).
    pub fn reset(&mut self) {
        self.init();
    }

    /// Load a flat byte image into guest memory at `base`, bypassing
    /// page protection (loaders run before the guest program does).
    /// Out-of-range bytes are silently dropped at the 64 KiB boundary.
    pub fn load_image(&mut self, bytes: &[u8], base: u32) {
        for (i, &byte) in bytes.iter().enumerate() {
            let addr = base.wrapping_add(i as u32);
            if (addr as usize) < MEM_SIZE {
                self.mem.force_write_u8(addr, byte);
            }
        }
    }

    /// Load pre-encoded instruction words at `base`, 4 bytes apart — a
    /// convenience wrapper over [`Self::load_image`] for assemblers that
    /// hand over words instead of bytes.
    pub fn load_program_words(&mut self, words: &[u32], base: u32) {
        for (i, &word) in words.iter().enumerate() {
            let addr = base.wrapping_add((i * 4) as u32);
            for (j, byte) in word.to_le_bytes().into_iter().enumerate() {
                if ((addr as usize) + j) < MEM_SIZE {
                    self.mem.force_write_u8(addr + j as u32, byte);
                }
            }
        }
    }

    /// Execute a single instruction (spec §2 "the caller drives a
    /// fetch-decode-execute loop via `step`"). Returns which of
    /// {continued, halted, breakpoint, single-step, fault} applies.
    pub fn step(&mut self) -> StepOutcome {
        if self.regs.halted {
            return StepOutcome::Halted;
        }
        if self.debugger.has_breakpoint(self.regs.pc) {
            return StepOutcome::Breakpoint;
        }

        let pc = self.regs.pc;
        let word = match self.mem.fetch_u32(pc) {
            Ok(word) => word,
            Err(fault) => return StepOutcome::Fault(VmFault::from(fault)),
        };
        let Some(inst) = Instruction::decode(word) else {
            return StepOutcome::Fault(VmFault::BadOpcode { word });
        };

        let flow = match inst.opcode {
            // SYSCALL's return-value convention makes it look like a
            // handler rather than a dispatch-table entry (spec §4.2 "as
            // handler"): it advances PC like any other instruction
            // *before* running so a thread that yields mid-syscall
            // resumes just past it, not back on top of it.
            Opcode::Syscall => {
                self.regs.pc = pc.wrapping_add(4);
                syscall::dispatch(self);
                ControlFlow::Jumped
            }
            Opcode::Halt => {
                self.regs.halted = true;
                self.regs.pc = pc.wrapping_add(4);
                ControlFlow::Jumped
            }
            _ => match execute::execute(self, inst) {
                Ok(flow) => flow,
                Err(fault) => return StepOutcome::Fault(fault),
            },
        };

        if flow == ControlFlow::Next {
            self.regs.pc = pc.wrapping_add(4);
        }

        self.timer.tick();
        self.instructions_retired += 1;
        if self.jit.is_enabled() {
            self.jit.compile_block(pc);
        }

        if !self.regs.halted {
            if let Some(vector) = self.interrupts.next_active() {
                if let Err(fault) = self.dispatch_interrupt(vector) {
                    return StepOutcome::Fault(fault);
                }
            }
        }

        if self.regs.halted {
            return StepOutcome::Halted;
        }
        if self.debugger.single_step() {
            return StepOutcome::SingleStep;
        }
        StepOutcome::Continued
    }

    /// Repeat `step` until halted, faulted, or `max_steps` executed
    /// (spec §2 "`run` repeats `step` until halted or error"); stops
    /// early on a breakpoint or single-step event too, since those are
    /// the events a debugging host needs to regain control for.
    pub fn run(&mut self, max_steps: u32) -> StepOutcome {
        let mut outcome = StepOutcome::Continued;
        for _ in 0..max_steps {
            outcome = self.step();
            if !matches!(outcome, StepOutcome::Continued) {
                break;
            }
        }
        outcome
    }

    /// Dispatch interrupt `vector` (spec §4.5): push the return PC, jump
    /// to the handler, clear pending. A fault here (stack not writable)
    /// leaves the vector pending — the pending-first ordering invariant.
    fn dispatch_interrupt(&mut self, vector: usize) -> Result<(), VmFault> {
        let handler = self.interrupts.handler(vector);
        let new_sp = self.regs.sp.wrapping_sub(4);
        self.mem.write_u32(new_sp, self.regs.pc)?;
        self.regs.sp = new_sp;
        self.regs.pc = handler;
        self.interrupts.ack(vector);
        Ok(())
    }

    /// Raise IRQ `vector` from outside the step loop (spec §6 "raise
    /// IRQ"); a no-op if global enable or the vector's own enable is off.
    pub fn raise_irq(&mut self, vector: usize) -> bool {
        self.interrupts.raise(vector)
    }

    /// Register a handler address for `vector` (spec §6 "register IRQ
    /// handler").
    pub fn set_irq_handler(&mut self, vector: usize, handler_pc: u32) {
        self.interrupts.set_handler(vector, handler_pc);
    }

    pub fn set_irqs_enabled(&mut self, enabled: bool) {
        self.interrupts.set_global_enabled(enabled);
    }

    pub fn read_register(&self, index: u8) -> u32 {
        self.regs.get(index)
    }

    pub fn pc(&self) -> u32 {
        self.regs.pc
    }

    pub fn write_register(&mut self, index: u8, value: u32) {
        self.regs.set(index, value);
    }

    pub fn read_memory(&self, addr: u32, out: &mut [u8]) -> Result<(), VmFault> {
        self.mem.copy_out(addr, out, Protection::READ).map_err(VmFault::from)
    }

    pub fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<(), VmFault> {
        self.mem.copy_in(addr, data, Protection::WRITE).map_err(VmFault::from)
    }

    pub fn set_page_protection(&mut self, page: usize, prot: Protection) {
        self.mem.set_protection(page, prot);
    }

    pub fn page_protection(&self, page: usize) -> Protection {
        self.mem.protection(page)
    }

    pub fn set_debugger_enabled(&mut self, enabled: bool) {
        self.debugger.set_enabled(enabled);
    }

    pub fn set_single_step(&mut self, on: bool) {
        self.debugger.set_single_step(on);
    }

    pub fn add_breakpoint(&mut self, addr: u32) -> Result<(), crate::debugger::TooManyBreakpoints> {
        self.debugger.add_breakpoint(addr)
    }

    pub fn remove_breakpoint(&mut self, addr: u32) {
        self.debugger.remove_breakpoint(addr);
    }

    pub fn clear_breakpoints(&mut self) {
        self.debugger.clear_breakpoints();
    }

    pub fn instructions_retired(&self) -> u64 {
        self.instructions_retired
    }

    /// Ticks elapsed, doubling as the cycle counter (spec §4.7: one tick
    /// per successful `step`).
    pub fn cycle_count(&self) -> u64 {
        self.timer.ticks()
    }

    /// Disassemble one instruction word into plain ASCII (spec §6).
    pub fn disassemble(word: u32) -> alloc::string::String {
        crate::disasm::disassemble(word)
    }

    pub fn send_network_packet(&mut self, bytes: &[u8]) -> bool {
        self.network.send(bytes)
    }

    pub fn recv_network_packet(&mut self) -> Option<Vec<u8>> {
        self.network.recv().map(|p| p.as_slice().to_vec())
    }

    pub fn is_connected(&self) -> bool {
        self.network.is_connected()
    }

    /// Create a thread with its own stack region (spec §4.6): the VM
    /// carves out [`crate::sched::THREAD_STACK_SIZE`] bytes below the
    /// main stack top for each extra thread, stacking them downward by
    /// thread count so regions never overlap.
    pub fn create_thread(&mut self, entry: u32, arg: u32) -> Option<u32> {
        let ordinal = self.threads.thread_count() as u32;
        let stack_top = MEM_SIZE as u32 - ordinal * crate::sched::THREAD_STACK_SIZE;
        self.threads.create(entry, arg, stack_top)
    }

    pub fn current_thread_id(&self) -> u32 {
        self.threads.current_id()
    }

    /// Cooperatively yield to the next runnable thread (spec §4.6), for
    /// hosts driving scheduling outside the syscall interface (e.g. a
    /// future timer-IRQ-triggered yield policy).
    pub fn yield_now(&mut self) {
        self.threads.yield_now(&mut self.regs);
    }

    pub fn set_jit_enabled(&mut self, enabled: bool) {
        self.jit.set_enabled(enabled);
    }

    pub fn compile_block(&mut self, start: u32) {
        self.jit.compile_block(start);
    }

    pub fn clear_jit_cache(&mut self) {
        self.jit.clear_cache();
    }

    /// Start the GDB stub (spec §6 "start/stop/handle GDB").
    pub fn gdb_start(&mut self) {
        self.gdb.start();
    }

    pub fn gdb_stop(&mut self) {
        self.gdb.stop();
    }

    /// Feed one chunk of bytes received from the (host-owned) transport
    /// into the RSP packet FSM, returning the bytes to write back.
    /// `GdbStub::handle` takes `&mut Vm`, so the stub is swapped out of
    /// `self` for the call and back in afterward rather than borrowed
    /// alongside it.
    pub fn gdb_handle(&mut self, input: &[u8]) -> Vec<u8> {
        let mut stub = core::mem::take(&mut self.gdb);
        let out = stub.handle(input, self);
        self.gdb = stub;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{encode_i, encode_j, encode_r};

    #[test]
    fn init_restores_documented_defaults() {
        let mut vm = Vm::new(VmConfig::new());
        vm.regs.gpr[2] = 99;
        vm.init();
        assert_eq!(vm.regs.pc, 0);
        assert_eq!(vm.regs.sp, MEM_SIZE as u32 - 4);
        assert_eq!(vm.regs.fp, vm.regs.sp);
        assert!(!vm.regs.halted);
        assert_eq!(vm.threads.thread_count(), 1);
    }

    #[test]
    fn run_matches_step_by_step_execution() {
        let program = [
            encode_i(Opcode::Loadi, 1, 5),
            encode_i(Opcode::Loadi, 2, 7),
            encode_r(Opcode::Add, 3, 1, 2),
            encode_r(Opcode::Halt, 0, 0, 0),
        ];

        let mut stepped = Vm::new(VmConfig::new());
        stepped.load_program_words(&program, 0);
        loop {
            match stepped.step() {
                StepOutcome::Continued => continue,
                _ => break,
            }
        }

        let mut ran = Vm::new(VmConfig::new());
        ran.load_program_words(&program, 0);
        ran.run(1000);

        assert_eq!(stepped.regs.gpr, ran.regs.gpr);
        assert_eq!(stepped.regs.pc, ran.regs.pc);
        assert_eq!(stepped.regs.flags, ran.regs.flags);
    }

    #[test]
    fn breakpoint_is_reported_before_the_instruction_executes() {
        let mut vm = Vm::new(VmConfig::new());
        vm.set_debugger_enabled(true);
        vm.add_breakpoint(0).unwrap();
        vm.load_program_words(&[encode_i(Opcode::Loadi, 1, 5)], 0);
        let outcome = vm.step();
        assert_eq!(outcome, StepOutcome::Breakpoint);
        assert_eq!(vm.regs.get(1), 0);
    }

    #[test]
    fn single_step_mode_reports_after_one_instruction() {
        let mut vm = Vm::new(VmConfig::new());
        vm.set_single_step(true);
        vm.load_program_words(&[encode_i(Opcode::Loadi, 1, 5)], 0);
        let outcome = vm.step();
        assert_eq!(outcome, StepOutcome::SingleStep);
        assert_eq!(vm.regs.get(1), 5);
    }

    #[test]
    fn interrupt_dispatch_scenario() {
        let mut vm = Vm::new(VmConfig::new());
        vm.set_irqs_enabled(true);
        vm.interrupts.set_enabled(crate::interrupts::IRQ_TIMER, true);
        vm.set_irq_handler(crate::interrupts::IRQ_TIMER, 0x100);

        let handler_incr = encode_i(Opcode::Loadi, 5, 1);
        vm.load_program_words(&[handler_incr, encode_r(Opcode::Ret, 0, 0, 0)], 0x100);

        let main_program = [
            encode_i(Opcode::Loadi, 1, 1),
            encode_i(Opcode::Loadi, 2, 2),
            encode_r(Opcode::Halt, 0, 0, 0),
        ];
        vm.load_program_words(&main_program, 0);

        let sp_before = vm.regs.sp;
        vm.step(); // main[0]: LOADI r1,1
        vm.raise_irq(crate::interrupts::IRQ_TIMER);
        vm.step(); // main[1]: LOADI r2,2, then the IRQ dispatches into the handler
        assert!(!vm.interrupts.is_pending(crate::interrupts::IRQ_TIMER));
        assert_eq!(vm.regs.pc, 0x100);
        assert_eq!(vm.regs.sp, sp_before - 4);

        vm.step(); // handler: LOADI r5,1
        vm.step(); // handler: RET
        assert_eq!(vm.regs.get(5), 1);
        assert_eq!(vm.regs.pc, 8);
        assert_eq!(vm.regs.sp, sp_before);
    }

    #[test]
    fn page_protection_fault_leaves_memory_and_pc_untouched() {
        let mut vm = Vm::new(VmConfig::new());
        vm.set_page_protection(32, Protection::READ | Protection::PRESENT);
        let addr = 32 * crate::memory::PAGE_SIZE as u32;
        vm.regs.set(1, addr);
        vm.regs.set(2, 0xDEAD_BEEF);
        vm.load_program_words(&[encode_r(Opcode::Store, 2, 1, 0)], 0);
        let pc_before = vm.regs.pc;
        let before = vm.mem.read_u32(addr).unwrap_or(0);
        let outcome = vm.step();
        assert!(matches!(outcome, StepOutcome::Fault(VmFault::BadAccess(_))));
        assert_eq!(vm.regs.pc, pc_before);
        assert_eq!(vm.mem.read_u32(addr).unwrap_or(0), before);
    }

    #[test]
    fn jmp_takes_effect_immediately() {
        let mut vm = Vm::new(VmConfig::new());
        vm.load_program_words(&[encode_j(Opcode::Jmp, 0x40)], 0);
        vm.step();
        assert_eq!(vm.regs.pc, 0x40);
    }

    #[test]
    fn disassemble_is_a_pure_function_of_the_word() {
        let word = encode_r(Opcode::Add, 1, 2, 3);
        assert_eq!(Vm::disassemble(word), "ADD r1,r2,r3");
    }
}
