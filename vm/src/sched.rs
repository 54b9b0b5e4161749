//! Cooperative thread table (spec §4.6): up to 8 threads, each holding a
//! full register snapshot. Exactly one thread is "current" and its
//! snapshot lives in the shared CPU registers, not in its own slot.
//!
//! The teacher's `scheduler` crate owns a continuous `operation_loop`
//! that never returns; that doesn't fit a VM that yields only on an
//! explicit syscall and hands control straight back to `step`, so here
//! [`scheduler::RoundRobin`] is used as a stateless "who's next" query
//! instead of a loop owner.

use scheduler::{RoundRobin, Schedulable, Scheduler};

use crate::registers::Registers;

pub const MAX_THREADS: usize = 8;
/// Stack size the VM carves out per non-main thread (spec §4.6: "its own
/// 4 KiB stack region" for the main thread; extra threads share a
/// smaller reserved strip — see [`crate::vm::Vm::create_thread`]).
pub const THREAD_STACK_SIZE: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    Thread(u32),
    Primitive(u32),
}

#[derive(Debug, Clone, Copy)]
struct Thread {
    id: u32,
    regs: Registers,
    active: bool,
    waiting: bool,
    wait_target: Option<WaitTarget>,
}

impl Schedulable for Thread {
    fn id(&self) -> u32 {
        self.id
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn is_waiting(&self) -> bool {
        self.waiting
    }
}

pub struct ThreadTable {
    threads: [Option<Thread>; MAX_THREADS],
    current: usize,
    next_id: u32,
}

impl ThreadTable {
    pub fn new() -> Self {
        let mut table = Self {
            threads: [None; MAX_THREADS],
            current: 0,
            next_id: 1,
        };
        table.threads[0] = Some(Thread {
            id: 0,
            regs: Registers::new(),
            active: true,
            waiting: false,
            wait_target: None,
        });
        table
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn current_id(&self) -> u32 {
        self.threads[self.current].map_or(0, |t| t.id)
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn thread_count(&self) -> usize {
        self.threads.iter().filter(|t| t.is_some()).count()
    }

    /// Create a new thread with PC at `entry`, r1=`arg`, and SP at
    /// `stack_top` (the caller owns carving out and protecting the
    /// stack region — see [`crate::vm::Vm::create_thread`]). Returns the
    /// new thread's id, or `None` if the table is full.
    pub fn create(&mut self, entry: u32, arg: u32, stack_top: u32) -> Option<u32> {
        let slot = self.threads.iter().position(Option::is_none)?;
        let id = self.next_id;
        self.next_id += 1;
        let mut regs = Registers::new();
        regs.pc = entry;
        regs.set(1, arg);
        regs.sp = stack_top;
        regs.fp = regs.sp;
        self.threads[slot] = Some(Thread {
            id,
            regs,
            active: true,
            waiting: false,
            wait_target: None,
        });
        Some(id)
    }

    /// Deactivate the current thread (THREAD_EXIT) without picking a
    /// successor; the caller must still call [`Self::yield_now`].
    pub fn exit_current(&mut self) {
        if let Some(t) = self.threads[self.current].as_mut() {
            t.active = false;
        }
    }

    /// Mark the current thread waiting on `target` (THREAD_JOIN or a
    /// mutex/semaphore stub) without picking a successor.
    pub fn wait_current(&mut self, target: WaitTarget) {
        if let Some(t) = self.threads[self.current].as_mut() {
            t.waiting = true;
            t.wait_target = Some(target);
        }
    }

    /// Wake any thread waiting on `Thread(id)` that has exited.
    pub fn wake_joiners_of(&mut self, id: u32) {
        for slot in self.threads.iter_mut().flatten() {
            if slot.wait_target == Some(WaitTarget::Thread(id)) {
                slot.waiting = false;
                slot.wait_target = None;
            }
        }
    }

    pub fn is_exited(&self, id: u32) -> bool {
        self.threads
            .iter()
            .flatten()
            .find(|t| t.id == id)
            .map_or(true, |t| !t.active)
    }

    /// Snapshot `live` into the current thread's slot, pick the next
    /// active non-waiting thread round-robin from current+1, and load its
    /// snapshot into `live`. No-op if no other runnable thread exists.
    pub fn yield_now(&mut self, live: &mut Registers) {
        if let Some(t) = self.threads[self.current].as_mut() {
            t.regs = *live;
        }

        let pool: alloc::vec::Vec<Thread> = self.threads.iter().flatten().copied().collect();
        let index_by_slot: alloc::vec::Vec<usize> = self
            .threads
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.map(|_| i))
            .collect();
        let current_pool_index = index_by_slot.iter().position(|&i| i == self.current);

        let rr = RoundRobin;
        if let Some(cur) = current_pool_index {
            if let Some(next_pool_index) = rr.pick_next(&pool, cur) {
                let next_slot = index_by_slot[next_pool_index];
                self.current = next_slot;
                if let Some(t) = self.threads[self.current].as_ref() {
                    *live = t.regs;
                }
            }
        }
    }
}
