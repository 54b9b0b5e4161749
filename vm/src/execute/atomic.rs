//! Atomic word operations (spec §4.3). Cooperative scheduling makes
//! these trivially single-step with respect to other guest threads on a
//! single host thread; the contract is written so a future parallel
//! implementation could hold a per-word lock instead.

use crate::decode::Instruction;
use crate::error::VmFault;
use crate::opcode::Opcode;
use crate::vm::Vm;

use super::ControlFlow;

pub fn execute(vm: &mut Vm, inst: Instruction) -> Result<ControlFlow, VmFault> {
    use Opcode::*;
    let r = inst.as_r();
    match inst.opcode {
        Xchg => {
            let addr = vm.regs.get(r.rs1());
            let new = vm.regs.get(r.rs2());
            let old = vm.mem.atomic_rmw_u32(addr, |_| new)?;
            vm.regs.set(r.rd(), old);
        }
        Cas => {
            let addr = vm.regs.get(r.rs1());
            let expected = vm.regs.get(r.rd());
            let new = vm.regs.get(r.rs2());
            let mut swapped = false;
            vm.mem.atomic_rmw_u32(addr, |current| {
                if current == expected {
                    swapped = true;
                    new
                } else {
                    current
                }
            })?;
            vm.regs.set(r.rd(), swapped as u32);
        }
        FaddAtomic => {
            let addr = vm.regs.get(r.rs1());
            let delta = vm.regs.get(r.rs2());
            let old = vm.mem.atomic_rmw_u32(addr, |current| current.wrapping_add(delta))?;
            vm.regs.set(r.rd(), old);
        }
        Lock => {}
        _ => unreachable!("non-atomic opcode routed to atomic::execute"),
    }
    Ok(ControlFlow::Next)
}
