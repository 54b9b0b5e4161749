//! Integer arithmetic, logical, memory, compare, and control-flow
//! instructions (spec §4.2).

use crate::decode::Instruction;
use crate::error::VmFault;
use crate::opcode::Opcode;
use crate::registers::Flags;
use crate::vm::Vm;

use super::ControlFlow;

pub fn execute(vm: &mut Vm, inst: Instruction) -> Result<ControlFlow, VmFault> {
    use Opcode::*;
    match inst.opcode {
        Add => {
            let r = inst.as_r();
            let (a, b) = (vm.regs.get(r.rs1()), vm.regs.get(r.rs2()));
            let (result, carry) = a.overflowing_add(b);
            let overflow = (a as i32).checked_add(b as i32).is_none();
            vm.regs.set(r.rd(), result);
            vm.regs.flags = Flags::from_arith(result, carry, overflow);
        }
        Sub => {
            let r = inst.as_r();
            let (a, b) = (vm.regs.get(r.rs1()), vm.regs.get(r.rs2()));
            let (result, borrow) = a.overflowing_sub(b);
            let overflow = (a as i32).checked_sub(b as i32).is_none();
            vm.regs.set(r.rd(), result);
            vm.regs.flags = Flags::from_arith(result, borrow, overflow);
        }
        Mul => {
            let r = inst.as_r();
            let (a, b) = (vm.regs.get(r.rs1()), vm.regs.get(r.rs2()));
            let wide = a as u64 * b as u64;
            let result = wide as u32;
            vm.regs.set(r.rd(), result);
            vm.regs.flags = Flags::from_arith(result, (wide >> 32) != 0, false);
        }
        Div => {
            let r = inst.as_r();
            let (a, b) = (vm.regs.get(r.rs1()), vm.regs.get(r.rs2()));
            if b == 0 {
                return Err(VmFault::ArithTrap);
            }
            let result = a / b;
            vm.regs.set(r.rd(), result);
            vm.regs.flags = Flags { z: result == 0, n: (result as i32) < 0, c: false, v: false };
        }
        Mod => {
            let r = inst.as_r();
            let (a, b) = (vm.regs.get(r.rs1()), vm.regs.get(r.rs2()));
            if b == 0 {
                return Err(VmFault::ArithTrap);
            }
            let result = a % b;
            vm.regs.set(r.rd(), result);
            vm.regs.flags = Flags { z: result == 0, n: (result as i32) < 0, c: false, v: false };
        }
        Neg => {
            let r = inst.as_r();
            let result = 0u32.wrapping_sub(vm.regs.get(r.rs1()));
            vm.regs.set(r.rd(), result);
            vm.regs.flags = Flags::from_logical(result);
        }
        And => binary_logical(vm, inst, |a, b| a & b),
        Or => binary_logical(vm, inst, |a, b| a | b),
        Xor => binary_logical(vm, inst, |a, b| a ^ b),
        Not => {
            let r = inst.as_r();
            let result = !vm.regs.get(r.rs1());
            vm.regs.set(r.rd(), result);
            vm.regs.flags = Flags::from_logical(result);
        }
        Shl => binary_logical(vm, inst, |a, b| a.wrapping_shl(b & 31)),
        Shr => binary_logical(vm, inst, |a, b| a.wrapping_shr(b & 31)),
        Load => {
            let r = inst.as_r();
            let ea = vm.regs.get(r.rs1()).wrapping_add(vm.regs.get(r.rs2()));
            let value = vm.mem.read_u32(ea)?;
            vm.regs.set(r.rd(), value);
        }
        Store => {
            let r = inst.as_r();
            let ea = vm.regs.get(r.rs1()).wrapping_add(vm.regs.get(r.rs2()));
            vm.mem.write_u32(ea, vm.regs.get(r.rd()))?;
        }
        Loadb => {
            let r = inst.as_r();
            let ea = vm.regs.get(r.rs1()).wrapping_add(vm.regs.get(r.rs2()));
            let value = vm.mem.read_u8(ea)?;
            vm.regs.set(r.rd(), value as u32);
        }
        Storeb => {
            let r = inst.as_r();
            let ea = vm.regs.get(r.rs1()).wrapping_add(vm.regs.get(r.rs2()));
            vm.mem.write_u8(ea, vm.regs.get(r.rd()) as u8)?;
        }
        Loadi => {
            let i = inst.as_i();
            vm.regs.set(i.rd(), inst.imm16_sign_extended() as u32);
        }
        Move => {
            let r = inst.as_r();
            vm.regs.set(r.rd(), vm.regs.get(r.rs1()));
        }
        Cmp => {
            let r = inst.as_r();
            let (a, b) = (vm.regs.get(r.rd()), vm.regs.get(r.rs1()));
            let (result, borrow) = a.overflowing_sub(b);
            let overflow = (a as i32).checked_sub(b as i32).is_none();
            vm.regs.flags = Flags::from_arith(result, borrow, overflow);
        }
        Test => {
            let r = inst.as_r();
            let (a, b) = (vm.regs.get(r.rd()), vm.regs.get(r.rs1()));
            vm.regs.flags = Flags::from_logical(a & b);
        }
        Slt => set_compare(vm, inst, |a, b| (a as i32) < (b as i32)),
        Sle => set_compare(vm, inst, |a, b| (a as i32) <= (b as i32)),
        Seq => set_compare(vm, inst, |a, b| a == b),
        Sne => set_compare(vm, inst, |a, b| a != b),
        Jmp => {
            vm.regs.pc = jump_target(vm, inst);
            return Ok(ControlFlow::Jumped);
        }
        Jz => return Ok(conditional_jump(vm, inst, vm.regs.flags.z)),
        Jnz => return Ok(conditional_jump(vm, inst, !vm.regs.flags.z)),
        Jc => return Ok(conditional_jump(vm, inst, vm.regs.flags.c)),
        Jnc => return Ok(conditional_jump(vm, inst, !vm.regs.flags.c)),
        Call => {
            let target = jump_target(vm, inst);
            let return_addr = vm.regs.pc.wrapping_add(4);
            let new_sp = vm.regs.sp.wrapping_sub(4);
            vm.mem.write_u32(new_sp, return_addr)?;
            vm.regs.sp = new_sp;
            vm.regs.pc = target;
            return Ok(ControlFlow::Jumped);
        }
        Ret => {
            let target = vm.mem.read_u32(vm.regs.sp)?;
            vm.regs.sp = vm.regs.sp.wrapping_add(4);
            vm.regs.pc = target;
            return Ok(ControlFlow::Jumped);
        }
        _ => unreachable!("non-integer opcode routed to integer::execute"),
    }
    Ok(ControlFlow::Next)
}

fn binary_logical(vm: &mut Vm, inst: Instruction, op: impl FnOnce(u32, u32) -> u32) {
    let r = inst.as_r();
    let (a, b) = (vm.regs.get(r.rs1()), vm.regs.get(r.rs2()));
    let result = op(a, b);
    vm.regs.set(r.rd(), result);
    vm.regs.flags = Flags::from_logical(result);
}

fn set_compare(vm: &mut Vm, inst: Instruction, cmp: impl FnOnce(u32, u32) -> bool) {
    let r = inst.as_r();
    let (a, b) = (vm.regs.get(r.rs1()), vm.regs.get(r.rs2()));
    vm.regs.set(r.rd(), cmp(a, b) as u32);
}

fn jump_target(vm: &Vm, inst: Instruction) -> u32 {
    let _ = vm;
    inst.imm24_sign_extended() as u32
}

fn conditional_jump(vm: &mut Vm, inst: Instruction, taken: bool) -> ControlFlow {
    if taken {
        vm.regs.pc = jump_target(vm, inst);
        ControlFlow::Jumped
    } else {
        ControlFlow::Next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;
    use crate::decode::{encode_i, encode_r};

    fn fresh_vm() -> Vm {
        let mut vm = Vm::new(VmConfig::new());
        vm.init();
        vm
    }

    #[test]
    fn arithmetic_flags_scenario() {
        let mut vm = fresh_vm();
        let program = [
            encode_i(Opcode::Loadi, 1, 1),
            encode_i(Opcode::Loadi, 2, -1),
            encode_r(Opcode::Add, 3, 1, 2),
            encode_r(Opcode::Halt, 0, 0, 0),
        ];
        vm.load_program_words(&program, 0);
        vm.run(100);
        assert_eq!(vm.regs.get(3), 0);
        assert!(vm.regs.flags.z);
        assert!(vm.regs.flags.c);
        assert!(!vm.regs.flags.v);
    }

    #[test]
    fn div_by_zero_traps_without_mutating_pc() {
        let mut vm = fresh_vm();
        let program = [
            encode_i(Opcode::Loadi, 1, 0),
            encode_r(Opcode::Div, 2, 1, 1),
        ];
        vm.load_program_words(&program, 0);
        vm.step();
        let pc_before = vm.regs.pc;
        let outcome = vm.step();
        assert!(matches!(outcome, crate::error::StepOutcome::Fault(_)));
        assert_eq!(vm.regs.pc, pc_before);
    }

    #[test]
    fn call_then_ret_round_trips_sp() {
        let mut vm = fresh_vm();
        let call = crate::decode::encode_j(Opcode::Call, 8);
        let halt = encode_r(Opcode::Halt, 0, 0, 0);
        let ret = encode_r(Opcode::Ret, 0, 0, 0);
        vm.load_program_words(&[call, halt], 0);
        vm.mem.write_u32(8, ret).unwrap();
        let sp_before = vm.regs.sp;
        vm.step(); // CALL
        assert_eq!(vm.regs.pc, 8);
        assert_eq!(vm.regs.sp, sp_before - 4);
        vm.step(); // RET
        assert_eq!(vm.regs.pc, 4);
        assert_eq!(vm.regs.sp, sp_before);
    }
}
