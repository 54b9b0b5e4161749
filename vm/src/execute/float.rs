//! IEEE-754 single-precision floating-point instructions (spec §4.3).
//! Registers are reinterpreted bit patterns; no register carries a
//! dedicated float type.

use crate::decode::Instruction;
use crate::error::VmFault;
use crate::opcode::Opcode;
use crate::registers::Flags;
use crate::vm::Vm;

use super::ControlFlow;

pub fn execute(vm: &mut Vm, inst: Instruction) -> Result<ControlFlow, VmFault> {
    use Opcode::*;
    let r = inst.as_r();
    match inst.opcode {
        Fadd => binary(vm, inst, |a, b| a + b),
        Fsub => binary(vm, inst, |a, b| a - b),
        Fmul => binary(vm, inst, |a, b| a * b),
        Fdiv => binary(vm, inst, |a, b| a / b),
        Fcmp => {
            let a = f32::from_bits(vm.regs.get(r.rd()));
            let b = f32::from_bits(vm.regs.get(r.rs1()));
            vm.regs.flags = Flags {
                z: a == b,
                n: a < b,
                c: false,
                v: false,
            };
        }
        Fcvt => {
            let value = vm.regs.get(r.rs1()) as i32 as f32;
            vm.regs.set(r.rd(), value.to_bits());
        }
        Icvt => {
            let value = f32::from_bits(vm.regs.get(r.rs1()));
            vm.regs.set(r.rd(), value as i32 as u32);
        }
        Fmov => {
            vm.regs.set(r.rd(), vm.regs.get(r.rs1()));
        }
        _ => unreachable!("non-float opcode routed to float::execute"),
    }
    Ok(ControlFlow::Next)
}

fn binary(vm: &mut Vm, inst: Instruction, op: impl FnOnce(f32, f32) -> f32) {
    let r = inst.as_r();
    let a = f32::from_bits(vm.regs.get(r.rs1()));
    let b = f32::from_bits(vm.regs.get(r.rs2()));
    vm.regs.set(r.rd(), op(a, b).to_bits());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;
    use crate::decode::encode_r;

    fn fresh_vm() -> Vm {
        let mut vm = Vm::new(VmConfig::new());
        vm.init();
        vm
    }

    #[test]
    fn fadd_adds_bit_reinterpreted_floats() {
        let mut vm = fresh_vm();
        vm.regs.set(1, 1.5f32.to_bits());
        vm.regs.set(2, 2.5f32.to_bits());
        vm.load_program_words(&[encode_r(Opcode::Fadd, 3, 1, 2)], 0);
        vm.step();
        assert_eq!(f32::from_bits(vm.regs.get(3)), 4.0);
    }

    #[test]
    fn fcvt_then_icvt_round_trips_an_integer() {
        let mut vm = fresh_vm();
        vm.regs.set(1, (-7i32) as u32);
        vm.load_program_words(
            &[
                encode_r(Opcode::Fcvt, 2, 1, 0),
                encode_r(Opcode::Icvt, 3, 2, 0),
            ],
            0,
        );
        vm.step();
        vm.step();
        assert_eq!(vm.regs.get(3) as i32, -7);
    }

    #[test]
    fn fcmp_sets_zero_on_equal_operands_without_touching_carry() {
        let mut vm = fresh_vm();
        vm.regs.set(1, 3.0f32.to_bits());
        vm.regs.set(2, 3.0f32.to_bits());
        vm.regs.flags.c = true;
        vm.load_program_words(&[encode_r(Opcode::Fcmp, 1, 2, 0)], 0);
        vm.step();
        assert!(vm.regs.flags.z);
        assert!(!vm.regs.flags.c);
    }
}
