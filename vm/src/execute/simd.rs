//! Packed 4×8 SIMD instructions (spec §4.3): a 32-bit register treated as
//! four 8-bit lanes, lane 0 in the low byte.

use crate::decode::Instruction;
use crate::error::VmFault;
use crate::opcode::Opcode;
use crate::vm::Vm;

use super::ControlFlow;

fn lanes(word: u32) -> [u8; 4] {
    word.to_le_bytes()
}

fn from_lanes(lanes: [u8; 4]) -> u32 {
    u32::from_le_bytes(lanes)
}

pub fn execute(vm: &mut Vm, inst: Instruction) -> Result<ControlFlow, VmFault> {
    use Opcode::*;
    let r = inst.as_r();
    let a = lanes(vm.regs.get(r.rs1()));
    let b = lanes(vm.regs.get(r.rs2()));
    match inst.opcode {
        Vadd => {
            let mut out = [0u8; 4];
            for i in 0..4 {
                out[i] = a[i].wrapping_add(b[i]);
            }
            vm.regs.set(r.rd(), from_lanes(out));
        }
        Vsub => {
            let mut out = [0u8; 4];
            for i in 0..4 {
                out[i] = a[i].wrapping_sub(b[i]);
            }
            vm.regs.set(r.rd(), from_lanes(out));
        }
        Vmul => {
            let mut out = [0u8; 4];
            for i in 0..4 {
                out[i] = a[i].wrapping_mul(b[i]);
            }
            vm.regs.set(r.rd(), from_lanes(out));
        }
        Vdot => {
            let sum: u32 = (0..4).map(|i| a[i] as u32 * b[i] as u32).sum();
            vm.regs.set(r.rd(), sum);
        }
        _ => unreachable!("non-SIMD opcode routed to simd::execute"),
    }
    Ok(ControlFlow::Next)
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
    fn vdot_computes_the_lane_wise_dot_product() {
        let mut vm = fresh_vm();
        vm.regs.set(1, 0x0403_0201);
        vm.regs.set(2, 0x0807_0605);
        vm.load_program_words(&[encode_r(Opcode::Vdot, 3, 1, 2)], 0);
        vm.step();
        assert_eq!(vm.regs.get(3), 70);
    }

    #[test]
    fn vadd_wraps_at_eight_bits_per_lane() {
        let mut vm = fresh_vm();
        vm.regs.set(1, 0x0000_00FF);
        vm.regs.set(2, 0x0000_0002);
        vm.load_program_words(&[encode_r(Opcode::Vadd, 3, 1, 2)], 0);
        vm.step();
        assert_eq!(vm.regs.get(3) & 0xFF, 0x01);
    }
}
