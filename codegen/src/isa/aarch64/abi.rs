//! AAPCS64 argument placement (spec.md §4.5). Apple's AArch64 variant
//! differs only in how it treats trailing varargs (stack-only, no GPR
//! promotion) and is handled by `varargs_from` in the shared placement
//! walk rather than a separate register set here.

use crate::ir::signature::CallConv;
use crate::machinst::abi::AbiMachineSpec;
use crate::machinst::reg::PReg;

use super::regs;

pub struct AAPCS64AbiSpec;

impl AbiMachineSpec for AAPCS64AbiSpec {
    fn int_arg_regs(_cc: CallConv) -> &'static [PReg] {
        regs::AAPCS64_INT_ARGS
    }

    fn float_arg_regs(_cc: CallConv) -> &'static [PReg] {
        regs::AAPCS64_FLOAT_ARGS
    }

    fn int_return_regs(_cc: CallConv) -> &'static [PReg] {
        regs::AAPCS64_INT_RETURNS
    }

    fn float_return_regs(_cc: CallConv) -> &'static [PReg] {
        regs::AAPCS64_FLOAT_RETURNS
    }

    fn stack_slot_align(_cc: CallConv, _size: u32, _natural_align: u32) -> u32 {
        8
    }

    fn stack_area_align(_cc: CallConv) -> u32 {
        16
    }

    fn word_bytes() -> u32 {
        8
    }
}
