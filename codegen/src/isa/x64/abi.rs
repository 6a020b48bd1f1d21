//! SysV / Windows fastcall argument placement (spec.md §4.5).

use crate::ir::signature::CallConv;
use crate::machinst::abi::AbiMachineSpec;
use crate::machinst::reg::PReg;

use super::regs;

pub struct X64AbiSpec;

impl AbiMachineSpec for X64AbiSpec {
    fn int_arg_regs(cc: CallConv) -> &'static [PReg] {
        match cc {
            CallConv::WindowsFastcall => regs::WIN_FASTCALL_INT_ARGS,
            _ => regs::SYSV_INT_ARGS,
        }
    }

    fn float_arg_regs(cc: CallConv) -> &'static [PReg] {
        match cc {
            CallConv::WindowsFastcall => regs::WIN_FASTCALL_FLOAT_ARGS,
            _ => regs::SYSV_FLOAT_ARGS,
        }
    }

    fn int_return_regs(cc: CallConv) -> &'static [PReg] {
        match cc {
            CallConv::WindowsFastcall => regs::WIN_FASTCALL_INT_RETURNS,
            _ => regs::SYSV_INT_RETURNS,
        }
    }

    fn float_return_regs(cc: CallConv) -> &'static [PReg] {
        match cc {
            CallConv::WindowsFastcall => regs::WIN_FASTCALL_FLOAT_RETURNS,
            _ => regs::SYSV_FLOAT_RETURNS,
        }
    }

    fn stack_slot_align(_cc: CallConv, _size: u32, natural_align: u32) -> u32 {
        natural_align
    }

    fn stack_area_align(_cc: CallConv) -> u32 {
        8
    }

    fn word_bytes() -> u32 {
        8
    }
}
