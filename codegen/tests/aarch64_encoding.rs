//! Byte-exact AArch64 encodings, spec.md §8 E3.

#![cfg(feature = "aarch64")]

use retarget_codegen::binemit::buffer::MachBuffer;
use retarget_codegen::isa::aarch64::inst::{Inst, OperandSize};
use retarget_codegen::isa::aarch64::regs;
use retarget_codegen::machinst::reg::RegRef;
use retarget_codegen::machinst::vcode::MachInst;

#[test]
fn movz_w0_42_then_ret() {
    let mut buf = MachBuffer::new();
    Inst::MovZ {
        size: OperandSize::S32,
        rd: RegRef::Physical(regs::X0),
        imm16: 42,
        shift: 0,
    }
    .emit(&mut buf);
    Inst::Ret.emit(&mut buf);

    let finished = buf.finish().expect("no pending fixups in a two-instruction buffer");
    assert_eq!(
        finished.data,
        vec![0x40, 0x05, 0x80, 0x52, 0xC0, 0x03, 0x5F, 0xD6]
    );
}
