//! Calling-convention argument placement, spec.md §4.5 and E7.

use retarget_codegen::ir::{AbiParam, CallConv};
use retarget_codegen::ir::types::{F64, I32, I64};
use retarget_codegen::machinst::abi::{assign_arguments, ArgLoc};

#[cfg(feature = "x64")]
#[test]
fn sysv_six_int_args_stay_in_registers() {
    use retarget_codegen::isa::x64::abi::X64AbiSpec;
    use retarget_codegen::isa::x64::regs;

    let params: Vec<AbiParam> = (0..6).map(|_| AbiParam::new(I64)).collect();
    let assigned = assign_arguments::<X64AbiSpec>(&params, CallConv::SystemV, None);

    let expect = [regs::RDI, regs::RSI, regs::RDX, regs::RCX, regs::R8, regs::R9];
    for (a, &want) in assigned.iter().zip(expect.iter()) {
        assert_eq!(a.locs, vec![ArgLoc::Reg(want)]);
    }
}

#[cfg(feature = "x64")]
#[test]
fn sysv_seventh_int_arg_spills_to_stack() {
    use retarget_codegen::isa::x64::abi::X64AbiSpec;

    let params: Vec<AbiParam> = (0..7).map(|_| AbiParam::new(I64)).collect();
    let assigned = assign_arguments::<X64AbiSpec>(&params, CallConv::SystemV, None);

    match assigned[6].locs[0] {
        ArgLoc::Stack(off) => assert_eq!(off, 0),
        other => panic!("expected seventh arg on the stack, got {:?}", other),
    }
}

#[cfg(feature = "aarch64")]
#[test]
fn aapcs64_eight_plus_one_int_args() {
    use retarget_codegen::isa::aarch64::abi::AAPCS64AbiSpec;
    use retarget_codegen::isa::aarch64::regs;

    // spec.md E7: a ninth `i32` parameter lands at `[sp, #0]` relative to
    // the incoming stack-arg area, once the first eight have filled X0-X7.
    let params: Vec<AbiParam> = (0..9).map(|_| AbiParam::new(I32)).collect();
    let assigned = assign_arguments::<AAPCS64AbiSpec>(&params, CallConv::Aapcs64, None);

    let expect = [
        regs::X0, regs::X1, regs::X2, regs::X3, regs::X4, regs::X5, regs::X6, regs::X7,
    ];
    for (a, &want) in assigned.iter().zip(expect.iter()) {
        assert_eq!(a.locs, vec![ArgLoc::Reg(want)]);
    }
    match assigned[8].locs[0] {
        ArgLoc::Stack(off) => assert_eq!(off, 0),
        other => panic!("expected ninth arg on the stack, got {:?}", other),
    }
}

#[cfg(feature = "aarch64")]
#[test]
fn aapcs64_float_and_int_args_use_independent_cursors() {
    use retarget_codegen::isa::aarch64::abi::AAPCS64AbiSpec;
    use retarget_codegen::isa::aarch64::regs;

    let params = vec![AbiParam::new(I64), AbiParam::new(F64), AbiParam::new(I64)];
    let assigned = assign_arguments::<AAPCS64AbiSpec>(&params, CallConv::Aapcs64, None);

    assert_eq!(assigned[0].locs, vec![ArgLoc::Reg(regs::X0)]);
    assert_eq!(assigned[1].locs, vec![ArgLoc::Reg(regs::V0)]);
    assert_eq!(assigned[2].locs, vec![ArgLoc::Reg(regs::X1)]);
}
