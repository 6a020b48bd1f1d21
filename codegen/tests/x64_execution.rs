//! End-to-end compile-then-run tests on the host's own x86-64, grounded on
//! spec.md §8 E1/E2/E4 (the AArch64 wording there is illustrative; running
//! generated code on a foreign architecture isn't available in this test
//! environment, so these exercise the same scenarios through the x64
//! backend instead).

#![cfg(all(feature = "x64", target_arch = "x86_64"))]

use retarget_codegen::ir::condcodes::IntCC;
use retarget_codegen::ir::types::I32;
use retarget_codegen::ir::*;
use retarget_codegen::settings::OptLevel;
use retarget_codegen::Context;
use target_lexicon::Triple;

fn jit(code: &[u8]) -> region::Allocation {
    let mut alloc =
        region::alloc(code.len(), region::Protection::READ_WRITE_EXECUTE).expect("mmap executable page");
    unsafe {
        std::ptr::copy_nonoverlapping(code.as_ptr(), alloc.as_mut_ptr::<u8>(), code.len());
    }
    alloc
}

fn context() -> Context {
    Context::builder()
        .target(Triple::host())
        .opt_level(OptLevel::None)
        .call_conv(CallConv::SystemV)
        .verify(true)
        .finish()
        .expect("x64 host target available")
}

#[test]
fn e1_add_two_i32() {
    let mut sig = Signature::new(CallConv::SystemV);
    sig.params.push(AbiParam::new(I32));
    sig.params.push(AbiParam::new(I32));
    sig.returns.push(AbiParam::new(I32));
    let mut func = Function::new("add", sig);
    {
        let mut b = FunctionBuilder::new(&mut func);
        let entry = b.create_block();
        let a = b.append_block_param(entry, I32);
        let c = b.append_block_param(entry, I32);
        b.switch_to_block(entry);
        let sum = b.iadd(a, c, I32);
        b.return_(vec![sum]);
    }

    let compiled = context().compile_function(&func).expect("add compiles");
    let alloc = jit(&compiled.bytes);
    let add: extern "C" fn(i32, i32) -> i32 = unsafe { std::mem::transmute(alloc.as_ptr::<u8>()) };

    assert_eq!(add(2, 3), 5);
    assert_eq!(add(10, -11), -1);
}

#[test]
fn e2_mul_two_i64() {
    use retarget_codegen::ir::types::I64;

    let mut sig = Signature::new(CallConv::SystemV);
    sig.params.push(AbiParam::new(I64));
    sig.params.push(AbiParam::new(I64));
    sig.returns.push(AbiParam::new(I64));
    let mut func = Function::new("mul", sig);
    {
        let mut b = FunctionBuilder::new(&mut func);
        let entry = b.create_block();
        let a = b.append_block_param(entry, I64);
        let c = b.append_block_param(entry, I64);
        b.switch_to_block(entry);
        let prod = b.imul(a, c, I64);
        b.return_(vec![prod]);
    }

    let compiled = context().compile_function(&func).expect("mul compiles");
    let alloc = jit(&compiled.bytes);
    let mul: extern "C" fn(i64, i64) -> i64 = unsafe { std::mem::transmute(alloc.as_ptr::<u8>()) };

    assert_eq!(mul(2, 3), 6);
    assert_eq!(mul(1000, 1000), 1_000_000);
}

#[test]
fn e4_conditional_return() {
    let mut sig = Signature::new(CallConv::SystemV);
    sig.params.push(AbiParam::new(I32));
    sig.returns.push(AbiParam::new(I32));
    let mut func = Function::new("cond", sig);
    {
        let mut b = FunctionBuilder::new(&mut func);
        let entry = b.create_block();
        let then_blk = b.create_block();
        let else_blk = b.create_block();
        let x = b.append_block_param(entry, I32);

        b.switch_to_block(entry);
        let zero = b.iconst(I32, 0);
        let positive = b.icmp(IntCC::SignedGreaterThan, x, zero);
        b.brif(positive, then_blk, vec![], else_blk, vec![]);

        b.switch_to_block(then_blk);
        b.return_(vec![x]);

        b.switch_to_block(else_blk);
        let zero2 = b.iconst(I32, 0);
        b.return_(vec![zero2]);
    }

    let compiled = context().compile_function(&func).expect("cond compiles");
    let alloc = jit(&compiled.bytes);
    let cond: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(alloc.as_ptr::<u8>()) };

    assert_eq!(cond(7), 7);
    assert_eq!(cond(-3), 0);
    assert_eq!(cond(0), 0);
}

#[test]
fn e5_switch_compiles_via_branch_table() {
    let mut sig = Signature::new(CallConv::SystemV);
    sig.params.push(AbiParam::new(I32));
    sig.returns.push(AbiParam::new(I32));
    let mut func = Function::new("switch", sig);
    {
        let mut b = FunctionBuilder::new(&mut func);
        let entry = b.create_block();
        let case0 = b.create_block();
        let case1 = b.create_block();
        let case2 = b.create_block();
        let default = b.create_block();
        let x = b.append_block_param(entry, I32);

        b.switch_to_block(entry);
        let table = b.func.dfg.create_jump_table(JumpTableData::new(
            BlockCall::new(default, vec![]),
            vec![
                BlockCall::new(case0, vec![]),
                BlockCall::new(case1, vec![]),
                BlockCall::new(case2, vec![]),
            ],
        ));
        b.br_table(x, table);

        b.switch_to_block(case0);
        let c0 = b.iconst(I32, 100);
        b.return_(vec![c0]);

        b.switch_to_block(case1);
        let c1 = b.iconst(I32, 200);
        b.return_(vec![c1]);

        b.switch_to_block(case2);
        let c2 = b.iconst(I32, 300);
        b.return_(vec![c2]);

        b.switch_to_block(default);
        let c3 = b.iconst(I32, 0);
        b.return_(vec![c3]);
    }

    let compiled = context().compile_function(&func).expect("switch compiles");
    let alloc = jit(&compiled.bytes);
    let switch: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(alloc.as_ptr::<u8>()) };

    assert_eq!(switch(0), 100);
    assert_eq!(switch(1), 200);
    assert_eq!(switch(2), 300);
    assert_eq!(switch(3), 0);
    assert_eq!(switch(-1), 0);
}

#[test]
fn e7_ninth_arg_is_stack_passed() {
    // SystemV has 6 integer argument registers, so params 6, 7, 8 (0-indexed)
    // land in the stack-argument area; `bind_incoming_args` has to read them
    // back off the stack rather than out of a register.
    let mut sig = Signature::new(CallConv::SystemV);
    for _ in 0..9 {
        sig.params.push(AbiParam::new(I32));
    }
    sig.returns.push(AbiParam::new(I32));
    let mut func = Function::new("ninth_arg", sig);
    {
        let mut b = FunctionBuilder::new(&mut func);
        let entry = b.create_block();
        let args: Vec<Value> = (0..9).map(|_| b.append_block_param(entry, I32)).collect();
        b.switch_to_block(entry);
        b.return_(vec![args[8]]);
    }

    let compiled = context().compile_function(&func).expect("ninth_arg compiles");
    let alloc = jit(&compiled.bytes);
    let ninth_arg: extern "C" fn(i32, i32, i32, i32, i32, i32, i32, i32, i32) -> i32 =
        unsafe { std::mem::transmute(alloc.as_ptr::<u8>()) };

    assert_eq!(ninth_arg(1, 2, 3, 4, 5, 6, 7, 8, 900), 900);
    assert_eq!(ninth_arg(0, 0, 0, 0, 0, 0, 0, 0, -42), -42);
}

extern "C" fn triple(x: i32) -> i32 {
    x * 3
}

#[test]
fn e8_try_call_runs_the_normal_path() {
    // try_call's normal successor is the only edge this backend actually
    // generates code for (spec.md §4.5); this exercises that path plus
    // patching the one `X86CallPCRel4` reloc `try_call` leaves behind,
    // the same way an embedder's own JIT resolver would. The exception
    // successor is a landing pad that's lowered (so `bind_landing_pads`
    // runs) but, per that gap, is never actually reachable at runtime.
    use retarget_codegen::binemit::reloc::RelocKind;
    use retarget_codegen::ir::entities::{ExternalName, Linkage};

    let mut sig = Signature::new(CallConv::SystemV);
    sig.params.push(AbiParam::new(I32));
    sig.returns.push(AbiParam::new(I32));
    let mut func = Function::new("try_triple", sig.clone());
    {
        let mut b = FunctionBuilder::new(&mut func);
        let entry = b.create_block();
        let normal = b.create_block();
        let landing = b.create_block();
        let x = b.append_block_param(entry, I32);

        b.switch_to_block(entry);
        let callee_sig = b.import_signature(sig);
        let callee = b.import_function(ExternalName::User("triple".to_string()), callee_sig, Linkage::Import);
        // `landing`'s sole parameter (the exception value) is actually
        // delivered by the move `bind_landing_pads` splices in from the
        // fixed exception register, not through this edge's args — but
        // the verifier still requires one arg of matching type per
        // declared parameter (spec.md Invariant 3), so `x` stands in.
        let call_inst = b.try_call(callee, vec![x], normal, vec![], landing, vec![x]);
        let call_result = b.func.dfg.inst_results(call_inst)[0];

        // `normal` is only reached through this `try_call`, so it's
        // dominated by `entry` and can use `call_result` directly rather
        // than threading it through a block parameter.
        b.switch_to_block(normal);
        b.return_(vec![call_result]);

        b.switch_to_block(landing);
        let exc = b.make_landing_pad(landing, I32);
        b.return_(vec![exc]);
    }

    let compiled = context().compile_function(&func).expect("try_call compiles");
    let mut bytes = compiled.bytes.clone();
    let alloc = jit(&bytes);
    let base = alloc.as_ptr::<u8>() as i64;
    for reloc in &compiled.relocs {
        assert_eq!(reloc.kind, RelocKind::X86CallPCRel4);
        let target = triple as usize as i64;
        let place = base + reloc.offset as i64;
        let rel32 = (target + reloc.addend) - place;
        bytes[reloc.offset as usize..reloc.offset as usize + 4].copy_from_slice(&(rel32 as i32).to_le_bytes());
    }
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), alloc.as_ptr::<u8>() as *mut u8, bytes.len());
    }
    let try_triple: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(alloc.as_ptr::<u8>()) };

    assert_eq!(try_triple(4), 12);
    assert_eq!(try_triple(-5), -15);
}
