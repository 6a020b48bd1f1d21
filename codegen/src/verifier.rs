//! Structural and type invariants checked before lowering (spec.md §4.3,
//! §3 Invariants). Verifier errors accumulate rather than stopping at the
//! first one, so a client sees every structural problem from one pass.

use crate::dominator_tree::DominatorTree;
use crate::flowgraph::ControlFlowGraph;
use crate::ir::entities::AnyEntity;
use crate::ir::{Block, Function, Inst, InstructionData, Opcode};
use core::fmt;

#[derive(Debug, Clone)]
pub struct VerifierError {
    pub location: AnyEntity,
    pub message: String,
}

impl fmt::Display for VerifierError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct VerifierErrors(pub Vec<VerifierError>);

impl VerifierErrors {
    fn push(&mut self, location: impl Into<AnyEntity>, message: impl Into<String>) {
        self.0.push(VerifierError {
            location: location.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result(self) -> Result<(), VerifierErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for VerifierErrors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{} verifier error(s):", self.0.len())?;
        for e in &self.0 {
            writeln!(f, "  {}", e)?;
        }
        Ok(())
    }
}

/// Run every structural/type check over `func`. `cfg`/`domtree` are
/// supplied by the caller (the `Context` pipeline computes them once and
/// reuses them for lowering too) rather than recomputed here.
pub fn verify_function(
    func: &Function,
    cfg: &ControlFlowGraph,
    domtree: &DominatorTree,
) -> Result<(), VerifierErrors> {
    let mut errors = VerifierErrors::default();

    verify_terminators(func, &mut errors);
    verify_block_calls(func, &mut errors);
    verify_dominance(func, domtree, &mut errors);
    verify_calls(func, &mut errors);
    verify_jump_tables(func, &mut errors);
    verify_landing_pads(func, cfg, &mut errors);

    errors.into_result()
}

/// Every block ends with exactly one terminator; no non-terminator
/// control-flow op appears elsewhere in the block (spec.md Invariant 2).
fn verify_terminators(func: &Function, errors: &mut VerifierErrors) {
    for block in func.layout.blocks() {
        let insts = func.layout.block_insts(block);
        if insts.is_empty() {
            errors.push(block, "block has no instructions, expected a terminator");
            continue;
        }
        for (i, &inst) in insts.iter().enumerate() {
            let is_last = i + 1 == insts.len();
            let is_term = func.dfg.inst_data(inst).is_terminator();
            if is_last && !is_term {
                errors.push(inst, "block does not end with a terminator");
            }
            if !is_last && is_term {
                errors.push(inst, "terminator appears before the end of its block");
            }
        }
    }
}

/// Every inter-block edge's `BlockCall` supplies one argument of matching
/// type per destination parameter (spec.md Invariant 3).
fn verify_block_calls(func: &Function, errors: &mut VerifierErrors) {
    for block in func.layout.blocks() {
        if let Some(inst) = func.layout.last_inst(block) {
            let data = func.dfg.inst_data(inst);
            for dest in data.branch_destinations() {
                check_block_call(func, inst, dest, errors);
            }
            if let InstructionData::BranchTable { table, .. } = data {
                for dest in func.dfg.jump_table(*table).all_branches() {
                    check_block_call(func, inst, dest, errors);
                }
            }
        }
    }
}

fn check_block_call(
    func: &Function,
    inst: Inst,
    dest: &crate::ir::BlockCall,
    errors: &mut VerifierErrors,
) {
    let params = func.dfg.block_params(dest.block);
    if params.len() != dest.args.len() {
        errors.push(
            inst,
            format!(
                "block call to {} supplies {} argument(s), expected {}",
                dest.block,
                dest.args.len(),
                params.len()
            ),
        );
        return;
    }
    for (¶m, &arg) in params.iter().zip(dest.args.iter()) {
        let pt = func.dfg.value_type(param);
        let at = func.dfg.value_type(arg);
        if pt != at {
            errors.push(
                inst,
                format!(
                    "block call argument {} has type {}, expected {} for {}",
                    arg, at, pt, param
                ),
            );
        }
    }
}

/// Every value is dominated by its definition at every use site (spec.md
/// Invariant 1, Property 1).
fn verify_dominance(func: &Function, domtree: &DominatorTree, errors: &mut VerifierErrors) {
    for block in func.layout.blocks() {
        if !domtree.is_reachable(block) {
            continue;
        }
        for &inst in func.layout.block_insts(block) {
            for arg in func.dfg.inst_data(inst).arguments() {
                let def_block = func.dfg.value_def_block(arg, &func.layout);
                if !domtree.dominates(def_block, block) {
                    errors.push(
                        inst,
                        format!("use of {} is not dominated by its definition", arg),
                    );
                    continue;
                }
                if def_block == block {
                    if let Some(def_inst) = func.dfg.value_def_inst(arg) {
                        let def_pos = func.layout.inst_position(def_inst, block);
                        let use_pos = func.layout.inst_position(inst, block);
                        if let (Some(dp), Some(up)) = (def_pos, use_pos) {
                            if dp >= up {
                                errors.push(
                                    inst,
                                    format!("use of {} precedes its definition in the same block", arg),
                                );
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Every `call`/`call_indirect`/`try_call` supplies arguments whose count
/// and types match the referenced `Signature` (spec.md Invariant 4).
fn verify_calls(func: &Function, errors: &mut VerifierErrors) {
    for block in func.layout.blocks() {
        for &inst in func.layout.block_insts(block) {
            let data = func.dfg.inst_data(inst);
            let sig = match data {
                InstructionData::Call { func_ref, .. } => Some(func.dfg.func_signature(*func_ref).clone()),
                InstructionData::CallIndirect { sig_ref, .. } => Some(func.dfg.signature(*sig_ref).clone()),
                InstructionData::TryCall { func_ref, .. } => Some(func.dfg.func_signature(*func_ref).clone()),
                _ => None,
            };
            let Some(sig) = sig else { continue };
            let args = match data {
                InstructionData::Call { args, .. } | InstructionData::TryCall { args, .. } => args.clone(),
                InstructionData::CallIndirect { args, .. } => args.clone(),
                _ => unreachable!(),
            };
            if args.len() != sig.params.len() {
                errors.push(
                    inst,
                    format!(
                        "call supplies {} argument(s), signature expects {}",
                        args.len(),
                        sig.params.len()
                    ),
                );
                continue;
            }
            for (param, &arg) in sig.params.iter().zip(args.iter()) {
                if param.is_struct() {
                    continue;
                }
                let at = func.dfg.value_type(arg);
                if at != param.value_type {
                    errors.push(
                        inst,
                        format!("call argument {} has type {}, expected {}", arg, at, param.value_type),
                    );
                }
            }
        }
    }
}

/// Jump-table entries and the default entry all target blocks in the
/// current function (spec.md Invariant 6).
fn verify_jump_tables(func: &Function, errors: &mut VerifierErrors) {
    let num_blocks = func.dfg.num_blocks();
    for block in func.layout.blocks() {
        if let Some(inst) = func.layout.last_inst(block) {
            if let InstructionData::BranchTable { table, .. } = func.dfg.inst_data(inst) {
                for dest in func.dfg.jump_table(*table).all_branches() {
                    if retarget_entity::EntityRef::index(dest.block) >= num_blocks {
                        errors.push(inst, format!("jump table entry targets unknown block {}", dest.block));
                    }
                }
            }
        }
    }
}

/// Exception successors of `try_call` target blocks with
/// `is_landing_pad = true`; the landing pad's first parameter is the
/// exception value (spec.md Invariant 5).
fn verify_landing_pads(func: &Function, cfg: &ControlFlowGraph, errors: &mut VerifierErrors) {
    let _ = cfg;
    for block in func.layout.blocks() {
        if let Some(inst) = func.layout.last_inst(block) {
            if let InstructionData::TryCall { exception_dest, .. } = func.dfg.inst_data(inst) {
                if !func.dfg.is_landing_pad(exception_dest.block) {
                    errors.push(
                        inst,
                        format!(
                            "try_call exception successor {} is not a landing pad",
                            exception_dest.block
                        ),
                    );
                } else if func.dfg.block_params(exception_dest.block).is_empty() {
                    errors.push(
                        inst,
                        format!(
                            "landing pad {} has no parameter to receive the exception value",
                            exception_dest.block
                        ),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::*;

    fn build_diamond() -> Function {
        let sig = Signature::new(CallConv::SystemV);
        let mut func = Function::new("diamond", sig);
        let entry = {
            let mut b = FunctionBuilder::new(&mut func);
            let entry = b.create_block();
            let l = b.create_block();
            let r = b.create_block();
            let exit = b.create_block();
            b.switch_to_block(entry);
            let c = b.bconst(true);
            b.brif(c, l, vec![], r, vec![]);
            b.switch_to_block(l);
            b.jump(exit, vec![]);
            b.switch_to_block(r);
            b.jump(exit, vec![]);
            b.switch_to_block(exit);
            b.return_(vec![]);
            entry
        };
        let _ = entry;
        func
    }

    #[test]
    fn diamond_verifies_clean() {
        let func = build_diamond();
        let cfg = ControlFlowGraph::with_function(&func);
        let domtree = DominatorTree::with_function(&func, &cfg);
        assert!(verify_function(&func, &cfg, &domtree).is_ok());
    }

    #[test]
    fn missing_terminator_is_caught() {
        let sig = Signature::new(CallConv::SystemV);
        let mut func = Function::new("broken", sig);
        {
            let mut b = FunctionBuilder::new(&mut func);
            let entry = b.create_block();
            b.switch_to_block(entry);
            b.iconst(crate::ir::types::I32, 1);
        }
        let cfg = ControlFlowGraph::with_function(&func);
        let domtree = DominatorTree::with_function(&func, &cfg);
        let result = verify_function(&func, &cfg, &domtree);
        assert!(result.is_err());
        assert!(result.unwrap_err().0.iter().any(|e| e.message.contains("terminator")));
    }
}
