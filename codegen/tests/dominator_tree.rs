//! Diamond-shaped CFG dominance, spec.md §8 E8.

use retarget_codegen::dominator_tree::DominatorTree;
use retarget_codegen::flowgraph::ControlFlowGraph;
use retarget_codegen::ir::*;

fn build_diamond() -> (Function, Block, Block, Block, Block) {
    let sig = Signature::new(CallConv::SystemV);
    let mut func = Function::new("diamond", sig);
    let (entry, l, r, exit) = {
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
        (entry, l, r, exit)
    };
    (func, entry, l, r, exit)
}

#[test]
fn diamond_idoms() {
    let (func, entry, l, r, exit) = build_diamond();
    let cfg = ControlFlowGraph::with_function(&func);
    let domtree = DominatorTree::with_function(&func, &cfg);

    assert_eq!(domtree.idom(l), Some(entry));
    assert_eq!(domtree.idom(r), Some(entry));
    assert_eq!(domtree.idom(exit), Some(entry));
    assert_eq!(domtree.idom(entry), None);
}

#[test]
fn diamond_dominance_frontiers() {
    let (func, entry, l, r, exit) = build_diamond();
    let cfg = ControlFlowGraph::with_function(&func);
    let domtree = DominatorTree::with_function(&func, &cfg);
    let df = domtree.dominance_frontiers(&func, &cfg);

    assert_eq!(df[l], vec![exit]);
    assert_eq!(df[r], vec![exit]);
    assert!(df[entry].is_empty());
}

#[test]
fn diamond_strict_vs_nonstrict_dominance() {
    let (func, entry, l, _r, exit) = build_diamond();
    let cfg = ControlFlowGraph::with_function(&func);
    let domtree = DominatorTree::with_function(&func, &cfg);

    assert!(domtree.dominates(entry, exit));
    assert!(!domtree.strictly_dominates(exit, exit));
    assert!(domtree.dominates(exit, exit));
    assert!(!domtree.dominates(l, exit));
}
