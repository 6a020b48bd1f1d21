//! Live-range computation over `VCode` program points (spec.md §4.6).
//!
//! A program point is `VCode::program_point(idx) = 2*idx`; the odd number
//! right after it is "after this instruction" and is what a use's interval
//! extends to, so a value defined and used by adjacent instructions gets a
//! half-open `[def, use+1)` interval rather than a zero-width one.

use crate::flowgraph::ControlFlowGraph;
use crate::ir::Block;
use crate::machinst::reg::{RegClass, VReg};
use crate::machinst::vcode::{MachInst, VCode};
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug, Default)]
pub struct Liveness {
    /// Per-VReg interval list, each `[start, end)`, not necessarily sorted
    /// or merged across blocks (the interference check only needs overlap,
    /// not a canonical form).
    pub ranges: HashMap<VReg, Vec<(u32, u32)>>,
    pub classes: HashMap<VReg, RegClass>,
}

impl Liveness {
    pub fn vregs(&self) -> impl Iterator<Item = VReg> + '_ {
        self.ranges.keys().copied()
    }

    pub fn overlaps(&self, a: VReg, b: VReg) -> bool {
        let (Some(ia), Some(ib)) = (self.ranges.get(&a), self.ranges.get(&b)) else {
            return false;
        };
        ia.iter().any(|&(s1, e1)| ib.iter().any(|&(s2, e2)| s1 < e2 && s2 < e1))
    }

    /// `true` iff any of `vreg`'s intervals contains `point`.
    pub fn live_at(&self, vreg: VReg, point: u32) -> bool {
        self.ranges
            .get(&vreg)
            .map_or(false, |ivs| ivs.iter().any(|&(s, e)| s <= point && point < e))
    }
}

/// Block-level gen/kill sets: `gen` is upward-exposed uses (read before any
/// def in the block), `def` is values defined anywhere in the block.
#[derive(Default)]
struct BlockSets {
    gen: HashSet<VReg>,
    def: HashSet<VReg>,
}

pub fn compute_liveness<I: MachInst>(vcode: &VCode<I>, cfg: &ControlFlowGraph) -> Liveness {
    let mut sets: HashMap<Block, BlockSets> = HashMap::new();

    for &(block, start, end) in &vcode.block_ranges {
        let mut s = BlockSets::default();
        for idx in start..end {
            for u in vcode.insts[idx].uses() {
                if let Some(v) = u.as_vreg() {
                    if !s.def.contains(&v) {
                        s.gen.insert(v);
                    }
                }
            }
            for d in vcode.insts[idx].defs() {
                if let Some(v) = d.as_vreg() {
                    s.def.insert(v);
                }
            }
        }
        // A block-call edge's argument is read at the very end of this
        // block, after its own instructions; if it wasn't already
        // redefined locally, it's upward-exposed just like any other use.
        for ((from, _to), moves) in &vcode.edge_moves {
            if *from == block {
                for mv in moves {
                    if let Some(v) = mv.src.as_vreg() {
                        if !s.def.contains(&v) {
                            s.gen.insert(v);
                        }
                    }
                }
            }
        }
        sets.insert(block, s);
    }

    let blocks: Vec<Block> = vcode.block_ranges.iter().map(|&(b, _, _)| b).collect();
    let mut live_in: HashMap<Block, HashSet<VReg>> =
        blocks.iter().map(|&b| (b, HashSet::new())).collect();
    let mut live_out: HashMap<Block, HashSet<VReg>> =
        blocks.iter().map(|&b| (b, HashSet::new())).collect();

    // Backward dataflow fixpoint; loops need more than one pass so iterate
    // until nothing changes rather than a single reverse sweep.
    loop {
        let mut changed = false;
        for &block in blocks.iter().rev() {
            let mut out = HashSet::new();
            for succ in cfg.succ_iter(block) {
                if let Some(succ_in) = live_in.get(&succ) {
                    out.extend(succ_in.iter().copied());
                }
            }
            if out != live_out[&block] {
                live_out.insert(block, out.clone());
                changed = true;
            }
            let empty = BlockSets::default();
            let s = sets.get(&block).unwrap_or(&empty);
            let mut inn: HashSet<VReg> = out.difference(&s.def).copied().collect();
            inn.extend(s.gen.iter().copied());
            if inn != live_in[&block] {
                live_in.insert(block, inn);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut liveness = Liveness::default();
    for &(block, start, end) in &vcode.block_ranges {
        let block_end_point = VCode::<I>::program_point(end);
        let mut live: HashSet<VReg> = live_out[&block].clone();
        let mut open_end: HashMap<VReg, u32> =
            live.iter().map(|&v| (v, block_end_point)).collect();

        // Edge-move sources are used at the block's closing point.
        for ((from, _to), moves) in &vcode.edge_moves {
            if *from == block {
                for mv in moves {
                    if let Some(v) = mv.src.as_vreg() {
                        liveness.classes.insert(v, mv.class);
                        if !live.contains(&v) {
                            live.insert(v);
                            open_end.insert(v, block_end_point);
                        }
                    }
                }
            }
        }

        for idx in (start..end).rev() {
            let pt = VCode::<I>::program_point(idx);
            let inst = &vcode.insts[idx];
            for d in inst.defs() {
                if let Some(v) = d.as_vreg() {
                    liveness.classes.insert(v, v.class());
                    let end_pt = open_end.remove(&v).unwrap_or(pt + 1);
                    liveness.ranges.entry(v).or_default().push((pt, end_pt));
                    live.remove(&v);
                }
            }
            for u in inst.uses() {
                if let Some(v) = u.as_vreg() {
                    liveness.classes.insert(v, v.class());
                    if !live.contains(&v) {
                        live.insert(v);
                        open_end.insert(v, pt + 1);
                    }
                }
            }
        }

        let block_start_point = VCode::<I>::program_point(start);
        for (v, end_pt) in open_end {
            liveness.ranges.entry(v).or_default().push((block_start_point, end_pt));
        }
    }

    liveness
}
