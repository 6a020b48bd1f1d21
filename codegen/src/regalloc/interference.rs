//! Interference graph construction (spec.md §4.6).
//!
//! A node per live VReg, an edge between any two of the same `RegClass`
//! whose intervals overlap. Call-site clobbers don't get their own graph
//! nodes (pregs aren't colored); instead any VReg live across a call
//! records the call's clobber set as colors it must avoid.

use crate::machinst::reg::{PReg, VReg};
use crate::machinst::vcode::{MachInst, VCode};
use std::collections::{HashMap, HashSet};

use super::liveness::Liveness;

#[derive(Default)]
pub struct InterferenceGraph {
    adjacency: HashMap<VReg, HashSet<VReg>>,
    pub excluded: HashMap<VReg, HashSet<PReg>>,
    /// Move-related pairs (`dst`, `src`) from `MachInst::is_move`,
    /// candidates for coalescing.
    pub moves: Vec<(VReg, VReg)>,
}

impl InterferenceGraph {
    /// Every vreg with a node in the graph (including isolated ones with no
    /// interferences), as seeded by `build`.
    pub fn nodes(&self) -> impl Iterator<Item = VReg> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn neighbors(&self, v: VReg) -> impl Iterator<Item = VReg> + '_ {
        self.adjacency.get(&v).into_iter().flatten().copied()
    }

    pub fn degree(&self, v: VReg) -> usize {
        self.adjacency.get(&v).map_or(0, |s| s.len())
    }

    pub fn interferes(&self, a: VReg, b: VReg) -> bool {
        self.adjacency.get(&a).map_or(false, |s| s.contains(&b))
    }

    fn add_edge(&mut self, a: VReg, b: VReg) {
        if a == b {
            return;
        }
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    fn ensure_node(&mut self, v: VReg) {
        self.adjacency.entry(v).or_default();
    }
}

pub fn build<I: MachInst>(vcode: &VCode<I>, liveness: &Liveness) -> InterferenceGraph {
    let mut graph = InterferenceGraph::default();

    let vregs: Vec<VReg> = liveness.vregs().collect();
    for &v in &vregs {
        graph.ensure_node(v);
    }
    for (i, &a) in vregs.iter().enumerate() {
        for &b in &vregs[i + 1..] {
            if a.class() == b.class() && liveness.overlaps(a, b) {
                graph.add_edge(a, b);
            }
        }
    }

    for &(_, start, end) in &vcode.block_ranges {
        for idx in start..end {
            let inst = &vcode.insts[idx];
            if let Some((dst, src)) = inst.is_move() {
                if let (Some(d), Some(s)) = (dst.as_vreg(), src.as_vreg()) {
                    graph.moves.push((d, s));
                }
            }
            if inst.is_call() {
                let point = VCode::<I>::program_point(idx);
                let clobbered = inst.clobbers();
                for &v in &vregs {
                    if liveness.live_at(v, point) {
                        for &preg in clobbered {
                            if preg.class() == v.class() {
                                graph.excluded.entry(v).or_default().insert(preg);
                            }
                        }
                    }
                }
            }
        }
    }

    graph
}
