//! Chaitin-Briggs coloring with iterated coalescing (spec.md §4.7).
//!
//! Build (via `interference::build`) -> Coalesce (Briggs-safe merges of
//! move-related pairs) -> Simplify (repeatedly remove degree-<K nodes,
//! optimistically removing a cheap high-degree one when stuck) -> Select
//! (pop the stack, pick a color none of a node's already-colored neighbors
//! or excluded-by-call-clobber set holds) -> spill rewrite when Select runs
//! out of colors for a node, then start the next round over.
//!
//! Loop-depth discount on spill cost isn't implemented: there's no natural-
//! loop analysis in this crate to drive it, so the heuristic is plain
//! live-range length times use count.

use std::collections::{HashMap, HashSet};

use crate::flowgraph::ControlFlowGraph;
use crate::machinst::reg::{PReg, RegClass, RegRef, VReg, VRegAllocator};
use crate::machinst::vcode::{MachInst, VCode};
use crate::result::{CodegenError, CodegenResult};

use super::interference::{self, InterferenceGraph};
use super::liveness::{self, Liveness};

const MAX_ROUNDS: u32 = 8;

/// Union-find over `VReg`, used to treat a coalesced move-related pair as a
/// single node through simplify/select without rewriting `VCode` until the
/// final assignment is known.
#[derive(Default)]
struct UnionFind {
    parent: HashMap<VReg, VReg>,
}

impl UnionFind {
    fn find(&mut self, v: VReg) -> VReg {
        let p = match self.parent.get(&v) {
            None => return v,
            Some(&p) if p == v => return v,
            Some(&p) => p,
        };
        let root = self.find(p);
        self.parent.insert(v, root);
        root
    }

    fn union(&mut self, a: VReg, b: VReg) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent.insert(ra, rb);
        }
    }
}

fn class_k(class: RegClass, int_pregs: &[PReg], float_pregs: &[PReg]) -> usize {
    match class {
        RegClass::Int => int_pregs.len(),
        RegClass::Float => float_pregs.len(),
    }
}

fn pregs_for(class: RegClass, int_pregs: &[PReg], float_pregs: &[PReg]) -> Vec<PReg> {
    match class {
        RegClass::Int => int_pregs.to_vec(),
        RegClass::Float => float_pregs.to_vec(),
    }
}

/// Coalesce move-related pairs that are safe under the Briggs test: the
/// merged node's neighbors with degree >= K number fewer than K, so it's
/// guaranteed colorable regardless of what its neighbors end up with.
fn coalesce(
    graph: &InterferenceGraph,
    int_pregs: &[PReg],
    float_pregs: &[PReg],
) -> (UnionFind, HashMap<VReg, HashSet<VReg>>) {
    let mut uf = UnionFind::default();
    let mut eff_adj: HashMap<VReg, HashSet<VReg>> = HashMap::new();
    for v in graph.nodes() {
        eff_adj.insert(v, graph.neighbors(v).collect());
    }

    for &(d, s) in &graph.moves {
        let (rd, rs) = (uf.find(d), uf.find(s));
        if rd == rs {
            continue;
        }
        if eff_adj.get(&rd).map_or(false, |n| n.contains(&rs)) {
            continue; // already interfere, can't coalesce
        }
        let k = class_k(rd.class(), int_pregs, float_pregs);
        let mut combined: HashSet<VReg> = HashSet::new();
        combined.extend(eff_adj.get(&rd).into_iter().flatten().copied());
        combined.extend(eff_adj.get(&rs).into_iter().flatten().copied());
        combined.remove(&rd);
        combined.remove(&rs);
        let high_degree = combined
            .iter()
            .filter(|&&n| eff_adj.get(&n).map_or(0, |s| s.len()) >= k)
            .count();
        if high_degree >= k {
            continue; // not Briggs-safe, leave them separate
        }

        // Merge rd into rs: move rd's neighbor edges over to rs.
        let rd_neighbors = eff_adj.remove(&rd).unwrap_or_default();
        for n in rd_neighbors {
            if n == rs {
                continue;
            }
            if let Some(set) = eff_adj.get_mut(&n) {
                set.remove(&rd);
                set.insert(rs);
            }
            eff_adj.entry(rs).or_default().insert(n);
        }
        uf.union(rd, rs);
    }

    (uf, eff_adj)
}

/// Use count + total live-range length per vreg, for spill-candidate
/// selection when nothing simplifies at degree < K.
fn spill_costs<I: MachInst>(vcode: &VCode<I>, liveness: &Liveness) -> HashMap<VReg, f64> {
    let mut use_count: HashMap<VReg, u32> = HashMap::new();
    for inst in &vcode.insts {
        for u in inst.uses() {
            if let Some(v) = u.as_vreg() {
                *use_count.entry(v).or_insert(0) += 1;
            }
        }
        for d in inst.defs() {
            if let Some(v) = d.as_vreg() {
                *use_count.entry(v).or_insert(0) += 1;
            }
        }
    }
    let mut costs = HashMap::new();
    for v in liveness.vregs() {
        let length: u32 = liveness.ranges[&v].iter().map(|&(s, e)| e - s).sum();
        let freq = *use_count.get(&v).unwrap_or(&1) as f64;
        costs.insert(v, length as f64 * freq);
    }
    costs
}

enum StackEntry {
    Simplified(VReg),
    /// Pushed while still at degree >= K; may or may not get a color.
    OptimisticSpill(VReg),
}

/// Simplify/select over the coalesced (union-find-collapsed) graph. Returns
/// the color assigned to each representative, or the set of representatives
/// that couldn't be colored (actual spills).
fn simplify_and_select(
    mut eff_adj: HashMap<VReg, HashSet<VReg>>,
    costs: &HashMap<VReg, f64>,
    excluded: &HashMap<VReg, HashSet<PReg>>,
    int_pregs: &[PReg],
    float_pregs: &[PReg],
) -> (HashMap<VReg, PReg>, HashSet<VReg>) {
    let mut remaining: HashSet<VReg> = eff_adj.keys().copied().collect();
    let mut stack = Vec::new();

    while !remaining.is_empty() {
        let k_of = |v: VReg| class_k(v.class(), int_pregs, float_pregs);
        let low_degree = remaining
            .iter()
            .copied()
            .find(|&v| eff_adj.get(&v).map_or(0, |n| n.len()) < k_of(v));

        let chosen = if let Some(v) = low_degree {
            StackEntry::Simplified(v)
        } else {
            // Stuck: everyone left has degree >= K. Pick the cheapest to
            // spill, scaled by how much simplifying it would help (degree).
            let pick = remaining
                .iter()
                .copied()
                .min_by(|&a, &b| {
                    let ca = costs.get(&a).copied().unwrap_or(0.0)
                        / eff_adj.get(&a).map_or(1, |n| n.len().max(1)) as f64;
                    let cb = costs.get(&b).copied().unwrap_or(0.0)
                        / eff_adj.get(&b).map_or(1, |n| n.len().max(1)) as f64;
                    ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
                })
                .expect("remaining is non-empty");
            StackEntry::OptimisticSpill(pick)
        };

        let v = match chosen {
            StackEntry::Simplified(v) | StackEntry::OptimisticSpill(v) => v,
        };
        remaining.remove(&v);
        let neighbors = eff_adj.remove(&v).unwrap_or_default();
        for n in &neighbors {
            if let Some(set) = eff_adj.get_mut(n) {
                set.remove(&v);
            }
        }
        eff_adj.insert(v, neighbors);
        stack.push(chosen);
    }

    let mut colored: HashMap<VReg, PReg> = HashMap::new();
    let mut spilled: HashSet<VReg> = HashSet::new();

    while let Some(entry) = stack.pop() {
        let v = match entry {
            StackEntry::Simplified(v) | StackEntry::OptimisticSpill(v) => v,
        };
        let avoid: HashSet<PReg> = eff_adj
            .get(&v)
            .into_iter()
            .flatten()
            .filter_map(|n| colored.get(n).copied())
            .chain(excluded.get(&v).into_iter().flatten().copied())
            .collect();
        let candidates = pregs_for(v.class(), int_pregs, float_pregs);
        match candidates.into_iter().find(|p| !avoid.contains(p)) {
            Some(p) => {
                colored.insert(v, p);
            }
            None => {
                spilled.insert(v);
            }
        }
    }

    (colored, spilled)
}

/// Splits every spilled vreg's live range into a fresh vreg per
/// use/def site, each bracketed by a reload/store to its spill slot, so the
/// next round's coloring sees short, easy-to-color ranges instead of the
/// one that just failed.
fn rewrite_spills<I: MachInst>(
    vcode: &VCode<I>,
    spills: &HashSet<VReg>,
    slot_of: &mut HashMap<VReg, i32>,
    next_slot: &mut i32,
    vregs: &mut VRegAllocator,
) -> VCode<I> {
    for &v in spills {
        slot_of.entry(v).or_insert_with(|| {
            let slot = *next_slot;
            *next_slot += 8;
            slot
        });
    }

    let mut new_insts: Vec<I> = Vec::new();
    let mut new_block_ranges = Vec::new();

    for &(block, start, end) in &vcode.block_ranges {
        let new_start = new_insts.len();
        for idx in start..end {
            let orig = &vcode.insts[idx];
            let mut fresh: HashMap<VReg, VReg> = HashMap::new();

            for u in orig.uses() {
                if let Some(v) = u.as_vreg() {
                    if spills.contains(&v) {
                        fresh.entry(v).or_insert_with(|| vregs.alloc(v.class()));
                    }
                }
            }
            for d in orig.defs() {
                if let Some(v) = d.as_vreg() {
                    if spills.contains(&v) {
                        fresh.entry(v).or_insert_with(|| vregs.alloc(v.class()));
                    }
                }
            }

            let mut loaded: HashSet<VReg> = HashSet::new();
            for u in orig.uses() {
                if let Some(v) = u.as_vreg() {
                    if let Some(&fv) = fresh.get(&v) {
                        if loaded.insert(v) {
                            let slot = slot_of[&v];
                            new_insts.push(I::spill_load(RegRef::Virtual(fv), slot, v.class()));
                        }
                    }
                }
            }

            let mut inst = orig.clone();
            inst.rewrite_regs(&mut |r| match r.as_vreg() {
                Some(v) => fresh.get(&v).map(|&fv| RegRef::Virtual(fv)).unwrap_or(r),
                None => r,
            });
            new_insts.push(inst);

            for d in orig.defs() {
                if let Some(v) = d.as_vreg() {
                    if let Some(&fv) = fresh.get(&v) {
                        let slot = slot_of[&v];
                        new_insts.push(I::spill_store(RegRef::Virtual(fv), slot, v.class()));
                    }
                }
            }
        }
        new_block_ranges.push((block, new_start, new_insts.len()));
    }

    VCode {
        insts: new_insts,
        block_ranges: new_block_ranges,
        edge_moves: vcode.edge_moves.clone(),
        reloc_kind_hint: vcode.reloc_kind_hint,
    }
}

/// Final result: every register operand physical, plus the frame-relative
/// byte offset one past the last spill slot used. `allocate`'s
/// `spill_area_base` lets a caller reserve lower offsets for something else
/// (declared stack slots); subtract `spill_area_base` from this to get just
/// the spill area's own size.
pub struct RegAllocResult<I: MachInst> {
    pub vcode: VCode<I>,
    pub spill_area_end: u32,
}

pub fn allocate<I: MachInst>(
    mut vcode: VCode<I>,
    cfg: &ControlFlowGraph,
    vregs: &mut VRegAllocator,
    int_pregs: &[PReg],
    float_pregs: &[PReg],
    spill_area_base: i32,
) -> CodegenResult<RegAllocResult<I>> {
    let mut slot_of: HashMap<VReg, i32> = HashMap::new();
    let mut next_slot: i32 = spill_area_base;

    for round in 0..MAX_ROUNDS {
        let liveness = liveness::compute_liveness(&vcode, cfg);
        let graph = interference::build(&vcode, &liveness);

        if liveness.vregs().next().is_none() {
            // Nothing to color (e.g. an empty function body).
            return Ok(RegAllocResult { vcode, spill_area_end: next_slot as u32 });
        }

        // `coalesce` seeds every node from `graph.nodes()` and merges
        // away-node edges into the surviving representative, so the
        // returned map is already keyed one-entry-per-representative.
        let (mut uf, eff_adj) = coalesce(&graph, int_pregs, float_pregs);

        let costs = spill_costs(&vcode, &liveness);
        let mut rep_costs: HashMap<VReg, f64> = HashMap::new();
        for v in liveness.vregs() {
            let rep = uf.find(v);
            *rep_costs.entry(rep).or_insert(0.0) += costs.get(&v).copied().unwrap_or(0.0);
        }
        let mut rep_excluded: HashMap<VReg, HashSet<PReg>> = HashMap::new();
        for v in liveness.vregs() {
            let rep = uf.find(v);
            if let Some(ex) = graph.excluded.get(&v) {
                rep_excluded.entry(rep).or_default().extend(ex.iter().copied());
            }
        }

        let (rep_colors, rep_spills) =
            simplify_and_select(eff_adj, &rep_costs, &rep_excluded, int_pregs, float_pregs);

        if rep_spills.is_empty() {
            let colored: HashMap<VReg, PReg> = liveness
                .vregs()
                .filter_map(|v| rep_colors.get(&uf.find(v)).map(|&p| (v, p)))
                .collect();

            vcode.insts.iter_mut().for_each(|inst| {
                inst.rewrite_regs(&mut |r| match r.as_vreg() {
                    Some(v) => colored.get(&v).map(|&p| RegRef::Physical(p)).unwrap_or(r),
                    None => r,
                });
            });
            for moves in vcode.edge_moves.values_mut() {
                for mv in moves.iter_mut() {
                    if let Some(v) = mv.dst.as_vreg() {
                        if let Some(&p) = colored.get(&v) {
                            mv.dst = RegRef::Physical(p);
                        }
                    }
                    if let Some(v) = mv.src.as_vreg() {
                        if let Some(&p) = colored.get(&v) {
                            mv.src = RegRef::Physical(p);
                        }
                    }
                }
            }

            return Ok(RegAllocResult { vcode, spill_area_end: next_slot as u32 });
        }

        // Map representative spills back to every original vreg merged into
        // them, then rewrite. A vreg whose rep wasn't itself spilled stays.
        let actual_spills: HashSet<VReg> = liveness
            .vregs()
            .filter(|&v| rep_spills.contains(&uf.find(v)))
            .collect();

        if round + 1 == MAX_ROUNDS {
            return Err(CodegenError::RegAllocFailure(format!(
                "failed to color after {} rounds, {} vregs still spilling",
                MAX_ROUNDS,
                actual_spills.len()
            )));
        }

        vcode = rewrite_spills(&vcode, &actual_spills, &mut slot_of, &mut next_slot, vregs);
    }

    Err(CodegenError::RegAllocFailure("exceeded max regalloc rounds".to_string()))
}
