//! Dominator tree and dominance frontier (spec.md §4.2), computed over a
//! `ControlFlowGraph` by the Cooper-Harvey-Kennedy iterative fixpoint
//! algorithm: repeatedly intersect `idom` candidates over already-processed
//! predecessors, walking in reverse post-order, until nothing changes.
//!
//! Forward dominance only — there is no post-dominator tree here. Building
//! one needs a synthetic exit node tying together every block that has no
//! successor (more than one of those is routine once `try_call`'s
//! exception edges and multiple `return`s are in the mix), and `compute`'s
//! `Block`-keyed maps have no representation for a node that isn't one of
//! the function's own blocks. A client that needs post-dominance (e.g. for
//! a control-dependence-based optimization) has to build its own reverse
//! CFG with that synthetic node and run `compute` against it.

use crate::flowgraph::ControlFlowGraph;
use crate::ir::{Block, Function};
use retarget_entity::SecondaryMap;
use std::collections::HashMap;

/// Immediate-dominator relation plus the tree's children lists, computed
/// over the forward CFG from the function's entry block.
pub struct DominatorTree {
    idom: SecondaryMap<Block, Option<Block>>,
    children: SecondaryMap<Block, Vec<Block>>,
    rpo: Vec<Block>,
    rpo_number: HashMap<Block, u32>,
    entry: Option<Block>,
}

impl DominatorTree {
    pub fn new() -> Self {
        Self {
            idom: SecondaryMap::new(),
            children: SecondaryMap::new(),
            rpo: Vec::new(),
            rpo_number: HashMap::new(),
            entry: None,
        }
    }

    pub fn with_function(func: &Function, cfg: &ControlFlowGraph) -> Self {
        let mut dt = Self::new();
        dt.compute(func, cfg);
        dt
    }

    pub fn compute(&mut self, func: &Function, cfg: &ControlFlowGraph) {
        let entry = match func.layout.entry_block() {
            Some(b) => b,
            None => return,
        };
        self.entry = Some(entry);

        let rpo = reverse_post_order(func, cfg, entry);
        self.rpo_number = rpo.iter().enumerate().map(|(i, &b)| (b, i as u32)).collect();
        self.rpo = rpo;

        self.idom = SecondaryMap::new();
        self.idom[entry] = None;

        let mut changed = true;
        while changed {
            changed = false;
            // Skip the entry block (index 0 in RPO).
            for &block in self.rpo.iter().skip(1) {
                let mut new_idom: Option<Block> = None;
                for pred in cfg.pred_iter(block) {
                    let p = pred.block;
                    if !self.rpo_number.contains_key(&p) {
                        continue; // unreachable predecessor
                    }
                    if self.processed(p) {
                        new_idom = Some(match new_idom {
                            None => p,
                            Some(cur) => self.intersect(cur, p),
                        });
                    }
                }
                if new_idom != self.idom[block] {
                    self.idom[block] = new_idom;
                    changed = true;
                }
            }
        }

        self.children = SecondaryMap::new();
        for &block in &self.rpo {
            if let Some(idom) = self.idom[block] {
                self.children[idom].push(block);
            }
        }
    }

    fn processed(&self, block: Block) -> bool {
        block == self.entry.unwrap() || self.idom[block].is_some()
    }

    fn intersect(&self, a: Block, b: Block) -> Block {
        let mut a = a;
        let mut b = b;
        loop {
            let an = self.rpo_number[&a];
            let bn = self.rpo_number[&b];
            if an == bn {
                return a;
            }
            while self.rpo_number[&a] > self.rpo_number[&b] {
                a = self.idom[a].expect("walked past the entry block");
            }
            while self.rpo_number[&b] > self.rpo_number[&a] {
                b = self.idom[b].expect("walked past the entry block");
            }
        }
    }

    pub fn idom(&self, block: Block) -> Option<Block> {
        self.idom[block]
    }

    pub fn children(&self, block: Block) -> &[Block] {
        &self.children[block]
    }

    pub fn is_reachable(&self, block: Block) -> bool {
        self.rpo_number.contains_key(&block) || self.entry == Some(block)
    }

    /// `a` dominates `b`: either `a == b`, or `a` is a strict ancestor of
    /// `b` in the tree. Reflexive per spec.md Property 2.
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        if a == b {
            return true;
        }
        if !self.is_reachable(b) {
            return false;
        }
        let mut cur = b;
        loop {
            match self.idom[cur] {
                Some(p) => {
                    if p == a {
                        return true;
                    }
                    cur = p;
                }
                None => return false,
            }
        }
    }

    pub fn strictly_dominates(&self, a: Block, b: Block) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Dominance frontier of every block: `b ∈ DF(x)` iff `x` dominates
    /// some predecessor of `b` and `x` does not strictly dominate `b`
    /// (spec.md §4.2, Property 3).
    pub fn dominance_frontiers(&self, func: &Function, cfg: &ControlFlowGraph) -> SecondaryMap<Block, Vec<Block>> {
        let mut df: SecondaryMap<Block, Vec<Block>> = SecondaryMap::new();
        for block in func.layout.blocks() {
            if !self.is_reachable(block) || cfg.num_preds(block) < 2 {
                continue;
            }
            let idom_b = self.idom[block];
            for pred in cfg.pred_iter(block) {
                if !self.is_reachable(pred.block) {
                    continue;
                }
                let mut runner = pred.block;
                while Some(runner) != idom_b {
                    if !df[runner].contains(&block) {
                        df[runner].push(block);
                    }
                    match self.idom[runner] {
                        Some(next) => runner = next,
                        None => break,
                    }
                }
            }
        }
        df
    }
}

impl Default for DominatorTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Reverse post-order starting from `entry`, following CFG successor
/// edges. Blocks unreachable from `entry` are absent.
fn reverse_post_order(func: &Function, cfg: &ControlFlowGraph, entry: Block) -> Vec<Block> {
    let _ = func;
    let mut visited: HashMap<Block, bool> = HashMap::new();
    let mut post_order = Vec::new();
    // Explicit stack DFS: (block, successor-iterator-position).
    let mut stack: Vec<(Block, Vec<Block>, usize)> = Vec::new();
    visited.insert(entry, true);
    stack.push((entry, cfg.succ_iter(entry).collect(), 0));

    while let Some((block, succs, idx)) = stack.last_mut() {
        if *idx < succs.len() {
            let next = succs[*idx];
            *idx += 1;
            if !visited.contains_key(&next) {
                visited.insert(next, true);
                let next_succs: Vec<Block> = cfg.succ_iter(next).collect();
                stack.push((next, next_succs, 0));
            }
        } else {
            post_order.push(*block);
            stack.pop();
        }
    }

    post_order.reverse();
    post_order
}
