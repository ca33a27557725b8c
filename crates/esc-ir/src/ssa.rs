//! SSA construction: dominator tree, dominance frontiers, phi placement
//! and variable renaming.
//!
//! Dominance uses the iterative Cooper-Harvey-Kennedy scheme over reverse
//! postorder; frontiers come from the classic two-predecessor walk. Phi
//! placement iterates the frontier of each variable's def set to a fixed
//! point, inserting phis only into reachable blocks with two or more
//! predecessors, so no phi ever survives in a single-predecessor block.
//!
//! Contract after [`construct`]:
//! * every load references the most recent dominating version,
//! * no two definitions of a name share a version number,
//! * every phi has exactly as many operand pairs as its block has
//!   predecessors.
//!
//! [`verify`] re-checks the three and returns the violations; `construct`
//! runs it before returning and converts a non-empty list into
//! [`IrError::Malformed`], because a violation here is a compiler bug, not
//! a user error.

use std::collections::{HashMap, HashSet};

use crate::error::IrError;
use crate::module::{BlockId, FuncId, Module, Opcode, Phi, Sym, Value, VarId};

/// Dominator tree over the reachable blocks of one function, in reverse
/// postorder. All vectors are indexed by RPO position; position 0 is the
/// entry block.
pub struct DomTree {
    pub order: Vec<BlockId>,
    pub position: HashMap<BlockId, usize>,
    pub idom: Vec<usize>,
    pub children: Vec<Vec<usize>>,
    pub frontier: Vec<Vec<usize>>,
}

impl DomTree {
    pub fn build(module: &Module, func: FuncId) -> Self {
        let entry = module.function(func).entry;

        // Depth-first postorder, reversed, gives RPO; unreachable blocks
        // never enter the ordering and are ignored by everything below.
        let mut postorder = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![(entry, false)];
        while let Some((block, expanded)) = stack.pop() {
            if expanded {
                postorder.push(block);
                continue;
            }
            if !seen.insert(block) {
                continue;
            }
            stack.push((block, true));
            for succ in module.successors(block) {
                if !seen.contains(&succ) {
                    stack.push((succ, false));
                }
            }
        }
        let order: Vec<BlockId> = postorder.into_iter().rev().collect();
        let position: HashMap<BlockId, usize> =
            order.iter().enumerate().map(|(i, &b)| (b, i)).collect();

        // Predecessors restricted to reachable blocks, as RPO indices.
        let preds: Vec<Vec<usize>> = order
            .iter()
            .map(|&b| {
                module
                    .blocks
                    .get(b)
                    .preds
                    .iter()
                    .filter_map(|p| position.get(p).copied())
                    .collect()
            })
            .collect();

        // Cooper-Harvey-Kennedy iteration to a fixed point.
        let undefined = usize::MAX;
        let mut idom = vec![undefined; order.len()];
        if !order.is_empty() {
            idom[0] = 0;
        }
        let intersect = |idom: &[usize], mut a: usize, mut b: usize| {
            while a != b {
                while a > b {
                    a = idom[a];
                }
                while b > a {
                    b = idom[b];
                }
            }
            a
        };
        let mut changed = true;
        while changed {
            changed = false;
            for b in 1..order.len() {
                let mut new_idom = undefined;
                for &p in &preds[b] {
                    if idom[p] == undefined {
                        continue;
                    }
                    new_idom = if new_idom == undefined {
                        p
                    } else {
                        intersect(&idom, new_idom, p)
                    };
                }
                if new_idom != undefined && idom[b] != new_idom {
                    idom[b] = new_idom;
                    changed = true;
                }
            }
        }

        let mut children = vec![Vec::new(); order.len()];
        for b in 1..order.len() {
            if idom[b] != undefined {
                children[idom[b]].push(b);
            }
        }

        // Dominance frontiers: runner walk from each predecessor of a join.
        let mut frontier = vec![Vec::new(); order.len()];
        for b in 0..order.len() {
            if preds[b].len() < 2 {
                continue;
            }
            for &p in &preds[b] {
                let mut runner = p;
                while runner != idom[b] {
                    if !frontier[runner].contains(&b) {
                        frontier[runner].push(b);
                    }
                    runner = idom[runner];
                }
            }
        }

        Self {
            order,
            position,
            idom,
            children,
            frontier,
        }
    }

    /// Does the block at RPO position `a` dominate the one at `b`?
    pub fn dominates(&self, a: usize, b: usize) -> bool {
        let mut runner = b;
        loop {
            if runner == a {
                return true;
            }
            if runner == 0 {
                return false;
            }
            runner = self.idom[runner];
        }
    }
}

struct Renamer<'m> {
    module: &'m mut Module,
    func: FuncId,
    stacks: HashMap<Sym, Vec<VarId>>,
    counters: HashMap<Sym, u32>,
}

impl<'m> Renamer<'m> {
    fn new_version(&mut self, sym: Sym, block: BlockId) -> VarId {
        let counter = self.counters.entry(sym).or_insert(0);
        *counter += 1;
        let version = *counter;
        let ty = self
            .module
            .function(self.func)
            .symbols
            .get(&sym)
            .and_then(|&v0| self.module.vars.get(v0).ty);
        let var = self.module.vars.alloc();
        let slot = self.module.vars.get_mut(var);
        slot.name = Some(sym);
        slot.version = version;
        slot.ty = ty;
        slot.def_block = Some(block);
        var
    }

    /// Is `var` a pre-SSA named variable reference (version 0 bound in the
    /// function symbol map) rather than a single-assignment temporary?
    fn is_named_ref(&self, var: VarId) -> Option<Sym> {
        let record = self.module.vars.get(var);
        let sym = record.name?;
        if record.version == 0
            && self.module.function(self.func).symbols.get(&sym) == Some(&var)
        {
            Some(sym)
        } else {
            None
        }
    }

    fn visit(&mut self, dom: &DomTree, b: usize) {
        let block_id = dom.order[b];
        let mut pushed: Vec<Sym> = Vec::new();

        // Phi results define a fresh version at block entry.
        let phi_ids = self.module.blocks.get(block_id).phis.clone();
        for phi_id in &phi_ids {
            let sym = self.module.phis.get(*phi_id).name.expect("phi has a name");
            let var = self.new_version(sym, block_id);
            self.module.phis.get_mut(*phi_id).result = Some(var);
            self.stacks.entry(sym).or_default().push(var);
            pushed.push(sym);
        }

        let inst_ids = self.module.blocks.get(block_id).insts.clone();
        for inst_id in inst_ids {
            let opcode = self.module.insts.get(inst_id).opcode;
            if opcode == Opcode::Store {
                // store [dest, value]: rewrite the value operand first, then
                // turn the destination into the instruction result.
                let dest = match self.module.insts.get(inst_id).operands.first() {
                    Some(Value::Var(v)) => self.is_named_ref(*v),
                    _ => None,
                };
                let mut operands = self.module.insts.get(inst_id).operands.clone();
                for operand in operands.iter_mut().skip(1) {
                    self.rewrite_use(operand);
                }
                if let Some(sym) = dest {
                    operands.remove(0);
                    let var = self.new_version(sym, block_id);
                    {
                        let inst = self.module.insts.get_mut(inst_id);
                        inst.operands = operands;
                        inst.result = Some(var);
                    }
                    self.module.vars.get_mut(var).def_inst = Some(inst_id);
                    self.stacks.entry(sym).or_default().push(var);
                    pushed.push(sym);
                } else {
                    self.module.insts.get_mut(inst_id).operands = operands;
                }
            } else {
                let mut operands = self.module.insts.get(inst_id).operands.clone();
                for operand in operands.iter_mut() {
                    self.rewrite_use(operand);
                }
                self.module.insts.get_mut(inst_id).operands = operands;
            }
        }

        // Fill phi operands of every successor from this predecessor.
        for succ in self.module.successors(block_id) {
            let pred_index = self
                .module
                .blocks
                .get(succ)
                .preds
                .iter()
                .position(|&p| p == block_id);
            let Some(pred_index) = pred_index else { continue };
            let succ_phis = self.module.blocks.get(succ).phis.clone();
            for phi_id in succ_phis {
                let sym = self.module.phis.get(phi_id).name.expect("phi has a name");
                if let Some(&incoming) = self.stacks.get(&sym).and_then(|s| s.last()) {
                    self.module.phis.get_mut(phi_id).args[pred_index] =
                        Some((block_id, incoming));
                }
            }
        }

        for &child in &dom.children[b].clone() {
            self.visit(dom, child);
        }

        for sym in pushed {
            if let Some(stack) = self.stacks.get_mut(&sym) {
                stack.pop();
            }
        }
    }

    fn rewrite_use(&mut self, operand: &mut Value) {
        if let Value::Var(var) = operand
            && let Some(sym) = self.is_named_ref(*var)
            && let Some(&top) = self.stacks.get(&sym).and_then(|s| s.last())
        {
            *operand = Value::Var(top);
        }
    }
}

/// Promote a function built with named stores/loads into SSA form.
pub fn construct(module: &mut Module, func: FuncId) -> Result<(), IrError> {
    let dom = DomTree::build(module, func);

    // 1. Variables assigned anywhere in the function.
    let mut defs: HashMap<Sym, HashSet<usize>> = HashMap::new();
    for (b, &block_id) in dom.order.iter().enumerate() {
        for &inst_id in &module.blocks.get(block_id).insts {
            let inst = module.insts.get(inst_id);
            if inst.opcode != Opcode::Store {
                continue;
            }
            if let Some(Value::Var(var)) = inst.operands.first() {
                let record = module.vars.get(*var);
                if let Some(sym) = record.name
                    && record.version == 0
                    && module.function(func).symbols.contains_key(&sym)
                {
                    defs.entry(sym).or_default().insert(b);
                }
            }
        }
    }

    // 2. Iterated dominance-frontier phi placement.
    for (&sym, def_blocks) in &defs {
        let mut placed: HashSet<usize> = HashSet::new();
        let mut worklist: Vec<usize> = def_blocks.iter().copied().collect();
        let mut enqueued: HashSet<usize> = def_blocks.clone();
        while let Some(b) = worklist.pop() {
            for &d in &dom.frontier[b] {
                if placed.contains(&d) {
                    continue;
                }
                let block_id = dom.order[d];
                let pred_count = module.blocks.get(block_id).preds.len();
                if pred_count < 2 {
                    continue;
                }
                let ty = module
                    .function(func)
                    .symbols
                    .get(&sym)
                    .and_then(|&v0| module.vars.get(v0).ty);
                let phi_id = module.phis.alloc();
                *module.phis.get_mut(phi_id) = Phi {
                    name: Some(sym),
                    ty,
                    block: Some(block_id),
                    args: vec![None; pred_count],
                    result: None,
                };
                module.blocks.get_mut(block_id).phis.push(phi_id);
                placed.insert(d);
                if enqueued.insert(d) {
                    worklist.push(d);
                }
            }
        }
    }

    // 3. Rename along the dominator tree.
    let mut renamer = Renamer {
        module,
        func,
        stacks: HashMap::new(),
        counters: HashMap::new(),
    };
    if !dom.order.is_empty() {
        renamer.visit(&dom, 0);
    }

    let violations = verify(module, func);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(IrError::Malformed(violations.join("; ")))
    }
}

/// Re-check the SSA invariants. An empty list means the function is valid.
pub fn verify(module: &Module, func: FuncId) -> Vec<String> {
    let mut violations = Vec::new();
    let dom = DomTree::build(module, func);

    // Unique (name, version) per function, counting phi and store defs.
    let mut seen: HashMap<(Sym, u32), u32> = HashMap::new();
    for &block_id in &dom.order {
        let block = module.blocks.get(block_id);
        for &phi_id in &block.phis {
            let phi = module.phis.get(phi_id);
            if let Some(result) = phi.result {
                let record = module.vars.get(result);
                if let Some(sym) = record.name {
                    *seen.entry((sym, record.version)).or_insert(0) += 1;
                }
            }
        }
        for &inst_id in &block.insts {
            let inst = module.insts.get(inst_id);
            if inst.opcode == Opcode::Store
                && let Some(result) = inst.result
            {
                let record = module.vars.get(result);
                if let Some(sym) = record.name {
                    *seen.entry((sym, record.version)).or_insert(0) += 1;
                }
            }
        }
    }
    for ((sym, version), count) in &seen {
        if *count > 1 {
            violations.push(format!(
                "{} definitions of {}#{}",
                count,
                module.sym_name(*sym),
                version
            ));
        }
    }

    for (b, &block_id) in dom.order.iter().enumerate() {
        let block = module.blocks.get(block_id);

        // Phi arity equals predecessor count and all slots are filled.
        for &phi_id in &block.phis {
            let phi = module.phis.get(phi_id);
            if phi.args.len() != block.preds.len() {
                violations.push(format!(
                    "phi in {} has {} operands for {} predecessors",
                    module.block_label(block_id),
                    phi.args.len(),
                    block.preds.len()
                ));
            }
            if block.preds.len() < 2 {
                violations.push(format!(
                    "phi survives in {} with {} predecessor(s)",
                    module.block_label(block_id),
                    block.preds.len()
                ));
            }
        }

        // Loads reference a dominating definition.
        for (pos, &inst_id) in block.insts.iter().enumerate() {
            let inst = module.insts.get(inst_id);
            if inst.opcode != Opcode::Load {
                continue;
            }
            let Some(Value::Var(var)) = inst.operands.first() else {
                continue;
            };
            let record = module.vars.get(*var);
            if record.version == 0 {
                // Never-stored variable; the front-end reports it.
                continue;
            }
            let Some(def_block) = record.def_block else {
                violations.push(format!("version without def block in {}", module.block_label(block_id)));
                continue;
            };
            if def_block == block_id {
                // Phi definitions sit at block entry and always precede.
                if let Some(def_inst) = record.def_inst {
                    let def_pos = block.insts.iter().position(|&i| i == def_inst);
                    if let Some(def_pos) = def_pos
                        && def_pos >= pos
                    {
                        violations.push(format!(
                            "load in {} precedes its definition",
                            module.block_label(block_id)
                        ));
                    }
                }
            } else if let Some(&def_idx) = dom.position.get(&def_block) {
                if !dom.dominates(def_idx, b) {
                    violations.push(format!(
                        "load in {} uses non-dominating definition from {}",
                        module.block_label(block_id),
                        module.block_label(def_block)
                    ));
                }
            }
        }
    }

    violations
}
