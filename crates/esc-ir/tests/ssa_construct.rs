//! End-to-end SSA construction scenarios over hand-built CFGs.

use esc_ir::module::{Opcode, Value};
use esc_ir::{IrBuilder, ssa};

/// A -> {B, C} -> D with a store of `x` in each arm and a load in the join.
#[test]
fn diamond_gets_one_phi_of_arity_two() {
    let mut b = IrBuilder::new("diamond");
    let i32t = b.module_mut().types.int32();
    let func = b.begin_function("main", &[], i32t);

    let then_block = b.create_block("then").unwrap();
    let else_block = b.create_block("else").unwrap();
    let join = b.create_block("join").unwrap();

    b.store("x", Value::ImmInt(1), 1).unwrap();
    b.br_cond(Value::ImmInt(1), then_block, else_block, 2).unwrap();

    b.set_block(then_block);
    b.store("x", Value::ImmInt(2), 3).unwrap();
    b.br(join, 4).unwrap();

    b.set_block(else_block);
    b.store("x", Value::ImmInt(3), 5).unwrap();
    b.br(join, 6).unwrap();

    b.set_block(join);
    let (load_inst, _) = b.load("x", i32t, 7).unwrap();
    b.ret(Some(Value::ImmInt(0)), 8).unwrap();

    let mut module = b.finish();
    ssa::construct(&mut module, func).unwrap();

    // Exactly one phi in the join, with one operand per predecessor.
    let join_block = module.blocks.get(join);
    assert_eq!(join_block.phis.len(), 1);
    let phi = module.phis.get(join_block.phis[0]);
    assert_eq!(phi.args.len(), 2);
    assert!(phi.args.iter().all(Option::is_some));

    // The incoming versions are the ones defined in the two arms.
    let incoming_blocks: Vec<_> = phi.args.iter().map(|a| a.unwrap().0).collect();
    assert!(incoming_blocks.contains(&then_block));
    assert!(incoming_blocks.contains(&else_block));
    for arg in phi.args.iter().flatten() {
        let version = module.vars.get(arg.1);
        assert_eq!(module.sym_name(version.name.unwrap()), "x");
        assert!(version.version > 0);
    }

    // The load consumes the phi result.
    let load = module.insts.get(load_inst);
    let phi_result = phi.result.unwrap();
    assert_eq!(load.operands[0], Value::Var(phi_result));

    assert!(ssa::verify(&module, func).is_empty());
}

/// No phi may be placed in a straight line: entry -> next with a single
/// predecessor keeps plain version chains.
#[test]
fn straight_line_has_no_phis() {
    let mut b = IrBuilder::new("straight");
    let i32t = b.module_mut().types.int32();
    let func = b.begin_function("f", &[], i32t);
    let next = b.create_block("next").unwrap();

    b.store("x", Value::ImmInt(1), 1).unwrap();
    b.store("x", Value::ImmInt(2), 2).unwrap();
    b.br(next, 3).unwrap();

    b.set_block(next);
    b.load("x", i32t, 4).unwrap();
    b.ret(None, 5).unwrap();

    let mut module = b.finish();
    ssa::construct(&mut module, func).unwrap();

    for (_, f) in module.functions() {
        for &block in &f.blocks {
            assert!(module.blocks.get(block).phis.is_empty());
        }
    }
    // Two stores produce two distinct versions.
    let entry = module.function(func).entry;
    let versions: Vec<u32> = module
        .blocks
        .get(entry)
        .insts
        .iter()
        .filter_map(|&i| module.insts.get(i).result)
        .map(|v| module.vars.get(v).version)
        .collect();
    assert_eq!(versions, vec![1, 2]);
    assert!(ssa::verify(&module, func).is_empty());
}

/// Loop: entry -> header; header -> {body, exit}; body -> header. The
/// back edge forces a phi at the loop header.
#[test]
fn loop_header_gets_phi_from_back_edge() {
    let mut b = IrBuilder::new("loop");
    let i32t = b.module_mut().types.int32();
    let func = b.begin_function("f", &[], i32t);
    let header = b.create_block("header").unwrap();
    let body = b.create_block("body").unwrap();
    let exit = b.create_block("exit").unwrap();

    b.store("i", Value::ImmInt(0), 1).unwrap();
    b.br(header, 2).unwrap();

    b.set_block(header);
    let (_, cond) = b.load("i", i32t, 3).unwrap();
    b.br_cond(Value::Var(cond), body, exit, 4).unwrap();

    b.set_block(body);
    b.store("i", Value::ImmInt(1), 5).unwrap();
    b.br(header, 6).unwrap();

    b.set_block(exit);
    b.load("i", i32t, 7).unwrap();
    b.ret(None, 8).unwrap();

    let mut module = b.finish();
    ssa::construct(&mut module, func).unwrap();

    let header_block = module.blocks.get(header);
    assert_eq!(header_block.preds.len(), 2);
    assert_eq!(header_block.phis.len(), 1);
    let phi = module.phis.get(header_block.phis[0]);
    assert_eq!(phi.args.len(), 2);
    assert!(phi.args.iter().all(Option::is_some));
    assert!(ssa::verify(&module, func).is_empty());
}

/// Verification catches a phi whose arity disagrees with its block.
#[test]
fn verify_flags_bad_phi_arity() {
    let mut b = IrBuilder::new("bad");
    let i32t = b.module_mut().types.int32();
    let func = b.begin_function("f", &[], i32t);
    let next = b.create_block("next").unwrap();
    b.br(next, 1).unwrap();
    b.set_block(next);
    b.ret(None, 2).unwrap();

    let mut module = b.finish();
    // Hand-plant a malformed phi: arity 2 in a one-predecessor block.
    let sym = module.intern("x");
    let phi = module.phis.alloc();
    {
        let slot = module.phis.get_mut(phi);
        slot.name = Some(sym);
        slot.block = Some(next);
        slot.args = vec![None, None];
    }
    module.blocks.get_mut(next).phis.push(phi);

    let violations = ssa::verify(&module, func);
    assert!(!violations.is_empty());
}
