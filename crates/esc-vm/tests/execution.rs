//! VM behaviour across the on-disk container boundary plus determinism.

use esc_vm::{Chunk, Constant, OpCode, Value, Vm};

fn add_program(a: Constant, b: Constant) -> Chunk {
    let mut chunk = Chunk::new();
    chunk.emit_constant(a, 1);
    chunk.emit_constant(b, 1);
    chunk.write_op(OpCode::Add, 1);
    chunk.write_op(OpCode::Return, 1);
    chunk
}

#[test]
fn add_is_polymorphic_over_numbers_and_strings() {
    let mut vm = Vm::new();
    vm.interpret(&add_program(Constant::Number(1.0), Constant::Number(2.0)))
        .unwrap();
    assert_eq!(vm.stack(), &[Value::Number(3.0)]);

    let mut vm = Vm::new();
    vm.interpret(&add_program(Constant::Str("a".into()), Constant::Str("b".into())))
        .unwrap();
    assert_eq!(vm.display(vm.stack()[0]), "ab");
}

#[test]
fn chunk_survives_a_disk_round_trip_and_runs_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("program.esbc");

    let chunk = add_program(Constant::Str("left-".into()), Constant::Str("right".into()));
    chunk.save(&path).unwrap();
    let loaded = Chunk::load(&path).unwrap();
    assert_eq!(loaded, chunk);
    assert_eq!(loaded.serialize(), chunk.serialize());

    let mut vm = Vm::new();
    vm.interpret(&loaded).unwrap();
    assert_eq!(vm.display(vm.stack()[0]), "left-right");
}

/// A loop summing 1..=5 without external input: two runs must agree on
/// every observable (stack contents and rendered values).
#[test]
fn execution_is_deterministic() {
    let mut chunk = Chunk::new();
    // locals: slot 0 = accumulator, slot 1 = counter
    chunk.emit_constant(Constant::Number(0.0), 1);
    chunk.emit_constant(Constant::Number(5.0), 1);
    // loop head: counter > 0 ?
    let head = chunk.code.len();
    chunk.write_op(OpCode::GetLocal, 2);
    chunk.write(1, 2);
    chunk.emit_constant(Constant::Number(0.0), 2);
    chunk.write_op(OpCode::Greater, 2);
    let exit_jump = chunk.code.len();
    chunk.write_op_u16(OpCode::JumpIfFalse, 0, 2); // patched below
    // acc += counter
    chunk.write_op(OpCode::GetLocal, 3);
    chunk.write(0, 3);
    chunk.write_op(OpCode::GetLocal, 3);
    chunk.write(1, 3);
    chunk.write_op(OpCode::Add, 3);
    chunk.write_op(OpCode::SetLocal, 3);
    chunk.write(0, 3);
    chunk.write_op(OpCode::Pop, 3);
    // counter -= 1
    chunk.write_op(OpCode::GetLocal, 4);
    chunk.write(1, 4);
    chunk.emit_constant(Constant::Number(1.0), 4);
    chunk.write_op(OpCode::Sub, 4);
    chunk.write_op(OpCode::SetLocal, 4);
    chunk.write(1, 4);
    chunk.write_op(OpCode::Pop, 4);
    let loop_offset = chunk.code.len() + 3 - head;
    chunk.write_op_u16(OpCode::Loop, loop_offset as u16, 4);
    // patch the exit jump to land here
    let target = chunk.code.len();
    let delta = (target - (exit_jump + 3)) as u16;
    chunk.code[exit_jump + 1] = (delta >> 8) as u8;
    chunk.code[exit_jump + 2] = (delta & 0xff) as u8;
    chunk.write_op(OpCode::Halt, 5);

    let run = || {
        let mut vm = Vm::new();
        vm.interpret(&chunk).unwrap();
        let rendered: Vec<String> = vm.stack().iter().map(|&v| vm.display(v)).collect();
        (vm.stack().to_vec(), rendered)
    };
    let (stack_a, text_a) = run();
    let (stack_b, text_b) = run();
    assert_eq!(stack_a, stack_b);
    assert_eq!(text_a, text_b);
    // acc in slot 0 is 15, counter in slot 1 is 0.
    assert_eq!(stack_a[0], Value::Number(15.0));
    assert_eq!(stack_a[1], Value::Number(0.0));
}

/// Every concatenation allocates; enough of them trips the collector and
/// unreferenced intermediates are reclaimed.
#[test]
fn concatenation_pressure_triggers_collection() {
    let mut chunk = Chunk::new();
    let big = "x".repeat(64 * 1024);
    let a = chunk.add_constant(Constant::Str(big.clone()));
    let b = chunk.add_constant(Constant::Str(big));
    // Build and drop nine 128 KiB strings.
    for _ in 0..9 {
        chunk.write_op(OpCode::Constant, 1);
        chunk.write(a, 1);
        chunk.write_op(OpCode::Constant, 1);
        chunk.write(b, 1);
        chunk.write_op(OpCode::Add, 1);
        chunk.write_op(OpCode::Pop, 1);
    }
    chunk.write_op(OpCode::Halt, 2);

    let mut vm = Vm::new();
    vm.interpret(&chunk).unwrap();
    assert!(vm.gc_collections() >= 1);
    assert!(vm.stack().is_empty());
}
