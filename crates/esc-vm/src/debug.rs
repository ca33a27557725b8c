//! Chunk disassembly for diagnostics and tooling.

use num_enum::TryFromPrimitive;

use crate::chunk::{Chunk, Constant, OpCode};

fn constant_text(chunk: &Chunk, index: usize) -> String {
    match chunk.constants.get(index) {
        Some(Constant::Bool(b)) => b.to_string(),
        Some(Constant::Number(n)) => n.to_string(),
        Some(Constant::Str(s)) => format!("{s:?}"),
        None => "<bad index>".to_string(),
    }
}

/// Render one instruction; returns the rendered line and the offset of
/// the next instruction.
pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> (String, usize) {
    let line = chunk.lines.get(offset).copied().unwrap_or(-1);
    let byte = chunk.code[offset];
    let Ok(op) = OpCode::try_from_primitive(byte) else {
        return (format!("{offset:04} {line:>4} ??? 0x{byte:02x}"), offset + 1);
    };
    let head = format!("{offset:04} {line:>4} {op:?}");
    match op {
        OpCode::Constant => {
            let index = chunk.code.get(offset + 1).copied().unwrap_or(0) as usize;
            (
                format!("{head} {index} ({})", constant_text(chunk, index)),
                offset + 2,
            )
        }
        OpCode::GetLocal | OpCode::SetLocal | OpCode::StackAdjust => {
            let operand = chunk.code.get(offset + 1).copied().unwrap_or(0);
            (format!("{head} {operand}"), offset + 2)
        }
        OpCode::Jump | OpCode::JumpIfFalse | OpCode::Loop => {
            let hi = chunk.code.get(offset + 1).copied().unwrap_or(0);
            let lo = chunk.code.get(offset + 2).copied().unwrap_or(0);
            let delta = u16::from(hi) << 8 | u16::from(lo);
            let target = if op == OpCode::Loop {
                (offset + 3).wrapping_sub(delta as usize)
            } else {
                offset + 3 + delta as usize
            };
            (format!("{head} {delta} -> {target:04}"), offset + 3)
        }
        OpCode::Call => {
            let argc = chunk.code.get(offset + 1).copied().unwrap_or(0);
            let hi = chunk.code.get(offset + 2).copied().unwrap_or(0);
            let lo = chunk.code.get(offset + 3).copied().unwrap_or(0);
            let delta = (u16::from(hi) << 8 | u16::from(lo)) as i16;
            let target = (offset + 4).wrapping_add_signed(delta as isize);
            (format!("{head} argc={argc} -> {target:04}"), offset + 4)
        }
        _ => (head, offset + 1),
    }
}

/// Full listing of a chunk, constants first.
pub fn disassemble_chunk(chunk: &Chunk, name: &str) -> String {
    let mut out = format!("== {name} ==\n");
    for (index, _) in chunk.constants.iter().enumerate() {
        out.push_str(&format!("const[{index}] = {}\n", constant_text(chunk, index)));
    }
    let mut offset = 0;
    while offset < chunk.code.len() {
        let (text, next) = disassemble_instruction(chunk, offset);
        out.push_str(&text);
        out.push('\n');
        offset = next;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_operands_and_jump_targets() {
        let mut chunk = Chunk::new();
        chunk.emit_constant(Constant::Number(1.0), 1);
        chunk.write_op_u16(OpCode::Jump, 1, 2);
        chunk.write_op(OpCode::Halt, 3);
        let listing = disassemble_chunk(&chunk, "t");
        assert!(listing.contains("== t =="));
        assert!(listing.contains("Constant 0 (1)"));
        assert!(listing.contains("Jump 1 -> 0006"));
        assert!(listing.contains("Halt"));
    }

    #[test]
    fn unknown_bytes_do_not_derail_the_listing() {
        let mut chunk = Chunk::new();
        chunk.write(0xee, 1);
        chunk.write_op(OpCode::Halt, 1);
        let listing = disassemble_chunk(&chunk, "bad");
        assert!(listing.contains("0xee"));
        assert!(listing.contains("Halt"));
    }
}
