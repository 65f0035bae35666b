use super::bytecode::{Module, Opcode, ProgramShape};
use super::value::Value;
use std::fmt::{self, Write};

pub fn disassemble_module_to_string(module: &Module) -> String {
    let mut output = String::new();
    let _ = disassemble_module(module, &mut output);
    output
}

pub fn disassemble_module(module: &Module, w: &mut impl Write) -> fmt::Result {
    writeln!(w, "=== Module Disassembly ===")?;
    let shape = match module.shape {
        ProgramShape::Expression => "expression",
        ProgramShape::Applied => "applied",
    };
    writeln!(w, "shape: {}, prelude: {}", shape, module.uses_prelude)?;
    writeln!(w)?;

    writeln!(w, "Named closures ({}):", module.named_closures.len())?;
    for named in &module.named_closures {
        writeln!(w, "  {}", named.name)?;
    }
    writeln!(w)?;

    writeln!(w, "Code:")?;
    disassemble_block(Some(module), &module.code, 1, w)
}

/// Listing of a bare instruction stream, without module metadata.
pub fn disassemble_code_to_string(code: &Value) -> String {
    let mut output = String::new();
    let _ = disassemble_block(None, code, 0, &mut output);
    output
}

fn indent(w: &mut impl Write, depth: usize) -> fmt::Result {
    write!(w, "{:width$}", "", width = depth * 2)
}

/// One instruction per line; `LDF` bodies and `SEL` branches are nested one
/// level deeper. Anything that is not a well-formed instruction prints as `???`.
fn disassemble_block(
    module: Option<&Module>,
    code: &Value,
    depth: usize,
    w: &mut impl Write,
) -> fmt::Result {
    let mut cur = code.clone();
    let mut ip = 0usize;
    loop {
        let (head, rest) = match &cur {
            Value::Nil => return Ok(()),
            Value::Pair(p) => (p.head(), p.tail()),
            atom => {
                indent(w, depth)?;
                return writeln!(w, "??? . {}", atom);
            }
        };
        indent(w, depth)?;
        write!(w, "{:4}: ", ip)?;
        ip += 1;

        let Some(op) = Opcode::from_value(&head) else {
            writeln!(w, "??? {}", head)?;
            cur = rest;
            continue;
        };

        let operands: Vec<Value> = rest.iter().take(op.operand_count()).flatten().collect();
        if operands.len() < op.operand_count() {
            writeln!(w, "{} ???", op)?;
            return Ok(());
        }
        cur = (0..op.operand_count())
            .try_fold(rest, |c, _| c.tail())
            .unwrap_or(Value::Nil);

        match op {
            Opcode::Ld | Opcode::Ldc => writeln!(w, "{} {}", op, operands[0])?,
            Opcode::Ldf => {
                let label = module.and_then(|m| m.closure_name(&operands[0]));
                match label {
                    Some(name) => writeln!(w, "{}  ; {}", op, name)?,
                    None => writeln!(w, "{}", op)?,
                }
                disassemble_block(module, &operands[0], depth + 1, w)?;
            }
            Opcode::Sel => {
                writeln!(w, "{}", op)?;
                indent(w, depth + 1)?;
                writeln!(w, "then:")?;
                disassemble_block(module, &operands[0], depth + 2, w)?;
                indent(w, depth + 1)?;
                writeln!(w, "else:")?;
                disassemble_block(module, &operands[1], depth + 2, w)?;
            }
            // No arg
            _ => writeln!(w, "{}", op)?,
        }
    }
}
