//! A small pretty-printer for `Function`, used by `Debug`/test assertions.
//!
//! This is deliberately not a parser's counterpart: there is no textual IR
//! reader in this crate (see spec.md §1, "out of scope"). It exists so a
//! failed test assertion or a verifier error can show you the function.

use crate::ir::entities::Value;
use crate::ir::function::Function;
use crate::ir::instructions::InstructionData;
use core::fmt;
use core::fmt::Write;

pub fn write_function(w: &mut dyn Write, func: &Function) -> fmt::Result {
    writeln!(w, "function {}({}) {{", func.name, func.signature.call_conv)?;
    for block in func.layout.blocks() {
        let params = func.dfg.block_params(block);
        write!(w, "{}(", block)?;
        for (i, p) in params.iter().enumerate() {
            if i > 0 {
                write!(w, ", ")?;
            }
            write!(w, "{}: {}", p, func.dfg.value_type(*p))?;
        }
        writeln!(w, "):")?;
        for inst in func.layout.block_insts(block) {
            let data = func.dfg.inst_data(*inst);
            let results = func.dfg.inst_results(*inst);
            if !results.is_empty() {
                write!(w, "    ")?;
                for (i, r) in results.iter().enumerate() {
                    if i > 0 {
                        write!(w, ", ")?;
                    }
                    write!(w, "{}", r)?;
                }
                write!(w, " = ")?;
            } else {
                write!(w, "    ")?;
            }
            write_inst_data(w, data)?;
            writeln!(w)?;
        }
    }
    writeln!(w, "}}")
}

fn write_inst_data(w: &mut dyn Write, data: &InstructionData) -> fmt::Result {
    write!(w, "{}", data.opcode())?;
    let args: Vec<Value> = data.arguments();
    if !args.is_empty() {
        write!(w, " ")?;
        for (i, a) in args.iter().enumerate() {
            if i > 0 {
                write!(w, ", ")?;
            }
            write!(w, "{}", a)?;
        }
    }
    for dest in data.branch_destinations() {
        write!(w, " -> {}", dest)?;
    }
    Ok(())
}
