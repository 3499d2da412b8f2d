//! Textual dump of the IR.
//!
//! ```text
//! extern @print(x);
//! define @main() {
//! BB_0:
//!     %0 = call @print($7)
//!     return $0
//! }
//! ```
//!
//! Operands print in brief form: `$k` for constants, the declared name for
//! parameters, `%n` for instruction results.  The `%n` numbers are assigned
//! on first use while dumping, per function, which makes the dump of a given
//! unit stable and repeatable.

use std::fmt::Write;

use crate::common::Map;

use super::ir::{Function, Inst, Unit, Value, ValueId};

pub fn dump_ir(unit: &Unit) -> String {
    let mut out = String::new();
    for (_, func) in unit.funcs() {
        dump_function(&mut out, unit, func);
    }
    out
}

fn dump_function(out: &mut String, unit: &Unit, func: &Function) {
    let mut names = Names::new(func);

    let keyword = if func.is_extern() { "extern" } else { "define" };
    write!(out, "{keyword} @{}(", func.name()).unwrap();
    for (i, &param) in func.params().iter().enumerate() {
        if i != 0 {
            out.push_str(", ");
        }
        out.push_str(&names.brief(param));
    }
    out.push(')');

    if func.is_extern() {
        out.push_str(";\n");
        return;
    }

    out.push_str(" {\n");
    for (_, block) in func.blocks() {
        writeln!(out, "{}:", block.name()).unwrap();
        for &inst in block.insts() {
            dump_inst(out, unit, func, &mut names, inst);
        }
    }
    out.push_str("}\n");
}

fn dump_inst(out: &mut String, unit: &Unit, func: &Function, names: &mut Names, value: ValueId) {
    let inst = match func.value(value) {
        Value::Inst(inst) => inst,
        _ => unreachable!("blocks hold only instructions"),
    };

    match inst {
        Inst::Alloca => {
            writeln!(out, "    {} = alloca", names.brief(value)).unwrap();
        }
        Inst::Load { ptr } => {
            writeln!(out, "    {} = load {}", names.brief(value), names.brief(*ptr)).unwrap();
        }
        Inst::Store { val, ptr } => {
            writeln!(out, "    store {}, {}", names.brief(*val), names.brief(*ptr)).unwrap();
        }
        Inst::Arith { op, lhs, rhs } => {
            writeln!(
                out,
                "    {} = {op} {}, {}",
                names.brief(value),
                names.brief(*lhs),
                names.brief(*rhs)
            )
            .unwrap();
        }
        Inst::Call { callee, args } => {
            write!(
                out,
                "    {} = call @{}(",
                names.brief(value),
                unit.func(*callee).name()
            )
            .unwrap();
            for (i, &arg) in args.iter().enumerate() {
                if i != 0 {
                    out.push_str(", ");
                }
                out.push_str(&names.brief(arg));
            }
            out.push_str(")\n");
        }
        Inst::Jump { target } => {
            writeln!(out, "    jump {}", func.block(*target).name()).unwrap();
        }
        Inst::CJump {
            cond,
            then_bb,
            else_bb,
        } => {
            writeln!(
                out,
                "    cjump {}, {}, {}",
                names.brief(*cond),
                func.block(*then_bb).name(),
                func.block(*else_bb).name()
            )
            .unwrap();
        }
        Inst::Return { val } => {
            out.push_str("    return");
            if let Some(val) = val {
                let brief = names.brief(*val);
                write!(out, " {brief}").unwrap();
            }
            out.push('\n');
        }
    }
}

/// Per-function operand names; `%n` numbers are handed out on first use.
struct Names<'f> {
    func: &'f Function,
    numbers: Map<ValueId, usize>,
    next: usize,
}

impl<'f> Names<'f> {
    fn new(func: &'f Function) -> Self {
        Names {
            func,
            numbers: Map::new(),
            next: 0,
        }
    }

    fn brief(&mut self, value: ValueId) -> String {
        match self.func.value(value) {
            Value::Const(val) => format!("${val}"),
            Value::Param { name } => name.to_string(),
            Value::Inst(_) => format!("%{}", self.number(value)),
        }
    }

    fn number(&mut self, value: ValueId) -> usize {
        if let Some(&n) = self.numbers.get(&value) {
            return n;
        }
        let n = self.next;
        self.next += 1;
        self.numbers.insert(value, n);
        n
    }
}
