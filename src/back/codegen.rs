//! The instruction selector: typed IR in, virtual-register A64 out.
//!
//! One procedure per defined IR function, one external symbol per extern.
//! Within a function the selector keeps two maps — IR value to machine
//! operand, IR block to label — and walks the blocks in order, translating
//! instruction by instruction.  Constants become immediate operands outright
//! (no range checking against A64 immediate encodings); parameters and
//! allocas become stack slots; every computed value lands in a fresh virtual
//! register for the allocator to pin down.

use log::debug;

use crate::common::Map;
use crate::middle::ir;

use super::asm::{
    x, CallTarget, Inst, LabelId, Mem, Operand, Procedure, Reg, Unit,
};

/// Translate a lowered unit into machine IR over virtual registers.
pub fn code_gen(unit: &ir::Unit) -> Unit {
    let mut asm = Unit::default();

    // Declare every call target first so that a call may refer to a
    // procedure that is defined further down the unit.
    let mut targets: Map<ir::FuncId, CallTarget> = Map::new();
    for (fid, func) in unit.funcs() {
        let target = if func.is_extern() {
            CallTarget::Extern(asm.add_external(func.name()))
        } else {
            CallTarget::Proc(asm.make_procedure(func.name()))
        };
        targets.insert(fid, target);
    }

    for (fid, func) in unit.funcs() {
        if let CallTarget::Proc(pid) = targets[&fid] {
            debug!("selecting @{}", func.name());
            select_function(asm.proc_mut(pid), &targets, func);
        }
    }

    asm
}

fn select_function(proc: &mut Procedure, targets: &Map<ir::FuncId, CallTarget>, func: &ir::Function) {
    let mut selector = Selector {
        proc,
        targets,
        operands: Map::new(),
        labels: Vec::new(),
    };

    // Prologue: spill every incoming argument register to its own slot.
    // All later reads of a parameter go through that slot.
    selector.proc.set_insert_point(Procedure::PROLOGUE);
    for (i, &param) in func.params().iter().enumerate() {
        let slot = Mem::Slot(selector.proc.alloc_slot());
        selector.proc.emit(Inst::Str {
            src: Operand::Reg(Reg::Phys(x(i))),
            dst: slot,
        });
        selector.operands.insert(param, Operand::Mem(slot));
    }

    // A label per block, and immediates for the whole constant pool.
    for (_, block) in func.blocks() {
        let label = selector.proc.make_label(block.name());
        selector.labels.push(label);
    }
    for (vid, value) in func.values() {
        if let ir::Value::Const(val) = value {
            selector.operands.insert(vid, Operand::Imm(*val));
        }
    }

    for (bid, block) in func.blocks() {
        selector.proc.set_insert_point(selector.labels[bid.0]);
        for &inst in block.insts() {
            selector.inst(func, inst);
        }
    }

    selector.proc.set_insert_point(Procedure::EPILOGUE);
    selector.proc.emit(Inst::Ret);
}

struct Selector<'a> {
    proc: &'a mut Procedure,
    targets: &'a Map<ir::FuncId, CallTarget>,
    /// IR value -> selected machine operand.
    operands: Map<ir::ValueId, Operand>,
    /// IR block index -> label.
    labels: Vec<LabelId>,
}

impl Selector<'_> {
    fn operand(&self, value: ir::ValueId) -> Operand {
        self.operands[&value]
    }

    /// The memory cell behind an l-value operand.
    fn mem(&self, value: ir::ValueId) -> Mem {
        match self.operand(value) {
            Operand::Mem(mem) => mem,
            other => panic!("expected a memory operand, got {other}"),
        }
    }

    fn label(&self, block: ir::BlockId) -> LabelId {
        self.labels[block.0]
    }

    fn inst(&mut self, func: &ir::Function, value: ir::ValueId) {
        let inst = match func.value(value) {
            ir::Value::Inst(inst) => inst,
            _ => unreachable!("blocks hold only instructions"),
        };

        match inst {
            ir::Inst::Alloca => {
                let slot = Mem::Slot(self.proc.alloc_slot());
                self.operands.insert(value, Operand::Mem(slot));
            }

            ir::Inst::Load { ptr } => {
                let src = self.mem(*ptr);
                let dst = Reg::Virt(self.proc.make_vreg());
                self.proc.emit(Inst::Ldr { dst, src });
                self.operands.insert(value, Operand::Reg(dst));
            }

            ir::Inst::Store { val, ptr } => {
                let src = self.operand(*val);
                debug_assert!(!matches!(src, Operand::Mem(_)), "stored value is not loaded");
                let dst = self.mem(*ptr);
                self.proc.emit(Inst::Str { src, dst });
            }

            ir::Inst::Arith { op, lhs, rhs } => {
                let lhs = self.operand(*lhs);
                let rhs = self.operand(*rhs);
                let dst = Reg::Virt(self.proc.make_vreg());
                self.proc.emit(Inst::Arith {
                    op: *op,
                    dst,
                    lhs,
                    rhs,
                });
                self.operands.insert(value, Operand::Reg(dst));
            }

            ir::Inst::Jump { target } => {
                let target = self.label(*target);
                self.proc.emit(Inst::B { target });
            }

            ir::Inst::CJump {
                cond,
                then_bb,
                else_bb,
            } => {
                let cond = self.operand(*cond);
                let then_label = self.label(*then_bb);
                let else_label = self.label(*else_bb);
                self.proc.emit(Inst::Cbnz {
                    cond,
                    target: then_label,
                });
                self.proc.emit(Inst::B { target: else_label });
            }

            ir::Inst::Call { callee, args } => {
                for (i, &arg) in args.iter().enumerate() {
                    let src = self.operand(arg);
                    self.proc.emit(Inst::Mov {
                        dst: Reg::Phys(x(i)),
                        src,
                    });
                }
                self.proc.emit(Inst::Bl {
                    target: self.targets[callee],
                });

                // The result comes back in x0; park it in a virtual register
                // before anything else can clobber it.
                let ret = Reg::Virt(self.proc.make_vreg());
                self.proc.emit(Inst::Mov {
                    dst: ret,
                    src: Operand::Reg(Reg::Phys(x(0))),
                });
                self.operands.insert(value, Operand::Reg(ret));
            }

            ir::Inst::Return { val } => {
                if let Some(val) = val {
                    let src = self.operand(*val);
                    self.proc.emit(Inst::Mov {
                        dst: Reg::Phys(x(0)),
                        src,
                    });
                }
                self.proc.emit(Inst::B {
                    target: Procedure::EPILOGUE,
                });
            }
        }
    }
}
