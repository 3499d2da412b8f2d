//! The AArch64 (A64) machine IR.
//!
//! This is the form the instruction selector produces and the register
//! allocator consumes: real AArch64 instructions whose register operands may
//! still be *virtual*.  A [Unit] owns one [Procedure] per defined function
//! plus the external symbols its calls may target; a procedure owns labels;
//! a label owns the instruction run emitted under it.
//!
//! # Design decisions
//!
//! We target the AAPCS64 calling convention as used by 64-bit Arm Linux and
//! macOS, narrowed by the language itself:
//!
//! - Every value is a 64-bit integer, so only the `x` views of the general
//!   purpose registers appear, and every stack cell is 8 bytes.
//! - Functions take at most 8 parameters, so arguments travel exclusively
//!   in `x0`..`x7` and nothing is ever passed on the stack.
//! - The return value travels in `x0`.
//!
//! # Registers
//!
//! - `x0`..`x7`: argument/result registers.  The prologue immediately spills
//!   every incoming argument to a stack slot, so their values do not need to
//!   survive anything.
//! - `x8`..`x15`: scratch, claimed freely by the register allocator.  All of
//!   these are caller-saved in AAPCS64, and since every value lives in a
//!   stack slot between instructions, no save/restore code is needed at all.
//! - `sp`: base of every stack slot.
//!
//! # Stack slots
//!
//! A [StackSlot] names an 8-byte cell in the procedure's frame.  Slots are
//! handed out by a counter (parameters and allocas during selection, spill
//! cells during allocation) and only the frame-assignment pass turns slot
//! *k* into the concrete location `[sp, #8k]`.  No `sub sp, ...` frame setup
//! is emitted: the output carries no directives and is not linkable as-is,
//! so the layout only has to be deterministic and collision-free.
//!
//! # Labels
//!
//! Every procedure has a fixed prologue label, which doubles as its entry
//! symbol `_<name>`, and a fixed epilogue label `.L<name>_epilogue` holding
//! the `ret`.  Body labels are the IR basic blocks, mangled as
//! `.L<name>_<block>` so that block names from different procedures cannot
//! collide.  Label traversal order is everywhere the same: prologue, body
//! labels in creation order, epilogue.

use std::fmt;
use std::fmt::Write;

use derive_more::Display;

use crate::common::{Id, Map};
pub use crate::middle::ir::ArithOp;

use PhysReg::*;

/// The physical registers of the A64 integer file, as operands: the `x`
/// registers and the stack pointer.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum PhysReg {
    #[display("x0")]
    X0,
    #[display("x1")]
    X1,
    #[display("x2")]
    X2,
    #[display("x3")]
    X3,
    #[display("x4")]
    X4,
    #[display("x5")]
    X5,
    #[display("x6")]
    X6,
    #[display("x7")]
    X7,
    #[display("x8")]
    X8,
    #[display("x9")]
    X9,
    #[display("x10")]
    X10,
    #[display("x11")]
    X11,
    #[display("x12")]
    X12,
    #[display("x13")]
    X13,
    #[display("x14")]
    X14,
    #[display("x15")]
    X15,
    #[display("x16")]
    X16,
    #[display("x17")]
    X17,
    #[display("x18")]
    X18,
    #[display("x19")]
    X19,
    #[display("x20")]
    X20,
    #[display("x21")]
    X21,
    #[display("x22")]
    X22,
    #[display("x23")]
    X23,
    #[display("x24")]
    X24,
    #[display("x25")]
    X25,
    #[display("x26")]
    X26,
    #[display("x27")]
    X27,
    #[display("x28")]
    X28,
    #[display("x29")]
    X29,
    #[display("x30")]
    X30,
    #[display("sp")]
    Sp,
}

/// The numbered registers, in file order.
static X_REGISTERS: [PhysReg; 31] = [
    X0, X1, X2, X3, X4, X5, X6, X7, X8, X9, X10, X11, X12, X13, X14, X15, X16, X17, X18, X19, X20,
    X21, X22, X23, X24, X25, X26, X27, X28, X29, X30,
];

/// `x<i>`.
pub fn x(i: usize) -> PhysReg {
    X_REGISTERS[i]
}

/// A register yet to be chosen.  Eliminated by the allocator.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq, PartialOrd, Ord)]
#[display("_t{_0}")]
pub struct VReg(pub u32);

/// An 8-byte stack cell; its `sp` offset is picked by frame assignment.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct StackSlot(pub u32);

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum Reg {
    #[display("{_0}")]
    Phys(PhysReg),
    #[display("{_0}")]
    Virt(VReg),
}

/// A memory location an instruction can address.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mem {
    /// An sp-based cell, pre frame assignment.
    Slot(StackSlot),
    /// Base register plus byte offset.
    Offset { base: Reg, offset: i64 },
}

impl Mem {
    /// The register this location is computed from.
    pub fn base(&self) -> Reg {
        match *self {
            Mem::Slot(_) => Reg::Phys(Sp),
            Mem::Offset { base, .. } => base,
        }
    }
}

impl fmt::Display for Mem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mem::Slot(slot) => write!(f, "[sp, slot{}]", slot.0),
            Mem::Offset { base, offset } => write!(f, "[{base}, #{offset}]"),
        }
    }
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum Operand {
    #[display("{_0}")]
    Reg(Reg),
    #[display("{_0}")]
    Mem(Mem),
    #[display("#{_0}")]
    Imm(i64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProcId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExternId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct LabelId(pub usize);

/// What a `bl` may land on: a procedure of this unit, or an external symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallTarget {
    Proc(ProcId),
    Extern(ExternId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inst {
    Mov {
        dst: Reg,
        src: Operand,
    },
    Ldr {
        dst: Reg,
        src: Mem,
    },
    Str {
        src: Operand,
        dst: Mem,
    },
    B {
        target: LabelId,
    },
    Cbnz {
        cond: Operand,
        target: LabelId,
    },
    Bl {
        target: CallTarget,
    },
    Ret,
    Arith {
        op: ArithOp,
        dst: Reg,
        lhs: Operand,
        rhs: Operand,
    },
}

fn virt_of_reg(reg: Reg, out: &mut Vec<VReg>) {
    if let Reg::Virt(v) = reg {
        if !out.contains(&v) {
            out.push(v);
        }
    }
}

fn virt_of_operand(operand: Operand, out: &mut Vec<VReg>) {
    match operand {
        Operand::Reg(reg) => virt_of_reg(reg, out),
        Operand::Mem(mem) => virt_of_reg(mem.base(), out),
        Operand::Imm(_) => {}
    }
}

impl Inst {
    /// The virtual registers this instruction reads, in operand order.
    /// A memory operand reads its base register.
    pub fn virt_srcs(&self) -> Vec<VReg> {
        let mut out = Vec::new();
        match *self {
            Inst::Mov { src, .. } => virt_of_operand(src, &mut out),
            Inst::Ldr { src, .. } => virt_of_reg(src.base(), &mut out),
            Inst::Str { src, dst } => {
                virt_of_operand(src, &mut out);
                virt_of_reg(dst.base(), &mut out);
            }
            Inst::Cbnz { cond, .. } => virt_of_operand(cond, &mut out),
            Inst::Arith { lhs, rhs, .. } => {
                virt_of_operand(lhs, &mut out);
                virt_of_operand(rhs, &mut out);
            }
            Inst::B { .. } | Inst::Bl { .. } | Inst::Ret => {}
        }
        out
    }

    /// The virtual registers this instruction writes.
    pub fn virt_dsts(&self) -> Vec<VReg> {
        let mut out = Vec::new();
        match *self {
            Inst::Mov { dst, .. } | Inst::Ldr { dst, .. } | Inst::Arith { dst, .. } => {
                virt_of_reg(dst, &mut out)
            }
            _ => {}
        }
        out
    }

    /// Replace every virtual register present in `assignment` with its
    /// physical register.
    pub fn map_virt(&mut self, assignment: &Map<VReg, PhysReg>) {
        fn fix_reg(reg: &mut Reg, assignment: &Map<VReg, PhysReg>) {
            if let Reg::Virt(v) = reg {
                if let Some(&phys) = assignment.get(v) {
                    *reg = Reg::Phys(phys);
                }
            }
        }
        fn fix_mem(mem: &mut Mem, assignment: &Map<VReg, PhysReg>) {
            if let Mem::Offset { base, .. } = mem {
                fix_reg(base, assignment);
            }
        }
        fn fix_operand(operand: &mut Operand, assignment: &Map<VReg, PhysReg>) {
            match operand {
                Operand::Reg(reg) => fix_reg(reg, assignment),
                Operand::Mem(mem) => fix_mem(mem, assignment),
                Operand::Imm(_) => {}
            }
        }

        match self {
            Inst::Mov { dst, src } => {
                fix_reg(dst, assignment);
                fix_operand(src, assignment);
            }
            Inst::Ldr { dst, src } => {
                fix_reg(dst, assignment);
                fix_mem(src, assignment);
            }
            Inst::Str { src, dst } => {
                fix_operand(src, assignment);
                fix_mem(dst, assignment);
            }
            Inst::Cbnz { cond, .. } => fix_operand(cond, assignment),
            Inst::Arith { dst, lhs, rhs, .. } => {
                fix_reg(dst, assignment);
                fix_operand(lhs, assignment);
                fix_operand(rhs, assignment);
            }
            Inst::B { .. } | Inst::Bl { .. } | Inst::Ret => {}
        }
    }

    /// Visit every memory operand.  Used by frame assignment.
    pub fn for_each_mem_mut(&mut self, f: &mut impl FnMut(&mut Mem)) {
        fn operand(operand: &mut Operand, f: &mut impl FnMut(&mut Mem)) {
            if let Operand::Mem(mem) = operand {
                f(mem);
            }
        }

        match self {
            Inst::Mov { src, .. } => operand(src, f),
            Inst::Ldr { src, .. } => f(src),
            Inst::Str { src, dst } => {
                operand(src, f);
                f(dst);
            }
            Inst::Cbnz { cond, .. } => operand(cond, f),
            Inst::Arith { lhs, rhs, .. } => {
                operand(lhs, f);
                operand(rhs, f);
            }
            Inst::B { .. } | Inst::Bl { .. } | Inst::Ret => {}
        }
    }
}

pub struct Label {
    pub name: String,
    pub insts: Vec<Inst>,
}

/// A defined procedure: its labels and the operand arenas behind them.
pub struct Procedure {
    name: Id,
    /// `labels[0]` is the prologue, `labels[1]` the epilogue, body labels
    /// follow in creation order.
    labels: Vec<Label>,
    insert_point: LabelId,
    next_vreg: u32,
    next_slot: u32,
}

impl Procedure {
    pub const PROLOGUE: LabelId = LabelId(0);
    pub const EPILOGUE: LabelId = LabelId(1);

    fn new(name: Id) -> Self {
        let labels = vec![
            Label {
                name: format!("_{name}"),
                insts: Vec::new(),
            },
            Label {
                name: format!(".L{name}_epilogue"),
                insts: Vec::new(),
            },
        ];

        Procedure {
            name,
            labels,
            insert_point: Self::PROLOGUE,
            next_vreg: 0,
            next_slot: 0,
        }
    }

    pub fn name(&self) -> Id {
        self.name
    }

    /// Make a body label for an IR block, mangled with the procedure name so
    /// labels stay unique across procedures.
    pub fn make_label(&mut self, block_name: &str) -> LabelId {
        let id = LabelId(self.labels.len());
        self.labels.push(Label {
            name: format!(".L{}_{block_name}", self.name),
            insts: Vec::new(),
        });
        id
    }

    pub fn label(&self, label: LabelId) -> &Label {
        &self.labels[label.0]
    }

    pub fn label_mut(&mut self, label: LabelId) -> &mut Label {
        &mut self.labels[label.0]
    }

    pub fn labels_mut(&mut self) -> impl Iterator<Item = &mut Label> {
        self.labels.iter_mut()
    }

    /// Prologue first, body labels in creation order, epilogue last — the
    /// order the allocator walks and the dumper prints.
    pub fn label_order(&self) -> impl Iterator<Item = LabelId> + '_ {
        let body = (2..self.labels.len()).map(LabelId);
        std::iter::once(Self::PROLOGUE)
            .chain(body)
            .chain(std::iter::once(Self::EPILOGUE))
    }

    pub fn set_insert_point(&mut self, label: LabelId) {
        assert!(
            label.0 < self.labels.len(),
            "label does not belong to this procedure"
        );
        self.insert_point = label;
    }

    /// Append at the current insertion label.
    pub fn emit(&mut self, inst: Inst) {
        self.labels[self.insert_point.0].insts.push(inst);
    }

    pub fn make_vreg(&mut self) -> VReg {
        let v = VReg(self.next_vreg);
        self.next_vreg += 1;
        v
    }

    pub fn alloc_slot(&mut self) -> StackSlot {
        let s = StackSlot(self.next_slot);
        self.next_slot += 1;
        s
    }

    pub fn slot_count(&self) -> u32 {
        self.next_slot
    }
}

/// A whole program's worth of machine code.
#[derive(Default)]
pub struct Unit {
    procs: Vec<Procedure>,
    externs: Vec<Id>,
}

impl Unit {
    pub fn make_procedure(&mut self, name: Id) -> ProcId {
        let id = ProcId(self.procs.len());
        self.procs.push(Procedure::new(name));
        id
    }

    pub fn add_external(&mut self, name: Id) -> ExternId {
        let id = ExternId(self.externs.len());
        self.externs.push(name);
        id
    }

    pub fn proc(&self, id: ProcId) -> &Procedure {
        &self.procs[id.0]
    }

    pub fn proc_mut(&mut self, id: ProcId) -> &mut Procedure {
        &mut self.procs[id.0]
    }

    pub fn procs(&self) -> impl Iterator<Item = &Procedure> {
        self.procs.iter()
    }

    pub fn procs_mut(&mut self) -> impl Iterator<Item = &mut Procedure> {
        self.procs.iter_mut()
    }

    /// The symbol a call target assembles to.
    pub fn symbol(&self, target: CallTarget) -> String {
        match target {
            CallTarget::Proc(p) => self.procs[p.0].label(Procedure::PROLOGUE).name.clone(),
            CallTarget::Extern(e) => format!("_{}", self.externs[e.0]),
        }
    }

    /// Render the final assembly text: one label per line, one tab-prefixed
    /// instruction per line, a blank line after each label's run.  Only
    /// defined procedures appear; no directives are emitted.
    pub fn asm_code(&self) -> String {
        let mut out = String::new();
        for proc in &self.procs {
            for label_id in proc.label_order() {
                let label = proc.label(label_id);
                writeln!(out, "{}:", label.name).unwrap();
                for inst in &label.insts {
                    writeln!(out, "\t{}", self.render(proc, inst)).unwrap();
                }
                out.push('\n');
            }
        }
        out
    }

    fn render(&self, proc: &Procedure, inst: &Inst) -> String {
        match inst {
            Inst::Mov { dst, src } => format!("mov {dst}, {src}"),
            Inst::Ldr { dst, src } => format!("ldr {dst}, {src}"),
            Inst::Str { src, dst } => format!("str {src}, {dst}"),
            Inst::B { target } => format!("b {}", proc.label(*target).name),
            Inst::Cbnz { cond, target } => format!("cbnz {cond}, {}", proc.label(*target).name),
            Inst::Bl { target } => format!("bl {}", self.symbol(*target)),
            Inst::Ret => "ret".to_owned(),
            Inst::Arith { op, dst, lhs, rhs } => format!("{op} {dst}, {lhs}, {rhs}"),
        }
    }
}
