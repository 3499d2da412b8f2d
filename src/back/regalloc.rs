//! The naive register allocator and the frame-assignment pass.
//!
//! No liveness analysis: every virtual register lives in a stack slot, every
//! use is a reload into a scratch register, every definition is stored right
//! back.  Per procedure, in label order, the allocator keeps one map from
//! virtual register to its spill memory and rewrites each instruction:
//!
//! - a plain `ldr _t, mem` defines nothing new — the instruction is deleted
//!   and `_t -> mem` recorded, so the load is re-materialized at each use
//!   instead of occupying a register across instructions (the one trick the
//!   allocator has);
//! - each source `_t` is reloaded into `x8+i` in operand order before the
//!   instruction;
//! - each destination `_t` gets `x8+|srcs|+j`, a spill slot on first
//!   definition, and a store after the instruction so the next reload sees
//!   the value.
//!
//! Scratch registers never survive an instruction, so x8..x15 suffice for
//! any instruction shape the selector emits.  The allocator never touches
//! labels or control flow.
//!
//! Frame assignment then turns every abstract stack slot *k* into the
//! concrete `[sp, #8k]`.  After both passes no virtual register and no
//! unassigned slot remains.

use log::debug;

use crate::common::Map;

use super::asm::{x, Inst, Mem, Operand, PhysReg, Procedure, Reg, Unit, VReg};

/// First scratch register; the allocator claims upward from here.
const SCRATCH_BASE: usize = 8;

/// Rewrite every procedure of `unit` to use physical registers only.
pub fn allocate(unit: &mut Unit) {
    for proc in unit.procs_mut() {
        allocate_proc(proc);
    }
}

fn allocate_proc(proc: &mut Procedure) {
    // vreg -> the memory its value lives in.  Shared across the whole
    // procedure: a value defined under one label may be used under another.
    let mut spills: Map<VReg, Mem> = Map::new();

    let order: Vec<_> = proc.label_order().collect();
    for label in order {
        let insts = std::mem::take(&mut proc.label_mut(label).insts);
        let mut rewritten = Vec::with_capacity(insts.len());

        for mut inst in insts {
            // Load coalescing: postpone a load into a virtual register
            // until the value is actually needed.
            if let Inst::Ldr {
                dst: Reg::Virt(v),
                src,
            } = inst
            {
                spills.insert(v, src);
                continue;
            }

            let srcs = inst.virt_srcs();
            let dsts = inst.virt_dsts();
            let mut assignment: Map<VReg, PhysReg> = Map::new();

            for (i, &v) in srcs.iter().enumerate() {
                let phys = x(SCRATCH_BASE + i);
                let mem = *spills
                    .get(&v)
                    .unwrap_or_else(|| panic!("{v} is used before it is defined"));
                rewritten.push(Inst::Ldr {
                    dst: Reg::Phys(phys),
                    src: mem,
                });
                assignment.insert(v, phys);
            }

            let mut stores = Vec::with_capacity(dsts.len());
            for (j, &v) in dsts.iter().enumerate() {
                let phys = x(SCRATCH_BASE + srcs.len() + j);
                let mem = *spills
                    .entry(v)
                    .or_insert_with(|| Mem::Slot(proc.alloc_slot()));
                assignment.insert(v, phys);
                stores.push(Inst::Str {
                    src: Operand::Reg(Reg::Phys(phys)),
                    dst: mem,
                });
            }

            inst.map_virt(&assignment);
            rewritten.push(inst);
            rewritten.extend(stores);
        }

        proc.label_mut(label).insts = rewritten;
    }

    debug!(
        "allocated @{}: {} slot(s), {} spilled vreg(s)",
        proc.name(),
        proc.slot_count(),
        spills.len()
    );
}

/// Give every stack slot its place in the frame: slot *k* is `[sp, #8k]`.
pub fn assign_frames(unit: &mut Unit) {
    for proc in unit.procs_mut() {
        for label in proc.labels_mut() {
            for inst in &mut label.insts {
                inst.for_each_mem_mut(&mut |mem| {
                    if let Mem::Slot(slot) = *mem {
                        *mem = Mem::Offset {
                            base: Reg::Phys(PhysReg::Sp),
                            offset: 8 * slot.0 as i64,
                        };
                    }
                });
            }
        }
    }
}
