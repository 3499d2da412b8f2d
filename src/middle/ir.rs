//! The intermediate representation.
//!
//! A [Unit] owns functions; a [Function] owns basic blocks and a single
//! arena of [Value]s (parameters, constants, instructions).  Instructions
//! refer to their operands by [ValueId] into that arena and to branch
//! targets by [BlockId], so the use-def graph is plain indices and the
//! ownership tree stays strictly downward.
//!
//! The builder interface (`make_*`/`append_*`) is how lowering constructs
//! IR: instructions are appended at the function's current insertion point.
//! Misusing the builder — appending with no insertion point, pointing a
//! load at something that is not a stack cell — is a compiler bug, not a
//! user error, and asserts accordingly.

use derive_more::Display;

use crate::common::{Id, Map};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FuncId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ValueId(pub usize);

/// Arithmetic operations, shared with the machine IR.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum ArithOp {
    #[display("add")]
    Add,
    #[display("sub")]
    Sub,
    #[display("mul")]
    Mul,
}

/// A vertex of the use-def graph.
///
/// Parameters and alloca results are l-values: they name a stack cell, and
/// reading the cell takes an explicit [Inst::Load].  Everything else is a
/// plain r-value.
#[derive(Debug)]
pub enum Value {
    Param { name: Id },
    Const(i64),
    Inst(Inst),
}

#[derive(Debug)]
pub enum Inst {
    /// Produces a pointer to a fresh stack cell.
    Alloca,
    Load {
        ptr: ValueId,
    },
    Store {
        val: ValueId,
        ptr: ValueId,
    },
    Arith {
        op: ArithOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Call {
        callee: FuncId,
        args: Vec<ValueId>,
    },
    Jump {
        target: BlockId,
    },
    CJump {
        cond: ValueId,
        then_bb: BlockId,
        else_bb: BlockId,
    },
    Return {
        val: Option<ValueId>,
    },
}

impl Inst {
    pub fn is_terminator(&self) -> bool {
        matches!(self, Inst::Jump { .. } | Inst::CJump { .. } | Inst::Return { .. })
    }
}

#[derive(Debug)]
pub struct Block {
    name: String,
    insts: Vec<ValueId>,
}

impl Block {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn insts(&self) -> &[ValueId] {
        &self.insts
    }
}

#[derive(Debug)]
pub struct Function {
    name: Id,
    params: Vec<ValueId>,
    blocks: Vec<Block>,
    values: Vec<Value>,
    insert_point: Option<BlockId>,
}

impl Function {
    fn new(name: Id, params: &[Id]) -> Self {
        let values: Vec<Value> = params
            .iter()
            .map(|&name| Value::Param { name })
            .collect();
        let params = (0..values.len()).map(ValueId).collect();

        // No entry block yet: a function stays blockless until (unless) its
        // body is lowered, and a blockless function is an extern.
        Function {
            name,
            params,
            blocks: Vec::new(),
            values,
            insert_point: None,
        }
    }

    pub fn name(&self) -> Id {
        self.name
    }

    pub fn params(&self) -> &[ValueId] {
        &self.params
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.blocks.iter().enumerate().map(|(i, b)| (BlockId(i), b))
    }

    pub fn block(&self, block: BlockId) -> &Block {
        &self.blocks[block.0]
    }

    pub fn value(&self, value: ValueId) -> &Value {
        &self.values[value.0]
    }

    /// Every value of the function's arena: parameters, constants, and
    /// instructions alike.
    pub fn values(&self) -> impl Iterator<Item = (ValueId, &Value)> {
        self.values.iter().enumerate().map(|(i, v)| (ValueId(i), v))
    }

    /// An extern has no body, hence no blocks.
    pub fn is_extern(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The first block ever created, if any.
    pub fn entry_block(&self) -> Option<BlockId> {
        (!self.blocks.is_empty()).then_some(BlockId(0))
    }

    pub fn create_entry_block(&mut self) -> BlockId {
        assert!(self.blocks.is_empty(), "entry block already exists");
        self.make_block()
    }

    pub fn make_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(Block {
            name: format!("BB_{}", id.0),
            insts: Vec::new(),
        });
        id
    }

    pub fn insert_point(&self) -> Option<BlockId> {
        self.insert_point
    }

    pub fn set_insert_point(&mut self, block: BlockId) {
        assert!(
            block.0 < self.blocks.len(),
            "block does not belong to this function"
        );
        self.insert_point = Some(block);
    }

    /// Does `block` end in a terminator?
    pub fn is_terminated(&self, block: BlockId) -> bool {
        match self.blocks[block.0].insts.last() {
            Some(&last) => match &self.values[last.0] {
                Value::Inst(inst) => inst.is_terminator(),
                _ => unreachable!("blocks hold only instructions"),
            },
            None => false,
        }
    }

    pub fn make_constant(&mut self, val: i64) -> ValueId {
        let id = ValueId(self.values.len());
        self.values.push(Value::Const(val));
        id
    }

    pub fn is_lvalue(&self, value: ValueId) -> bool {
        matches!(
            self.values[value.0],
            Value::Param { .. } | Value::Inst(Inst::Alloca)
        )
    }

    fn append(&mut self, inst: Inst) -> ValueId {
        let at = self.insert_point.expect("no insertion point set");
        let id = ValueId(self.values.len());
        self.values.push(Value::Inst(inst));
        self.blocks[at.0].insts.push(id);
        id
    }

    pub fn append_alloca(&mut self) -> ValueId {
        self.append(Inst::Alloca)
    }

    pub fn append_load(&mut self, ptr: ValueId) -> ValueId {
        assert!(self.is_lvalue(ptr), "load from a non-lvalue");
        self.append(Inst::Load { ptr })
    }

    pub fn append_store(&mut self, val: ValueId, ptr: ValueId) {
        assert!(self.is_lvalue(ptr), "store to a non-lvalue");
        self.append(Inst::Store { val, ptr });
    }

    pub fn append_arith(&mut self, op: ArithOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.append(Inst::Arith { op, lhs, rhs })
    }

    pub fn append_call(&mut self, callee: FuncId, args: Vec<ValueId>) -> ValueId {
        self.append(Inst::Call { callee, args })
    }

    pub fn append_jump(&mut self, target: BlockId) {
        self.append(Inst::Jump { target });
    }

    pub fn append_cjump(&mut self, cond: ValueId, then_bb: BlockId, else_bb: BlockId) {
        self.append(Inst::CJump {
            cond,
            then_bb,
            else_bb,
        });
    }

    pub fn append_return(&mut self, val: Option<ValueId>) {
        self.append(Inst::Return { val });
    }
}

/// A compilation unit: functions in declaration order plus a by-name table.
#[derive(Default, Debug)]
pub struct Unit {
    funcs: Vec<Function>,
    table: Map<Id, FuncId>,
}

impl Unit {
    /// Create a function.  The first declaration of a name wins: if `name`
    /// is already taken, nothing is created and `None` is returned.
    pub fn make_function(&mut self, name: Id, params: &[Id]) -> Option<FuncId> {
        if self.table.contains_key(&name) {
            return None;
        }

        let id = FuncId(self.funcs.len());
        self.funcs.push(Function::new(name, params));
        self.table.insert(name, id);
        Some(id)
    }

    pub fn lookup(&self, name: Id) -> Option<FuncId> {
        self.table.get(&name).copied()
    }

    pub fn func(&self, id: FuncId) -> &Function {
        &self.funcs[id.0]
    }

    pub fn func_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.funcs[id.0]
    }

    pub fn funcs(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.funcs.iter().enumerate().map(|(i, f)| (FuncId(i), f))
    }
}
