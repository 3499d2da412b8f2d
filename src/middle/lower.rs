//! Lowering from the AST to the IR.
//!
//! Statements drive the block graph (if/while become explicit branches
//! between fresh blocks, moving the function's insertion point as they go);
//! expressions thread a single result value through their sub-expressions.
//! Name resolution is a [NestedScope]: a stack of frames pushed and popped
//! with block statements.
//!
//! Anything the parser let through but the IR cannot express — an operator
//! with no lowering, a call to an unknown name — is a fatal [LowerError];
//! the driver reports it once and stops the pipeline.

use derive_more::Display;
use log::debug;

use crate::common::{Id, Map};
use crate::front::ast;

use super::ir::{self, ArithOp, FuncId, ValueId};

/// Largest number of formal parameters a function may declare; the selector
/// passes arguments in x0..x7.
pub const MAX_PARAMS: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq, Display)]
pub enum LowerError {
    #[display("unknown variable '{_0}'")]
    UnknownVariable(Id),
    #[display("unknown function '{_0}'")]
    UnknownCallee(Id),
    #[display("unknown unary operator '{_0}'")]
    UnknownUnaryOp(char),
    #[display("unknown binary operator '{_0}'")]
    UnknownBinaryOp(char),
    #[display("left-hand side of '=' is not assignable")]
    InvalidAssignment,
    #[display("function '{_0}' is already defined")]
    Redefinition(Id),
    #[display("function '{_0}' has more than 8 parameters")]
    TooManyParams(Id),
    #[display("function '{callee}' takes {expected} argument(s), {found} given")]
    ArityMismatch {
        callee: Id,
        expected: usize,
        found: usize,
    },
}

/// Lower a parsed unit into IR.
pub fn lower(unit: &ast::Unit) -> Result<ir::Unit, LowerError> {
    let mut ir_unit = ir::Unit::default();

    // Declare every signature up front, in declaration order, so that a call
    // may refer to a function defined further down the file.
    for proto in &unit.protos {
        declare(&mut ir_unit, proto)?;
    }
    for func in &unit.funcs {
        declare(&mut ir_unit, &func.proto)?;
    }

    for func in &unit.funcs {
        lower_function(&mut ir_unit, func)?;
    }

    Ok(ir_unit)
}

fn declare(unit: &mut ir::Unit, proto: &ast::Prototype) -> Result<(), LowerError> {
    if proto.params.len() > MAX_PARAMS {
        return Err(LowerError::TooManyParams(proto.name));
    }

    let params: Vec<Id> = proto.params.iter().map(|p| p.name).collect();
    // The first declaration of a name wins; repeats are simply not created.
    let _ = unit.make_function(proto.name, &params);
    Ok(())
}

fn lower_function(unit: &mut ir::Unit, func: &ast::Function) -> Result<(), LowerError> {
    let fid = unit
        .lookup(func.proto.name)
        .expect("function was declared in the first pass");
    if unit.func(fid).entry_block().is_some() {
        return Err(LowerError::Redefinition(func.proto.name));
    }

    debug!("lowering @{}", func.proto.name);

    let mut scope = NestedScope::new();
    {
        let f = unit.func_mut(fid);
        let entry = f.create_entry_block();
        f.set_insert_point(entry);

        // Parameters live in the outermost frame of the function body.
        for &param in f.params() {
            if let ir::Value::Param { name } = f.value(param) {
                scope.update(*name, param);
            }
        }
    }

    let mut lowerer = Lowerer {
        unit: &mut *unit,
        fid,
        scope,
    };
    lowerer.stmt(&func.body)?;

    // A body that falls off the end returns void; this is what keeps every
    // block terminated.
    let f = unit.func_mut(fid);
    let last = f.insert_point().expect("insertion point survives the body");
    if !f.is_terminated(last) {
        f.append_return(None);
    }

    Ok(())
}

/// A stack of name->value frames.  Lookup walks from the innermost frame
/// outward, so inner declarations shadow outer ones.
struct NestedScope {
    stack: Vec<Map<Id, ValueId>>,
}

impl NestedScope {
    fn new() -> Self {
        NestedScope {
            stack: vec![Map::new()],
        }
    }

    fn open(&mut self) {
        self.stack.push(Map::new());
    }

    fn close(&mut self) {
        self.stack.pop();
    }

    fn lookup(&self, name: Id) -> Option<ValueId> {
        self.stack
            .iter()
            .rev()
            .find_map(|frame| frame.get(&name).copied())
    }

    /// Bind `name` in the innermost frame, overwriting a same-frame binding.
    fn update(&mut self, name: Id, value: ValueId) {
        self.stack
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name, value);
    }
}

struct Lowerer<'a> {
    unit: &'a mut ir::Unit,
    fid: FuncId,
    scope: NestedScope,
}

impl Lowerer<'_> {
    fn func(&mut self) -> &mut ir::Function {
        self.unit.func_mut(self.fid)
    }

    /// In a fresh scope frame, do...
    fn in_scope<R>(&mut self, body: impl FnOnce(&mut Self) -> R) -> R {
        self.scope.open();
        let result = body(self);
        self.scope.close();
        result
    }

    /// Promote an l-value to an r-value by loading from it; r-values pass
    /// through untouched.
    fn rvalue(&mut self, value: ValueId) -> ValueId {
        if self.unit.func(self.fid).is_lvalue(value) {
            self.func().append_load(value)
        } else {
            value
        }
    }

    fn stmt(&mut self, stmt: &ast::Stmt) -> Result<(), LowerError> {
        match stmt {
            ast::Stmt::Block(stmts) => self.in_scope(|this| {
                for stmt in stmts {
                    this.stmt(stmt)?;
                }
                Ok(())
            }),

            ast::Stmt::If { cond, then, els } => {
                let cond = self.expr(cond)?;
                let cond = self.rvalue(cond);

                let then_bb = self.func().make_block();
                let else_bb = els.as_ref().map(|_| self.func().make_block());
                let final_bb = self.func().make_block();
                self.func()
                    .append_cjump(cond, then_bb, else_bb.unwrap_or(final_bb));

                self.func().set_insert_point(then_bb);
                self.stmt(then)?;
                self.func().append_jump(final_bb);

                if let (Some(els), Some(else_bb)) = (els, else_bb) {
                    self.func().set_insert_point(else_bb);
                    self.stmt(els)?;
                    self.func().append_jump(final_bb);
                }

                self.func().set_insert_point(final_bb);
                Ok(())
            }

            ast::Stmt::While { cond, body } => {
                let cond_bb = self.func().make_block();
                let loop_bb = self.func().make_block();
                let final_bb = self.func().make_block();

                self.func().append_jump(cond_bb);
                self.func().set_insert_point(cond_bb);
                let cond = self.expr(cond)?;
                let cond = self.rvalue(cond);
                self.func().append_cjump(cond, loop_bb, final_bb);

                self.func().set_insert_point(loop_bb);
                self.stmt(body)?;
                self.func().append_jump(cond_bb);

                self.func().set_insert_point(final_bb);
                Ok(())
            }

            ast::Stmt::Var { name, init, .. } => {
                let cell = self.func().append_alloca();
                self.scope.update(*name, cell);

                if let Some(init) = init {
                    let value = self.expr(init)?;
                    let value = self.rvalue(value);
                    self.func().append_store(value, cell);
                }
                Ok(())
            }

            ast::Stmt::Return(expr) => {
                let val = match expr {
                    Some(expr) => {
                        let value = self.expr(expr)?;
                        Some(self.rvalue(value))
                    }
                    None => None,
                };
                // Statements after this one land in the same block as dead
                // code; nothing downstream minds.
                self.func().append_return(val);
                Ok(())
            }

            ast::Stmt::Expr(expr) => {
                self.expr(expr)?;
                Ok(())
            }
        }
    }

    fn expr(&mut self, expr: &ast::Expr) -> Result<ValueId, LowerError> {
        match expr {
            ast::Expr::Number(val) => Ok(self.func().make_constant(*val)),

            ast::Expr::Variable(name) => self
                .scope
                .lookup(*name)
                .ok_or(LowerError::UnknownVariable(*name)),

            ast::Expr::Unary { op, operand } => {
                let operand = self.expr(operand)?;
                let operand = self.rvalue(operand);
                match op {
                    '-' => {
                        let zero = self.func().make_constant(0);
                        Ok(self.func().append_arith(ArithOp::Sub, zero, operand))
                    }
                    _ => Err(LowerError::UnknownUnaryOp(*op)),
                }
            }

            ast::Expr::Binary { op, lhs, rhs } => {
                let lhs = self.expr(lhs)?;
                let rhs = self.expr(rhs)?;

                if *op == '=' {
                    // The left side stays an l-value: it names the cell
                    // being assigned.
                    let rhs = self.rvalue(rhs);
                    if !self.unit.func(self.fid).is_lvalue(lhs) {
                        return Err(LowerError::InvalidAssignment);
                    }
                    self.func().append_store(rhs, lhs);
                    return Ok(rhs);
                }

                let lhs = self.rvalue(lhs);
                let rhs = self.rvalue(rhs);
                let op = match op {
                    '+' => ArithOp::Add,
                    '-' => ArithOp::Sub,
                    '*' => ArithOp::Mul,
                    _ => return Err(LowerError::UnknownBinaryOp(*op)),
                };
                Ok(self.func().append_arith(op, lhs, rhs))
            }

            ast::Expr::Call { callee, args } => {
                let target = self
                    .unit
                    .lookup(*callee)
                    .ok_or(LowerError::UnknownCallee(*callee))?;

                let expected = self.unit.func(target).params().len();
                if args.len() != expected {
                    return Err(LowerError::ArityMismatch {
                        callee: *callee,
                        expected,
                        found: args.len(),
                    });
                }

                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    let value = self.expr(arg)?;
                    values.push(self.rvalue(value));
                }
                Ok(self.func().append_call(target, values))
            }
        }
    }
}
