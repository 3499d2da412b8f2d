//! Textual dump of the AST.
//!
//! One node per line, four spaces of indent per tree level, `Kind` or
//! `Kind (payload)`.  Prototypes come before functions, mirroring the order
//! they are held in the unit.  The dump is informational; nothing re-parses
//! it.

use std::fmt::Write;

use super::ast::{Expr, Function, Prototype, Stmt, Unit};

pub fn dump_ast(unit: &Unit) -> String {
    let mut dumper = Dumper::default();
    for proto in &unit.protos {
        dumper.proto(proto);
    }
    for func in &unit.funcs {
        dumper.func(func);
    }
    dumper.out
}

#[derive(Default)]
struct Dumper {
    out: String,
    indent: usize,
}

impl Dumper {
    fn line(&mut self, text: std::fmt::Arguments) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        writeln!(self.out, "{text}").unwrap();
    }

    fn nested(&mut self, body: impl FnOnce(&mut Self)) {
        self.indent += 1;
        body(self);
        self.indent -= 1;
    }

    fn proto(&mut self, proto: &Prototype) {
        self.line(format_args!("Prototype"));
        let types: Vec<&str> = proto.params.iter().map(|p| p.ty.as_str()).collect();
        let signature = format!("({}) : {}", types.join(", "), proto.ret);
        self.nested(|d| d.line(format_args!("{signature}")));
    }

    fn func(&mut self, func: &Function) {
        self.line(format_args!("Function"));
        self.nested(|d| {
            d.proto(&func.proto);
            d.stmt(&func.body);
        });
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(stmts) => {
                self.line(format_args!("BlockStmt"));
                self.nested(|d| {
                    for stmt in stmts {
                        d.stmt(stmt);
                    }
                });
            }
            Stmt::If { cond, then, els } => {
                self.line(format_args!("IfStmt"));
                self.nested(|d| {
                    d.expr(cond);
                    d.stmt(then);
                    if let Some(els) = els {
                        d.stmt(els);
                    }
                });
            }
            Stmt::While { cond, body } => {
                self.line(format_args!("WhileStmt"));
                self.nested(|d| {
                    d.expr(cond);
                    d.stmt(body);
                });
            }
            Stmt::Var { name, ty, init } => {
                self.line(format_args!("VarStmt"));
                self.nested(|d| {
                    d.line(format_args!("{name} ({ty})"));
                    if let Some(init) = init {
                        d.expr(init);
                    }
                });
            }
            Stmt::Return(expr) => {
                self.line(format_args!("ReturnStmt"));
                if let Some(expr) = expr {
                    self.nested(|d| d.expr(expr));
                }
            }
            Stmt::Expr(expr) => {
                self.line(format_args!("ExprStmt"));
                self.nested(|d| d.expr(expr));
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Number(val) => self.line(format_args!("Number ({val})")),
            Expr::Variable(name) => self.line(format_args!("Variable ({name})")),
            Expr::Unary { op, operand } => {
                self.line(format_args!("UnaryExpr ({op})"));
                self.nested(|d| d.expr(operand));
            }
            Expr::Binary { op, lhs, rhs } => {
                self.line(format_args!("BinaryExpr ({op})"));
                self.nested(|d| {
                    d.expr(lhs);
                    d.expr(rhs);
                });
            }
            Expr::Call { callee, args } => {
                self.line(format_args!("CallExpr ({callee})"));
                self.nested(|d| {
                    for arg in args {
                        d.expr(arg);
                    }
                });
            }
        }
    }
}
