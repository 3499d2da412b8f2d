//! The parser.
//!
//! Recursive descent for statements and primaries, with an
//! operator-precedence loop for binary expressions.  The parser never fails:
//! a broken top-level form or statement is reported as a [Diagnostic], one
//! token is skipped, and parsing resumes, so the result is always a
//! best-effort [ast::Unit] together with everything that went wrong.

use log::trace;

use crate::common::{id, Diagnostic, Id, Map};

use super::ast::{Expr, Function, Param, Prototype, Stmt, Unit};
use super::lex::{Lexer, Token};

/// The outcome of parsing one source file.
#[derive(Debug)]
pub struct ParseResult {
    pub unit: Unit,
    pub errors: Vec<Diagnostic>,
}

/// Parse `source`, reporting diagnostics against `path`.
pub fn parse(path: &str, source: &str) -> ParseResult {
    let mut parser = Parser::new(path, source);
    let unit = parser.run();
    ParseResult {
        unit,
        errors: parser.errors,
    }
}

struct Parser<'src> {
    lexer: Lexer<'src>,
    /// One-token lookahead; the token currently being examined.
    cur: Token,
    path: String,
    /// Precedence for each declared binary operator, higher binds tighter.
    precedence: Map<char, i32>,
    errors: Vec<Diagnostic>,
}

impl<'src> Parser<'src> {
    fn new(path: &str, source: &'src str) -> Self {
        let mut lexer = Lexer::new(source);
        let cur = lexer.next();

        // 1 is the lowest precedence.
        let precedence = Map::from([('=', 2), ('<', 10), ('+', 20), ('-', 20), ('*', 40)]);

        Parser {
            lexer,
            cur,
            path: path.to_owned(),
            precedence,
            errors: Vec::new(),
        }
    }

    fn advance(&mut self) {
        self.cur = self.lexer.next();
    }

    /// Record a diagnostic at the current token and yield `None` so error
    /// paths can `return self.error(..)` from any production.
    fn error<T>(&mut self, message: String) -> Option<T> {
        let (row, col) = self.lexer.last_pos();
        trace!("parse error at {}:{row}:{col}: {message}", self.path);
        self.errors.push(Diagnostic {
            path: self.path.clone(),
            row,
            col,
            message,
        });
        None
    }

    fn expected_in<T>(&mut self, expected: &str, rule: &str) -> Option<T> {
        self.error(format!("Expected [{expected}] in {rule}, got {}", self.cur))
    }

    fn expected_after<T>(&mut self, expected: &str, symbol: &str) -> Option<T> {
        self.error(format!(
            "Expected [{expected}] after {symbol}, got {}",
            self.cur
        ))
    }

    /// Precedence of the pending binary operator, or -1 if the current token
    /// is not one.
    fn tok_precedence(&self) -> i32 {
        match self.cur {
            Token::Char(c) => self.precedence.get(&c).copied().unwrap_or(-1),
            _ => -1,
        }
    }

    /// top ::= definition | external | ';'
    fn run(&mut self) -> Unit {
        let mut unit = Unit::default();

        loop {
            match self.cur {
                Token::Eof => break,
                // Ignore top-level semicolons.
                Token::Char(';') => self.advance(),
                Token::Func => match self.parse_definition() {
                    Some(func) => unit.funcs.push(func),
                    // Skip one token for error recovery.
                    None => self.advance(),
                },
                Token::Extern => match self.parse_extern() {
                    Some(proto) => unit.protos.push(proto),
                    None => self.advance(),
                },
                _ => {
                    let _: Option<()> = self.expected_in("'func', 'extern', ';'", "compilation unit");
                    self.advance();
                }
            }
        }

        unit
    }

    /// definition ::= 'func' prototype block
    fn parse_definition(&mut self) -> Option<Function> {
        self.advance(); // eat 'func'.
        let proto = self.parse_prototype()?;
        let body = self.parse_block_stmt()?;
        Some(Function { proto, body })
    }

    /// external ::= 'extern' prototype
    fn parse_extern(&mut self) -> Option<Prototype> {
        self.advance(); // eat 'extern'.
        self.parse_prototype()
    }

    /// prototype ::= identifier '(' (param (',' param)*)? ')' (':' identifier)?
    /// param     ::= identifier ':' identifier
    fn parse_prototype(&mut self) -> Option<Prototype> {
        let name = match self.cur {
            Token::Ident(name) => name,
            _ => return self.expected_in("<identifier>", "prototype"),
        };
        self.advance(); // eat identifier.

        if self.cur != Token::Char('(') {
            return self.expected_in("'('", "prototype");
        }
        self.advance(); // eat '('.

        if !matches!(self.cur, Token::Ident(_) | Token::Char(')')) {
            return self.expected_in("')', <identifier>", "parameter list");
        }

        let mut params = Vec::new();
        while let Token::Ident(param) = self.cur {
            self.advance();
            if self.cur != Token::Char(':') {
                return self.expected_after("':'", "parameter name");
            }
            self.advance();
            let ty = match self.cur {
                Token::Ident(ty) => ty,
                _ => return self.expected_after("<identifier>", "':'"),
            };
            self.advance();
            params.push(Param { name: param, ty });

            match self.cur {
                Token::Char(')') => break,
                Token::Char(',') => self.advance(),
                _ => return self.expected_after("',', ')'", "parameter"),
            }
        }

        if self.cur != Token::Char(')') {
            return self.expected_in("')'", "prototype");
        }
        self.advance(); // eat ')'.

        if self.cur != Token::Char(':') {
            // No declared return type.
            return Some(Prototype {
                name,
                params,
                ret: id("void"),
            });
        }
        self.advance(); // eat ':'.

        let ret = match self.cur {
            Token::Ident(ret) => ret,
            _ => return self.expected_after("<identifier>", "':'"),
        };
        self.advance();

        Some(Prototype { name, params, ret })
    }

    /// block ::= '{' stmt* '}'
    fn parse_block_stmt(&mut self) -> Option<Stmt> {
        if self.cur != Token::Char('{') {
            return self.expected_in("'{'", "block");
        }
        self.advance(); // eat '{'.

        let stmts = self.parse_stmts();

        if self.cur != Token::Char('}') {
            return self.expected_in("'}'", "block");
        }
        self.advance(); // eat '}'.

        Some(Stmt::Block(stmts))
    }

    fn parse_stmts(&mut self) -> Vec<Stmt> {
        let mut stmts = Vec::new();

        // Stopping at end of input keeps an unterminated block from spinning;
        // the missing '}' is reported by the caller.
        while !matches!(self.cur, Token::Char('}') | Token::Eof) {
            if self.cur == Token::Char(';') {
                self.advance();
                continue;
            }
            match self.parse_stmt() {
                Some(stmt) => stmts.push(stmt),
                // The failed statement is discarded; skip one token so
                // parsing cannot get stuck on the offender.
                None => self.advance(),
            }
        }

        stmts
    }

    /// stmt ::= block | ifstmt | whilestmt | varstmt | returnstmt | expr ';'
    fn parse_stmt(&mut self) -> Option<Stmt> {
        match self.cur {
            Token::Char('{') => self.parse_block_stmt(),
            Token::If => self.parse_if_stmt(),
            Token::While => self.parse_while_stmt(),
            Token::Var => self.parse_var_stmt(),
            Token::Return => self.parse_return_stmt(),
            _ => {
                let expr = self.parse_expression()?;
                if self.cur != Token::Char(';') {
                    return self.expected_after("';'", "expression");
                }
                self.advance();
                Some(Stmt::Expr(expr))
            }
        }
    }

    /// ifstmt ::= 'if' expr block ('else' block)?
    fn parse_if_stmt(&mut self) -> Option<Stmt> {
        self.advance(); // eat 'if'.

        let cond = self.parse_expression()?;

        if self.cur != Token::Char('{') {
            return self.expected_in("'{'", "if statement");
        }
        let then = Box::new(self.parse_block_stmt()?);

        if self.cur != Token::Else {
            return Some(Stmt::If {
                cond,
                then,
                els: None,
            });
        }
        self.advance(); // eat 'else'.

        if self.cur != Token::Char('{') {
            return self.expected_in("'{'", "if statement");
        }
        let els = Box::new(self.parse_block_stmt()?);

        Some(Stmt::If {
            cond,
            then,
            els: Some(els),
        })
    }

    /// whilestmt ::= 'while' expr block
    fn parse_while_stmt(&mut self) -> Option<Stmt> {
        self.advance(); // eat 'while'.

        let cond = self.parse_expression()?;

        if self.cur != Token::Char('{') {
            return self.expected_in("'{'", "while statement");
        }
        let body = Box::new(self.parse_block_stmt()?);

        Some(Stmt::While { cond, body })
    }

    /// varstmt ::= 'var' identifier ':' identifier ('=' expr)? ';'
    fn parse_var_stmt(&mut self) -> Option<Stmt> {
        self.advance(); // eat 'var'.

        let name = match self.cur {
            Token::Ident(name) => name,
            _ => return self.expected_after("<identifier>", "'var'"),
        };
        self.advance(); // eat identifier.

        if self.cur != Token::Char(':') {
            return self.expected_after("':'", "identifier");
        }
        self.advance(); // eat ':'.

        let ty = match self.cur {
            Token::Ident(ty) => ty,
            _ => return self.expected_after("<identifier>", "':'"),
        };
        self.advance(); // eat identifier.

        // Read the optional initializer.
        let mut init = None;
        if self.cur == Token::Char('=') {
            self.advance(); // eat '='.
            init = Some(self.parse_expression()?);
        }

        if self.cur != Token::Char(';') {
            return self.expected_in("';'", "var statement");
        }
        self.advance();

        Some(Stmt::Var { name, ty, init })
    }

    /// returnstmt ::= 'return' expr? ';'
    fn parse_return_stmt(&mut self) -> Option<Stmt> {
        self.advance(); // eat 'return'.

        if self.cur == Token::Char(';') {
            self.advance();
            return Some(Stmt::Return(None));
        }

        let expr = self.parse_expression()?;

        if self.cur != Token::Char(';') {
            return self.expected_after("';'", "expression");
        }
        self.advance();

        Some(Stmt::Return(Some(expr)))
    }

    /// expression ::= unary binoprhs
    fn parse_expression(&mut self) -> Option<Expr> {
        let lhs = self.parse_unary()?;
        self.parse_binop_rhs(0, lhs)
    }

    /// binoprhs ::= (binop unary)*
    fn parse_binop_rhs(&mut self, expr_prec: i32, mut lhs: Expr) -> Option<Expr> {
        loop {
            let tok_prec = self.tok_precedence();

            // If this is a binop that binds at least as tightly as the
            // current binop, consume it, otherwise we are done.
            if tok_prec < expr_prec {
                return Some(lhs);
            }

            let op = match self.cur {
                Token::Char(op) => op,
                _ => unreachable!("token without precedence"),
            };
            self.advance(); // eat binop.

            let mut rhs = self.parse_unary()?;

            // If the operator after rhs binds tighter, let it take rhs as
            // its lhs first.
            let next_prec = self.tok_precedence();
            if tok_prec < next_prec {
                rhs = self.parse_binop_rhs(tok_prec + 1, rhs)?;
            }

            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    /// unary ::= primary | unary_op unary
    fn parse_unary(&mut self) -> Option<Expr> {
        // Anything that is not a plain character token must start a primary.
        let op = match self.cur {
            Token::Char(op) if op != '(' && op != ',' => op,
            _ => return self.parse_primary(),
        };

        self.advance(); // eat the operator.
        let operand = Box::new(self.parse_unary()?);
        Some(Expr::Unary { op, operand })
    }

    /// primary ::= identifierexpr | numberexpr | parenexpr
    fn parse_primary(&mut self) -> Option<Expr> {
        match self.cur {
            Token::Ident(name) => self.parse_identifier_expr(name),
            Token::Number(val) => {
                self.advance(); // consume the number.
                Some(Expr::Number(val))
            }
            Token::Char('(') => self.parse_paren_expr(),
            _ => self.expected_in("<identifier>, <number>, '('", "primary"),
        }
    }

    /// identifierexpr ::= identifier | identifier '(' (expr (',' expr)*)? ')'
    fn parse_identifier_expr(&mut self, name: Id) -> Option<Expr> {
        self.advance(); // eat identifier.

        if self.cur != Token::Char('(') {
            // Simple variable ref.
            return Some(Expr::Variable(name));
        }

        // Call.
        self.advance(); // eat '('.
        let mut args = Vec::new();
        if self.cur != Token::Char(')') {
            loop {
                args.push(self.parse_expression()?);

                if self.cur == Token::Char(')') {
                    break;
                }
                if self.cur != Token::Char(',') {
                    return self.expected_in("')', ','", "argument list");
                }
                self.advance();
            }
        }
        self.advance(); // eat ')'.

        Some(Expr::Call { callee: name, args })
    }

    /// parenexpr ::= '(' expression ')'
    fn parse_paren_expr(&mut self) -> Option<Expr> {
        self.advance(); // eat '('.
        let expr = self.parse_expression()?;

        if self.cur != Token::Char(')') {
            return self.expected_in("')'", "parenexpr");
        }
        self.advance(); // eat ')'.
        Some(expr)
    }
}
