use crate::common::id;

use super::ast::{Expr, Stmt, Unit};
use super::dump::dump_ast;
use super::lex::{Lexer, Token};
use super::parse::parse;

fn tokens(input: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(input);
    let mut out = Vec::new();
    loop {
        let token = lexer.next();
        let done = token == Token::Eof;
        out.push(token);
        if done {
            return out;
        }
    }
}

fn parse_ok(input: &str) -> Unit {
    let result = parse("test.toy", input);
    assert!(
        result.errors.is_empty(),
        "Parse errors: {:?}",
        result.errors
    );
    result.unit
}

/// Parse `expr` as the sole expression statement of a function body.
fn parse_expr(expr: &str) -> Expr {
    let mut unit = parse_ok(&format!("func test() {{ {expr}; }}"));
    let body = match unit.funcs.pop().expect("one function").body {
        Stmt::Block(stmts) => stmts,
        other => panic!("body is not a block: {other:?}"),
    };
    match body.into_iter().next().expect("one statement") {
        Stmt::Expr(expr) => expr,
        other => panic!("not an expression statement: {other:?}"),
    }
}

fn number(val: i64) -> Box<Expr> {
    Box::new(Expr::Number(val))
}

fn variable(name: &str) -> Box<Expr> {
    Box::new(Expr::Variable(id(name)))
}

#[test]
fn lex_identity_function() {
    assert_eq!(
        tokens("func id(a: int) : int { return a; }"),
        vec![
            Token::Func,
            Token::Ident(id("id")),
            Token::Char('('),
            Token::Ident(id("a")),
            Token::Char(':'),
            Token::Ident(id("int")),
            Token::Char(')'),
            Token::Char(':'),
            Token::Ident(id("int")),
            Token::Char('{'),
            Token::Return,
            Token::Ident(id("a")),
            Token::Char(';'),
            Token::Char('}'),
            Token::Eof,
        ]
    );
}

#[test]
fn lex_keywords() {
    assert_eq!(
        tokens("func extern if else for while return var"),
        vec![
            Token::Func,
            Token::Extern,
            Token::If,
            Token::Else,
            Token::For,
            Token::While,
            Token::Return,
            Token::Var,
            Token::Eof,
        ]
    );
}

#[test]
fn lex_eof_is_idempotent() {
    let mut lexer = Lexer::new("x");
    assert_eq!(lexer.next(), Token::Ident(id("x")));
    assert_eq!(lexer.next(), Token::Eof);
    assert_eq!(lexer.next(), Token::Eof);
    assert!(lexer.end_of_input());
}

#[test]
fn lex_skips_whitespace_and_comments() {
    assert_eq!(
        tokens("# a comment\n  42 # trailing\n"),
        vec![Token::Number(42), Token::Eof]
    );
}

#[test]
fn lex_identifier_with_digits_and_underscores() {
    assert_eq!(
        tokens("a_b1 returned"),
        vec![Token::Ident(id("a_b1")), Token::Ident(id("returned")), Token::Eof]
    );
}

#[test]
fn lex_unknown_characters_come_back_verbatim() {
    assert_eq!(
        tokens("@ $"),
        vec![Token::Char('@'), Token::Char('$'), Token::Eof]
    );
}

#[test]
fn lex_huge_number_saturates() {
    assert_eq!(
        tokens("99999999999999999999"),
        vec![Token::Number(i64::MAX), Token::Eof]
    );
}

#[test]
fn lex_tracks_row_and_column() {
    let mut lexer = Lexer::new("func\n  foo");
    lexer.next();
    assert_eq!(lexer.last_pos(), (1, 1));
    lexer.next();
    assert_eq!(lexer.last_pos(), (2, 3));
    lexer.next();
    assert_eq!(lexer.last_pos(), (2, 6));
}

#[test]
fn parse_identity_function() {
    let unit = parse_ok("func id(a: int) : int { return a; }");
    assert_eq!(unit.funcs.len(), 1);

    let func = &unit.funcs[0];
    assert_eq!(func.proto.name, id("id"));
    assert_eq!(func.proto.ret, id("int"));
    assert_eq!(func.proto.params.len(), 1);
    assert_eq!(func.proto.params[0].name, id("a"));
    assert_eq!(func.proto.params[0].ty, id("int"));

    assert_eq!(
        func.body,
        Stmt::Block(vec![Stmt::Return(Some(Expr::Variable(id("a"))))])
    );
}

#[test]
fn parse_missing_return_type_defaults_to_void() {
    let unit = parse_ok("func f() { }");
    assert_eq!(unit.funcs[0].proto.ret, id("void"));
}

#[test]
fn parse_extern_prototype() {
    let unit = parse_ok("extern print(x: int);");
    assert_eq!(unit.protos.len(), 1);
    assert_eq!(unit.protos[0].name, id("print"));
    assert_eq!(unit.protos[0].ret, id("void"));
}

#[test]
fn parse_multiplication_binds_tighter_than_addition() {
    assert_eq!(
        parse_expr("1 + 2 * 3"),
        Expr::Binary {
            op: '+',
            lhs: number(1),
            rhs: Box::new(Expr::Binary {
                op: '*',
                lhs: number(2),
                rhs: number(3),
            }),
        }
    );

    assert_eq!(
        parse_expr("1 * 2 + 3"),
        Expr::Binary {
            op: '+',
            lhs: Box::new(Expr::Binary {
                op: '*',
                lhs: number(1),
                rhs: number(2),
            }),
            rhs: number(3),
        }
    );
}

#[test]
fn parse_parens_override_precedence() {
    assert_eq!(
        parse_expr("(1 + 2) * 3"),
        Expr::Binary {
            op: '*',
            lhs: Box::new(Expr::Binary {
                op: '+',
                lhs: number(1),
                rhs: number(2),
            }),
            rhs: number(3),
        }
    );
}

#[test]
fn parse_same_precedence_associates_left() {
    assert_eq!(
        parse_expr("1 - 2 + 3"),
        Expr::Binary {
            op: '+',
            lhs: Box::new(Expr::Binary {
                op: '-',
                lhs: number(1),
                rhs: number(2),
            }),
            rhs: number(3),
        }
    );
}

#[test]
fn parse_assignment_binds_loosest() {
    assert_eq!(
        parse_expr("x = y + 1"),
        Expr::Binary {
            op: '=',
            lhs: variable("x"),
            rhs: Box::new(Expr::Binary {
                op: '+',
                lhs: variable("y"),
                rhs: number(1),
            }),
        }
    );
}

#[test]
fn parse_unary_operators_nest() {
    assert_eq!(
        parse_expr("--x"),
        Expr::Unary {
            op: '-',
            operand: Box::new(Expr::Unary {
                op: '-',
                operand: variable("x"),
            }),
        }
    );
}

#[test]
fn parse_call_with_arguments() {
    assert_eq!(
        parse_expr("f(1, x)"),
        Expr::Call {
            callee: id("f"),
            args: vec![Expr::Number(1), Expr::Variable(id("x"))],
        }
    );
}

#[test]
fn parse_if_with_and_without_else() {
    let unit = parse_ok("func f(x: int) { if x { } if x { } else { } }");
    let stmts = match &unit.funcs[0].body {
        Stmt::Block(stmts) => stmts,
        other => panic!("body is not a block: {other:?}"),
    };
    assert!(matches!(&stmts[0], Stmt::If { els: None, .. }));
    assert!(matches!(&stmts[1], Stmt::If { els: Some(_), .. }));
}

#[test]
fn parse_var_with_and_without_initializer() {
    let unit = parse_ok("func f() { var a: int; var b: int = 2; }");
    let stmts = match &unit.funcs[0].body {
        Stmt::Block(stmts) => stmts,
        other => panic!("body is not a block: {other:?}"),
    };
    assert_eq!(
        stmts[0],
        Stmt::Var {
            name: id("a"),
            ty: id("int"),
            init: None,
        }
    );
    assert_eq!(
        stmts[1],
        Stmt::Var {
            name: id("b"),
            ty: id("int"),
            init: Some(Expr::Number(2)),
        }
    );
}

#[test]
fn parse_bare_semicolons_are_ignored() {
    let unit = parse_ok("; func f() { ;; } ;");
    assert_eq!(unit.funcs[0].body, Stmt::Block(vec![]));
}

#[test]
fn recovery_skips_a_broken_definition() {
    let result = parse("test.toy", "func (x) func good() { }");
    assert!(!result.errors.is_empty());
    assert_eq!(result.unit.funcs.len(), 1);
    assert_eq!(result.unit.funcs[0].proto.name, id("good"));
}

#[test]
fn recovery_drops_only_the_broken_statement() {
    let result = parse("test.toy", "func f() { var ; return 1; }");
    assert_eq!(result.errors.len(), 1);
    assert_eq!(
        result.unit.funcs[0].body,
        Stmt::Block(vec![Stmt::Return(Some(Expr::Number(1)))])
    );
}

#[test]
fn recovery_reports_unexpected_top_level_token() {
    let result = parse("test.toy", "42 func f() { }");
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.unit.funcs.len(), 1);
}

#[test]
fn diagnostics_carry_path_and_position() {
    let result = parse("demo.toy", "func f() {\n  var ;\n}");
    assert_eq!(result.errors.len(), 1);
    let diag = &result.errors[0];
    assert_eq!(diag.path, "demo.toy");
    assert_eq!((diag.row, diag.col), (2, 7));
    assert_eq!(
        diag.to_string(),
        format!("demo.toy:2:7: {}", diag.message)
    );
}

#[test]
fn unterminated_block_terminates_with_errors() {
    let result = parse("test.toy", "func f() { return 1;");
    assert!(!result.errors.is_empty());
    assert!(result.unit.funcs.is_empty());
}

#[test]
fn dump_shapes() {
    let unit = parse_ok(
        "extern print(x: int);\n\
         func main() : int { var x: int = 1; print(x); return 0; }",
    );
    let expected = "\
Prototype
    (int) : void
Function
    Prototype
        () : int
    BlockStmt
        VarStmt
            x (int)
            Number (1)
        ExprStmt
            CallExpr (print)
                Variable (x)
        ReturnStmt
            Number (0)
";
    assert_eq!(dump_ast(&unit), expected);
}

#[test]
fn dump_if_and_while() {
    let unit = parse_ok("func f(x: int) { while x { if x { } else { x = x - 1; } } }");
    let expected = "\
Function
    Prototype
        (int) : void
    BlockStmt
        WhileStmt
            Variable (x)
            BlockStmt
                IfStmt
                    Variable (x)
                    BlockStmt
                    BlockStmt
                        ExprStmt
                            BinaryExpr (=)
                                Variable (x)
                                BinaryExpr (-)
                                    Variable (x)
                                    Number (1)
";
    assert_eq!(dump_ast(&unit), expected);
}
