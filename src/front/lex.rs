//! The lexer.

use derive_more::Display;
use regex::Regex;

use crate::common::{id, Id};

/// Tokens in the program.
///
/// Keywords are carved out of the identifier space by string equality after
/// the identifier rule matches.  Every character that is not part of an
/// identifier, a number, whitespace, or a comment comes back as [Token::Char]
/// and it is the parser's job to decide whether it means anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum Token {
    #[display("<eof>")]
    Eof,
    #[display("'func'")]
    Func,
    #[display("'extern'")]
    Extern,
    #[display("'if'")]
    If,
    #[display("'else'")]
    Else,
    /// Reserved but not part of the grammar yet.
    #[display("'for'")]
    For,
    #[display("'while'")]
    While,
    #[display("'return'")]
    Return,
    #[display("'var'")]
    Var,
    #[display("<identifier>")]
    Ident(Id),
    #[display("<number>")]
    Number(i64),
    #[display("'{_0}'")]
    Char(char),
}

pub struct Lexer<'input> {
    input: &'input str,
    pos: usize,
    /// 1-based line of the next unread character.
    row: u32,
    /// 1-based column of the next unread character.
    col: u32,
    /// Position of the first character of the last-emitted token.
    last_pos: (u32, u32),
    whitespace: Regex,
    ident: Regex,
    number: Regex,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        Lexer {
            input,
            pos: 0,
            row: 1,
            col: 1,
            last_pos: (1, 1),
            whitespace: Regex::new(r"\A(?:[ \t\f\r\n\v]|(?:#[^\n]*))*").unwrap(),
            ident: Regex::new(r"\A[A-Za-z][A-Za-z0-9_]*").unwrap(),
            number: Regex::new(r"\A[0-9]+").unwrap(),
        }
    }

    /// (row, column) of the first character of the last token [next] returned.
    pub fn last_pos(&self) -> (u32, u32) {
        self.last_pos
    }

    /// Has the lexer reached the end of input?
    pub fn end_of_input(&self) -> bool {
        self.pos == self.input.len()
    }

    /// Consume `len` bytes, keeping the line/column accounting in step.
    fn advance(&mut self, len: usize) {
        for byte in self.input[self.pos..self.pos + len].bytes() {
            if byte == b'\n' {
                self.row += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
        self.pos += len;
    }

    // Skip comments and whitespace
    fn skip_whitespace(&mut self) {
        if let Some(m) = self.whitespace.find(&self.input[self.pos..]) {
            self.advance(m.end());
        }
    }

    /// Get the next token.
    ///
    /// The lexer cannot fail: unknown characters are returned as themselves,
    /// and once the input is exhausted every call yields [Token::Eof].
    pub fn next(&mut self) -> Token {
        self.skip_whitespace();
        self.last_pos = (self.row, self.col);

        let rest = &self.input[self.pos..];
        if rest.is_empty() {
            return Token::Eof;
        }

        if let Some(m) = self.ident.find(rest) {
            self.advance(m.end());
            return match m.as_str() {
                "func" => Token::Func,
                "extern" => Token::Extern,
                "if" => Token::If,
                "else" => Token::Else,
                "for" => Token::For,
                "while" => Token::While,
                "return" => Token::Return,
                "var" => Token::Var,
                name => Token::Ident(id(name)),
            };
        }

        if let Some(m) = self.number.find(rest) {
            self.advance(m.end());
            // Saturate on overflow, like strtol.
            let val = m.as_str().parse().unwrap_or(i64::MAX);
            return Token::Number(val);
        }

        let c = rest.chars().next().unwrap();
        self.advance(c.len_utf8());
        Token::Char(c)
    }
}
