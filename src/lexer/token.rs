use logos::Logos;
use std::fmt::{Display, Formatter, Result as FmtResult};

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r";[^\n]*")]
pub enum Token {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(".")]
    Dot,
    #[token("'")]
    Quote,

    #[regex(r"-?[0-9]+", lex_integer, priority = 5)]
    Int(i64),
    #[regex(r"[A-Za-z!$%&*/:<=>?^_~+\-][A-Za-z0-9!$%&*/:<=>?^_~+\-.]*", lex_symbol, priority = 1)]
    Symbol(String),

    /// Produced by the lexer wrapper, never by logos itself.
    Error(String),
}

fn lex_integer(lexer: &mut logos::Lexer<Token>) -> Option<i64> {
    lexer.slice().parse::<i64>().ok()
}

fn lex_symbol(lexer: &mut logos::Lexer<Token>) -> Option<String> {
    Some(lexer.slice().to_string())
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::Dot => write!(f, "'.'"),
            Token::Quote => write!(f, "quote"),
            Token::Int(i) => write!(f, "{}", i),
            Token::Symbol(s) => write!(f, "{}", s),
            Token::Error(msg) => write!(f, "{}", msg),
        }
    }
}
