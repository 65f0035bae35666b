pub mod token;

use logos::{Lexer as LogosLexer, Logos};
use std::ops::Range;
pub use token::Token;

/// Span-tracking wrapper over the logos lexer. Invalid input becomes a
/// `Token::Error` carrying a message instead of ending the stream.
pub struct Lexer<'source> {
    inner: LogosLexer<'source, Token>,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source str) -> Self {
        Lexer {
            inner: Token::lexer(source),
        }
    }

    pub fn next_token_with_span(&mut self) -> Option<(Token, Range<usize>)> {
        match self.inner.next()? {
            Ok(token) => Some((token, self.inner.span())),
            Err(_) => {
                let span = self.inner.span();
                let slice = self.inner.slice();
                let msg = if slice.trim_start_matches('-').chars().all(|c| c.is_ascii_digit()) {
                    format!("Integer literal '{}' is out of range", slice)
                } else {
                    format!("Invalid token '{}'", slice)
                };
                Some((Token::Error(msg), span))
            }
        }
    }

    /// Lexes the whole input.
    pub fn tokenize(source: &'source str) -> Vec<(Token, Range<usize>)> {
        let mut lexer = Lexer::new(source);
        std::iter::from_fn(move || lexer.next_token_with_span()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        Lexer::tokenize(src).into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            kinds("(ADD 1 -2)"),
            vec![
                Token::LParen,
                Token::Symbol("ADD".into()),
                Token::Int(1),
                Token::Int(-2),
                Token::RParen
            ]
        );
    }

    #[test]
    fn test_symbols_and_dot() {
        assert_eq!(
            kinds("(a . -) 'x <= zero?"),
            vec![
                Token::LParen,
                Token::Symbol("a".into()),
                Token::Dot,
                Token::Symbol("-".into()),
                Token::RParen,
                Token::Quote,
                Token::Symbol("x".into()),
                Token::Symbol("<=".into()),
                Token::Symbol("zero?".into()),
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(kinds("; hello\n 42 ; tail"), vec![Token::Int(42)]);
    }

    #[test]
    fn test_spans() {
        let toks = Lexer::tokenize("(FOO 12)");
        assert_eq!(toks[1].1, 1..4);
        assert_eq!(toks[2].1, 5..7);
    }

    #[test]
    fn test_invalid_tokens() {
        let toks = kinds("# 99999999999999999999");
        assert!(matches!(&toks[0], Token::Error(m) if m.contains("Invalid token")));
        assert!(matches!(&toks[1], Token::Error(m) if m.contains("out of range")));
    }
}
