pub(crate) mod ast;
pub mod lower;

use crate::lexer::Token;
pub use ast::{Datum, DatumS};
use chumsky::Parser;
use chumsky::input::ValueInput;
use chumsky::prelude::*;
pub use lower::{SourceMap, lower};

pub use chumsky::span::SimpleSpan;

type RichTokenError<'a> = Rich<'a, Token>;

pub fn datum_parser<'tokens, I>()
-> impl Parser<'tokens, I, DatumS, extra::Err<RichTokenError<'tokens>>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan> + 'tokens,
{
    recursive(|datum| {
        let atom = select! {
            Token::Int(i) => Datum::Int(i),
            Token::Symbol(s) => Datum::Symbol(s),
        }
        .labelled("atom");

        // 'd  ==>  (QUOTE d)
        let quoted = just(Token::Quote)
            .ignore_then(datum.clone())
            .map(|d: DatumS| Datum::Quote(Box::new(d)))
            .labelled("quoted datum");

        // ( d+ [. d] ) or ()
        let body = datum
            .clone()
            .repeated()
            .at_least(1)
            .collect::<Vec<DatumS>>()
            .then(just(Token::Dot).ignore_then(datum.clone()).or_not());
        let list = body
            .or_not()
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .map(|body| match body {
                Some((items, tail)) => Datum::List(items, tail.map(Box::new)),
                None => Datum::List(Vec::new(), None),
            })
            .labelled("list");

        choice((atom, quoted, list)).map_with(|node: Datum, e| {
            let s: I::Span = e.span();
            (node, s.into_range())
        })
    })
}

pub fn program_parser<'tokens, I>()
-> impl Parser<'tokens, I, Vec<DatumS>, extra::Err<RichTokenError<'tokens>>>
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan> + 'tokens,
{
    datum_parser()
        .repeated()
        .collect::<Vec<DatumS>>()
        .then_ignore(end())
        .boxed()
}
