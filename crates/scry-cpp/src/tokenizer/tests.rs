//! Tests for the core tokenizer, kept out of `mod.rs` so the scanner
//! itself stays readable.

use std::sync::Arc;

use super::{Lexer, TokenError};
use crate::token::{Keyword, Punct, TokenKind};

fn tokenize_kinds(text: &str) -> Result<Vec<TokenKind>, TokenError> {
    Ok(Lexer::tokenize(text, Arc::from("<test>"), 1)?
        .into_iter()
        .map(|t| t.kind)
        .collect())
}

#[test]
fn identifiers_and_keywords() {
    assert_eq!(
        tokenize_kinds("const Foo _bar2"),
        Ok(vec![
            TokenKind::Keyword(Keyword::Const),
            TokenKind::Identifier("Foo".to_string()),
            TokenKind::Identifier("_bar2".to_string()),
        ])
    );
}

#[test]
fn integer_literals() {
    assert_eq!(
        tokenize_kinds("42 0x1F 017 7UL"),
        Ok(vec![
            TokenKind::Integer(42),
            TokenKind::Integer(31),
            TokenKind::Integer(15),
            TokenKind::Integer(7),
        ])
    );
}

#[test]
fn real_literals() {
    assert_eq!(
        tokenize_kinds("1.5 2e3 .25f"),
        Ok(vec![
            TokenKind::Real(1.5),
            TokenKind::Real(2000.0),
            TokenKind::Real(0.25),
        ])
    );
}

#[test]
fn string_and_char_literals() {
    assert_eq!(
        tokenize_kinds(r#""hello\n" 'a' '\t'"#),
        Ok(vec![
            TokenKind::StringLit("hello\n".to_string()),
            TokenKind::CharLit('a'),
            TokenKind::CharLit('\t'),
        ])
    );
}

#[test]
fn maximal_munch_operators() {
    assert_eq!(
        tokenize_kinds("a::b->c <<= x"),
        Ok(vec![
            TokenKind::Identifier("a".to_string()),
            TokenKind::Punct(Punct::Scope),
            TokenKind::Identifier("b".to_string()),
            TokenKind::Punct(Punct::Arrow),
            TokenKind::Identifier("c".to_string()),
            TokenKind::Punct(Punct::Shl),
            TokenKind::Punct(Punct::Assign),
            TokenKind::Identifier("x".to_string()),
        ])
    );

    assert_eq!(
        tokenize_kinds("..."),
        Ok(vec![TokenKind::Punct(Punct::Ellipsis)])
    );
}

#[test]
fn template_angles_are_plain_punctuation_here() {
    // The tokenizer never guesses; `<` is always Lt. Disambiguation against
    // the scope model is the parser's job.
    assert_eq!(
        tokenize_kinds("Vector<int>"),
        Ok(vec![
            TokenKind::Identifier("Vector".to_string()),
            TokenKind::Punct(Punct::Lt),
            TokenKind::Keyword(Keyword::Int),
            TokenKind::Punct(Punct::Gt),
        ])
    );
}

#[test]
fn comments_are_skipped() {
    assert_eq!(
        tokenize_kinds("a // trailing\nb /* inline */ c"),
        Ok(vec![
            TokenKind::Identifier("a".to_string()),
            TokenKind::Identifier("b".to_string()),
            TokenKind::Identifier("c".to_string()),
        ])
    );
}

#[test]
fn unterminated_block_comment_is_fatal() {
    assert!(matches!(
        tokenize_kinds("a /* never closed"),
        Err(TokenError::UnterminatedComment(_))
    ));
}

#[test]
fn unterminated_string_is_fatal() {
    assert!(matches!(
        tokenize_kinds("\"runs off the end"),
        Err(TokenError::UnterminatedString(_))
    ));
}

#[test]
fn provenance_tracks_lines_and_columns() {
    let tokens = Lexer::tokenize("int\n  x;", Arc::from("foo.h"), 10).unwrap();
    assert_eq!(tokens[0].loc.line, 10);
    assert_eq!(tokens[0].loc.col, 1);
    assert_eq!(tokens[1].loc.line, 11);
    assert_eq!(tokens[1].loc.col, 3);
    assert_eq!(tokens[1].text, "x");
}

#[test]
fn true_and_false_are_integer_constants() {
    assert_eq!(
        tokenize_kinds("true false"),
        Ok(vec![TokenKind::Integer(1), TokenKind::Integer(0)])
    );
}
