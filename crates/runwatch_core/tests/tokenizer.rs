use pretty_assertions::assert_eq;
use runwatch_core::tokenizer::{process, ChunkTokenizer, Token};

#[test]
fn record_split_mid_number_is_joined() {
    let first = process("", r#"{"a":1"#);
    assert!(first.tokens.is_empty());
    assert_eq!(first.buffer, r#"{"a":1"#);

    let second = process(&first.buffer, "2}");
    assert_eq!(second.tokens, vec![Token::Record(r#"{"a":12}"#.to_string())]);
    assert_eq!(second.buffer, "");
}

#[test]
fn braces_inside_strings_do_not_close_early() {
    let out = process("", r#"{"title":"a } b { c","n":"\"}"}"#);
    assert_eq!(
        out.tokens,
        vec![Token::Record(r#"{"title":"a } b { c","n":"\"}"}"#.to_string())]
    );

    let mut tokenizer = ChunkTokenizer::new();
    assert!(tokenizer.push(r#"{"t":"{"#).is_empty());
    assert_eq!(
        tokenizer.push(r#""}"#),
        vec![Token::Record(r#"{"t":"{"}"#.to_string())]
    );
}

#[test]
fn free_text_around_records_becomes_lines() {
    let mut tokenizer = ChunkTokenizer::new();
    let tokens = tokenizer.push("[i] one\nbanner {\"event\":\"two:done\"} tail");
    assert_eq!(
        tokens,
        vec![
            Token::Line("[i] one".to_string()),
            Token::Line("banner".to_string()),
            Token::Record(r#"{"event":"two:done"}"#.to_string()),
        ]
    );
    assert_eq!(tokenizer.pending(), " tail");
    assert_eq!(tokenizer.finish(), vec![Token::Line("tail".to_string())]);
}

#[test]
fn unbalanced_record_at_end_of_stream_is_discarded() {
    let mut tokenizer = ChunkTokenizer::new();
    assert!(tokenizer.push(r#"{"event":"run:done","added":"#).is_empty());
    assert!(tokenizer.finish().is_empty());
    assert_eq!(tokenizer.pending(), "");
}
