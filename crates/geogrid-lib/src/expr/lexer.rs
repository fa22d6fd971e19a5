use crate::error::{Error, Result};

use super::RasterStat;

/// Token of the cost-expression language.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Ident(String),
    /// `field:NAME` reference into the per-edge attribute map.
    Field(String),
    /// `raster[N]:stat` aggregate over samples along the edge.
    Raster { raster: usize, stat: RasterStat },
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Lt,
    Gt,
    Eq,
    Ne,
    LParen,
    RParen,
    Comma,
}

/// A token paired with its byte offset in the source text.
pub(crate) type Spanned = (Token, usize);

fn syntax(message: impl Into<String>, offset: usize) -> Error {
    Error::Syntax {
        message: message.into(),
        offset,
    }
}

pub(crate) fn tokenize(text: &str) -> Result<Vec<Spanned>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let c = bytes[pos] as char;
        match c {
            ' ' | '\t' | '\r' | '\n' => pos += 1,
            '+' => {
                tokens.push((Token::Plus, pos));
                pos += 1;
            }
            '-' => {
                tokens.push((Token::Minus, pos));
                pos += 1;
            }
            '*' => {
                tokens.push((Token::Star, pos));
                pos += 1;
            }
            '/' => {
                tokens.push((Token::Slash, pos));
                pos += 1;
            }
            '^' => {
                tokens.push((Token::Caret, pos));
                pos += 1;
            }
            '<' => {
                tokens.push((Token::Lt, pos));
                pos += 1;
            }
            '>' => {
                tokens.push((Token::Gt, pos));
                pos += 1;
            }
            '(' => {
                tokens.push((Token::LParen, pos));
                pos += 1;
            }
            ')' => {
                tokens.push((Token::RParen, pos));
                pos += 1;
            }
            ',' => {
                tokens.push((Token::Comma, pos));
                pos += 1;
            }
            '=' => {
                // accept both `=` and `==`
                pos += 1;
                if pos < bytes.len() && bytes[pos] == b'=' {
                    pos += 1;
                }
                tokens.push((Token::Eq, pos - 1));
            }
            '!' => {
                if pos + 1 < bytes.len() && bytes[pos + 1] == b'=' {
                    tokens.push((Token::Ne, pos));
                    pos += 2;
                } else {
                    return Err(syntax("expected '=' after '!'", pos));
                }
            }
            '0'..='9' | '.' => {
                let start = pos;
                while pos < bytes.len() && matches!(bytes[pos] as char, '0'..='9' | '.') {
                    pos += 1;
                }
                // optional exponent
                if pos < bytes.len() && matches!(bytes[pos] as char, 'e' | 'E') {
                    let mut lookahead = pos + 1;
                    if lookahead < bytes.len() && matches!(bytes[lookahead] as char, '+' | '-') {
                        lookahead += 1;
                    }
                    if lookahead < bytes.len() && (bytes[lookahead] as char).is_ascii_digit() {
                        pos = lookahead;
                        while pos < bytes.len() && (bytes[pos] as char).is_ascii_digit() {
                            pos += 1;
                        }
                    }
                }
                let raw = &text[start..pos];
                let value = raw
                    .parse::<f64>()
                    .map_err(|_| syntax(format!("invalid number '{raw}'"), start))?;
                tokens.push((Token::Number(value), start));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = pos;
                while pos < bytes.len()
                    && matches!(bytes[pos] as char, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_')
                {
                    pos += 1;
                }
                let ident = &text[start..pos];

                if ident == "field" && pos < bytes.len() && bytes[pos] == b':' {
                    pos += 1;
                    let name_start = pos;
                    while pos < bytes.len()
                        && matches!(bytes[pos] as char, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_')
                    {
                        pos += 1;
                    }
                    if pos == name_start {
                        return Err(syntax("expected field name after 'field:'", pos));
                    }
                    tokens.push((Token::Field(text[name_start..pos].to_string()), start));
                } else if ident == "raster" && pos < bytes.len() && bytes[pos] == b'[' {
                    let (token, next) = lex_raster(text, pos)?;
                    tokens.push((token, start));
                    pos = next;
                } else {
                    tokens.push((Token::Ident(ident.to_string()), start));
                }
            }
            other => return Err(syntax(format!("unknown character '{other}'"), pos)),
        }
    }

    Ok(tokens)
}

/// Lex `raster[N]:stat` starting at the `[` following the `raster` keyword.
fn lex_raster(text: &str, mut pos: usize) -> Result<(Token, usize)> {
    let bytes = text.as_bytes();
    pos += 1; // '['
    let index_start = pos;
    while pos < bytes.len() && (bytes[pos] as char).is_ascii_digit() {
        pos += 1;
    }
    if pos == index_start {
        return Err(syntax("expected raster index after 'raster['", pos));
    }
    let raster = text[index_start..pos]
        .parse::<usize>()
        .map_err(|_| syntax("invalid raster index", index_start))?;

    if pos >= bytes.len() || bytes[pos] != b']' {
        return Err(syntax("expected ']' after raster index", pos));
    }
    pos += 1;
    if pos >= bytes.len() || bytes[pos] != b':' {
        return Err(syntax("expected ':' after raster reference", pos));
    }
    pos += 1;

    let stat_start = pos;
    while pos < bytes.len() && matches!(bytes[pos] as char, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_')
    {
        pos += 1;
    }
    let stat_name = &text[stat_start..pos];
    let stat = RasterStat::from_name(stat_name).ok_or_else(|| {
        syntax(
            format!("unknown raster statistic '{stat_name}'"),
            stat_start,
        )
    })?;

    Ok((Token::Raster { raster, stat }, pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_arithmetic() {
        let tokens = tokenize("1 + 2.5 * (3 - 4)").unwrap();
        let kinds: Vec<Token> = tokens.into_iter().map(|(t, _)| t).collect();
        assert_eq!(
            kinds,
            vec![
                Token::Number(1.0),
                Token::Plus,
                Token::Number(2.5),
                Token::Star,
                Token::LParen,
                Token::Number(3.0),
                Token::Minus,
                Token::Number(4.0),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn tokenizes_field_and_raster_refs() {
        let tokens = tokenize("field:length + raster[0]:mean").unwrap();
        assert_eq!(tokens[0].0, Token::Field("length".to_string()));
        assert_eq!(
            tokens[2].0,
            Token::Raster {
                raster: 0,
                stat: RasterStat::Mean
            }
        );
    }

    #[test]
    fn rejects_unknown_character() {
        let err = tokenize("1 # 2").expect_err("bad char");
        assert!(matches!(err, Error::Syntax { .. }));
    }

    #[test]
    fn rejects_unknown_raster_statistic() {
        let err = tokenize("raster[0]:wibble").expect_err("bad stat");
        assert!(format!("{err}").contains("wibble"));
    }

    #[test]
    fn accepts_double_equals() {
        let tokens = tokenize("1 == 2").unwrap();
        assert_eq!(tokens[1].0, Token::Eq);
    }
}
