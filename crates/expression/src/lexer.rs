//! Formula Tokenizer

use crate::ExpressionError;
use chrono::Duration;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Duration(Duration),
    /// `[name]`
    Reference(String),
    Ident(String),
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Not,
    Assign,
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {}", n),
            Token::Duration(d) => format!("duration {}s", d.num_seconds()),
            Token::Reference(name) => format!("reference [{}]", name),
            Token::Ident(name) => format!("identifier {}", name),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::Percent => "'%'".to_string(),
            Token::Caret => "'^'".to_string(),
            Token::Lt => "'<'".to_string(),
            Token::Le => "'<='".to_string(),
            Token::Gt => "'>'".to_string(),
            Token::Ge => "'>='".to_string(),
            Token::Eq => "'=='".to_string(),
            Token::Ne => "'!='".to_string(),
            Token::And => "AND".to_string(),
            Token::Or => "OR".to_string(),
            Token::Not => "NOT".to_string(),
            Token::Assign => "'='".to_string(),
        }
    }
}

/// Token plus its byte offset in the formula
pub(crate) type Spanned = (Token, usize);

pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>, ExpressionError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, ch) = chars[i];

        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        if ch.is_ascii_digit() || (ch == '.' && peek_digit(&chars, i + 1)) {
            let start = i;
            while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().map(|(_, c)| c).collect();
            let number: f64 = text
                .parse()
                .map_err(|_| ExpressionError::InvalidNumber(text.clone()))?;

            let unit_start = i;
            while i < chars.len() && chars[i].1.is_ascii_alphabetic() {
                i += 1;
            }
            if unit_start == i {
                tokens.push((Token::Number(number), pos));
            } else {
                let unit: String = chars[unit_start..i].iter().map(|(_, c)| c).collect();
                tokens.push((Token::Duration(duration(number, &unit)?), pos));
            }
            continue;
        }

        if ch == '[' {
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && chars[end].1 != ']' {
                end += 1;
            }
            if end >= chars.len() {
                return Err(ExpressionError::UnterminatedReference(pos));
            }
            let name: String = chars[start..end].iter().map(|(_, c)| c).collect();
            let name = name.trim();
            if name.is_empty() {
                return Err(ExpressionError::UnexpectedCharacter { ch: ']', position: chars[end].0 });
            }
            tokens.push((Token::Reference(name.to_string()), pos));
            i = end + 1;
            continue;
        }

        if ch.is_alphabetic() || ch == '_' {
            let start = i;
            while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().map(|(_, c)| c).collect();
            let token = match word.to_ascii_uppercase().as_str() {
                "AND" => Token::And,
                "OR" => Token::Or,
                "NOT" => Token::Not,
                _ => Token::Ident(word),
            };
            tokens.push((token, pos));
            continue;
        }

        let next = chars.get(i + 1).map(|(_, c)| *c);
        let (token, width) = match (ch, next) {
            ('<', Some('=')) => (Token::Le, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('=', Some('=')) => (Token::Eq, 2),
            ('!', Some('=')) => (Token::Ne, 2),
            ('<', Some('>')) => (Token::Ne, 2),
            ('&', Some('&')) => (Token::And, 2),
            ('|', Some('|')) => (Token::Or, 2),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('=', _) => (Token::Assign, 1),
            ('!', _) => (Token::Not, 1),
            ('&', _) => (Token::And, 1),
            ('|', _) => (Token::Or, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            (',', _) => (Token::Comma, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('^', _) => (Token::Caret, 1),
            _ => return Err(ExpressionError::UnexpectedCharacter { ch, position: pos }),
        };
        tokens.push((token, pos));
        i += width;
    }

    Ok(tokens)
}

fn peek_digit(chars: &[(usize, char)], i: usize) -> bool {
    chars.get(i).map(|(_, c)| c.is_ascii_digit()).unwrap_or(false)
}

fn duration(amount: f64, unit: &str) -> Result<Duration, ExpressionError> {
    let seconds_per_unit = match unit.to_ascii_lowercase().as_str() {
        "s" => 1.0,
        "m" | "min" => 60.0,
        "h" => 3600.0,
        "d" => 86_400.0,
        _ => return Err(ExpressionError::UnknownUnit(unit.to_string())),
    };
    let millis = (amount * seconds_per_unit * 1000.0).round();
    if millis >= i64::MAX as f64 {
        return Err(ExpressionError::InvalidNumber(format!("{}{}", amount, unit)));
    }
    Duration::try_milliseconds(millis as i64)
        .ok_or_else(|| ExpressionError::InvalidNumber(format!("{}{}", amount, unit)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_tokenize_comparison() {
        assert_eq!(
            kinds("[water flow] >= 10.5"),
            vec![
                Token::Reference("water flow".to_string()),
                Token::Ge,
                Token::Number(10.5),
            ]
        );
    }

    #[test]
    fn test_tokenize_keywords_and_symbols() {
        assert_eq!(
            kinds("a and b || !c"),
            vec![
                Token::Ident("a".to_string()),
                Token::And,
                Token::Ident("b".to_string()),
                Token::Or,
                Token::Not,
                Token::Ident("c".to_string()),
            ]
        );
    }

    #[test]
    fn test_tokenize_durations() {
        assert_eq!(kinds("90s"), vec![Token::Duration(Duration::seconds(90))]);
        assert_eq!(kinds("15min"), vec![Token::Duration(Duration::minutes(15))]);
        assert_eq!(kinds("1.5h"), vec![Token::Duration(Duration::minutes(90))]);
        assert!(matches!(tokenize("3weeks"), Err(ExpressionError::UnknownUnit(_))));
    }

    #[test]
    fn test_tokenize_caret_and_huge_duration() {
        assert_eq!(
            kinds("2 ^ 3"),
            vec![Token::Number(2.0), Token::Caret, Token::Number(3.0)]
        );
        assert!(matches!(
            tokenize("100000000000000000d"),
            Err(ExpressionError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_tokenize_errors() {
        assert!(matches!(
            tokenize("[flow > 3"),
            Err(ExpressionError::UnterminatedReference(0))
        ));
        assert!(matches!(
            tokenize("3 $ 4"),
            Err(ExpressionError::UnexpectedCharacter { ch: '$', position: 2 })
        ));
        assert!(matches!(tokenize("1.2.3"), Err(ExpressionError::InvalidNumber(_))));
    }
}
