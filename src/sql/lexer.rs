//! # WHERE Clause Tokenizer
//!
//! Splits a WHERE clause into tokens. Quotes pair (single with single,
//! double with double) and quoted contents may contain anything, including
//! spaces and parentheses. Unquoted text splits on whitespace; parentheses
//! are their own tokens.

/// One token of a WHERE clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Unquoted word: identifier, operator, keyword, or bare literal.
    Word(String),
    /// Quoted literal with the quotes stripped.
    Str(String),
    LParen,
    RParen,
}

impl Token {
    /// Literal text of the token for use as a comparison operand.
    pub fn literal(&self) -> Option<&str> {
        match self {
            Token::Word(w) => Some(w),
            Token::Str(s) => Some(s),
            _ => None,
        }
    }

    /// True when the token is the given keyword, case-insensitively. Quoted
    /// tokens never match keywords.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

/// Tokenizes `input` according to the quoting rules above. An unterminated
/// quote runs to the end of input, matching the permissive behavior of the
/// value parsers elsewhere in this crate.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    let flush = |current: &mut String, tokens: &mut Vec<Token>| {
        if !current.is_empty() {
            tokens.push(Token::Word(std::mem::take(current)));
        }
    };

    for ch in input.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    tokens.push(Token::Str(std::mem::take(&mut current)));
                    quote = None;
                } else {
                    current.push(ch);
                }
            }
            None => match ch {
                '\'' | '"' => {
                    flush(&mut current, &mut tokens);
                    quote = Some(ch);
                }
                '(' => {
                    flush(&mut current, &mut tokens);
                    tokens.push(Token::LParen);
                }
                ')' => {
                    flush(&mut current, &mut tokens);
                    tokens.push(Token::RParen);
                }
                c if c.is_whitespace() => flush(&mut current, &mut tokens),
                c => current.push(c),
            },
        }
    }

    if quote.is_some() {
        tokens.push(Token::Str(current));
    } else if !current.is_empty() {
        tokens.push(Token::Word(current));
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(input: &str) -> Vec<Token> {
        tokenize(input)
    }

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(
            words("name = alice"),
            vec![
                Token::Word("name".to_string()),
                Token::Word("=".to_string()),
                Token::Word("alice".to_string()),
            ]
        );
    }

    #[test]
    fn quoted_strings_keep_spaces() {
        assert_eq!(
            words("name = 'alice smith'"),
            vec![
                Token::Word("name".to_string()),
                Token::Word("=".to_string()),
                Token::Str("alice smith".to_string()),
            ]
        );
    }

    #[test]
    fn double_quotes_pair_with_double() {
        assert_eq!(
            words(r#"name = "it's fine""#),
            vec![
                Token::Word("name".to_string()),
                Token::Word("=".to_string()),
                Token::Str("it's fine".to_string()),
            ]
        );
    }

    #[test]
    fn parens_are_own_tokens() {
        assert_eq!(
            words("(a = 1)"),
            vec![
                Token::LParen,
                Token::Word("a".to_string()),
                Token::Word("=".to_string()),
                Token::Word("1".to_string()),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn parens_inside_quotes_are_literal() {
        assert_eq!(
            words("note = '(draft)'"),
            vec![
                Token::Word("note".to_string()),
                Token::Word("=".to_string()),
                Token::Str("(draft)".to_string()),
            ]
        );
    }

    #[test]
    fn empty_quoted_string_is_a_token() {
        assert_eq!(
            words("name = ''"),
            vec![
                Token::Word("name".to_string()),
                Token::Word("=".to_string()),
                Token::Str(String::new()),
            ]
        );
    }
}
