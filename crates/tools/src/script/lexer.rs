//! Tokenizer for the script language.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),

    // keywords
    Async,
    Fn,
    Let,
    If,
    Else,
    While,
    For,
    In,
    Return,
    Break,
    Continue,
    Await,
    True,
    False,
    None,

    // punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semi,
    Dot,

    // operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    PlusAssign,
    MinusAssign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "identifier '{name}'"),
            TokenKind::Int(n) => write!(f, "integer {n}"),
            TokenKind::Float(x) => write!(f, "number {x}"),
            TokenKind::Str(_) => write!(f, "string literal"),
            TokenKind::Eof => write!(f, "end of script"),
            other => write!(f, "'{}'", symbol(other)),
        }
    }
}

fn symbol(kind: &TokenKind) -> &'static str {
    match kind {
        TokenKind::Async => "async",
        TokenKind::Fn => "fn",
        TokenKind::Let => "let",
        TokenKind::If => "if",
        TokenKind::Else => "else",
        TokenKind::While => "while",
        TokenKind::For => "for",
        TokenKind::In => "in",
        TokenKind::Return => "return",
        TokenKind::Break => "break",
        TokenKind::Continue => "continue",
        TokenKind::Await => "await",
        TokenKind::True => "true",
        TokenKind::False => "false",
        TokenKind::None => "None",
        TokenKind::LParen => "(",
        TokenKind::RParen => ")",
        TokenKind::LBrace => "{",
        TokenKind::RBrace => "}",
        TokenKind::LBracket => "[",
        TokenKind::RBracket => "]",
        TokenKind::Comma => ",",
        TokenKind::Colon => ":",
        TokenKind::Semi => ";",
        TokenKind::Dot => ".",
        TokenKind::Plus => "+",
        TokenKind::Minus => "-",
        TokenKind::Star => "*",
        TokenKind::Slash => "/",
        TokenKind::Percent => "%",
        TokenKind::Assign => "=",
        TokenKind::PlusAssign => "+=",
        TokenKind::MinusAssign => "-=",
        TokenKind::EqEq => "==",
        TokenKind::NotEq => "!=",
        TokenKind::Lt => "<",
        TokenKind::Le => "<=",
        TokenKind::Gt => ">",
        TokenKind::Ge => ">=",
        TokenKind::AndAnd => "&&",
        TokenKind::OrOr => "||",
        TokenKind::Bang => "!",
        TokenKind::Ident(_)
        | TokenKind::Int(_)
        | TokenKind::Float(_)
        | TokenKind::Str(_)
        | TokenKind::Eof => "",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

/// A lexing or parsing failure with its position.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("line {line}, column {column}: {message}")]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "async" => TokenKind::Async,
        "fn" | "def" => TokenKind::Fn,
        "let" => TokenKind::Let,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "in" => TokenKind::In,
        "return" => TokenKind::Return,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "await" => TokenKind::Await,
        "true" | "True" => TokenKind::True,
        "false" | "False" => TokenKind::False,
        "None" | "none" | "null" => TokenKind::None,
        "and" => TokenKind::AndAnd,
        "or" => TokenKind::OrOr,
        "not" => TokenKind::Bang,
        _ => return None,
    })
}

struct Lexer<'s> {
    chars: std::iter::Peekable<std::str::Chars<'s>>,
    line: usize,
    column: usize,
}

impl Lexer<'_> {
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, line: usize, column: usize, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            line,
            column,
            message: message.into(),
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '#' {
                self.skip_line();
            } else if c == '/' {
                let mut ahead = self.chars.clone();
                ahead.next();
                if ahead.next() == Some('/') {
                    self.skip_line();
                } else {
                    return;
                }
            } else {
                return;
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.bump() {
            if c == '\n' {
                break;
            }
        }
    }

    fn number(&mut self, line: usize, column: usize) -> Result<TokenKind, SyntaxError> {
        let mut text = String::new();
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                text.push(c);
                self.bump();
            } else if c == '.' && !is_float {
                // Only a decimal point if a digit follows; `1.max()` stays a method call.
                let mut ahead = self.chars.clone();
                ahead.next();
                if ahead.next().is_some_and(|d| d.is_ascii_digit()) {
                    is_float = true;
                    text.push('.');
                    self.bump();
                } else {
                    break;
                }
            } else {
                break;
            }
        }
        let digits: String = text.chars().filter(|c| *c != '_').collect();
        if is_float {
            digits
                .parse()
                .map(TokenKind::Float)
                .map_err(|_| self.error(line, column, format!("invalid number '{text}'")))
        } else {
            digits
                .parse()
                .map(TokenKind::Int)
                .map_err(|_| self.error(line, column, format!("integer '{text}' is too large")))
        }
    }

    fn string(&mut self, quote: char, line: usize, column: usize) -> Result<TokenKind, SyntaxError> {
        let mut value = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error(line, column, "unterminated string literal")),
                Some(c) if c == quote => return Ok(TokenKind::Str(value)),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some('\'') => '\'',
                        Some(other) => {
                            return Err(self.error(
                                self.line,
                                self.column,
                                format!("unknown escape '\\{other}'"),
                            ));
                        }
                        None => return Err(self.error(line, column, "unterminated string literal")),
                    };
                    value.push(escaped);
                }
                Some(c) => value.push(c),
            }
        }
    }

    fn operator(&mut self, c: char, line: usize, column: usize) -> Result<TokenKind, SyntaxError> {
        let next = self.peek();
        let (kind, two) = match (c, next) {
            ('=', Some('=')) => (TokenKind::EqEq, true),
            ('!', Some('=')) => (TokenKind::NotEq, true),
            ('<', Some('=')) => (TokenKind::Le, true),
            ('>', Some('=')) => (TokenKind::Ge, true),
            ('+', Some('=')) => (TokenKind::PlusAssign, true),
            ('-', Some('=')) => (TokenKind::MinusAssign, true),
            ('&', Some('&')) => (TokenKind::AndAnd, true),
            ('|', Some('|')) => (TokenKind::OrOr, true),
            ('=', _) => (TokenKind::Assign, false),
            ('!', _) => (TokenKind::Bang, false),
            ('<', _) => (TokenKind::Lt, false),
            ('>', _) => (TokenKind::Gt, false),
            ('+', _) => (TokenKind::Plus, false),
            ('-', _) => (TokenKind::Minus, false),
            ('*', _) => (TokenKind::Star, false),
            ('/', _) => (TokenKind::Slash, false),
            ('%', _) => (TokenKind::Percent, false),
            ('(', _) => (TokenKind::LParen, false),
            (')', _) => (TokenKind::RParen, false),
            ('{', _) => (TokenKind::LBrace, false),
            ('}', _) => (TokenKind::RBrace, false),
            ('[', _) => (TokenKind::LBracket, false),
            (']', _) => (TokenKind::RBracket, false),
            (',', _) => (TokenKind::Comma, false),
            (':', _) => (TokenKind::Colon, false),
            (';', _) => (TokenKind::Semi, false),
            ('.', _) => (TokenKind::Dot, false),
            _ => return Err(self.error(line, column, format!("unexpected character '{c}'"))),
        };
        if two {
            self.bump();
        }
        Ok(kind)
    }
}

/// Split `source` into tokens, ending with [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut lexer = Lexer {
        chars: source.chars().peekable(),
        line: 1,
        column: 1,
    };
    let mut tokens = Vec::new();

    loop {
        lexer.skip_trivia();
        let (line, column) = (lexer.line, lexer.column);
        let Some(c) = lexer.peek() else {
            tokens.push(Token {
                kind: TokenKind::Eof,
                line,
                column,
            });
            return Ok(tokens);
        };

        let kind = if c.is_ascii_digit() {
            lexer.number(line, column)?
        } else if c.is_alphabetic() || c == '_' {
            let mut word = String::new();
            while let Some(c) = lexer.peek() {
                if c.is_alphanumeric() || c == '_' {
                    word.push(c);
                    lexer.bump();
                } else {
                    break;
                }
            }
            keyword(&word).unwrap_or(TokenKind::Ident(word))
        } else if c == '"' || c == '\'' {
            lexer.bump();
            lexer.string(c, line, column)?
        } else {
            lexer.bump();
            lexer.operator(c, line, column)?
        };

        tokens.push(Token { kind, line, column });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_function_header() {
        assert_eq!(
            kinds("async fn main(env) {}"),
            vec![
                TokenKind::Async,
                TokenKind::Fn,
                TokenKind::Ident("main".into()),
                TokenKind::LParen,
                TokenKind::Ident("env".into()),
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numbers_strings_and_operators() {
        assert_eq!(
            kinds("x += 1_000 * 2.5 != 'a\\'b'"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::PlusAssign,
                TokenKind::Int(1000),
                TokenKind::Star,
                TokenKind::Float(2.5),
                TokenKind::NotEq,
                TokenKind::Str("a'b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("// leading\nlet # trailing\n"),
            vec![TokenKind::Let, TokenKind::Eof]
        );
    }

    #[test]
    fn word_operators_alias_symbols() {
        assert_eq!(
            kinds("not a and b or True"),
            vec![
                TokenKind::Bang,
                TokenKind::Ident("a".into()),
                TokenKind::AndAnd,
                TokenKind::Ident("b".into()),
                TokenKind::OrOr,
                TokenKind::True,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_string_reports_position() {
        let err = tokenize("let s = \"oops").unwrap_err();
        assert_eq!((err.line, err.column), (1, 9));
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn stray_character_is_rejected() {
        let err = tokenize("let a = 1 @ 2;").unwrap_err();
        assert!(err.message.contains("'@'"));
    }
}
