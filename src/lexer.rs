//! Lexical analysis for C5.
//!
//! A stateless function from source text + filename to a token stream.
//! Recognises `//` line comments and non-nesting `/* */` block comments,
//! folds escape sequences in character and string literals, and treats `<`
//! and `>` as plain punctuation - the parser reassembles `int < 32 >`
//! contextually, since the lexer has no notion of "type" at all.

use crate::ast::SourceLocation;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    IntLiteral,
    FloatLiteral,
    CharLiteral,
    StringLiteral,
    Keyword,
    Punct,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub location: SourceLocation,
}

impl Token {
    pub fn is(&self, lexeme: &str) -> bool {
        self.lexeme == lexeme
    }
}

const KEYWORDS: &[&str] = &[
    "if", "else", "while", "do", "for", "foreach", "return", "struct", "enum", "type", "let",
    "const", "macro", "include", "signed", "unsigned", "fnct", "in",
];

/// Multi-character punctuation, longest first so the scanner is greedy.
const MULTI_PUNCT: &[&str] = &[
    "::", "->", "==", "!=", "<=", ">=", "&&", "||", "<<", ">>", "++", "+=", "-=", "*=", "/=", "%=",
];

const SINGLE_PUNCT: &str = "{}()[],;:.<>+-*/%=!&|^~";

pub struct LexError {
    pub location: SourceLocation,
    pub message: String,
}

pub fn tokenize(source: &str, file: &Path) -> Result<Vec<Token>, LexError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0usize;
    let mut line = 0usize;
    let mut col = 0usize;

    let loc = |line: usize, col: usize, offset: usize, len: usize| {
        SourceLocation::new(file.to_path_buf(), line, col, offset, len)
    };

    macro_rules! advance {
        () => {{
            let c = bytes[pos] as char;
            pos += 1;
            if c == '\n' {
                line += 1;
                col = 0;
            } else {
                col += 1;
            }
            c
        }};
    }

    while pos < bytes.len() {
        let start_offset = pos;
        let start_line = line;
        let start_col = col;
        let c = bytes[pos] as char;

        if c.is_whitespace() {
            advance!();
            continue;
        }

        // Line comment
        if c == '/' && pos + 1 < bytes.len() && bytes[pos + 1] as char == '/' {
            while pos < bytes.len() && bytes[pos] as char != '\n' {
                advance!();
            }
            continue;
        }

        // Block comment (non-nesting)
        if c == '/' && pos + 1 < bytes.len() && bytes[pos + 1] as char == '*' {
            advance!();
            advance!();
            let mut closed = false;
            while pos < bytes.len() {
                if bytes[pos] as char == '*' && pos + 1 < bytes.len() && bytes[pos + 1] as char == '/'
                {
                    advance!();
                    advance!();
                    closed = true;
                    break;
                }
                advance!();
            }
            if !closed {
                return Err(LexError {
                    location: loc(start_line, start_col, start_offset, pos - start_offset),
                    message: "unterminated block comment".to_string(),
                });
            }
            continue;
        }

        // Identifier or keyword
        if c.is_alphabetic() || c == '_' {
            let mut lexeme = String::new();
            while pos < bytes.len() {
                let ch = bytes[pos] as char;
                if ch.is_alphanumeric() || ch == '_' {
                    lexeme.push(advance!());
                } else {
                    break;
                }
            }
            let kind = if KEYWORDS.contains(&lexeme.as_str()) {
                TokenKind::Keyword
            } else {
                TokenKind::Ident
            };
            tokens.push(Token {
                kind,
                lexeme,
                location: loc(start_line, start_col, start_offset, pos - start_offset),
            });
            continue;
        }

        // Numeric literal
        if c.is_ascii_digit() {
            let mut lexeme = String::new();
            let mut is_float = false;
            while pos < bytes.len() {
                let ch = bytes[pos] as char;
                if ch.is_ascii_digit() {
                    lexeme.push(advance!());
                } else if ch == '.' && !is_float && pos + 1 < bytes.len() && (bytes[pos + 1] as char).is_ascii_digit() {
                    is_float = true;
                    lexeme.push(advance!());
                } else {
                    break;
                }
            }
            tokens.push(Token {
                kind: if is_float {
                    TokenKind::FloatLiteral
                } else {
                    TokenKind::IntLiteral
                },
                lexeme,
                location: loc(start_line, start_col, start_offset, pos - start_offset),
            });
            continue;
        }

        // Character literal
        if c == '\'' {
            advance!();
            let value = match read_escaped_byte(bytes, &mut pos, &mut line, &mut col) {
                Some(v) => v,
                None => {
                    return Err(LexError {
                        location: loc(start_line, start_col, start_offset, pos - start_offset),
                        message: "unterminated character literal".to_string(),
                    });
                }
            };
            if pos >= bytes.len() || bytes[pos] as char != '\'' {
                return Err(LexError {
                    location: loc(start_line, start_col, start_offset, pos - start_offset),
                    message: "unterminated character literal".to_string(),
                });
            }
            advance!();
            tokens.push(Token {
                kind: TokenKind::CharLiteral,
                lexeme: (value as char).to_string(),
                location: loc(start_line, start_col, start_offset, pos - start_offset),
            });
            continue;
        }

        // String literal
        if c == '"' {
            advance!();
            let mut value = String::new();
            let mut closed = false;
            while pos < bytes.len() {
                if bytes[pos] as char == '"' {
                    advance!();
                    closed = true;
                    break;
                }
                match read_escaped_byte(bytes, &mut pos, &mut line, &mut col) {
                    Some(b) => value.push(b as char),
                    None => break,
                }
            }
            if !closed {
                return Err(LexError {
                    location: loc(start_line, start_col, start_offset, pos - start_offset),
                    message: "unterminated string literal".to_string(),
                });
            }
            tokens.push(Token {
                kind: TokenKind::StringLiteral,
                lexeme: value,
                location: loc(start_line, start_col, start_offset, pos - start_offset),
            });
            continue;
        }

        // Multi-character punctuation
        let rest = &source[start_offset..];
        if let Some(&punct) = MULTI_PUNCT.iter().find(|p| rest.starts_with(*p)) {
            for _ in 0..punct.len() {
                advance!();
            }
            tokens.push(Token {
                kind: TokenKind::Punct,
                lexeme: punct.to_string(),
                location: loc(start_line, start_col, start_offset, pos - start_offset),
            });
            continue;
        }

        // Single-character punctuation
        if SINGLE_PUNCT.contains(c) {
            advance!();
            tokens.push(Token {
                kind: TokenKind::Punct,
                lexeme: c.to_string(),
                location: loc(start_line, start_col, start_offset, pos - start_offset),
            });
            continue;
        }

        return Err(LexError {
            location: loc(start_line, start_col, start_offset, 1),
            message: format!("unknown character '{}'", c),
        });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        lexeme: String::new(),
        location: loc(line, col, pos, 0),
    });

    Ok(tokens)
}

/// Reads one (possibly escaped) byte from a char/string literal body.
/// Returns `None` if the input ends before a full escape sequence does.
fn read_escaped_byte(
    bytes: &[u8],
    pos: &mut usize,
    line: &mut usize,
    col: &mut usize,
) -> Option<u8> {
    if *pos >= bytes.len() {
        return None;
    }
    let c = bytes[*pos] as char;
    let advance_one = |pos: &mut usize, line: &mut usize, col: &mut usize| -> char {
        let c = bytes[*pos] as char;
        *pos += 1;
        if c == '\n' {
            *line += 1;
            *col = 0;
        } else {
            *col += 1;
        }
        c
    };

    if c == '\\' {
        advance_one(pos, line, col);
        if *pos >= bytes.len() {
            return None;
        }
        let esc = advance_one(pos, line, col);
        Some(match esc {
            'n' => b'\n',
            't' => b'\t',
            'r' => b'\r',
            '\\' => b'\\',
            '\'' => b'\'',
            '"' => b'"',
            '0' => 0,
            other => other as u8,
        })
    } else {
        Some(advance_one(pos, line, col) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn lex(src: &str) -> Vec<Token> {
        tokenize(src, &PathBuf::from("t.c5")).unwrap_or_else(|e| panic!("{}", e.message))
    }

    #[test]
    fn tokens_cover_contiguous_source() {
        let src = "let int<32> x = 5;";
        let tokens = lex(src);
        // Skip the trailing EOF token; it carries zero length by design.
        for pair in tokens.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if b.kind == TokenKind::Eof {
                continue;
            }
            assert_eq!(
                a.location.offset + a.location.len,
                b.location.offset,
                "gap between {:?} and {:?}",
                a,
                b
            );
        }
    }

    #[test]
    fn keywords_recognised() {
        let tokens = lex("while foreach in");
        assert!(tokens.iter().all(|t| t.kind == TokenKind::Eof || t.kind == TokenKind::Keyword));
    }

    #[test]
    fn angle_brackets_are_plain_punctuation() {
        let tokens = lex("int<32>");
        let kinds: Vec<_> = tokens.iter().map(|t| t.lexeme.clone()).collect();
        assert_eq!(kinds, vec!["int", "<", "32", ">", ""]);
    }

    #[test]
    fn string_escape_sequences_fold() {
        let tokens = lex("\"a\\nb\"");
        assert_eq!(tokens[0].lexeme, "a\nb");
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = tokenize("\"abc", &PathBuf::from("t.c5")).unwrap_err();
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn unknown_character_is_an_error() {
        let err = tokenize("@", &PathBuf::from("t.c5")).unwrap_err();
        assert!(err.message.contains("unknown character"));
    }
}
