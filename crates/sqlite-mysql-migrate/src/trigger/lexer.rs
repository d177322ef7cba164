//! Minimal SQL tokenizer shared by the trigger parser and statement rewriters.
//!
//! Tokens carry byte spans into the original text so rewriters can copy the
//! untouched parts (whitespace, comments) verbatim.

use crate::core::identifier::quote_mysql;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Word,
    Number,
    /// Single-quoted string literal.
    String,
    /// `"ident"`, `` `ident` `` or `[ident]`.
    QuotedIdent,
    Punct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn text<'a>(&self, sql: &'a str) -> &'a str {
        &sql[self.start..self.end]
    }

    pub fn is_word(&self, sql: &str, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text(sql).eq_ignore_ascii_case(keyword)
    }

    pub fn is_punct(&self, sql: &str, ch: char) -> bool {
        self.kind == TokenKind::Punct && self.text(sql).starts_with(ch)
    }

    /// Identifier value of a word or quoted identifier.
    pub fn ident(&self, sql: &str) -> String {
        unquote(self.text(sql))
    }
}

/// Split SQL text into tokens, skipping whitespace and comments.
pub(crate) fn tokenize(sql: &str) -> Vec<Token> {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < len {
        let b = bytes[i];
        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if b == b'-' && bytes.get(i + 1) == Some(&b'-') {
            while i < len && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        if b == b'/' && bytes.get(i + 1) == Some(&b'*') {
            i += 2;
            while i < len && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                i += 1;
            }
            i = (i + 2).min(len);
            continue;
        }

        let start = i;
        let kind = match b {
            b'\'' => {
                i = scan_quoted(bytes, i, b'\'');
                TokenKind::String
            }
            b'"' | b'`' => {
                i = scan_quoted(bytes, i, b);
                TokenKind::QuotedIdent
            }
            b'[' => {
                while i < len && bytes[i] != b']' {
                    i += 1;
                }
                i = (i + 1).min(len);
                TokenKind::QuotedIdent
            }
            b'0'..=b'9' => {
                while i < len && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.') {
                    i += 1;
                }
                TokenKind::Number
            }
            _ if is_word_byte(b) => {
                while i < len && (is_word_byte(bytes[i]) || bytes[i].is_ascii_digit()) {
                    i += 1;
                }
                TokenKind::Word
            }
            _ => {
                i += 1;
                TokenKind::Punct
            }
        };
        tokens.push(Token {
            kind,
            start,
            end: i,
        });
    }
    tokens
}

fn is_word_byte(b: u8) -> bool {
    b == b'_' || b == b'$' || b.is_ascii_alphabetic() || b >= 0x80
}

fn scan_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// Strip identifier or string quoting, collapsing doubled quote characters.
pub(crate) fn unquote(text: &str) -> String {
    let Some(first) = text.chars().next() else {
        return String::new();
    };
    let close = match first {
        '"' => '"',
        '`' => '`',
        '\'' => '\'',
        '[' => ']',
        _ => return text.to_string(),
    };
    let inner = text[1..].strip_suffix(close).unwrap_or(&text[1..]);
    if close == ']' {
        return inner.to_string();
    }
    let doubled: String = [close, close].iter().collect();
    inner.replace(&doubled, &close.to_string())
}

/// Index of the `)` matching the `(` at `open`.
pub(crate) fn matching_paren(sql: &str, tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, tok) in tokens.iter().enumerate().skip(open) {
        if tok.is_punct(sql, '(') {
            depth += 1;
        } else if tok.is_punct(sql, ')') {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Index of the first token satisfying `pred` outside parentheses.
pub(crate) fn find_top_level(
    sql: &str,
    tokens: &[Token],
    from: usize,
    pred: impl Fn(&Token) -> bool,
) -> Option<usize> {
    let mut depth = 0i32;
    for (i, tok) in tokens.iter().enumerate().skip(from) {
        if tok.is_punct(sql, '(') {
            depth += 1;
        } else if tok.is_punct(sql, ')') {
            depth -= 1;
        } else if depth == 0 && pred(tok) {
            return Some(i);
        }
    }
    None
}

/// Split a token range on top-level commas.
pub(crate) fn split_top_level_commas<'t>(sql: &str, tokens: &'t [Token]) -> Vec<&'t [Token]> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, tok) in tokens.iter().enumerate() {
        if tok.is_punct(sql, '(') {
            depth += 1;
        } else if tok.is_punct(sql, ')') {
            depth -= 1;
        } else if depth == 0 && tok.is_punct(sql, ',') {
            parts.push(&tokens[start..i]);
            start = i + 1;
        }
    }
    parts.push(&tokens[start..]);
    parts
}

/// Source text spanned by a token range.
pub(crate) fn span<'a>(sql: &'a str, tokens: &[Token]) -> &'a str {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => &sql[first.start..last.end],
        _ => "",
    }
}

/// Rewrite double-quoted and bracketed identifiers to backticks, copying
/// everything else verbatim.
pub(crate) fn backtick_identifiers(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut last = 0;
    for tok in tokenize(sql) {
        if tok.kind == TokenKind::QuotedIdent && !tok.text(sql).starts_with('`') {
            out.push_str(&sql[last..tok.start]);
            out.push_str(&quote_mysql(&tok.ident(sql)));
            last = tok.end;
        }
    }
    out.push_str(&sql[last..]);
    out
}
