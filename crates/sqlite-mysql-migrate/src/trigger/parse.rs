//! CREATE TRIGGER parsing.
//!
//! Splits the stored trigger text into header (timing, event, `UPDATE OF`
//! columns, `WHEN` condition) and body statements.

use crate::core::schema::{Trigger, TriggerEvent, TriggerTiming};
use crate::error::{MigrateError, Result};

use super::lexer::{find_top_level, span, tokenize, Token};

/// Parse a stored `CREATE TRIGGER` statement.
///
/// `name` and `table` come from the catalog and take precedence over the
/// names written in the statement.
pub fn parse_trigger(name: &str, table: &str, sql: &str) -> Result<Trigger> {
    let fail = |what: &str| {
        MigrateError::SchemaExtraction(format!("trigger {}: {}", name, what))
    };
    let toks = tokenize(sql);
    let mut cur = Cursor {
        sql,
        toks: &toks,
        pos: 0,
    };

    if !cur.eat("CREATE") {
        return Err(fail("not a CREATE TRIGGER statement"));
    }
    let _ = cur.eat("TEMP") || cur.eat("TEMPORARY");
    if !cur.eat("TRIGGER") {
        return Err(fail("not a CREATE TRIGGER statement"));
    }
    if cur.eat("IF") && !(cur.eat("NOT") && cur.eat("EXISTS")) {
        return Err(fail("malformed IF NOT EXISTS"));
    }
    cur.skip_qualified_name().ok_or_else(|| fail("missing trigger name"))?;

    let timing = if cur.eat("BEFORE") {
        TriggerTiming::Before
    } else if cur.eat("AFTER") {
        TriggerTiming::After
    } else if cur.eat("INSTEAD") {
        if !cur.eat("OF") {
            return Err(fail("malformed INSTEAD OF"));
        }
        TriggerTiming::InsteadOf
    } else {
        TriggerTiming::Before
    };

    let mut update_of = Vec::new();
    let event = if cur.eat("INSERT") {
        TriggerEvent::Insert
    } else if cur.eat("DELETE") {
        TriggerEvent::Delete
    } else if cur.eat("UPDATE") {
        if cur.eat("OF") {
            loop {
                let col = cur.next().ok_or_else(|| fail("truncated UPDATE OF list"))?;
                update_of.push(col.ident(sql));
                if !cur.eat_punct(',') {
                    break;
                }
            }
        }
        TriggerEvent::Update
    } else {
        return Err(fail("missing trigger event"));
    };

    if !cur.eat("ON") {
        return Err(fail("missing ON <table>"));
    }
    cur.skip_qualified_name().ok_or_else(|| fail("missing table name"))?;
    if cur.eat("FOR") && !(cur.eat("EACH") && cur.eat("ROW")) {
        return Err(fail("malformed FOR EACH ROW"));
    }

    let begin = find_top_level(sql, &toks, cur.pos, |t| t.is_word(sql, "BEGIN"))
        .ok_or_else(|| fail("missing BEGIN"))?;
    let when = if cur.eat("WHEN") {
        let cond = span(sql, &toks[cur.pos..begin]).trim();
        if cond.is_empty() {
            return Err(fail("empty WHEN clause"));
        }
        Some(cond.to_string())
    } else {
        None
    };
    if cur.pos != begin && when.is_none() {
        return Err(fail("unexpected text before BEGIN"));
    }

    let mut end = toks.len();
    while end > begin + 1 && toks[end - 1].is_punct(sql, ';') {
        end -= 1;
    }
    if end <= begin + 1 || !toks[end - 1].is_word(sql, "END") {
        return Err(fail("missing END"));
    }

    Ok(Trigger {
        name: name.to_string(),
        table: table.to_string(),
        timing,
        event,
        update_of,
        when,
        body: split_body(sql, &toks[begin + 1..end - 1]),
        sql: sql.to_string(),
    })
}

/// Split statements on `;` outside nested `CASE`/`BEGIN` … `END` blocks.
fn split_body(sql: &str, toks: &[Token]) -> Vec<String> {
    let mut statements = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, tok) in toks.iter().enumerate() {
        if tok.is_word(sql, "CASE") || tok.is_word(sql, "BEGIN") {
            depth += 1;
        } else if tok.is_word(sql, "END") {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && tok.is_punct(sql, ';') {
            push_statement(sql, &toks[start..i], &mut statements);
            start = i + 1;
        }
    }
    push_statement(sql, &toks[start..], &mut statements);
    statements
}

fn push_statement(sql: &str, toks: &[Token], out: &mut Vec<String>) {
    let text = span(sql, toks).trim();
    if !text.is_empty() {
        out.push(text.to_string());
    }
}

/// Split arbitrary SQL text into statements.
pub fn split_statements(sql: &str) -> Vec<String> {
    split_body(sql, &tokenize(sql))
}

struct Cursor<'a> {
    sql: &'a str,
    toks: &'a [Token],
    pos: usize,
}

impl Cursor<'_> {
    fn eat(&mut self, keyword: &str) -> bool {
        match self.toks.get(self.pos) {
            Some(tok) if tok.is_word(self.sql, keyword) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn eat_punct(&mut self, ch: char) -> bool {
        match self.toks.get(self.pos) {
            Some(tok) if tok.is_punct(self.sql, ch) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.toks.get(self.pos).copied()?;
        self.pos += 1;
        Some(tok)
    }

    /// Skip `name` or `schema.name`.
    fn skip_qualified_name(&mut self) -> Option<()> {
        self.next()?;
        if self.eat_punct('.') {
            self.next()?;
        }
        Some(())
    }
}
