//! Statement-shape rewrite rules for trigger bodies.
//!
//! Each rule recognizes one statement shape and either returns the MySQL
//! spelling or the reason the shape has no equivalent.

use crate::core::identifier::quote_mysql;

use super::lexer::{
    find_top_level, matching_paren, span, split_top_level_commas, tokenize, Token, TokenKind,
};

pub(crate) type RuleResult = std::result::Result<String, String>;

const OWN_TABLE: &str = "MySQL rejects trigger statements that modify the triggering table";
const ROWID_NAMES: [&str; 3] = ["rowid", "oid", "_rowid_"];

/// The row a trigger fires for.
pub(crate) struct RowContext<'a> {
    pub table: &'a str,
    pub columns: &'a [String],
    pub key: &'a [String],
}

/// Rewrite one body statement.
pub(crate) fn rewrite_statement(ctx: &RowContext<'_>, sql: &str) -> RuleResult {
    let toks = tokenize(sql);
    let Some(first) = toks.first() else {
        return Err("empty statement".to_string());
    };
    let on_conflict = toks
        .windows(2)
        .any(|w| w[0].is_word(sql, "ON") && w[1].is_word(sql, "CONFLICT"));
    if on_conflict {
        return Err("ON CONFLICT clauses have no MySQL equivalent".to_string());
    }

    match first.text(sql).to_ascii_uppercase().as_str() {
        "SELECT" => rewrite_raise(sql, &toks),
        "INSERT" | "REPLACE" => rewrite_insert(ctx, sql, &toks),
        "UPDATE" => rewrite_update(ctx, sql, &toks),
        "DELETE" => rewrite_delete(ctx, sql, &toks),
        "WITH" => Err("common table expressions are not allowed in MySQL triggers".to_string()),
        other => Err(format!("{} statements have no MySQL trigger equivalent", other)),
    }
}

/// Rewrite an expression, translating functions, quoting and operators.
///
/// With `qualify`, bare references to those columns become `NEW.col`.
pub(crate) fn rewrite_expression(
    sql: &str,
    toks: &[Token],
    qualify: Option<&[String]>,
) -> RuleResult {
    let mut out = String::with_capacity(span(sql, toks).len());
    let mut last_end: Option<usize> = None;
    let mut i = 0;

    while i < toks.len() {
        let tok = toks[i];
        if let Some(end) = last_end {
            out.push_str(&sql[end..tok.start]);
        }
        let text = tok.text(sql);
        let next = toks.get(i + 1);
        let calls = next.map_or(false, |n| n.is_punct(sql, '('));

        match tok.kind {
            TokenKind::Punct
                if text == "|" && next.map_or(false, |n| n.start == tok.end && n.is_punct(sql, '|')) =>
            {
                return Err("`||` concatenation means logical OR in MySQL".to_string());
            }
            TokenKind::Word if calls => {
                let close = matching_paren(sql, toks, i + 1)
                    .ok_or_else(|| "unbalanced parentheses".to_string())?;
                if tok.is_word(sql, "RAISE") {
                    return Err("RAISE() is only translatable as a SELECT statement".to_string());
                }
                if let Some(replacement) = time_function(sql, &tok, &toks[i + 2..close])? {
                    out.push_str(replacement);
                    last_end = Some(toks[close].end);
                    i = close + 1;
                    continue;
                }
                out.push_str(text);
            }
            TokenKind::Word if tok.is_word(sql, "GLOB") => {
                return Err("GLOB has no MySQL equivalent".to_string());
            }
            TokenKind::Word | TokenKind::QuotedIdent => {
                let ident = tok.ident(sql);
                let prev_dot = i > 0 && toks[i - 1].is_punct(sql, '.');
                let next_dot = next.map_or(false, |n| n.is_punct(sql, '.'));
                let column = qualify.and_then(|cols| {
                    cols.iter().find(|c| c.eq_ignore_ascii_case(&ident))
                });
                match column {
                    Some(col) if !prev_dot && !next_dot && !calls => {
                        out.push_str("NEW.");
                        out.push_str(&quote_mysql(col));
                    }
                    _ if tok.kind == TokenKind::QuotedIdent => out.push_str(&quote_mysql(&ident)),
                    _ => out.push_str(text),
                }
            }
            _ => out.push_str(text),
        }
        last_end = Some(tok.end);
        i += 1;
    }
    Ok(out)
}

/// MySQL spelling of a date/time function call, when it needs one.
fn time_function(sql: &str, name: &Token, args: &[Token]) -> std::result::Result<Option<&'static str>, String> {
    let func = name.text(sql).to_ascii_lowercase();
    if !matches!(
        func.as_str(),
        "datetime" | "date" | "time" | "strftime" | "julianday" | "unixepoch"
    ) {
        return Ok(None);
    }

    let literals: Option<Vec<String>> = if args.is_empty() {
        Some(Vec::new())
    } else {
        split_top_level_commas(sql, args)
            .into_iter()
            .map(|part| match part {
                [tok] if tok.kind == TokenKind::String => Some(tok.ident(sql).to_ascii_lowercase()),
                _ => None,
            })
            .collect()
    };
    let Some(mut literals) = literals else {
        // MySQL's DATE() and TIME() accept arbitrary expressions
        return match func.as_str() {
            "date" | "time" => Ok(None),
            _ => Err(format!("{}() has no MySQL equivalent", func)),
        };
    };
    if literals.is_empty() && matches!(func.as_str(), "datetime" | "date" | "time") {
        literals.push("now".to_string());
    }
    if literals.last().map_or(false, |m| m == "localtime" || m == "utc") {
        literals.pop();
    }

    let lits: Vec<&str> = literals.iter().map(String::as_str).collect();
    let replacement = match (func.as_str(), lits.as_slice()) {
        ("datetime", ["now"]) => "NOW()",
        ("strftime", ["%Y-%m-%d %H:%M:%S", "now"]) => "NOW()",
        ("date", ["now"]) => "CURDATE()",
        ("time", ["now"]) => "CURTIME()",
        ("strftime", ["%s", "now"]) | ("unixepoch", []) | ("unixepoch", ["now"]) => {
            "UNIX_TIMESTAMP()"
        }
        _ => {
            return Err(format!(
                "{}({}) has no MySQL equivalent",
                func,
                span(sql, args)
            ))
        }
    };
    Ok(Some(replacement))
}

/// `SELECT RAISE(kind, msg) [FROM …] [WHERE …]` and
/// `SELECT CASE WHEN cond THEN RAISE(kind, msg) END [FROM …] [WHERE …]`.
fn rewrite_raise(sql: &str, toks: &[Token]) -> RuleResult {
    let not_raise = || "SELECT statements cannot return rows from a MySQL trigger".to_string();
    let mut conditions = Vec::new();

    let raise_at = if toks.get(1).map_or(false, |t| t.is_word(sql, "RAISE")) {
        1
    } else if toks.get(1).map_or(false, |t| t.is_word(sql, "CASE"))
        && toks.get(2).map_or(false, |t| t.is_word(sql, "WHEN"))
    {
        let then = find_top_level(sql, toks, 3, |t| t.is_word(sql, "THEN")).ok_or_else(not_raise)?;
        conditions.push(rewrite_expression(sql, &toks[3..then], None)?);
        if !toks.get(then + 1).map_or(false, |t| t.is_word(sql, "RAISE")) {
            return Err(not_raise());
        }
        then + 1
    } else {
        return Err(not_raise());
    };

    if !toks.get(raise_at + 1).map_or(false, |t| t.is_punct(sql, '(')) {
        return Err(not_raise());
    }
    let close = matching_paren(sql, toks, raise_at + 1)
        .ok_or_else(|| "unbalanced parentheses".to_string())?;
    let args = split_top_level_commas(sql, &toks[raise_at + 2..close]);
    let kind = args
        .first()
        .and_then(|a| a.first())
        .map(|t| t.text(sql).to_ascii_uppercase())
        .unwrap_or_default();
    if kind == "IGNORE" {
        return Err("RAISE(IGNORE) has no MySQL equivalent".to_string());
    }
    if !matches!(kind.as_str(), "ABORT" | "FAIL" | "ROLLBACK") {
        return Err(format!("unknown RAISE action {}", kind));
    }
    let message = match args.get(1) {
        Some([tok]) if tok.kind == TokenKind::String && args.len() == 2 => tok.text(sql),
        _ => return Err("SIGNAL needs a literal message".to_string()),
    };

    let mut after = close + 1;
    if !conditions.is_empty() {
        if !toks.get(after).map_or(false, |t| t.is_word(sql, "END")) {
            return Err(not_raise());
        }
        after += 1;
    }
    match toks.get(after) {
        None => {}
        Some(t) if t.is_word(sql, "FROM") => {
            let from = rewrite_expression(sql, &toks[after..], None)?;
            conditions.push(format!("EXISTS (SELECT 1 {})", from));
        }
        Some(t) if t.is_word(sql, "WHERE") => {
            conditions.push(rewrite_expression(sql, &toks[after + 1..], None)?);
        }
        Some(_) => return Err(not_raise()),
    }

    let signal = format!("SIGNAL SQLSTATE '45000' SET MESSAGE_TEXT = {}", message);
    Ok(match conditions.len() {
        0 => signal,
        1 => format!("IF {} THEN {}; END IF", conditions[0], signal),
        _ => format!(
            "IF {} THEN {}; END IF",
            conditions
                .iter()
                .map(|c| format!("({})", c))
                .collect::<Vec<_>>()
                .join(" AND "),
            signal
        ),
    })
}

fn rewrite_insert(ctx: &RowContext<'_>, sql: &str, toks: &[Token]) -> RuleResult {
    let (prefix, rest) = if toks[0].is_word(sql, "INSERT")
        && toks.get(1).map_or(false, |t| t.is_word(sql, "OR"))
    {
        let action = toks
            .get(2)
            .map(|t| t.text(sql).to_ascii_uppercase())
            .unwrap_or_default();
        let prefix = match action.as_str() {
            "REPLACE" => "REPLACE",
            "IGNORE" => "INSERT IGNORE",
            "ABORT" | "FAIL" | "ROLLBACK" => "INSERT",
            other => return Err(format!("INSERT OR {} has no MySQL equivalent", other)),
        };
        (prefix, 3)
    } else {
        (toks[0].text(sql), 1)
    };

    if !toks.get(rest).map_or(false, |t| t.is_word(sql, "INTO")) {
        return Err("malformed INSERT statement".to_string());
    }
    if targets_table(ctx, sql, toks, rest + 1) {
        return Err(OWN_TABLE.to_string());
    }
    let body = rewrite_expression(sql, &toks[rest..], None)?;
    Ok(format!("{} {}", prefix, body))
}

fn rewrite_update(ctx: &RowContext<'_>, sql: &str, toks: &[Token]) -> RuleResult {
    if toks.get(1).map_or(false, |t| t.is_word(sql, "OR")) {
        return Err("UPDATE OR conflict clauses have no MySQL equivalent".to_string());
    }
    if targets_table(ctx, sql, toks, 1) {
        return Err(OWN_TABLE.to_string());
    }
    rewrite_expression(sql, toks, None)
}

fn rewrite_delete(ctx: &RowContext<'_>, sql: &str, toks: &[Token]) -> RuleResult {
    if !toks.get(1).map_or(false, |t| t.is_word(sql, "FROM")) {
        return Err("malformed DELETE statement".to_string());
    }
    if targets_table(ctx, sql, toks, 2) {
        return Err(OWN_TABLE.to_string());
    }
    rewrite_expression(sql, toks, None)
}

/// Whether the (possibly schema-qualified) name at `at` is the owning table.
fn targets_table(ctx: &RowContext<'_>, sql: &str, toks: &[Token], at: usize) -> bool {
    let name_at = if toks.get(at + 1).map_or(false, |t| t.is_punct(sql, '.')) {
        at + 2
    } else {
        at
    };
    toks.get(name_at)
        .map_or(false, |t| t.ident(sql).eq_ignore_ascii_case(ctx.table))
}

/// `UPDATE own SET a = x, b = y WHERE key = NEW.key` as `SET NEW.a = x, NEW.b = y`.
pub(crate) fn rewrite_self_update(ctx: &RowContext<'_>, sql: &str) -> Option<String> {
    let toks = tokenize(sql);
    if !toks.first()?.is_word(sql, "UPDATE") || !targets_table(ctx, sql, &toks, 1) {
        return None;
    }
    let set = if toks.get(2)?.is_punct(sql, '.') { 4 } else { 2 };
    if !toks.get(set)?.is_word(sql, "SET") {
        return None;
    }
    let where_at = find_top_level(sql, &toks, set + 1, |t| t.is_word(sql, "WHERE"))?;

    let cond = &toks[where_at + 1..];
    let [lhs, eq, new, dot, rhs] = cond else {
        return None;
    };
    let key = lhs.ident(sql);
    let matches_row = eq.is_punct(sql, '=')
        && new.is_word(sql, "NEW")
        && dot.is_punct(sql, '.')
        && rhs.ident(sql).eq_ignore_ascii_case(&key);
    let is_key = ctx.key.len() <= 1
        && (ctx.key.iter().any(|k| k.eq_ignore_ascii_case(&key))
            || ROWID_NAMES.iter().any(|r| r.eq_ignore_ascii_case(&key)));
    if !matches_row || !is_key {
        return None;
    }

    let mut assignments = Vec::new();
    for part in split_top_level_commas(sql, &toks[set + 1..where_at]) {
        let [col, eq, expr @ ..] = part else {
            return None;
        };
        if !eq.is_punct(sql, '=') || expr.is_empty() {
            return None;
        }
        let value = rewrite_expression(sql, expr, Some(ctx.columns)).ok()?;
        assignments.push(format!("NEW.{} = {}", quote_mysql(&col.ident(sql)), value));
    }
    Some(format!("SET {}", assignments.join(", ")))
}
