/// Table Definition Text Module
///
/// SQLite keeps every table as the text of its `CREATE TABLE` statement, and
/// that text is the only place where `REFERENCES`, `CHECK`, `COLLATE` and
/// generated-column clauses survive. This module splits a definition into
/// its column and table-constraint items so that single column definitions
/// can be rewritten while everything else is carried over as written.
use crate::core::db::identifier::quote;
use crate::core::{DashError, Result};

/// Keywords that end the type of a column definition.
const COLUMN_CONSTRAINTS: [&str; 12] = [
    "CONSTRAINT",
    "AUTOINCREMENT",
    "PRIMARY",
    "NOT",
    "NULL",
    "UNIQUE",
    "CHECK",
    "DEFAULT",
    "COLLATE",
    "REFERENCES",
    "GENERATED",
    "AS",
];

/// Keywords that start a table constraint instead of a column.
const TABLE_CONSTRAINTS: [&str; 5] = ["CONSTRAINT", "PRIMARY", "UNIQUE", "CHECK", "FOREIGN"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Word,
    Name,
    Literal,
    Open,
    Close,
    Comma,
    Symbol,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    kind: Kind,
    start: usize,
    end: usize,
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
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

/// Splits SQL text into tokens, dropping whitespace and comments.
fn tokenize(sql: &str) -> Vec<Token> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        let kind = match bytes[i] {
            b if b.is_ascii_whitespace() => {
                i += 1;
                continue;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = sql[i..].find('\n').map_or(bytes.len(), |n| i + n);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = sql[i + 2..].find("*/").map_or(bytes.len(), |n| i + n + 4);
                continue;
            }
            b'\'' => {
                i = skip_quoted(bytes, i, b'\'');
                Kind::Literal
            }
            q @ (b'"' | b'`') => {
                i = skip_quoted(bytes, i, q);
                Kind::Name
            }
            b'[' => {
                i = sql[i..].find(']').map_or(bytes.len(), |n| i + n + 1);
                Kind::Name
            }
            b'(' => {
                i += 1;
                Kind::Open
            }
            b')' => {
                i += 1;
                Kind::Close
            }
            b',' => {
                i += 1;
                Kind::Comma
            }
            b if is_word_byte(b) => {
                while i < bytes.len() && is_word_byte(bytes[i]) {
                    i += 1;
                }
                Kind::Word
            }
            _ => {
                i += 1;
                Kind::Symbol
            }
        };
        tokens.push(Token { kind, start, end: i });
    }
    tokens
}

/// Splits a comma-separated list at parenthesis depth zero.
fn split_top_level(text: &str) -> Vec<String> {
    let tokens = tokenize(text);
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut first: Option<Token> = None;
    let mut last: Option<Token> = None;
    for token in tokens {
        match token.kind {
            Kind::Comma if depth == 0 => {
                if let (Some(first), Some(last)) = (first.take(), last.take()) {
                    items.push(text[first.start..last.end].to_string());
                }
                continue;
            }
            Kind::Open => depth += 1,
            Kind::Close => depth = depth.saturating_sub(1),
            _ => {}
        }
        first.get_or_insert(token);
        last = Some(token);
    }
    if let (Some(first), Some(last)) = (first, last) {
        items.push(text[first.start..last.end].to_string());
    }
    items
}

fn unquote(text: &str) -> String {
    let bytes = text.as_bytes();
    match bytes.first() {
        Some(&q @ (b'"' | b'`' | b'\'')) if text.len() >= 2 => {
            let q = q as char;
            text[1..text.len() - 1].replace(&format!("{}{}", q, q), &q.to_string())
        }
        Some(b'[') if text.len() >= 2 => text[1..text.len() - 1].to_string(),
        _ => text.to_string(),
    }
}

fn is_one_of(word: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| word.eq_ignore_ascii_case(k))
}

/// True when the statement declares an AUTOINCREMENT key. Only the keyword
/// counts, not names or literals that happen to contain it.
pub fn declares_autoincrement(sql: &str) -> bool {
    tokenize(sql)
        .iter()
        .any(|t| t.kind == Kind::Word && sql[t.start..t.end].eq_ignore_ascii_case("AUTOINCREMENT"))
}

/// One column definition: its name, its type and the constraint clauses after
/// the type.
struct ColumnText<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    /// Index of the first constraint token.
    constraints: usize,
}

impl<'a> ColumnText<'a> {
    /// Returns `None` for table constraints.
    fn parse(text: &'a str) -> Option<Self> {
        let tokens = tokenize(text);
        let name = *tokens.first()?;
        match name.kind {
            Kind::Word if !is_one_of(&text[name.start..name.end], &TABLE_CONSTRAINTS) => {}
            Kind::Name | Kind::Literal => {}
            _ => return None,
        }
        let mut depth = 0usize;
        let mut constraints = tokens.len();
        for (index, token) in tokens.iter().enumerate().skip(1) {
            match token.kind {
                Kind::Open => depth += 1,
                Kind::Close => depth = depth.saturating_sub(1),
                Kind::Word
                    if depth == 0
                        && is_one_of(&text[token.start..token.end], &COLUMN_CONSTRAINTS) =>
                {
                    constraints = index;
                    break;
                }
                _ => {}
            }
        }
        Some(ColumnText {
            text,
            tokens,
            constraints,
        })
    }

    fn name(&self) -> String {
        let name = self.tokens[0];
        unquote(&self.text[name.start..name.end])
    }

    fn name_text(&self) -> &'a str {
        let name = self.tokens[0];
        &self.text[name.start..name.end]
    }

    fn type_name(&self) -> &'a str {
        if self.constraints <= 1 {
            return "";
        }
        let end = self.tokens[self.constraints - 1].end;
        self.text[self.tokens[0].end..end].trim()
    }

    fn word(&self, index: usize) -> Option<&'a str> {
        let text = self.text;
        self.tokens
            .get(index)
            .filter(|t| t.kind == Kind::Word)
            .map(|t| &text[t.start..t.end])
    }

    fn is_word(&self, index: usize, keyword: &str) -> bool {
        self.word(index).map_or(false, |w| w.eq_ignore_ascii_case(keyword))
    }

    /// Depth-zero constraint tokens, as indexes.
    fn top_level_constraints(&self) -> Vec<usize> {
        let mut depth = 0usize;
        let mut indexes = Vec::new();
        for index in self.constraints..self.tokens.len() {
            match self.tokens[index].kind {
                Kind::Open => depth += 1,
                Kind::Close => depth = depth.saturating_sub(1),
                _ if depth == 0 => indexes.push(index),
                _ => {}
            }
        }
        indexes
    }

    fn has_keyword(&self, keyword: &str) -> bool {
        self.top_level_constraints()
            .into_iter()
            .any(|index| self.is_word(index, keyword))
    }

    /// Constraint text with the flagged tokens cut out, original spacing kept.
    fn constraints_without(&self, drop: &[bool]) -> String {
        let mut kept = String::new();
        let mut run: Option<(usize, usize)> = None;
        for index in self.constraints..self.tokens.len() {
            let token = self.tokens[index];
            if drop[index] {
                if let Some((start, end)) = run.take() {
                    kept.push(' ');
                    kept.push_str(&self.text[start..end]);
                }
            } else {
                run = Some(run.map_or((token.start, token.end), |(start, _)| (start, token.end)));
            }
        }
        if let Some((start, end)) = run {
            kept.push(' ');
            kept.push_str(&self.text[start..end]);
        }
        kept
    }

    /// Marks the tokens of a `[CONSTRAINT name] NOT NULL | NULL [ON CONFLICT x]`
    /// clause for removal.
    fn drop_nullability(&self, drop: &mut [bool]) {
        let top = self.top_level_constraints();
        let mut position = 0;
        while position < top.len() {
            let index = top[position];
            let after = if self.is_word(index, "DEFAULT") {
                // The default value may itself be NULL.
                let grouped = self.tokens.get(index + 1).map_or(false, |t| t.kind == Kind::Open);
                position += if grouped { 1 } else { 2 };
                continue;
            } else if self.is_word(index, "NOT") && self.is_word(index + 1, "NULL") {
                index + 2
            } else if self.is_word(index, "NULL") && !self.is_word(index - 1, "SET") {
                index + 1
            } else {
                position += 1;
                continue;
            };
            let end = if self.is_word(after, "ON") && self.is_word(after + 1, "CONFLICT") {
                (after + 3).min(self.tokens.len())
            } else {
                after
            };
            let start = if index >= self.constraints + 2 && self.is_word(index - 2, "CONSTRAINT") {
                index - 2
            } else {
                index
            };
            drop[start..end].iter_mut().for_each(|d| *d = true);
            while position < top.len() && top[position] < end {
                position += 1;
            }
        }
    }

    /// Rewrites the column with a new type and nullability, keeping its other
    /// constraints.
    fn retype(&self, type_name: &str, not_null: bool) -> Result<String> {
        let auto_increment = self.has_keyword("AUTOINCREMENT");
        let type_name = if auto_increment {
            if !type_name.to_ascii_uppercase().contains("INT") {
                return Err(DashError::schema(format!(
                    "column '{}' is AUTOINCREMENT and must keep an integer type",
                    self.name()
                )));
            }
            "INTEGER"
        } else {
            type_name
        };

        let mut drop = vec![false; self.tokens.len()];
        self.drop_nullability(&mut drop);
        let mut definition = format!("{} {}", self.name_text(), type_name);
        definition.push_str(&self.constraints_without(&drop));
        if not_null && !auto_increment {
            definition.push_str(" NOT NULL");
        }
        Ok(definition)
    }

    /// Rewrites an integer column flagged AUTOINCREMENT into SQLite's only
    /// accepted form, `INTEGER PRIMARY KEY AUTOINCREMENT`. Returns `None` when
    /// the column does not qualify.
    fn promote_auto_increment(&self, table_key: bool) -> Option<String> {
        if !self.has_keyword("AUTOINCREMENT")
            || !self.type_name().to_ascii_uppercase().contains("INT")
        {
            return None;
        }
        let top = self.top_level_constraints();
        let inline_key = top
            .iter()
            .any(|&i| self.is_word(i, "PRIMARY") && self.is_word(i + 1, "KEY"));
        if !inline_key && !table_key {
            return None;
        }

        let mut drop = vec![false; self.tokens.len()];
        for &index in &top {
            if self.is_word(index, "AUTOINCREMENT") {
                drop[index] = true;
            } else if self.is_word(index, "PRIMARY") && self.is_word(index + 1, "KEY") {
                drop[index] = true;
                drop[index + 1] = true;
                if self.is_word(index + 2, "ASC") || self.is_word(index + 2, "DESC") {
                    drop[index + 2] = true;
                }
            }
        }
        Some(format!(
            "{} INTEGER{} PRIMARY KEY AUTOINCREMENT",
            self.name_text(),
            self.constraints_without(&drop)
        ))
    }
}

/// Column names of a `PRIMARY KEY (...)` table constraint.
fn table_key_columns(item: &str) -> Option<Vec<String>> {
    let tokens = tokenize(item);
    let word = |i: usize| {
        tokens
            .get(i)
            .filter(|t| t.kind == Kind::Word)
            .map(|t| &item[t.start..t.end])
    };
    let at = if word(0).map_or(false, |w| w.eq_ignore_ascii_case("CONSTRAINT")) {
        2
    } else {
        0
    };
    if !word(at).map_or(false, |w| w.eq_ignore_ascii_case("PRIMARY"))
        || !word(at + 1).map_or(false, |w| w.eq_ignore_ascii_case("KEY"))
    {
        return None;
    }
    let inner = item.find('(').zip(item.rfind(')'))?;
    Some(
        split_top_level(&item[inner.0 + 1..inner.1])
            .iter()
            .filter_map(|column| tokenize(column).first().map(|t| unquote(&column[t.start..t.end])))
            .collect(),
    )
}

/// Rewrites a raw column list so that an integer column written as
/// `INT PRIMARY KEY AUTOINCREMENT`, or `INT AUTOINCREMENT` with a one-column
/// `PRIMARY KEY (...)` table constraint, becomes a SQLite rowid key.
pub fn promote_auto_increment_keys(columns: &str) -> String {
    let mut items = split_top_level(columns);
    let table_keys: Vec<(usize, Vec<String>)> = items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| table_key_columns(item).map(|keys| (index, keys)))
        .collect();

    let mut absorbed = None;
    for index in 0..items.len() {
        let Some(column) = ColumnText::parse(&items[index]) else {
            continue;
        };
        let name = column.name();
        let table_key = table_keys
            .iter()
            .find(|(_, keys)| keys.len() == 1 && keys[0].eq_ignore_ascii_case(&name))
            .map(|(at, _)| *at);
        if let Some(rewritten) = column.promote_auto_increment(table_key.is_some()) {
            items[index] = rewritten;
            absorbed = absorbed.or(table_key);
        }
    }
    if let Some(at) = absorbed {
        items.remove(at);
    }
    items.join(", ")
}

/// A parsed `CREATE TABLE` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    items: Vec<String>,
    /// Table options after the column list, such as `WITHOUT ROWID`.
    options: String,
}

impl TableDefinition {
    pub fn parse(create_sql: &str) -> Result<Self> {
        let tokens = tokenize(create_sql);
        let open = tokens
            .iter()
            .position(|t| t.kind == Kind::Open)
            .ok_or_else(|| DashError::schema("table definition has no column list"))?;
        if tokens[..open]
            .iter()
            .any(|t| create_sql[t.start..t.end].eq_ignore_ascii_case("VIRTUAL"))
        {
            return Err(DashError::schema("virtual tables cannot be rebuilt"));
        }

        let mut depth = 0usize;
        let mut close = None;
        for (index, token) in tokens.iter().enumerate().skip(open) {
            match token.kind {
                Kind::Open => depth += 1,
                Kind::Close => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(index);
                        break;
                    }
                }
                _ => {}
            }
        }
        let close =
            close.ok_or_else(|| DashError::schema("table definition has an unclosed column list"))?;

        Ok(TableDefinition {
            items: split_top_level(&create_sql[tokens[open].end..tokens[close].start]),
            options: create_sql[tokens[close].end..].trim().to_string(),
        })
    }

    /// The definition of one column as written, if the table has it.
    pub fn column(&self, name: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|item| {
                ColumnText::parse(item).map_or(false, |c| c.name().eq_ignore_ascii_case(name))
            })
            .map(String::as_str)
    }

    /// Replaces the type and nullability of `column`; every other clause of
    /// its definition stays as written.
    pub fn retype_column(&mut self, column: &str, type_name: &str, not_null: bool) -> Result<()> {
        for item in self.items.iter_mut() {
            let rewritten = match ColumnText::parse(item) {
                Some(text) if text.name().eq_ignore_ascii_case(column) => {
                    text.retype(type_name, not_null)?
                }
                _ => continue,
            };
            *item = rewritten;
            return Ok(());
        }
        Err(DashError::schema(format!(
            "column '{}' is not in the table definition",
            column
        )))
    }

    /// Renders the statement under another table name.
    pub fn render(&self, table: &str) -> String {
        let mut sql = format!("CREATE TABLE {} ({})", quote(table), self.items.join(", "));
        if !self.options.is_empty() {
            sql.push(' ');
            sql.push_str(&self.options);
        }
        sql
    }
}
