//! Query translation for Ultrasearch.
//!
//! Converts a free-form user query into the daemon's extended boolean syntax:
//!
//! | user syntax            | daemon syntax        |
//! |------------------------|----------------------|
//! | `dog cat`              | `dog cat`            |
//! | `dog AND cat`          | `dog cat`            |
//! | `dog OR cat`           | `dog \| cat`         |
//! | `NOT dog`              | `-dog`               |
//! | `"white tigers"`       | `"white tigers"`     |
//! | `title:animals`        | `@title animals`     |
//! | `NOT (lions OR bears)` | `-(lions \| bears)`  |
//!
//! Operators are case-insensitive. Field restrictions are only honoured for
//! declared text fields; anything else degrades to a plain term. A field
//! restriction stays in force until the end of its group, so a restricted
//! clause with more clauses after it gets a group of its own:
//! `title:dog OR cat` becomes `(@title dog) | cat`.
//!
//! Validation is shallow on purpose: the daemon is the final arbiter of query
//! validity. Nesting deeper than one level is translated as written and left
//! for the daemon to accept or reject.
//!
//! The daemon syntax is itself accepted as input (`|`, leading `-`, `@field`),
//! so translating an already translated query yields the same query.

use std::collections::HashSet;
use tracing::debug;

/// Query sent when the user query is blank; matches every indexed document.
pub const MATCH_ALL_QUERY: &str = "@empty_searchable __empty_searchable__";

/// Characters the daemon reserves for its own syntax inside bare terms.
const RESERVED: &[char] = &[
    '|', '!', '@', '~', '&', '/', '^', '$', '=', '<', '>', '\\', '(', ')', '"',
];

/// Translates user queries for a fixed set of declared text fields.
#[derive(Debug, Clone, Default)]
pub struct QueryParser {
    text_fields: HashSet<String>,
}

impl QueryParser {
    /// Create a parser that honours `field:term` for the given text fields.
    pub fn new<I, S>(text_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        QueryParser {
            text_fields: text_fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Translate `raw` into daemon syntax.
    ///
    /// Blank input, or input with no usable terms, becomes
    /// [`MATCH_ALL_QUERY`].
    pub fn parse(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == MATCH_ALL_QUERY {
            return MATCH_ALL_QUERY.to_string();
        }

        let tokens = lex(raw);
        let mut cursor = 0;
        let items = self.parse_items(&tokens, &mut cursor, false);
        let rendered = render_items(&items);

        if rendered.is_empty() {
            debug!(query = raw, "Query has no searchable terms, matching everything");
            return MATCH_ALL_QUERY.to_string();
        }
        rendered
    }

    fn parse_items(&self, tokens: &[Token], cursor: &mut usize, nested: bool) -> Vec<Item> {
        let mut items = Vec::new();
        let mut pending = Pending::default();

        while let Some(token) = tokens.get(*cursor) {
            *cursor += 1;
            match token {
                Token::Close if nested => break,
                // Stray closing parenthesis at the top level
                Token::Close => {}
                Token::And => {}
                Token::Or => pending.or = !items.is_empty(),
                Token::Not => pending.negated = true,
                Token::Field(name) => {
                    if self.text_fields.contains(name) {
                        pending.field = Some(name.clone());
                    } else {
                        debug!(field = %name, "Undeclared text field, treating as plain term");
                        pending.degraded = Some(name.clone());
                    }
                }
                Token::Open => {
                    let inner = self.parse_items(tokens, cursor, true);
                    if !inner.is_empty() {
                        let clause = pending.degrade(Clause::Group(inner));
                        items.push(pending.take(clause));
                    } else {
                        pending = Pending::default();
                    }
                }
                Token::Phrase(text) => {
                    let text = sanitize_text(text);
                    if !text.trim().is_empty() {
                        let clause = pending.degrade(Clause::Phrase(text));
                        items.push(pending.take(clause));
                    } else {
                        pending = Pending::default();
                    }
                }
                Token::Word(word) => {
                    let word = match pending.degraded.take() {
                        Some(field) => format!("{}:{}", field, word),
                        None => word.clone(),
                    };
                    let term = sanitize_term(&word);
                    if !term.is_empty() {
                        items.push(pending.take(Clause::Term(term)));
                    } else {
                        pending = Pending::default();
                    }
                }
            }
        }

        items
    }
}

/// Strip field restrictions and boolean operators from a translated query,
/// leaving only the positive terms (used for highlighting).
pub fn strip_query_commands(parsed: &str) -> String {
    if parsed == MATCH_ALL_QUERY {
        return String::new();
    }

    // Every field marker present is declared so that `@field` is dropped
    // rather than folded into a term.
    let tokens = lex(parsed);
    let parser = QueryParser {
        text_fields: tokens
            .iter()
            .filter_map(|t| match t {
                Token::Field(name) => Some(name.clone()),
                _ => None,
            })
            .collect(),
    };
    let mut cursor = 0;
    let items = parser.parse_items(&tokens, &mut cursor, false);

    let mut terms = Vec::new();
    collect_terms(&items, &mut terms);
    terms.join(" ")
}

/// Remove control characters that would corrupt a daemon request.
///
/// Ordinary whitespace (space, tab, newline) is kept; other control
/// characters become spaces so that word boundaries survive.
pub fn sanitize_text(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_control() && !matches!(c, '\t' | '\n' | '\r') {
                ' '
            } else {
                c
            }
        })
        .collect()
}

/// Sanitize a bare term: control characters and reserved syntax go away.
fn sanitize_term(word: &str) -> String {
    word.chars()
        .filter(|c| !c.is_control() && !RESERVED.contains(c))
        .collect::<String>()
        .trim_start_matches('-')
        .to_string()
}

// === Syntax Tree ===

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Term(String),
    Phrase(String),
    Group(Vec<Item>),
}

#[derive(Debug, Clone, PartialEq)]
struct Item {
    /// Joined to the previous clause with OR rather than the implicit AND
    or: bool,
    negated: bool,
    field: Option<String>,
    clause: Clause,
}

/// Operators seen since the last clause.
#[derive(Debug, Default)]
struct Pending {
    or: bool,
    negated: bool,
    field: Option<String>,
    degraded: Option<String>,
}

impl Item {
    fn plain(clause: Clause) -> Self {
        Item {
            or: false,
            negated: false,
            field: None,
            clause,
        }
    }
}

impl Pending {
    /// Keep an undeclared field name as a plain term in front of `clause`.
    ///
    /// `color:"red car"` becomes `(color "red car")` and
    /// `color:(red blue)` becomes `(color red blue)`.
    fn degrade(&mut self, clause: Clause) -> Clause {
        let term = match self.degraded.take().map(|field| sanitize_term(&field)) {
            Some(term) if !term.is_empty() => term,
            _ => return clause,
        };

        let mut items = vec![Item::plain(Clause::Term(term))];
        match clause {
            Clause::Group(inner) => items.extend(inner),
            other => items.push(Item::plain(other)),
        }
        Clause::Group(items)
    }

    fn take(&mut self, clause: Clause) -> Item {
        let pending = std::mem::take(self);
        Item {
            or: pending.or,
            negated: pending.negated,
            field: pending.field,
            clause,
        }
    }
}

fn render_items(items: &[Item]) -> String {
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(' ');
            if item.or {
                out.push_str("| ");
            }
        }
        // A restriction would otherwise swallow every clause after it
        let scoped = item.field.is_some() && i + 1 < items.len();
        if scoped {
            out.push('(');
        }
        if let Some(ref field) = item.field {
            out.push('@');
            out.push_str(field);
            out.push(' ');
        }
        if item.negated {
            out.push('-');
        }
        match &item.clause {
            Clause::Term(term) => out.push_str(term),
            Clause::Phrase(text) => {
                out.push('"');
                out.push_str(text);
                out.push('"');
            }
            Clause::Group(inner) => {
                out.push('(');
                out.push_str(&render_items(inner));
                out.push(')');
            }
        }
        if scoped {
            out.push(')');
        }
    }
    out
}

fn collect_terms(items: &[Item], terms: &mut Vec<String>) {
    for item in items.iter().filter(|item| !item.negated) {
        match &item.clause {
            Clause::Term(term) => terms.push(term.clone()),
            Clause::Phrase(text) => terms.extend(text.split_whitespace().map(String::from)),
            Clause::Group(inner) => collect_terms(inner, terms),
        }
    }
}

// === Lexer ===

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    And,
    Or,
    Not,
    Field(String),
    Phrase(String),
    Word(String),
}

fn is_field_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn lex(input: &str) -> Vec<Token> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Or);
                i += 1;
            }
            '-' | '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '"' => {
                // An unterminated phrase runs to the end of the input
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&c| c == '"')
                    .map_or(chars.len(), |p| start + p);
                tokens.push(Token::Phrase(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '@' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&c| !is_field_char(c))
                    .map_or(chars.len(), |p| start + p);
                if end > start {
                    tokens.push(Token::Field(chars[start..end].iter().collect()));
                }
                i = end.max(start);
            }
            _ => {
                let start = i;
                let end = chars[start..]
                    .iter()
                    .position(|&c| c.is_whitespace() || matches!(c, '(' | ')' | '"'))
                    .map_or(chars.len(), |p| start + p);
                let word: String = chars[start..end].iter().collect();
                i = end;
                tokens.extend(classify_word(&word));
            }
        }
    }

    tokens
}

fn classify_word(word: &str) -> Vec<Token> {
    if word.eq_ignore_ascii_case("and") {
        return vec![Token::And];
    }
    if word.eq_ignore_ascii_case("or") {
        return vec![Token::Or];
    }
    if word.eq_ignore_ascii_case("not") {
        return vec![Token::Not];
    }

    if let Some((field, rest)) = word.split_once(':') {
        if !field.is_empty() && field.chars().all(is_field_char) {
            let mut tokens = vec![Token::Field(field.to_string())];
            // `field:` directly followed by a phrase or group has no rest
            if !rest.is_empty() {
                tokens.push(Token::Word(rest.to_string()));
            }
            return tokens;
        }
    }

    vec![Token::Word(word.to_string())]
}
