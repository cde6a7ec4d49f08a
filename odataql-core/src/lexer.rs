//! Regex-rule tokenizer for OData query option fragments.
//!
//! A [`RuleSet`] is an ordered list of `(pattern, kind)` rules. At every
//! position the longest match wins; on equal length the earlier rule wins,
//! which is how keywords (`eq`, `and`, `true`) beat plain identifiers.
//!
//! Grammar areas share punctuation but not keywords, so each area gets its own
//! rule set instead of one grammar that has to know every context.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Deadline;
use crate::error::{QueryError, QueryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Whitespace,

    // Punctuation
    OpenParen,
    CloseParen,
    Comma,
    Semicolon,
    Slash,
    Equals,
    Star,

    // Literals
    String,
    Integer,
    Decimal,
    Boolean,
    Null,
    Guid,
    Date,
    DateTime,
    TimeOfDay,
    Geography,

    // Operators
    Comparison,
    Arithmetic,
    And,
    Or,
    Not,

    // Option specific keywords
    Asc,
    Desc,
    As,

    Identifier,

    // $expand raw structure
    OptionName,
    Text,

    // $search
    Phrase,
    Word,
}

impl TokenKind {
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            TokenKind::String
                | TokenKind::Integer
                | TokenKind::Decimal
                | TokenKind::Boolean
                | TokenKind::Null
                | TokenKind::Guid
                | TokenKind::Date
                | TokenKind::DateTime
                | TokenKind::TimeOfDay
                | TokenKind::Geography
        )
    }
}

/// Semantic role of a token, assigned after lexing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenTag {
    Property,
    Function,
    Literal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw matched text, exactly as it appeared in the input
    pub value: String,
    pub tag: Option<TokenTag>,
    /// Byte offset of the token in the input
    pub position: usize,
}

impl Token {
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// Keyword and operator text normalized to ASCII lowercase
    pub fn keyword(&self) -> String {
        self.value.to_ascii_lowercase()
    }
}

pub struct Rule {
    pattern: Regex,
    kind: TokenKind,
}

impl Rule {
    fn new(pattern: &str, kind: TokenKind) -> Self {
        // Every rule is anchored at the current position
        let anchored = format!("^(?:{})", pattern);
        Self {
            pattern: Regex::new(&anchored).expect("static token pattern"),
            kind,
        }
    }

    fn match_len(&self, input: &str) -> Option<usize> {
        self.pattern.find(input).map(|m| m.end())
    }
}

impl Clone for Rule {
    fn clone(&self) -> Self {
        Self {
            pattern: self.pattern.clone(),
            kind: self.kind,
        }
    }
}

/// Ordered rule table for one grammar area
pub struct RuleSet {
    name: &'static str,
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn name(&self) -> &'static str {
        self.name
    }
}

fn punctuation() -> Vec<Rule> {
    vec![
        Rule::new(r"\s+", TokenKind::Whitespace),
        Rule::new(r"\(", TokenKind::OpenParen),
        Rule::new(r"\)", TokenKind::CloseParen),
        Rule::new(",", TokenKind::Comma),
        Rule::new("/", TokenKind::Slash),
    ]
}

fn literals() -> Vec<Rule> {
    vec![
        Rule::new(r"'(?:[^']|'')*'", TokenKind::String),
        Rule::new(r"(?i:geo(?:graphy|metry))'[^']*'", TokenKind::Geography),
        Rule::new(
            r"[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12}",
            TokenKind::Guid,
        ),
        Rule::new(
            r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?:Z|[+-]\d{2}:\d{2})?",
            TokenKind::DateTime,
        ),
        Rule::new(r"\d{4}-\d{2}-\d{2}", TokenKind::Date),
        Rule::new(r"\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?", TokenKind::TimeOfDay),
        Rule::new(
            r"-?\d+\.\d+(?:[eE][+-]?\d+)?|-?\d+[eE][+-]?\d+",
            TokenKind::Decimal,
        ),
        Rule::new(r"-?\d+", TokenKind::Integer),
        Rule::new(r"(?i:true|false)\b", TokenKind::Boolean),
        Rule::new(r"(?i:null)\b", TokenKind::Null),
    ]
}

fn operators() -> Vec<Rule> {
    vec![
        Rule::new(r"(?i:eq|ne|gt|ge|lt|le)\b", TokenKind::Comparison),
        Rule::new(r"(?i:add|sub|mul|div|mod)\b", TokenKind::Arithmetic),
        Rule::new(r"(?i:and)\b", TokenKind::And),
        Rule::new(r"(?i:or)\b", TokenKind::Or),
        Rule::new(r"(?i:not)\b", TokenKind::Not),
    ]
}

fn identifier() -> Rule {
    Rule::new(r"[A-Za-z_][A-Za-z0-9_]*", TokenKind::Identifier)
}

/// `$filter` expressions
pub static FILTER_RULES: Lazy<RuleSet> = Lazy::new(|| {
    let mut rules = punctuation();
    rules.extend(literals());
    rules.extend(operators());
    rules.push(identifier());
    RuleSet {
        name: "filter",
        rules,
    }
});

/// `$orderby`: filter expressions plus direction keywords
pub static ORDERBY_RULES: Lazy<RuleSet> = Lazy::new(|| {
    let mut rules = punctuation();
    rules.extend(literals());
    rules.extend(operators());
    rules.push(Rule::new(r"(?i:asc)\b", TokenKind::Asc));
    rules.push(Rule::new(r"(?i:desc)\b", TokenKind::Desc));
    rules.push(identifier());
    RuleSet {
        name: "orderby",
        rules,
    }
});

/// `$compute`: filter expressions plus the `as` alias keyword
pub static COMPUTE_RULES: Lazy<RuleSet> = Lazy::new(|| {
    let mut rules = punctuation();
    rules.extend(literals());
    rules.extend(operators());
    rules.push(Rule::new(r"(?i:as)\b", TokenKind::As));
    rules.push(identifier());
    RuleSet {
        name: "compute",
        rules,
    }
});

/// `$select`: property names, paths and `*`
pub static SELECT_RULES: Lazy<RuleSet> = Lazy::new(|| {
    let mut rules = punctuation();
    rules.push(Rule::new(r"\*", TokenKind::Star));
    rules.push(identifier());
    RuleSet {
        name: "select",
        rules,
    }
});

/// `$expand`: only structure matters, option values are sliced out raw
pub static EXPAND_RULES: Lazy<RuleSet> = Lazy::new(|| {
    let mut rules = punctuation();
    rules.push(Rule::new(";", TokenKind::Semicolon));
    rules.push(Rule::new("=", TokenKind::Equals));
    rules.push(Rule::new(r"\*", TokenKind::Star));
    rules.push(Rule::new(r"'(?:[^']|'')*'", TokenKind::String));
    rules.push(Rule::new(r"\$[A-Za-z]*", TokenKind::OptionName));
    rules.push(identifier());
    rules.push(Rule::new(r"[^\s(),;/'=$*]+", TokenKind::Text));
    RuleSet {
        name: "expand",
        rules,
    }
});

/// `$search` expressions
pub static SEARCH_RULES: Lazy<RuleSet> = Lazy::new(|| RuleSet {
    name: "search",
    rules: vec![
        Rule::new(r"\s+", TokenKind::Whitespace),
        Rule::new(r"\(", TokenKind::OpenParen),
        Rule::new(r"\)", TokenKind::CloseParen),
        Rule::new(r#""(?:[^"\\]|\\.)*""#, TokenKind::Phrase),
        Rule::new(r"(?i:and)\b", TokenKind::And),
        Rule::new(r"(?i:or)\b", TokenKind::Or),
        Rule::new(r"(?i:not)\b", TokenKind::Not),
        Rule::new(r#"[^\s()"]+"#, TokenKind::Word),
    ],
});

/// Entity keys inside resource paths: `(1)`, `('a')`, `(A=1,B='x')`
pub static KEY_RULES: Lazy<RuleSet> = Lazy::new(|| {
    let mut rules = punctuation();
    rules.push(Rule::new("=", TokenKind::Equals));
    rules.extend(literals());
    rules.push(identifier());
    RuleSet { name: "key", rules }
});

/// Stateless tokenizer bound to one rule set; freely shareable across threads.
#[derive(Clone, Copy)]
pub struct Tokenizer {
    rules: &'static RuleSet,
}

impl Tokenizer {
    pub fn new(rules: &'static RuleSet) -> Self {
        Self { rules }
    }

    pub fn filter() -> Self {
        Self::new(&FILTER_RULES)
    }

    /// Significant tokens only, tagged, whitespace dropped
    pub fn tokenize(&self, input: &str) -> QueryResult<Vec<Token>> {
        self.tokenize_until(input, None)
    }

    pub fn tokenize_until(&self, input: &str, deadline: Option<Deadline>) -> QueryResult<Vec<Token>> {
        let mut tokens: Vec<Token> = self
            .tokenize_lossless(input, deadline)?
            .into_iter()
            .filter(|t| t.kind != TokenKind::Whitespace)
            .collect();
        tag_tokens(&mut tokens);
        Ok(tokens)
    }

    /// Every token including whitespace; concatenating the values yields the input
    pub fn tokenize_lossless(
        &self,
        input: &str,
        deadline: Option<Deadline>,
    ) -> QueryResult<Vec<Token>> {
        let mut tokens = Vec::new();
        let mut position = 0;

        while position < input.len() {
            if let Some(deadline) = deadline {
                if deadline.is_expired() {
                    return Err(QueryError::Timeout(deadline.budget()));
                }
            }

            let rest = &input[position..];
            let mut best: Option<(usize, TokenKind)> = None;
            for rule in &self.rules.rules {
                if let Some(len) = rule.match_len(rest) {
                    if len > 0 && best.map_or(true, |(best_len, _)| len > best_len) {
                        best = Some((len, rule.kind));
                    }
                }
            }

            match best {
                Some((len, kind)) => {
                    tokens.push(Token {
                        kind,
                        value: rest[..len].to_string(),
                        tag: None,
                        position,
                    });
                    position += len;
                }
                None => {
                    let found = rest.chars().next().unwrap_or_default();
                    return Err(QueryError::syntax(
                        position,
                        format!("unexpected character '{}' in {}", found, self.rules.name),
                    ));
                }
            }
        }

        Ok(tokens)
    }
}

fn tag_tokens(tokens: &mut [Token]) {
    for i in 0..tokens.len() {
        let next_is_paren = tokens
            .get(i + 1)
            .map(|t| t.kind == TokenKind::OpenParen)
            .unwrap_or(false);
        let token = &mut tokens[i];
        token.tag = if token.kind.is_literal() {
            Some(TokenTag::Literal)
        } else if token.kind == TokenKind::Identifier {
            Some(if next_is_paren {
                TokenTag::Function
            } else {
                TokenTag::Property
            })
        } else if token.kind == TokenKind::Arithmetic && next_is_paren {
            Some(TokenTag::Function)
        } else {
            None
        };
    }
}
