//! Resource paths: `Set`, `Set(key)`, `Set(K1=v1,K2=v2)`, `Set(key)/Nav`.

use std::fmt;

use crate::ast::{Literal, LiteralKind};
use crate::error::{QueryError, QueryResult};
use crate::lexer::{Token, TokenKind, Tokenizer, KEY_RULES};
use crate::metadata::{EntityMetadata, PropertyMetadata};
use crate::parser::literal_kind;

#[derive(Debug, Clone, PartialEq)]
pub enum EntityKey {
    Single(Literal),
    Composite(Vec<(String, Literal)>),
}

impl EntityKey {
    /// Parse the text between the key parentheses
    pub fn parse(text: &str) -> QueryResult<Self> {
        let invalid = || QueryError::validation(format!("invalid key predicate '({})'", text));
        let tokens = Tokenizer::new(&KEY_RULES)
            .tokenize(text)
            .map_err(|_| invalid())?;

        if let [token] = tokens.as_slice() {
            return key_literal(token).map(EntityKey::Single).ok_or_else(invalid);
        }

        let mut parts = Vec::new();
        for chunk in tokens.split(|t| t.kind == TokenKind::Comma) {
            match chunk {
                [name, eq, value]
                    if name.kind == TokenKind::Identifier && eq.kind == TokenKind::Equals =>
                {
                    let literal = key_literal(value).ok_or_else(invalid)?;
                    parts.push((name.value.clone(), literal));
                }
                _ => return Err(invalid()),
            }
        }
        Ok(EntityKey::Composite(parts))
    }

    /// Pair each key property of `entity` with its literal
    pub fn resolve<'e>(
        &self,
        entity: &'e EntityMetadata,
    ) -> QueryResult<Vec<(&'e PropertyMetadata, Literal)>> {
        let keys = entity.key_properties();
        match self {
            EntityKey::Single(literal) => {
                if keys.len() != 1 {
                    return Err(QueryError::validation(format!(
                        "'{}' has a composite key; name each key property",
                        entity.name
                    )));
                }
                Ok(vec![(keys[0], literal.clone())])
            }
            EntityKey::Composite(parts) => {
                let mut resolved = Vec::with_capacity(parts.len());
                for key in &keys {
                    let matching: Vec<_> = parts
                        .iter()
                        .filter(|(name, _)| name.eq_ignore_ascii_case(&key.name))
                        .collect();
                    match matching.as_slice() {
                        [(_, literal)] => resolved.push((*key, literal.clone())),
                        [] => {
                            return Err(QueryError::validation(format!(
                                "missing key property '{}' for '{}'",
                                key.name, entity.name
                            )))
                        }
                        _ => {
                            return Err(QueryError::validation(format!(
                                "key property '{}' given more than once",
                                key.name
                            )))
                        }
                    }
                }
                if resolved.len() != parts.len() {
                    return Err(QueryError::validation(format!(
                        "key predicate names a property that is not a key of '{}'",
                        entity.name
                    )));
                }
                Ok(resolved)
            }
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Single(literal) => write!(f, "{}", literal.raw),
            EntityKey::Composite(parts) => {
                for (i, (name, literal)) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}={}", name, literal.raw)?;
                }
                Ok(())
            }
        }
    }
}

fn key_literal(token: &Token) -> Option<Literal> {
    let kind = literal_kind(token)?;
    if kind == LiteralKind::Null {
        return None;
    }
    Some(Literal::new(kind, token.value.clone()))
}

/// Addressed resource of one request URL
#[derive(Debug, Clone, PartialEq)]
pub struct ResourcePath {
    pub entity_set: String,
    pub key: Option<EntityKey>,
    pub navigation: Option<String>,
    /// Raw query string without `?`, still percent-encoded
    pub query: String,
}

impl ResourcePath {
    /// Parse a URL relative to `service_root`; absolute URLs are accepted too
    pub fn parse(url: &str, service_root: &str) -> QueryResult<Self> {
        let owned;
        let mut rest = url.trim();
        if rest.starts_with("http://") || rest.starts_with("https://") {
            let parsed = url::Url::parse(rest)
                .map_err(|e| QueryError::validation(format!("invalid URL '{}': {}", url, e)))?;
            owned = match parsed.query() {
                Some(q) => format!("{}?{}", parsed.path(), q),
                None => parsed.path().to_string(),
            };
            rest = &owned;
        }

        let (path, query) = match rest.split_once('?') {
            Some((p, q)) => (p, q.to_string()),
            None => (rest, String::new()),
        };

        let root = service_root.trim_end_matches('/');
        let path = if !root.is_empty() && path.starts_with(root) {
            &path[root.len()..]
        } else {
            path
        };
        let decoded = urlencoding::decode(path)
            .map_err(|_| QueryError::validation(format!("invalid URL encoding in '{}'", url)))?;
        let path = decoded.trim_matches('/');
        if path.is_empty() {
            return Err(QueryError::validation(format!("no entity set in '{}'", url)));
        }

        let name_end = path.find(['(', '/']).unwrap_or(path.len());
        let entity_set = &path[..name_end];
        if !is_identifier(entity_set) {
            return Err(QueryError::validation(format!(
                "invalid entity set '{}'",
                entity_set
            )));
        }
        let mut remainder = &path[name_end..];

        let mut key = None;
        if remainder.starts_with('(') {
            let close = closing_paren(remainder).ok_or_else(|| {
                QueryError::validation(format!("unterminated key predicate in '{}'", url))
            })?;
            key = Some(EntityKey::parse(&remainder[1..close])?);
            remainder = &remainder[close + 1..];
        }

        let navigation = match remainder.strip_prefix('/') {
            None if remainder.is_empty() => None,
            Some(nav) if key.is_some() && is_identifier(nav) => Some(nav.to_string()),
            _ => {
                return Err(QueryError::validation(format!(
                    "unsupported resource path '{}'",
                    path
                )))
            }
        };

        Ok(ResourcePath {
            entity_set: entity_set.to_string(),
            key,
            navigation,
            query,
        })
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Index of the `)` closing the group at byte 0, skipping quoted strings
fn closing_paren(text: &str) -> Option<usize> {
    let mut in_string = false;
    for (i, c) in text.char_indices().skip(1) {
        match c {
            '\'' => in_string = !in_string,
            ')' if !in_string => return Some(i),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::fixtures::catalog;
    use crate::metadata::MetadataProvider;

    #[test]
    fn test_entity_set_only() {
        let path = ResourcePath::parse("/Products?$top=2", "/").unwrap();
        assert_eq!(path.entity_set, "Products");
        assert_eq!(path.key, None);
        assert_eq!(path.query, "$top=2");
    }

    #[test]
    fn test_single_key_and_navigation() {
        let path = ResourcePath::parse("Products(123)/Items", "/").unwrap();
        assert_eq!(
            path.key,
            Some(EntityKey::Single(Literal::new(LiteralKind::Integer, "123")))
        );
        assert_eq!(path.navigation.as_deref(), Some("Items"));
    }

    #[test]
    fn test_string_and_composite_keys() {
        let path = ResourcePath::parse("Items('a)b')", "/").unwrap();
        assert_eq!(
            path.key,
            Some(EntityKey::Single(Literal::new(LiteralKind::String, "'a)b'")))
        );

        let path = ResourcePath::parse("Lines(OrderID=1,Sku='x')", "/").unwrap();
        let Some(EntityKey::Composite(parts)) = path.key else {
            panic!("expected composite key");
        };
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].0, "Sku");
    }

    #[test]
    fn test_service_root_and_absolute_urls() {
        let path = ResourcePath::parse("/odata/Products(7)", "/odata").unwrap();
        assert_eq!(path.entity_set, "Products");
        let path = ResourcePath::parse("https://host/odata/Products(7)?$select=Name", "/odata/").unwrap();
        assert_eq!(path.entity_set, "Products");
        assert_eq!(path.query, "$select=Name");
        let path = ResourcePath::parse("Products(%27a%20b%27)", "/").unwrap();
        assert_eq!(path.key.unwrap().to_string(), "'a b'");
    }

    #[test]
    fn test_unresolved_content_id_is_a_validation_error() {
        let err = ResourcePath::parse("/Products($1)/Items", "/").unwrap_err();
        assert!(matches!(err, QueryError::ValidationError(_)));
    }

    #[test]
    fn test_invalid_paths() {
        assert!(ResourcePath::parse("/", "/").is_err());
        assert!(ResourcePath::parse("Products(1", "/").is_err());
        assert!(ResourcePath::parse("Products/Items", "/").is_err());
        assert!(ResourcePath::parse("Products(1)/Items/Sku", "/").is_err());
        assert!(ResourcePath::parse("Products(null)", "/").is_err());
    }

    #[test]
    fn test_resolve_keys() {
        let registry = catalog();
        let products = registry.require_entity("Products").unwrap();
        let key = EntityKey::parse("5").unwrap();
        let resolved = key.resolve(products).unwrap();
        assert_eq!(resolved[0].0.name, "ID");

        assert!(EntityKey::parse("id=5").unwrap().resolve(products).is_ok());
        assert!(EntityKey::parse("Name='x'").unwrap().resolve(products).is_err());
        assert!(EntityKey::parse("ID=5,Name='x'").unwrap().resolve(products).is_err());
    }
}
