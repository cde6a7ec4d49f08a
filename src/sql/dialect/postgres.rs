use odataql_core::BinaryOperator;

use super::{infix, DatePart, Dialect, DialectKind};

/// PostgreSQL: `$N` placeholders, `SUBSTRING ... FROM ... FOR`, full-text search
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn binary(&self, op: BinaryOperator, left: &str, right: &str) -> String {
        match op {
            // `%` is integer-only in PostgreSQL
            BinaryOperator::Mod => format!("MOD({}, {})", left, right),
            _ => infix(op, left, right),
        }
    }

    fn substring(&self, text: &str, start: &str, length: Option<&str>) -> String {
        match length {
            Some(length) => format!("SUBSTRING({} FROM {} FOR {})", text, start, length),
            None => format!("SUBSTRING({} FROM {})", text, start),
        }
    }

    fn index_of(&self, haystack: &str, needle: &str) -> String {
        format!("(STRPOS({}, {}) - 1)", haystack, needle)
    }

    fn date_part(&self, part: DatePart, arg: &str) -> String {
        let field = match part {
            DatePart::Year => "YEAR",
            DatePart::Month => "MONTH",
            DatePart::Day => "DAY",
            DatePart::Hour => "HOUR",
            DatePart::Minute => "MINUTE",
            DatePart::Second => "SECOND",
        };
        format!("CAST(FLOOR(EXTRACT({} FROM {})) AS INTEGER)", field, arg)
    }

    fn current_timestamp(&self) -> &'static str {
        "NOW()"
    }

    fn ceiling(&self, arg: &str) -> String {
        format!("CEIL({})", arg)
    }

    fn paginate(&self, sql: &mut String, skip: Option<u64>, top: Option<u64>, _ordered: bool) {
        if let Some(top) = top {
            sql.push_str(&format!(" LIMIT {}", top));
        }
        if let Some(skip) = skip {
            sql.push_str(&format!(" OFFSET {}", skip));
        }
    }

    fn search_term(&self, columns: &[String], param: &str, phrase: bool) -> String {
        let query = if phrase { "phraseto_tsquery" } else { "plainto_tsquery" };
        format!(
            "(to_tsvector('simple', concat_ws(' ', {})) @@ {}('simple', {}))",
            columns.join(", "),
            query,
            param
        )
    }

    fn search_value(&self, term: &str, _phrase: bool) -> String {
        term.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spellings() {
        let d = Postgres;
        assert_eq!(d.placeholder(2), "$2");
        assert_eq!(d.concat("a", "b"), "CONCAT(a, b)");
        assert_eq!(d.substring("s", "2", Some("3")), "SUBSTRING(s FROM 2 FOR 3)");
        assert_eq!(d.ceiling("x"), "CEIL(x)");
        assert_eq!(d.current_timestamp(), "NOW()");
        assert_eq!(d.binary(BinaryOperator::Mod, "a", "b"), "MOD(a, b)");
    }

    #[test]
    fn test_pagination() {
        let mut sql = String::from("SELECT 1");
        Postgres.paginate(&mut sql, Some(20), Some(10), false);
        assert_eq!(sql, "SELECT 1 LIMIT 10 OFFSET 20");
    }

    #[test]
    fn test_full_text_search() {
        let columns = vec!["t0.\"name\"".to_string()];
        assert_eq!(
            Postgres.search_term(&columns, "$1", true),
            "(to_tsvector('simple', concat_ws(' ', t0.\"name\")) @@ phraseto_tsquery('simple', $1))"
        );
    }
}
