use odataql_core::Function;

use super::{escape_like, wildcard, DatePart, Dialect, DialectKind};

/// SQLite 3: `?N` placeholders, `||` concatenation, `LIMIT`/`OFFSET`
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn placeholder(&self, index: usize) -> String {
        format!("?{}", index)
    }

    fn concat(&self, left: &str, right: &str) -> String {
        format!("({} || {})", left, right)
    }

    fn substring(&self, text: &str, start: &str, length: Option<&str>) -> String {
        match length {
            Some(length) => format!("SUBSTR({}, {}, {})", text, start, length),
            None => format!("SUBSTR({}, {})", text, start),
        }
    }

    fn index_of(&self, haystack: &str, needle: &str) -> String {
        format!("(INSTR({}, {}) - 1)", haystack, needle)
    }

    fn date_part(&self, part: DatePart, arg: &str) -> String {
        let format = match part {
            DatePart::Year => "%Y",
            DatePart::Month => "%m",
            DatePart::Day => "%d",
            DatePart::Hour => "%H",
            DatePart::Minute => "%M",
            DatePart::Second => "%S",
        };
        format!("CAST(STRFTIME('{}', {}) AS INTEGER)", format, arg)
    }

    fn current_timestamp(&self) -> &'static str {
        "STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')"
    }

    // math functions are optional in SQLite builds
    fn floor(&self, arg: &str) -> String {
        format!(
            "(CAST({0} AS INTEGER) - ({0} < CAST({0} AS INTEGER)))",
            arg
        )
    }

    fn ceiling(&self, arg: &str) -> String {
        format!(
            "(CAST({0} AS INTEGER) + ({0} > CAST({0} AS INTEGER)))",
            arg
        )
    }

    // LIKE folds ASCII case in SQLite, GLOB does not
    fn like(&self, text: &str, pattern: &str) -> String {
        format!("({} GLOB {})", text, pattern)
    }

    fn pattern(&self, function: Function, needle: &str) -> String {
        wildcard(function, &escape_glob(needle), "*")
    }

    fn paginate(&self, sql: &mut String, skip: Option<u64>, top: Option<u64>, _ordered: bool) {
        match (top, skip) {
            (Some(top), Some(skip)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", top, skip)),
            (Some(top), None) => sql.push_str(&format!(" LIMIT {}", top)),
            (None, Some(skip)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", skip)),
            (None, None) => {}
        }
    }

    fn search_term(&self, columns: &[String], param: &str, _phrase: bool) -> String {
        let clauses: Vec<String> = columns
            .iter()
            .map(|column| format!("({} LIKE {} ESCAPE '\\')", column, param))
            .collect();
        format!("({})", clauses.join(" OR "))
    }

    fn search_value(&self, term: &str, _phrase: bool) -> String {
        format!("%{}%", escape_like(term))
    }
}

/// Bracket GLOB metacharacters so user text matches literally
fn escape_glob(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '*' | '?' | '[' => {
                escaped.push('[');
                escaped.push(c);
                escaped.push(']');
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spellings() {
        let d = Sqlite;
        assert_eq!(d.placeholder(3), "?3");
        assert_eq!(d.concat("a", "b"), "(a || b)");
        assert_eq!(d.substring("s", "(1 + 1)", None), "SUBSTR(s, (1 + 1))");
        assert_eq!(d.index_of("h", "n"), "(INSTR(h, n) - 1)");
        assert_eq!(d.date_part(DatePart::Year, "c"), "CAST(STRFTIME('%Y', c) AS INTEGER)");
        assert_eq!(d.quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_pattern_match_is_case_sensitive_glob() {
        assert_eq!(Sqlite.like("t0.\"name\"", "?1"), "(t0.\"name\" GLOB ?1)");
        assert_eq!(Sqlite.pattern(Function::Contains, "a*b?[c]"), "*a[*]b[?][[]c]*");
        assert_eq!(Sqlite.pattern(Function::StartsWith, "50%"), "50%*");
    }

    #[test]
    fn test_pagination() {
        let mut sql = String::from("SELECT 1");
        Sqlite.paginate(&mut sql, Some(20), Some(10), false);
        assert_eq!(sql, "SELECT 1 LIMIT 10 OFFSET 20");

        let mut sql = String::from("SELECT 1");
        Sqlite.paginate(&mut sql, Some(5), None, false);
        assert_eq!(sql, "SELECT 1 LIMIT -1 OFFSET 5");
    }

    #[test]
    fn test_search_falls_back_to_like() {
        let columns = vec!["t0.\"name\"".to_string(), "t0.\"sku\"".to_string()];
        assert_eq!(
            Sqlite.search_term(&columns, "?1", false),
            "((t0.\"name\" LIKE ?1 ESCAPE '\\') OR (t0.\"sku\" LIKE ?1 ESCAPE '\\'))"
        );
        assert_eq!(Sqlite.search_value("10%", false), "%10\\%%");
    }
}
