use super::{DatePart, Dialect, DialectKind};

/// SQL Server: bracket quoting, `@pN` placeholders, `OFFSET ... FETCH`
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServer;

impl Dialect for SqlServer {
    fn kind(&self) -> DialectKind {
        DialectKind::SqlServer
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@p{}", index)
    }

    fn length(&self, arg: &str) -> String {
        format!("LEN({})", arg)
    }

    fn substring(&self, text: &str, start: &str, length: Option<&str>) -> String {
        let length = length
            .map(str::to_string)
            .unwrap_or_else(|| self.length(text));
        format!("SUBSTRING({}, {}, {})", text, start, length)
    }

    fn index_of(&self, haystack: &str, needle: &str) -> String {
        format!("(CHARINDEX({}, {}) - 1)", needle, haystack)
    }

    fn date_part(&self, part: DatePart, arg: &str) -> String {
        let field = match part {
            DatePart::Year => "year",
            DatePart::Month => "month",
            DatePart::Day => "day",
            DatePart::Hour => "hour",
            DatePart::Minute => "minute",
            DatePart::Second => "second",
        };
        format!("DATEPART({}, {})", field, arg)
    }

    fn current_timestamp(&self) -> &'static str {
        "SYSDATETIMEOFFSET()"
    }

    fn ceiling(&self, arg: &str) -> String {
        format!("CEILING({})", arg)
    }

    fn round(&self, arg: &str) -> String {
        format!("ROUND({}, 0)", arg)
    }

    fn paginate(&self, sql: &mut String, skip: Option<u64>, top: Option<u64>, ordered: bool) {
        if skip.is_none() && top.is_none() {
            return;
        }
        // OFFSET/FETCH is only valid after ORDER BY
        if !ordered {
            sql.push_str(" ORDER BY (SELECT NULL)");
        }
        sql.push_str(&format!(" OFFSET {} ROWS", skip.unwrap_or(0)));
        if let Some(top) = top {
            sql.push_str(&format!(" FETCH NEXT {} ROWS ONLY", top));
        }
    }

    // default collations are case-insensitive
    fn like(&self, text: &str, pattern: &str) -> String {
        format!("({} COLLATE Latin1_General_CS_AS LIKE {} ESCAPE '\\')", text, pattern)
    }

    fn search_term(&self, columns: &[String], param: &str, _phrase: bool) -> String {
        format!("CONTAINS(({}), {})", columns.join(", "), param)
    }

    fn search_value(&self, term: &str, _phrase: bool) -> String {
        format!("\"{}\"", term.replace('"', "\"\""))
    }
}
