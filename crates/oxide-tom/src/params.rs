//! Named parameter scanning and binding.
//!
//! SQL is written with `@Name` placeholders. [`Statement::parse`] finds the
//! placeholders a query actually references, skipping string literals,
//! quoted and bracketed identifiers, comments and `@@system` variables, and
//! rewrites each into the dialect's driver-side placeholder. Names match
//! case-insensitively; the first spelling wins.

use std::collections::{BTreeMap, HashMap};

use crate::dialect::Dialect;
use crate::error::{Result, TomError};
use crate::value::{SqlValue, Value};

/// Something that can supply values for named parameters.
///
/// Lookups are case-insensitive. Names a query does not reference are never
/// asked for, so a source may carry more values than a query uses.
pub trait ParameterSource {
    /// Returns the value for `name`, or `None` when the source has no such
    /// parameter.
    fn parameter(&self, name: &str) -> Result<Option<Value>>;
}

fn find<'a, K: AsRef<str> + 'a>(
    entries: impl IntoIterator<Item = (&'a K, &'a Value)>,
    name: &str,
) -> Option<Value> {
    entries
        .into_iter()
        .find(|(key, _)| key.as_ref().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.clone())
}

impl ParameterSource for HashMap<String, Value> {
    fn parameter(&self, name: &str) -> Result<Option<Value>> {
        Ok(self
            .get(name)
            .cloned()
            .or_else(|| find(self.iter(), name)))
    }
}

impl ParameterSource for BTreeMap<String, Value> {
    fn parameter(&self, name: &str) -> Result<Option<Value>> {
        Ok(self
            .get(name)
            .cloned()
            .or_else(|| find(self.iter(), name)))
    }
}

impl ParameterSource for Vec<(&str, Value)> {
    fn parameter(&self, name: &str) -> Result<Option<Value>> {
        Ok(find(self.iter().map(|(k, v)| (k, v)), name))
    }
}

impl<const N: usize> ParameterSource for [(&str, Value); N] {
    fn parameter(&self, name: &str) -> Result<Option<Value>> {
        Ok(find(self.iter().map(|(k, v)| (k, v)), name))
    }
}

/// A query with its placeholders located and rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    text: String,
    parameters: Vec<String>,
}

impl Statement {
    /// Scans `sql` and rewrites its placeholders for `dialect`.
    pub fn parse(sql: &str, dialect: &dyn Dialect) -> Self {
        let mut scanner = Scanner::new(sql);
        let mut text = String::with_capacity(sql.len());
        let mut parameters: Vec<String> = Vec::new();

        while let Some(c) = scanner.peek() {
            match c {
                '\'' | '"' => text.push_str(scanner.delimited(c)),
                '[' => text.push_str(scanner.delimited(']')),
                '-' if scanner.peek_next() == Some('-') => text.push_str(scanner.line_comment()),
                '/' if scanner.peek_next() == Some('*') => text.push_str(scanner.block_comment()),
                '@' if scanner.peek_next() == Some('@') => text.push_str(scanner.system_variable()),
                '@' if scanner.peek_next().is_some_and(is_name_char) => {
                    scanner.advance();
                    let name = scanner.take_while(is_name_char);
                    let index = match parameters
                        .iter()
                        .position(|p| p.eq_ignore_ascii_case(name))
                    {
                        Some(i) => i,
                        None => {
                            parameters.push(name.to_string());
                            parameters.len() - 1
                        }
                    };
                    text.push_str(&dialect.placeholder(index + 1, &parameters[index]));
                }
                _ => {
                    scanner.advance();
                    text.push(c);
                }
            }
        }

        Self { text, parameters }
    }

    /// The rewritten SQL text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Distinct referenced parameter names, in order of first appearance.
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    /// Collects the values to bind, in placeholder order.
    ///
    /// `extra` is consulted before `source` and carries values the mapper
    /// adds itself, such as paging parameters.
    pub fn resolve(
        &self,
        source: Option<&dyn ParameterSource>,
        extra: &[(&str, Value)],
    ) -> Result<Vec<SqlValue>> {
        self.parameters
            .iter()
            .map(|name| {
                if let Some((_, value)) = extra.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
                    return Ok(SqlValue::from(value.clone()));
                }
                match source {
                    Some(source) => source.parameter(name)?,
                    None => None,
                }
                .map(SqlValue::from)
                .ok_or_else(|| TomError::MissingParameter(name.clone()))
            })
            .collect()
    }
}

const fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Character cursor over SQL text.
struct Scanner<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    const fn new(source: &'a str) -> Self {
        Self { source, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        self.source[self.pos..].chars().nth(1)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.advance();
        }
        &self.source[start..self.pos]
    }

    /// Consumes a literal or quoted identifier; a doubled closer is an escape.
    fn delimited(&mut self, close: char) -> &'a str {
        let start = self.pos;
        self.advance();
        while let Some(c) = self.advance() {
            if c == close {
                if self.peek() == Some(close) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        &self.source[start..self.pos]
    }

    fn line_comment(&mut self) -> &'a str {
        self.take_while(|c| c != '\n')
    }

    fn block_comment(&mut self) -> &'a str {
        let start = self.pos;
        self.advance();
        self.advance();
        while let Some(c) = self.advance() {
            if c == '*' && self.peek() == Some('/') {
                self.advance();
                break;
            }
        }
        &self.source[start..self.pos]
    }

    fn system_variable(&mut self) -> &'a str {
        let start = self.pos;
        self.advance();
        self.advance();
        self.take_while(is_name_char);
        &self.source[start..self.pos]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{SqlServerDialect, SqliteDialect};

    #[test]
    fn test_rewrites_placeholders() {
        let statement = Statement::parse(
            "SELECT * FROM [Foo] WHERE [Id] = @Id AND [Name] = @name OR [Id] = @ID",
            &SqliteDialect::new(),
        );
        assert_eq!(
            statement.text(),
            "SELECT * FROM [Foo] WHERE [Id] = ?1 AND [Name] = ?2 OR [Id] = ?1"
        );
        assert_eq!(statement.parameters(), ["Id", "name"]);
    }

    #[test]
    fn test_keeps_named_form_for_sqlserver() {
        let sql = "UPDATE dbo.[Foo] SET [Name] = @Name WHERE [Id] = @Id";
        let statement = Statement::parse(sql, &SqlServerDialect::new());
        assert_eq!(statement.text(), sql);
        assert_eq!(statement.parameters(), ["Name", "Id"]);
    }

    #[test]
    fn test_skips_literals_and_comments() {
        let sql = "SELECT '@NotA' + 'it''s @Still' AS [@Col], \"@Quoted\" -- @Comment\n\
                   FROM T /* @Block */ WHERE x = @Real AND @@ROWCOUNT > 0";
        let statement = Statement::parse(sql, &SqliteDialect::new());
        assert_eq!(statement.parameters(), ["Real"]);
        assert_eq!(statement.text(), sql.replace("@Real", "?1"));
    }

    #[test]
    fn test_unterminated_literal() {
        let statement = Statement::parse("SELECT 'open @Name", &SqliteDialect::new());
        assert!(statement.parameters().is_empty());
        assert_eq!(statement.text(), "SELECT 'open @Name");
    }

    #[test]
    fn test_resolve_ignores_extra_values() {
        let statement = Statement::parse("WHERE [A] = @a", &SqliteDialect::new());
        let source = vec![("A", Value::Int(1)), ("Unused", Value::Text("x".into()))];

        let values = statement.resolve(Some(&source), &[]).unwrap();
        assert_eq!(values, [SqlValue::Int(1)]);
    }

    #[test]
    fn test_resolve_missing_parameter() {
        let statement = Statement::parse("WHERE [A] = @a", &SqliteDialect::new());
        let err = statement.resolve(None, &[]).unwrap_err();
        assert!(matches!(err, TomError::MissingParameter(ref name) if name == "a"));

        let values = statement.resolve(None, &[("A", Value::Bool(true))]).unwrap();
        assert_eq!(values, [SqlValue::Bit(true)]);
    }

    #[test]
    fn test_map_sources() {
        let mut map = HashMap::new();
        map.insert("Name".to_string(), Value::from("Created"));
        assert_eq!(
            map.parameter("NAME").unwrap(),
            Some(Value::Text("Created".into()))
        );
        assert_eq!(map.parameter("Other").unwrap(), None);

        let array = [("Id", Value::Int(3))];
        assert_eq!(array.parameter("id").unwrap(), Some(Value::Int(3)));
    }
}
