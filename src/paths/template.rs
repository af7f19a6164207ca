//! strftime + named-field templates.
//!
//! `%{field}`, `%<field>s` and `%<field>d` substitute a named value, `%%` is
//! a literal percent and any other `%` specifier is handed to chrono. Field
//! values are inserted verbatim and never re-read as specifiers.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset};
use std::fmt::Write;

use crate::error::{Error, Result};

/// Source of named values for `%{field}` substitution.
pub trait Fields {
    fn field(&self, name: &str) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Time(String),
    Field(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

const STRFTIME_MODIFIERS: &str = "-_0^#:.123456789";

impl Template {
    /// Parse `source`, rejecting unknown field names and specifiers chrono
    /// cannot format.
    pub fn parse(source: &str, fields: &[&str]) -> Result<Self> {
        let invalid = |reason: String| Error::Template {
            template: source.to_string(),
            reason,
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }

            match chars.next() {
                None => return Err(invalid("trailing '%'".to_string())),
                Some('%') => literal.push('%'),
                Some(open @ ('{' | '<')) => {
                    let close = if open == '{' { '}' } else { '>' };
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some(ch) if ch == close => break,
                            Some(ch) => name.push(ch),
                            None => return Err(invalid(format!("unterminated field {:?}", name))),
                        }
                    }
                    if open == '<' {
                        // sprintf-style conversion suffix
                        if let Some(&('s' | 'd')) = chars.peek() {
                            chars.next();
                        }
                    }
                    if !fields.contains(&name.as_str()) {
                        return Err(invalid(format!(
                            "unknown field {:?} (available: {})",
                            name,
                            fields.join(", ")
                        )));
                    }
                    flush_literal(&mut literal, &mut segments);
                    segments.push(Segment::Field(name));
                }
                Some(first) => {
                    let mut spec = String::from('%');
                    let mut ch = first;
                    while STRFTIME_MODIFIERS.contains(ch) {
                        spec.push(ch);
                        ch = chars
                            .next()
                            .ok_or_else(|| invalid(format!("incomplete specifier {:?}", spec)))?;
                    }
                    spec.push(ch);
                    if StrftimeItems::new(&spec).any(|item| matches!(item, Item::Error)) {
                        return Err(invalid(format!("unsupported specifier {:?}", spec)));
                    }
                    flush_literal(&mut literal, &mut segments);
                    segments.push(Segment::Time(spec));
                }
            }
        }
        flush_literal(&mut literal, &mut segments);

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn render(&self, time: &DateTime<FixedOffset>, fields: &dyn Fields) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Time(spec) => {
                    let _ = write!(out, "{}", time.format(spec));
                }
                Segment::Field(name) => {
                    let value = fields.field(name).unwrap_or_default();
                    out.push_str(&value.replace('/', "_"));
                }
            }
        }
        out
    }
}

fn flush_literal(literal: &mut String, segments: &mut Vec<Segment>) {
    if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(literal)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    struct Map(HashMap<&'static str, &'static str>);

    impl Fields for Map {
        fn field(&self, name: &str) -> Option<String> {
            self.0.get(name).map(|v| v.to_string())
        }
    }

    fn noon_2024_03_15() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 15, 12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_strftime_and_fields() {
        let template = Template::parse("%Y-%m %{name}", &["name"]).unwrap();
        let fields = Map(HashMap::from([("name", "Birthday")]));
        assert_eq!(template.render(&noon_2024_03_15(), &fields), "2024-03 Birthday");
    }

    #[test]
    fn test_sprintf_style_fields() {
        let template = Template::parse("%<id>d-%<title>s", &["id", "title"]).unwrap();
        let fields = Map(HashMap::from([("id", "7"), ("title", "Cake")]));
        assert_eq!(template.render(&noon_2024_03_15(), &fields), "7-Cake");
    }

    #[test]
    fn test_field_values_are_not_reinterpreted() {
        let template = Template::parse("%{title}", &["title"]).unwrap();
        let fields = Map(HashMap::from([("title", "100%Y a/b")]));
        assert_eq!(template.render(&noon_2024_03_15(), &fields), "100%Y a_b");
    }

    #[test]
    fn test_percent_escape_and_modifiers() {
        let template = Template::parse("%%%-d %a", &[]).unwrap();
        assert_eq!(template.render(&noon_2024_03_15(), &Map(HashMap::new())), "%15 Fri");
    }

    #[test]
    fn test_missing_field_renders_empty() {
        let template = Template::parse("[%{comment}]", &["comment"]).unwrap();
        assert_eq!(template.render(&noon_2024_03_15(), &Map(HashMap::new())), "[]");
    }

    #[test]
    fn test_parse_errors() {
        assert!(Template::parse("%{nope}", &["id"]).is_err());
        assert!(Template::parse("%{id", &["id"]).is_err());
        assert!(Template::parse("abc%", &[]).is_err());
        assert!(Template::parse("%Q", &[]).is_err());
    }
}
