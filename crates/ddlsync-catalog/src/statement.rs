//! Recognizer for the statements the engine submits
//!
//! This is not a SQL parser. It recognizes the handful of DDL shapes the
//! in-memory catalog needs to simulate, and reports anything else as
//! [`Statement::Other`].

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Identifier, optionally database-qualified, quoted with backticks or
/// double quotes or bare
const NAME: &str = r#"((?:`[^`]+`|"[^"]+"|[\w$]+)(?:\.(?:`[^`]+`|"[^"]+"|[\w$]+))?)"#;

/// Contents of a single-quoted literal, with '' escapes
const LITERAL: &str = r"'((?:[^']|'')*)'";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QualifiedName {
    pub database: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Statement {
    CreateDatabase {
        name: String,
        if_not_exists: bool,
        comment: Option<String>,
        location: Option<String>,
        properties: BTreeMap<String, String>,
    },
    CreateTable {
        table: QualifiedName,
        view: bool,
        external: bool,
        if_not_exists: bool,
        or_replace: bool,
        partition_keys: Vec<String>,
    },
    Drop {
        table: QualifiedName,
        view: bool,
        if_exists: bool,
    },
    ShowCreate {
        table: QualifiedName,
    },
    AddPartitions {
        table: QualifiedName,
        partitions: Vec<(Vec<(String, String)>, Option<String>)>,
    },
    Other,
}

fn regex(cell: &'static OnceLock<Regex>, pattern: impl FnOnce() -> String) -> &'static Regex {
    cell.get_or_init(|| Regex::new(&pattern()).expect("statement pattern is valid"))
}

fn create_database_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, || {
        format!(r"(?is)^\s*CREATE\s+(?:DATABASE|SCHEMA)\s+(IF\s+NOT\s+EXISTS\s+)?{NAME}")
    })
}

fn create_table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, || {
        format!(
            r"(?is)^\s*CREATE\s+(OR\s+REPLACE\s+)?(EXTERNAL\s+)?(TABLE|VIEW)\s+(IF\s+NOT\s+EXISTS\s+)?{NAME}"
        )
    })
}

fn drop_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, || format!(r"(?is)^\s*DROP\s+(TABLE|VIEW)\s+(IF\s+EXISTS\s+)?{NAME}"))
}

fn show_create_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, || format!(r"(?is)^\s*SHOW\s+CREATE\s+(?:TABLE|VIEW)\s+{NAME}"))
}

fn add_partition_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, || {
        format!(r"(?is)^\s*ALTER\s+TABLE\s+{NAME}\s+ADD\s+(?:IF\s+NOT\s+EXISTS\s+)?(.*)$")
    })
}

fn partition_clause_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, || {
        format!(r"(?is)PARTITION\s*\(((?:[^)']|{LITERAL})*)\)(?:\s*LOCATION\s+{LITERAL})?")
    })
}

fn key_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, || format!(r"(?s)([`\w]+)\s*=\s*{LITERAL}"))
}

fn partitioned_by_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, || r"(?is)PARTITIONED\s+BY\s*\(([^)]*)\)".to_string())
}

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, || format!(r"(?is)\bCOMMENT\s+{LITERAL}"))
}

fn location_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, || format!(r"(?is)\bLOCATION\s+{LITERAL}"))
}

fn dbproperties_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, || r"(?is)WITH\s+DBPROPERTIES\s*\((.*)\)".to_string())
}

fn property_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, || format!(r"(?s){LITERAL}\s*=\s*{LITERAL}"))
}

fn unquote_literal(s: &str) -> String {
    s.replace("''", "'")
}

fn unquote_identifier(s: &str) -> String {
    s.trim_matches(|c| c == '`' || c == '"').to_lowercase()
}

fn parse_name(raw: &str) -> QualifiedName {
    let re = name_split_re();
    let parts: Vec<String> = re
        .find_iter(raw)
        .map(|m| unquote_identifier(m.as_str()))
        .collect();

    match parts.as_slice() {
        [database, name] => QualifiedName {
            database: Some(database.clone()),
            name: name.clone(),
        },
        _ => QualifiedName {
            database: None,
            name: parts.into_iter().last().unwrap_or_default(),
        },
    }
}

fn name_split_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, || r#"`[^`]+`|"[^"]+"|[\w$]+"#.to_string())
}

impl Statement {
    pub(crate) fn parse(sql: &str) -> Statement {
        if let Some(caps) = create_database_re().captures(sql) {
            let properties = dbproperties_re()
                .captures(sql)
                .map(|c| {
                    property_re()
                        .captures_iter(&c[1])
                        .map(|p| (unquote_literal(&p[1]), unquote_literal(&p[2])))
                        .collect()
                })
                .unwrap_or_default();

            return Statement::CreateDatabase {
                name: parse_name(&caps[2]).name,
                if_not_exists: caps.get(1).is_some(),
                comment: comment_re().captures(sql).map(|c| unquote_literal(&c[1])),
                location: location_re().captures(sql).map(|c| unquote_literal(&c[1])),
                properties,
            };
        }

        if let Some(caps) = create_table_re().captures(sql) {
            let partition_keys = partitioned_by_re()
                .captures(sql)
                .map(|c| {
                    c[1].split(',')
                        .filter_map(|col| col.split_whitespace().next())
                        .map(unquote_identifier)
                        .collect()
                })
                .unwrap_or_default();

            return Statement::CreateTable {
                table: parse_name(&caps[5]),
                view: caps[3].eq_ignore_ascii_case("VIEW"),
                external: caps.get(2).is_some(),
                if_not_exists: caps.get(4).is_some(),
                or_replace: caps.get(1).is_some(),
                partition_keys,
            };
        }

        if let Some(caps) = drop_re().captures(sql) {
            return Statement::Drop {
                table: parse_name(&caps[3]),
                view: caps[1].eq_ignore_ascii_case("VIEW"),
                if_exists: caps.get(2).is_some(),
            };
        }

        if let Some(caps) = show_create_re().captures(sql) {
            return Statement::ShowCreate {
                table: parse_name(&caps[1]),
            };
        }

        if let Some(caps) = add_partition_re().captures(sql) {
            let partitions = partition_clause_re()
                .captures_iter(&caps[2])
                .map(|p| {
                    let values = key_value_re()
                        .captures_iter(&p[1])
                        .map(|kv| (unquote_identifier(&kv[1]), unquote_literal(&kv[2])))
                        .collect();
                    let location = p.get(3).map(|l| unquote_literal(l.as_str()));
                    (values, location)
                })
                .collect();

            return Statement::AddPartitions {
                table: parse_name(&caps[1]),
                partitions,
            };
        }

        Statement::Other
    }
}
