//! SQL statements issued by the engine
//!
//! Declared DDL is passed through verbatim; only the statements below are
//! generated here.

use ddlsync_core::model::quote_literal;
use ddlsync_core::PartitionSnapshot;

/// Largest query string the query service accepts, in UTF-8 bytes
pub const MAX_QUERY_BYTES: usize = 262_144;

/// Quote an identifier with backticks
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

pub fn drop_statement(table: &str, is_view: bool) -> String {
    let kind = if is_view { "VIEW" } else { "TABLE" };
    format!("DROP {} IF EXISTS {}", kind, quote_identifier(table))
}

pub fn show_create_statement(table: &str, is_view: bool) -> String {
    let kind = if is_view { "VIEW" } else { "TABLE" };
    format!("SHOW CREATE {} {}", kind, quote_identifier(table))
}

/// `PARTITION (k = 'v', ...) LOCATION '...'`
pub fn partition_clause(partition: &PartitionSnapshot) -> String {
    let values: Vec<String> = partition
        .values
        .iter()
        .map(|(key, value)| format!("{} = {}", quote_identifier(key), quote_literal(value)))
        .collect();

    format!(
        "PARTITION ({}) LOCATION {}",
        values.join(", "),
        quote_literal(&partition.location)
    )
}

/// Batch partitions into `ALTER TABLE ... ADD IF NOT EXISTS` statements
///
/// Clauses are appended greedily; when the next clause would push the
/// statement past `max_bytes`, the statement is closed and a new one starts
/// with that clause. A clause that is too large on its own still gets a
/// statement of its own.
pub fn add_partition_statements(
    table: &str,
    partitions: &[PartitionSnapshot],
    max_bytes: usize,
) -> Vec<String> {
    let header = format!("ALTER TABLE {} ADD IF NOT EXISTS", quote_identifier(table));
    let mut statements = Vec::new();
    let mut current = header.clone();

    for partition in partitions {
        let clause = partition_clause(partition);
        let has_clauses = current.len() > header.len();

        if has_clauses && current.len() + 1 + clause.len() > max_bytes {
            statements.push(std::mem::replace(&mut current, header.clone()));
        }

        current.push('\n');
        current.push_str(&clause);
    }

    if current.len() > header.len() {
        statements.push(current);
    }

    statements
}
