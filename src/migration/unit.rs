//! Migration units and their on-disk format.
//!
//! A unit is one `.sql` file. Files may split into sections with
//! `-- +migrate Up` and `-- +migrate Down`; only the Up section is applied.
//! A file without any section marker is applied whole.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::Path;

const MARKER: &str = "-- +migrate";

/// One named change script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationUnit {
    /// File name, used as the ledger key.
    pub name: String,
    /// Statements applied on the way up.
    pub up_sql: String,
}

impl MigrationUnit {
    pub fn parse(name: impl Into<String>, content: &str) -> Self {
        Self {
            name: name.into(),
            up_sql: up_section(content),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Up,
    Down,
}

fn up_section(content: &str) -> String {
    let mut section = Section::Preamble;
    let mut saw_marker = false;
    let mut preamble = String::new();
    let mut up = String::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(directive) = trimmed.strip_prefix(MARKER) {
            saw_marker = true;
            match directive.split_whitespace().next() {
                Some("Up") => section = Section::Up,
                Some("Down") => section = Section::Down,
                // StatementBegin/StatementEnd only matter to statement splitting,
                // which the store leaves to the server.
                _ => {}
            }
            continue;
        }

        let target = match section {
            Section::Preamble => &mut preamble,
            Section::Up => &mut up,
            Section::Down => continue,
        };
        target.push_str(line);
        target.push('\n');
    }

    if saw_marker {
        up
    } else {
        preamble
    }
}

/// Read every `.sql` unit in `dir`, sorted into application order.
pub fn load_units(dir: &Path) -> io::Result<Vec<MigrationUnit>> {
    let mut units = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            tracing::warn!(file = ?file_name, "Skipping migration with non UTF-8 name");
            continue;
        };
        if !name.ends_with(".sql") {
            continue;
        }
        let content = fs::read_to_string(entry.path())?;
        units.push(MigrationUnit::parse(name, &content));
    }

    units.sort_by(|a, b| compare_unit_names(&a.name, &b.name));
    Ok(units)
}

/// Application order of two unit names.
///
/// Names with a numeric prefix come first and sort by that number; ties and
/// names without a prefix fall back to plain string order.
pub fn compare_unit_names(a: &str, b: &str) -> Ordering {
    match (numeric_prefix(a), numeric_prefix(b)) {
        (Some(x), Some(y)) => compare_digits(x, y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn numeric_prefix(name: &str) -> Option<&str> {
    let end = name
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(name.len());
    (end > 0).then(|| &name[..end])
}

/// Compare two digit strings by value without parsing them.
fn compare_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn up_section_only() {
        let unit = MigrationUnit::parse(
            "1_users.sql",
            "-- +migrate Up\nCREATE TABLE users (id int);\n\n-- +migrate Down\nDROP TABLE users;\n",
        );
        assert_eq!(unit.up_sql.trim(), "CREATE TABLE users (id int);");
    }

    #[test]
    fn unmarked_file_is_applied_whole() {
        let unit = MigrationUnit::parse("seed.sql", "INSERT INTO roles VALUES (1);\n");
        assert_eq!(unit.up_sql, "INSERT INTO roles VALUES (1);\n");
    }

    #[test]
    fn statement_markers_are_dropped() {
        let unit = MigrationUnit::parse(
            "2_fn.sql",
            "-- +migrate Up\n-- +migrate StatementBegin\nCREATE FUNCTION f() RETURNS int AS $$ SELECT 1 $$ LANGUAGE sql;\n-- +migrate StatementEnd\n",
        );
        assert!(!unit.up_sql.contains("StatementBegin"));
        assert!(unit.up_sql.contains("CREATE FUNCTION"));
    }

    #[test]
    fn down_only_file_has_empty_up() {
        let unit = MigrationUnit::parse("3.sql", "-- +migrate Down\nDROP TABLE x;\n");
        assert!(unit.up_sql.is_empty());
    }

    #[test]
    fn numeric_prefixes_sort_by_value() {
        let mut names = vec!["10_orders.sql", "2_items.sql", "1_users.sql", "init.sql", "002_b.sql"];
        names.sort_by(|a, b| compare_unit_names(a, b));
        assert_eq!(names, vec!["1_users.sql", "002_b.sql", "2_items.sql", "10_orders.sql", "init.sql"]);
    }

    #[test]
    fn long_prefixes_do_not_overflow() {
        assert_eq!(
            compare_unit_names("20250101120000000000000_a.sql", "9_b.sql"),
            Ordering::Greater
        );
    }

    #[test]
    fn loads_sql_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("10_b.sql"), "SELECT 10;").unwrap();
        fs::write(dir.path().join("9_a.sql"), "SELECT 9;").unwrap();
        fs::write(dir.path().join("README.md"), "not a migration").unwrap();
        fs::create_dir(dir.path().join("11_dir.sql")).unwrap();

        let names: Vec<_> = load_units(dir.path())
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["9_a.sql", "10_b.sql"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(load_units(Path::new("/nonexistent/migrations")).is_err());
    }
}
