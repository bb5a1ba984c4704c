//! SQLite schema introspection.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use rusqlite::{Connection, OpenFlags};

use super::{Column, ConstraintDef, ConstraintKind, IndexDef, Relationship, Schema, Table, TableRelationships};
use crate::diagnostic::{GeneratorError, Result};
use crate::naming::association_name;

/// Bookkeeping tables never turned into models.
const IGNORED_TABLES: &[&str] = &["schema_migrations", "ar_internal_metadata"];

/// Opens the database read-only and introspects it.
pub fn introspect_path(path: &Path) -> Result<Schema> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| extraction(format!("cannot open {}: {}", path.display(), e)))?;
    introspect(&conn)
}

/// Introspects every user table of an open connection.
pub fn introspect(conn: &Connection) -> Result<Schema> {
    let mut schema = Schema::default();

    for (name, ddl) in list_tables(conn)? {
        let columns = table_columns(conn, &name)?;
        schema.tables.push(Table::new(name.clone(), columns));

        let (belongs_to, fk_constraints) = foreign_keys(conn, &name)?;
        schema.relationships.insert(
            name.clone(),
            TableRelationships {
                belongs_to,
                ..Default::default()
            },
        );

        let indexes = table_indexes(conn, &name)?;
        let mut constraints: Vec<ConstraintDef> = indexes
            .iter()
            .filter(|i| i.unique)
            .map(|i| ConstraintDef {
                name: Some(i.name.clone()),
                kind: ConstraintKind::Unique,
                columns: i.columns.clone(),
                expression: None,
            })
            .collect();
        constraints.extend(fk_constraints);
        constraints.extend(check_constraints(ddl.as_deref().unwrap_or("")));

        schema.indexes.insert(name.clone(), indexes);
        schema.constraints.insert(name, constraints);
    }

    Ok(schema)
}

fn extraction(message: String) -> GeneratorError {
    GeneratorError::SchemaExtraction { message }
}

fn sql_err(e: rusqlite::Error) -> GeneratorError {
    extraction(e.to_string())
}

fn list_tables(conn: &Connection) -> Result<Vec<(String, Option<String>)>> {
    let mut stmt = conn
        .prepare(
            "SELECT name, sql FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .map_err(sql_err)?;

    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)))
        .map_err(sql_err)?;

    let mut tables = Vec::new();
    for row in rows {
        let (name, sql) = row.map_err(sql_err)?;
        if !IGNORED_TABLES.contains(&name.as_str()) {
            tables.push((name, sql));
        }
    }
    Ok(tables)
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<Column>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info(\"{}\")", table))
        .map_err(sql_err)?;

    // cid, name, type, notnull, dflt_value, pk
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })
        .map_err(sql_err)?;

    let mut columns = Vec::new();
    for row in rows {
        let (name, data_type, notnull, default, pk) = row.map_err(sql_err)?;
        let mut column = Column::new(name, data_type);
        if notnull != 0 {
            column = column.not_null();
        }
        if pk != 0 {
            column = column.primary_key();
        }
        if let Some(default) = default {
            column = column.with_default(serde_json::Value::String(default));
        }
        columns.push(column);
    }
    Ok(columns)
}

fn foreign_keys(conn: &Connection, table: &str) -> Result<(Vec<Relationship>, Vec<ConstraintDef>)> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA foreign_key_list(\"{}\")", table))
        .map_err(sql_err)?;

    // id, seq, table, from, to, on_update, on_delete, match
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(2)?, row.get::<_, String>(3)?)))
        .map_err(sql_err)?;

    let mut relationships = Vec::new();
    let mut constraints = Vec::new();
    for row in rows {
        let (target, from) = row.map_err(sql_err)?;
        relationships.push(Relationship::new(association_name(&from), target.clone()).with_foreign_key(from.clone()));
        constraints.push(ConstraintDef {
            name: None,
            kind: ConstraintKind::ForeignKey,
            columns: vec![from],
            expression: Some(format!("REFERENCES {}", target)),
        });
    }
    Ok((relationships, constraints))
}

fn table_indexes(conn: &Connection, table: &str) -> Result<Vec<IndexDef>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA index_list(\"{}\")", table))
        .map_err(sql_err)?;

    // seq, name, unique, origin, partial
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, i64>(2)?)))
        .map_err(sql_err)?;

    let mut listed = Vec::new();
    for row in rows {
        listed.push(row.map_err(sql_err)?);
    }

    let mut indexes = Vec::new();
    for (name, unique) in listed {
        let mut info = conn
            .prepare(&format!("PRAGMA index_info(\"{}\")", name))
            .map_err(sql_err)?;
        // seqno, cid, name
        let cols = info
            .query_map([], |row| row.get::<_, Option<String>>(2))
            .map_err(sql_err)?;

        let mut columns = Vec::new();
        for col in cols {
            if let Some(col) = col.map_err(sql_err)? {
                columns.push(col);
            }
        }
        indexes.push(IndexDef {
            name,
            columns,
            unique: unique != 0,
        });
    }
    Ok(indexes)
}

fn check_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)\bCHECK\s*\(\s*["`]?(\w+)["`]?\s+IN\s*\(([^)]*)\)\s*\)"#).ok())
        .as_ref()
}

/// Extracts `CHECK (col IN (...))` constraints from a CREATE TABLE statement.
fn check_constraints(ddl: &str) -> Vec<ConstraintDef> {
    let Some(regex) = check_regex() else {
        return Vec::new();
    };
    let mut seen = BTreeSet::new();
    regex
        .captures_iter(ddl)
        .filter(|caps| seen.insert(caps[1].to_string()))
        .map(|caps| ConstraintDef {
            name: None,
            kind: ConstraintKind::Check,
            columns: vec![caps[1].to_string()],
            expression: Some(format!("{} IN ({})", &caps[1], &caps[2])),
        })
        .collect()
}
