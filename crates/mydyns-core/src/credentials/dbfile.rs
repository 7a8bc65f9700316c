//! Line parser shared by the flat credential databases
//!
//! Every database is a list of `key:value` records, one per line.
//! Blank lines and lines starting with `#` are skipped, and leading
//! whitespace of both fields is trimmed.

use crate::error::{Error, Result};

/// A single `key:value` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DbRecord<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

/// Split database contents into records
///
/// `source` names the database in error messages.
pub(crate) fn parse_records<'a>(contents: &'a str, source: &str) -> Result<Vec<DbRecord<'a>>> {
    let mut records = Vec::new();

    for (index, raw) in contents.lines().enumerate() {
        let line = raw.trim_start();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once(':').ok_or_else(|| {
            Error::config(format!(
                "{} line {}: expected 'name:value' record",
                source,
                index + 1
            ))
        })?;

        let key = key.trim_end();
        if key.is_empty() {
            return Err(Error::config(format!(
                "{} line {}: empty name",
                source,
                index + 1
            )));
        }

        records.push(DbRecord {
            key,
            value: value.trim_start().trim_end_matches(['\r', '\n']),
        });
    }

    Ok(records)
}
