// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only audit logs: forwarded messages and forwarding errors.
//!
//! Rows are only ever inserted; statistics are aggregate queries over the
//! full history.

use courier_core::CourierError;
use rusqlite::params;

use crate::database::{map_tr_err, now_rfc3339, Database};
use crate::models::{ErrorRecord, ForwardRecord, ForwardStats, NewForward};

/// Error messages are capped before insertion.
const ERROR_MESSAGE_MAX_CHARS: usize = 1_000;

/// Append a forwarded-message record.
pub async fn insert_forward(db: &Database, forward: &NewForward) -> Result<(), CourierError> {
    let forward = forward.clone();
    let now = now_rfc3339();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO forwarded_messages (rule_id, account_phone, source_chat_id, \
                 source_message_id, destination_chat_id, destination_message_id, \
                 message_text, forwarded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    forward.rule_id,
                    forward.account_phone,
                    forward.source_chat_id,
                    forward.source_message_id,
                    forward.destination_chat_id,
                    forward.destination_message_id,
                    forward.message_text,
                    now,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Append an error record. The message is truncated to a bounded length.
pub async fn insert_error(
    db: &Database,
    rule_id: Option<i64>,
    account_phone: Option<&str>,
    error_type: &str,
    error_message: &str,
) -> Result<(), CourierError> {
    let account_phone = account_phone.map(str::to_string);
    let error_type = error_type.to_string();
    let error_message: String = error_message.chars().take(ERROR_MESSAGE_MAX_CHARS).collect();
    let now = now_rfc3339();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO forwarding_errors (rule_id, account_phone, error_type, \
                 error_message, occurred_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![rule_id, account_phone, error_type, error_message, now],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Aggregate statistics, for one rule or across all rules.
pub async fn stats(db: &Database, rule_id: Option<i64>) -> Result<ForwardStats, CourierError> {
    db.connection()
        .call(move |conn| {
            let (message_where, error_where) = match rule_id {
                Some(_) => (" WHERE rule_id = ?1", " WHERE rule_id = ?1"),
                None => ("", ""),
            };

            let message_sql = format!(
                "SELECT COUNT(*), COUNT(DISTINCT destination_chat_id), \
                 MIN(forwarded_at), MAX(forwarded_at) FROM forwarded_messages{message_where}"
            );
            let error_sql = format!("SELECT COUNT(*) FROM forwarding_errors{error_where}");

            let map_row = |row: &rusqlite::Row<'_>| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            };

            let (total, unique, first, last) = match rule_id {
                Some(id) => conn.query_row(&message_sql, params![id], map_row)?,
                None => conn.query_row(&message_sql, [], map_row)?,
            };

            let total_errors: i64 = match rule_id {
                Some(id) => conn.query_row(&error_sql, params![id], |row| row.get(0))?,
                None => conn.query_row(&error_sql, [], |row| row.get(0))?,
            };

            Ok(ForwardStats {
                total_forwarded: total,
                unique_destinations: unique,
                first_forward: first,
                last_forward: last,
                total_errors,
            })
        })
        .await
        .map_err(map_tr_err)
}

fn row_to_forward(row: &rusqlite::Row<'_>) -> rusqlite::Result<ForwardRecord> {
    Ok(ForwardRecord {
        id: row.get(0)?,
        rule_id: row.get(1)?,
        account_phone: row.get(2)?,
        source_chat_id: row.get(3)?,
        source_message_id: row.get(4)?,
        destination_chat_id: row.get(5)?,
        destination_message_id: row.get(6)?,
        message_text: row.get(7)?,
        forwarded_at: row.get(8)?,
    })
}

/// Most recent forward records for a rule, newest first.
pub async fn list_forwards(
    db: &Database,
    rule_id: i64,
    limit: i64,
) -> Result<Vec<ForwardRecord>, CourierError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, rule_id, account_phone, source_chat_id, source_message_id, \
                 destination_chat_id, destination_message_id, message_text, forwarded_at \
                 FROM forwarded_messages WHERE rule_id = ?1 ORDER BY id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![rule_id, limit], row_to_forward)?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
        .await
        .map_err(map_tr_err)
}

fn row_to_error(row: &rusqlite::Row<'_>) -> rusqlite::Result<ErrorRecord> {
    Ok(ErrorRecord {
        id: row.get(0)?,
        rule_id: row.get(1)?,
        account_phone: row.get(2)?,
        error_type: row.get(3)?,
        error_message: row.get(4)?,
        occurred_at: row.get(5)?,
    })
}

/// Most recent error records, optionally scoped to one rule, newest first.
pub async fn list_errors(
    db: &Database,
    rule_id: Option<i64>,
    limit: i64,
) -> Result<Vec<ErrorRecord>, CourierError> {
    db.connection()
        .call(move |conn| {
            let mut records = Vec::new();
            match rule_id {
                Some(id) => {
                    let mut stmt = conn.prepare(
                        "SELECT id, rule_id, account_phone, error_type, error_message, \
                         occurred_at FROM forwarding_errors WHERE rule_id = ?1 \
                         ORDER BY id DESC LIMIT ?2",
                    )?;
                    let rows = stmt.query_map(params![id, limit], row_to_error)?;
                    for row in rows {
                        records.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT id, rule_id, account_phone, error_type, error_message, \
                         occurred_at FROM forwarding_errors ORDER BY id DESC LIMIT ?1",
                    )?;
                    let rows = stmt.query_map(params![limit], row_to_error)?;
                    for row in rows {
                        records.push(row?);
                    }
                }
            }
            Ok(records)
        })
        .await
        .map_err(map_tr_err)
}
