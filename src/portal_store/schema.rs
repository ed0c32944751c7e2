//! Versioned schema for the portal database.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};

/// V 0
const USER_TABLE_V_0: Table = Table {
    name: "user",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

const EVENT_TABLE_V_0: Table = Table {
    name: "event",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("description", &SqlType::Text),
        sqlite_column!("date", &SqlType::Text, non_null = true),
        sqlite_column!("time", &SqlType::Text),
        sqlite_column!("location", &SqlType::Text),
        sqlite_column!("image_url", &SqlType::Text),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_event_date", "date")],
    unique_constraints: &[],
};

const EVENT_REGISTRATION_TABLE_V_0: Table = Table {
    name: "event_registration",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "user",
                foreign_column: "id",
            })
        ),
        sqlite_column!(
            "event_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "event",
                foreign_column: "id",
            })
        ),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_event_registration_user_id", "user_id")],
    unique_constraints: &[&["user_id", "event_id"]],
};

const ANNOUNCEMENT_TABLE_V_0: Table = Table {
    name: "announcement",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("content", &SqlType::Text, non_null = true),
        sqlite_column!("image_url", &SqlType::Text),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_announcement_created", "created")],
    unique_constraints: &[],
};

/// The unique constraint on (user_id, reference_id, kind) is the dedup key:
/// concurrent generation passes collapse into no-op conflicts instead of
/// duplicate rows. Tracker rows have a NULL reference_id and are exempt.
const NOTIFICATION_TABLE_V_0: Table = Table {
    name: "notification",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true, non_null = true),
        sqlite_column!(
            "user_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "user",
                foreign_column: "id",
            })
        ),
        sqlite_column!("kind", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("content", &SqlType::Text, non_null = true),
        sqlite_column!("reference_id", &SqlType::Text),
        sqlite_column!("read", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("image_url", &SqlType::Text),
        sqlite_column!("action_url", &SqlType::Text),
        sqlite_column!("metadata", &SqlType::Text),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_notification_user_id", "user_id")],
    unique_constraints: &[&["user_id", "reference_id", "kind"]],
};

pub const VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        USER_TABLE_V_0,
        EVENT_TABLE_V_0,
        EVENT_REGISTRATION_TABLE_V_0,
        ANNOUNCEMENT_TABLE_V_0,
        NOTIFICATION_TABLE_V_0,
    ],
    migration: None,
}];
