//! Load-time tables and post-load indexes.
#![forbid(unsafe_code)]

use rusqlite::{Connection, Transaction};

use super::SqliteSinkError;

/// Create the six target tables if missing.
///
/// Tables carry no keys or indexes so appends stay cheap; see
/// [`create_indexes`].
pub(super) fn bootstrap(connection: &mut Connection) -> Result<(), SqliteSinkError> {
    in_transaction(connection, |transaction| {
        run_migration_step(
            transaction,
            "create users",
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER NOT NULL,
                name TEXT NOT NULL
            )",
        )?;
        run_migration_step(
            transaction,
            "create nodes",
            "CREATE TABLE IF NOT EXISTS nodes (
                id INTEGER NOT NULL,
                version INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                tstamp INTEGER,
                changeset_id INTEGER NOT NULL,
                point TEXT NOT NULL,
                tags TEXT NOT NULL
            )",
        )?;
        run_migration_step(
            transaction,
            "create ways",
            "CREATE TABLE IF NOT EXISTS ways (
                id INTEGER NOT NULL,
                version INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                tstamp INTEGER,
                changeset_id INTEGER NOT NULL,
                tags TEXT NOT NULL
            )",
        )?;
        run_migration_step(
            transaction,
            "create way_nodes",
            "CREATE TABLE IF NOT EXISTS way_nodes (
                way_id INTEGER NOT NULL,
                node_id INTEGER NOT NULL,
                sequence_id INTEGER NOT NULL
            )",
        )?;
        run_migration_step(
            transaction,
            "create relations",
            "CREATE TABLE IF NOT EXISTS relations (
                id INTEGER NOT NULL,
                version INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                tstamp INTEGER,
                changeset_id INTEGER NOT NULL,
                tags TEXT NOT NULL
            )",
        )?;
        run_migration_step(
            transaction,
            "create relation_members",
            "CREATE TABLE IF NOT EXISTS relation_members (
                relation_id INTEGER NOT NULL,
                member_id INTEGER NOT NULL,
                member_type TEXT NOT NULL CHECK (member_type IN ('Node', 'Way', 'Relation')),
                member_role TEXT NOT NULL,
                sequence_id INTEGER NOT NULL
            )",
        )
    })
}

/// Build lookup indexes once the bulk load has finished.
///
/// `users.id` stays non-unique: users are only deduplicated per flush window.
pub(super) fn create_indexes(connection: &mut Connection) -> Result<(), SqliteSinkError> {
    in_transaction(connection, |transaction| {
        run_migration_step(
            transaction,
            "index users",
            "CREATE INDEX IF NOT EXISTS idx_users_id ON users(id)",
        )?;
        run_migration_step(
            transaction,
            "index nodes",
            "CREATE INDEX IF NOT EXISTS idx_nodes_id ON nodes(id)",
        )?;
        run_migration_step(
            transaction,
            "index ways",
            "CREATE INDEX IF NOT EXISTS idx_ways_id ON ways(id)",
        )?;
        run_migration_step(
            transaction,
            "index way_nodes",
            "CREATE INDEX IF NOT EXISTS idx_way_nodes_way
                ON way_nodes(way_id, sequence_id)",
        )?;
        run_migration_step(
            transaction,
            "index way_nodes by node",
            "CREATE INDEX IF NOT EXISTS idx_way_nodes_node ON way_nodes(node_id)",
        )?;
        run_migration_step(
            transaction,
            "index relations",
            "CREATE INDEX IF NOT EXISTS idx_relations_id ON relations(id)",
        )?;
        run_migration_step(
            transaction,
            "index relation_members",
            "CREATE INDEX IF NOT EXISTS idx_relation_members_relation
                ON relation_members(relation_id, sequence_id)",
        )
    })
}

fn in_transaction(
    connection: &mut Connection,
    steps: impl FnOnce(&Transaction<'_>) -> Result<(), SqliteSinkError>,
) -> Result<(), SqliteSinkError> {
    let transaction = connection
        .transaction()
        .map_err(|source| SqliteSinkError::Migration {
            step: "begin schema transaction",
            source,
        })?;
    steps(&transaction)?;
    transaction
        .commit()
        .map_err(|source| SqliteSinkError::Migration {
            step: "commit schema transaction",
            source,
        })
}

fn run_migration_step(
    transaction: &Transaction<'_>,
    step: &'static str,
    sql: &str,
) -> Result<(), SqliteSinkError> {
    transaction
        .execute(sql, [])
        .map(|_| ())
        .map_err(|source| SqliteSinkError::Migration { step, source })
}
