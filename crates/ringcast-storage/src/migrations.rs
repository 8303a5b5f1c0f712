// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded schema migrations, applied on open.

use ringcast_core::RingcastError;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Bring the view-state schema up to date.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), RingcastError> {
    let report = embedded::migrations::runner()
        .run(conn)
        .map_err(|e| RingcastError::Storage {
            source: Box::new(e),
        })?;
    for migration in report.applied_migrations() {
        tracing::debug!(version = migration.version(), name = migration.name(), "migration applied");
    }
    Ok(())
}
