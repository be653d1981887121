use std::sync::Arc;

use crate::commands::CommandResult;
use leadflow_core::config::{AppConfig, LoadOptions};
use leadflow_db::repositories::{
    SqlClientRepository, SqlInvitationRepository, SqlLeadRepository,
};
use leadflow_db::{connect_with_settings, migrations};
use leadflow_sync::{BackfillRunner, Reconciler};

pub fn run(cursor: i64, limit: u32, pages: u32) -> CommandResult {
    if limit == 0 {
        return CommandResult::failure(
            "backfill",
            "invalid_arguments",
            "limit must be at least 1",
            2,
        );
    }

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "backfill",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "backfill",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let reconciler = Reconciler::new(
            Arc::new(SqlClientRepository::new(pool.clone())),
            Arc::new(SqlLeadRepository::new(pool.clone())),
        );
        let runner =
            BackfillRunner::new(Arc::new(SqlInvitationRepository::new(pool.clone())), reconciler);

        let mut next_cursor = cursor;
        let mut scanned = 0u64;
        let mut updated = 0u64;
        let mut skipped = 0u64;
        let mut pages_done = 0u32;

        loop {
            let page = runner
                .run(next_cursor, limit)
                .await
                .map_err(|error| ("backfill", error.to_string(), 6u8))?;
            next_cursor = page.next_cursor;
            scanned += page.scanned;
            updated += page.counts.updated + page.counts.mismatch_warning;
            skipped += page.counts.skipped_non_relation;
            pages_done += 1;

            if !page.has_more || (pages != 0 && pages_done >= pages) {
                break;
            }
        }

        pool.close().await;
        Ok::<(i64, u64, u64, u64, u32), (&'static str, String, u8)>((
            next_cursor,
            scanned,
            updated,
            skipped,
            pages_done,
        ))
    });

    match result {
        Ok((next_cursor, scanned, updated, skipped, pages_done)) => CommandResult::success(
            "backfill",
            format!(
                "scanned {scanned} invitation(s) across {pages_done} page(s): \
                 {updated} lead(s) updated, {skipped} skipped; next cursor {next_cursor}"
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("backfill", error_class, message, exit_code)
        }
    }
}
