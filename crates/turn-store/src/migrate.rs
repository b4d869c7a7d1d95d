//! A small hand-rolled migration runner, embedding the `.sql` files under
//! `migrations/` into the binary and applying any not yet recorded in
//! `_turn_store_migrations`. Mirrors the shape of `rivet-migrate`: embed
//! with `include_dir`, track applied filenames in a table, apply the rest
//! in lexical order inside one transaction each (SPEC_FULL §2.1).

use include_dir::{include_dir, Dir};
use sqlx::PgPool;

use crate::error::StoreError;

static MIGRATIONS_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/migrations");

#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS _turn_store_migrations (
			filename TEXT PRIMARY KEY,
			applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
		)",
	)
	.execute(pool)
	.await?;

	let mut files: Vec<_> = MIGRATIONS_DIR.files().collect();
	files.sort_by_key(|f| f.path().to_owned());

	for file in files {
		let name = file.path().to_string_lossy().to_string();
		let already_applied: Option<(String,)> =
			sqlx::query_as("SELECT filename FROM _turn_store_migrations WHERE filename = $1")
				.bind(&name)
				.fetch_optional(pool)
				.await?;
		if already_applied.is_some() {
			continue;
		}

		let sql = file.contents_utf8().ok_or_else(|| {
			StoreError::Backend(sqlx::Error::Protocol(format!("migration {name} is not valid utf-8")))
		})?;

		tracing::info!(migration = %name, "applying migration");
		let mut tx = pool.begin().await?;
		sqlx::raw_sql(sql).execute(&mut *tx).await?;
		sqlx::query("INSERT INTO _turn_store_migrations (filename) VALUES ($1)")
			.bind(&name)
			.execute(&mut *tx)
			.await?;
		tx.commit().await?;
	}

	Ok(())
}
