use rusqlite::Connection;

/// Initialize the license store schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;

        -- One row per processed checkout (or failed webhook, status = 'error').
        -- stripe_event_id / payment_intent / checkout_session are the idempotency keys;
        -- error rows leave them NULL so a provider retry can still succeed.
        CREATE TABLE IF NOT EXISTS licenses (
            id TEXT PRIMARY KEY,
            license_key TEXT NOT NULL UNIQUE,
            customer_email TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('issued', 'active', 'duplicate', 'error', 'revoked')),
            product_sku TEXT NOT NULL,
            plan_code TEXT NOT NULL,
            plan_name TEXT NOT NULL,
            amount_cents INTEGER NOT NULL DEFAULT 0,
            currency TEXT NOT NULL DEFAULT 'usd',
            max_devices INTEGER NOT NULL DEFAULT 1,
            machine_id TEXT,
            tenant_id TEXT NOT NULL DEFAULT 'RESCUEPC_MAIN',
            stripe_event_id TEXT UNIQUE,
            payment_intent TEXT UNIQUE,
            checkout_session TEXT UNIQUE,
            error_detail TEXT,
            expires_at INTEGER,
            issued_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            last_verified_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_licenses_email ON licenses(customer_email COLLATE NOCASE);
        CREATE INDEX IF NOT EXISTS idx_licenses_status ON licenses(status);
        "#,
    )?;
    Ok(())
}
