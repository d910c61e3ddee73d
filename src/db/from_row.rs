//! Row mapping for the license store.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::License;

/// Parse a string column into an enum, surfacing bad values as a column type error
/// instead of panicking.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub const LICENSE_COLS: &str = "id, license_key, customer_email, status, product_sku, plan_code, plan_name, amount_cents, currency, max_devices, machine_id, tenant_id, stripe_event_id, payment_intent, checkout_session, error_detail, expires_at, issued_at, created_at, updated_at, last_verified_at";

impl FromRow for License {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(License {
            id: row.get(0)?,
            license_key: row.get(1)?,
            customer_email: row.get(2)?,
            status: parse_enum(row, 3, "status")?,
            product_sku: row.get(4)?,
            plan_code: row.get(5)?,
            plan_name: row.get(6)?,
            amount_cents: row.get(7)?,
            currency: row.get(8)?,
            max_devices: row.get(9)?,
            machine_id: row.get(10)?,
            tenant_id: row.get(11)?,
            stripe_event_id: row.get(12)?,
            payment_intent: row.get(13)?,
            checkout_session: row.get(14)?,
            error_detail: row.get(15)?,
            expires_at: row.get(16)?,
            issued_at: row.get(17)?,
            created_at: row.get(18)?,
            updated_at: row.get(19)?,
            last_verified_at: row.get(20)?,
        })
    }
}
