use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior, params};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::license_key;
use crate::models::*;
use crate::plans::PlanCode;

use super::from_row::{LICENSE_COLS, query_all, query_one};

/// Key regeneration attempts before giving up on an insert.
const MAX_KEY_ATTEMPTS: usize = 5;

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

// ============ Lookups ============

pub fn get_license_by_key(conn: &Connection, license_key: &str) -> Result<Option<License>> {
    query_one(
        conn,
        &format!("SELECT {} FROM licenses WHERE license_key = ?1", LICENSE_COLS),
        &[&license_key],
    )
}

pub fn get_license_by_id(conn: &Connection, id: &str) -> Result<Option<License>> {
    query_one(
        conn,
        &format!("SELECT {} FROM licenses WHERE id = ?1", LICENSE_COLS),
        &[&id],
    )
}

/// Find the license already recorded for a payment, matching any of its
/// idempotency keys.
pub fn find_license_for_payment(
    conn: &Connection,
    event_id: &str,
    payment_intent: &str,
    checkout_session: &str,
) -> Result<Option<License>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM licenses
             WHERE stripe_event_id = ?1 OR payment_intent = ?2 OR checkout_session = ?3
             LIMIT 1",
            LICENSE_COLS
        ),
        &[&event_id, &payment_intent, &checkout_session],
    )
}

pub fn list_licenses_by_email(conn: &Connection, email: &str) -> Result<Vec<License>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM licenses WHERE customer_email = ?1 COLLATE NOCASE ORDER BY created_at DESC",
            LICENSE_COLS
        ),
        &[&email.trim()],
    )
}

/// Most recent usable license for an email, if any.
pub fn find_active_license_by_email(conn: &Connection, email: &str) -> Result<Option<License>> {
    let now = now();
    Ok(list_licenses_by_email(conn, email)?
        .into_iter()
        .find(|l| l.is_usable(now)))
}

// ============ Issuance ============

/// Insert a license unless one of its unique columns already exists.
/// Returns `None` when the insert was ignored.
pub fn try_insert_license(conn: &Connection, input: &NewLicense) -> Result<Option<License>> {
    let id = gen_id();
    let now = now();
    let rights = input.plan.rights();

    let affected = conn.execute(
        "INSERT OR IGNORE INTO licenses (id, license_key, customer_email, status, product_sku, plan_code, plan_name, amount_cents, currency, max_devices, tenant_id, stripe_event_id, payment_intent, checkout_session, expires_at, issued_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16, ?16)",
        params![
            &id,
            &input.license_key,
            &input.customer_email,
            LicenseStatus::Issued.as_ref(),
            &input.product_sku,
            input.plan.as_ref(),
            &rights.label,
            input.amount_cents,
            &input.currency,
            rights.max_devices,
            &input.tenant_id,
            &input.stripe_event_id,
            &input.payment_intent,
            &input.checkout_session,
            input.expires_at,
            now,
        ],
    )?;

    if affected == 0 {
        return Ok(None);
    }

    Ok(Some(License {
        id,
        license_key: input.license_key.clone(),
        customer_email: input.customer_email.clone(),
        status: LicenseStatus::Issued,
        product_sku: input.product_sku.clone(),
        plan_code: input.plan.as_ref().to_string(),
        plan_name: rights.label.to_string(),
        amount_cents: input.amount_cents,
        currency: input.currency.clone(),
        max_devices: rights.max_devices as i32,
        machine_id: None,
        tenant_id: input.tenant_id.clone(),
        stripe_event_id: Some(input.stripe_event_id.clone()),
        payment_intent: Some(input.payment_intent.clone()),
        checkout_session: Some(input.checkout_session.clone()),
        error_detail: None,
        expires_at: input.expires_at,
        issued_at: now,
        created_at: now,
        updated_at: now,
        last_verified_at: None,
    }))
}

#[derive(Debug)]
pub enum IssueOutcome {
    /// A new license row was written
    Issued(License),
    /// The payment was already processed; carries the existing row
    Duplicate(License),
}

/// Record a license for a completed payment exactly once.
///
/// Runs under an IMMEDIATE transaction so concurrent deliveries of the same event
/// serialize on the write lock. An ignored insert is either a duplicate payment
/// (an existing row matches one of the idempotency keys) or a license key
/// collision, in which case a fresh key is generated and the insert retried.
pub fn issue_license_atomic(conn: &mut Connection, mut input: NewLicense) -> Result<IssueOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    for _ in 0..MAX_KEY_ATTEMPTS {
        if let Some(license) = try_insert_license(&tx, &input)? {
            tx.commit()?;
            return Ok(IssueOutcome::Issued(license));
        }

        if let Some(existing) = find_license_for_payment(
            &tx,
            &input.stripe_event_id,
            &input.payment_intent,
            &input.checkout_session,
        )? {
            tx.commit()?;
            return Ok(IssueOutcome::Duplicate(existing));
        }

        tracing::warn!(event_id = %input.stripe_event_id, "License key collision, regenerating");
        input.license_key = license_key::generate();
    }

    Err(AppError::Internal(format!(
        "could not allocate a unique license key after {} attempts",
        MAX_KEY_ATTEMPTS
    )))
}

/// Record a failed webhook as an `error` row.
///
/// Correlation columns stay NULL so the provider's retry of the same event is
/// not mistaken for a duplicate.
pub fn create_error_license(conn: &Connection, event_id: &str, detail: &str) -> Result<License> {
    let id = gen_id();
    let now = now();
    let license_key = format!("ERROR-{}", Uuid::new_v4().simple());
    let plan = PlanCode::Basic;
    let error_detail = format!("event {}: {}", event_id, detail);

    conn.execute(
        "INSERT INTO licenses (id, license_key, customer_email, status, product_sku, plan_code, plan_name, amount_cents, currency, max_devices, tenant_id, error_detail, issued_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'unknown', ?5, ?6, 0, 'usd', 1, ?7, ?8, ?9, ?9, ?9)",
        params![
            &id,
            &license_key,
            UNKNOWN_EMAIL,
            LicenseStatus::Error.as_ref(),
            plan.as_ref(),
            plan.rights().label,
            DEFAULT_TENANT_ID,
            &error_detail,
            now,
        ],
    )?;

    Ok(License {
        id,
        license_key,
        customer_email: UNKNOWN_EMAIL.to_string(),
        status: LicenseStatus::Error,
        product_sku: "unknown".to_string(),
        plan_code: plan.as_ref().to_string(),
        plan_name: plan.rights().label.to_string(),
        amount_cents: 0,
        currency: "usd".to_string(),
        max_devices: 1,
        machine_id: None,
        tenant_id: DEFAULT_TENANT_ID.to_string(),
        stripe_event_id: None,
        payment_intent: None,
        checkout_session: None,
        error_detail: Some(error_detail),
        expires_at: None,
        issued_at: now,
        created_at: now,
        updated_at: now,
        last_verified_at: None,
    })
}

// ============ Updates ============

/// Stamp an activation. `machine_id` replaces the bound device when present.
///
/// An `issued` license becomes `active` in the same statement; other statuses
/// are left as they are.
pub fn record_activation(conn: &Connection, id: &str, machine_id: Option<&str>) -> Result<i64> {
    let now = now();
    conn.execute(
        "UPDATE licenses SET
            status = CASE WHEN status = 'issued' THEN 'active' ELSE status END,
            last_verified_at = ?1,
            machine_id = COALESCE(?2, machine_id),
            updated_at = ?1
         WHERE id = ?3",
        params![now, machine_id, id],
    )?;
    Ok(now)
}

/// Operator status change. Returns false when the key does not exist.
pub fn set_license_status(conn: &Connection, license_key: &str, status: LicenseStatus) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE licenses SET status = ?1, updated_at = ?2 WHERE license_key = ?3",
        params![status.as_ref(), now(), license_key],
    )?;
    Ok(affected > 0)
}
