//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
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

// ============ SQL SELECT Constants ============

pub const USER_COLS: &str = "id, email, name, created_at, updated_at";

pub const QUESTION_COLS: &str =
    "id, owner_id, text, reward_cents, status, accepted_answer_id, created_at, updated_at";

pub const ANSWER_COLS: &str =
    "id, question_id, author_id, text, status, payment_confirmed, verified, created_at, updated_at";

pub const BALANCE_COLS: &str =
    "user_id, available_cents, earned_cents, withdrawn_cents, updated_at";

pub const TRANSACTION_COLS: &str = "id, user_id, kind, gross_cents, net_cents, fee_cents, fee_bps, question_id, answer_id, gateway_id, status, created_at";

pub const SUBSCRIPTION_COLS: &str = "user_id, status, plan, external_id, created_at, updated_at";

pub const CHARGE_COLS: &str = "id, question_id, answer_id, payer_id, gateway, method, amount_cents, gateway_charge_id, url, status, created_at, updated_at";

// ============ FromRow Implementations ============

impl FromRow for User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }
}

impl FromRow for Question {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Question {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            text: row.get(2)?,
            reward_cents: row.get(3)?,
            status: parse_enum(row, 4, "status")?,
            accepted_answer_id: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

impl FromRow for Answer {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Answer {
            id: row.get(0)?,
            question_id: row.get(1)?,
            author_id: row.get(2)?,
            text: row.get(3)?,
            status: parse_enum(row, 4, "status")?,
            payment_confirmed: row.get::<_, i32>(5)? != 0,
            verified: row.get::<_, i32>(6)? != 0,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

impl FromRow for Balance {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Balance {
            user_id: row.get(0)?,
            available_cents: row.get(1)?,
            earned_cents: row.get(2)?,
            withdrawn_cents: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }
}

impl FromRow for Transaction {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Transaction {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: parse_enum(row, 2, "kind")?,
            gross_cents: row.get(3)?,
            net_cents: row.get(4)?,
            fee_cents: row.get(5)?,
            fee_bps: row.get(6)?,
            question_id: row.get(7)?,
            answer_id: row.get(8)?,
            gateway_id: row.get(9)?,
            status: parse_enum(row, 10, "status")?,
            created_at: row.get(11)?,
        })
    }
}

impl FromRow for Subscription {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Subscription {
            user_id: row.get(0)?,
            status: parse_enum(row, 1, "status")?,
            plan: row.get(2)?,
            external_id: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

impl FromRow for Charge {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Charge {
            id: row.get(0)?,
            question_id: row.get(1)?,
            answer_id: row.get(2)?,
            payer_id: row.get(3)?,
            gateway: parse_enum(row, 4, "gateway")?,
            method: parse_enum(row, 5, "method")?,
            amount_cents: row.get(6)?,
            gateway_charge_id: row.get(7)?,
            url: row.get(8)?,
            status: parse_enum(row, 9, "status")?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}
