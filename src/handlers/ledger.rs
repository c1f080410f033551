//! Read-only views of the caller's ledger.

use axum::{extract::State, response::Json};

use crate::auth::AuthUser;
use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::Query;
use crate::models::{Balance, Transaction};
use crate::pagination::{Page, PageParams};

/// GET /saldo - zeros for users that were never credited.
pub async fn get_balance(State(state): State<AppState>, user: AuthUser) -> Result<Json<Balance>> {
    let conn = state.db.get()?;
    let balance = queries::get_balance(&conn, user.id())?
        .unwrap_or_else(|| Balance::empty(user.id()));
    Ok(Json(balance))
}

/// GET /transacoes - newest first.
pub async fn list_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<Transaction>>> {
    let conn = state.db.get()?;
    let (items, total) = queries::list_transactions_for_user_paginated(
        &conn,
        user.id(),
        params.limit(),
        params.offset(),
    )?;
    Ok(Json(Page::new(items, total, &params)))
}
