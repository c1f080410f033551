use rusqlite::{Connection, params};

use crate::error::Result;
use crate::id::EntityType;
use crate::models::*;
use crate::payments::PaymentProvider;
use crate::util::now;

use super::from_row::{
    ANSWER_COLS, BALANCE_COLS, CHARGE_COLS, QUESTION_COLS, SUBSCRIPTION_COLS, TRANSACTION_COLS,
    USER_COLS, query_all, query_one,
};

// ============ Users ============

/// Insert or refresh a user from verified token claims.
/// Missing claims never overwrite values we already have.
pub fn upsert_user(
    conn: &Connection,
    id: &str,
    email: Option<&str>,
    name: Option<&str>,
) -> Result<()> {
    let now = now();
    let email = email.map(|e| e.trim().to_lowercase());
    conn.execute(
        "INSERT INTO usuarios (id, email, name, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(id) DO UPDATE SET
            email = COALESCE(excluded.email, usuarios.email),
            name = COALESCE(excluded.name, usuarios.name),
            updated_at = excluded.updated_at",
        params![id, email, name, now],
    )?;
    Ok(())
}

pub fn get_user_by_id(conn: &Connection, id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM usuarios WHERE id = ?1", USER_COLS),
        &[&id],
    )
}

// ============ Questions ============

pub fn create_question(conn: &Connection, owner_id: &str, input: &CreateQuestion) -> Result<Question> {
    let id = EntityType::Question.gen_id();
    let now = now();
    let text = input.texto.trim().to_string();

    conn.execute(
        "INSERT INTO perguntas (id, owner_id, text, reward_cents, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![&id, owner_id, &text, input.valor, QuestionStatus::Open.as_ref(), now],
    )?;

    Ok(Question {
        id,
        owner_id: owner_id.to_string(),
        text,
        reward_cents: input.valor,
        status: QuestionStatus::Open,
        accepted_answer_id: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_question_by_id(conn: &Connection, id: &str) -> Result<Option<Question>> {
    query_one(
        conn,
        &format!("SELECT {} FROM perguntas WHERE id = ?1", QUESTION_COLS),
        &[&id],
    )
}

/// Close an open question. Returns false if it was already answered or closed.
pub fn close_question(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE perguntas SET status = 'closed', updated_at = ?1 WHERE id = ?2 AND status = 'open'",
        params![now(), id],
    )?;
    Ok(affected > 0)
}

// ============ Answers ============

pub fn create_answer(
    conn: &Connection,
    question_id: &str,
    author_id: &str,
    input: &CreateAnswer,
) -> Result<Answer> {
    let id = EntityType::Answer.gen_id();
    let now = now();
    let text = input.texto.trim().to_string();

    conn.execute(
        "INSERT INTO respostas (id, question_id, author_id, text, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![&id, question_id, author_id, &text, AnswerStatus::Pending.as_ref(), now],
    )?;

    Ok(Answer {
        id,
        question_id: question_id.to_string(),
        author_id: author_id.to_string(),
        text,
        status: AnswerStatus::Pending,
        payment_confirmed: false,
        verified: false,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_answer_by_id(conn: &Connection, id: &str) -> Result<Option<Answer>> {
    query_one(
        conn,
        &format!("SELECT {} FROM respostas WHERE id = ?1", ANSWER_COLS),
        &[&id],
    )
}

pub fn list_answers_for_question(conn: &Connection, question_id: &str) -> Result<Vec<Answer>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM respostas WHERE question_id = ?1 ORDER BY created_at ASC",
            ANSWER_COLS
        ),
        &[&question_id],
    )
}

// ============ Balances ============

pub fn get_balance(conn: &Connection, user_id: &str) -> Result<Option<Balance>> {
    query_one(
        conn,
        &format!("SELECT {} FROM saldos WHERE user_id = ?1", BALANCE_COLS),
        &[&user_id],
    )
}

/// Add a payout to the user's balance, creating the row on first credit.
pub fn credit_balance(conn: &Connection, user_id: &str, net_cents: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO saldos (user_id, available_cents, earned_cents, withdrawn_cents, updated_at)
         VALUES (?1, ?2, ?2, 0, ?3)
         ON CONFLICT(user_id) DO UPDATE SET
            available_cents = saldos.available_cents + excluded.available_cents,
            earned_cents = saldos.earned_cents + excluded.earned_cents,
            updated_at = excluded.updated_at",
        params![user_id, net_cents, now()],
    )?;
    Ok(())
}

/// Move `gross_cents` from available to withdrawn if the balance covers it.
/// Returns false (and changes nothing) when funds are insufficient or the
/// user has no balance row.
pub fn try_debit_balance(conn: &Connection, user_id: &str, gross_cents: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE saldos SET
            available_cents = available_cents - ?1,
            withdrawn_cents = withdrawn_cents + ?1,
            updated_at = ?2
         WHERE user_id = ?3 AND available_cents >= ?1",
        params![gross_cents, now(), user_id],
    )?;
    Ok(affected > 0)
}

/// Undo a debit whose payout never reached the gateway.
pub fn refund_debit(conn: &Connection, user_id: &str, gross_cents: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE saldos SET
            available_cents = available_cents + ?1,
            withdrawn_cents = withdrawn_cents - ?1,
            updated_at = ?2
         WHERE user_id = ?3",
        params![gross_cents, now(), user_id],
    )?;
    Ok(affected > 0)
}

pub fn delete_balance(conn: &Connection, user_id: &str) -> Result<bool> {
    let affected = conn.execute("DELETE FROM saldos WHERE user_id = ?1", params![user_id])?;
    Ok(affected > 0)
}

// ============ Transactions ============

pub fn create_transaction(conn: &Connection, input: &CreateTransaction) -> Result<Transaction> {
    let id = EntityType::Transaction.gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO transacoes (id, user_id, kind, gross_cents, net_cents, fee_cents, fee_bps,
                                 question_id, answer_id, gateway_id, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            &id,
            &input.user_id,
            input.kind.as_ref(),
            input.gross_cents,
            input.net_cents,
            input.fee_cents,
            input.fee_bps,
            &input.question_id,
            &input.answer_id,
            &input.gateway_id,
            input.status.as_ref(),
            now,
        ],
    )?;

    Ok(Transaction {
        id,
        user_id: input.user_id.clone(),
        kind: input.kind,
        gross_cents: input.gross_cents,
        net_cents: input.net_cents,
        fee_cents: input.fee_cents,
        fee_bps: input.fee_bps,
        question_id: input.question_id.clone(),
        answer_id: input.answer_id.clone(),
        gateway_id: input.gateway_id.clone(),
        status: input.status,
        created_at: now,
    })
}

pub fn get_transaction_by_id(conn: &Connection, id: &str) -> Result<Option<Transaction>> {
    query_one(
        conn,
        &format!("SELECT {} FROM transacoes WHERE id = ?1", TRANSACTION_COLS),
        &[&id],
    )
}

/// Exact match on the payout ID assigned by the gateway.
pub fn get_transaction_by_gateway_id(
    conn: &Connection,
    gateway_id: &str,
) -> Result<Option<Transaction>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM transacoes WHERE gateway_id = ?1 LIMIT 1",
            TRANSACTION_COLS
        ),
        &[&gateway_id],
    )
}

pub fn get_credit_for_answer(conn: &Connection, answer_id: &str) -> Result<Option<Transaction>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM transacoes WHERE answer_id = ?1 AND kind = 'credit'",
            TRANSACTION_COLS
        ),
        &[&answer_id],
    )
}

/// Newest first. Returns (items, total).
pub fn list_transactions_for_user_paginated(
    conn: &Connection,
    user_id: &str,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Transaction>, i64)> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM transacoes WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    let items = query_all(
        conn,
        &format!(
            "SELECT {} FROM transacoes WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3",
            TRANSACTION_COLS
        ),
        params![user_id, limit, offset],
    )?;
    Ok((items, total))
}

/// Record the payout ID once. Returns false if one was already set.
pub fn set_transaction_gateway_id(conn: &Connection, id: &str, gateway_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE transacoes SET gateway_id = ?1 WHERE id = ?2 AND gateway_id IS NULL",
        params![gateway_id, id],
    )?;
    Ok(affected > 0)
}

/// Move a debit out of `pending`. Only pending debits can transition, so a
/// completed or failed entry is never rewritten.
pub fn finish_pending_debit(
    conn: &Connection,
    id: &str,
    status: TransactionStatus,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE transacoes SET status = ?1
         WHERE id = ?2 AND kind = 'debit' AND status = 'pending'",
        params![status.as_ref(), id],
    )?;
    Ok(affected > 0)
}

// ============ Subscriptions ============

pub fn get_subscription(conn: &Connection, user_id: &str) -> Result<Option<Subscription>> {
    query_one(
        conn,
        &format!("SELECT {} FROM assinaturas WHERE user_id = ?1", SUBSCRIPTION_COLS),
        &[&user_id],
    )
}

pub fn is_premium(conn: &Connection, user_id: &str) -> Result<bool> {
    Ok(get_subscription(conn, user_id)?.is_some_and(|s| s.is_premium()))
}

/// Activate (or re-activate) a user's subscription.
pub fn upsert_active_subscription(
    conn: &Connection,
    user_id: &str,
    plan: &str,
    external_id: &str,
) -> Result<()> {
    let now = now();
    conn.execute(
        "INSERT INTO assinaturas (user_id, status, plan, external_id, created_at, updated_at)
         VALUES (?1, 'active', ?2, ?3, ?4, ?4)
         ON CONFLICT(user_id) DO UPDATE SET
            status = 'active',
            plan = excluded.plan,
            external_id = excluded.external_id,
            updated_at = excluded.updated_at",
        params![user_id, plan, external_id, now],
    )?;
    Ok(())
}

/// Returns the number of subscriptions updated (0 if the external ID is unknown).
pub fn set_subscription_status_by_external_id(
    conn: &Connection,
    external_id: &str,
    status: SubscriptionStatus,
) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE assinaturas SET status = ?1, updated_at = ?2 WHERE external_id = ?3",
        params![status.as_ref(), now(), external_id],
    )?;
    Ok(affected)
}

// ============ Charges ============

pub fn create_charge(conn: &Connection, input: &CreateCharge) -> Result<Charge> {
    let id = EntityType::Charge.gen_id();
    let now = now();
    let gateway = input.method.provider();

    conn.execute(
        "INSERT INTO cobrancas (id, question_id, answer_id, payer_id, gateway, method,
                                amount_cents, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?8)",
        params![
            &id,
            &input.question_id,
            &input.answer_id,
            &input.payer_id,
            gateway.as_ref(),
            input.method.as_ref(),
            input.amount_cents,
            now,
        ],
    )?;

    Ok(Charge {
        id,
        question_id: input.question_id.clone(),
        answer_id: input.answer_id.clone(),
        payer_id: input.payer_id.clone(),
        gateway,
        method: input.method,
        amount_cents: input.amount_cents,
        gateway_charge_id: None,
        url: None,
        status: ChargeStatus::Pending,
        created_at: now,
        updated_at: now,
    })
}

/// Attach the gateway's charge ID and checkout URL after creation.
pub fn set_charge_gateway_ref(
    conn: &Connection,
    id: &str,
    gateway_charge_id: &str,
    url: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE cobrancas SET gateway_charge_id = ?1, url = ?2, updated_at = ?3 WHERE id = ?4",
        params![gateway_charge_id, url, now(), id],
    )?;
    Ok(())
}

pub fn get_charge_by_id(conn: &Connection, id: &str) -> Result<Option<Charge>> {
    query_one(
        conn,
        &format!("SELECT {} FROM cobrancas WHERE id = ?1", CHARGE_COLS),
        &[&id],
    )
}

pub fn get_charge_by_gateway_charge_id(
    conn: &Connection,
    gateway: PaymentProvider,
    gateway_charge_id: &str,
) -> Result<Option<Charge>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM cobrancas WHERE gateway = ?1 AND gateway_charge_id = ?2",
            CHARGE_COLS
        ),
        params![gateway.as_ref(), gateway_charge_id],
    )
}

/// Most recent charge for a question/answer pair.
pub fn get_latest_charge_for_answer(
    conn: &Connection,
    question_id: &str,
    answer_id: &str,
) -> Result<Option<Charge>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM cobrancas WHERE question_id = ?1 AND answer_id = ?2
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
            CHARGE_COLS
        ),
        params![question_id, answer_id],
    )
}

/// Settle a pending charge. Paid and failed charges are final.
pub fn set_charge_status(conn: &Connection, id: &str, status: ChargeStatus) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE cobrancas SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'pending'",
        params![status.as_ref(), now(), id],
    )?;
    Ok(affected > 0)
}
