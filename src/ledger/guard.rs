//! Exactly-once guards for payment and payout confirmations.
//!
//! Each claim is a single conditional UPDATE. Only the caller whose statement
//! changed a row proceeds; everyone else sees the work as already done.

use rusqlite::{Connection, params};

use crate::db::queries;
use crate::error::Result;
use crate::models::{Transaction, TransactionKind, TransactionStatus};
use crate::util::now;

/// Flip `payment_confirmed` from false to true and accept the answer.
/// Returns true only for the caller that flipped it.
pub fn claim_answer_payment(conn: &Connection, answer_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE respostas SET payment_confirmed = 1, status = 'accepted', updated_at = ?1
         WHERE id = ?2 AND payment_confirmed = 0",
        params![now(), answer_id],
    )?;
    Ok(affected > 0)
}

/// Move the question from `open` to `answered`, pointing at the paid answer.
/// Returns false if the question was closed or already answered.
pub fn claim_question_acceptance(
    conn: &Connection,
    question_id: &str,
    answer_id: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE perguntas SET status = 'answered', accepted_answer_id = ?1, updated_at = ?2
         WHERE id = ?3 AND status = 'open'",
        params![answer_id, now(), question_id],
    )?;
    Ok(affected > 0)
}

#[derive(Debug)]
pub enum PayoutMatch {
    /// Debit waiting for the gateway's confirmation
    Pending(Transaction),
    /// Debit already completed or failed
    Settled(Transaction),
    /// No debit carries this payout ID
    Unknown,
}

/// Look up a withdrawal by the payout ID the gateway assigned.
pub fn find_pending_payout(conn: &Connection, gateway_id: &str) -> Result<PayoutMatch> {
    let Some(tx) = queries::get_transaction_by_gateway_id(conn, gateway_id)? else {
        return Ok(PayoutMatch::Unknown);
    };
    if tx.kind != TransactionKind::Debit {
        return Ok(PayoutMatch::Unknown);
    }
    Ok(match tx.status {
        TransactionStatus::Pending => PayoutMatch::Pending(tx),
        TransactionStatus::Completed | TransactionStatus::Failed => PayoutMatch::Settled(tx),
    })
}
