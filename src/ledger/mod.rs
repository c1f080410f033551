//! Ledger reconciliation: turns normalized gateway events into balance and
//! transaction changes, each applied exactly once.
//!
//! Every multi-row mutation runs inside a `BEGIN IMMEDIATE` transaction, so
//! concurrent confirmations for the same answer serialize on the write lock
//! and then on the compare-and-swap in [`guard`].

pub mod fees;
pub mod guard;

use rusqlite::{Connection, TransactionBehavior};

use crate::db::{DbPool, queries};
use crate::error::{AppError, Result, msg};
use crate::models::{
    ChargeStatus, CreateTransaction, SubscriptionStatus, Transaction, TransactionKind,
    TransactionStatus,
};
use crate::payments::{PaymentGateway, PaymentProvider, PayoutRequest, PixKeyType};
use crate::util::MAX_AMOUNT_CENTS;

use fees::FeeSplit;
use guard::PayoutMatch;

/// A confirmed payment, from a webhook or a synchronous status check.
#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub provider: PaymentProvider,
    pub gateway_charge_id: String,
    /// Echoed metadata; used only when no local charge record exists
    pub question_id: Option<String>,
    pub answer_id: Option<String>,
    pub amount_cents: Option<i64>,
}

#[derive(Debug)]
pub enum ConfirmationOutcome {
    /// The respondent was credited by this call
    Credited {
        transaction: Transaction,
        split: FeeSplit,
        question_id: String,
        asker_id: String,
        respondent_id: String,
    },
    /// The answer was already paid; nothing changed
    AlreadyProcessed,
    /// The question was closed or answered by another payment; nothing changed
    QuestionNotOpen,
    /// The event doesn't point at a known question/answer pair
    Unmatched,
}

/// Apply a payment confirmation to the ledger exactly once.
///
/// Marks the answer paid and accepted, marks the question answered, credits
/// the respondent's balance using their current tier and appends the credit
/// entry, all in one transaction.
pub fn apply_payment_confirmation(
    conn: &mut Connection,
    confirmation: &PaymentConfirmation,
) -> Result<ConfirmationOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    // Our own charge record wins over gateway-echoed metadata
    let charge = queries::get_charge_by_gateway_charge_id(
        &tx,
        confirmation.provider,
        &confirmation.gateway_charge_id,
    )?;
    let question_id = charge
        .as_ref()
        .map(|c| c.question_id.clone())
        .or_else(|| confirmation.question_id.clone());
    let answer_id = charge
        .as_ref()
        .map(|c| c.answer_id.clone())
        .or_else(|| confirmation.answer_id.clone());

    let (Some(question_id), Some(answer_id)) = (question_id, answer_id) else {
        tracing::warn!(
            gateway_charge_id = %confirmation.gateway_charge_id,
            "Payment confirmation without question/answer reference"
        );
        return Ok(ConfirmationOutcome::Unmatched);
    };

    let Some(answer) = queries::get_answer_by_id(&tx, &answer_id)? else {
        tracing::warn!(answer_id = %answer_id, "Payment confirmed for unknown answer");
        return Ok(ConfirmationOutcome::Unmatched);
    };
    if answer.question_id != question_id {
        tracing::warn!(
            answer_id = %answer_id,
            question_id = %question_id,
            "Payment confirmed for an answer of another question"
        );
        return Ok(ConfirmationOutcome::Unmatched);
    }
    let Some(question) = queries::get_question_by_id(&tx, &question_id)? else {
        tracing::warn!(question_id = %question_id, "Payment confirmed for unknown question");
        return Ok(ConfirmationOutcome::Unmatched);
    };

    if !guard::claim_answer_payment(&tx, &answer_id)? {
        tracing::debug!(answer_id = %answer_id, "Payment already applied");
        return Ok(ConfirmationOutcome::AlreadyProcessed);
    }

    // The flag can be reset by hand; the ledger entry is the record of payment
    if let Some(credit) = queries::get_credit_for_answer(&tx, &answer_id)? {
        tracing::error!(
            answer_id = %answer_id,
            transaction_id = %credit.id,
            "Answer flagged unpaid but already credited; not crediting again"
        );
        return Ok(ConfirmationOutcome::AlreadyProcessed);
    }

    if !guard::claim_question_acceptance(&tx, &question_id, &answer_id)? {
        // Dropping tx rolls back the answer claim
        tracing::error!(
            question_id = %question_id,
            answer_id = %answer_id,
            gateway_charge_id = %confirmation.gateway_charge_id,
            status = question.status.as_ref(),
            "Payment received for a question that is no longer open; refund manually"
        );
        return Ok(ConfirmationOutcome::QuestionNotOpen);
    }

    if let Some(paid) = confirmation.amount_cents
        && paid != question.reward_cents
    {
        tracing::warn!(
            question_id = %question_id,
            paid,
            reward = question.reward_cents,
            "Paid amount differs from question reward; crediting the reward"
        );
    }

    let premium = queries::is_premium(&tx, &answer.author_id)?;
    let split = fees::answer_payout(question.reward_cents, premium);

    queries::credit_balance(&tx, &answer.author_id, split.net)?;
    let transaction = queries::create_transaction(
        &tx,
        &CreateTransaction {
            user_id: answer.author_id.clone(),
            kind: TransactionKind::Credit,
            gross_cents: split.gross,
            net_cents: split.net,
            fee_cents: split.fee,
            fee_bps: split.rate.bps(),
            question_id: Some(question_id.clone()),
            answer_id: Some(answer_id.clone()),
            gateway_id: None,
            status: TransactionStatus::Completed,
        },
    )?;

    if let Some(charge) = &charge {
        queries::set_charge_status(&tx, &charge.id, ChargeStatus::Paid)?;
    }

    tx.commit()?;

    tracing::info!(
        answer_id = %answer_id,
        respondent_id = %answer.author_id,
        net = split.net,
        fee = split.fee,
        premium,
        "Answer payment credited"
    );

    Ok(ConfirmationOutcome::Credited {
        transaction,
        split,
        question_id,
        asker_id: question.owner_id,
        respondent_id: answer.author_id,
    })
}

/// Record that a charge expired or was refused. The question/answer pair is
/// left untouched so the asker can pay again.
pub fn record_charge_failure(
    conn: &Connection,
    provider: PaymentProvider,
    gateway_charge_id: &str,
) -> Result<bool> {
    let Some(charge) = queries::get_charge_by_gateway_charge_id(conn, provider, gateway_charge_id)?
    else {
        tracing::debug!(gateway_charge_id, "Failure event for unknown charge");
        return Ok(false);
    };
    let updated = queries::set_charge_status(conn, &charge.id, ChargeStatus::Failed)?;
    tracing::info!(
        charge_id = %charge.id,
        answer_id = %charge.answer_id,
        updated,
        "Charge failed"
    );
    Ok(updated)
}

// ============ Withdrawals ============

#[derive(Debug, Clone)]
pub struct WithdrawalRequest {
    pub user_id: String,
    pub amount_cents: i64,
    pub pix_key: String,
    pub pix_key_type: PixKeyType,
}

/// Debit the balance and hand the payout to the gateway.
///
/// The debit is committed before the gateway call so the same funds can't
/// be withdrawn twice while a payout is in flight. If the gateway refuses,
/// the debit is compensated and marked failed.
pub async fn request_withdrawal(
    db: &DbPool,
    gateway: &dyn PaymentGateway,
    request: &WithdrawalRequest,
) -> Result<Transaction> {
    if request.amount_cents <= 0 {
        return Err(AppError::BadRequest(msg::AMOUNT_MUST_BE_POSITIVE.into()));
    }
    if request.amount_cents > MAX_AMOUNT_CENTS {
        return Err(AppError::BadRequest(msg::AMOUNT_OUT_OF_RANGE.into()));
    }
    let split = fees::withdrawal(request.amount_cents);

    let debit = {
        let mut conn = db.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !queries::try_debit_balance(&tx, &request.user_id, split.gross)? {
            return Err(AppError::BadRequest(msg::INSUFFICIENT_BALANCE.into()));
        }
        let debit = queries::create_transaction(
            &tx,
            &CreateTransaction {
                user_id: request.user_id.clone(),
                kind: TransactionKind::Debit,
                gross_cents: split.gross,
                net_cents: split.net,
                fee_cents: split.fee,
                fee_bps: split.rate.bps(),
                question_id: None,
                answer_id: None,
                gateway_id: None,
                status: TransactionStatus::Pending,
            },
        )?;
        tx.commit()?;
        debit
    };

    let payout = gateway
        .create_payout(&PayoutRequest {
            external_id: debit.id.clone(),
            amount_cents: split.net,
            pix_key: request.pix_key.clone(),
            pix_key_type: request.pix_key_type,
            description: format!("QuestionGo saque {}", debit.id),
        })
        .await;

    let payout = match payout {
        Ok(payout) => payout,
        Err(e) => {
            if let Err(comp_err) = compensate_withdrawal(db, &debit) {
                tracing::error!(
                    transaction_id = %debit.id,
                    user_id = %debit.user_id,
                    "Withdrawal compensation failed, reconcile manually: {}",
                    comp_err
                );
            }
            return Err(e);
        }
    };

    let conn = db.get()?;
    if !queries::set_transaction_gateway_id(&conn, &debit.id, &payout.payout_id)? {
        tracing::warn!(transaction_id = %debit.id, "Payout ID was already set");
    }

    tracing::info!(
        transaction_id = %debit.id,
        payout_id = %payout.payout_id,
        gross = split.gross,
        net = split.net,
        "Withdrawal requested"
    );

    Ok(Transaction {
        gateway_id: Some(payout.payout_id),
        ..debit
    })
}

/// Give the funds back and mark the debit failed, in one transaction.
fn compensate_withdrawal(db: &DbPool, debit: &Transaction) -> Result<()> {
    let mut conn = db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if queries::finish_pending_debit(&tx, &debit.id, TransactionStatus::Failed)? {
        queries::refund_debit(&tx, &debit.user_id, debit.gross_cents)?;
    }
    tx.commit()?;
    tracing::warn!(
        transaction_id = %debit.id,
        user_id = %debit.user_id,
        amount = debit.gross_cents,
        "Payout failed, withdrawal compensated"
    );
    Ok(())
}

#[derive(Debug)]
pub enum WithdrawalOutcome {
    Completed(Transaction),
    AlreadyProcessed,
    Unknown,
}

/// Mark a withdrawal completed when the gateway confirms the payout.
/// The balance was debited at request time and is not touched here.
///
/// `external_id` (our transaction ID) is only consulted when no debit carries
/// the payout ID yet, which happens if recording the payout ID failed.
pub fn confirm_withdrawal(
    conn: &mut Connection,
    payout_id: &str,
    external_id: Option<&str>,
) -> Result<WithdrawalOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let pending = match guard::find_pending_payout(&tx, payout_id)? {
        PayoutMatch::Pending(debit) => debit,
        PayoutMatch::Settled(debit) => {
            if debit.status == TransactionStatus::Failed {
                tracing::error!(
                    transaction_id = %debit.id,
                    payout_id,
                    "Payout completed for a compensated withdrawal; reconcile manually"
                );
            }
            return Ok(WithdrawalOutcome::AlreadyProcessed);
        }
        PayoutMatch::Unknown => {
            let Some(debit) = external_id
                .map(|id| queries::get_transaction_by_id(&tx, id))
                .transpose()?
                .flatten()
                .filter(|d| d.kind == TransactionKind::Debit && d.gateway_id.is_none())
            else {
                tracing::warn!(payout_id, "Payout confirmation for unknown withdrawal");
                return Ok(WithdrawalOutcome::Unknown);
            };
            queries::set_transaction_gateway_id(&tx, &debit.id, payout_id)?;
            if debit.status != TransactionStatus::Pending {
                tx.commit()?;
                return Ok(WithdrawalOutcome::AlreadyProcessed);
            }
            debit
        }
    };

    if !queries::finish_pending_debit(&tx, &pending.id, TransactionStatus::Completed)? {
        return Ok(WithdrawalOutcome::AlreadyProcessed);
    }
    tx.commit()?;

    tracing::info!(transaction_id = %pending.id, payout_id, "Withdrawal completed");

    Ok(WithdrawalOutcome::Completed(Transaction {
        status: TransactionStatus::Completed,
        gateway_id: Some(payout_id.to_string()),
        ..pending
    }))
}

// ============ Subscriptions ============

#[derive(Debug, Clone)]
pub enum SubscriptionChange {
    Activated {
        user_id: String,
        subscription_id: String,
        plan: String,
    },
    Canceled {
        subscription_id: String,
    },
    PaymentFailed {
        subscription_id: String,
    },
}

/// Apply a subscription lifecycle event. Only future credits are affected.
/// Returns false if the subscription is unknown.
pub fn apply_subscription_change(conn: &Connection, change: &SubscriptionChange) -> Result<bool> {
    let (subscription_id, status) = match change {
        SubscriptionChange::Activated {
            user_id,
            subscription_id,
            plan,
        } => {
            queries::upsert_active_subscription(conn, user_id, plan, subscription_id)?;
            tracing::info!(user_id = %user_id, subscription_id = %subscription_id, "Subscription activated");
            return Ok(true);
        }
        SubscriptionChange::Canceled { subscription_id } => {
            (subscription_id, SubscriptionStatus::Canceled)
        }
        SubscriptionChange::PaymentFailed { subscription_id } => {
            (subscription_id, SubscriptionStatus::PaymentFailed)
        }
    };

    let updated = queries::set_subscription_status_by_external_id(conn, subscription_id, status)?;
    if updated == 0 {
        tracing::warn!(subscription_id = %subscription_id, "Unknown subscription");
        return Ok(false);
    }
    tracing::info!(
        subscription_id = %subscription_id,
        status = status.as_ref(),
        "Subscription updated"
    );
    Ok(true)
}

/// Delete a user's balance. Transactions are kept.
pub fn reset_balance(conn: &Connection, user_id: &str) -> Result<bool> {
    let deleted = queries::delete_balance(conn, user_id)?;
    tracing::warn!(user_id, deleted, "Balance reset");
    Ok(deleted)
}
