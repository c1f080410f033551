//! QuestionGo - payment ledger for a paid Q&A marketplace
//!
//! Askers pay respondents for accepted answers through Stripe (cards) or
//! AbacatePay (PIX). This crate owns the ledger: charges, idempotent credits
//! with tiered platform fees, PIX withdrawals, and gateway webhooks.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod email;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod id;
pub mod ledger;
pub mod models;
pub mod pagination;
pub mod payments;
pub mod rate_limit;
pub mod util;
