//! Domain invoice types supplied by the invoicing data layer.
//!
//! This crate never persists these records; they are the input boundary for
//! [`transform_invoice`](crate::transform::transform_invoice).
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Issuer or counterparty of an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub tax_id: String,
    pub name: String,
}

/// A single invoice line. `amount` is the gross (VAT-inclusive) line amount;
/// `vat_rate` is the applied VAT percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub amount: f64,
    pub vat_rate: f64,
}

/// Invoice record as produced by the data layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub number: String,
    pub issue_date: NaiveDate,
    pub lines: Vec<InvoiceLine>,
    pub issuer: Party,
    pub client: Party,
}
