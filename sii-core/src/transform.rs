//! Transformation of domain invoices into the AEAT SII data model.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::invoice::Invoice;

/// Operation type for a new invoice registration ("alta").
pub const OPERATION_ALTA: &str = "A0";

/// One VAT-rate bucket of an invoice: the rate, the accumulated net base, and
/// the accumulated tax amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxDetail {
    pub rate: f64,
    pub base_amount: f64,
    pub tax_amount: f64,
}

/// Invoice registration record in the shape the SII service expects.
///
/// Derived deterministically from an [`Invoice`]; `tax_details` is always
/// sorted by ascending rate and `base_amount + tax_amount` per bucket sums to
/// `total_amount` within rounding tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiiInvoiceData {
    pub invoice_number: String,
    /// Formatted `DD-MM-YYYY`, the date format AEAT expects on the wire.
    pub invoice_date: String,
    /// Ejercicio (fiscal year).
    pub year: i32,
    /// Periodo: quarter of the issue date, zero-padded ("01".."04").
    pub period: String,
    pub issuer_tax_id: String,
    pub issuer_name: String,
    pub client_tax_id: String,
    pub client_name: String,
    pub base_amount: f64,
    pub tax_amount: f64,
    pub total_amount: f64,
    pub tax_details: Vec<TaxDetail>,
    pub operation_type: String,
}

/// Transform an invoice into its SII registration record.
///
/// Lines are grouped by VAT rate; for each line the net base is
/// `gross / (1 + rate/100)` and the tax is the remainder. Buckets are emitted
/// in ascending rate order so repeated transformations of the same invoice are
/// byte-identical downstream.
///
/// # Examples
/// ```rust
/// use chrono::NaiveDate;
/// use sii_core::invoice::{Invoice, InvoiceLine, Party};
/// use sii_core::transform::transform_invoice;
///
/// let invoice = Invoice {
///     number: "FAC-2024-001".into(),
///     issue_date: NaiveDate::from_ymd_opt(2024, 5, 12).unwrap(),
///     lines: vec![InvoiceLine { amount: 121.0, vat_rate: 21.0 }],
///     issuer: Party { tax_id: "B12345678".into(), name: "Empresa SL".into() },
///     client: Party { tax_id: "12345678Z".into(), name: "Cliente".into() },
/// };
/// let record = transform_invoice(&invoice);
/// assert_eq!(record.period, "02");
/// assert_eq!(record.invoice_date, "12-05-2024");
/// ```
pub fn transform_invoice(invoice: &Invoice) -> SiiInvoiceData {
    // Rates keyed in hundredths so f64 rates bucket exactly.
    let mut buckets: BTreeMap<i64, (f64, f64)> = BTreeMap::new();

    for line in &invoice.lines {
        let net = line.amount / (1.0 + line.vat_rate / 100.0);
        let tax = line.amount - net;
        let key = (line.vat_rate * 100.0).round() as i64;
        let entry = buckets.entry(key).or_insert((0.0, 0.0));
        entry.0 += net;
        entry.1 += tax;
    }

    let tax_details: Vec<TaxDetail> = buckets
        .into_iter()
        .map(|(key, (base, tax))| TaxDetail {
            rate: key as f64 / 100.0,
            base_amount: base,
            tax_amount: tax,
        })
        .collect();

    let base_amount: f64 = tax_details.iter().map(|d| d.base_amount).sum();
    let tax_amount: f64 = tax_details.iter().map(|d| d.tax_amount).sum();

    use chrono::Datelike;
    let year = invoice.issue_date.year();
    let month = invoice.issue_date.month();
    let period = format!("{:02}", month.div_ceil(3));
    let invoice_date = format!(
        "{:02}-{:02}-{:04}",
        invoice.issue_date.day(),
        month,
        year
    );

    SiiInvoiceData {
        invoice_number: invoice.number.clone(),
        invoice_date,
        year,
        period,
        issuer_tax_id: invoice.issuer.tax_id.clone(),
        issuer_name: invoice.issuer.name.clone(),
        client_tax_id: invoice.client.tax_id.clone(),
        client_name: invoice.client.name.clone(),
        base_amount,
        tax_amount,
        total_amount: base_amount + tax_amount,
        tax_details,
        operation_type: OPERATION_ALTA.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::{InvoiceLine, Party};
    use chrono::NaiveDate;

    fn invoice_with(lines: Vec<InvoiceLine>, date: NaiveDate) -> Invoice {
        Invoice {
            number: "FAC-1".into(),
            issue_date: date,
            lines,
            issuer: Party {
                tax_id: "B12345678".into(),
                name: "Empresa SL".into(),
            },
            client: Party {
                tax_id: "12345678Z".into(),
                name: "Cliente".into(),
            },
        }
    }

    #[test]
    fn splits_gross_amounts_into_net_and_tax() {
        let invoice = invoice_with(
            vec![
                InvoiceLine {
                    amount: 121.0,
                    vat_rate: 21.0,
                },
                InvoiceLine {
                    amount: 110.0,
                    vat_rate: 10.0,
                },
            ],
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        );
        let record = transform_invoice(&invoice);

        assert_eq!(record.tax_details.len(), 2);
        assert_eq!(record.tax_details[0].rate, 10.0);
        assert!((record.tax_details[0].base_amount - 100.0).abs() < 0.01);
        assert!((record.tax_details[0].tax_amount - 10.0).abs() < 0.01);
        assert_eq!(record.tax_details[1].rate, 21.0);
        assert!((record.tax_details[1].base_amount - 100.0).abs() < 0.01);
        assert!((record.tax_details[1].tax_amount - 21.0).abs() < 0.01);
        assert!((record.total_amount - 231.0).abs() < 0.01);
    }

    #[test]
    fn accumulates_lines_sharing_a_rate() {
        let invoice = invoice_with(
            vec![
                InvoiceLine {
                    amount: 60.5,
                    vat_rate: 21.0,
                },
                InvoiceLine {
                    amount: 60.5,
                    vat_rate: 21.0,
                },
            ],
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        let record = transform_invoice(&invoice);
        assert_eq!(record.tax_details.len(), 1);
        assert!((record.tax_details[0].base_amount - 100.0).abs() < 0.01);
        assert!((record.tax_details[0].tax_amount - 21.0).abs() < 0.01);
    }

    #[test]
    fn totals_balance_for_arbitrary_rate_mixes() {
        let invoice = invoice_with(
            vec![
                InvoiceLine {
                    amount: 37.93,
                    vat_rate: 4.0,
                },
                InvoiceLine {
                    amount: 250.11,
                    vat_rate: 10.0,
                },
                InvoiceLine {
                    amount: 999.99,
                    vat_rate: 21.0,
                },
                InvoiceLine {
                    amount: 12.0,
                    vat_rate: 0.0,
                },
            ],
            NaiveDate::from_ymd_opt(2023, 11, 30).unwrap(),
        );
        let record = transform_invoice(&invoice);
        let rates: Vec<f64> = record.tax_details.iter().map(|d| d.rate).collect();
        assert_eq!(rates, vec![0.0, 4.0, 10.0, 21.0]);
        assert!((record.base_amount + record.tax_amount - record.total_amount).abs() < 0.01);
        let line_total: f64 = invoice.lines.iter().map(|l| l.amount).sum();
        assert!((record.total_amount - line_total).abs() < 0.01);
    }

    #[test]
    fn period_maps_months_to_quarters() {
        let expect = [
            (1, "01"),
            (2, "01"),
            (3, "01"),
            (4, "02"),
            (5, "02"),
            (6, "02"),
            (7, "03"),
            (8, "03"),
            (9, "03"),
            (10, "04"),
            (11, "04"),
            (12, "04"),
        ];
        for (month, period) in expect {
            let invoice = invoice_with(
                vec![InvoiceLine {
                    amount: 10.0,
                    vat_rate: 21.0,
                }],
                NaiveDate::from_ymd_opt(2024, month, 5).unwrap(),
            );
            assert_eq!(transform_invoice(&invoice).period, period, "month {month}");
        }
    }

    #[test]
    fn formats_date_and_year() {
        let invoice = invoice_with(
            vec![InvoiceLine {
                amount: 10.0,
                vat_rate: 21.0,
            }],
            NaiveDate::from_ymd_opt(2024, 2, 7).unwrap(),
        );
        let record = transform_invoice(&invoice);
        assert_eq!(record.invoice_date, "07-02-2024");
        assert_eq!(record.year, 2024);
        assert_eq!(record.operation_type, "A0");
    }
}
