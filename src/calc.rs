use serde::Serialize;

use crate::model::{DiscountType, InvoiceItem, InvoiceRecord};

/// Monetary figures derived from one invoice. Unrounded; formatting for
/// display happens in `format_money`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Totals {
    pub subtotal: f64,
    pub tax_amount: f64,
    pub discount_amount: f64,
    pub shipping: f64,
    pub total: f64,
}

/// Absent (unparsed) numeric input counts as zero.
pub fn value_or_zero(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

pub fn line_amount(item: &InvoiceItem) -> f64 {
    value_or_zero(item.quantity) * value_or_zero(item.price)
}

/// Derives subtotal, tax, discount and total. Used by both the terminal
/// preview and the exported document.
pub fn compute_totals(record: &InvoiceRecord) -> Totals {
    let subtotal = record
        .items
        .iter()
        .map(line_amount)
        .fold(0.0, |acc, amount| acc + amount);

    let tax_amount = subtotal * (value_or_zero(record.tax_rate_percent) / 100.0);

    let discount_value = value_or_zero(record.discount_value);
    let discount_amount = match record.discount_type {
        DiscountType::Percentage => subtotal * (discount_value / 100.0),
        DiscountType::Fixed => discount_value,
    };

    let shipping = value_or_zero(record.shipping_cost);
    let total = subtotal + tax_amount + shipping - discount_amount;

    Totals {
        subtotal,
        tax_amount,
        discount_amount,
        shipping,
        total,
    }
}

pub fn format_money(symbol: &str, amount: f64) -> String {
    format!("{}{:.2}", symbol, amount)
}
