use tracing::debug;

use crate::model::{DiscountType, InvoiceItem, InvoiceRecord, Product};

/// A single field change on the record being edited.
#[derive(Debug, Clone, PartialEq)]
pub enum InvoiceEdit {
    InvoiceNumber(String),
    Date(String),
    DueDate(String),
    BillerName(String),
    BillerEmail(String),
    BillerAddress(String),
    BillerPhone(String),
    BillerTaxId(String),
    ClientName(String),
    ClientEmail(String),
    ClientAddress(String),
    Currency(String),
    TaxRate(Option<f64>),
    DiscountType(DiscountType),
    DiscountValue(Option<f64>),
    Shipping(Option<f64>),
    Notes(String),
    Logo(Option<String>),
    AddItem { id: String },
    RemoveItem { id: String },
    Item { id: String, field: ItemField },
    /// Copies a catalog product's name and price onto an item.
    ApplyProduct { item_id: String, product: Product },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemField {
    Name(String),
    Description(String),
    Quantity(Option<f64>),
    Price(Option<f64>),
}

/// Returns a new record with `edit` applied; `record` is not touched.
/// Edits addressing an unknown item id change nothing.
pub fn apply_edit(record: &InvoiceRecord, edit: InvoiceEdit) -> InvoiceRecord {
    let mut next = record.clone();
    match edit {
        InvoiceEdit::InvoiceNumber(v) => next.invoice_number = v,
        InvoiceEdit::Date(v) => next.date = v,
        InvoiceEdit::DueDate(v) => next.due_date = v,
        InvoiceEdit::BillerName(v) => next.biller.name = v,
        InvoiceEdit::BillerEmail(v) => next.biller.email = v,
        InvoiceEdit::BillerAddress(v) => next.biller.address = v,
        InvoiceEdit::BillerPhone(v) => next.biller.phone = v,
        InvoiceEdit::BillerTaxId(v) => next.biller.tax_id = v,
        InvoiceEdit::ClientName(v) => next.client.name = v,
        InvoiceEdit::ClientEmail(v) => next.client.email = v,
        InvoiceEdit::ClientAddress(v) => next.client.address = v,
        InvoiceEdit::Currency(v) => next.currency_symbol = v,
        InvoiceEdit::TaxRate(v) => next.tax_rate_percent = v,
        InvoiceEdit::DiscountType(v) => next.discount_type = v,
        InvoiceEdit::DiscountValue(v) => next.discount_value = v,
        InvoiceEdit::Shipping(v) => next.shipping_cost = v,
        InvoiceEdit::Notes(v) => next.notes = v,
        InvoiceEdit::Logo(v) => next.logo_data_url = v,
        InvoiceEdit::AddItem { id } => {
            if next.item(&id).is_some() {
                debug!(%id, "item id already present, not adding");
            } else {
                next.items.push(InvoiceItem::blank(id));
            }
        }
        InvoiceEdit::RemoveItem { id } => next.items.retain(|i| i.id != id),
        InvoiceEdit::Item { id, field } => {
            if let Some(item) = next.items.iter_mut().find(|i| i.id == id) {
                match field {
                    ItemField::Name(v) => item.name = v,
                    ItemField::Description(v) => item.description = v,
                    ItemField::Quantity(v) => item.quantity = v,
                    ItemField::Price(v) => item.price = v,
                }
            }
        }
        InvoiceEdit::ApplyProduct { item_id, product } => {
            if let Some(item) = next.items.iter_mut().find(|i| i.id == item_id) {
                item.name = product.name;
                item.price = Some(product.price);
            }
        }
    }
    next
}

/// Item id unused in `record`, derived from a millisecond timestamp.
pub fn fresh_item_id(record: &InvoiceRecord, now_millis: i64) -> String {
    let mut candidate = now_millis;
    loop {
        let id = candidate.to_string();
        if record.item(&id).is_none() {
            return id;
        }
        candidate += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record() -> InvoiceRecord {
        InvoiceRecord {
            invoice_number: "INV-0001".into(),
            items: vec![InvoiceItem::blank("1")],
            ..Default::default()
        }
    }

    #[test]
    fn field_edit_returns_new_record() {
        let before = record();
        let after = apply_edit(&before, InvoiceEdit::ClientName("Globex".into()));
        assert_eq!(after.client.name, "Globex");
        assert_eq!(before.client.name, "");
        assert_eq!(after.invoice_number, before.invoice_number);
    }

    #[test]
    fn item_lifecycle() {
        let r = apply_edit(&record(), InvoiceEdit::AddItem { id: "2".into() });
        assert_eq!(r.items.len(), 2);
        assert_eq!(r.items[1], InvoiceItem::blank("2"));

        let r = apply_edit(
            &r,
            InvoiceEdit::Item { id: "2".into(), field: ItemField::Quantity(Some(4.0)) },
        );
        let r = apply_edit(
            &r,
            InvoiceEdit::Item { id: "2".into(), field: ItemField::Description("hours".into()) },
        );
        assert_eq!(r.items[1].quantity, Some(4.0));
        assert_eq!(r.items[1].description, "hours");
        assert_eq!(r.items[0], InvoiceItem::blank("1"));

        let r = apply_edit(&r, InvoiceEdit::RemoveItem { id: "1".into() });
        assert_eq!(r.items.len(), 1);
        assert_eq!(r.items[0].id, "2");

        let r = apply_edit(&r, InvoiceEdit::RemoveItem { id: "2".into() });
        assert!(r.items.is_empty());
    }

    #[test]
    fn duplicate_item_id_is_rejected() {
        let r = apply_edit(&record(), InvoiceEdit::AddItem { id: "1".into() });
        assert_eq!(r.items.len(), 1);
    }

    #[test]
    fn unknown_item_edit_is_a_no_op() {
        let before = record();
        let after = apply_edit(
            &before,
            InvoiceEdit::Item { id: "nope".into(), field: ItemField::Name("x".into()) },
        );
        assert_eq!(after, before);
    }

    #[test]
    fn product_fills_name_and_price() {
        let product = Product { id: "p1".into(), name: "Logo design".into(), price: 120.0 };
        let r = apply_edit(&record(), InvoiceEdit::ApplyProduct { item_id: "1".into(), product });
        assert_eq!(r.items[0].name, "Logo design");
        assert_eq!(r.items[0].price, Some(120.0));
        assert_eq!(r.items[0].quantity, Some(1.0));
    }

    #[test]
    fn fresh_id_skips_taken_ids() {
        let mut r = record();
        r.items.push(InvoiceItem::blank("1000"));
        r.items.push(InvoiceItem::blank("1001"));
        assert_eq!(fresh_item_id(&r, 1000), "1002");
        assert_eq!(fresh_item_id(&r, 5), "5");
    }
}
