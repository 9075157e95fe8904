use serde::{Deserialize, Deserializer, Serialize};

// Stored records use the flat camelCase layout (billerName, clientEmail, ...)
// that existing data already has, so the nested groups below are flattened.

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Older records hold form input verbatim, so amounts may be numeric
// strings ("2") or junk. Anything that is not a finite number reads as None.
fn loose_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
        Other(serde::de::IgnoredAny),
    }

    let value = match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => Some(n),
        Some(Raw::Text(s)) => s.trim().parse::<f64>().ok(),
        Some(Raw::Other(_)) | None => None,
    };
    Ok(value.filter(|n| n.is_finite()))
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    #[default]
    Percentage,
    /// Flat currency amount. Unrecognised stored values also land here.
    #[serde(other)]
    Fixed,
}

impl DiscountType {
    pub fn label(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "%",
            DiscountType::Fixed => "Fixed",
        }
    }
}

/// The issuing company. Also the shape of the stored company defaults.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Biller {
    #[serde(rename = "billerName", deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "billerEmail", deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(rename = "billerAddress", deserialize_with = "null_as_default")]
    pub address: String,
    #[serde(rename = "billerPhone", deserialize_with = "null_as_default")]
    pub phone: String,
    #[serde(rename = "billerGst", deserialize_with = "null_as_default")]
    pub tax_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Client {
    #[serde(rename = "clientName", deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "clientEmail", deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(rename = "clientAddress", deserialize_with = "null_as_default")]
    pub address: String,
}

/// One billable row. `quantity`/`price` are `None` while the input is
/// unparsed (stored as `null`); the calculator reads them as zero.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct InvoiceItem {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "loose_number")]
    pub quantity: Option<f64>,
    #[serde(deserialize_with = "loose_number")]
    pub price: Option<f64>,
}

impl InvoiceItem {
    pub fn blank(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: String::new(),
            quantity: Some(1.0),
            price: Some(0.0),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct InvoiceRecord {
    #[serde(deserialize_with = "null_as_default")]
    pub invoice_number: String,
    #[serde(deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(deserialize_with = "null_as_default")]
    pub due_date: String,
    #[serde(flatten)]
    pub biller: Biller,
    #[serde(flatten)]
    pub client: Client,
    #[serde(rename = "currency", deserialize_with = "null_as_default")]
    pub currency_symbol: String,
    #[serde(deserialize_with = "null_as_default")]
    pub items: Vec<InvoiceItem>,
    #[serde(rename = "taxRate", deserialize_with = "loose_number")]
    pub tax_rate_percent: Option<f64>,
    #[serde(deserialize_with = "null_as_default")]
    pub discount_type: DiscountType,
    #[serde(deserialize_with = "loose_number")]
    pub discount_value: Option<f64>,
    #[serde(rename = "shipping", deserialize_with = "loose_number")]
    pub shipping_cost: Option<f64>,
    #[serde(deserialize_with = "null_as_default")]
    pub notes: String,
    #[serde(rename = "logo")]
    pub logo_data_url: Option<String>,
    /// Key assigned by the store. Never part of the stored body.
    #[serde(skip)]
    pub storage_id: Option<String>,
}

impl InvoiceRecord {
    pub fn is_persisted(&self) -> bool {
        self.storage_id.is_some()
    }

    pub fn item(&self, id: &str) -> Option<&InvoiceItem> {
        self.items.iter().find(|i| i.id == id)
    }
}

/// Catalog entry used to autofill an item's name and price.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Product {
    #[serde(skip)]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub price: f64,
}

/// One table row as the document template sees it.
#[derive(Debug, Serialize, Clone)]
pub struct ContextRow {
    pub name: String,
    pub description: String,
    pub quantity: String,
    pub price: String,
    pub amount: String,
}

/// Everything the document template needs, with money already formatted.
#[derive(Debug, Serialize)]
pub struct InvoiceContext {
    pub invoice_number: String,
    pub date: String,
    pub due_date: String,
    pub biller: Biller,
    pub client: Client,
    pub rows: Vec<ContextRow>,
    pub notes: String,
    pub tax_rate: String,
    pub subtotal: String,
    pub tax: Option<String>,
    pub discount: Option<String>,
    pub shipping: Option<String>,
    pub total: String,
    pub logo_file: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn serializes_to_flat_stored_shape() {
        let record = InvoiceRecord {
            invoice_number: "INV-0003".into(),
            biller: Biller { name: "Acme".into(), tax_id: "GST1".into(), ..Default::default() },
            client: Client { email: "c@example.com".into(), ..Default::default() },
            currency_symbol: "$".into(),
            items: vec![InvoiceItem::blank("1")],
            tax_rate_percent: Some(5.0),
            discount_type: DiscountType::Fixed,
            storage_id: Some("-Nabc".into()),
            ..Default::default()
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["invoiceNumber"], "INV-0003");
        assert_eq!(value["billerName"], "Acme");
        assert_eq!(value["billerGst"], "GST1");
        assert_eq!(value["clientEmail"], "c@example.com");
        assert_eq!(value["currency"], "$");
        assert_eq!(value["taxRate"], 5.0);
        assert_eq!(value["discountType"], "fixed");
        assert_eq!(value["items"][0]["quantity"], 1.0);
        assert!(value.get("storageId").is_none());
        assert!(value.get("biller").is_none());
    }

    #[test]
    fn reads_sparse_and_null_fields() {
        let value = json!({
            "invoiceNumber": "INV-0009",
            "billerName": null,
            "items": [{ "id": "1", "name": "Design", "quantity": null, "price": 40 }],
            "discountType": "percentage",
            "shipping": null,
            "firebaseId": "-Nold"
        });

        let record: InvoiceRecord = serde_json::from_value(value).unwrap();
        assert_eq!(record.invoice_number, "INV-0009");
        assert_eq!(record.biller.name, "");
        assert_eq!(record.items[0].quantity, None);
        assert_eq!(record.items[0].price, Some(40.0));
        assert_eq!(record.shipping_cost, None);
        assert_eq!(record.storage_id, None);
    }

    #[test]
    fn missing_items_is_empty_list() {
        let record: InvoiceRecord = serde_json::from_value(json!({ "items": null })).unwrap();
        assert!(record.items.is_empty());
        assert_eq!(record.discount_type, DiscountType::Percentage);
    }

    #[test]
    fn amounts_stored_as_text_still_read() {
        let value = json!({
            "invoiceNumber": "INV-0041",
            "items": [
                { "id": "1", "quantity": "2", "price": 5 },
                { "id": "2", "quantity": { "n": 1 }, "price": "abc" }
            ],
            "taxRate": " 18 ",
            "discountValue": "NaN",
            "shipping": true
        });

        let record: InvoiceRecord = serde_json::from_value(value).unwrap();
        assert_eq!(record.items[0].quantity, Some(2.0));
        assert_eq!(record.items[0].price, Some(5.0));
        assert_eq!(record.items[1].quantity, None);
        assert_eq!(record.items[1].price, None);
        assert_eq!(record.tax_rate_percent, Some(18.0));
        assert_eq!(record.discount_value, None);
        assert_eq!(record.shipping_cost, None);
    }

    #[test]
    fn unknown_discount_type_is_fixed() {
        let record: InvoiceRecord =
            serde_json::from_value(json!({ "discountType": "flat" })).unwrap();
        assert_eq!(record.discount_type, DiscountType::Fixed);
    }
}
