//! Remote persistence for invoices, company defaults and the product catalog.
//!
//! The store is a realtime-database style JSON tree: every collection is a
//! JSON object keyed by a store-assigned id, every resource is addressed as
//! `<base>/<path>.json`, and writes are last-writer-wins.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::model::{Biller, InvoiceRecord, Product};

/// Persistence capability the editing session depends on.
pub trait InvoiceStore {
    fn company_defaults(&self) -> Result<Option<Biller>, StoreError>;
    fn save_company_defaults(&self, biller: &Biller) -> Result<(), StoreError>;

    /// Newest stored invoice, if any.
    fn most_recent_invoice(&self) -> Result<Option<InvoiceRecord>, StoreError> {
        Ok(self.list_invoices()?.into_iter().next())
    }

    /// Stores a new record and returns its assigned id.
    fn create_invoice(&self, record: &InvoiceRecord) -> Result<String, StoreError>;
    fn update_invoice(&self, id: &str, record: &InvoiceRecord) -> Result<(), StoreError>;
    fn delete_invoice(&self, id: &str) -> Result<(), StoreError>;
    /// Most recently added first, each with `storage_id` set.
    fn list_invoices(&self) -> Result<Vec<InvoiceRecord>, StoreError>;

    fn list_products(&self) -> Result<Vec<Product>, StoreError>;
    fn add_product(&self, name: &str, price: f64) -> Result<String, StoreError>;
    fn delete_product(&self, id: &str) -> Result<(), StoreError>;
}

#[derive(Deserialize)]
struct Created {
    name: String,
}

/// JSON-over-HTTP store client.
pub struct HttpStore {
    base_url: String,
    client: Client,
}

impl HttpStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(StoreError::Client)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path)
    }

    fn send(&self, op: &'static str, request: RequestBuilder) -> Result<String, StoreError> {
        debug!(op, "store request");
        let response = request
            .send()
            .map_err(|source| StoreError::Transport { op, source })?;
        let status = response.status();
        if !status.is_success() {
            warn!(op, status = status.as_u16(), "store rejected request");
            return Err(StoreError::Status {
                op,
                status: status.as_u16(),
            });
        }
        response
            .text()
            .map_err(|source| StoreError::Transport { op, source })
    }

    fn fetch<T: DeserializeOwned>(
        &self,
        op: &'static str,
        request: RequestBuilder,
    ) -> Result<T, StoreError> {
        let body = self.send(op, request)?;
        serde_json::from_str(&body).map_err(|source| StoreError::Decode { op, source })
    }

    fn fetch_invoices(
        &self,
        op: &'static str,
        request: RequestBuilder,
    ) -> Result<Vec<InvoiceRecord>, StoreError> {
        let entries: Option<Map<String, Value>> = self.fetch(op, request)?;
        let mut records = decode_entries(entries, |record: &mut InvoiceRecord, id| {
            record.storage_id = Some(id)
        });
        records.reverse();
        Ok(records)
    }
}

// Collection bodies are `{ "<id>": {...}, ... }` or `null` when empty.
// Entries that do not decode are skipped rather than failing the listing.
fn decode_entries<T, F>(entries: Option<Map<String, Value>>, mut assign_id: F) -> Vec<T>
where
    T: DeserializeOwned,
    F: FnMut(&mut T, String),
{
    let mut out = Vec::new();
    for (id, value) in entries.unwrap_or_default() {
        match serde_json::from_value::<T>(value) {
            Ok(mut item) => {
                assign_id(&mut item, id);
                out.push(item);
            }
            Err(e) => warn!(%id, error = %e, "skipping undecodable store entry"),
        }
    }
    out
}

// Keys end up in the URL path; reserved characters would address a
// different resource.
fn checked_id(id: &str) -> Result<&str, StoreError> {
    let reserved = ['/', '.', '#', '$', '[', ']', '?'];
    if id.is_empty() || id.chars().any(|c| reserved.contains(&c) || c.is_control()) {
        return Err(StoreError::InvalidId(id.to_string()));
    }
    Ok(id)
}

impl InvoiceStore for HttpStore {
    fn company_defaults(&self) -> Result<Option<Biller>, StoreError> {
        self.fetch("get company defaults", self.client.get(self.url("company")))
    }

    fn save_company_defaults(&self, biller: &Biller) -> Result<(), StoreError> {
        self.send(
            "save company defaults",
            self.client.put(self.url("company")).json(biller),
        )?;
        info!("company defaults saved");
        Ok(())
    }

    // Only the number matters to callers here, so a newest entry that does
    // not decode as a whole still yields its `invoiceNumber`.
    fn most_recent_invoice(&self) -> Result<Option<InvoiceRecord>, StoreError> {
        let request = self
            .client
            .get(self.url("invoices"))
            .query(&[("orderBy", "\"$key\""), ("limitToLast", "1")]);
        let entries: Option<Map<String, Value>> = self.fetch("get most recent invoice", request)?;
        let Some((id, value)) = entries.unwrap_or_default().into_iter().last() else {
            return Ok(None);
        };

        let invoice_number = value
            .get("invoiceNumber")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let record = serde_json::from_value::<InvoiceRecord>(value).unwrap_or_else(|e| {
            warn!(%id, error = %e, "latest invoice is malformed, keeping its number only");
            InvoiceRecord {
                invoice_number,
                ..Default::default()
            }
        });
        Ok(Some(InvoiceRecord {
            storage_id: Some(id),
            ..record
        }))
    }

    fn create_invoice(&self, record: &InvoiceRecord) -> Result<String, StoreError> {
        let created: Created = self.fetch(
            "create invoice",
            self.client.post(self.url("invoices")).json(record),
        )?;
        info!(id = %created.name, number = %record.invoice_number, "invoice created");
        Ok(created.name)
    }

    fn update_invoice(&self, id: &str, record: &InvoiceRecord) -> Result<(), StoreError> {
        let id = checked_id(id)?;
        self.send(
            "update invoice",
            self.client
                .put(self.url(&format!("invoices/{}", id)))
                .json(record),
        )?;
        info!(%id, number = %record.invoice_number, "invoice updated");
        Ok(())
    }

    fn delete_invoice(&self, id: &str) -> Result<(), StoreError> {
        let id = checked_id(id)?;
        self.send(
            "delete invoice",
            self.client.delete(self.url(&format!("invoices/{}", id))),
        )?;
        info!(%id, "invoice deleted");
        Ok(())
    }

    fn list_invoices(&self) -> Result<Vec<InvoiceRecord>, StoreError> {
        self.fetch_invoices("list invoices", self.client.get(self.url("invoices")))
    }

    fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let entries: Option<Map<String, Value>> =
            self.fetch("list products", self.client.get(self.url("products")))?;
        Ok(decode_entries(entries, |product: &mut Product, id| {
            product.id = id
        }))
    }

    fn add_product(&self, name: &str, price: f64) -> Result<String, StoreError> {
        let product = Product {
            id: String::new(),
            name: name.to_string(),
            price,
        };
        let created: Created = self.fetch(
            "add product",
            self.client.post(self.url("products")).json(&product),
        )?;
        info!(id = %created.name, %name, "product added");
        Ok(created.name)
    }

    fn delete_product(&self, id: &str) -> Result<(), StoreError> {
        let id = checked_id(id)?;
        self.send(
            "delete product",
            self.client.delete(self.url(&format!("products/{}", id))),
        )?;
        info!(%id, "product deleted");
        Ok(())
    }
}

/// In-memory store for exercising sessions without a server.
#[cfg(test)]
pub mod memory {
    use std::cell::{Cell, RefCell};

    use super::*;

    #[derive(Default)]
    pub struct MemoryStore {
        pub company: RefCell<Option<Biller>>,
        // Insertion order, oldest first.
        pub invoices: RefCell<Vec<(String, InvoiceRecord)>>,
        pub products: RefCell<Vec<Product>>,
        pub failing: Cell<bool>,
        next_id: Cell<u32>,
    }

    impl MemoryStore {
        fn check(&self, op: &'static str) -> Result<(), StoreError> {
            if self.failing.get() {
                return Err(StoreError::Status { op, status: 503 });
            }
            Ok(())
        }

        fn assign_id(&self) -> String {
            let n = self.next_id.get() + 1;
            self.next_id.set(n);
            format!("-K{:04}", n)
        }
    }

    impl InvoiceStore for MemoryStore {
        fn company_defaults(&self) -> Result<Option<Biller>, StoreError> {
            self.check("get company defaults")?;
            Ok(self.company.borrow().clone())
        }

        fn save_company_defaults(&self, biller: &Biller) -> Result<(), StoreError> {
            self.check("save company defaults")?;
            *self.company.borrow_mut() = Some(biller.clone());
            Ok(())
        }

        fn create_invoice(&self, record: &InvoiceRecord) -> Result<String, StoreError> {
            self.check("create invoice")?;
            let id = self.assign_id();
            let mut stored = record.clone();
            stored.storage_id = None;
            self.invoices.borrow_mut().push((id.clone(), stored));
            Ok(id)
        }

        fn update_invoice(&self, id: &str, record: &InvoiceRecord) -> Result<(), StoreError> {
            self.check("update invoice")?;
            let mut invoices = self.invoices.borrow_mut();
            match invoices.iter_mut().find(|(key, _)| key == id) {
                Some((_, stored)) => {
                    *stored = record.clone();
                    stored.storage_id = None;
                }
                None => invoices.push((id.to_string(), record.clone())),
            }
            Ok(())
        }

        fn delete_invoice(&self, id: &str) -> Result<(), StoreError> {
            self.check("delete invoice")?;
            self.invoices.borrow_mut().retain(|(key, _)| key != id);
            Ok(())
        }

        fn list_invoices(&self) -> Result<Vec<InvoiceRecord>, StoreError> {
            self.check("list invoices")?;
            Ok(self
                .invoices
                .borrow()
                .iter()
                .rev()
                .map(|(id, record)| InvoiceRecord {
                    storage_id: Some(id.clone()),
                    ..record.clone()
                })
                .collect())
        }

        fn list_products(&self) -> Result<Vec<Product>, StoreError> {
            self.check("list products")?;
            Ok(self.products.borrow().clone())
        }

        fn add_product(&self, name: &str, price: f64) -> Result<String, StoreError> {
            self.check("add product")?;
            let id = self.assign_id();
            self.products.borrow_mut().push(Product {
                id: id.clone(),
                name: name.to_string(),
                price,
            });
            Ok(id)
        }

        fn delete_product(&self, id: &str) -> Result<(), StoreError> {
            self.check("delete product")?;
            self.products.borrow_mut().retain(|p| p.id != id);
            Ok(())
        }
    }
}
