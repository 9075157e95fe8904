//! The editing session: one current invoice plus the loaded history list.
//!
//! Store failures never leave the session half-updated. Every action either
//! completes and replaces state wholesale, or returns the error with the
//! current record untouched.

use std::path::PathBuf;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::calc::{Totals, compute_totals};
use crate::edit::{InvoiceEdit, apply_edit};
use crate::error::SessionError;
use crate::model::{InvoiceRecord, Product};
use crate::numbering::next_invoice_number;
use crate::render::PdfRenderer;
use crate::settings::AppSettings;
use crate::store::InvoiceStore;

pub struct Session<S: InvoiceStore> {
    store: S,
    current: InvoiceRecord,
    history: Vec<InvoiceRecord>,
}

impl<S: InvoiceStore> Session<S> {
    /// Fresh session: default record, company defaults merged in, number
    /// continued from the most recent stored invoice. Store problems while
    /// seeding are logged and the defaults kept.
    pub fn start(store: S, settings: &AppSettings, today: NaiveDate) -> Self {
        let mut current = settings.default_record(today);

        match store.company_defaults() {
            Ok(Some(biller)) => current.biller = biller,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "could not load company defaults"),
        }

        match store.most_recent_invoice() {
            Ok(Some(last)) if !last.invoice_number.is_empty() => {
                current.invoice_number = next_invoice_number(&last.invoice_number);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "could not load last invoice number"),
        }

        info!(number = %current.invoice_number, "session started");
        Self {
            store,
            current,
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> &InvoiceRecord {
        &self.current
    }

    pub fn history(&self) -> &[InvoiceRecord] {
        &self.history
    }

    pub fn totals(&self) -> Totals {
        compute_totals(&self.current)
    }

    pub fn apply(&mut self, edit: InvoiceEdit) {
        self.current = apply_edit(&self.current, edit);
    }

    /// Creates the record if it has never been stored, otherwise replaces
    /// the stored copy. Returns the record as stored (with its id).
    ///
    /// After a first-time save the current record moves on to the next
    /// invoice number so the following save creates a new invoice.
    pub fn save(&mut self) -> Result<InvoiceRecord, SessionError> {
        match self.current.storage_id.clone() {
            Some(id) => {
                self.store.update_invoice(&id, &self.current)?;
                let saved = self.current.clone();
                if let Some(entry) = self
                    .history
                    .iter_mut()
                    .find(|r| r.storage_id.as_deref() == Some(id.as_str()))
                {
                    *entry = saved.clone();
                }
                Ok(saved)
            }
            None => {
                let id = self.store.create_invoice(&self.current)?;
                let saved = InvoiceRecord {
                    storage_id: Some(id),
                    ..self.current.clone()
                };
                self.history.insert(0, saved.clone());
                self.current.invoice_number = next_invoice_number(&saved.invoice_number);
                Ok(saved)
            }
        }
    }

    /// Saves, then exports what was saved. A failed save skips the export.
    pub fn save_and_export(
        &mut self,
        renderer: &dyn PdfRenderer,
    ) -> Result<PathBuf, SessionError> {
        let saved = self.save()?;
        Ok(renderer.export(&saved)?)
    }

    /// Reloads the stored invoices, newest first.
    pub fn refresh_history(&mut self) -> Result<&[InvoiceRecord], SessionError> {
        self.history = self.store.list_invoices()?;
        Ok(&self.history)
    }

    fn find_in_history(&self, storage_id: &str) -> Result<&InvoiceRecord, SessionError> {
        self.history
            .iter()
            .find(|r| r.storage_id.as_deref() == Some(storage_id))
            .ok_or_else(|| SessionError::UnknownRecord(storage_id.to_string()))
    }

    /// Replaces the current record with a stored one for editing.
    pub fn load_from_history(&mut self, storage_id: &str) -> Result<(), SessionError> {
        self.current = self.find_in_history(storage_id)?.clone();
        Ok(())
    }

    pub fn delete_from_history(&mut self, storage_id: &str) -> Result<(), SessionError> {
        self.find_in_history(storage_id)?;
        self.store.delete_invoice(storage_id)?;
        self.history
            .retain(|r| r.storage_id.as_deref() != Some(storage_id));
        Ok(())
    }

    pub fn export_from_history(
        &self,
        storage_id: &str,
        renderer: &dyn PdfRenderer,
    ) -> Result<PathBuf, SessionError> {
        Ok(renderer.export(self.find_in_history(storage_id)?)?)
    }

    /// Stores the current biller fields as defaults for future sessions.
    pub fn save_company_defaults(&self) -> Result<(), SessionError> {
        Ok(self.store.save_company_defaults(&self.current.biller)?)
    }

    pub fn products(&self) -> Result<Vec<Product>, SessionError> {
        Ok(self.store.list_products()?)
    }

    pub fn add_product(&self, name: &str, price: f64) -> Result<String, SessionError> {
        Ok(self.store.add_product(name, price)?)
    }

    pub fn delete_product(&self, id: &str) -> Result<(), SessionError> {
        Ok(self.store.delete_product(id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::ItemField;
    use crate::error::ExportError;
    use crate::model::Biller;
    use crate::store::memory::MemoryStore;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingRenderer {
        exported: RefCell<Vec<InvoiceRecord>>,
        fail: bool,
    }

    impl PdfRenderer for RecordingRenderer {
        fn export(&self, record: &InvoiceRecord) -> Result<PathBuf, ExportError> {
            if self.fail {
                return Err(ExportError::MissingTypst);
            }
            self.exported.borrow_mut().push(record.clone());
            Ok(PathBuf::from(crate::render::pdf_file_name(&record.invoice_number)))
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    fn start(store: MemoryStore) -> Session<MemoryStore> {
        Session::start(store, &AppSettings::default(), today())
    }

    #[test]
    fn empty_store_starts_from_default_number() {
        let session = start(MemoryStore::default());
        assert_eq!(session.current().invoice_number, "INV-0001");
        assert_eq!(session.current().due_date, "2026-10-25");
        assert_eq!(session.current().items.len(), 1);
    }

    #[test]
    fn start_continues_numbering_and_uses_company_defaults() {
        let store = MemoryStore::default();
        store.create_invoice(&InvoiceRecord { invoice_number: "INV-0007".into(), ..Default::default() }).unwrap();
        store.create_invoice(&InvoiceRecord { invoice_number: "INV-0009".into(), ..Default::default() }).unwrap();
        let biller = Biller { name: "Acme".into(), ..Default::default() };
        store.save_company_defaults(&biller).unwrap();

        let session = start(store);
        assert_eq!(session.current().invoice_number, "INV-0010");
        assert_eq!(session.current().biller, biller);
    }

    #[test]
    fn unreachable_store_still_starts() {
        let store = MemoryStore::default();
        store.failing.set(true);
        let session = start(store);
        assert_eq!(session.current().invoice_number, "INV-0001");
    }

    #[test]
    fn first_save_creates_and_advances_number() {
        let mut session = start(MemoryStore::default());
        session.apply(InvoiceEdit::ClientName("Globex".into()));

        let saved = session.save().unwrap();
        assert_eq!(saved.invoice_number, "INV-0001");
        assert!(saved.is_persisted());
        assert_eq!(session.current().invoice_number, "INV-0002");
        assert!(!session.current().is_persisted());
        assert_eq!(session.current().client.name, "Globex");
        assert_eq!(session.history().len(), 1);

        // The next save is a new invoice, not an update.
        session.save().unwrap();
        assert_eq!(session.store.invoices.borrow().len(), 2);
        assert_eq!(session.current().invoice_number, "INV-0003");
    }

    #[test]
    fn saving_a_loaded_record_updates_it_in_place() {
        let mut session = start(MemoryStore::default());
        session.save().unwrap();
        session.refresh_history().unwrap();
        let id = session.history()[0].storage_id.clone().unwrap();

        session.load_from_history(&id).unwrap();
        assert_eq!(session.current().invoice_number, "INV-0001");
        session.apply(InvoiceEdit::Notes("Updated".into()));
        let saved = session.save().unwrap();

        assert_eq!(saved.storage_id.as_deref(), Some(id.as_str()));
        assert_eq!(session.current().invoice_number, "INV-0001");
        let stored = session.store.invoices.borrow();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].1.notes, "Updated");
        drop(stored);
        assert_eq!(session.history()[0].notes, "Updated");
    }

    #[test]
    fn failed_save_leaves_state_unchanged() {
        let mut session = start(MemoryStore::default());
        session.apply(InvoiceEdit::Shipping(Some(4.0)));
        let before = session.current().clone();

        session.store.failing.set(true);
        assert!(matches!(session.save(), Err(SessionError::Store(_))));
        assert_eq!(session.current(), &before);
        assert!(session.history().is_empty());
    }

    #[test]
    fn save_and_export_renders_the_saved_record() {
        let mut session = start(MemoryStore::default());
        let renderer = RecordingRenderer::default();

        let path = session.save_and_export(&renderer).unwrap();
        assert_eq!(path, PathBuf::from("Invoice-INV-0001.pdf"));
        let exported = renderer.exported.borrow();
        assert_eq!(exported[0].invoice_number, "INV-0001");
        assert_eq!(session.current().invoice_number, "INV-0002");
    }

    #[test]
    fn failed_save_aborts_export() {
        let mut session = start(MemoryStore::default());
        session.store.failing.set(true);
        let renderer = RecordingRenderer::default();

        assert!(session.save_and_export(&renderer).is_err());
        assert!(renderer.exported.borrow().is_empty());
        assert_eq!(session.current().invoice_number, "INV-0001");
    }

    #[test]
    fn export_failure_is_reported_after_save() {
        let mut session = start(MemoryStore::default());
        let renderer = RecordingRenderer { fail: true, ..Default::default() };
        let err = session.save_and_export(&renderer).unwrap_err();
        assert!(matches!(err, SessionError::Export(ExportError::MissingTypst)));
        assert_eq!(session.store.invoices.borrow().len(), 1);
    }

    #[test]
    fn history_delete_and_export() {
        let mut session = start(MemoryStore::default());
        session.save().unwrap();
        session.save().unwrap();
        let history = session.refresh_history().unwrap();
        let numbers: Vec<_> = history.iter().map(|r| r.invoice_number.clone()).collect();
        assert_eq!(numbers, vec!["INV-0002", "INV-0001"]);

        let oldest = session.history()[1].storage_id.clone().unwrap();
        let renderer = RecordingRenderer::default();
        session.export_from_history(&oldest, &renderer).unwrap();
        assert_eq!(renderer.exported.borrow()[0].invoice_number, "INV-0001");

        session.delete_from_history(&oldest).unwrap();
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.store.invoices.borrow().len(), 1);

        assert!(matches!(
            session.delete_from_history(&oldest),
            Err(SessionError::UnknownRecord(_))
        ));
    }

    #[test]
    fn failed_delete_keeps_history_entry() {
        let mut session = start(MemoryStore::default());
        let saved = session.save().unwrap();
        session.store.failing.set(true);
        let id = saved.storage_id.unwrap();
        assert!(session.delete_from_history(&id).is_err());
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn company_defaults_and_catalog() {
        let mut session = start(MemoryStore::default());
        session.apply(InvoiceEdit::BillerName("Initech".into()));
        session.save_company_defaults().unwrap();
        assert_eq!(session.store.company.borrow().as_ref().unwrap().name, "Initech");

        let id = session.add_product("Consulting", 90.0).unwrap();
        let product = session.products().unwrap().remove(0);
        session.apply(InvoiceEdit::ApplyProduct { item_id: "1".into(), product });
        session.apply(InvoiceEdit::Item { id: "1".into(), field: ItemField::Quantity(Some(2.0)) });
        assert_eq!(session.totals().total, 180.0);

        session.delete_product(&id).unwrap();
        assert!(session.products().unwrap().is_empty());
    }
}
