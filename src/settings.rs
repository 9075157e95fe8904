use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Days, NaiveDate};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;
use crate::model::{InvoiceItem, InvoiceRecord};
use crate::numbering::DEFAULT_INVOICE_NUMBER;

/// Startup configuration. Passed explicitly to the store and session.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    /// Root of the JSON document store, e.g. `https://example.firebaseio.com`.
    pub store_url: String,
    /// Where exported PDFs (and the editable template) go. `~` is expanded.
    pub output_dir: String,
    pub starting_number: String,
    pub currency: String,
    pub notes: String,
    pub due_days: u64,
    pub request_timeout_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            store_url: String::new(),
            output_dir: "~/Documents/Invoices".to_string(),
            starting_number: DEFAULT_INVOICE_NUMBER.to_string(),
            currency: "₹".to_string(),
            notes: "Thank you for your business!".to_string(),
            due_days: 7,
            request_timeout_secs: 30,
        }
    }
}

impl AppSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(expand_home_dir(&self.output_dir))
    }

    /// Blank invoice for a new session: starting number, issued `today`,
    /// due `due_days` later, one empty item.
    pub fn default_record(&self, today: NaiveDate) -> InvoiceRecord {
        let due = today
            .checked_add_days(Days::new(self.due_days))
            .unwrap_or(today);
        InvoiceRecord {
            invoice_number: self.starting_number.clone(),
            date: today.format("%Y-%m-%d").to_string(),
            due_date: due.format("%Y-%m-%d").to_string(),
            currency_symbol: self.currency.clone(),
            items: vec![InvoiceItem::blank("1")],
            tax_rate_percent: Some(0.0),
            discount_value: Some(0.0),
            shipping_cost: Some(0.0),
            notes: self.notes.clone(),
            ..Default::default()
        }
    }
}

pub fn config_path() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("com", "invoice-builder", "app") {
        return proj_dirs.config_dir().join("settings.toml");
    }
    PathBuf::from("settings.toml")
}

/// `Ok(None)` when no settings file exists yet.
pub fn load_settings(path: &Path) -> Result<Option<AppSettings>, SettingsError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let settings = toml::from_str(&content).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(settings))
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> Result<(), SettingsError> {
    let write_err = |source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(write_err)?;
    }
    let toml_str = toml::to_string_pretty(settings)?;
    fs::write(path, toml_str).map_err(write_err)
}

pub fn expand_home_dir(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(base_dirs) = BaseDirs::new() {
            let home = base_dirs.home_dir().to_string_lossy();
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}
