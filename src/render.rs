use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tera::{Context, Tera, Value};
use tracing::{info, warn};

use crate::calc::{compute_totals, format_money, line_amount, value_or_zero};
use crate::error::ExportError;
use crate::model::{ContextRow, InvoiceContext, InvoiceRecord};

// Embed template at compile time so a fresh output folder can be seeded.
const DEFAULT_TEMPLATE: &str = include_str!("../templates/invoice.tera");
const TEMPLATE_NAME: &str = "invoice.tera";

/// Turns an invoice into a PDF on disk and returns its path.
pub trait PdfRenderer {
    fn export(&self, record: &InvoiceRecord) -> Result<PathBuf, ExportError>;
}

/// `Invoice-<invoiceNumber>`, with path separators replaced.
pub fn file_stem(invoice_number: &str) -> String {
    let safe: String = invoice_number
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '-' } else { c })
        .collect();
    format!("Invoice-{}", safe)
}

pub fn pdf_file_name(invoice_number: &str) -> String {
    format!("{}.pdf", file_stem(invoice_number))
}

// 10 -> "10", 2.5 -> "2.5"
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        value.to_string()
    }
}

/// Template view of `record`. Rows and totals come from the same
/// calculator the terminal preview uses; zero tax/discount/shipping rows
/// are hidden.
pub fn build_context(record: &InvoiceRecord, logo_file: Option<String>) -> InvoiceContext {
    let totals = compute_totals(record);
    let money = |amount: f64| format_money(&record.currency_symbol, amount);

    let rows = record
        .items
        .iter()
        .map(|item| ContextRow {
            name: item.name.clone(),
            description: item.description.clone(),
            quantity: format_number(value_or_zero(item.quantity)),
            price: money(value_or_zero(item.price)),
            amount: money(line_amount(item)),
        })
        .collect();

    let tax_rate = value_or_zero(record.tax_rate_percent);
    InvoiceContext {
        invoice_number: record.invoice_number.clone(),
        date: record.date.clone(),
        due_date: record.due_date.clone(),
        biller: record.biller.clone(),
        client: record.client.clone(),
        rows,
        notes: record.notes.clone(),
        tax_rate: format_number(tax_rate),
        subtotal: money(totals.subtotal),
        tax: (tax_rate > 0.0).then(|| money(totals.tax_amount)),
        discount: (totals.discount_amount > 0.0).then(|| money(totals.discount_amount)),
        shipping: (totals.shipping > 0.0).then(|| money(totals.shipping)),
        total: money(totals.total),
        logo_file,
    }
}

/// Escapes a value for use inside a Typst string literal.
fn typst_filter(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            '\t' => escaped.push_str("\\t"),
            c => escaped.push(c),
        }
    }
    Ok(Value::String(escaped))
}

/// Splits a `data:<mime>;base64,<payload>` URL into bytes and a file extension.
pub fn decode_logo(data_url: &str) -> Result<(Vec<u8>, &'static str), ExportError> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| ExportError::Logo("not a data URL".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ExportError::Logo("missing payload".into()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| ExportError::Logo("only base64 data URLs are supported".into()))?;
    let ext = match mime {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        "image/webp" => "webp",
        other => return Err(ExportError::Logo(format!("unsupported image type {}", other))),
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| ExportError::Logo(e.to_string()))?;
    Ok((bytes, ext))
}

/// Reads an image file into a `data:` URL, the form logos are stored in.
pub fn encode_logo(path: &Path) -> Result<String, ExportError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        _ => return Err(ExportError::Logo(format!("unsupported file {}", path.display()))),
    };
    let bytes = fs::read(path)?;
    Ok(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
}

/// Renders through a Typst template and compiles with the `typst` binary.
///
/// The template lives in `<output_dir>/templates/invoice.tera` and is
/// seeded from the built-in one on first use, so it can be customised.
pub struct TypstRenderer {
    output_dir: PathBuf,
}

impl TypstRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn load_template(&self) -> Result<Tera, ExportError> {
        let template_dir = self.output_dir.join("templates");
        fs::create_dir_all(&template_dir)?;
        let template_path = template_dir.join(TEMPLATE_NAME);
        if !template_path.exists() {
            info!(path = %template_path.display(), "initializing default template");
            fs::write(&template_path, DEFAULT_TEMPLATE)?;
        }

        let mut tera = Tera::default();
        tera.add_template_file(&template_path, Some(TEMPLATE_NAME))?;
        tera.register_filter("typst", typst_filter);
        Ok(tera)
    }

    pub fn render_source(
        &self,
        record: &InvoiceRecord,
        logo_file: Option<String>,
    ) -> Result<String, ExportError> {
        let tera = self.load_template()?;
        let context = Context::from_serialize(build_context(record, logo_file))?;
        Ok(tera.render(TEMPLATE_NAME, &context)?)
    }

    /// Writes the Typst source (and logo, if any) and returns the
    /// source path plus the PDF path it compiles to.
    pub fn prepare(&self, record: &InvoiceRecord) -> Result<(PathBuf, PathBuf), ExportError> {
        fs::create_dir_all(&self.output_dir)?;
        let stem = file_stem(&record.invoice_number);

        let logo_file = match record.logo_data_url.as_deref() {
            Some(url) if !url.is_empty() => {
                let (bytes, ext) = decode_logo(url)?;
                let name = format!("{}-logo.{}", stem, ext);
                fs::write(self.output_dir.join(&name), bytes)?;
                Some(name)
            }
            _ => None,
        };

        let source = self.render_source(record, logo_file)?;
        let typ_path = self.output_dir.join(format!("{}.typ", stem));
        fs::write(&typ_path, source)?;
        Ok((typ_path, self.output_dir.join(pdf_file_name(&record.invoice_number))))
    }
}

fn compile(typ_path: &Path, pdf_path: &Path) -> Result<(), ExportError> {
    let output = Command::new("typst")
        .arg("compile")
        .arg(typ_path)
        .arg(pdf_path)
        .output()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => ExportError::MissingTypst,
            _ => ExportError::Io(e),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!(%stderr, "typst compile failed");
        return Err(ExportError::Compile {
            status: output.status.to_string(),
            stderr,
        });
    }
    Ok(())
}

impl PdfRenderer for TypstRenderer {
    fn export(&self, record: &InvoiceRecord) -> Result<PathBuf, ExportError> {
        let (typ_path, pdf_path) = self.prepare(record)?;
        info!(path = %pdf_path.display(), "compiling PDF");
        compile(&typ_path, &pdf_path)?;
        Ok(pdf_path)
    }
}
