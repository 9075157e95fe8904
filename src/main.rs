mod calc;
mod edit;
mod error;
mod model;
mod numbering;
mod render;
mod session;
mod settings;
mod store;

use std::fmt;
use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use clap::{CommandFactory, Parser, Subcommand};
use comfy_table::{Attribute, Cell, CellAlignment, Color, Table};
use inquire::validator::Validation;
use inquire::{Confirm, DateSelect, Select, Text};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::calc::{Totals, compute_totals, format_money, line_amount, value_or_zero};
use crate::edit::{InvoiceEdit, ItemField, fresh_item_id};
use crate::error::SessionError;
use crate::model::{DiscountType, InvoiceRecord};
use crate::render::{PdfRenderer, TypstRenderer, encode_logo};
use crate::session::Session;
use crate::settings::{AppSettings, config_path, load_settings, save_settings};
use crate::store::{HttpStore, InvoiceStore};

// ==========================================
// Constants
// ==========================================
const CURRENCIES: [&str; 4] = ["₹", "$", "€", "£"];
const LOGO_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "svg", "webp"];

// ==========================================
// CLI
// ==========================================

#[derive(Parser)]
#[command(name = "invoice-builder", about = "Build, store and export invoices")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new invoice
    New,
    /// Browse saved invoices (edit, export, delete)
    History,
    /// Manage the product catalog
    Products,
    /// Edit and save company defaults
    Company,
    /// Configure store location and defaults
    Config,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

// ==========================================
// Main Function
// ==========================================

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        let _ = Cli::command().print_help();
        return;
    };

    let path = config_path();
    let settings = match (&command, load_settings(&path)) {
        (Commands::Config, _) | (_, Ok(None)) => match setup_config_wizard(&path) {
            Some(s) => s,
            None => return,
        },
        (_, Ok(Some(s))) => s,
        (_, Err(e)) => {
            debug!(error = %e, "failed to load settings");
            println!("❌ {}", e);
            return;
        }
    };
    if let Commands::Config = command {
        return;
    }

    let store = match HttpStore::new(&settings.store_url, settings.request_timeout()) {
        Ok(store) => store,
        Err(e) => {
            debug!(error = %e, "failed to set up store client");
            println!("❌ {}", e);
            return;
        }
    };
    let renderer = TypstRenderer::new(settings.output_path());
    let mut session = Session::start(store, &settings, Local::now().date_naive());

    match command {
        Commands::New => run_editor(&mut session, &renderer),
        Commands::History => history_browser(&mut session, &renderer),
        Commands::Products => product_manager(&session),
        Commands::Company => company_editor(&mut session),
        Commands::Config => {}
    }
}

// Failures are shown once and the session carries on.
fn report<T>(result: Result<T, SessionError>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            debug!(error = %e, "action failed");
            println!("❌ {}", e);
            None
        }
    }
}

// ==========================================
// 1. Prompt Helpers
// ==========================================

fn ask_text(prompt: &str, current: &str) -> Option<String> {
    Text::new(prompt).with_initial_value(current).prompt().ok()
}

// `None` = not a usable number; `Some(None)` = left blank.
fn parse_number(input: &str) -> Option<Option<f64>> {
    let input = input.trim();
    if input.is_empty() {
        return Some(None);
    }
    input.parse::<f64>().ok().filter(|v| v.is_finite()).map(Some)
}

/// Outer `None` = cancelled; inner `None` = left blank.
fn ask_number(prompt: &str, current: Option<f64>) -> Option<Option<f64>> {
    let initial = current.map(|v| v.to_string()).unwrap_or_default();
    let answer = Text::new(prompt)
        .with_initial_value(&initial)
        .with_validator(|s: &str| {
            if parse_number(s).is_some() {
                Ok(Validation::Valid)
            } else {
                Ok(Validation::Invalid("Enter a number".into()))
            }
        })
        .prompt()
        .ok()?;
    Some(parse_number(&answer).flatten())
}

fn ask_date(prompt: &str, current: &str) -> Option<String> {
    let default = NaiveDate::parse_from_str(current, "%Y-%m-%d")
        .unwrap_or_else(|_| Local::now().date_naive());
    DateSelect::new(prompt)
        .with_default(default)
        .prompt()
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// Index of the picked option, `None` if cancelled.
fn pick(prompt: &str, options: Vec<String>) -> Option<usize> {
    if options.is_empty() {
        return None;
    }
    Select::new(prompt, options)
        .with_page_size(10)
        .raw_prompt()
        .ok()
        .map(|choice| choice.index)
}

fn pick_logo() -> Option<PathBuf> {
    println!("📂 Opening file picker...");
    if let Some(path) = rfd::FileDialog::new()
        .set_title("Select Logo")
        .add_filter("Images", &LOGO_EXTENSIONS)
        .pick_file()
    {
        return Some(path);
    }
    println!("❌ No file selected. Falling back to manual input.");
    let typed = Text::new("Logo path (leave empty to skip):").prompt().ok()?;
    let typed = typed.trim();
    (!typed.is_empty()).then(|| PathBuf::from(settings::expand_home_dir(typed)))
}

// ==========================================
// 2. Preview
// ==========================================

fn print_preview(record: &InvoiceRecord, totals: Totals) {
    let money = |v: f64| format_money(&record.currency_symbol, v);

    println!(
        "\n🧾 Invoice #{}  |  {} → {}  |  {}",
        record.invoice_number,
        record.date,
        record.due_date,
        if record.client.name.is_empty() { "(no client)" } else { record.client.name.as_str() }
    );

    let mut table = Table::new();
    table.set_header(vec![
        Cell::new("Item"),
        Cell::new("Qty"),
        Cell::new("Price"),
        Cell::new("Amount"),
    ]);
    for item in &record.items {
        let name = if item.description.is_empty() {
            item.name.clone()
        } else {
            format!("{}\n{}", item.name, item.description)
        };
        table.add_row(vec![
            Cell::new(name),
            Cell::new(value_or_zero(item.quantity)).set_alignment(CellAlignment::Right),
            Cell::new(money(value_or_zero(item.price))).set_alignment(CellAlignment::Right),
            Cell::new(money(line_amount(item))).set_alignment(CellAlignment::Right),
        ]);
    }

    let mut add_total = |label: String, amount: String| {
        table.add_row(vec![
            Cell::new(label),
            Cell::new(""),
            Cell::new(""),
            Cell::new(amount).set_alignment(CellAlignment::Right),
        ]);
    };
    add_total("Subtotal".into(), money(totals.subtotal));
    if value_or_zero(record.tax_rate_percent) > 0.0 {
        add_total(
            format!("Tax ({}%)", value_or_zero(record.tax_rate_percent)),
            money(totals.tax_amount),
        );
    }
    if totals.discount_amount > 0.0 {
        add_total("Discount".into(), format!("-{}", money(totals.discount_amount)));
    }
    if totals.shipping > 0.0 {
        add_total("Shipping".into(), money(totals.shipping));
    }
    table.add_row(vec![
        Cell::new("Total").add_attribute(Attribute::Bold),
        Cell::new(""),
        Cell::new(""),
        Cell::new(money(totals.total))
            .add_attribute(Attribute::Bold)
            .fg(Color::Rgb { r: 37, g: 99, b: 235 })
            .set_alignment(CellAlignment::Right),
    ]);
    println!("{table}");
}

// ==========================================
// 3. Editor
// ==========================================

#[derive(Clone, Copy)]
enum EditorAction {
    ClientAndDates,
    Items,
    MoneyTerms,
    NotesAndCurrency,
    Company,
    Save,
    SaveAndExport,
    Quit,
}

impl fmt::Display for EditorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EditorAction::ClientAndDates => "👤 Client & Dates",
            EditorAction::Items => "📦 Items",
            EditorAction::MoneyTerms => "💰 Tax, Discount & Shipping",
            EditorAction::NotesAndCurrency => "📝 Notes & Currency",
            EditorAction::Company => "🏢 Company Details",
            EditorAction::Save => "💾 Save",
            EditorAction::SaveAndExport => "📄 Save & Export PDF",
            EditorAction::Quit => "🚪 Quit",
        };
        f.write_str(label)
    }
}

fn run_editor<S: InvoiceStore>(session: &mut Session<S>, renderer: &dyn PdfRenderer) {
    let options = vec![
        EditorAction::ClientAndDates,
        EditorAction::Items,
        EditorAction::MoneyTerms,
        EditorAction::NotesAndCurrency,
        EditorAction::Company,
        EditorAction::Save,
        EditorAction::SaveAndExport,
        EditorAction::Quit,
    ];

    loop {
        print_preview(session.current(), session.totals());
        let verb = if session.current().is_persisted() { "Update" } else { "Save" };
        let Ok(action) = Select::new(&format!("{} mode - choose:", verb), options.clone())
            .with_page_size(10)
            .prompt()
        else {
            return;
        };

        match action {
            EditorAction::ClientAndDates => edit_client_and_dates(session),
            EditorAction::Items => edit_items(session),
            EditorAction::MoneyTerms => edit_money_terms(session),
            EditorAction::NotesAndCurrency => edit_notes_and_currency(session),
            EditorAction::Company => edit_company(session, true),
            EditorAction::Save => {
                if let Some(saved) = report(session.save()) {
                    println!("✅ Invoice {} saved.", saved.invoice_number);
                }
            }
            EditorAction::SaveAndExport => {
                println!("🔨 Saving and compiling PDF...");
                if let Some(path) = report(session.save_and_export(renderer)) {
                    println!("✅ PDF Generated: {}", path.display());
                }
            }
            EditorAction::Quit => return,
        }
    }
}

fn edit_client_and_dates<S: InvoiceStore>(session: &mut Session<S>) {
    let r = session.current().clone();
    let Some(name) = ask_text("Client Name:", &r.client.name) else { return };
    session.apply(InvoiceEdit::ClientName(name));
    let Some(email) = ask_text("Client Email:", &r.client.email) else { return };
    session.apply(InvoiceEdit::ClientEmail(email));
    let Some(address) = ask_text("Client Address:", &r.client.address) else { return };
    session.apply(InvoiceEdit::ClientAddress(address));
    let Some(number) = ask_text("Invoice Number:", &r.invoice_number) else { return };
    session.apply(InvoiceEdit::InvoiceNumber(number));
    let Some(date) = ask_date("Invoice Date:", &r.date) else { return };
    session.apply(InvoiceEdit::Date(date));
    let Some(due) = ask_date("Due Date:", &r.due_date) else { return };
    session.apply(InvoiceEdit::DueDate(due));
}

fn edit_money_terms<S: InvoiceStore>(session: &mut Session<S>) {
    let r = session.current().clone();
    let Some(tax) = ask_number("Tax Rate (%):", r.tax_rate_percent) else { return };
    session.apply(InvoiceEdit::TaxRate(tax));

    let types = vec![DiscountType::Percentage, DiscountType::Fixed];
    let labels = types.iter().map(|t| t.label().to_string()).collect();
    let Some(idx) = pick("Discount Type:", labels) else { return };
    session.apply(InvoiceEdit::DiscountType(types[idx]));

    let Some(discount) = ask_number("Discount:", r.discount_value) else { return };
    session.apply(InvoiceEdit::DiscountValue(discount));
    let Some(shipping) = ask_number("Shipping Cost:", r.shipping_cost) else { return };
    session.apply(InvoiceEdit::Shipping(shipping));
}

fn edit_notes_and_currency<S: InvoiceStore>(session: &mut Session<S>) {
    let r = session.current().clone();
    let mut currencies: Vec<String> = CURRENCIES.iter().map(|c| c.to_string()).collect();
    if !currencies.contains(&r.currency_symbol) {
        currencies.insert(0, r.currency_symbol.clone());
    }
    let Some(idx) = pick("Currency:", currencies.clone()) else { return };
    session.apply(InvoiceEdit::Currency(currencies[idx].clone()));

    println!("💡 Tip: Use '\\n' for new lines.");
    let Some(notes) = ask_text("Notes:", &r.notes.replace('\n', "\\n")) else { return };
    session.apply(InvoiceEdit::Notes(notes.replace("\\n", "\n")));
}

fn edit_company<S: InvoiceStore>(session: &mut Session<S>, with_logo: bool) {
    let b = session.current().biller.clone();
    let Some(name) = ask_text("Company Name:", &b.name) else { return };
    session.apply(InvoiceEdit::BillerName(name));
    let Some(email) = ask_text("Email:", &b.email) else { return };
    session.apply(InvoiceEdit::BillerEmail(email));
    let Some(address) = ask_text("Address:", &b.address) else { return };
    session.apply(InvoiceEdit::BillerAddress(address));
    let Some(phone) = ask_text("Phone:", &b.phone) else { return };
    session.apply(InvoiceEdit::BillerPhone(phone));
    let Some(tax_id) = ask_text("GST/Tax ID:", &b.tax_id) else { return };
    session.apply(InvoiceEdit::BillerTaxId(tax_id));

    if with_logo {
        let has_logo = session.current().logo_data_url.is_some();
        let prompt = if has_logo { "Replace logo?" } else { "Add a logo?" };
        if Confirm::new(prompt).with_default(false).prompt().unwrap_or(false) {
            if let Some(path) = pick_logo() {
                match encode_logo(&path) {
                    Ok(url) => session.apply(InvoiceEdit::Logo(Some(url))),
                    Err(e) => println!("❌ {}", e),
                }
            }
        } else if has_logo
            && Confirm::new("Remove current logo?").with_default(false).prompt().unwrap_or(false)
        {
            session.apply(InvoiceEdit::Logo(None));
        }
    }

    if Confirm::new("Use these details for future invoices?")
        .with_default(!with_logo)
        .prompt()
        .unwrap_or(false)
        && report(session.save_company_defaults()).is_some()
    {
        println!("✅ Company data updated. Future invoices will use these details.");
    }
}

// ==========================================
// 4. Items
// ==========================================

fn edit_items<S: InvoiceStore>(session: &mut Session<S>) {
    const ADD: &str = "➕ Add Item";
    const CATALOG: &str = "🛒 Fill Item from Catalog";
    const BACK: &str = "⬅️  Back";

    loop {
        let record = session.current().clone();
        let mut options = vec![ADD.to_string(), CATALOG.to_string()];
        for (n, item) in record.items.iter().enumerate() {
            let name = if item.name.is_empty() { "(unnamed)" } else { item.name.as_str() };
            options.push(format!(
                "✏️  {}. {} | {}",
                n + 1,
                name,
                format_money(&record.currency_symbol, line_amount(item))
            ));
        }
        options.push(BACK.to_string());

        let Some(idx) = pick("Items:", options.clone()) else { return };
        match options[idx].as_str() {
            ADD => {
                let id = fresh_item_id(&record, Local::now().timestamp_millis());
                session.apply(InvoiceEdit::AddItem { id: id.clone() });
                edit_item(session, &id);
            }
            CATALOG => fill_from_catalog(session),
            BACK => return,
            _ => {
                let id = record.items[idx - 2].id.clone();
                let actions = vec!["Edit".to_string(), "Remove".to_string()];
                match pick("Item:", actions) {
                    Some(0) => edit_item(session, &id),
                    Some(1) => session.apply(InvoiceEdit::RemoveItem { id }),
                    _ => {}
                }
            }
        }
    }
}

fn edit_item<S: InvoiceStore>(session: &mut Session<S>, id: &str) {
    let Some(item) = session.current().item(id).cloned() else { return };
    let edit = |field| InvoiceEdit::Item { id: id.to_string(), field };

    let Some(name) = ask_text("Item Name:", &item.name) else { return };
    session.apply(edit(ItemField::Name(name)));
    let Some(description) = ask_text("Description:", &item.description) else { return };
    session.apply(edit(ItemField::Description(description)));
    let Some(quantity) = ask_number("Qty:", item.quantity) else { return };
    session.apply(edit(ItemField::Quantity(quantity)));
    let Some(price) = ask_number("Price:", item.price) else { return };
    session.apply(edit(ItemField::Price(price)));
}

fn fill_from_catalog<S: InvoiceStore>(session: &mut Session<S>) {
    let Some(products) = report(session.products()) else { return };
    if products.is_empty() {
        println!("(No products yet. Add some with `invoice-builder products`.)");
        return;
    }
    let record = session.current().clone();
    let item_labels = record
        .items
        .iter()
        .enumerate()
        .map(|(n, i)| format!("{}. {}", n + 1, if i.name.is_empty() { "(unnamed)" } else { i.name.as_str() }))
        .collect();
    let Some(item_idx) = pick("Fill which item?", item_labels) else { return };

    let product_labels = products
        .iter()
        .map(|p| format!("{} | {}", p.name, format_money(&record.currency_symbol, p.price)))
        .collect();
    let Some(product_idx) = pick("Product:", product_labels) else { return };

    session.apply(InvoiceEdit::ApplyProduct {
        item_id: record.items[item_idx].id.clone(),
        product: products[product_idx].clone(),
    });
}

// ==========================================
// 5. History
// ==========================================

fn history_browser<S: InvoiceStore>(session: &mut Session<S>, renderer: &dyn PdfRenderer) {
    loop {
        println!("🔍 Loading history...");
        if report(session.refresh_history()).is_none() {
            return;
        }
        let history = session.history().to_vec();
        if history.is_empty() {
            println!("(No saved invoices yet.)");
            return;
        }

        let mut table = Table::new();
        table.set_header(vec![
            Cell::new("Invoice"),
            Cell::new("Client"),
            Cell::new("Date"),
            Cell::new("Total"),
        ]);
        let mut options = Vec::new();
        for r in &history {
            let currency = if r.currency_symbol.is_empty() { CURRENCIES[0] } else { r.currency_symbol.as_str() };
            let total = format_money(currency, compute_totals(r).total);
            table.add_row(vec![
                Cell::new(&r.invoice_number),
                Cell::new(&r.client.name),
                Cell::new(&r.date),
                Cell::new(&total).set_alignment(CellAlignment::Right),
            ]);
            options.push(format!("#{} | {} | {}", r.invoice_number, r.client.name, total));
        }
        println!("{table}");

        let Some(idx) = pick("Select Invoice:", options) else { return };
        let Some(id) = history[idx].storage_id.clone() else { continue };

        let actions = vec![
            "✏️  Edit".to_string(),
            "📄 Export PDF".to_string(),
            "🗑️  Delete".to_string(),
            "⬅️  Back".to_string(),
        ];
        match pick("Action:", actions) {
            Some(0) => {
                if report(session.load_from_history(&id)).is_some() {
                    run_editor(session, renderer);
                }
                return;
            }
            Some(1) => {
                println!("🔨 Compiling PDF...");
                if let Some(path) = report(session.export_from_history(&id, renderer)) {
                    println!("✅ PDF Generated: {}", path.display());
                }
            }
            Some(2) => {
                let sure = Confirm::new("Are you sure you want to delete this invoice?")
                    .with_default(false)
                    .prompt()
                    .unwrap_or(false);
                if sure && report(session.delete_from_history(&id)).is_some() {
                    println!("🗑️  Deleted #{}", history[idx].invoice_number);
                }
            }
            _ => {}
        }
    }
}

// ==========================================
// 6. Products & Company
// ==========================================

fn product_manager<S: InvoiceStore>(session: &Session<S>) {
    loop {
        let Some(products) = report(session.products()) else { return };

        let mut table = Table::new();
        table.set_header(vec![Cell::new("Product"), Cell::new("Price")]);
        for p in &products {
            table.add_row(vec![
                Cell::new(&p.name),
                Cell::new(format!("{:.2}", p.price)).set_alignment(CellAlignment::Right),
            ]);
        }
        if products.is_empty() {
            println!("(No products added yet.)");
        } else {
            println!("{table}");
        }

        let actions = vec!["➕ Add Product".to_string(), "🗑️  Delete Product".to_string(), "⬅️  Back".to_string()];
        match pick("Products:", actions) {
            Some(0) => {
                let Some(name) = ask_text("Product Name:", "") else { continue };
                if name.trim().is_empty() {
                    continue;
                }
                let Some(Some(price)) = ask_number("Price:", None) else { continue };
                if report(session.add_product(name.trim(), price)).is_some() {
                    println!("✅ Added {}", name.trim());
                }
            }
            Some(1) => {
                let labels = products.iter().map(|p| format!("{} | {:.2}", p.name, p.price)).collect();
                let Some(idx) = pick("Delete which product?", labels) else { continue };
                let sure = Confirm::new("Delete this product?").with_default(false).prompt().unwrap_or(false);
                if sure {
                    report(session.delete_product(&products[idx].id));
                }
            }
            _ => return,
        }
    }
}

fn company_editor<S: InvoiceStore>(session: &mut Session<S>) {
    println!("\n--- Company Details ---");
    edit_company(session, false);
}

// ==========================================
// 7. Config
// ==========================================

fn setup_config_wizard(path: &std::path::Path) -> Option<AppSettings> {
    println!("\n⚙️  --- Configuration Setup ---");
    let current = load_settings(path).ok().flatten().unwrap_or_default();

    let store_url = Text::new("Store URL (e.g. https://<project>.firebaseio.com):")
        .with_initial_value(&current.store_url)
        .with_validator(|s: &str| {
            if s.starts_with("http://") || s.starts_with("https://") {
                Ok(Validation::Valid)
            } else {
                Ok(Validation::Invalid("Must start with http:// or https://".into()))
            }
        })
        .prompt()
        .ok()?;

    println!("📂 Opening folder picker for PDF output...");
    let output_dir = match rfd::FileDialog::new()
        .set_title("Select Output Directory")
        .pick_folder()
    {
        Some(p) => p.to_string_lossy().to_string(),
        None => {
            println!("❌ No folder selected. Falling back to manual input.");
            Text::new("Output Directory:").with_default(&current.output_dir).prompt().ok()?
        }
    };

    let starting_number = Text::new("Starting Invoice Number:")
        .with_default(&current.starting_number)
        .prompt()
        .ok()?;
    let currency_options: Vec<String> = CURRENCIES.iter().map(|c| c.to_string()).collect();
    let currency_idx = pick("Default Currency:", currency_options.clone())?;
    let due_days = inquire::CustomType::<u64>::new("Days until due:")
        .with_default(current.due_days)
        .prompt()
        .ok()?;

    let settings = AppSettings {
        store_url,
        output_dir,
        starting_number,
        currency: currency_options[currency_idx].clone(),
        due_days,
        ..current
    };

    match save_settings(path, &settings) {
        Ok(()) => println!("✅ Settings saved."),
        Err(e) => {
            debug!(error = %e, "failed to save settings");
            println!("❌ {}", e);
        }
    }
    Some(settings)
}
