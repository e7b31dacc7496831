pub mod csv_out;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::{Map, Value};

/// Statement keys in presentation order, with display titles.
pub const STATEMENTS: [(&str, &str); 3] = [
    ("income_statement", "Income Statement"),
    ("balance_sheet", "Balance Sheet"),
    ("cash_flow", "Cash Flow Statement"),
];

/// The object holding the three statements, either the value itself
/// (`statements`) or `result.statements` (`dashboard`).
pub fn statements_of(value: &Value) -> Option<&Map<String, Value>> {
    let obj = value.as_object()?;
    if obj.contains_key("income_statement") {
        return Some(obj);
    }
    obj.get("result")?
        .get("statements")?
        .as_object()
        .filter(|s| s.contains_key("income_statement"))
}

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(value) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("JSON serialization error: {e}"),
        },
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}
