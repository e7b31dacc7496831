use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::{statements_of, STATEMENTS};

/// Format output as tables. Statements print one row per line item with a
/// column per year.
pub fn print_table(value: &Value) {
    if let Some(statements) = statements_of(value) {
        print_statements(statements);
        if let Some(kpis) = value.get("result").and_then(|r| r.get("dashboard_kpis")) {
            println!("\nDashboard KPIs");
            print_flat_object(kpis);
        }
        print_notes(value);
        return;
    }

    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_result(result);
                print_notes(value);
            } else {
                print_flat_object(value);
            }
        }
        Value::Array(arr) => print_array_table(arr),
        _ => println!("{value}"),
    }
}

fn print_statements(statements: &Map<String, Value>) {
    for (key, title) in STATEMENTS {
        let Some(statement) = statements.get(key) else {
            continue;
        };
        println!("{title}");

        let years: Vec<String> = statement
            .get("years")
            .and_then(Value::as_array)
            .map(|ys| ys.iter().map(format_value).collect())
            .unwrap_or_default();
        let mut builder = Builder::default();
        builder.push_record(std::iter::once(String::new()).chain(years.iter().cloned()));

        for item in statement
            .get("line_items")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            let label = item.get("label").map(format_value).unwrap_or_default();
            let is_header = item.get("is_header").and_then(Value::as_bool).unwrap_or(false);
            let cells = item
                .get("values")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .map(|v| if is_header { String::new() } else { format_amount(v) });
            builder.push_record(std::iter::once(label).chain(cells));
        }
        println!("{}\n", Table::from(builder));

        if let Some(note) = statement.get("note").and_then(Value::as_str) {
            println!("Note: {note}\n");
        }
    }
}

fn print_result(result: &Value) {
    match result {
        Value::Array(arr) => print_array_table(arr),
        _ => print_flat_object(result),
    }
}

fn print_notes(envelope: &Value) {
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {w}");
            }
        }
    }
    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {meth}");
    }
}

fn print_flat_object(value: &Value) {
    if let Value::Object(map) = value {
        let mut builder = Builder::default();
        builder.push_record(["Field", "Value"]);
        for (key, val) in map {
            builder.push_record([key.as_str(), &format_value(val)]);
        }
        println!("{}", Table::from(builder));
    } else {
        println!("{}", format_value(value));
    }
}

fn print_array_table(arr: &[Value]) {
    let Some(Value::Object(first)) = arr.first() else {
        if arr.is_empty() {
            println!("(empty)");
        }
        for item in arr {
            println!("{}", format_value(item));
        }
        return;
    };

    let headers: Vec<String> = first.keys().cloned().collect();
    let mut builder = Builder::default();
    builder.push_record(&headers);
    for map in arr.iter().filter_map(Value::as_object) {
        builder.push_record(
            headers
                .iter()
                .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default()),
        );
    }
    println!("{}", Table::from(builder));
}

fn format_amount(value: &Value) -> String {
    match value.as_f64() {
        Some(n) => format!("{n:.2}"),
        None => format_value(value),
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(arr) => arr.iter().map(format_value).collect::<Vec<_>>().join(", "),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
