use serde_json::{Map, Value};
use std::io;

use super::{statements_of, STATEMENTS};

type StdoutWriter<'a> = csv::Writer<io::StdoutLock<'a>>;

/// Write output as CSV to stdout. Statements become
/// `statement,label,<year>...` rows.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    if let Some(statements) = statements_of(value) {
        write_statements_csv(&mut wtr, statements);
    } else {
        match value {
            Value::Object(map) => match map.get("result") {
                Some(Value::Array(rows)) => write_array_csv(&mut wtr, rows),
                Some(Value::Object(result)) => write_fields_csv(&mut wtr, result),
                _ => write_fields_csv(&mut wtr, map),
            },
            Value::Array(arr) => write_array_csv(&mut wtr, arr),
            _ => {
                let _ = wtr.write_record([&format_csv_value(value)]);
            }
        }
    }

    let _ = wtr.flush();
}

fn write_statements_csv(wtr: &mut StdoutWriter<'_>, statements: &Map<String, Value>) {
    let mut header_written = false;
    for (key, _) in STATEMENTS {
        let Some(statement) = statements.get(key) else {
            continue;
        };
        if !header_written {
            let years = statement
                .get("years")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .map(format_csv_value);
            let header: Vec<String> = ["statement".to_string(), "label".to_string()]
                .into_iter()
                .chain(years)
                .collect();
            let _ = wtr.write_record(&header);
            header_written = true;
        }

        for item in statement
            .get("line_items")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            if item.get("is_spacer").and_then(Value::as_bool).unwrap_or(false) {
                continue;
            }
            let label = item
                .get("label")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string();
            let values = item
                .get("values")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .map(format_csv_value);
            let row: Vec<String> = [key.to_string(), label].into_iter().chain(values).collect();
            let _ = wtr.write_record(&row);
        }
    }
}

fn write_fields_csv(wtr: &mut StdoutWriter<'_>, map: &Map<String, Value>) {
    let _ = wtr.write_record(["field", "value"]);
    for (key, val) in map {
        let _ = wtr.write_record([key.as_str(), &format_csv_value(val)]);
    }
}

fn write_array_csv(wtr: &mut StdoutWriter<'_>, arr: &[Value]) {
    let Some(Value::Object(first)) = arr.first() else {
        for item in arr {
            let _ = wtr.write_record([&format_csv_value(item)]);
        }
        return;
    };

    let headers: Vec<&str> = first.keys().map(String::as_str).collect();
    let _ = wtr.write_record(&headers);
    for map in arr.iter().filter_map(Value::as_object) {
        let row: Vec<String> = headers
            .iter()
            .map(|h| map.get(*h).map(format_csv_value).unwrap_or_default())
            .collect();
        let _ = wtr.write_record(&row);
    }
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
