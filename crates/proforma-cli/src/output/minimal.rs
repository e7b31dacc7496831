use serde_json::Value;

/// Headline fields, checked in order inside the `result` envelope.
const PRIORITY_KEYS: [&str; 9] = [
    "dcf_value",
    "npv",
    "positive_npv_probability",
    "valid",
    "success",
    "total_revenue",
    "terminal_value",
    "comparison",
    "sensitivity_matrix",
];

/// Print just the key answer from the output.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    // Dashboard: the KPIs are the answer.
    let result_obj = result_obj.get("dashboard_kpis").unwrap_or(result_obj);

    if let Value::Object(map) = result_obj {
        for key in PRIORITY_KEYS {
            if let Some(val) = map.get(key).filter(|v| !v.is_null()) {
                println!("{key}: {}", format_minimal(val));
                return;
            }
        }

        if let Some((key, val)) = map.iter().next() {
            println!("{key}: {}", format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(result_obj));
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
