use super::cell::Value;

/// Format a cell value for display and export.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Empty => String::new(),
        Value::Number(n) => format_number(*n),
        Value::Text(s) => s.clone(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Error(e) => e.sentinel().to_string(),
    }
}

/// Format a number using the shortest text that parses back to it.
pub fn format_number(n: f64) -> String {
    if !n.is_finite() {
        "#ERROR".to_string()
    } else if n == 0.0 {
        // Avoid printing "-0".
        "0".to_string()
    } else {
        n.to_string()
    }
}
