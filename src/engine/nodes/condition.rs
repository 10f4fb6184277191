use serde_json::Value;

use super::NodeContext;
use crate::models::execution::EventKind;

pub(super) fn run(ctx: &mut NodeContext<'_>) -> Result<String, String> {
    let expression = ctx
        .node
        .config_str("condition")
        .unwrap_or_else(|| "true".to_string());
    let event = ctx.event(EventKind::Input).with_data(expression.clone());
    ctx.emit(event);

    let result = evaluate_expression(&expression)?.to_string();
    ctx.emit_output(&result);
    Ok(result)
}

#[derive(Clone, Copy)]
enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Contains,
}

pub(crate) fn evaluate_expression(expression: &str) -> Result<bool, String> {
    let trimmed = expression.trim();
    if let Some(literal) = parse_literal(trimmed) {
        return Ok(literal);
    }

    let (op, left_raw, right_raw) =
        parse_expression(trimmed).ok_or_else(|| format!("Unsupported condition expression: {trimmed}"))?;

    let left = parse_flexible_value(&left_raw);
    let right = parse_flexible_value(&right_raw);

    Ok(match op {
        ConditionOperator::Equals => values_equal(&left, &right),
        ConditionOperator::NotEquals => !values_equal(&left, &right),
        ConditionOperator::GreaterThan => compare_order(&left, &right, ValueOrdering::Greater),
        ConditionOperator::LessThan => compare_order(&left, &right, ValueOrdering::Less),
        ConditionOperator::GreaterThanOrEqual => {
            compare_order(&left, &right, ValueOrdering::Equal)
                || compare_order(&left, &right, ValueOrdering::Greater)
        }
        ConditionOperator::LessThanOrEqual => {
            compare_order(&left, &right, ValueOrdering::Equal)
                || compare_order(&left, &right, ValueOrdering::Less)
        }
        ConditionOperator::Contains => {
            let Some(left_str) = value_as_string(&left) else {
                return Ok(false);
            };
            let Some(right_str) = value_as_string(&right) else {
                return Ok(false);
            };
            left_str.contains(&right_str)
        }
    })
}

fn parse_literal(expr: &str) -> Option<bool> {
    match expr.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" | "" => Some(false),
        _ => None,
    }
}

fn parse_expression(expr: &str) -> Option<(ConditionOperator, String, String)> {
    const OPERATORS: &[(&str, ConditionOperator)] = &[
        (" contains ", ConditionOperator::Contains),
        (">=", ConditionOperator::GreaterThanOrEqual),
        ("<=", ConditionOperator::LessThanOrEqual),
        ("==", ConditionOperator::Equals),
        ("!=", ConditionOperator::NotEquals),
        (">", ConditionOperator::GreaterThan),
        ("<", ConditionOperator::LessThan),
    ];

    for (pattern, op) in OPERATORS {
        if let Some((left, right)) = expr.split_once(pattern) {
            return Some((*op, left.trim().to_string(), right.trim().to_string()));
        }
    }
    None
}

fn parse_flexible_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if trimmed.len() >= 2
        && ((trimmed.starts_with('"') && trimmed.ends_with('"'))
            || (trimmed.starts_with('\'') && trimmed.ends_with('\'')))
    {
        let inner = &trimmed[1..trimmed.len() - 1];
        return Value::String(inner.replace("\\\"", "\"").replace("\\'", "'"));
    }
    if let Ok(json_val) = serde_json::from_str::<Value>(trimmed) {
        return json_val;
    }
    Value::String(trimmed.to_string())
}

fn values_equal(left: &Value, right: &Value) -> bool {
    if let (Some(a), Some(b)) = (number_of(left), number_of(right)) {
        return (a - b).abs() < f64::EPSILON;
    }
    match (left, right) {
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Null, Value::Null) => true,
        _ => left == right || value_as_string(left) == value_as_string(right),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ValueOrdering {
    Greater,
    Less,
    Equal,
}

fn compare_order(left: &Value, right: &Value, ordering: ValueOrdering) -> bool {
    if let (Some(a), Some(b)) = (number_of(left), number_of(right)) {
        return match ordering {
            ValueOrdering::Greater => a > b,
            ValueOrdering::Less => a < b,
            ValueOrdering::Equal => (a - b).abs() < f64::EPSILON,
        };
    }
    if let (Some(a), Some(b)) = (value_as_string(left), value_as_string(right)) {
        return match ordering {
            ValueOrdering::Greater => a > b,
            ValueOrdering::Less => a < b,
            ValueOrdering::Equal => a == b,
        };
    }
    false
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        other => Some(other.to_string()),
    }
}
