//! Description Rendering

use crate::TriggerValues;
use chrono::Duration;
use expression::Value;

/// Placeholders rendered as whole seconds
const DURATION_NAMES: [&str; 2] = ["TIME", "DELTA_TIME_S"];

/// Substitute `{name}` placeholders in `template`.
///
/// `{duration}` is the occurrence length. Names missing from `values` are
/// left as written.
pub fn render(template: &str, values: &TriggerValues, duration: Duration) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let Some(close) = after.find(|c| c == '}' || c == '{') else {
            out.push_str(&rest[open..]);
            return out;
        };
        if after.as_bytes()[close] == b'{' {
            out.push('{');
            rest = after;
            continue;
        }

        let name = &after[..close];
        match substitute(name, values, duration) {
            Some(text) => out.push_str(&text),
            None => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

fn substitute(name: &str, values: &TriggerValues, duration: Duration) -> Option<String> {
    if name == "duration" {
        return Some(duration.num_seconds().to_string());
    }

    let value = values.get(name)?;
    Some(match value {
        None => "undefined".to_string(),
        Some(v) if DURATION_NAMES.contains(&name) => format!("{}", v.as_f64().round() as i64),
        Some(Value::Number(n)) => format!("{:.2}", n),
        Some(Value::Bool(b)) => b.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> TriggerValues {
        let mut values = TriggerValues::new();
        values.insert("flow".to_string(), Some(Value::Number(12.3456)));
        values.insert("result".to_string(), Some(Value::Bool(true)));
        values.insert("TIME".to_string(), Some(Value::Number(119.6)));
        values.insert("pressure".to_string(), None);
        values
    }

    #[test]
    fn test_render_placeholders() {
        let text = render(
            "Flow {flow} L/s is {result} for {duration}s (TIME {TIME})",
            &values(),
            Duration::seconds(120),
        );
        assert_eq!(text, "Flow 12.35 L/s is true for 120s (TIME 120)");
    }

    #[test]
    fn test_render_undefined_and_unknown() {
        let text = render("{pressure} / {missing}", &values(), Duration::zero());
        assert_eq!(text, "undefined / {missing}");
    }

    #[test]
    fn test_render_unbalanced_braces() {
        assert_eq!(render("open { brace", &values(), Duration::zero()), "open { brace");
        assert_eq!(render("{{flow}", &values(), Duration::zero()), "{12.35");
        assert_eq!(render("no placeholders", &values(), Duration::zero()), "no placeholders");
    }
}
