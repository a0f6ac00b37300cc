use serde::Serialize;
use serde_json::Value;
use std::net::Ipv4Addr;

/// Declared type of a parameter. Values are coerced to the canonical JSON form on entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer {
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<i64>,
    },
    Boolean,
    Choice { options: Vec<String> },
    /// IPv4 network in `a.b.c.d/n` notation.
    Cidr,
}

impl ParamType {
    pub fn integer_between(min: i64, max: i64) -> Self {
        ParamType::Integer {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn choice(options: &[&str]) -> Self {
        ParamType::Choice {
            options: options.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Short name used in prompts, e.g. `(Type: integer)`.
    pub fn label(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer { .. } => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Choice { .. } => "choice",
            ParamType::Cidr => "cidr",
        }
    }

    /// Coerces a raw caller/engine value. The error is a human-readable reason.
    pub fn coerce(&self, raw: &Value) -> Result<Value, String> {
        match self {
            ParamType::String => match raw {
                Value::String(s) if s.trim().is_empty() => Err("value cannot be empty".into()),
                Value::String(s) => Ok(Value::String(s.trim().to_string())),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                _ => Err("expected text".into()),
            },
            ParamType::Integer { min, max } => {
                let n = match raw {
                    Value::Number(n) => n
                        .as_i64()
                        .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                        .ok_or_else(|| format!("'{}' is not a whole number", n))?,
                    Value::String(s) => parse_integer_text(s)?,
                    _ => return Err("expected a whole number".into()),
                };
                if let Some(lo) = min {
                    if n < *lo {
                        return Err(format!("must be at least {}", lo));
                    }
                }
                if let Some(hi) = max {
                    if n > *hi {
                        return Err(format!("must be at most {}", hi));
                    }
                }
                Ok(Value::from(n))
            }
            ParamType::Boolean => match raw {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::Number(n) if n.as_i64() == Some(1) => Ok(Value::Bool(true)),
                Value::Number(n) if n.as_i64() == Some(0) => Ok(Value::Bool(false)),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" | "y" | "1" => Ok(Value::Bool(true)),
                    "false" | "no" | "n" | "0" => Ok(Value::Bool(false)),
                    other => Err(format!("'{}' is not yes/no", other)),
                },
                _ => Err("expected yes or no".into()),
            },
            ParamType::Choice { options } => {
                let text = match raw {
                    Value::String(s) => s.trim().to_string(),
                    Value::Number(n) => n.to_string(),
                    _ => return Err(format!("expected one of: {}", options.join(", "))),
                };
                options
                    .iter()
                    .find(|o| o.eq_ignore_ascii_case(&text))
                    .map(|o| Value::String(o.clone()))
                    .ok_or_else(|| format!("'{}' is not one of: {}", text, options.join(", ")))
            }
            ParamType::Cidr => match raw {
                Value::String(s) => parse_cidr(s.trim()).map(Value::String),
                _ => Err("expected a CIDR such as 10.0.0.0/24".into()),
            },
        }
    }
}

/// Accepts `15`, `" 15 "`, `15GB`, `15 gb`, `15G`.
fn parse_integer_text(text: &str) -> Result<i64, String> {
    let lowered = text.trim().to_ascii_lowercase();
    let digits = lowered
        .strip_suffix("gb")
        .or_else(|| lowered.strip_suffix('g'))
        .unwrap_or(&lowered)
        .trim();
    digits
        .parse::<i64>()
        .map_err(|_| format!("'{}' is not a whole number", text.trim()))
}

fn parse_cidr(text: &str) -> Result<String, String> {
    let invalid = || format!("'{}' is not a CIDR such as 10.0.0.0/24", text);
    let (addr, prefix) = text.split_once('/').ok_or_else(invalid)?;
    let addr: Ipv4Addr = addr.trim().parse().map_err(|_| invalid())?;
    let prefix: u8 = prefix.trim().parse().map_err(|_| invalid())?;
    if prefix > 32 {
        return Err(invalid());
    }
    Ok(format!("{}/{}", addr, prefix))
}
