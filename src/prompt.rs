//! Prompt construction for listing generation.
//!
//! [`build_prompt`] turns a land-parcel record (a flat JSON object) plus
//! optional manager hints into the user turn sent to the language model.
//! The output is fully determined by [`SUMMARY_FIELDS`]: keys are visited in
//! that order regardless of how the incoming object was ordered, so the same
//! record always yields byte-identical text.
//!
//! # Layout
//!
//! ```text
//! Исходные данные по участку (используй факты без искажений):
//! - Кадастровый номер: 77:01:0001:23
//! - Площадь (га): 1.5
//!
//! Дополнительные пометки:
//! - Особые пожелания менеджера: ...
//! - Текущий черновик клиента (если нужно улучшить): ...
//!
//! Сформируй текст по требуемой структуре. ...
//! ```

use serde_json::{Map, Value};

/// Label / record key pairs, in output order.
pub const SUMMARY_FIELDS: &[(&str, &str)] = &[
    ("Кадастровый номер", "cadastral_number"),
    ("Регион", "region"),
    ("Артикул", "article"),
    ("Площадь (га)", "area_ha"),
    ("Цена за сотку (₽)", "price_per_sotka_rub"),
    ("Цена за участок (₽)", "price_per_plot_rub"),
    ("Допустимая скидка (%)", "discount_limit_percent"),
    ("Продажа", "wholesale_only"),
    ("ВРИ / категория", "land_use"),
    ("Рекомендованное назначение", "recommended_usage"),
    ("Описание расположения", "location_description"),
    ("Контекст", "context"),
    ("Рекомендации", "recommendations"),
    ("Служебные отметки", "service_notes"),
    ("Наилучшее использование", "best_use"),
];

const DATA_HEADER: &str = "Исходные данные по участку (используй факты без искажений):";
const NO_DATA_LINE: &str = "- информации почти нет — коротко отметь это, не выдумывая фактов.";
const EXTRAS_HEADER: &str = "Дополнительные пометки:";
const INSTRUCTION_LABEL: &str = "Особые пожелания менеджера";
const DRAFT_LABEL: &str = "Текущий черновик клиента (если нужно улучшить)";
const CLOSING_INSTRUCTION: &str = "Сформируй текст по требуемой структуре. Если данных не хватает, упоминай это лаконично и не добавляй выдуманных сведений.";

/// Renders a JSON value the way it should read in a prompt.
///
/// Numbers get space-separated thousands groups, booleans become `да`/`нет`,
/// strings are trimmed, and `null` renders as an empty string.
pub fn humanize_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "да".to_string(),
        Value::Bool(false) => "нет".to_string(),
        Value::Number(n) => format_number(n),
        Value::String(s) => s.trim().to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn format_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return group_thousands(&i.to_string());
    }
    if let Some(u) = n.as_u64() {
        return group_thousands(&u.to_string());
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 => group_thousands(&format!("{f:.1}")),
        Some(f) => group_thousands(&f.to_string()),
        None => n.to_string(),
    }
}

/// Inserts a space between every three digits of the integer part.
fn group_thousands(repr: &str) -> String {
    let (sign, unsigned) = match repr.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", repr),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((int_part, frac)) => (int_part, Some(frac)),
        None => (unsigned, None),
    };

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(*c);
    }

    match frac_part {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Renders a manager hint, or `None` when it carries nothing.
///
/// `false`, zero, and empty strings/arrays/objects count as nothing, as
/// does text that is blank after trimming.
fn extra_text(value: Option<&Value>) -> Option<String> {
    let present = match value? {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    };
    if !present {
        return None;
    }
    value.map(humanize_value).filter(|text| !text.is_empty())
}

/// Builds the user prompt for a land-parcel record.
///
/// Only known keys with a non-empty rendered value contribute a line. When
/// nothing qualifies, a single placeholder line asks the model to say so
/// instead of inventing facts. `instruction` and `existing_note` are added
/// under a separate heading when they render to non-empty text.
pub fn build_prompt(
    record: &Map<String, Value>,
    existing_note: Option<&Value>,
    instruction: Option<&Value>,
) -> String {
    let mut lines: Vec<String> = SUMMARY_FIELDS
        .iter()
        .filter_map(|(label, key)| {
            let value = record.get(*key).map(humanize_value).unwrap_or_default();
            (!value.is_empty()).then(|| format!("- {label}: {value}"))
        })
        .collect();

    if lines.is_empty() {
        lines.push(NO_DATA_LINE.to_string());
    }

    let mut extras = Vec::new();
    if let Some(text) = extra_text(instruction) {
        extras.push(format!("- {INSTRUCTION_LABEL}: {text}"));
    }
    if let Some(text) = extra_text(existing_note) {
        extras.push(format!("- {DRAFT_LABEL}: {text}"));
    }

    let mut sections = vec![DATA_HEADER.to_string(), lines.join("\n")];
    if !extras.is_empty() {
        sections.push(String::new());
        sections.push(EXTRAS_HEADER.to_string());
        sections.extend(extras);
    }
    sections.push(String::new());
    sections.push(CLOSING_INSTRUCTION.to_string());

    sections.join("\n")
}
