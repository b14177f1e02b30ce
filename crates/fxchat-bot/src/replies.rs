//! Reply texts

use std::collections::BTreeSet;

/// Bot name used in replies and version announcements
pub const BOT_NAME: &str = "fxchat";

/// Usage reply
pub const USAGE: &str = "fxchat usage: <amount> <base> <target>  (e.g. 1000 USD JPY)";

pub const AMOUNT_TOO_LARGE: &str = "The amount is too large!";

pub const AMOUNT_NOT_POSITIVE: &str = "The amount must be greater than zero.";

pub const QUEUE_FULL: &str = "Too many conversions in progress, please try again later.";

pub const SHUTTING_DOWN: &str = "The converter is shutting down, please try again later.";

/// Identity/about reply
pub fn about(url: Option<&str>) -> String {
    match url {
        Some(url) => format!("{BOT_NAME} is a currency converter.\nURL: {url}"),
        None => format!("{BOT_NAME} is a currency converter."),
    }
}

/// Sorted, comma-joined currency list
pub fn currency_list(codes: &BTreeSet<String>) -> String {
    codes.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

pub fn unsupported_currency(code: &str) -> String {
    format!("{code} seems not to be a supported currency code.")
}

/// Successful conversion
pub fn conversion(amount: u64, base: &str, value: f64, target: &str) -> String {
    format!("{amount} {base} = {} {target}", format_value(value))
}

pub fn conversion_failed(amount: u64, base: &str, target: &str) -> String {
    format!("Could not convert {amount} {base} to {target}, please try again later.")
}

/// Round to four decimal places; whole numbers print without a fraction
pub fn format_value(value: f64) -> String {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    format!("{rounded}")
}
