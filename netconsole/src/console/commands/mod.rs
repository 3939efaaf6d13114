pub(crate) mod inspect;
pub(crate) mod topology;
pub(crate) mod utility;

use crate::console::ConsoleError;

/// Splits `key=value` arguments, ignoring tokens without `=`
fn key_values<'a>(tokens: &[&'a str]) -> impl Iterator<Item = (&'a str, &'a str)> {
    tokens
        .iter()
        .filter_map(|&token| token.split_once('='))
}

fn invalid_value(key: &str, value: &str) -> ConsoleError {
    ConsoleError::Validation(format!("Invalid value for {key}: {value}"))
}
