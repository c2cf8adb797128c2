//! Toolkit configuration
//!
//! A flat string-keyed option map derived once per scope from the app's
//! [`crate::settings::Settings`]. Paths stored here are already absolute.

use std::collections::BTreeMap;

/// String-keyed main options consumed by the script directory and the
/// revision workflow
#[derive(Debug, Clone, Default)]
pub struct Config {
    options: BTreeMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_main_option(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.options.insert(key.into(), value.into());
    }

    pub fn get_main_option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(|s| s.as_str())
    }

    /// Read a main option as a boolean; absent or unrecognized values are
    /// false
    pub fn main_option_bool(&self, key: &str) -> bool {
        matches!(
            self.get_main_option(key).map(str::trim),
            Some("true") | Some("1") | Some("yes") | Some("on")
        )
    }
}
