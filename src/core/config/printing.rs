use std::fmt::Write as _;

use crate::core::config::data::{SettingKey, Settings};

impl Settings {
    pub fn describe(&self) -> String {
        let mut out = String::from("Current configuration:\n");
        for key in SettingKey::ALL {
            let _ = writeln!(out, "  {key}: {}", self.get(key));
        }
        out
    }

    pub fn print_all(&self) {
        print!("{}", self.describe());
    }
}
