// Copyright 2023-2024 the senate-scrutiny developers.
// This file is part of senate-scrutiny.
// senate-scrutiny is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// senate-scrutiny is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with senate-scrutiny.  If not, see <https://www.gnu.org/licenses/>.


//! The JSON configuration driving a batch of counts.

use std::fs::File;
use std::path::Path;
use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub title: String,
    /// Counting method; only `AusSenatePost2015` is supported.
    pub method: String,
    pub count: Vec<CountConfig>,
}

#[derive(Debug, Deserialize)]
pub struct CountConfig {
    pub name: String,
    /// Output file stem and the handle `--only` matches on.
    pub shortname: String,
    #[serde(default)]
    pub description: String,
    pub state: String,
    /// Data directory, relative to the config file.
    pub path: String,
    pub vacancies: usize,
    #[serde(default)]
    pub house: Option<String>,
    /// Directory of reference round logs to verify against, relative to
    /// the config file.
    #[serde(default)]
    pub verified: Option<String>,
    /// Pre-recorded answers for the Australian Electoral Officer
    /// callbacks, 1-based, consumed in order.
    #[serde(default)]
    pub automation: Vec<usize>,
    #[serde(default)]
    pub disable_bulk_exclusions: bool,
    /// Shortname of an earlier count whose elected candidates restrict
    /// this one (a s.282 special count).
    #[serde(default)]
    pub s282_recount: Option<String>,
}

impl Config {
    pub fn read(path: &Path) -> anyhow::Result<Config> {
        let file = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
        let config: Config = serde_json::from_reader(file)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config: Config = serde_json::from_str(r#"{
            "title": "Senate 2016",
            "method": "AusSenatePost2015",
            "count": [
                {"name": "VIC Senate", "shortname": "vic2016", "state": "VIC", "path": "vic", "vacancies": 12},
                {"name": "WA s282", "shortname": "wa282", "state": "WA", "path": "wa", "vacancies": 2,
                 "verified": "wa/verified", "automation": [2], "s282_recount": "wa2016",
                 "disable_bulk_exclusions": true}
            ]
        }"#).unwrap();
        assert_eq!(config.count.len(), 2);
        let first = &config.count[0];
        assert_eq!(first.vacancies, 12);
        assert!(first.verified.is_none());
        assert!(first.automation.is_empty());
        assert!(!first.disable_bulk_exclusions);
        let second = &config.count[1];
        assert_eq!(second.automation, vec![2]);
        assert_eq!(second.s282_recount.as_deref(), Some("wa2016"));
    }
}
