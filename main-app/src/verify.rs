// Copyright 2023-2024 the senate-scrutiny developers.
// This file is part of senate-scrutiny.
// senate-scrutiny is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// senate-scrutiny is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with senate-scrutiny.  If not, see <https://www.gnu.org/licenses/>.


//! Comparison of per-round vote logs against a directory of verified
//! reference logs. Any differing round fails the count's verification.

use std::fs::File;
use std::path::Path;
use anyhow::Context;
use serde_json::Value;

fn round_numbers(dir: &Path) -> anyhow::Result<Vec<usize>> {
    let mut rounds = vec![];
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading verified logs {}", dir.display()))? {
        let name = entry?.file_name().to_string_lossy().to_string();
        if let Some(number) = name.strip_prefix("round_").and_then(|rest| rest.strip_suffix(".json")) {
            if let Ok(number) = number.parse::<usize>() {
                rounds.push(number);
            }
        }
    }
    rounds.sort_unstable();
    Ok(rounds)
}

fn read_log(dir: &Path, round: usize) -> anyhow::Result<Value> {
    let path = dir.join(format!("round_{}.json", round));
    let file = File::open(&path).with_context(|| format!("opening round log {}", path.display()))?;
    serde_json::from_reader(file).with_context(|| format!("parsing round log {}", path.display()))
}

/// Compare every reference round log against the freshly written one.
/// Prints one line per round; on success the scratch logs are removed.
pub fn verify_round_logs(verified_dir: &Path, test_log_dir: &Path, quiet: bool) -> anyhow::Result<bool> {
    let rounds = round_numbers(verified_dir)?;
    let mut ok = true;
    for round in &rounds {
        let expected = read_log(verified_dir, *round)?;
        let actual = read_log(test_log_dir, *round)?;
        if expected == actual {
            if !quiet { println!("Round {}: OK", round); }
        } else {
            ok = false;
            println!("Round {}: FAIL", round);
            println!("Log should be:\n{}", serde_json::to_string_pretty(&expected)?);
            println!("Log is:\n{}", serde_json::to_string_pretty(&actual)?);
        }
    }
    if ok && !rounds.is_empty() {
        std::fs::remove_dir_all(test_log_dir).ok();
    }
    Ok(ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_log(dir: &Path, round: usize, contents: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(format!("round_{}.json", round)), contents).unwrap();
    }

    #[test]
    fn matching_logs_verify_and_clean_up() {
        let base = std::env::temp_dir().join(format!("scrutiny_verify_ok_{}", std::process::id()));
        let verified = base.join("verified");
        let test = base.join("test");
        write_log(&verified, 1, r#"[["SMITH, A", 10]]"#);
        write_log(&test, 1, r#"[["SMITH, A", 10]]"#);
        assert!(verify_round_logs(&verified, &test, true).unwrap());
        assert!(!test.exists());
        fs::remove_dir_all(&base).ok();
    }

    #[test]
    fn differing_logs_fail_and_are_kept() {
        let base = std::env::temp_dir().join(format!("scrutiny_verify_bad_{}", std::process::id()));
        let verified = base.join("verified");
        let test = base.join("test");
        write_log(&verified, 1, r#"[["SMITH, A", 10]]"#);
        write_log(&test, 1, r#"[["SMITH, A", 11]]"#);
        assert!(!verify_round_logs(&verified, &test, true).unwrap());
        assert!(test.exists());
        fs::remove_dir_all(&base).ok();
    }
}
