// Copyright 2023-2024 the senate-scrutiny developers.
// This file is part of senate-scrutiny.
// senate-scrutiny is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// senate-scrutiny is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with senate-scrutiny.  If not, see <https://www.gnu.org/licenses/>.


//! End to end: a small fixture election on disk, driven from config to
//! report and verified against reference round logs.

use std::fs;
use std::path::{Path, PathBuf};
use main_app::{run_counts, RunOptions};

const CANDIDATES: &str = "\
state_ab,candidate_id,surname,ballot_given_nm,ticket,ballot_position,party_ballot_nm,party_ab
VIC,101,ABBOTT,Alice,A,1,Sunrise Party,SUN
VIC,102,BAKER,Ben,A,2,Sunrise Party,SUN
VIC,103,COLE,Cam,A,3,Sunrise Party,SUN
VIC,201,DUNN,Dev,B,1,Moonlight Party,MOON
VIC,202,EVANS,Erin,B,2,Moonlight Party,MOON
VIC,203,FOX,Fred,B,3,Moonlight Party,MOON
";

fn write_preferences(path: &Path) {
    let mut contents = String::new();
    contents.push_str("ElectorateNm,VoteCollectionPointNm,VoteCollectionPointId,BatchNo,PaperNo,Preferences\n");
    contents.push_str("------------,---------------------,---------------------,-------,-------,-----------\n");
    let mut paper = 0;
    // 60 above-the-line for group A then B, 40 the other way around
    for _ in 0..60 {
        paper += 1;
        contents.push_str(&format!("Melbourne,Town Hall,1,1,{},\"1,2,,,,,,\"\n", paper));
    }
    for _ in 0..40 {
        paper += 1;
        contents.push_str(&format!("Melbourne,Town Hall,1,1,{},\"2,1,,,,,,\"\n", paper));
    }
    fs::write(path, contents).unwrap();
}

/// Quota is 34; ABBOTT takes 60 first preferences and DUNN 40, both seats
/// fill in round 1.
const EXPECTED_ROUND_1: &str = r#"[["ABBOTT, Alice",60],["BAKER, Ben",0],["COLE, Cam",0],["DUNN, Dev",40],["EVANS, Erin",0],["FOX, Fred",0]]"#;

fn fixture_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("scrutiny_driver_{}_{}", tag, std::process::id()))
}

fn set_up(base: &Path) -> PathBuf {
    let data = base.join("vic");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("SenateCandidatesDownload-20499.csv"), CANDIDATES).unwrap();
    write_preferences(&data.join("aec-senate-formalpreferences-20499-VIC.csv"));
    let verified = data.join("verified");
    fs::create_dir_all(&verified).unwrap();
    fs::write(verified.join("round_1.json"), EXPECTED_ROUND_1).unwrap();

    let config = base.join("config.json");
    fs::write(&config, r#"{
        "title": "Fixture Senate Count",
        "method": "AusSenatePost2015",
        "count": [{
            "name": "VIC fixture",
            "shortname": "vic_fixture",
            "description": "two groups, two seats",
            "state": "VIC",
            "path": "vic",
            "vacancies": 2,
            "verified": "vic/verified"
        }]
    }"#).unwrap();
    config
}

fn options() -> RunOptions {
    RunOptions { quiet: true, verbose: false, max_ballots: None, only: None, only_verified: false }
}

#[test]
fn fixture_count_runs_verifies_and_reports() {
    let base = fixture_dir("ok");
    let config = set_up(&base);
    let out_dir = base.join("out");

    let ok = run_counts(&config, &out_dir, &options()).unwrap();
    assert!(ok, "verification should pass");

    // scratch round logs are cleaned up on success
    assert!(!out_dir.join("vic_fixture_round_logs").exists());

    let report: serde_json::Value = serde_json::from_reader(
        fs::File::open(out_dir.join("vic_fixture.json")).unwrap()).unwrap();
    assert_eq!(report["parameters"]["quota"], 34);
    assert_eq!(report["parameters"]["total_papers"], 100);
    assert_eq!(report["parameters"]["vacancies"], 2);
    let elected: Vec<u64> = report["summary"]["elected"].as_array().unwrap()
        .iter().map(|e| e["id"].as_u64().unwrap()).collect();
    assert_eq!(elected, vec![101, 201]);
    // ABBOTT's excess: 26 votes over 60 papers
    assert_eq!(report["summary"]["elected"][0]["excess_votes"], 26);
    assert_eq!(report["summary"]["elected"][0]["paper_count"], 60);
    assert_eq!(report["rounds"].as_array().unwrap().len(), 1);

    let index: serde_json::Value = serde_json::from_reader(
        fs::File::open(out_dir.join("count.json")).unwrap()).unwrap();
    assert_eq!(index["counts"][0]["path"], "vic_fixture");

    fs::remove_dir_all(&base).ok();
}

#[test]
fn failed_verification_is_reported() {
    let base = fixture_dir("bad");
    let config = set_up(&base);
    // poison the reference log
    fs::write(base.join("vic/verified/round_1.json"),
        r#"[["ABBOTT, Alice",61],["BAKER, Ben",0],["COLE, Cam",0],["DUNN, Dev",39],["EVANS, Erin",0],["FOX, Fred",0]]"#).unwrap();
    let out_dir = base.join("out");

    let ok = run_counts(&config, &out_dir, &options()).unwrap();
    assert!(!ok, "verification should fail");
    // failing logs are kept for inspection
    assert!(out_dir.join("vic_fixture_round_logs").exists());

    fs::remove_dir_all(&base).ok();
}

#[test]
fn only_filter_skips_other_counts() {
    let base = fixture_dir("only");
    let config = set_up(&base);
    let out_dir = base.join("out");
    let mut options = options();
    options.only = Some("not_this_one".to_string());

    let ok = run_counts(&config, &out_dir, &options).unwrap();
    assert!(ok);
    assert!(!out_dir.join("vic_fixture.json").exists());
    // the index is still written
    assert!(out_dir.join("count.json").exists());

    fs::remove_dir_all(&base).ok();
}
