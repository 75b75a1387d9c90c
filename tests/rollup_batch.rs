// tests/rollup_batch.rs
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use news_digest::ingest::types::{GOOGLE_FIELDS, RSS_FIELDS};
use news_digest::rollup::batch::canonical_json;
use news_digest::rollup::{build_master_csv, build_master_json, BatchCounts, BatchError};
use rand::seq::SliceRandom;
use serde_json::Value;

fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
    let p = dir.join(name);
    fs::write(&p, body).unwrap();
    p
}

fn read_rows(p: &Path) -> Vec<Vec<String>> {
    let mut r = csv::Reader::from_path(p).unwrap();
    r.records()
        .map(|rec| rec.unwrap().iter().map(String::from).collect())
        .collect()
}

const RSS_HEADER: &str = "trigger_keywords,title,snippet,date_published,source_domain,url";

#[test]
fn whitespace_variant_is_one_record_with_first_value_kept() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(
        dir.path(),
        "rss_articles_2024-06-03.csv",
        &format!("{RSS_HEADER}\nsolar,Solar up,  padded snippet ,2024-06-03,e.com,https://e.com/1\n"),
    );
    let b = write(
        dir.path(),
        "rss_articles_2024-06-04.csv",
        &format!(
            "{RSS_HEADER}\nsolar,Solar up,padded snippet,2024-06-03,e.com,https://e.com/1\n\
             wind,Wind up,s,2024-06-04,e.com,https://e.com/2\n"
        ),
    );
    let out = dir.path().join("out/master.csv");

    let counts = build_master_csv(&[a, b], &out, &RSS_FIELDS).unwrap();
    assert_eq!(
        counts,
        BatchCounts {
            unique: 2,
            total: 3,
            duplicates: 1
        }
    );

    let rows = read_rows(&out);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][2], "  padded snippet ");
    assert_eq!(rows[1][1], "Wind up");
}

#[test]
fn extra_columns_are_dropped_and_order_follows_field_list() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(
        dir.path(),
        "a.csv",
        "\u{feff}url,title,extra,trigger_keywords,snippet,date_published,source_domain\n\
         https://e.com/1,T,x,solar,s,2024-06-03,e.com\n",
    );
    let out = dir.path().join("m.csv");
    build_master_csv(&[a], &out, &RSS_FIELDS).unwrap();

    let mut r = csv::Reader::from_path(&out).unwrap();
    let headers: Vec<String> = r.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(headers, RSS_FIELDS.to_vec());
    let row = r.records().next().unwrap().unwrap();
    assert_eq!(&row[0], "solar");
    assert_eq!(&row[5], "https://e.com/1");
}

#[test]
fn schema_drift_aborts_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let good = write(
        dir.path(),
        "good.csv",
        &format!("{RSS_HEADER}\nsolar,T,s,2024-06-03,e.com,https://e.com/1\n"),
    );
    let bad = write(
        dir.path(),
        "bad.csv",
        "trigger_keywords,title,date_published,url\nsolar,T,2024-06-03,https://e.com/1\n",
    );
    let out = dir.path().join("master.csv");

    let err = build_master_csv(&[good, bad], &out, &RSS_FIELDS).unwrap_err();
    match err {
        BatchError::MissingFields { path, missing } => {
            assert!(path.ends_with("bad.csv"));
            assert_eq!(missing, vec!["snippet".to_string(), "source_domain".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!out.exists());
}

#[test]
fn running_twice_gives_identical_output() {
    let dir = tempfile::tempdir().unwrap();
    let header = GOOGLE_FIELDS.join(",");
    let a = write(
        dir.path(),
        "g1.csv",
        &format!("{header}\nhydro,Dam,\"a, b\",2024-06-03,e.com,https://e.com/1,\nhydro,Dam,\"a, b\",2024-06-03,e.com,https://e.com/1,\n"),
    );
    let out1 = dir.path().join("one.csv");
    let out2 = dir.path().join("two.csv");
    let c1 = build_master_csv(&[a.clone()], &out1, &GOOGLE_FIELDS).unwrap();
    let c2 = build_master_csv(&[a], &out2, &GOOGLE_FIELDS).unwrap();
    assert_eq!(c1, c2);
    assert_eq!(c1.unique, 1);
    assert_eq!(fs::read(&out1).unwrap(), fs::read(&out2).unwrap());
}

#[test]
fn identity_set_is_invariant_under_input_permutation() {
    let dir = tempfile::tempdir().unwrap();
    let mut inputs = Vec::new();
    for day in 1..=6u32 {
        let mut body = format!("{RSS_HEADER}\n");
        for i in 0..5u32 {
            // Overlapping ids across files, with whitespace noise on some copies.
            let id = (day + i) % 7;
            let pad = if (day + i) % 2 == 0 { " " } else { "" };
            body.push_str(&format!(
                "kw{id},{pad}Title {id}{pad},s,2024-06-0{},e.com,https://e.com/{id}\n",
                id % 3 + 1
            ));
        }
        inputs.push(write(dir.path(), &format!("rss_articles_2024-06-0{day}.csv"), &body));
    }

    let identities = |p: &Path| -> HashSet<Vec<String>> {
        read_rows(p)
            .into_iter()
            .map(|r| r.into_iter().map(|v| v.trim().to_string()).collect())
            .collect()
    };

    let base_out = dir.path().join("base.csv");
    let base = build_master_csv(&inputs, &base_out, &RSS_FIELDS).unwrap();
    let expected = identities(&base_out);
    assert_eq!(expected.len(), base.unique);

    let mut rng = rand::rng();
    for round in 0..8 {
        let mut shuffled = inputs.clone();
        shuffled.shuffle(&mut rng);
        let out = dir.path().join(format!("perm{round}.csv"));
        let counts = build_master_csv(&shuffled, &out, &RSS_FIELDS).unwrap();
        assert_eq!(counts, base);
        assert_eq!(identities(&out), expected);
    }
}

#[test]
fn json_skips_non_objects_and_ignores_key_order() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(
        dir.path(),
        "a.json",
        r#"[{"title": "A", "url": "u1", "tags": {"x": 1, "y": 2}}, 7, "noise", null]"#,
    );
    let b = write(
        dir.path(),
        "b.json",
        r#"[{"tags": {"y": 2, "x": 1}, "url": "u1", "title": "A"}, {"title": "B", "url": "u2"}, [1, 2]]"#,
    );
    let out = dir.path().join("master.json");

    let counts = build_master_json(&[a, b], &out).unwrap();
    assert_eq!(
        counts,
        BatchCounts {
            unique: 2,
            total: 3,
            duplicates: 1
        }
    );

    let text = fs::read_to_string(&out).unwrap();
    assert!(text.contains('\n'), "output is pretty-printed");
    let v: Value = serde_json::from_str(&text).unwrap();
    let items = v.as_array().unwrap();
    assert_eq!(items.len(), 2);
    // Stored verbatim, including the original key order of the first copy.
    let first_keys: Vec<&String> = items[0].as_object().unwrap().keys().collect();
    assert_eq!(first_keys, vec!["title", "url", "tags"]);
    assert_eq!(canonical_json(&items[1]), r#"{"title":"B","url":"u2"}"#);
}

#[test]
fn json_top_level_must_be_an_array() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(dir.path(), "a.json", r#"{"title": "A"}"#);
    let out = dir.path().join("master.json");
    let err = build_master_json(&[a], &out).unwrap_err();
    assert!(matches!(err, BatchError::NotAnArray { .. }));
    assert!(!out.exists());
}
