// tests/keywords_config.rs
//
// Keyword list loading from env / files. Env-mutating tests run serially.

use std::fs;

use ai_news_writer::config::keywords::{load_keywords_default, load_keywords_from};
use serial_test::serial;

fn clear_env() {
    std::env::remove_var("KEYWORDS");
    std::env::remove_var("KEYWORDS_PATH");
}

#[test]
#[serial]
fn inline_env_wins() {
    clear_env();
    std::env::set_var("KEYWORDS", "OpenAI, LLM ,, agents");
    let kw = load_keywords_default().unwrap();
    assert_eq!(kw, vec!["OpenAI", "LLM", "agents"]);
    clear_env();
}

#[test]
#[serial]
fn path_env_loads_toml() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("kw.toml");
    fs::write(&p, "keywords = [\"gpt\", \"GPT\", \"robotics\"]\n").unwrap();
    std::env::set_var("KEYWORDS_PATH", &p);
    let kw = load_keywords_default().unwrap();
    assert_eq!(kw.len(), 2, "case-insensitive duplicates collapse: {kw:?}");
    clear_env();
}

#[test]
#[serial]
fn missing_path_is_an_error() {
    clear_env();
    std::env::set_var("KEYWORDS_PATH", "/definitely/not/here.toml");
    assert!(load_keywords_default().is_err());
    clear_env();
}

#[test]
fn json_array_file_loads() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("kw.json");
    fs::write(&p, r#"["machine learning", "  ", "LLM"]"#).unwrap();
    let kw = load_keywords_from(&p).unwrap();
    assert_eq!(kw, vec!["machine learning", "LLM"]);
}
