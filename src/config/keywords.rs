// src/config/keywords.rs
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PATH: &str = "KEYWORDS_PATH";
const ENV_INLINE: &str = "KEYWORDS";

/// Load keywords from an explicit path. Supports TOML (`keywords = [...]`) or a JSON array.
pub fn load_keywords_from(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading keywords from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_keywords(&content, ext.as_str())
}

/// Load keywords using env vars + fallbacks:
/// 1) $KEYWORDS (comma separated)
/// 2) $KEYWORDS_PATH
/// 3) config/keywords.toml
/// 4) config/keywords.json
///
/// Nothing found means an empty list, which lets every item through the keyword gate.
pub fn load_keywords_default() -> Result<Vec<String>> {
    if let Ok(inline) = std::env::var(ENV_INLINE) {
        let list = parse_comma_list(&inline);
        if !list.is_empty() {
            return Ok(list);
        }
    }
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_keywords_from(&pb);
        } else {
            return Err(anyhow!("KEYWORDS_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/keywords.toml");
    if toml_p.exists() {
        return load_keywords_from(&toml_p);
    }
    let json_p = PathBuf::from("config/keywords.json");
    if json_p.exists() {
        return load_keywords_from(&json_p);
    }
    Ok(Vec::new())
}

/// Split `a, b ,,c` into trimmed, non-empty entries, keeping order.
pub fn parse_comma_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_keywords(s: &str, hint_ext: &str) -> Result<Vec<String>> {
    let try_toml = hint_ext == "toml" || s.contains("keywords");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported keywords format"))
}

fn parse_toml(s: &str) -> Result<Vec<String>> {
    #[derive(serde::Deserialize)]
    struct TomlKw {
        keywords: Vec<String>,
    }
    let v: TomlKw = toml::from_str(s)?;
    Ok(clean_list(v.keywords))
}

fn parse_json(s: &str) -> Result<Vec<String>> {
    let v: Vec<String> = serde_json::from_str(s)?;
    Ok(clean_list(v))
}

/// Trim, drop empties, dedupe case-insensitively (first spelling wins).
fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for it in items {
        let t = it.trim();
        if !t.is_empty() && seen.insert(t.to_lowercase()) {
            out.push(t.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_trim_and_formats_work() {
        let toml = r#"keywords = [" AI ", "", "LLM", "llm"]"#;
        let json = r#"["OpenAI", "  GPT  ", ""]"#;
        assert_eq!(parse_toml(toml).unwrap(), vec!["AI".to_string(), "LLM".to_string()]);
        assert_eq!(
            parse_json(json).unwrap(),
            vec!["OpenAI".to_string(), "GPT".to_string()]
        );
    }

    #[test]
    fn comma_list_skips_blanks() {
        assert_eq!(
            parse_comma_list(" AI, ,machine learning,,"),
            vec!["AI".to_string(), "machine learning".to_string()]
        );
    }
}
