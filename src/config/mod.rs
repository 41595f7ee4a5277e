// src/config/mod.rs
//! Process configuration, read once at startup from the environment (after `.env`).
//!
//! Missing credentials fail here, before any run starts.

pub mod keywords;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono_tz::Tz;

use crate::images::ImageFallbackPolicy;
use crate::retry::RetryPolicy;

pub const DEFAULT_FEEDS: &[&str] = &[
    "https://techcrunch.com/category/artificial-intelligence/feed/",
    "https://venturebeat.com/category/ai/feed/",
    "https://www.technologyreview.com/feed/",
    "https://www.theverge.com/artificial-intelligence/rss/index.xml",
    "https://openai.com/blog/rss/",
    "https://ai.googleblog.com/feeds/posts/default",
    "https://www.anthropic.com/news/rss",
];

#[derive(Debug, Clone)]
pub struct RssConfig {
    pub sources: Vec<String>,
    pub keywords: Vec<String>,
    pub similarity_threshold: f64,
    pub max_items: usize,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model_rank: String,
    pub model_post: String,
    pub model_image: String,
    pub image_size: String,
}

#[derive(Debug, Clone)]
pub struct PexelsConfig {
    pub api_key: String,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct FreeImageHostConfig {
    pub api_key: String,
    pub endpoint: String,
}

#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub sheet_id: String,
    pub service_account_json: PathBuf,
    pub worksheet: String,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub timezone: Tz,
    pub run_hours: Vec<u32>,
    pub run_once_on_start: bool,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub relevance_threshold: u8,
    pub concurrency: usize,
    pub run_timeout: Duration,
    pub retry: RetryPolicy,
    pub image_policy: ImageFallbackPolicy,
    pub post_language: String,
    pub post_min_chars: usize,
    pub post_max_chars: usize,
    pub regenerate_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: 7,
            concurrency: 4,
            run_timeout: Duration::from_secs(1800),
            retry: RetryPolicy::default(),
            image_policy: ImageFallbackPolicy::FailItem,
            post_language: "Russian".to_string(),
            post_min_chars: 800,
            post_max_chars: 1700,
            regenerate_attempts: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub rss: RssConfig,
    pub openai: OpenAiConfig,
    pub pexels: PexelsConfig,
    pub freeimagehost: FreeImageHostConfig,
    pub sheets: SheetsConfig,
    pub scheduler: SchedulerConfig,
    pub pipeline: PipelineConfig,
    pub cache_dir: PathBuf,
    pub http_timeout: Duration,
    pub status_addr: String,
}

impl AppConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let keywords = keywords::load_keywords_default()?;
        Self::from_lookup(|k| std::env::var(k).ok(), keywords)
    }

    /// Build from an arbitrary key lookup. `keywords` is resolved by the caller
    /// because it may come from a file.
    pub fn from_lookup<F>(get: F, keywords: Vec<String>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&get);

        let mut sources = keywords::parse_comma_list(&env.or("RSS_SOURCES", ""));
        if sources.is_empty() {
            sources = DEFAULT_FEEDS.iter().map(|s| s.to_string()).collect();
        }

        let rss = RssConfig {
            sources,
            keywords,
            similarity_threshold: env.parse("SIMILARITY_THRESHOLD", 0.85)?,
            max_items: env.parse("PIPELINE_MAX_ITEMS", 25)?,
        };

        let openai = OpenAiConfig {
            api_key: env.require("OPENAI_API_KEY")?,
            base_url: env.or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            model_rank: env.or("OPENAI_MODEL_RANK", "gpt-4o-mini"),
            model_post: env.or("OPENAI_MODEL_POST", "gpt-4o-mini"),
            model_image: env.or("OPENAI_IMAGE_MODEL", "gpt-image-1"),
            image_size: env.or("OPENAI_IMAGE_SIZE", "1024x1024"),
        };

        let pexels_enabled = env.flag("PEXELS_ENABLED", true);
        let pexels = PexelsConfig {
            api_key: if pexels_enabled {
                env.require("PEXELS_API_KEY")?
            } else {
                env.or("PEXELS_API_KEY", "")
            },
            enabled: pexels_enabled,
        };

        let freeimagehost = FreeImageHostConfig {
            api_key: env.require("FREEIMAGEHOST_API_KEY")?,
            endpoint: env.or(
                "FREEIMAGEHOST_API_ENDPOINT",
                "https://freeimage.host/api/1/upload",
            ),
        };

        let sheets = SheetsConfig {
            sheet_id: env.require("SHEET_ID")?,
            service_account_json: PathBuf::from(env.require("GOOGLE_SERVICE_ACCOUNT_JSON")?),
            worksheet: env.or("SHEET_WORKSHEET", "Sheet1"),
        };

        let tz_name = env.or("SCHEDULER_TIMEZONE", "Europe/Moscow");
        let timezone: Tz = tz_name
            .parse()
            .map_err(|e| anyhow!("SCHEDULER_TIMEZONE '{tz_name}': {e}"))?;
        let run_hours = parse_hours(&env.or("SCHEDULER_HOURS", "7,19"))?;
        let scheduler = SchedulerConfig {
            timezone,
            run_hours,
            run_once_on_start: env.flag("RUN_PIPELINE_ON_START", true),
        };

        let defaults = PipelineConfig::default();
        let image_policy = env
            .or("IMAGE_FALLBACK_POLICY", defaults.image_policy.as_str())
            .parse::<ImageFallbackPolicy>()?;
        let pipeline = PipelineConfig {
            relevance_threshold: env
                .parse::<u8>("RELEVANCE_THRESHOLD", defaults.relevance_threshold)?
                .clamp(1, 10),
            concurrency: env.parse::<usize>("PIPELINE_CONCURRENCY", defaults.concurrency)?.max(1),
            run_timeout: Duration::from_secs(env.parse("PIPELINE_RUN_TIMEOUT_SECS", 1800)?),
            retry: RetryPolicy::new(
                env.parse("RETRY_MAX_ATTEMPTS", 3)?,
                Duration::from_millis(env.parse("RETRY_BASE_DELAY_MS", 1000)?),
                Duration::from_millis(env.parse("RETRY_MAX_TOTAL_DELAY_MS", 10_000)?),
            ),
            image_policy,
            post_language: env.or("POST_LANGUAGE", &defaults.post_language),
            post_min_chars: env.parse("POST_MIN_CHARS", defaults.post_min_chars)?,
            post_max_chars: env.parse("POST_MAX_CHARS", defaults.post_max_chars)?,
            regenerate_attempts: env.parse("POST_REGENERATE_ATTEMPTS", defaults.regenerate_attempts)?,
        };
        if pipeline.post_min_chars > pipeline.post_max_chars {
            bail!(
                "POST_MIN_CHARS ({}) exceeds POST_MAX_CHARS ({})",
                pipeline.post_min_chars,
                pipeline.post_max_chars
            );
        }

        Ok(Self {
            rss,
            openai,
            pexels,
            freeimagehost,
            sheets,
            scheduler,
            pipeline,
            cache_dir: PathBuf::from(env.or("CACHE_DIR", ".cache")),
            http_timeout: Duration::from_secs(env.parse("HTTP_TIMEOUT_SECS", 30)?),
            status_addr: env.or("STATUS_ADDR", "0.0.0.0:8080"),
        })
    }
}

/// Parse `7,19` into sorted, distinct hours in `0..24`.
pub fn parse_hours(s: &str) -> Result<Vec<u32>> {
    let mut hours = Vec::new();
    for part in keywords::parse_comma_list(s) {
        let h: u32 = part
            .parse()
            .with_context(|| format!("SCHEDULER_HOURS entry '{part}'"))?;
        if h > 23 {
            bail!("SCHEDULER_HOURS entry {h} is out of range 0..=23");
        }
        hours.push(h);
    }
    hours.sort_unstable();
    hours.dedup();
    if hours.is_empty() {
        bail!("SCHEDULER_HOURS must name at least one hour");
    }
    Ok(hours)
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn require(&self, key: &str) -> Result<String> {
        self.get(key)
            .ok_or_else(|| anyhow!("missing required environment variable: {key}"))
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(v) => matches!(
                v.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "y" | "on"
            ),
            None => default,
        }
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(v) => v
                .parse::<T>()
                .map_err(|e| anyhow!("invalid value for {key} ('{v}'): {e}")),
            None => Ok(default),
        }
    }
}
