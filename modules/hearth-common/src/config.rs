use std::env;

/// Kind of external backend a source adapter wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Hosted calendar with server-side recurrence expansion.
    Calendar,
    /// Paginated event feed API.
    FeedApi,
}

impl std::str::FromStr for SourceKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "calendar" => Ok(Self::Calendar),
            "feed" | "feed-api" => Ok(Self::FeedApi),
            other => Err(format!("unknown source kind: {other}")),
        }
    }
}

/// One configured ingest source.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub source_id: String,
    pub kind: SourceKind,
    pub url: String,
    /// Calendar/feed label, the host fallback when events name no organizer.
    pub label: String,
    pub time_zone: Option<String>,
}

impl SourceConfig {
    /// Parse one `kind|sourceId|url|label[|timeZone]` entry.
    fn parse(entry: &str) -> Result<Self, String> {
        let parts: Vec<&str> = entry.split('|').map(str::trim).collect();
        if parts.len() < 4 {
            return Err(format!("source entry needs kind|id|url|label: {entry}"));
        }
        Ok(Self {
            source_id: parts[1].to_string(),
            kind: parts[0].parse()?,
            url: parts[2].to_string(),
            label: parts[3].to_string(),
            time_zone: parts.get(4).filter(|s| !s.is_empty()).map(|s| s.to_string()),
        })
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // AI providers
    pub anthropic_api_key: String,
    pub voyage_api_key: String,
    pub embedding_dimension: usize,

    // Client auth
    pub api_key: String,

    // Display time zone for day-boundary math
    pub display_time_zone: String,

    // Per-deployment tag blocklist (comma-separated slugs)
    pub tag_blocklist: Vec<String>,

    // Debug: log classification decisions
    pub debug_classification: bool,

    // Web server
    pub web_host: String,
    pub web_port: u16,

    // Scheduler: 0 disables the in-process ingest loop
    pub ingest_interval_minutes: u64,

    // Configured ingest sources
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Load configuration for the API server.
    /// Panics with a clear message if required vars are missing.
    pub fn api_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            voyage_api_key: env::var("VOYAGE_API_KEY").unwrap_or_default(),
            embedding_dimension: embedding_dimension_env(),
            api_key: required_env("HEARTH_API_KEY"),
            display_time_zone: display_time_zone_env(),
            tag_blocklist: blocklist_env(),
            debug_classification: flag_env("DEBUG_CLASSIFICATION"),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: env::var("WEB_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("WEB_PORT must be a number"),
            ingest_interval_minutes: env::var("INGEST_INTERVAL_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            sources: sources_env(),
        }
    }

    /// Load config for the ingest CLI (no web server needed).
    pub fn ingest_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            anthropic_api_key: required_env("ANTHROPIC_API_KEY"),
            voyage_api_key: required_env("VOYAGE_API_KEY"),
            embedding_dimension: embedding_dimension_env(),
            api_key: String::new(),
            display_time_zone: display_time_zone_env(),
            tag_blocklist: blocklist_env(),
            debug_classification: flag_env("DEBUG_CLASSIFICATION"),
            web_host: String::new(),
            web_port: 0,
            ingest_interval_minutes: 0,
            sources: sources_env(),
        }
    }

    /// Log the presence and size of each sensitive var without its value.
    pub fn log_redacted(&self) {
        let vars = [
            ("DATABASE_URL", &self.database_url),
            ("ANTHROPIC_API_KEY", &self.anthropic_api_key),
            ("VOYAGE_API_KEY", &self.voyage_api_key),
            ("HEARTH_API_KEY", &self.api_key),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
        tracing::info!(
            sources = self.sources.len(),
            time_zone = %self.display_time_zone,
            embedding_dimension = self.embedding_dimension,
            "config loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn display_time_zone_env() -> String {
    env::var("DISPLAY_TIME_ZONE").unwrap_or_else(|_| "America/Los_Angeles".to_string())
}

fn embedding_dimension_env() -> usize {
    env::var("EMBEDDING_DIMENSION")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1024)
}

fn flag_env(key: &str) -> bool {
    matches!(
        env::var(key).unwrap_or_default().as_str(),
        "1" | "true" | "yes"
    )
}

fn blocklist_env() -> Vec<String> {
    env::var("TAG_BLOCKLIST")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse `HEARTH_SOURCES`: `;`-separated `kind|sourceId|url|label[|timeZone]`
/// entries. Malformed entries are logged and skipped.
fn sources_env() -> Vec<SourceConfig> {
    env::var("HEARTH_SOURCES")
        .unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|entry| match SourceConfig::parse(entry) {
            Ok(source) => Some(source),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed source entry");
                None
            }
        })
        .collect()
}
