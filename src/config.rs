use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use tracing::warn;

#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum CargoEnv {
    Development,
    Production,
}

#[derive(clap::Parser, Debug, Clone)]
pub struct AppConfig {
    // production or development, production logs to a file instead of stdout
    #[clap(long, env, value_enum, default_value = "development")]
    pub cargo_env: CargoEnv,

    // port that the app will bind to
    #[clap(long, env, default_value = "8080")]
    pub port: u16,

    // platform api that issues video tokens
    #[clap(long, env, default_value = "https://cbiz.yanhekt.cn")]
    pub upstream_api: String,

    // host the videos are served from, also the Host header fallback for intranet requests
    #[clap(long, env, default_value = "cvideo.yanhekt.cn")]
    pub video_host: String,

    // shared secret the obfuscation and signature digests are derived from
    #[clap(long, env, default_value = "1138b69dfef641d9d7ba49137d2d4875")]
    pub magic_key: String,

    // trace, debug, info, warn or error
    #[clap(long, env, default_value = "info")]
    pub log_level: String,

    // timeouts take 500ms, 30s, 2m, 1h or bare seconds
    #[clap(long, env, default_value = "30s", value_parser = parse_duration)]
    pub request_timeout: Duration,

    #[clap(long, env, default_value = "8s", value_parser = parse_duration)]
    pub intranet_timeout: Duration,

    #[clap(long, env, default_value = "10s", value_parser = parse_duration)]
    pub token_timeout: Duration,

    // retry n sleeps n times this
    #[clap(long, env, default_value = "1s", value_parser = parse_duration)]
    pub retry_backoff: Duration,

    // json file with the domain -> intranet address rules, reloaded on SIGHUP
    #[clap(long, env, default_value = "./mappings.json")]
    pub mappings_file: String,

    // host to put in rewritten manifest urls, otherwise the request's Host header is used
    #[clap(long, env)]
    pub public_host: Option<String>,

    // comma separated, empty allows any video host
    #[clap(long, env, value_delimiter = ',')]
    pub allowed_video_hosts: Vec<String>,

    // these mimic the web client, the video host checks them
    #[clap(long, env, default_value = "https://www.yanhekt.cn")]
    pub upstream_origin: String,

    #[clap(long, env, default_value = "https://www.yanhekt.cn/")]
    pub upstream_referer: String,

    #[clap(
        long,
        env,
        default_value = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/140.0.0.0 Safari/537.3"
    )]
    pub upstream_user_agent: String,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            port: 8080,
            upstream_api: "https://cbiz.yanhekt.cn".to_string(),
            video_host: "cvideo.yanhekt.cn".to_string(),
            magic_key: "1138b69dfef641d9d7ba49137d2d4875".to_string(),
            log_level: "info".to_string(),
            request_timeout: Duration::from_secs(30),
            intranet_timeout: Duration::from_secs(8),
            token_timeout: Duration::from_secs(10),
            retry_backoff: Duration::from_secs(1),
            mappings_file: "./mappings.json".to_string(),
            public_host: None,
            allowed_video_hosts: Vec::new(),
            upstream_origin: "https://www.yanhekt.cn".to_string(),
            upstream_referer: "https://www.yanhekt.cn/".to_string(),
            upstream_user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/140.0.0.0 Safari/537.3".to_string(),
            sentry_dsn: None,
        }
    }
}

impl AppConfig {
    /// headers every upstream request carries, built once and handed to each http client
    pub fn upstream_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        for (name, value) in [
            (ORIGIN, &self.upstream_origin),
            (REFERER, &self.upstream_referer),
            (USER_AGENT, &self.upstream_user_agent),
        ] {
            match HeaderValue::from_str(value) {
                Ok(v) => {
                    headers.insert(name, v);
                }
                Err(e) => warn!("skipping invalid upstream {} header: {}", name, e),
            }
        }

        headers
    }

    /// empty list means anything goes
    pub fn is_allowed_video_host(&self, host: &str) -> bool {
        self.allowed_video_hosts.is_empty()
            || self
                .allowed_video_hosts
                .iter()
                .any(|allowed| allowed.trim().eq_ignore_ascii_case(host))
    }
}

pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();

    let (number, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => value.split_at(idx),
        None => (value, "s"),
    };

    let amount: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration '{}'", value))?;

    match unit {
        "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount * 60)),
        "h" => Ok(Duration::from_secs(amount * 3600)),
        _ => Err(format!("unknown duration unit in '{}'", value)),
    }
}
