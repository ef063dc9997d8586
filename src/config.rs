//! Run configuration (spec §6), assembled from explicit fields layered over
//! environment variables, following `CachedStore::from_env`'s pattern of
//! reading `std::env::var` with typed fallbacks.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cache::backend::BackendKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    Tushare,
    Akshare,
    Baostock,
    Tdx,
}

impl DataSource {
    fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tushare" => Some(Self::Tushare),
            "akshare" => Some(Self::Akshare),
            "baostock" => Some(Self::Baostock),
            "tdx" => Some(Self::Tdx),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub primary_backend: BackendKind,
    pub fallback_backends: Vec<BackendKind>,
    pub memory_max_entries: usize,
    pub file_cache_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            primary_backend: BackendKind::Memory,
            fallback_backends: vec![BackendKind::File],
            memory_max_entries: 1000,
            file_cache_dir: default_cache_dir(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub parallel_analysts: bool,
    pub max_parallel_workers: usize,
    pub analyst_timeout_secs: u64,
    pub max_recur_limit: usize,
    pub online_tools: bool,
    pub cache: CacheConfig,
    pub default_china_data_source: DataSource,
    pub results_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parallel_analysts: false,
            max_parallel_workers: 4,
            analyst_timeout_secs: 300,
            max_recur_limit: 100,
            online_tools: true,
            cache: CacheConfig::default(),
            default_china_data_source: DataSource::Tushare,
            results_dir: default_results_dir(),
            data_dir: default_data_dir(),
        }
    }
}

impl Config {
    /// Layer environment variables over the defaults, following
    /// `CachedStore::from_env`'s `std::env::var` + fallback style.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();

        if let Ok(dir) = std::env::var("TRADINGAGENTS_CACHE_DIR") {
            cfg.cache.file_cache_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("TRADINGAGENTS_RESULTS_DIR") {
            cfg.results_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("TRADINGAGENTS_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Ok(source) = std::env::var("DEFAULT_CHINA_DATA_SOURCE") {
            if let Some(ds) = DataSource::from_str_loose(&source) {
                cfg.default_china_data_source = ds;
            }
        }
        if let Ok(val) = std::env::var("PARALLEL_ANALYSTS_ENABLED") {
            cfg.parallel_analysts = parse_bool(&val, cfg.parallel_analysts);
        }
        if let Ok(val) = std::env::var("MAX_PARALLEL_WORKERS") {
            if let Ok(n) = val.parse() {
                cfg.max_parallel_workers = n;
            }
        }
        if let Ok(val) = std::env::var("ANALYST_TIMEOUT") {
            if let Ok(n) = val.parse() {
                cfg.analyst_timeout_secs = n;
            }
        }
        if let Ok(val) = std::env::var("ONLINE_TOOLS_ENABLED") {
            cfg.online_tools = parse_bool(&val, cfg.online_tools);
        }

        cfg
    }
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn home_dir() -> PathBuf {
    std::env::var("HOME").map_or_else(|_| PathBuf::from("/tmp"), PathBuf::from)
}

fn default_cache_dir() -> PathBuf {
    home_dir().join(".tradingagents").join("cache")
}

fn default_results_dir() -> PathBuf {
    home_dir().join(".tradingagents").join("results")
}

fn default_data_dir() -> PathBuf {
    home_dir().join(".tradingagents").join("data")
}

/// `research_depth ∈ {1..5}` → model/debate-round profile (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelProfile {
    Quick,
    Deep,
}

#[derive(Debug, Clone, Copy)]
pub struct DepthProfile {
    pub max_debate_rounds: u32,
    pub max_risk_discuss_rounds: u32,
    pub model_profile: ModelProfile,
    pub online_tools: bool,
    pub memory_enabled: bool,
}

/// Documented research-depth table (spec §6): depths 1-2 are quick, 3 is
/// the default, 4-5 enlarge debate rounds and go deep.
pub fn depth_profile(research_depth: u8) -> DepthProfile {
    match research_depth.clamp(1, 5) {
        1 => DepthProfile {
            max_debate_rounds: 1,
            max_risk_discuss_rounds: 1,
            model_profile: ModelProfile::Quick,
            online_tools: true,
            memory_enabled: true,
        },
        2 => DepthProfile {
            max_debate_rounds: 1,
            max_risk_discuss_rounds: 1,
            model_profile: ModelProfile::Quick,
            online_tools: true,
            memory_enabled: true,
        },
        3 => DepthProfile {
            max_debate_rounds: 1,
            max_risk_discuss_rounds: 1,
            model_profile: ModelProfile::Deep,
            online_tools: true,
            memory_enabled: true,
        },
        4 => DepthProfile {
            max_debate_rounds: 2,
            max_risk_discuss_rounds: 2,
            model_profile: ModelProfile::Deep,
            online_tools: true,
            memory_enabled: true,
        },
        _ => DepthProfile {
            max_debate_rounds: 3,
            max_risk_discuss_rounds: 3,
            model_profile: ModelProfile::Deep,
            online_tools: true,
            memory_enabled: true,
        },
    }
}
