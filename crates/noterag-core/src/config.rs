use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::chunker::ChunkerConfig;
use crate::error::{Error, Result};

/// Layered configuration: `config.toml`, then `config.<env>.toml`, then `APP_*`
/// environment variables (nested keys separated by `__`, e.g.
/// `APP_EMBEDDING__BACKEND=hashing`).
pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Load with TOML files looked up in `dir`; relative paths in the result resolve against it.
    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(RagConfig::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment, base_dir: dir.to_path_buf() })
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The full typed configuration with paths expanded and validated.
    pub fn settings(&self) -> Result<RagConfig> {
        let mut cfg: RagConfig = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        cfg.notes_dir = resolve_with_base(&self.base_dir, cfg.notes_dir.to_string_lossy());
        if let Some(dir) = cfg.embedding.model_dir.take() {
            cfg.embedding.model_dir = Some(resolve_with_base(&self.base_dir, dir.to_string_lossy()));
        }
        if use_fake_embeddings() {
            cfg.embedding.backend = EmbeddingBackendKind::Hashing;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

/// `APP_USE_FAKE_EMBEDDINGS=1` (or `true`) forces the hashing embedder.
pub fn use_fake_embeddings() -> bool {
    env::var("APP_USE_FAKE_EMBEDDINGS")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub notes_dir: PathBuf,
    pub chunking: ChunkerConfig,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalConfig,
    pub storage: StorageSettings,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            notes_dir: PathBuf::from("notes"),
            chunking: ChunkerConfig::default(),
            embedding: EmbeddingSettings::default(),
            retrieval: RetrievalConfig::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl RagConfig {
    /// Defaults rooted at a notes directory; handy for tests and embedding callers.
    pub fn for_notes_dir(notes_dir: impl Into<PathBuf>) -> Self {
        Self { notes_dir: notes_dir.into(), ..Self::default() }
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.embedding.validate()?;
        self.retrieval.validate()?;
        if self.storage.data_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("storage.data_dir must not be empty".into()));
        }
        Ok(())
    }

    /// `<notes>/<data_dir>`, holding the vector store and the manifest.
    pub fn data_dir(&self) -> PathBuf {
        self.notes_dir.join(&self.storage.data_dir)
    }

    pub fn vectors_dir(&self) -> PathBuf {
        self.data_dir().join("vectors")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.data_dir().join("index-manifest.json")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackendKind {
    Local,
    Hashing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackendKind,
    /// Directory holding `tokenizer.json`, `config.json` and the weights.
    pub model_dir: Option<PathBuf>,
    /// Output size of the hashing embedder; the local model reports its own.
    pub dimension: usize,
    pub max_length: usize,
    pub batch_size: usize,
    pub max_concurrent_batches: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackendKind::Local,
            model_dir: None,
            dimension: 384,
            max_length: 512,
            batch_size: 32,
            max_concurrent_batches: 2,
        }
    }
}

impl EmbeddingSettings {
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(Error::InvalidConfig("embedding.dimension must be greater than 0".into()));
        }
        if self.batch_size == 0 || self.max_concurrent_batches == 0 {
            return Err(Error::InvalidConfig(
                "embedding.batch_size and embedding.max_concurrent_batches must be greater than 0".into(),
            ));
        }
        if self.max_length == 0 {
            return Err(Error::InvalidConfig("embedding.max_length must be greater than 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Hybrid,
    Semantic,
    Keyword,
}

/// Per-query retrieval knobs. The `[retrieval]` table supplies the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub min_score: f32,
    pub mode: SearchMode,
    /// Overrides the mode's default keyword weight when set.
    pub keyword_weight: Option<f32>,
    pub graph_rerank: bool,
    pub boost_factor: f32,
    pub context_expansion: bool,
    pub context_lines: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.0,
            mode: SearchMode::Hybrid,
            keyword_weight: None,
            graph_rerank: true,
            boost_factor: 0.2,
            context_expansion: true,
            context_lines: 2,
        }
    }
}

impl RetrievalConfig {
    pub fn keyword_weight(&self) -> f32 {
        match (self.keyword_weight, self.mode) {
            (Some(w), _) => w.clamp(0.0, 1.0),
            (None, SearchMode::Hybrid) => 0.3,
            (None, SearchMode::Keyword) => 1.0,
            (None, SearchMode::Semantic) => 0.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(Error::InvalidConfig("retrieval.top_k must be greater than 0".into()));
        }
        if !self.boost_factor.is_finite() || self.boost_factor < 0.0 {
            return Err(Error::InvalidConfig("retrieval.boost_factor must be a non-negative number".into()));
        }
        if let Some(w) = self.keyword_weight {
            if !(0.0..=1.0).contains(&w) {
                return Err(Error::InvalidConfig(format!("retrieval.keyword_weight {w} is outside 0..=1")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendKind {
    Lance,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StoreBackendKind,
    /// Relative to the notes directory.
    pub data_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { backend: StoreBackendKind::Lance, data_dir: PathBuf::from(".noterag") }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
