//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge compiled defaults + `config.toml` + `config.<env>.toml`
//! + `LOCALQA_*` env vars into a typed [`Settings`] tree. Paths go through
//! [`expand_path`] so `~` and `${VAR}` work in any layer.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::types::GenerationParams;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(None)
    }

    /// Layers defaults, `config.toml`, `config.<env>.toml`, an optional
    /// explicit file and `LOCALQA_*` environment variables, in that order.
    pub fn load_from(extra_file: Option<&Path>) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        if let Some(path) = extra_file {
            if !path.exists() {
                return Err(Error::NotFound(format!("config file {}", path.display())).into());
            }
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("LOCALQA_").split("__"));

        Ok(Self { figment })
    }

    /// Extract and validate the full settings tree.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub ingest: IngestSettings,
    pub embed: EmbedSettings,
    pub retrieval: RetrievalSettings,
    pub llm: LlmSettings,
    pub prompt: PromptSettings,
    pub device: DeviceKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub documents_dir: String,
    pub index_dir: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { documents_dir: "documents".to_string(), index_dir: "vectorstore".to_string() }
    }
}

impl DataSettings {
    pub fn documents_dir(&self) -> PathBuf { expand_path(&self.documents_dir) }
    pub fn index_dir(&self) -> PathBuf { expand_path(&self.index_dir) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared by adjacent chunks of one document.
    pub chunk_overlap: usize,
    /// Descend into subdirectories of the documents directory.
    pub recursive: bool,
    pub extensions: Vec<String>,
    pub batch_size: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self { chunk_size: 500, chunk_overlap: 50, recursive: false, extensions: vec!["txt".to_string()], batch_size: 32 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbedBackend {
    #[default]
    Bert,
    XlmRoberta,
    Fake,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedSettings {
    pub backend: EmbedBackend,
    pub model_dir: String,
    pub max_len: usize,
    pub query_prefix: String,
    pub passage_prefix: String,
    pub fake_dim: usize,
}

impl Default for EmbedSettings {
    fn default() -> Self {
        Self {
            backend: EmbedBackend::Bert,
            model_dir: "models/multilingual-e5-small".to_string(),
            max_len: 512,
            query_prefix: "query: ".to_string(),
            passage_prefix: "passage: ".to_string(),
            fake_dim: 384,
        }
    }
}

impl EmbedSettings {
    pub fn model_dir(&self) -> PathBuf { expand_path(&self.model_dir) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self { Self { top_k: 3 } }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatFormat {
    #[default]
    #[serde(rename = "llama-3")]
    Llama3,
    #[serde(rename = "chatml")]
    ChatMl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub model_path: String,
    pub tokenizer_path: String,
    pub chat_format: ChatFormat,
    pub n_ctx: usize,
    pub max_tokens: usize,
    pub temperature: f64,
    pub top_p: Option<f64>,
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
    pub seed: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        let params = GenerationParams::default();
        Self {
            model_path: "models/Llama-3-ELYZA-JP-8B-Q4_K_M.gguf".to_string(),
            tokenizer_path: "models/tokenizer.json".to_string(),
            chat_format: ChatFormat::Llama3,
            n_ctx: 2048,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            repeat_penalty: params.repeat_penalty,
            repeat_last_n: params.repeat_last_n,
            seed: params.seed,
        }
    }
}

impl LlmSettings {
    pub fn model_path(&self) -> PathBuf { expand_path(&self.model_path) }
    pub fn tokenizer_path(&self) -> PathBuf { expand_path(&self.tokenizer_path) }

    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            repeat_penalty: self.repeat_penalty,
            repeat_last_n: self.repeat_last_n,
            seed: self.seed,
        }
    }
}

/// Longest sequence candle's quantized llama keeps in its KV cache.
pub const MAX_CONTEXT_TOKENS: usize = 4096;

pub const CONTEXT_PLACEHOLDER: &str = "{context}";
pub const QUESTION_PLACEHOLDER: &str = "{question}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    pub system: String,
    pub rag_template: String,
    pub context_separator: String,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            system: "You are an honest and capable assistant. Answer clearly and concisely.".to_string(),
            rag_template: "Answer the user's question using the reference information below.\n\
If the question is unrelated to the information, answer \"No relevant information\".\n\
\n\
Reference information:\n\
{context}\n\
\n\
Question: {question}\n"
                .to_string(),
            context_separator: "\n\n".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Cpu,
    Metal,
}

impl Settings {
    pub fn validate(&self) -> anyhow::Result<()> {
        let ingest = &self.ingest;
        if ingest.chunk_size == 0 {
            return Err(Error::InvalidConfig("ingest.chunk_size must be greater than 0".into()).into());
        }
        if ingest.chunk_overlap >= ingest.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "ingest.chunk_overlap ({}) must be smaller than ingest.chunk_size ({})",
                ingest.chunk_overlap, ingest.chunk_size
            ))
            .into());
        }
        if ingest.batch_size == 0 {
            return Err(Error::InvalidConfig("ingest.batch_size must be greater than 0".into()).into());
        }
        if ingest.extensions.is_empty() {
            return Err(Error::InvalidConfig("ingest.extensions must list at least one extension".into()).into());
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::InvalidConfig("retrieval.top_k must be at least 1".into()).into());
        }
        let template = &self.prompt.rag_template;
        for placeholder in [CONTEXT_PLACEHOLDER, QUESTION_PLACEHOLDER] {
            if !template.contains(placeholder) {
                return Err(Error::InvalidConfig(format!("prompt.rag_template is missing {placeholder}")).into());
            }
        }
        if self.embed.max_len == 0 {
            return Err(Error::InvalidConfig("embed.max_len must be greater than 0".into()).into());
        }
        if self.llm.n_ctx == 0 || self.llm.n_ctx > MAX_CONTEXT_TOKENS {
            return Err(Error::InvalidConfig(format!(
                "llm.n_ctx must be between 1 and {MAX_CONTEXT_TOKENS}, got {}",
                self.llm.n_ctx
            ))
            .into());
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().expect("defaults validate");
        assert_eq!(settings.ingest.chunk_size, 500);
        assert_eq!(settings.ingest.chunk_overlap, 50);
        assert!(!settings.ingest.recursive);
        assert_eq!(settings.retrieval.top_k, 3);
    }

    #[test]
    fn toml_and_env_layers_override_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [data]
                documents_dir = "docs"

                [ingest]
                chunk_size = 1000
                chunk_overlap = 200

                [llm]
                chat_format = "chatml"
                "#,
            )?;
            jail.set_env("LOCALQA_RETRIEVAL__TOP_K", "5");
            jail.set_env("LOCALQA_EMBED__BACKEND", "fake");

            let settings = Config::load().expect("load").settings().expect("settings");
            assert_eq!(settings.data.documents_dir, "docs");
            assert_eq!(settings.data.index_dir, "vectorstore");
            assert_eq!(settings.ingest.chunk_size, 1000);
            assert_eq!(settings.ingest.chunk_overlap, 200);
            assert_eq!(settings.retrieval.top_k, 5);
            assert_eq!(settings.embed.backend, EmbedBackend::Fake);
            assert_eq!(settings.llm.chat_format, ChatFormat::ChatMl);
            Ok(())
        });
    }

    #[test]
    fn env_specific_file_is_layered_over_base() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[retrieval]\ntop_k = 4\n")?;
            jail.create_file("config.test.toml", "[retrieval]\ntop_k = 2\n")?;
            jail.set_env("RUST_ENV", "test");

            let settings = Config::load().expect("load").settings().expect("settings");
            assert_eq!(settings.retrieval.top_k, 2);
            Ok(())
        });
    }

    #[test]
    fn overlap_not_smaller_than_chunk_size_is_rejected() {
        let mut settings = Settings::default();
        settings.ingest.chunk_overlap = settings.ingest.chunk_size;
        let err = settings.validate().expect_err("must reject");
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::InvalidConfig(_))));
    }

    #[test]
    fn template_without_question_placeholder_is_rejected() {
        let mut settings = Settings::default();
        settings.prompt.rag_template = "Context: {context}".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn missing_explicit_config_file_is_reported() {
        Jail::expect_with(|_jail| {
            let err = Config::load_from(Some(Path::new("nope.toml"))).err().expect("must fail");
            assert!(err.to_string().contains("nope.toml"));
            Ok(())
        });
    }

    #[test]
    fn zero_embedding_length_is_rejected() {
        let mut settings = Settings::default();
        settings.embed.max_len = 0;
        let err = settings.validate().expect_err("must reject");
        assert!(err.to_string().contains("embed.max_len"), "{err}");
    }

    #[test]
    fn context_window_is_capped() {
        let mut settings = Settings::default();
        settings.llm.n_ctx = MAX_CONTEXT_TOKENS;
        settings.validate().expect("largest window is fine");
        settings.llm.n_ctx = MAX_CONTEXT_TOKENS + 1;
        let err = settings.validate().expect_err("must reject");
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::InvalidConfig(_))));
    }
}
