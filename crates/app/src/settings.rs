use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use pdf_rag_core::RagConfig;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "pdf-rag.toml";
pub const ENV_PREFIX: &str = "PDF_RAG_";

/// Values given on the command line; they win over file and environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub index_path: Option<PathBuf>,
    pub doc_map_path: Option<PathBuf>,
    pub workers: Option<usize>,
    pub no_parallel: bool,
    pub top_k: Option<usize>,
}

/// Defaults, then the TOML file (if present), then `PDF_RAG_*` variables with `__`
/// separating nested keys.
pub fn load(config_file: &Path, overrides: &Overrides) -> Result<RagConfig, Box<figment::Error>> {
    let mut config: RagConfig = Figment::new()
        .merge(Serialized::defaults(RagConfig::default()))
        .merge(Toml::file(config_file))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(Box::new)?;

    apply(&mut config, overrides);
    Ok(config)
}

fn apply(config: &mut RagConfig, overrides: &Overrides) {
    if let Some(path) = &overrides.index_path {
        config.index_path = path.clone();
    }
    if let Some(path) = &overrides.doc_map_path {
        config.doc_map_path = path.clone();
    }
    if let Some(workers) = overrides.workers {
        config.workers = Some(workers);
    }
    if overrides.no_parallel {
        config.parallel = false;
    }
    if let Some(top_k) = overrides.top_k {
        config.top_k = top_k;
    }
}
