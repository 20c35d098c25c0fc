use std::path::Path;

use anyhow::Context;
use saga_agent::AnthropicClient;
use saga_core::config::{api_key_from, SagaConfig};
use saga_core::Repository;
use saga_git::GitCli;
use saga_store::{ReportStore, SagaPaths, SqliteStore};

/// Everything a command needs for the repository containing `cwd`.
pub struct Workspace {
    pub paths: SagaPaths,
    pub config: SagaConfig,
    pub store: SqliteStore,
    pub repo: Repository,
    pub vcs: GitCli,
}

impl Workspace {
    pub fn open(cwd: &Path) -> anyhow::Result<Self> {
        let root = SagaPaths::find_root(cwd)
            .with_context(|| format!("{} is not inside a git repository", cwd.display()))?;
        let paths = SagaPaths::discover(&root);
        let config = SagaConfig::load_with_env(&paths.config_json)?;
        paths.ensure_layout()?;
        let store = SqliteStore::open_or_create(&paths.db_file)?;
        let name = config
            .repository
            .name
            .clone()
            .unwrap_or_else(|| paths.default_name());
        let repo = store.ensure_repository(
            &name,
            &root.to_string_lossy(),
            config.repository.description.as_deref(),
            &config.repository.main_branch,
        )?;
        let vcs = GitCli::new(&root).with_remote(config.repository.remote.as_str());
        tracing::debug!(root = %root.display(), repo = %repo.name, "workspace opened");
        Ok(Self {
            paths,
            config,
            store,
            repo,
            vcs,
        })
    }

    /// Open the workspace with a model backend. The credential is checked
    /// before `.saga/` or the database is touched.
    pub fn open_with_model(cwd: &Path) -> anyhow::Result<(Self, AnthropicClient)> {
        Self::open_with_credential(cwd, |k| std::env::var(k).ok())
    }

    fn open_with_credential(
        cwd: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<(Self, AnthropicClient)> {
        let key = api_key_from(lookup)?;
        let ws = Self::open(cwd)?;
        let generator = AnthropicClient::new(&ws.config.model, key)?;
        Ok((ws, generator))
    }
}
