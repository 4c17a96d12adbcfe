//! # Repository Registry
//!
//! Loads every repository declaration once at startup. Declarations live one
//! per YAML file in a flat directory; files are read in path order so every
//! run sees the repositories in the same order.

use std::collections::BTreeMap;
use std::path::Path;

use log::debug;
use walkdir::WalkDir;

use crate::config::RepositoryDeclaration;
use crate::error::{Error, Result};

/// The declared repositories, unique by name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    repositories: Vec<RepositoryDeclaration>,
}

impl Registry {
    /// Build a registry from in-memory declarations.
    pub fn new(repositories: Vec<RepositoryDeclaration>) -> Result<Self> {
        let sources = repositories
            .iter()
            .map(|repo| (repo.name.clone(), format!("<declaration {}>", repo.name)))
            .collect();
        Self::with_sources(repositories, sources)
    }

    fn with_sources(
        repositories: Vec<RepositoryDeclaration>,
        sources: Vec<(String, String)>,
    ) -> Result<Self> {
        let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
        for (repo, (_, source)) in repositories.iter().zip(sources.iter()) {
            if repo.name.trim().is_empty() {
                return Err(Error::ConfigParse {
                    message: format!("repository declaration without a name in {}", source),
                    hint: Some("Add 'name: <repository>' to the declaration".to_string()),
                });
            }
            if let Some(first) = seen.insert(repo.name.as_str(), source.as_str()) {
                return Err(Error::DuplicateRepository {
                    name: repo.name.clone(),
                    first: first.to_string(),
                    second: source.clone(),
                });
            }
        }
        Ok(Self { repositories })
    }

    /// Load every `*.yaml` / `*.yml` file directly inside `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
            if entry.file_type().is_file() && is_yaml {
                files.push(path.to_path_buf());
            }
        }

        let mut repositories = Vec::with_capacity(files.len());
        let mut sources = Vec::with_capacity(files.len());
        for path in files {
            let content = std::fs::read_to_string(&path)?;
            let source = path.display().to_string();
            let repo = parse_declaration(&content, &source)?;
            debug!("[registry][load] loaded declaration: {}", repo.name);
            sources.push((repo.name.clone(), source));
            repositories.push(repo);
        }
        Self::with_sources(repositories, sources)
    }

    pub fn repositories(&self) -> &[RepositoryDeclaration] {
        &self.repositories
    }

    pub fn get(&self, name: &str) -> Option<&RepositoryDeclaration> {
        self.repositories.iter().find(|repo| repo.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RepositoryDeclaration> {
        self.repositories.iter()
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}

/// Parse one declaration, naming `source` in errors.
pub fn parse_declaration(content: &str, source: &str) -> Result<RepositoryDeclaration> {
    serde_yaml::from_str(content).map_err(|e| Error::ConfigParse {
        message: format!("{}: {}", source, e),
        hint: None,
    })
}
