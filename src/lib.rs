//! # Repository Access Library
//!
//! Provisions per-repository cloud access for a fleet of source repositories
//! and publishes the resulting CI credentials into per-repository secret
//! mounts. It powers the `repo-access` command-line tool.
//!
//! ## Quick Example
//!
//! ```
//! use std::sync::Arc;
//! use repo_access::backend::Backends;
//! use repo_access::config::Settings;
//! use repo_access::context::RunContext;
//! use repo_access::phases::orchestrator::execute_run;
//! use repo_access::plan::PlanBackend;
//! use repo_access::registry::{parse_declaration, Registry};
//!
//! let settings = Settings::parse(r#"
//! repositories:
//!   owner: example
//! google:
//!   projects: [proj-a]
//! "#).unwrap();
//! let svc = parse_declaration(r#"
//! name: svc-x
//! accessPermissions:
//!   google:
//!     project: proj-a
//! "#, "svc-x.yaml").unwrap();
//! let registry = Registry::new(vec![svc]).unwrap();
//!
//! let backend = Arc::new(PlanBackend::new());
//! let report = execute_run(&RunContext::new(settings), &registry, &Backends::uniform(backend)).unwrap();
//! assert_eq!(report.outputs.google.configured["proj-a"], vec!["svc-x"]);
//! ```
//!
//! ## Core Concepts
//!
//! - **Settings and declarations (`config`, `registry`)**: the allow-listed
//!   accounts and projects per provider, and one declaration per repository
//!   with its access requests.
//! - **Run context (`context`)**: the immutable toggles of one run.
//! - **Providers (`providers`)**: what each cloud needs (allow list, default
//!   permissions, naming rules, secret layout).
//! - **Collaborators (`backend`)**: the traits every side effect goes
//!   through; `plan` implements all of them in memory.
//! - **Phases (`phases`)**: grouping, federation, provisioning and
//!   publication, driven by `phases::orchestrator`.
//! - **Outputs (`exports`)**: allowed and configured targets plus
//!   per-repository integration flags.

pub mod backend;
pub mod config;
pub mod context;
pub mod defaults;
pub mod error;
pub mod exports;
pub mod naming;
pub mod output;
pub mod permissions;
pub mod phases;
pub mod plan;
pub mod providers;
pub mod registry;
pub mod secrets;
pub mod suggestions;
