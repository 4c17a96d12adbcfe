//! # Tree Command Implementation
//!
//! Shows which repositories each cloud target would be configured for, as
//! provider → target → repositories. Requests outside the allow list are
//! listed under their provider as rejected.
//!
//! Read-only: no collaborator is called.

use anyhow::Result;
use clap::Args;
use ptree::{print_tree, TreeItem};

use repo_access::phases::grouping::{group_repositories, ValidationError};
use repo_access::providers::{cloud_providers, CloudProvider};
use repo_access::registry::Registry;

use super::{load_inputs, InputArgs};

/// Display targets and the repositories configured in them
#[derive(Args, Debug)]
pub struct TreeArgs {
    #[command(flatten)]
    pub inputs: InputArgs,

    /// Only show this provider.
    #[arg(short, long, value_name = "PROVIDER", value_parser = ["aws", "google", "scaleway"])]
    pub provider: Option<String>,
}

/// Execute the `tree` command.
pub fn execute(args: TreeArgs) -> Result<()> {
    let (settings, registry) = load_inputs(&args.inputs)?;

    let providers: Vec<Box<dyn CloudProvider>> = cloud_providers(&settings)
        .into_iter()
        .filter(|p| {
            args.provider
                .as_deref()
                .map_or(true, |wanted| p.provider().as_str() == wanted)
        })
        .collect();

    let root = build_tree(&settings.repositories.owner, &providers, &registry);
    print_tree(&root).map_err(|e| anyhow::anyhow!("Failed to display tree: {}", e))?;
    Ok(())
}

fn build_tree(owner: &str, providers: &[Box<dyn CloudProvider>], registry: &Registry) -> TreeNode {
    let children = providers
        .iter()
        .map(|provider| provider_node(&**provider, registry))
        .collect();
    TreeNode {
        label: owner.to_string(),
        children,
    }
}

fn provider_node(provider: &dyn CloudProvider, registry: &Registry) -> TreeNode {
    let grouping = group_repositories(provider, registry.repositories());
    let mut children: Vec<TreeNode> = provider
        .allow_list()
        .into_iter()
        .map(|target| {
            let repositories = grouping
                .targets
                .get(&target)
                .map(|repos| repos.iter().map(|r| TreeNode::leaf(r)).collect())
                .unwrap_or_default();
            TreeNode {
                label: target,
                children: repositories,
            }
        })
        .collect();

    if !grouping.report.is_empty() {
        children.push(TreeNode {
            label: "rejected".to_string(),
            children: grouping
                .report
                .rejections()
                .iter()
                .map(rejected_leaf)
                .collect(),
        });
    }

    TreeNode {
        label: provider.provider().to_string(),
        children,
    }
}

fn rejected_leaf(rejection: &ValidationError) -> TreeNode {
    let target = match rejection {
        ValidationError::UnknownTarget { target, .. }
        | ValidationError::UnknownLinkedTarget { target, .. } => target,
    };
    TreeNode::leaf(&format!("{} -> {}", rejection.repository(), target))
}

/// Tree node structure for ptree visualization
#[derive(Clone, Debug)]
struct TreeNode {
    label: String,
    children: Vec<TreeNode>,
}

impl TreeNode {
    fn leaf(label: &str) -> Self {
        Self {
            label: label.to_string(),
            children: vec![],
        }
    }
}

impl TreeItem for TreeNode {
    type Child = TreeNode;

    fn write_self<W: std::io::Write>(
        &self,
        f: &mut W,
        _style: &ptree::Style,
    ) -> std::io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> std::borrow::Cow<'_, [Self::Child]> {
        std::borrow::Cow::Borrowed(&self.children)
    }
}
