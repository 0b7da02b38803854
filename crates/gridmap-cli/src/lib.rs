//! Library half of the `gridmap` binary: argument types and output helpers.

pub mod cli;

use std::fmt::Write;

use gridmap_core::geo::TreeNode;
use gridmap_core::ConnectionWarnings;
use gridmap_session::{GridmapConfig, ProgressUpdate};

/// Network to work on: the `--net` flag, else the configured default.
pub fn resolve_network(net: Option<&str>, config: &GridmapConfig) -> Option<String> {
    net.map(str::to_string)
        .or_else(|| config.session.default_network_id.clone())
        .filter(|id| !id.trim().is_empty())
}

/// Render tree nodes as indented text, two spaces per level.
pub fn render_tree(nodes: &[TreeNode]) -> String {
    let mut out = String::new();
    render_level(&mut out, nodes, 0);
    out
}

fn render_level(out: &mut String, nodes: &[TreeNode], depth: usize) {
    for node in nodes {
        let _ = writeln!(out, "{:indent$}{}", "", node.title, indent = depth * 2);
        if let Some(children) = &node.children {
            render_level(out, children, depth + 1);
        }
    }
}

/// One line per warning, prefixed with the request id.
pub fn render_warnings<'a>(
    warnings: impl IntoIterator<Item = (&'a str, &'a ConnectionWarnings)>,
) -> String {
    let mut out = String::new();
    for (id, warning) in warnings {
        for message in warning.messages() {
            let _ = writeln!(out, "{id}: {message}");
        }
    }
    out
}

/// Status line for a progress frame.
pub fn render_progress(name: &str, update: &ProgressUpdate) -> String {
    let mut line = format!("{name}: {}", update.state);
    if let Some(progress) = update.progress {
        let _ = write!(line, " {progress}%");
    }
    if let Some(powerflows) = update.powerflows {
        let _ = write!(line, " ({powerflows} power flows)");
    }
    if let Some(at) = update.updated_at() {
        let _ = write!(line, " at {}", at.format("%H:%M:%S"));
    }
    line
}
