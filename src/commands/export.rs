use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::ValueEnum;

use uref_graph::DependencyEdge;
use uref_graph::GraphStore;
use uref_orchestrator::Orchestrator;

use crate::config::Configuration;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
    Dot,
}

#[derive(Parser, Debug)]
pub struct ExportCommand {
    /// Output format.
    #[arg(long, value_enum)]
    pub format: ExportFormat,

    /// Output file.
    #[arg(long)]
    pub output: PathBuf,

    /// Include inactive (deleted) nodes and edges.
    #[arg(long, default_value_t = false)]
    pub include_inactive: bool,
}

impl ExportCommand {
    pub fn execute(self, configuration: Configuration, workspace: PathBuf) -> Result<ExitCode, Error> {
        let orchestrator = Orchestrator::open(configuration.to_orchestrator(&workspace))?;
        let store = orchestrator.store();
        let store = store.read().unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut out = Vec::new();
        match self.format {
            ExportFormat::Json => render_json(&store, self.include_inactive, &mut out)?,
            ExportFormat::Csv => render_csv(&store, self.include_inactive, &mut out)?,
            ExportFormat::Dot => render_dot(&store, self.include_inactive, &mut out)?,
        }

        std::fs::write(&self.output, out).map_err(|error| Error::Io(self.output.clone(), error))?;
        println!("graph exported to `{}`", self.output.display());

        Ok(ExitCode::SUCCESS)
    }
}

fn render_json(store: &GraphStore, include_inactive: bool, out: &mut Vec<u8>) -> Result<(), Error> {
    #[derive(serde::Serialize)]
    struct Export<'a> {
        nodes: Vec<&'a uref_graph::AssetNode>,
        edges: Vec<&'a DependencyEdge>,
    }

    let (nodes, edges) = filtered(store, include_inactive);
    let export = Export { nodes, edges };

    serde_json::to_writer_pretty(&mut *out, &export)?;
    out.push(b'\n');

    Ok(())
}

fn render_csv(store: &GraphStore, include_inactive: bool, out: &mut Vec<u8>) -> Result<(), Error> {
    let (_, edges) = filtered(store, include_inactive);

    writeln!(out, "source,target,dep_kind,strength,context_path").expect("writing to a vec cannot fail");
    for edge in edges {
        writeln!(
            out,
            "{},{},{},{},{}",
            edge.source,
            edge.target,
            edge.dep_kind,
            edge.strength,
            csv_escape(edge.context_path.as_deref().unwrap_or_default()),
        )
        .expect("writing to a vec cannot fail");
    }

    Ok(())
}

fn render_dot(store: &GraphStore, include_inactive: bool, out: &mut Vec<u8>) -> Result<(), Error> {
    let (nodes, edges) = filtered(store, include_inactive);

    writeln!(out, "digraph uref {{").expect("writing to a vec cannot fail");
    writeln!(out, "  rankdir=LR;").expect("writing to a vec cannot fail");

    for node in nodes {
        writeln!(out, "  \"{}\" [label=\"{}\"];", node.guid, node.path.replace('"', "\\\"")).expect("writing to a vec cannot fail");
    }

    for edge in edges {
        writeln!(out, "  \"{}\" -> \"{}\" [label=\"{}\"];", edge.source, edge.target, edge.dep_kind)
            .expect("writing to a vec cannot fail");
    }

    writeln!(out, "}}").expect("writing to a vec cannot fail");

    Ok(())
}

fn filtered(store: &GraphStore, include_inactive: bool) -> (Vec<&uref_graph::AssetNode>, Vec<&DependencyEdge>) {
    let mut nodes: Vec<_> = store.nodes().filter(|node| include_inactive || node.active).collect();
    nodes.sort_by_key(|node| node.guid);

    let mut edges: Vec<_> = store.edges().filter(|edge| include_inactive || edge.active).collect();
    edges.sort_by(|a, b| a.key().cmp(&b.key()));

    (nodes, edges)
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
