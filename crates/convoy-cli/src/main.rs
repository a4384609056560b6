//! Convoy - extensible test/build orchestrator CLI
//!
//! ## Commands
//!
//! - `run`: Run the components of a namespace against a project
//! - `component`: Manage the components registered for a namespace

mod config;
mod factory;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use convoy_core::{ComponentRegistry, ComponentState, Pipeline, PipelineReport};
use tracing::{debug, info, Level};

use crate::factory::{ComponentFactory, FactoryContext};

/// Namespaces with their own component set and registry.
const KNOWN_NAMESPACES: &[&str] = &["e2e", "unit"];

/// Namespace used for anything else.
const GENERIC_NAMESPACE: &str = "generic";

#[derive(Parser)]
#[command(name = "convoy")]
#[command(author = "Convoy Maintainers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Extensible test/build orchestrator", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Component registry directory (default: ~/.convoy/registry)
    #[arg(long, global = true, env = "CONVOY_REGISTRY_DIR")]
    registry_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a namespace (`e2e`, `unit`) or a single component by name
    Run {
        /// Namespace or component identifier
        name: String,

        /// Project directory holding .convoy.yml
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Module keys to leave out (comma separated)
        #[arg(long, value_delimiter = ',')]
        skip_modules: Vec<String>,

        /// Disable a built-in component of the namespace
        #[arg(short = 's', long = "disable")]
        disable: Vec<String>,

        /// Activate an additional component
        #[arg(short = 'c', long = "component")]
        component: Vec<String>,
    },

    /// Manage registered components
    Component {
        #[command(subcommand)]
        action: ComponentAction,
    },
}

#[derive(Subcommand)]
enum ComponentAction {
    /// Register a component, optionally with config files it contributes
    Add {
        namespace: String,
        key: String,

        /// Config file merged over .convoy.yml when the component runs
        #[arg(long = "config")]
        configs: Vec<PathBuf>,
    },

    /// Unregister a component
    Remove { namespace: String, key: String },

    /// List registered components
    List { namespace: String },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    convoy_core::telemetry::init_tracing(cli.json, level);

    let registry_dir = resolve_registry_dir(cli.registry_dir, dirs::home_dir())?;

    match cli.command {
        Commands::Run {
            name,
            path,
            skip_modules,
            disable,
            component,
        } => {
            let report = cmd_run(
                &registry_dir,
                &name,
                &path,
                skip_modules,
                &disable,
                component,
            )
            .await?;
            print_report(&report);
            Ok(())
        }
        Commands::Component { action } => match action {
            ComponentAction::Add {
                namespace,
                key,
                configs,
            } => cmd_component_add(&registry_dir, &namespace, &key, configs).await,
            ComponentAction::Remove { namespace, key } => {
                cmd_component_remove(&registry_dir, &namespace, &key).await
            }
            ComponentAction::List { namespace } => {
                cmd_component_list(&registry_dir, &namespace).await
            }
        },
    }
}

/// `--registry-dir` when given, otherwise `~/.convoy/registry`.
fn resolve_registry_dir(explicit: Option<PathBuf>, home: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    let home = home.context(
        "Could not determine the home directory; pass --registry-dir or set CONVOY_REGISTRY_DIR",
    )?;
    Ok(home.join(".convoy").join("registry"))
}

/// Map a run target to its namespace. Anything that is not a known
/// namespace runs in the generic namespace as an additional component.
fn resolve_namespace(name: &str, additional: &mut Vec<String>) -> String {
    let lower = name.to_lowercase();
    if KNOWN_NAMESPACES.contains(&lower.as_str()) {
        lower
    } else {
        additional.push(name.to_string());
        GENERIC_NAMESPACE.to_string()
    }
}

/// Built-in components of a namespace.
fn namespace_components(namespace: &str) -> &'static [&'static str] {
    match namespace {
        "e2e" => &["emit", "e2e"],
        _ => &["emit"],
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(
    registry_dir: &Path,
    name: &str,
    path: &Path,
    skip_modules: Vec<String>,
    disable: &[String],
    mut additional: Vec<String>,
) -> Result<PipelineReport> {
    let namespace = resolve_namespace(name, &mut additional);

    let mut registry = ComponentRegistry::create(registry_dir, &namespace);
    debug!(file = %registry.registry_file().display(), "initialize components registry");
    registry
        .load()
        .await
        .context("Failed to load component registry")?;
    additional.extend(registry.list_keys());

    let ctx = FactoryContext {
        skip_modules: skip_modules.iter().map(|m| m.trim().to_string()).collect(),
    };
    let components = ComponentFactory::builtin().assemble(
        namespace_components(&namespace),
        disable,
        &additional,
        &ctx,
    );

    let configs = registry.configs();
    if !configs.is_empty() {
        let listed: Vec<String> = configs.iter().map(|c| c.display().to_string()).collect();
        debug!(configs = %listed.join(", "), "loading component configurations");
    }
    let root = config::load_root(path, &configs).await?;

    info!(namespace = %namespace, path = %path.display(), "running");

    let mut pipeline = Pipeline::new();
    for component in components {
        pipeline.add_boxed(component);
    }
    let report = pipeline
        .run(Arc::new(root))
        .await
        .context("Pipeline run failed")?;
    Ok(report)
}

fn print_report(report: &PipelineReport) {
    println!();
    for outcome in &report.outcomes {
        match outcome.state {
            ComponentState::Done => {
                println!("  ✓ {} ({}ms)", outcome.name, outcome.duration_ms)
            }
            state => println!("  - {} ({})", outcome.name, state),
        }
    }
    println!();
    println!(
        "Summary: {} ran, {} skipped, {} assets in {}ms",
        report.ran_count(),
        report.skipped_count(),
        report.metrics.assets_emitted,
        report.duration_ms
    );
}

// ---------------------------------------------------------------------------
// component
// ---------------------------------------------------------------------------

async fn open_registry(registry_dir: &Path, namespace: &str) -> Result<ComponentRegistry> {
    let mut registry = ComponentRegistry::create(registry_dir, namespace);
    registry
        .load()
        .await
        .context("Failed to load component registry")?;
    Ok(registry)
}

async fn cmd_component_add(
    registry_dir: &Path,
    namespace: &str,
    key: &str,
    configs: Vec<PathBuf>,
) -> Result<()> {
    let mut registry = open_registry(registry_dir, namespace).await?;

    let configs = configs
        .into_iter()
        .map(|c| -> Result<PathBuf> {
            if c.is_absolute() {
                Ok(c)
            } else {
                Ok(std::env::current_dir()?.join(c))
            }
        })
        .collect::<Result<Vec<_>>>()?;

    registry.add(&ComponentFactory::canonical(key), configs);
    registry.save().context("Failed to save component registry")?;

    println!("✓ Registered {} in {}", key, registry.namespace());
    Ok(())
}

async fn cmd_component_remove(registry_dir: &Path, namespace: &str, key: &str) -> Result<()> {
    let mut registry = open_registry(registry_dir, namespace).await?;

    if !registry.remove(&ComponentFactory::canonical(key)) {
        anyhow::bail!("Component {} is not registered in {}", key, namespace);
    }
    registry.save().context("Failed to save component registry")?;

    println!("✓ Removed {} from {}", key, registry.namespace());
    Ok(())
}

async fn cmd_component_list(registry_dir: &Path, namespace: &str) -> Result<()> {
    let registry = open_registry(registry_dir, namespace).await?;

    if registry.entries().is_empty() {
        println!("No components registered in {}", registry.namespace());
        return Ok(());
    }

    println!("Components in {}:", registry.namespace());
    for entry in registry.entries() {
        println!("  {}", entry.key);
        for config in &entry.configs {
            println!("    config: {}", config.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "convoy",
            "run",
            "e2e",
            "web",
            "--skip-modules",
            "docs,api",
            "-s",
            "emit",
            "-c",
            "convoy-cache",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                name,
                path,
                skip_modules,
                disable,
                component,
            } => {
                assert_eq!(name, "e2e");
                assert_eq!(path, PathBuf::from("web"));
                assert_eq!(skip_modules, vec!["docs", "api"]);
                assert_eq!(disable, vec!["emit"]);
                assert_eq!(component, vec!["convoy-cache"]);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_registry_dir_resolution() {
        let explicit = PathBuf::from("/srv/convoy");
        assert_eq!(
            resolve_registry_dir(Some(explicit.clone()), None).unwrap(),
            explicit
        );
        assert_eq!(
            resolve_registry_dir(None, Some(PathBuf::from("/home/ci"))).unwrap(),
            PathBuf::from("/home/ci/.convoy/registry")
        );

        let err = resolve_registry_dir(None, None).unwrap_err();
        assert!(err.to_string().contains("--registry-dir"));
    }

    #[test]
    fn test_resolve_namespace() {
        let mut additional = Vec::new();
        assert_eq!(resolve_namespace("E2E", &mut additional), "e2e");
        assert_eq!(resolve_namespace("unit", &mut additional), "unit");
        assert!(additional.is_empty());

        assert_eq!(resolve_namespace("convoy-lint", &mut additional), "generic");
        assert_eq!(additional, vec!["convoy-lint"]);
    }

    #[tokio::test]
    async fn test_component_registry_commands() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("lint.yml");

        cmd_component_add(dir.path(), "unit", "convoy-lint", vec![config.clone()])
            .await
            .unwrap();
        let registry = open_registry(dir.path(), "unit").await.unwrap();
        assert_eq!(registry.list_keys(), vec!["lint"]);
        assert_eq!(registry.configs(), vec![config]);

        cmd_component_list(dir.path(), "unit").await.unwrap();
        cmd_component_remove(dir.path(), "unit", "lint").await.unwrap();
        assert!(cmd_component_remove(dir.path(), "unit", "lint").await.is_err());
    }

    #[tokio::test]
    async fn test_run_unit_namespace() {
        let registry = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(project.path().join("web")).unwrap();
        std::fs::write(project.path().join("web/app.js"), "// app").unwrap();
        std::fs::write(
            project.path().join(".convoy.yml"),
            "$:\n  emit:\n    pattern: '*.js'\nweb:\n  root: web\n",
        )
        .unwrap();

        let report = cmd_run(
            registry.path(),
            "unit",
            project.path(),
            Vec::new(),
            &[],
            Vec::new(),
        )
        .await
        .unwrap();
        assert_eq!(report.state_of("emit"), Some(ComponentState::Done));
        assert_eq!(report.ran_count(), 1);
    }

    #[tokio::test]
    async fn test_run_registered_config_is_merged() {
        let registry = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(project.path().join("web")).unwrap();
        std::fs::write(project.path().join("web/login.e2e.js"), "// test").unwrap();
        std::fs::write(
            project.path().join(".convoy.yml"),
            "$:\n  emit:\n    pattern: '*.js'\nweb:\n  root: web\n",
        )
        .unwrap();
        let extra = project.path().join("e2e.yml");
        std::fs::write(&extra, "$:\n  e2e:\n    pattern: '*.e2e.js'\n    command: 'true'\n")
            .unwrap();
        cmd_component_add(registry.path(), "e2e", "e2e", vec![extra])
            .await
            .unwrap();

        let report = cmd_run(
            registry.path(),
            "e2e",
            project.path(),
            Vec::new(),
            &[],
            Vec::new(),
        )
        .await
        .unwrap();
        assert_eq!(report.state_of("e2e"), Some(ComponentState::Done));
        assert_eq!(report.outcomes.len(), 2);
    }
}
