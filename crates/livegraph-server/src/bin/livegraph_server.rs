//! `livegraph-server`: serve module trees to a remote editor.
//!
//! Usage:
//!   livegraph-server [--config <file>] [--host <host>] [--port <port>] [--module <file>]...
//!
//! Each module file is a JSON object `{"id", "name", "value", "untracked"?}`
//! whose `value` is a value expression producing the module root.

use std::path::{Path, PathBuf};

use livegraph_server::{init_tracing, CliOverrides, ModuleSpec, ServerConfig, Session};
use tracing::info;

const USAGE: &str =
    "Usage: livegraph-server [--config <file>] [--host <host>] [--port <port>] [--module <file>]...";

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn parse_args(args: &[String]) -> Result<CliOverrides, String> {
    let mut cli = CliOverrides::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = || iter.next().cloned().ok_or_else(|| format!("{arg} expects a value"));
        match arg.as_str() {
            "--config" => cli.config = Some(PathBuf::from(value()?)),
            "--host" => cli.host = Some(value()?),
            "--port" => {
                let port = value()?;
                cli.port = Some(port.parse().map_err(|_| format!("not a port number: {port}"))?);
            }
            "--module" => cli.modules.push(PathBuf::from(value()?)),
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => return Err(format!("Unknown argument: {other}\n{USAGE}")),
        }
    }
    Ok(cli)
}

fn read_module(path: &Path) -> Result<ModuleSpec, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let mut spec: ModuleSpec = serde_json::from_str(&text).map_err(|e| format!("{}: {e}", path.display()))?;
    if spec.source.is_none() {
        spec.source = Some(path.display().to_string());
    }
    Ok(spec)
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_args(&args).unwrap_or_else(|e| fail(e));
    let config = ServerConfig::load(&cli).unwrap_or_else(|e| fail(e));
    init_tracing(config.log.filter.as_deref());

    let project = &config.project;
    let mut session = Session::new(&project.id, &project.name, &project.path)
        .with_max_frame_bytes(config.session.max_frame_bytes);

    let specs: Vec<ModuleSpec> = project
        .modules
        .iter()
        .map(|p| read_module(p))
        .collect::<Result<_, _>>()
        .unwrap_or_else(|e| fail(e));
    if let Err(e) = session.load_modules(&specs) {
        fail(e);
    }
    info!(project = %project.id, modules = specs.len(), address = %config.connection.address(), "starting");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| fail(e));
    if let Err(e) = runtime.block_on(livegraph_server::transport::run(&config, &mut session)) {
        fail(e);
    }
}
