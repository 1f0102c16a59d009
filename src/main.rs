use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser as ClapParser;
use solvra_intercept::ast::{Literal, NodeKind};
use solvra_intercept::rewrite::quote_str;
use solvra_intercept::{
    InterceptConfig, InterceptionPolicy, Interceptor, IntoPolicy, NodeRewriter, PolicySpec, ScriptError, logging,
};

#[derive(Debug, ClapParser)]
#[command(
    name = "solvra-intercept",
    about = "Loads a SolvraScript module (.svs) with load-time source rewriting.",
    version
)]
struct Args {
    /// Entry module to load.
    entry: PathBuf,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Policy name or code: all (3), no-dependencies (1), top-level-dependencies (2).
    #[arg(long)]
    policy: Option<String>,

    /// Rewrite only these module paths. Overrides --policy.
    #[arg(long = "path", value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Replace string literal FROM with TO in eligible modules.
    #[arg(long = "replace", value_name = "FROM=TO", value_parser = parse_replacement)]
    replacements: Vec<(String, String)>,

    /// Entry directory used to classify dependencies.
    #[arg(long)]
    entry_dir: Option<PathBuf>,
}

fn parse_replacement(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .ok_or_else(|| format!("expected FROM=TO, got '{raw}'"))
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => InterceptConfig::load(path)?,
        None => InterceptConfig::default(),
    };
    logging::init(&config.log_filter);

    if let Some(policy) = &args.policy {
        config.policy = match policy.parse::<i64>() {
            Ok(code) => PolicySpec::Code(code),
            Err(_) => PolicySpec::Name(policy.clone()),
        };
    }
    if !args.paths.is_empty() {
        config.policy = PolicySpec::Paths(args.paths.clone());
    }
    if let Some(dir) = &args.entry_dir {
        config.entry_dir = Some(dir.clone());
    }

    match run(&args, &config) {
        Ok(exports) => {
            println!("{}", serde_json::to_string_pretty(&exports)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            eprintln!("error[{}]: {}", error.code_str(), error.message);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn run(args: &Args, config: &InterceptConfig) -> Result<serde_json::Value, ScriptError> {
    let policy: InterceptionPolicy = config.policy.clone().into_policy()?;
    let loader = Arc::new(config.loader(&args.entry));
    let interceptor = Interceptor::new(Arc::clone(&loader), policy, replacer(args.replacements.clone()))?;
    let module = interceptor.run_scoped(|| loader.require_path(&args.entry))??;
    Ok(module.exports_json())
}

fn replacer(
    replacements: Vec<(String, String)>,
) -> NodeRewriter<impl Fn(&mut solvra_intercept::SyntaxNode<'_>) + Send + Sync> {
    let table: HashMap<String, String> = replacements.into_iter().collect();
    NodeRewriter::new(move |node| {
        if node.kind() != NodeKind::Literal {
            return;
        }
        if let Some(Literal::Str(value)) = node.literal() {
            if let Some(to) = table.get(value) {
                let quoted = quote_str(to);
                node.update(quoted);
            }
        }
    })
}

