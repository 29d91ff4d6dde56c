//! List command - show registered working copies

use crate::cli::args::{ListArgs, OutputFormat};
use crate::db::{Db, Environment};
use crate::error::MonoResult;

/// Execute the list command
pub async fn execute(args: ListArgs) -> MonoResult<()> {
    let db = Db::open()?;
    let environments = db.list_environments()?;

    if environments.is_empty() {
        println!("No environments registered.");
        return Ok(());
    }

    match args.format {
        OutputFormat::Table => print_table(&environments),
        OutputFormat::Json => print_json(&environments)?,
        OutputFormat::Plain => print_plain(&environments),
    }

    Ok(())
}

fn print_table(environments: &[Environment]) {
    println!("{:<4} {:<50} {}", "ID", "PATH", "ROOT");
    println!("{}", "-".repeat(90));

    for env in environments {
        let root = env
            .root_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<4} {:<50} {}", env.id, env.path.display(), root);
    }

    println!();
    println!("Total: {} environment(s)", environments.len());
}

fn print_json(environments: &[Environment]) -> MonoResult<()> {
    #[derive(serde::Serialize)]
    struct EnvJson {
        id: i64,
        path: String,
        root_path: Option<String>,
    }

    let rows: Vec<EnvJson> = environments
        .iter()
        .map(|e| EnvJson {
            id: e.id,
            path: e.path.display().to_string(),
            root_path: e.root_path.as_ref().map(|p| p.display().to_string()),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

fn print_plain(environments: &[Environment]) {
    for env in environments {
        println!("{}", env.path.display());
    }
}
