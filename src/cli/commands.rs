//! CLI command implementations
//!
//! Every command opens the file-backed tree under `--data-dir` through its
//! manifest, does one thing and writes one response to the given writer.
//! `load` is the only command that writes to the tree; it rejects a
//! directory that already holds a document. Log lines go to stderr so that
//! stdout carries only the response.

use std::io::{self, BufRead, Write};
use std::path::Path;

use serde_json::json;

use crate::config::EngineConfig;
use crate::container::{Container, FileContainer};
use crate::loader::BulkLoader;
use crate::observability::{Logger, Timer};
use crate::tree::EXTree;

use super::args::{Command, TreeArgs};
use super::errors::{CliError, CliResult};
use super::io::{read_events, write_response};

/// Main CLI entry point
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    Logger::set_stderr_only(true);
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match cmd {
        Command::Load { tree } => load(&tree, io::stdin().lock(), &mut out),
        Command::Check { tree } => check(&tree, &mut out),
        Command::Export { tree, physical } => export(&tree, physical, &mut out),
        Command::Quality { tree } => quality(&tree, &mut out),
        Command::Stats { tree } => stats(&tree, &mut out),
    }
}

/// Loads the configuration named by `--config`, or the defaults
fn load_config(path: Option<&Path>) -> CliResult<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    config.apply_logging()?;
    Ok(config)
}

fn open_tree(args: &TreeArgs) -> CliResult<EXTree<FileContainer>> {
    let config = load_config(args.config.as_deref())?;
    Ok(EXTree::open_dir(&args.data_dir, &config)?)
}

/// Bulk load a document from JSON-lines events
pub fn load<R: BufRead, W: Write>(args: &TreeArgs, input: R, out: &mut W) -> CliResult<()> {
    let mut tree = open_tree(args)?;
    let timer = Timer::new();
    let mut loader = BulkLoader::new(&mut tree)?;
    for event in read_events(input) {
        loader.feed(event?)?;
    }
    let root_id = loader.finish()?;

    tree.save_manifest(&args.data_dir)?;
    tree.close()?;
    write_response(
        out,
        json!({
            "root_id": root_id,
            "node_count": tree.node_count(),
            "records": tree.container().size(),
            "elapsed_ms": timer.elapsed_ms(),
        }),
    )
}

/// Verify a stored tree; exits non-zero when violations are found
pub fn check<W: Write>(args: &TreeArgs, out: &mut W) -> CliResult<()> {
    let tree = open_tree(args)?;
    let report = tree.check_consistency()?;
    let violations = report.violations.len();
    write_response(out, serde_json::to_value(&report)?)?;
    if violations > 0 {
        return Err(CliError::check_failed(violations));
    }
    Ok(())
}

/// Write the document as XML
pub fn export<W: Write>(args: &TreeArgs, physical: bool, out: &mut W) -> CliResult<()> {
    let tree = open_tree(args)?;
    tree.export(out, physical)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

pub fn quality<W: Write>(args: &TreeArgs, out: &mut W) -> CliResult<()> {
    let tree = open_tree(args)?;
    write_response(out, serde_json::to_value(tree.quality()?)?)
}

pub fn stats<W: Write>(args: &TreeArgs, out: &mut W) -> CliResult<()> {
    let tree = open_tree(args)?;
    write_response(
        out,
        json!({
            "root_id": tree.root_id(),
            "node_count": tree.node_count(),
            "records": tree.container().size(),
            "page_file_bytes": tree.container().file_len(),
            "max_object_size": tree.capacity(),
            "split": tree.config().split,
            "metrics": tree.metrics().snapshot(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn args(dir: &Path) -> TreeArgs {
        TreeArgs {
            data_dir: dir.to_path_buf(),
            config: None,
        }
    }

    fn populate(dir: &Path) {
        let mut tree = EXTree::open_dir(dir, &EngineConfig::with_capacity(128)).unwrap();
        tree.insert_markup("/", "doc").unwrap();
        for _ in 0..20 {
            tree.insert_markup("/doc", "item").unwrap();
        }
        tree.save_manifest(dir).unwrap();
        tree.close().unwrap();
    }

    #[test]
    fn test_check_on_stored_tree() {
        let temp_dir = TempDir::new().unwrap();
        populate(temp_dir.path());

        let mut a = args(temp_dir.path());
        let config_path = temp_dir.path().join("extree.json");
        std::fs::write(&config_path, r#"{"max_object_size": 128, "log_level": "error"}"#).unwrap();
        a.config = Some(config_path);

        let mut out = Vec::new();
        check(&a, &mut out).unwrap();
        let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert!(report["data"]["records"].as_u64().unwrap() > 1);
        assert!(report["data"]["violations"].as_array().unwrap().is_empty());

        let mut out = Vec::new();
        quality(&a, &mut out).unwrap();
        let quality: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(quality["data"]["element_nodes"], 21);

        let mut out = Vec::new();
        stats(&a, &mut out).unwrap();
        let stats: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(stats["data"]["node_count"], 21);
    }

    #[test]
    fn test_load_then_export() {
        let temp_dir = TempDir::new().unwrap();
        let a = args(temp_dir.path());
        let input = concat!(
            "{\"event\":\"start\",\"name\":\"doc\",\"attributes\":[[\"lang\",\"en\"]]}\n",
            "{\"event\":\"characters\",\"text\":\"hi\"}\n",
            "{\"event\":\"end\"}\n",
        );

        let mut out = Vec::new();
        load(&a, Cursor::new(input), &mut out).unwrap();
        let response: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(response["status"], "ok");
        assert_eq!(response["data"]["node_count"], 4);

        let mut out = Vec::new();
        export(&a, false, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "<doc lang=\"en\">hi</doc>\n");
    }

    #[test]
    fn test_smaller_capacity_rejected() {
        let temp_dir = TempDir::new().unwrap();
        populate(temp_dir.path());

        let config_path: PathBuf = temp_dir.path().join("small.json");
        std::fs::write(&config_path, r#"{"max_object_size": 64}"#).unwrap();
        let a = TreeArgs {
            data_dir: temp_dir.path().to_path_buf(),
            config: Some(config_path),
        };
        let err = check(&a, &mut Vec::new()).unwrap_err();
        assert_eq!(err.code_str(), "XTREE_CLI_CONFIG_ERROR");
    }
}
