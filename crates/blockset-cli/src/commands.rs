use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context};
use blockset_sdk::{ContentHash, ObjectStoreManager, RecordId};
use colored::Colorize;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(cli, &mut out).await
}

async fn execute(cli: Cli, out: &mut dyn Write) -> anyhow::Result<()> {
    let root = cli.root.as_path();
    let format = cli.format;
    match cli.command {
        Command::Init => cmd_init(root, format, out).await,
        Command::Ls(args) => cmd_ls(&open(root).await?, args, format, out).await,
        Command::Log(args) => cmd_log(&open(root).await?, args, format, out).await,
        Command::Cat(args) => cmd_cat(&open(root).await?, args, out).await,
        Command::Put(args) => cmd_put(&open(root).await?, args, format, out).await,
        Command::Path(args) => cmd_path(&open(root).await?, args, format, out).await,
        Command::Gc => cmd_gc(&open(root).await?, format, out).await,
        Command::Fsck => cmd_fsck(&open(root).await?, format, out).await,
    }
}

async fn open(root: &Path) -> anyhow::Result<ObjectStoreManager> {
    if !root.join("objects").is_dir() {
        bail!("{} is not a BlockSet store (run `blockset init`)", root.display());
    }
    debug!(root = %root.display(), "opening store");
    ObjectStoreManager::open_at(root.to_path_buf())
        .await
        .with_context(|| format!("opening store at {}", root.display()))
}

fn parse_hash(s: &str) -> anyhow::Result<ContentHash> {
    s.parse().with_context(|| format!("invalid object hash {s:?}"))
}

fn print_json(out: &mut dyn Write, value: &impl Serialize) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

async fn cmd_init(root: &Path, format: OutputFormat, out: &mut dyn Write) -> anyhow::Result<()> {
    let manager = ObjectStoreManager::init(root.to_path_buf())
        .await
        .with_context(|| format!("initializing store at {}", root.display()))?;
    match format {
        OutputFormat::Text => writeln!(
            out,
            "{} Initialized BlockSet store in {}",
            "✓".green().bold(),
            root.display().to_string().bold()
        )?,
        OutputFormat::Json => print_json(out, &json!({ "root": root, "config": manager.config() }))?,
    }
    Ok(())
}

async fn cmd_ls(
    manager: &ObjectStoreManager,
    args: LsArgs,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let entries = manager.records(args.kind.as_deref()).await?;
    if format == OutputFormat::Json {
        return print_json(out, &entries);
    }
    if entries.is_empty() {
        writeln!(out, "No records.")?;
    }
    for entry in &entries {
        writeln!(
            out,
            "{}  {}  {}",
            entry.record_id.to_string().yellow(),
            format!("{:<12}", entry.kind).cyan(),
            entry.head.commit_id.short_hex().dimmed()
        )?;
    }
    Ok(())
}

async fn cmd_log(
    manager: &ObjectStoreManager,
    args: LogArgs,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let record_id: RecordId = args
        .record_id
        .parse()
        .with_context(|| format!("invalid record id {:?}", args.record_id))?;
    let mut history = manager.history(&record_id).await?;
    if let Some(limit) = args.limit {
        history.truncate(limit);
    }

    if format == OutputFormat::Json {
        let commits: Vec<_> = history
            .iter()
            .map(|c| json!({ "id": c.id, "parents": c.parents, "payload": c.payload }))
            .collect();
        return print_json(out, &commits);
    }
    for commit in &history {
        writeln!(out, "{} {}", "commit".yellow(), commit.id.to_string().yellow())?;
        if commit.is_merge() {
            let parents: Vec<String> = commit.parents.iter().map(|p| p.short_hex()).collect();
            writeln!(out, "Merge:   {}", parents.join(" "))?;
        }
        match &commit.payload {
            Some(payload) => writeln!(out, "Payload: {payload}")?,
            None => writeln!(out, "Payload: {}", "(none)".dimmed())?,
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Raw bytes regardless of `--format`.
async fn cmd_cat(manager: &ObjectStoreManager, args: HashArgs, out: &mut dyn Write) -> anyhow::Result<()> {
    let id = parse_hash(&args.hash)?;
    let bytes = manager
        .retrieve_attachment(&id)
        .await?
        .with_context(|| format!("object {id} not found"))?;
    out.write_all(&bytes)?;
    Ok(())
}

async fn cmd_put(
    manager: &ObjectStoreManager,
    args: PutArgs,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let data = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    let id = manager.store_attachment(&data).await?;
    match format {
        OutputFormat::Text => writeln!(out, "{id}")?,
        OutputFormat::Json => print_json(out, &json!({ "id": id, "size": data.len() }))?,
    }
    Ok(())
}

async fn cmd_path(
    manager: &ObjectStoreManager,
    args: HashArgs,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let id = parse_hash(&args.hash)?;
    let path = manager.path_of(&id).await?;
    match format {
        OutputFormat::Text => writeln!(out, "{}", path.display())?,
        OutputFormat::Json => print_json(out, &json!({ "id": id, "path": path }))?,
    }
    Ok(())
}

async fn cmd_gc(manager: &ObjectStoreManager, format: OutputFormat, out: &mut dyn Write) -> anyhow::Result<()> {
    let report = manager.garbage_collect().await?;
    if format == OutputFormat::Json {
        return print_json(out, &report);
    }
    writeln!(
        out,
        "{} GC: {} objects removed, {} bytes freed.",
        "✓".green(),
        report.swept.to_string().bold(),
        report.bytes_freed
    )?;
    writeln!(out, "  Live records: {}", report.live_records)?;
    writeln!(out, "  Live objects: {}", report.marked)?;
    if report.retained_young > 0 {
        writeln!(
            out,
            "  Kept {} unreferenced objects inside the grace window",
            report.retained_young.to_string().yellow()
        )?;
    }
    Ok(())
}

async fn cmd_fsck(manager: &ObjectStoreManager, format: OutputFormat, out: &mut dyn Write) -> anyhow::Result<()> {
    let report = manager.verify().await?;
    match format {
        OutputFormat::Json => print_json(out, &report)?,
        OutputFormat::Text if report.is_clean() => writeln!(
            out,
            "{} No issues. {} objects checked.",
            "✓".green().bold(),
            report.objects_checked
        )?,
        OutputFormat::Text => {
            for id in &report.corrupt {
                writeln!(out, "{} corrupt object {} (quarantined)", "✗".red().bold(), id)?;
            }
            for head in &report.dangling {
                let missing: Vec<String> = head.missing.iter().map(|m| m.short_hex()).collect();
                writeln!(
                    out,
                    "{} record {} ({}) is missing {}",
                    "✗".red().bold(),
                    head.record_id.to_string().yellow(),
                    head.kind,
                    missing.join(", ")
                )?;
            }
        }
    }
    if !report.is_clean() {
        bail!(
            "{} corrupt objects, {} records with incomplete history",
            report.corrupt.len(),
            report.dangling.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use blockset_sdk::{Record, RecordHandle, StoreConfig};
    use clap::Parser;
    use serde::Deserialize;
    use serde_json::Value;

    use super::*;

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct Note {
        body: String,
    }

    impl Record for Note {
        const KIND: &'static str = "note";
    }

    async fn run(root: &Path, args: &[&str]) -> anyhow::Result<Vec<u8>> {
        let root = root.to_str().unwrap();
        let mut argv = vec!["blockset", "--root", root];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv)?;
        let mut out = Vec::new();
        execute(cli, &mut out).await?;
        Ok(out)
    }

    async fn run_json(root: &Path, args: &[&str]) -> Value {
        let mut argv = vec!["--format", "json"];
        argv.extend_from_slice(args);
        serde_json::from_slice(&run(root, &argv).await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn commands_need_an_initialized_store() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(dir.path(), &["ls"]).await.unwrap_err();
        assert!(err.to_string().contains("blockset init"));
    }

    #[tokio::test]
    async fn init_writes_config() {
        let dir = tempfile::tempdir().unwrap();
        let value = run_json(dir.path(), &["init"]).await;
        assert_eq!(value["config"]["gc_grace_secs"], 3600);
        assert!(dir.path().join(StoreConfig::FILE_NAME).is_file());
        assert!(dir.path().join("objects").is_dir());
    }

    #[tokio::test]
    async fn put_cat_and_path() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["init"]).await.unwrap();
        let file = dir.path().join("memo.m4a");
        std::fs::write(&file, b"not really audio").unwrap();

        let out = run(dir.path(), &["put", file.to_str().unwrap()]).await.unwrap();
        let hash = String::from_utf8(out).unwrap().trim().to_string();
        assert!(ContentHash::is_hash_like(&hash));

        let bytes = run(dir.path(), &["cat", &hash]).await.unwrap();
        assert_eq!(bytes, b"not really audio");

        let value = run_json(dir.path(), &["path", &hash]).await;
        let path = value["path"].as_str().unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"not really audio");
    }

    #[tokio::test]
    async fn cat_rejects_bad_and_unknown_hashes() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["init"]).await.unwrap();
        assert!(run(dir.path(), &["cat", "xyz"]).await.is_err());
        let unknown = ContentHash::from_digest([7; 32]).to_hex();
        let err = run(dir.path(), &["cat", &unknown]).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn ls_and_log_show_saved_records() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["init"]).await.unwrap();
        let id = {
            let manager = ObjectStoreManager::open_at(dir.path()).await.unwrap();
            let mut handle = RecordHandle::initial(Note { body: "first".into() });
            manager.save(&handle).await.unwrap();
            handle.value_mut().body = "second".into();
            manager.save(&handle).await.unwrap();
            handle.id()
        };

        let entries = run_json(dir.path(), &["ls", "--kind", "note"]).await;
        assert_eq!(entries.as_array().unwrap().len(), 1);
        assert_eq!(entries[0]["record_id"], id.to_string());
        let other_kind = run_json(dir.path(), &["ls", "--kind", "task"]).await;
        assert!(other_kind.as_array().unwrap().is_empty());

        let log = run_json(dir.path(), &["log", &id.to_string()]).await;
        let commits = log.as_array().unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0]["parents"][0], commits[1]["id"]);
        assert!(commits[1]["parents"].as_array().unwrap().is_empty());

        let limited = run_json(dir.path(), &["log", &id.to_string(), "-n", "1"]).await;
        assert_eq!(limited.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn gc_on_fresh_store_removes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["init"]).await.unwrap();
        let report = run_json(dir.path(), &["gc"]).await;
        assert_eq!(report["swept"], 0);
        assert_eq!(report["live_records"], 0);
    }

    #[tokio::test]
    async fn fsck_fails_on_tampered_object() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["init"]).await.unwrap();
        let file = dir.path().join("photo.jpg");
        std::fs::write(&file, b"pixels").unwrap();
        let out = run(dir.path(), &["put", file.to_str().unwrap()]).await.unwrap();
        let hash = String::from_utf8(out).unwrap().trim().to_string();
        assert!(run(dir.path(), &["fsck"]).await.is_ok());

        let id = parse_hash(&hash).unwrap();
        let stored = dir.path().join("objects").join(id.shard()).join(&hash);
        std::fs::write(stored, b"pixel").unwrap();
        let err = run(dir.path(), &["fsck"]).await.unwrap_err();
        assert!(err.to_string().contains("1 corrupt objects"));
    }
}
