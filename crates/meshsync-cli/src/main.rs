use anyhow::{anyhow, bail, Context};
use clap::Parser;
use meshsync_layout::{LayoutHost, RendererRegistry};
use meshsync_state::{resolve, Reference};
use meshsync_workspace::{LoopbackHost, RemoteSync, SyncConfig, Workspace};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "meshsync", about = "Render a layout against a loopback-synced workspace")]
struct Args {
    /// Sync settings (JSON, camelCase keys).
    #[arg(long, env = "MESHSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Initial document of the loopback host.
    #[arg(long, env = "MESHSYNC_SNAPSHOT")]
    snapshot: Option<PathBuf>,

    /// Layout document: `{"areas": {"<id>": <descriptor>}}`.
    #[arg(long, env = "MESHSYNC_LAYOUT")]
    layout: Option<PathBuf>,

    /// Part of the host document the client binds to.
    #[arg(long, default_value = "$.form")]
    reference: String,

    #[arg(long, default_value = "main")]
    root_area: String,

    /// UI edit to apply, as `<area>.<prop>=<json>`. Repeatable.
    #[arg(long = "edit")]
    edits: Vec<String>,

    /// How long to wait for the host to acknowledge edits, in milliseconds.
    #[arg(long, default_value_t = 2_000)]
    settle_ms: u64,
}

#[derive(Debug, PartialEq)]
struct Edit {
    area: String,
    prop: String,
    value: Value,
}

impl Edit {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        let (target, value) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("edit `{raw}` is missing `=`"))?;
        let (area, prop) = target
            .rsplit_once('.')
            .ok_or_else(|| anyhow!("edit target `{target}` must be `<area>.<prop>`"))?;
        if area.is_empty() || prop.is_empty() {
            bail!("edit target `{target}` must be `<area>.<prop>`");
        }
        // Bare words are taken as strings.
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
        Ok(Self {
            area: area.to_owned(),
            prop: prop.to_owned(),
            value,
        })
    }
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {} (JSON)", path.display()))
}

fn default_snapshot() -> Value {
    json!({"form": {"name": "Ann", "email": "ann@example.com", "tags": ["new", "vip"]}})
}

fn default_layout() -> Value {
    json!({"areas": {
        "main": {"component": "Form", "kind": "stack", "areas": ["name", "email", "tags"]},
        "name": {"component": "TextBox", "props": {"label": "Name", "value": {"$binding": "$.name"}}},
        "email": {"component": "TextBox", "props": {"label": "Email", "value": {"$binding": "$.email"}}},
        "tags": {
            "component": "TagList",
            "kind": "itemTemplate",
            "data": "$.tags",
            "view": {"component": "Tag", "props": {"text": {"$binding": "$"}}}
        }
    }})
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json(label: &str, value: &Value) -> anyhow::Result<()> {
    println!("{label}:\n{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Wait until the host holds what the client holds at `reference`.
async fn settle(host: &LoopbackHost, data: &Workspace, reference: &Reference, within: Duration) -> bool {
    tokio::time::timeout(within, async {
        loop {
            let remote = resolve(reference, &host.workspace().current()).cloned();
            if remote.unwrap_or(Value::Null) == data.current() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => SyncConfig::from_file(path)?,
        None => SyncConfig::default(),
    };
    let snapshot = match &args.snapshot {
        Some(path) => read_json(path)?,
        None => default_snapshot(),
    };
    let layout = match &args.layout {
        Some(path) => read_json(path)?,
        None => default_layout(),
    };
    let edits = args
        .edits
        .iter()
        .map(|raw| Edit::parse(raw))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let reference = Reference::parse_path(&args.reference)?;

    let host = LoopbackHost::new(snapshot);
    let data = Workspace::new("client", Value::Null);
    let sync = RemoteSync::spawn(data.clone(), reference.clone(), Arc::new(host.clone()), config);
    sync.ready().await?;
    tracing::info!(reference = %reference, "client live");

    let rendered = LayoutHost::new(
        Workspace::new("layout", layout),
        data.clone(),
        RendererRegistry::with_defaults(),
        args.root_area,
    );
    print_json("controls", &rendered.store().workspace().current())?;

    if !edits.is_empty() {
        for edit in &edits {
            let changed = rendered.update_binding(&edit.area, &edit.prop, edit.value.clone())?;
            tracing::info!(area = %edit.area, prop = %edit.prop, changed, "edit applied");
        }
        if !settle(&host, &data, &reference, Duration::from_millis(args.settle_ms)).await {
            tracing::warn!("host did not acknowledge every edit in time");
        }
        print_json("controls", &rendered.store().workspace().current())?;
    }
    print_json("host", &host.workspace().current())?;

    rendered.dispose();
    sync.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_parses_json_and_bare_values() {
        assert_eq!(
            Edit::parse("name.value=\"Bea\"").unwrap(),
            Edit {
                area: "name".into(),
                prop: "value".into(),
                value: json!("Bea")
            }
        );
        assert_eq!(Edit::parse("tags/1.text=gold").unwrap().value, json!("gold"));
        assert_eq!(Edit::parse("tags/1.text=gold").unwrap().area, "tags/1");
        assert_eq!(Edit::parse("count.value=3").unwrap().value, json!(3));
    }

    #[test]
    fn edit_rejects_malformed_targets() {
        assert!(Edit::parse("novalue").is_err());
        assert!(Edit::parse("noprop=1").is_err());
        assert!(Edit::parse(".value=1").is_err());
    }

    #[test]
    fn read_json_reports_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{").unwrap();

        let err = read_json(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn default_layout_renders_against_default_snapshot() {
        let data = Workspace::new("data", default_snapshot()["form"].clone());
        let rendered = LayoutHost::new(
            Workspace::new("layout", default_layout()),
            data,
            RendererRegistry::with_defaults(),
            "main",
        );

        let store = rendered.store();
        assert_eq!(store.get("name").unwrap().props["value"], json!("Ann"));
        assert_eq!(store.get("tags/1").unwrap().props["text"], json!("vip"));
        assert_eq!(
            store.get("main").unwrap().props["areas"],
            json!(["name", "email", "tags"])
        );
    }

    #[test]
    fn args_accept_repeated_edits() {
        let args = Args::parse_from(["meshsync", "--edit", "name.value=Bea", "--edit", "email.value=x"]);
        assert_eq!(args.edits.len(), 2);
        assert_eq!(args.reference, "$.form");
    }
}
