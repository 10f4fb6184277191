use std::path::{Component, Path, PathBuf};

use tokio::io::AsyncWriteExt;

use super::NodeContext;

pub(super) async fn run_read(ctx: &mut NodeContext<'_>) -> Result<String, String> {
    let path = resolve(ctx).await?;
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| format!("Cannot read `{}`: {e}", display_path(ctx)))?;
    ctx.emit_output(&content);
    Ok(content)
}

pub(super) async fn run_write(ctx: &mut NodeContext<'_>) -> Result<String, String> {
    let path = resolve(ctx).await?;
    let content = ctx
        .node
        .config_str("content")
        .unwrap_or_else(|| ctx.input.to_string());
    let append = ctx
        .node
        .config
        .get("append")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("Cannot create directory for `{}`: {e}", display_path(ctx)))?;
    }
    let written = if append {
        append_to(&path, &content).await
    } else {
        tokio::fs::write(&path, content.as_bytes()).await
    };
    written.map_err(|e| format!("Cannot write `{}`: {e}", display_path(ctx)))?;

    ctx.emit_output(&content);
    Ok(content)
}

async fn append_to(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(content.as_bytes()).await
}

fn display_path(ctx: &NodeContext<'_>) -> String {
    ctx.node.config_str("path").unwrap_or_default()
}

async fn resolve(ctx: &NodeContext<'_>) -> Result<PathBuf, String> {
    let root = ctx
        .env
        .settings
        .files_root
        .as_deref()
        .ok_or_else(|| "File nodes are disabled: FILES_ROOT is not configured".to_string())?;
    let relative = ctx
        .node
        .config_str("path")
        .ok_or_else(|| "File path is required".to_string())?;
    let path = confine(root, &relative)?;
    ensure_within(root, &path)
        .await
        .map_err(|e| format!("Cannot resolve `{relative}`: {e}"))?;
    Ok(path)
}

/// Follows symlinks on the deepest existing part of `path` and checks that it
/// still lies under `root`.
async fn ensure_within(root: &Path, path: &Path) -> std::io::Result<()> {
    let root = tokio::fs::canonicalize(root).await?;
    for existing in path.ancestors() {
        match tokio::fs::canonicalize(existing).await {
            Ok(real) if real.starts_with(&root) => return Ok(()),
            Ok(_) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "path leaves the files root",
                ))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "files root does not exist",
    ))
}

/// Joins `relative` onto `root`, refusing anything that could escape it.
pub(crate) fn confine(root: &Path, relative: &str) -> Result<PathBuf, String> {
    let candidate = Path::new(relative);
    let mut out = root.to_path_buf();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(format!("Path `{relative}` may not contain `..`")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!("Path `{relative}` must be relative"))
            }
        }
    }
    if out == root {
        return Err("File path is required".to_string());
    }
    Ok(out)
}
