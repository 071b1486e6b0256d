//! One managed destination file and its render/compare/sync cycle.

use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use minijinja::{context, Environment};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::Instrument;

use super::command::run_shell;
use super::config::ResourceConfig;
use super::error::{ResourceError, Result};
use super::fileinfo::{apply_attributes, replace_file, same_config};
use super::funcs::build_environment;
use crate::backends::StoreClient;
use crate::store::{keypath, KvStore};

/// Mode used when neither the resource nor an existing destination has one.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Moves a staged file over its destination.
pub type RenameFn = fn(&Path, &Path) -> io::Result<()>;

fn rename(from: &Path, to: &Path) -> io::Result<()> {
    std::fs::rename(from, to)
}

pub struct TemplateResource {
    config: ResourceConfig,
    client: Arc<dyn StoreClient>,
    store: KvStore,
    env: Environment<'static>,
    noop: bool,
    rename: RenameFn,
    last_index: AtomicU64,
    /// Held for a whole cycle so renders of this resource never overlap.
    cycle_lock: Mutex<()>,
}

impl TemplateResource {
    pub fn new(config: ResourceConfig, client: Arc<dyn StoreClient>, noop: bool) -> Self {
        let store = KvStore::new();
        let env = build_environment(&store);
        Self {
            config,
            client,
            store,
            env,
            noop,
            rename,
            last_index: AtomicU64::new(0),
            cycle_lock: Mutex::new(()),
        }
    }

    /// Replaces the function used to move the staged file into place.
    pub fn with_rename(mut self, rename: RenameFn) -> Self {
        self.rename = rename;
        self
    }

    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<dyn StoreClient> {
        &self.client
    }

    /// Values fetched by the most recent cycle, with the prefix stripped.
    pub fn store(&self) -> &KvStore {
        &self.store
    }

    /// Last watch token seen for this resource; zero before the first watch.
    pub fn last_index(&self) -> u64 {
        self.last_index.load(Ordering::Acquire)
    }

    pub fn set_last_index(&self, index: u64) {
        self.last_index.store(index, Ordering::Release);
    }

    /// Runs one full cycle: fetch, render, stage, compare, and when the
    /// destination differs, check, replace and reload.
    ///
    /// Concurrent calls on the same resource wait for each other.
    pub async fn process(&self) -> Result<()> {
        let span = tracing::info_span!("resource.process", dest = %self.config.dest.display());
        async {
            let _guard = self.cycle_lock.lock().await;

            let mode = self.file_mode().await?;
            self.set_vars().await?;
            let staged = self.create_stage_file(mode).await?;
            self.sync(staged, mode).await
        }
        .instrument(span)
        .await
    }

    /// Configured mode, else the destination's current mode, else the default.
    async fn file_mode(&self) -> Result<u32> {
        if let Some(mode) = self.config.mode {
            return Ok(mode);
        }

        match tokio::fs::metadata(&self.config.dest).await {
            Ok(metadata) => Ok(metadata.permissions().mode() & 0o7777),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DEFAULT_FILE_MODE),
            Err(e) => Err(ResourceError::io(
                format!("Failed to stat '{}'", self.config.dest.display()),
                e,
            )),
        }
    }

    /// Fetches the resource's keys and refills the store. The store is only
    /// touched once the fetch succeeded.
    async fn set_vars(&self) -> Result<()> {
        let keys = self.config.prefixed_keys();
        log::debug!("Retrieving keys from store: {:?}", keys);

        let values = self.client.get_values(&keys).await?;

        self.store.purge();
        for (key, value) in values {
            self.store.set(strip_prefix(&key, &self.config.prefix), value);
        }
        log::debug!("Loaded {} keys", self.store.len());
        Ok(())
    }

    /// Renders the template into a hidden file next to the destination.
    async fn create_stage_file(&self, mode: u32) -> Result<NamedTempFile> {
        let src = &self.config.src;

        let is_file = tokio::fs::metadata(src)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(ResourceError::MissingTemplate(src.clone()));
        }

        log::debug!("Compiling source template {}", src.display());
        let source = tokio::fs::read_to_string(src)
            .await
            .map_err(|e| ResourceError::io(format!("Failed to read '{}'", src.display()), e))?;
        let rendered = self.render(&source)?;

        let dest = self.config.dest.clone();
        let (uid, gid) = (self.config.uid, self.config.gid);
        blocking(move || stage_file(&dest, &rendered, mode, uid, gid))
            .await
            .map_err(|e| {
                ResourceError::io(format!("Failed to stage '{}'", self.config.dest.display()), e)
            })
    }

    fn render(&self, source: &str) -> Result<String> {
        let _step = tracing::info_span!("resource.render").entered();
        self.env
            .render_str(source, ())
            .map_err(|e| ResourceError::Render {
                path: self.config.src.clone(),
                source: e,
            })
    }

    async fn sync(&self, staged: NamedTempFile, mode: u32) -> Result<()> {
        let result = self.sync_staged(staged.path(), mode).await;

        if self.config.keep_stage_file {
            let path = staged.into_temp_path();
            if path.exists() {
                log::info!("Keeping staged file: {}", path.display());
                if let Err(e) = path.keep() {
                    log::warn!("Failed to keep staged file: {}", e);
                }
            }
        }

        result
    }

    async fn sync_staged(&self, staged: &Path, mode: u32) -> Result<()> {
        let dest = &self.config.dest;

        log::debug!("Comparing candidate config to {}", dest.display());
        let (candidate, target) = (staged.to_path_buf(), dest.clone());
        let in_sync = blocking(move || same_config(&candidate, &target))
            .await
            .map_err(|e| ResourceError::io(format!("Failed to compare '{}'", dest.display()), e))?;

        if in_sync {
            log::debug!("Target config {} in sync", dest.display());
            return Ok(());
        }

        if self.noop {
            log::warn!("Noop mode enabled. {} will not be modified", dest.display());
            return Ok(());
        }

        log::info!("Target config {} out of sync", dest.display());

        if let Some(check_cmd) = &self.config.check_cmd {
            self.check(check_cmd, staged).await?;
        }

        log::debug!("Overwriting target config {}", dest.display());
        let (from, to) = (staged.to_path_buf(), dest.clone());
        let (uid, gid, rename) = (self.config.uid, self.config.gid, self.rename);
        blocking(move || replace_file(&from, &to, mode, uid, gid, rename))
            .await
            .map_err(|e| ResourceError::Apply {
                path: dest.clone(),
                source: e,
            })?;

        if let Some(reload_cmd) = &self.config.reload_cmd {
            self.reload(reload_cmd).await?;
        }

        log::info!("Target config {} has been updated", dest.display());
        Ok(())
    }

    async fn check(&self, check_cmd: &str, staged: &Path) -> Result<()> {
        let command = self
            .env
            .render_str(check_cmd, context! { src => staged.display().to_string() })
            .map_err(|e| ResourceError::Render {
                path: PathBuf::from("check_cmd"),
                source: e,
            })?;

        let result = run_shell(&command)
            .await
            .map_err(|e| ResourceError::io(format!("Failed to run '{}'", command), e))?;

        if !result.success {
            return Err(ResourceError::CheckFailed {
                command,
                status: result.status,
                output: result.output,
            });
        }
        Ok(())
    }

    async fn reload(&self, reload_cmd: &str) -> Result<()> {
        let result = run_shell(reload_cmd)
            .await
            .map_err(|e| ResourceError::io(format!("Failed to run '{}'", reload_cmd), e))?;

        if !result.success {
            return Err(ResourceError::ReloadFailed {
                command: reload_cmd.to_string(),
                status: result.status,
                output: result.output,
            });
        }
        Ok(())
    }
}

/// Runs filesystem work on the blocking pool so slow storage does not stall
/// the async workers.
async fn blocking<T, F>(work: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

/// Writes `content` to a hidden file next to `dest` and applies the wanted
/// attributes to it. Attribute failures are only logged.
fn stage_file(
    dest: &Path,
    content: &str,
    mode: u32,
    uid: u32,
    gid: u32,
) -> io::Result<NamedTempFile> {
    let dest_dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut staged = tempfile::Builder::new()
        .prefix(&format!(".{}", file_name))
        .tempfile_in(dest_dir)?;
    staged.write_all(content.as_bytes())?;
    staged.as_file().sync_all()?;

    if let Err(e) = apply_attributes(staged.path(), mode, uid, gid) {
        log::warn!(
            "Could not set owner/mode on staged file {}: {}",
            staged.path().display(),
            e
        );
    }

    Ok(staged)
}

/// Maps a backend key into the resource's own key space. Only whole
/// segments of `prefix` are removed.
fn strip_prefix(key: &str, prefix: &str) -> String {
    let trimmed_prefix = prefix.trim_end_matches('/');
    let relative = match key.strip_prefix(trimmed_prefix) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => key,
    };
    keypath::join(&["/", relative])
}
