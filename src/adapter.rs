//! Reconciles target groups by source and persists them in the file based
//! discovery format.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::task::JoinError;

use crate::target::TargetGroup;

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("write {path:?} failed, {err}")]
    Io { path: PathBuf, err: io::Error },
    #[error("encode target groups failed, {0}")]
    Encode(#[from] serde_json::Error),
    #[error("write task failed, {0}")]
    Task(#[from] JoinError),
}

pub struct Adapter {
    output: PathBuf,
    tmp: PathBuf,

    groups: BTreeMap<String, TargetGroup>,
    written: bool,
}

impl Adapter {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        let output = output.into();
        let mut tmp = output.clone().into_os_string();
        tmp.push(".tmp");

        Adapter {
            output,
            tmp: PathBuf::from(tmp),
            groups: BTreeMap::new(),
            written: false,
        }
    }

    /// Live groups ordered by source.
    pub fn groups(&self) -> impl Iterator<Item = &TargetGroup> {
        self.groups.values()
    }

    /// Apply `update` in order, then write the file if anything changed.
    /// Returns whether the file was written.
    pub fn update(&mut self, update: Vec<TargetGroup>) -> Result<bool, WriteError> {
        let mut changed = false;

        for group in update {
            if group.is_tombstone() {
                changed |= self.groups.remove(&group.source).is_some();
                continue;
            }

            match self.groups.get(&group.source) {
                Some(existing) if existing == &group => {}
                _ => {
                    self.groups.insert(group.source.clone(), group);
                    changed = true;
                }
            }
        }

        if !changed && self.written {
            return Ok(false);
        }

        self.write()?;

        Ok(true)
    }

    /// Write an empty list when no output file exists yet, an existing file
    /// is left untouched.
    pub fn ensure_exists(&mut self) -> Result<bool, WriteError> {
        if self.output.exists() {
            return Ok(false);
        }

        self.write()?;

        Ok(true)
    }

    fn write(&mut self) -> Result<(), WriteError> {
        let groups = self.groups.values().collect::<Vec<_>>();
        let data = serde_json::to_vec_pretty(&groups)?;

        self.persist(&data).map_err(|err| WriteError::Io {
            path: self.output.clone(),
            err,
        })?;

        self.written = true;
        debug!(
            message = "target groups written",
            path = ?self.output,
            groups = groups.len()
        );

        Ok(())
    }

    fn persist(&self, data: &[u8]) -> io::Result<()> {
        // flush fully to the tmp file first, the rename keeps readers from
        // ever seeing a partial file
        let mut writer = BufWriter::new(fs::File::create(&self.tmp)?);
        io::Write::write_all(&mut writer, data)?;
        writer.into_inner().map_err(|err| err.into_error())?.sync_all()?;

        fs::rename(&self.tmp, &self.output)
    }

    /// Move the adapter onto the blocking pool for `f` and hand it back,
    /// file writes and fsync must not stall a runtime worker.
    async fn blocking<T, F>(mut self, f: F) -> Result<(Self, T), JoinError>
    where
        F: FnOnce(&mut Adapter) -> T + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(move || {
            let result = f(&mut self);
            (self, result)
        })
        .await
    }

    /// Persist the outcome of the initial poll. `None` means the poll
    /// failed, then only a missing file is created.
    pub async fn initialize(self, initial: Option<Vec<TargetGroup>>) -> Result<Self, WriteError> {
        let (adapter, result) = self
            .blocking(move |adapter| match initial {
                Some(groups) => adapter.update(groups),
                None => adapter.ensure_exists(),
            })
            .await?;
        result?;

        Ok(adapter)
    }

    /// Apply updates until the sender side is closed.
    pub async fn run(self, mut updates: mpsc::Receiver<Vec<TargetGroup>>) {
        let mut adapter = self;

        while let Some(update) = updates.recv().await {
            adapter = match adapter.blocking(move |adapter| adapter.update(update)).await {
                Ok((adapter, result)) => {
                    if let Err(err) = result {
                        error!(message = "error writing target groups", %err);
                    }

                    adapter
                }
                Err(err) => {
                    error!(message = "write task failed", %err);
                    return;
                }
            };
        }

        debug!(message = "adapter stopped");
    }
}
