//! Persistence for the onset model and its training corpus.
//!
//! Both files live under the configured data directory:
//! - the corpus is JSON lines, one `{"features":[..],"label":0|1}` per line
//! - the model is a single JSON snapshot, replaced on every training run
//!
//! Every write goes to a uniquely named sibling `.tmp` file which is then
//! renamed over the target, so a failed or cancelled write never leaves a
//! truncated file. Writers through one `ModelStore` are serialised, so
//! concurrent appends never lose samples. A missing file is the normal
//! bootstrap state.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::analysis::onset::{OnsetModel, TrainingReport, TrainingSample};
use crate::cancel::CancelToken;
use crate::config::{StorageConfig, TrainingConfig};
use crate::error::{log_model_error, ModelError};

static NEXT_TMP: AtomicU64 = AtomicU64::new(0);

/// Sibling temp path, unique per process and per write
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(
        "{}.{}.{}.tmp",
        name,
        std::process::id(),
        NEXT_TMP.fetch_add(1, Ordering::Relaxed)
    ))
}

/// Replace `path` with `contents` through a temp file and a rename
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ModelError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);

    let written = (|| -> std::io::Result<()> {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        writer.write_all(contents)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    })();

    if let Err(err) = written.and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }
    Ok(())
}

/// Read the model snapshot at `path`
///
/// # Returns
/// `Ok(None)` when the file does not exist.
pub fn read_model(path: &Path) -> Result<Option<OnsetModel>, ModelError> {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let model: OnsetModel = serde_json::from_str(&json)?;
    model.validate()?;
    Ok(Some(model))
}

/// Cached state of the model file
#[derive(Debug, Clone)]
enum CachedModel {
    /// Not looked at yet
    Unloaded,
    /// Looked at; no usable model
    Absent,
    Loaded(Arc<OnsetModel>),
}

/// Lazily loaded, cached onset model plus the corpus it is trained from
#[derive(Debug)]
pub struct ModelStore {
    model_path: PathBuf,
    corpus_path: PathBuf,
    cache: RwLock<CachedModel>,
    /// Held across every file write
    writes: Mutex<()>,
}

impl ModelStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self::with_paths(config.model_path(), config.corpus_path())
    }

    pub fn with_paths(model_path: impl Into<PathBuf>, corpus_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            corpus_path: corpus_path.into(),
            cache: RwLock::new(CachedModel::Unloaded),
            writes: Mutex::new(()),
        }
    }

    fn lock_writes(&self) -> Result<MutexGuard<'_, ()>, ModelError> {
        self.writes.lock().map_err(|_| ModelError::LockPoisoned)
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn corpus_path(&self) -> &Path {
        &self.corpus_path
    }

    /// The current model, loading it on first use
    ///
    /// A missing file means "untrained" and yields `None`. A corrupt file is
    /// logged and treated the same way so alignment can fall back.
    pub fn model(&self) -> Result<Option<Arc<OnsetModel>>, ModelError> {
        {
            let cache = self.cache.read().map_err(|_| ModelError::LockPoisoned)?;
            match &*cache {
                CachedModel::Loaded(model) => return Ok(Some(Arc::clone(model))),
                CachedModel::Absent => return Ok(None),
                CachedModel::Unloaded => {}
            }
        }

        let mut cache = self.cache.write().map_err(|_| ModelError::LockPoisoned)?;
        // Another thread may have loaded it between the two locks
        if let CachedModel::Loaded(model) = &*cache {
            return Ok(Some(Arc::clone(model)));
        }

        let loaded = match read_model(&self.model_path) {
            Ok(Some(model)) => {
                log::info!(
                    "[ModelStore] Loaded model ({} inputs, {} hidden) from {:?}",
                    model.input_size,
                    model.hidden_size,
                    self.model_path
                );
                Some(Arc::new(model))
            }
            Ok(None) => {
                log::info!("[ModelStore] No model at {:?}, running untrained", self.model_path);
                None
            }
            Err(err) => {
                log_model_error(&err, "load_model");
                None
            }
        };

        *cache = match &loaded {
            Some(model) => CachedModel::Loaded(Arc::clone(model)),
            None => CachedModel::Absent,
        };
        Ok(loaded)
    }

    /// Forget the cached model; the next `model()` call reads the file again
    pub fn invalidate(&self) -> Result<(), ModelError> {
        let mut cache = self.cache.write().map_err(|_| ModelError::LockPoisoned)?;
        *cache = CachedModel::Unloaded;
        Ok(())
    }

    /// Persist `model` and make it the cached model
    pub fn save_model(&self, model: OnsetModel) -> Result<Arc<OnsetModel>, ModelError> {
        let json = serde_json::to_vec_pretty(&model)?;
        let _writing = self.lock_writes()?;
        write_atomic(&self.model_path, &json)?;

        let model = Arc::new(model);
        let mut cache = self.cache.write().map_err(|_| ModelError::LockPoisoned)?;
        *cache = CachedModel::Loaded(Arc::clone(&model));
        Ok(model)
    }

    pub fn add_sample(&self, sample: &TrainingSample) -> Result<usize, ModelError> {
        self.add_samples(std::slice::from_ref(sample))
    }

    /// Append samples to the corpus
    ///
    /// The corpus file is rewritten whole through `write_atomic` while the
    /// store's write lock is held.
    ///
    /// # Returns
    /// Number of samples appended.
    pub fn add_samples(&self, samples: &[TrainingSample]) -> Result<usize, ModelError> {
        if samples.is_empty() {
            return Ok(0);
        }

        let _writing = self.lock_writes()?;
        let mut contents = match fs::read(&self.corpus_path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        if contents.last().is_some_and(|&b| b != b'\n') {
            contents.push(b'\n');
        }
        for sample in samples {
            serde_json::to_writer(&mut contents, sample)?;
            contents.push(b'\n');
        }

        write_atomic(&self.corpus_path, &contents)?;
        log::debug!(
            "[ModelStore] Appended {} samples to {:?}",
            samples.len(),
            self.corpus_path
        );
        Ok(samples.len())
    }

    /// Every well-formed sample in the corpus
    ///
    /// Blank and malformed lines are skipped and counted in a warning. A
    /// missing corpus is empty.
    pub fn load_corpus(&self) -> Result<Vec<TrainingSample>, ModelError> {
        let text = match fs::read_to_string(&self.corpus_path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut skipped = 0usize;
        let samples: Vec<TrainingSample> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(sample) => Some(sample),
                Err(_) => {
                    skipped += 1;
                    None
                }
            })
            .collect();

        if skipped > 0 {
            log::warn!(
                "[ModelStore] Skipped {} malformed corpus lines in {:?}",
                skipped,
                self.corpus_path
            );
        }
        Ok(samples)
    }

    /// Train on the whole corpus and replace the persisted model
    ///
    /// Nothing is written unless training completes.
    pub fn train_from_corpus(
        &self,
        params: &TrainingConfig,
        cancel: &CancelToken,
    ) -> Result<TrainingReport, ModelError> {
        let samples = self.load_corpus()?;
        let (model, report) = OnsetModel::train(&samples, params, cancel).map_err(|err| {
            log_model_error(&err, "train_from_corpus");
            err
        })?;
        if cancel.is_cancelled() {
            return Err(ModelError::Cancelled);
        }

        self.save_model(model)?;
        log::info!(
            "[ModelStore] Trained on {} samples (loss {:.4}, accuracy {:.3}), saved to {:?}",
            report.samples,
            report.final_loss,
            report.accuracy,
            self.model_path
        );
        Ok(report)
    }
}
