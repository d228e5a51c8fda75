//! Application façade tying validation, preprocessing, storage, and the
//! tagging engine together.

use crate::checkpoint::CheckpointManager;
use crate::client::{InferRef, InferenceClient, RateLimiter};
use crate::models::{Config, Dataset, Result, SchemaKind, SkilltagError, ValidationReport};
use crate::pipeline::{RunArtifacts, TaggingEngine};
use crate::preprocess::{needs_preprocessing, preprocess};
use crate::storage::{Bucket, BucketStore, FileRole};
use crate::validation::validate;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Explicit flags a caller passes alongside destructive requests. Nothing
/// destructive happens on a default context.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunContext {
    /// Must be set for `reset_storage` to do anything.
    pub reset_permitted: bool,
}

/// What happened to an uploaded file.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub report: ValidationReport,
    /// Stored name of the raw upload, when accepted.
    pub input_file: Option<String>,
    /// Stored name of the pipeline-ready dataset, when accepted.
    pub intermediate_file: Option<String>,
    /// Whether list-form skill titles were exploded.
    pub preprocessed: bool,
}

impl UploadReceipt {
    pub fn accepted(&self) -> bool {
        self.report.is_valid
    }
}

/// Entry point for everything callers do with the system.
pub struct App {
    config: Config,
    store: BucketStore,
    engine: TaggingEngine,
    checkpoints: CheckpointManager,
    /// Present only when the real HTTP client is wired in.
    limiter: Option<Arc<RateLimiter>>,
}

impl App {
    /// Build the app from config, wiring the real inference client.
    pub fn new(config: Config) -> Result<Self> {
        let api_key = config.resolve_api_key()?;
        let client = InferenceClient::new(&config.inference, api_key)?;
        let limiter = Arc::clone(client.rate_limiter());
        let backend: InferRef = Arc::new(client);
        let store = BucketStore::from_config(&config.storage)?;
        let mut app = Self::with_backend(config, store, backend);
        app.limiter = Some(limiter);
        Ok(app)
    }

    /// Build the app over an existing store and backend.
    pub fn with_backend(config: Config, store: BucketStore, backend: InferRef) -> Self {
        let engine = TaggingEngine::new(config.clone(), store.clone(), backend);
        let checkpoints = CheckpointManager::new(store.clone());
        Self {
            config,
            store,
            engine,
            checkpoints,
            limiter: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validate an upload and, when it passes, store both the raw file and
    /// the pipeline-ready version of it. Sector uploads with list-form
    /// skill titles get normalized on the way in.
    pub async fn submit_upload(
        &self,
        kind: SchemaKind,
        base_name: &str,
        bytes: &[u8],
    ) -> Result<UploadReceipt> {
        let dataset = Dataset::from_csv_bytes(bytes)?;
        let dataset = Arc::new(dataset);
        let report = validate(
            Arc::clone(&dataset),
            kind,
            self.config.pipeline.max_rows,
        )
        .await;

        if !report.is_valid {
            info!(
                schema = kind.as_str(),
                file = base_name,
                failures = report.failures.len(),
                "Upload rejected"
            );
            return Ok(UploadReceipt {
                report,
                input_file: None,
                intermediate_file: None,
                preprocessed: false,
            });
        }

        let input_file = self
            .store
            .store_stamped(
                Bucket::Input,
                &format!("{}_{base_name}", kind.as_str()),
                FileRole::Input,
                Bytes::copy_from_slice(bytes),
            )
            .await?;

        let (ready, preprocessed) = match kind {
            SchemaKind::Sector if needs_preprocessing(&dataset) => (preprocess(&dataset)?, true),
            _ => ((*dataset).clone(), false),
        };

        let intermediate_file = self
            .store
            .store_stamped(
                Bucket::Intermediate,
                &format!("{}_{base_name}", kind.as_str()),
                FileRole::Input,
                Bytes::from(ready.to_csv_bytes()?),
            )
            .await?;

        info!(
            schema = kind.as_str(),
            input = %input_file,
            intermediate = %intermediate_file,
            preprocessed,
            "Upload accepted"
        );
        Ok(UploadReceipt {
            report,
            input_file: Some(input_file),
            intermediate_file: Some(intermediate_file),
            preprocessed,
        })
    }

    /// Latest pipeline-ready file for a schema kind.
    async fn latest_intermediate(&self, kind: SchemaKind) -> Result<String> {
        let prefix = format!("{}_", kind.as_str());
        let names = self.store.list(Bucket::Intermediate).await?;
        names
            .into_iter()
            .filter(|n| n.starts_with(&prefix))
            .next_back()
            .ok_or_else(|| {
                SkilltagError::FileValidation(format!(
                    "no {} file has been uploaded yet",
                    kind.as_str()
                ))
            })
    }

    /// Start a fresh tagging run over the latest uploads. Refuses to run
    /// while an interrupted run's checkpoint exists; that takes an explicit
    /// resume or reset.
    pub async fn start_tagging(&self) -> Result<RunArtifacts> {
        if self.checkpoints.exists().await? {
            return Err(SkilltagError::Checkpoint(
                "an interrupted run exists; resume it or reset storage first".to_string(),
            ));
        }
        let sector_file = self.latest_intermediate(SchemaKind::Sector).await?;
        let sfw_file = self.latest_intermediate(SchemaKind::Sfw).await?;
        let artifacts = self.engine.run(&sector_file, &sfw_file).await?;
        self.log_inference_traffic();
        Ok(artifacts)
    }

    /// Resume the interrupted run recorded in the checkpoint.
    pub async fn resume_tagging(&self) -> Result<RunArtifacts> {
        let artifacts = self.engine.resume().await?;
        self.log_inference_traffic();
        Ok(artifacts)
    }

    fn log_inference_traffic(&self) {
        if let Some(limiter) = &self.limiter {
            let stats = limiter.stats();
            info!(
                total_requests = stats.total_requests,
                rate_limited = stats.total_429s,
                wait_secs = stats.total_wait_secs,
                "Inference traffic summary"
            );
        }
    }

    async fn latest_output(&self, suffix: &str) -> Result<Dataset> {
        let prefix = format!("{}_{suffix}", self.config.pipeline.sector_alias);
        let names = self.store.list(Bucket::Output).await?;
        let name = names
            .into_iter()
            .filter(|n| n.starts_with(&prefix))
            .next_back()
            .ok_or_else(|| {
                SkilltagError::storage(
                    Bucket::Output.prefix(),
                    prefix.clone(),
                    "no tagged output exists yet",
                )
            })?;
        let bytes = self.store.get(Bucket::Output, &name).await?;
        Dataset::from_csv_bytes(&bytes)
    }

    /// Resolved tags from the latest run.
    pub async fn get_valid(&self) -> Result<Dataset> {
        self.latest_output("tagged_valid").await
    }

    /// Unresolved tags from the latest run.
    pub async fn get_invalid(&self) -> Result<Dataset> {
        self.latest_output("unresolved").await
    }

    /// All tags from the latest run, resolved first.
    pub async fn get_all_tagged(&self) -> Result<Dataset> {
        self.latest_output("tagged_all").await
    }

    /// Delete every stored artifact. Requires an explicitly permitted
    /// context; the deletion is paced per config.
    pub async fn reset_storage(&self, context: RunContext) -> Result<usize> {
        if !context.reset_permitted {
            return Err(SkilltagError::Internal(
                "storage reset requires explicit permission".to_string(),
            ));
        }
        self.store
            .reset_all(Duration::from_millis(self.config.storage.reset_pace_ms))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Infer;
    use crate::models::{
        InferenceConfig, PipelineConfig, StorageBackend, StorageConfig, SECTOR_COLUMNS,
        SFW_COLUMNS,
    };
    use async_trait::async_trait;

    fn config() -> Config {
        Config {
            inference: InferenceConfig::default(),
            storage: StorageConfig {
                backend: StorageBackend::Local,
                root: "/tmp/unused".into(),
                bucket: None,
                region: None,
                endpoint: None,
                reset_pace_ms: 0,
            },
            pipeline: PipelineConfig {
                sector: "Human Resources".into(),
                sector_alias: "hr".into(),
                pool_size: 2,
                max_rows: 1000,
            },
        }
    }

    struct AlwaysThree;

    #[async_trait]
    impl Infer for AlwaysThree {
        async fn infer(&self, _system: &str, user: &str) -> Result<String> {
            if user.contains("Knowledge Base") {
                Ok(r#"{"proficiency": 3, "reason": "kb", "confidence": "medium"}"#.into())
            } else {
                Ok(r#"{"proficiency_level": 3, "reason": "r", "confidence": "high"}"#.into())
            }
        }
    }

    fn app() -> App {
        App::with_backend(config(), BucketStore::in_memory(), Arc::new(AlwaysThree))
    }

    fn sector_csv() -> Vec<u8> {
        let mut out = SECTOR_COLUMNS.join(",").into_bytes();
        out.extend_from_slice(
            b"\nC1,\"['Data Analysis', 'Food Safety']\",Analytics 101,About it,Learn it\n",
        );
        out
    }

    fn sfw_csv() -> Vec<u8> {
        let mut out = SFW_COLUMNS.join(",").into_bytes();
        out.extend_from_slice(
            b"\nTSC,X-1,Human Resources,Analytics,Data Analysis,desc,3,Apply analysis,knowledge,Statistics\n",
        );
        out
    }

    #[tokio::test]
    async fn invalid_upload_is_rejected_without_storing() {
        let app = app();
        let receipt = app
            .submit_upload(SchemaKind::Sector, "bad.csv", b"Course Title\nIntro\n")
            .await
            .unwrap();
        assert!(!receipt.accepted());
        assert!(receipt.input_file.is_none());
        assert!(receipt
            .report
            .summary()
            .contains("Skill Title"));
    }

    #[tokio::test]
    async fn sector_upload_with_lists_is_preprocessed() {
        let app = app();
        let receipt = app
            .submit_upload(SchemaKind::Sector, "courses.csv", &sector_csv())
            .await
            .unwrap();
        assert!(receipt.accepted());
        assert!(receipt.preprocessed);
        let name = receipt.intermediate_file.unwrap();
        assert!(name.starts_with("sector_courses"));
    }

    #[tokio::test]
    async fn full_flow_upload_run_and_fetch_outputs() {
        let app = app();
        app.submit_upload(SchemaKind::Sfw, "sfw.csv", &sfw_csv())
            .await
            .unwrap();
        app.submit_upload(SchemaKind::Sector, "courses.csv", &sector_csv())
            .await
            .unwrap();

        let artifacts = app.start_tagging().await.unwrap();
        assert_eq!(artifacts.stats.total_valid, 1);
        // "Food Safety" is not in the HR taxonomy
        assert_eq!(artifacts.stats.out_of_sector, 1);

        let valid = app.get_valid().await.unwrap();
        assert_eq!(valid.row_count(), 1);
        assert_eq!(valid.value(0, "Proficiency Level"), Some("3"));

        let all = app.get_all_tagged().await.unwrap();
        assert_eq!(all.row_count(), 1);
    }

    #[tokio::test]
    async fn start_refuses_while_interrupted_run_checkpoint_exists() {
        let store = BucketStore::in_memory();
        let app = App::with_backend(config(), store.clone(), Arc::new(AlwaysThree));
        app.submit_upload(SchemaKind::Sfw, "sfw.csv", &sfw_csv())
            .await
            .unwrap();
        app.submit_upload(SchemaKind::Sector, "courses.csv", &sector_csv())
            .await
            .unwrap();

        let state = crate::checkpoint::CheckpointState::new(
            "run-1".into(),
            "hr".into(),
            "sector_courses.csv".into(),
            "sfw_sfw.csv".into(),
        );
        CheckpointManager::new(store).save(&state).await.unwrap();

        let err = app.start_tagging().await.unwrap_err();
        assert!(matches!(err, SkilltagError::Checkpoint(_)));
        assert!(err.to_string().contains("resume"));
    }

    #[tokio::test]
    async fn start_without_uploads_fails_cleanly() {
        let app = app();
        let err = app.start_tagging().await.unwrap_err();
        assert!(err.to_string().contains("uploaded"));
    }

    #[tokio::test]
    async fn reset_requires_explicit_permission() {
        let app = app();
        app.submit_upload(SchemaKind::Sfw, "sfw.csv", &sfw_csv())
            .await
            .unwrap();

        let err = app.reset_storage(RunContext::default()).await.unwrap_err();
        assert!(err.to_string().contains("permission"));

        let deleted = app
            .reset_storage(RunContext {
                reset_permitted: true,
            })
            .await
            .unwrap();
        assert!(deleted >= 2);
    }
}
