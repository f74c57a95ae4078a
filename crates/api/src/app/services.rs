use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use docembed_core::{DocumentId, JobId};
use docembed_infra::documents::{DocumentStore, InMemoryDocumentStore, PostgresDocumentStore};
use docembed_infra::embedding::{
    BatchEmbedder, EmbeddingProvider, HashingProvider, OpenAiCompatibleProvider,
};
use docembed_infra::jobs::{
    DispatchReport, Dispatcher, Enqueued, InMemoryJobStore, Job, JobProcessor, JobStore,
    JobStoreError, PostgresJobStore, QueueStats, StatsAggregator,
};
use docembed_infra::schema;

use crate::config::AppConfig;

pub type AppDispatcher = Dispatcher<dyn JobStore, dyn DocumentStore, dyn EmbeddingProvider>;

/// Queue components shared by all handlers.
#[derive(Clone)]
pub struct AppServices {
    jobs: Arc<dyn JobStore>,
    dispatcher: AppDispatcher,
    stats: Arc<StatsAggregator<dyn JobStore>>,
    max_retries: u32,
}

impl AppServices {
    /// Wire the queue over already-built stores and provider.
    pub fn new(
        config: &AppConfig,
        jobs: Arc<dyn JobStore>,
        documents: Arc<dyn DocumentStore>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let embedder = BatchEmbedder::new(provider).with_batch_size(config.embedding_batch_size);
        let processor = Arc::new(JobProcessor::new(jobs.clone(), documents, embedder));
        let dispatcher =
            Dispatcher::new(jobs.clone(), processor).with_batch_size(config.dispatch_batch_size);

        Self {
            stats: Arc::new(StatsAggregator::new(jobs.clone())),
            jobs,
            dispatcher,
            max_retries: config.max_retries,
        }
    }

    pub fn dispatcher(&self) -> &AppDispatcher {
        &self.dispatcher
    }

    pub async fn enqueue(
        &self,
        document_id: DocumentId,
        priority: i32,
    ) -> Result<Enqueued, JobStoreError> {
        self.jobs
            .create_job(document_id, priority, self.max_retries)
            .await
    }

    pub async fn job(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        self.jobs.get_job(job_id).await
    }

    pub async fn dispatch(&self) -> Result<DispatchReport, JobStoreError> {
        self.dispatcher.dispatch().await
    }

    pub async fn stats(&self) -> Result<QueueStats, JobStoreError> {
        self.stats.snapshot().await
    }

    pub async fn is_locked(&self, document_id: DocumentId) -> bool {
        self.dispatcher
            .processor()
            .lock_manager()
            .is_locked(document_id)
            .await
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let provider = build_provider(config)?;

    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set; using in-memory stores");
        return Ok(AppServices::new(
            config,
            InMemoryJobStore::arc(),
            InMemoryDocumentStore::arc(),
            provider,
        ));
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;
    schema::ensure_schema(&pool)
        .await
        .context("failed to apply embedding queue schema")?;

    Ok(AppServices::new(
        config,
        Arc::new(PostgresJobStore::new(pool.clone())),
        Arc::new(PostgresDocumentStore::new(pool)),
        provider,
    ))
}

fn build_provider(config: &AppConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    match config.embedding_api_key.as_deref() {
        Some(api_key) => {
            let provider = OpenAiCompatibleProvider::new(
                api_key,
                &config.embedding_base_url,
                config.embedding_model.clone(),
                config.embedding_timeout,
            )
            .context("failed to configure embedding provider")?;
            tracing::info!(
                base_url = %config.embedding_base_url,
                model = %config.embedding_model,
                "using remote embedding provider"
            );
            Ok(Arc::new(provider))
        }
        None => {
            tracing::warn!("EMBEDDING_API_KEY not set; using local hashing embeddings");
            Ok(Arc::new(HashingProvider::default()))
        }
    }
}
