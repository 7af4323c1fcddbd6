//! Callflow server binary
//!
//! Wires configuration, providers, and the dialog engine together and
//! serves the HTTP surface.

use std::sync::Arc;
use std::time::Duration;

use callflow_config::{load_settings, Settings, SttProviderKind, TtsProviderKind};
use callflow_core::{DataBackend, NluClassifier, SpeechToText, TextToSpeech};
use callflow_data::{DataQueryGateway, RestDataBackend};
use callflow_dialog::{DialogEngine, ConversationStore, ResponseComposer, SessionRegistry};
use callflow_nlu::LanguageResolver;
use callflow_speech::{HttpNluProvider, HttpSttProvider, HttpTtsProvider, TranscriptionFuser};
use callflow_server::{create_router, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    callflow_server::metrics::init_metrics()?;

    let config_path = std::env::args().nth(1);
    let settings = Arc::new(load_settings(config_path.as_deref())?);

    let engine = Arc::new(build_engine(&settings).await?);
    let sessions = engine.sessions().clone();
    let sweep_shutdown = sessions.start_sweep_task();

    let state = AppState::new(engine, settings.clone());
    let router = create_router(state);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "callflow server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = sweep_shutdown.send(true);
    tracing::info!("server stopped");
    Ok(())
}

async fn build_engine(settings: &Settings) -> anyhow::Result<DialogEngine> {
    let pipeline = &settings.pipeline;
    let timeout_ms = pipeline.provider_timeout_ms;

    let primary = stt_provider(pipeline.primary_stt, &pipeline.primary_stt_url, timeout_ms)?;
    let secondary = stt_provider(pipeline.secondary_stt, &pipeline.secondary_stt_url, timeout_ms)?;
    let fuser = TranscriptionFuser::new(primary, secondary, Duration::from_millis(timeout_ms));

    let tts: Arc<dyn TextToSpeech> = match pipeline.tts {
        TtsProviderKind::Polly => {
            Arc::new(HttpTtsProvider::new(pipeline.tts_url.clone(), timeout_ms)?)
        }
    };

    let nlu: Option<Arc<dyn NluClassifier>> = match HttpNluProvider::from_config(pipeline)? {
        Some(provider) => {
            tracing::info!(url = %pipeline.nlu_url, "external nlu enabled");
            Some(Arc::new(provider))
        }
        None => {
            tracing::info!("external nlu disabled, keyword classification only");
            None
        }
    };

    let backend = Arc::new(RestDataBackend::new(&settings.data_api)?);
    if !backend.probe().await {
        tracing::warn!(base_url = %settings.data_api.base_url, "data backend unreachable at startup");
    }
    let gateway = Arc::new(DataQueryGateway::new(
        backend,
        Duration::from_secs(settings.cache.ttl_secs),
    ));

    let sessions = Arc::new(SessionRegistry::new(
        Duration::from_secs(settings.conversation.inactivity_timeout_secs),
        Duration::from_secs(settings.conversation.sweep_interval_secs),
    ));
    let conversations = Arc::new(ConversationStore::new(settings.conversation.max_transcripts));

    let default_language = settings.language.default_language;
    Ok(DialogEngine::new(
        sessions,
        conversations,
        fuser,
        LanguageResolver::new(default_language),
        nlu,
        gateway,
        tts,
        ResponseComposer::new(default_language),
        Duration::from_millis(timeout_ms),
    ))
}

fn stt_provider(
    kind: SttProviderKind,
    url: &str,
    timeout_ms: u64,
) -> anyhow::Result<Arc<dyn SpeechToText>> {
    let tag = match kind {
        SttProviderKind::CloudSpeech => "cloud_speech",
        SttProviderKind::Whisper => "whisper",
    };
    Ok(Arc::new(HttpSttProvider::new(url, tag, timeout_ms)?))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to install sigterm handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
