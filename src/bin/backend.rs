//! HTTP delivery layer: one route that turns a source video URL into a
//! single downloadable mp4.
//!
//! The route fetches the rendition catalog, runs format selection, and then
//! either proxies an already-combined stream straight through or downloads
//! video and audio separately and remuxes them before responding. Everything
//! interesting happens in the library; this binary wires it to axum and owns
//! the produced file's after-delivery cleanup.

use std::{
    io,
    net::SocketAddr,
    path::{Path, PathBuf},
    pin::Pin,
    process::Stdio,
    sync::Arc,
    task::{Context as TaskContext, Poll},
};

use anyhow::{Context, Result, bail};
use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use futures::Stream;
use serde::Deserialize;
use tokio::{fs::File, signal};
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use tubemux::{
    catalog::{CatalogFetcher, Rendition, VideoId},
    config,
    error::DeliveryError,
    remux::{FfmpegMuxer, RemuxOrchestrator},
    scratch::{ScratchDir, spawn_sweeper},
    security,
    select::select,
    stream::StreamMaterializer,
};

/// Every produced file is presented to the caller under this name.
const ATTACHMENT_FILENAME: &str = "video.mp4";

#[derive(Clone)]
struct AppState {
    catalog: Arc<CatalogFetcher>,
    materializer: Arc<StreamMaterializer>,
    orchestrator: Arc<RemuxOrchestrator>,
}

#[derive(Deserialize)]
struct DownloadParams {
    url: Option<String>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<DeliveryError> for ApiError {
    fn from(err: DeliveryError) -> Self {
        let status = match &err {
            DeliveryError::InvalidIdentifier(_) => StatusCode::BAD_REQUEST,
            DeliveryError::NoSuitableVideo | DeliveryError::NoSuitableAudio => {
                StatusCode::NOT_FOUND
            }
            DeliveryError::CatalogFetch(_)
            | DeliveryError::StreamOpen(_)
            | DeliveryError::Merge(_)
            | DeliveryError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Flatten the cause chain so "remux failed" still carries ffmpeg's
        // stderr in the response body.
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message = format!("{message}: {cause}");
            source = cause.source();
        }

        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, headers, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    security::ensure_not_root("tubemux-backend")?;

    let config = config::load_runtime_config()?;
    ensure_program_available(&config.ytdlp_path)?;
    ensure_program_available(&config.ffmpeg_path)?;

    let scratch = Arc::new(
        ScratchDir::create(&config.scratch_dir).with_context(|| {
            format!("creating scratch directory {}", config.scratch_dir.display())
        })?,
    );
    match scratch.sweep().await {
        Ok(removed) if removed > 0 => info!("startup sweep removed {removed} leftover file(s)"),
        Ok(_) => {}
        Err(err) => warn!("startup sweep failed: {err}"),
    }
    spawn_sweeper(scratch.clone(), config.sweep_interval);

    let muxer = Arc::new(FfmpegMuxer::new(&config.ffmpeg_path));
    let state = AppState {
        catalog: Arc::new(CatalogFetcher::new(&config.ytdlp_path)),
        materializer: Arc::new(StreamMaterializer::new()),
        orchestrator: Arc::new(RemuxOrchestrator::new(scratch, muxer)),
    };

    let app = Router::new()
        .route("/download", get(download))
        .with_state(state);

    let addr = SocketAddr::new(config.host.parse()?, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!("tubemux listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running server")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!("failed to install Ctrl+C handler: {}", err);
    }
}

/// Runs `<binary> --version` to fail loudly at startup when yt-dlp or
/// ffmpeg is missing, rather than on the first request.
fn ensure_program_available(binary: &Path) -> Result<()> {
    let status = std::process::Command::new(binary)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(_) => bail!(
            "{} is installed but returned a failure status",
            binary.display()
        ),
        Err(err) => bail!("{} is not installed or not in PATH: {}", binary.display(), err),
    }
}

async fn download(
    State(state): State<AppState>,
    Query(params): Query<DownloadParams>,
) -> ApiResult<Response> {
    let url = params
        .url
        .ok_or_else(|| ApiError::bad_request("the source video url is required"))?;
    let id = VideoId::parse(&url)?;

    let catalog = state.catalog.fetch(&id).await?;
    let selection = select(&catalog)?;

    match &selection.audio {
        None => deliver_direct(&state, &selection.video).await,
        Some(audio) => deliver_merged(&state, &selection.video, audio).await,
    }
}

/// Fast path: the chosen rendition already carries audio, so its stream is
/// piped straight through. Nothing touches disk.
async fn deliver_direct(state: &AppState, rendition: &Rendition) -> ApiResult<Response> {
    let length = match rendition.content_length {
        Some(length) => Some(length),
        None => state.materializer.probe_length(&rendition.source_url).await,
    };

    let stream = state.materializer.open(rendition).await?;
    let mut response = Body::from_stream(stream).into_response();
    apply_attachment_headers(response.headers_mut(), length);
    Ok(response)
}

/// Merge path: materialize both streams, remux, then stream the combined
/// file out. The output file is deleted once delivery finishes, whether the
/// transfer completed or the client went away.
async fn deliver_merged(
    state: &AppState,
    video: &Rendition,
    audio: &Rendition,
) -> ApiResult<Response> {
    let video_stream = state.materializer.open(video).await?;
    let audio_stream = state.materializer.open(audio).await?;

    let output = state.orchestrator.merge(video_stream, audio_stream).await?;

    let length = tokio::fs::metadata(&output).await.ok().map(|meta| meta.len());
    let file = match File::open(&output).await {
        Ok(file) => file,
        Err(err) => {
            if let Err(remove_err) = tokio::fs::remove_file(&output).await {
                warn!("failed to remove {}: {remove_err}", output.display());
            }
            return Err(ApiError::internal(format!(
                "opening merged output failed: {err}"
            )));
        }
    };

    let stream = DeliveredFile::new(file, output);
    let mut response = Body::from_stream(stream).into_response();
    apply_attachment_headers(response.headers_mut(), length);
    Ok(response)
}

fn apply_attachment_headers(headers: &mut HeaderMap, length: Option<u64>) {
    headers.insert(header::CONTENT_TYPE, "video/mp4".parse().unwrap());
    headers.insert(
        header::CONTENT_DISPOSITION,
        format!("attachment; filename=\"{ATTACHMENT_FILENAME}\"")
            .parse()
            .unwrap(),
    );
    if let Some(length) = length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
}

/// Response stream over a produced file that removes the file once the
/// stream is dropped — after full delivery or when the client disconnects.
struct DeliveredFile {
    inner: ReaderStream<File>,
    path: Option<PathBuf>,
}

impl DeliveredFile {
    fn new(file: File, path: PathBuf) -> Self {
        Self {
            inner: ReaderStream::new(file),
            path: Some(path),
        }
    }
}

impl Stream for DeliveredFile {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for DeliveredFile {
    fn drop(&mut self) {
        // Synchronous removal: a drop can happen outside any runtime (e.g.
        // during server teardown), and unlinking one path is cheap.
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!("failed to remove delivered file {}: {err}", path.display());
                }
            }
        }
    }
}
