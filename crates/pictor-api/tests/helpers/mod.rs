//! Test harness: the full router over in-memory backends.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue};
use axum_test::multipart::{MultipartForm, Part};
use axum_test::{TestRequest, TestServer};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use pictor_api::auth::USER_ID_HEADER;
use pictor_api::setup::{routes, services};
use pictor_api::task_handlers::TransformJobHandler;
use pictor_cache::MemoryCache;
use pictor_core::models::JobState;
use pictor_core::{Config, IdGenerator, PictorConfig, StorageBackend, UuidGenerator};
use pictor_db::InMemoryImageRepository;
use pictor_processing::RasterProcessor;
use pictor_storage::{LocalStorage, MemoryStorage, Storage};
use pictor_worker::{process_next, MemoryJobQueue, QueueSettings};
use tempfile::TempDir;
use uuid::Uuid;

pub const VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

pub struct TestApp {
    pub server: TestServer,
    pub repository: Arc<InMemoryImageRepository>,
    pub queue: Arc<MemoryJobQueue>,
    pub cache: Arc<MemoryCache>,
    pub handler: Arc<TransformJobHandler>,
    /// Set when the app runs over `MemoryStorage`.
    pub memory_storage: Option<Arc<MemoryStorage>>,
    _dir: Option<TempDir>,
}

fn test_config(local_path: &str) -> Config {
    Config(Box::new(PictorConfig {
        storage_backend: StorageBackend::Local,
        local_storage_path: local_path.to_string(),
        local_storage_base_url: "/uploads".to_string(),
        ..Default::default()
    }))
}

fn build(
    config: Config,
    storage: Arc<dyn Storage>,
    memory_storage: Option<Arc<MemoryStorage>>,
    dir: Option<TempDir>,
) -> TestApp {
    let ids: Arc<dyn IdGenerator> = Arc::new(UuidGenerator);
    let repository = Arc::new(InMemoryImageRepository::new());
    let queue = Arc::new(MemoryJobQueue::new(
        ids.clone(),
        QueueSettings {
            max_attempts: 3,
            visibility_timeout: VISIBILITY_TIMEOUT,
        },
    ));
    let cache = Arc::new(MemoryCache::new());

    let backends = services::Backends {
        storage,
        processor: Arc::new(RasterProcessor::new()),
        repository: repository.clone(),
        queue: queue.clone(),
        cache: cache.clone(),
    };
    let (state, handler) = services::initialize_services(&config, backends, ids).unwrap();
    let router = routes::setup_routes(&config, state);

    TestApp {
        server: TestServer::new(router).unwrap(),
        repository,
        queue,
        cache,
        handler,
        memory_storage,
        _dir: dir,
    }
}

impl TestApp {
    /// Storage kept in memory; URLs are `memory://` and unique per call.
    pub fn in_memory() -> Self {
        let storage = Arc::new(MemoryStorage::new(Arc::new(UuidGenerator)));
        build(
            test_config("./unused-uploads"),
            storage.clone(),
            Some(storage),
            None,
        )
    }

    /// Local filesystem storage in a temp dir, served under `/uploads`.
    pub fn with_local_storage() -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_string_lossy().into_owned();
        let storage = Arc::new(LocalStorage::new(
            path.clone(),
            "/uploads",
            Arc::new(UuidGenerator),
        ));
        build(test_config(&path), storage, None, Some(dir))
    }

    pub fn memory_storage(&self) -> &MemoryStorage {
        self.memory_storage
            .as_deref()
            .expect("app was not built over MemoryStorage")
    }

    pub fn get(&self, path: &str, user: Uuid) -> TestRequest {
        as_user(self.server.get(path), user)
    }

    pub fn post(&self, path: &str, user: Uuid) -> TestRequest {
        as_user(self.server.post(path), user)
    }

    pub fn delete(&self, path: &str, user: Uuid) -> TestRequest {
        as_user(self.server.delete(path), user)
    }

    /// Upload `data` as `name` and return the JSON view.
    pub async fn upload(&self, user: Uuid, name: &str, data: Vec<u8>) -> serde_json::Value {
        let response = self
            .post("/images/upload", user)
            .multipart(image_form(name, data))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        response.json()
    }

    /// Deliver the next queued job to the transform handler.
    pub async fn run_next_job(&self) -> Option<JobState> {
        process_next(self.queue.as_ref(), self.handler.as_ref())
            .await
            .unwrap()
    }
}

pub fn as_user(request: TestRequest, user: Uuid) -> TestRequest {
    request.add_header(
        HeaderName::from_static(USER_ID_HEADER),
        HeaderValue::from_str(&user.to_string()).unwrap(),
    )
}

pub fn image_form(name: &str, data: Vec<u8>) -> MultipartForm {
    MultipartForm::new().add_part("image", Part::bytes(data).file_name(name.to_string()))
}

/// A gradient so encoders have something to work with.
pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 96, 255])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

pub fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 96])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Jpeg)
        .unwrap();
    out.into_inner()
}

pub fn dimensions(data: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(data).unwrap();
    (img.width(), img.height())
}

pub fn id_of(view: &serde_json::Value) -> Uuid {
    view["id"].as_str().unwrap().parse().unwrap()
}
