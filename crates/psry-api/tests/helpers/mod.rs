//! Test helpers: build AppState and router over in-memory backends.

use axum_test::TestServer;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use psry_api::setup::routes;
use psry_api::AppState;
use psry_core::Config;
use psry_db::InMemoryRecordStore;
use psry_storage::MemoryStorage;
use std::sync::Arc;

pub const BUCKET: &str = "psr-bucket";
pub const PUBLIC_BASE: &str = "https://s3.us-east-1.amazonaws.com";

/// Smallest valid PNG: 1x1 transparent pixel.
pub const PNG_1X1: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<InMemoryRecordStore>,
    pub storage: Arc<MemoryStorage>,
}

pub fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "STORE_BACKEND" => Some("memory".into()),
        "STORAGE_BACKEND" => Some("memory".into()),
        "TRANSPORT_BACKEND" => Some("memory".into()),
        "BUCKET" => Some(BUCKET.into()),
        _ => None,
    })
    .expect("test config")
}

pub fn setup_test_app() -> TestApp {
    setup_test_app_with(test_config())
}

pub fn setup_test_app_with(config: Config) -> TestApp {
    let store = Arc::new(InMemoryRecordStore::new());
    let storage = Arc::new(MemoryStorage::new(BUCKET, PUBLIC_BASE));

    let state = Arc::new(AppState::new(
        store.clone(),
        storage.clone(),
        config.max_upload_size_bytes,
        config.pipeline.service_timeout,
    ));
    let router = routes::setup_routes(&config, state);
    let server = TestServer::new(router).expect("test server");

    TestApp {
        server,
        store,
        storage,
    }
}

pub fn png_base64() -> String {
    STANDARD.encode(PNG_1X1)
}
