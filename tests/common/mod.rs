//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wav2lip_server::{
    Invocation, InferenceEngine, LipSyncError, LipSyncService, Result, ServerSettings,
};

/// Bytes the mock engine writes as its "video"
pub const FAKE_VIDEO: &[u8] = b"\x00\x00\x00\x18ftypmp42 fake lip-sync video";

/// How the mock engine behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineBehavior {
    /// Write the output file and succeed
    WriteOutput,
    /// Fail like a crashed inference process
    Fail,
    /// Report success without writing anything
    SucceedWithoutOutput,
}

/// Inference engine that records invocations instead of running a model
pub struct MockEngine {
    behavior: EngineBehavior,
    delay: Duration,
    invocations: Mutex<Vec<Invocation>>,
}

impl MockEngine {
    pub fn new(behavior: EngineBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            delay: Duration::ZERO,
            invocations: Mutex::new(Vec::new()),
        })
    }

    pub fn with_delay(behavior: EngineBehavior, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            delay,
            invocations: Mutex::new(Vec::new()),
        })
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn last_flag(&self, flag: &str) -> Option<String> {
        self.invocations()
            .last()
            .and_then(|inv| inv.flag_value(flag).map(|v| v.to_string_lossy().into_owned()))
    }
}

#[async_trait]
impl InferenceEngine for MockEngine {
    async fn run(&self, invocation: &Invocation) -> Result<PathBuf> {
        self.invocations.lock().unwrap().push(invocation.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.behavior {
            EngineBehavior::WriteOutput => {
                tokio::fs::write(invocation.output_path(), FAKE_VIDEO).await?;
                Ok(invocation.output_path().to_path_buf())
            },
            EngineBehavior::Fail => Err(LipSyncError::inference_process(
                Some(1),
                "RuntimeError: CUDA out of memory",
            )),
            EngineBehavior::SucceedWithoutOutput => Ok(invocation.output_path().to_path_buf()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Temporary roots for one test; `requests` is created lazily by the service
pub struct TestEnv {
    pub root: TempDir,
    pub settings: ServerSettings,
}

impl TestEnv {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let settings = ServerSettings::builder()
            .temp_dir(root.path().join("requests"))
            .checkpoints_dir(root.path().join("checkpoints"))
            .work_root(root.path())
            .max_upload_bytes(8 * 1024 * 1024)
            .build()
            .unwrap();
        Self { root, settings }
    }

    pub fn requests_dir(&self) -> PathBuf {
        self.settings.temp_dir.clone()
    }

    pub fn service(&self, engine: Arc<MockEngine>) -> LipSyncService {
        LipSyncService::new(engine, &self.settings)
    }

    /// Number of request directories currently on disk
    pub fn live_request_dirs(&self) -> usize {
        count_entries(&self.requests_dir())
    }
}

pub fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|it| it.count()).unwrap_or(0)
}

/// Encoded PNG of the given size
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, image::Rgb([200, 160, 140]));
    let mut cursor = Cursor::new(Vec::new());
    image.write_to(&mut cursor, ImageFormat::Png).unwrap();
    cursor.into_inner()
}

/// A short silent WAV header plus samples; the mock engine never decodes it
pub fn wav_bytes() -> Vec<u8> {
    let mut bytes = b"RIFF\x24\x00\x00\x00WAVEfmt ".to_vec();
    bytes.extend_from_slice(&[16, 0, 0, 0, 1, 0, 1, 0, 0x40, 0x1f, 0, 0, 0x80, 0x3e, 0, 0, 2, 0, 16, 0]);
    bytes.extend_from_slice(b"data\x00\x00\x00\x00");
    bytes
}
