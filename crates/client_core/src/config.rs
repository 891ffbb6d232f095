use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use shared::domain::Stage;
use tracing::warn;

use crate::transport::BatchQuery;

pub const SETTINGS_FILE: &str = "labeller.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub server_url: String,
    pub request_timeout_secs: u64,
    pub batch_query: BatchQuery,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".into(),
            request_timeout_secs: 30,
            batch_query: BatchQuery::default(),
        }
    }
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    request_timeout_secs: Option<u64>,
    force_stage: Option<String>,
    sample_size: Option<usize>,
    prediction: Option<bool>,
}

pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(SETTINGS_FILE))
}

pub fn load_settings_from(path: &Path) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file_settings(&mut settings, file_cfg),
            Err(err) => warn!(path = %path.display(), "ignoring unreadable settings file: {err}"),
        }
    }

    apply_env_settings(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file_settings(settings: &mut ClientSettings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.server_url {
        settings.server_url = v;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(stage) = file_cfg.force_stage.as_deref().and_then(parse_stage) {
        settings.batch_query = settings.batch_query.clone().force_stage(stage);
    }
    if let Some(v) = file_cfg.sample_size {
        settings.batch_query = settings.batch_query.clone().sample_size(v);
    }
    if let Some(v) = file_cfg.prediction {
        settings.batch_query = settings.batch_query.clone().prediction(v);
    }
}

fn apply_env_settings(settings: &mut ClientSettings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("LABELLER_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = var("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = var("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }

    if let Some(stage) = var("APP__FORCE_STAGE").as_deref().and_then(parse_stage) {
        settings.batch_query = settings.batch_query.clone().force_stage(stage);
    }
    if let Some(v) = var("APP__SAMPLE_SIZE") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.batch_query = settings.batch_query.clone().sample_size(parsed);
        }
    }
    if let Some(v) = var("APP__PREDICTION") {
        if let Ok(parsed) = v.parse::<bool>() {
            settings.batch_query = settings.batch_query.clone().prediction(parsed);
        }
    }
}

pub fn parse_stage(raw: &str) -> Option<Stage> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "TRAIN" => Some(Stage::Train),
        "TEST" => Some(Stage::Test),
        "MODEL_LABELLED" => Some(Stage::ModelLabelled),
        _ => None,
    }
}
