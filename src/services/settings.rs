//! JSON settings file shared by the display and admin screens.
//!
//! Sections are merged, never replaced: a partial update only touches the
//! fields it names. Writes go to a sibling temp file that is then renamed over
//! the settings file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub rate:  f64,
    pub pitch: f64,
    pub voice: String,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self { rate: 0.9, pitch: 1.0, voice: String::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScheduleSettings {
    pub start:            String,
    pub end:              String,
    pub interval_minutes: u32,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            start:            "08:00".into(),
            end:              "17:00".into(),
            interval_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub audio:    AudioSettings,
    pub schedule: ScheduleSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AudioPatch {
    pub rate:  Option<f64>,
    pub pitch: Option<f64>,
    pub voice: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePatch {
    pub start:            Option<String>,
    pub end:              Option<String>,
    pub interval_minutes: Option<u32>,
}

#[derive(Debug, Clone)]
pub enum SettingsPatch {
    Audio(AudioPatch),
    Schedule(SchedulePatch),
}

impl AudioPatch {
    fn validate(&self) -> AppResult<()> {
        if let Some(rate) = self.rate {
            if !rate.is_finite() || !(0.1..=10.0).contains(&rate) {
                return Err(AppError::BadRequest("rate must be between 0.1 and 10".into()));
            }
        }
        if let Some(pitch) = self.pitch {
            if !pitch.is_finite() || !(0.0..=2.0).contains(&pitch) {
                return Err(AppError::BadRequest("pitch must be between 0 and 2".into()));
            }
        }
        Ok(())
    }

    fn apply(self, audio: &mut AudioSettings) {
        if let Some(rate) = self.rate {
            audio.rate = rate;
        }
        if let Some(pitch) = self.pitch {
            audio.pitch = pitch;
        }
        if let Some(voice) = self.voice {
            audio.voice = voice;
        }
    }
}

impl SchedulePatch {
    fn validate(&self) -> AppResult<()> {
        for (field, value) in [("start", &self.start), ("end", &self.end)] {
            if let Some(v) = value {
                if chrono::NaiveTime::parse_from_str(v, "%H:%M").is_err() || v.len() != 5 {
                    return Err(AppError::BadRequest(format!("{field} must be HH:MM")));
                }
            }
        }
        if self.interval_minutes == Some(0) {
            return Err(AppError::BadRequest("intervalMinutes must be positive".into()));
        }
        Ok(())
    }

    fn apply(self, schedule: &mut ScheduleSettings) {
        if let Some(start) = self.start {
            schedule.start = start;
        }
        if let Some(end) = self.end {
            schedule.end = end;
        }
        if let Some(interval) = self.interval_minutes {
            schedule.interval_minutes = interval;
        }
    }
}

#[derive(Clone)]
pub struct SettingsStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current settings. A missing file is created with defaults; an
    /// unreadable one yields defaults and is left as is.
    pub async fn get(&self) -> AppResult<Settings> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    pub async fn update(&self, patch: SettingsPatch) -> AppResult<Settings> {
        match &patch {
            SettingsPatch::Audio(p) => p.validate()?,
            SettingsPatch::Schedule(p) => p.validate()?,
        }

        let _guard = self.lock.lock().await;
        let mut settings = self.load().await?;
        match patch {
            SettingsPatch::Audio(p) => p.apply(&mut settings.audio),
            SettingsPatch::Schedule(p) => p.apply(&mut settings.schedule),
        }
        self.write(&settings).await?;
        tracing::info!(path = %self.path.display(), "Settings updated");
        Ok(settings)
    }

    async fn load(&self) -> AppResult<Settings> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice::<Settings>(&bytes) {
                Ok(settings) => Ok(settings),
                Err(err) => {
                    tracing::warn!(path = %self.path.display(), error = %err, "Settings file unreadable; using defaults");
                    Ok(Settings::default())
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let settings = Settings::default();
                self.write(&settings).await?;
                tracing::info!(path = %self.path.display(), "Settings file created with defaults");
                Ok(settings)
            }
            Err(err) => Err(AppError::Internal(
                anyhow::Error::new(err).context(format!("reading {}", self.path.display())),
            )),
        }
    }

    async fn write(&self, settings: &Settings) -> AppResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_vec_pretty(settings).context("serializing settings")?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}
