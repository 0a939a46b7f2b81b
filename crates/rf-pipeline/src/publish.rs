//! Publishing an approved episode.

use std::path::PathBuf;

use rusqlite::Connection;

use rf_core::config::Config;
use rf_core::{EpisodeId, EpisodeStatus, Error, PublishJobId, Result, Stage};
use rf_db::queries::{episodes, publish_jobs};

use crate::hashing;
use crate::safety::{SafetyContext, SafetyPipeline, SafetyReport};
use crate::stages::{images, render};
use crate::workspace::EpisodeWorkspace;

/// Everything the upload service needs for one video.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub video_path: PathBuf,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category: String,
    pub language: String,
    pub privacy: String,
    pub thumbnail_path: Option<PathBuf>,
}

/// Where the video ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadResult {
    pub video_id: String,
    pub video_url: String,
}

/// Progress callback: fraction uploaded (0.0 to 1.0).
pub type ProgressFn<'a> = &'a dyn Fn(f64);

/// External video hosting service.
pub trait Uploader {
    fn upload(&self, request: &UploadRequest, progress: ProgressFn) -> Result<UploadResult>;
}

/// Uploader that never touches the network and returns deterministic
/// placeholders derived from the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunUploader;

impl Uploader for DryRunUploader {
    fn upload(&self, request: &UploadRequest, progress: ProgressFn) -> Result<UploadResult> {
        tracing::info!(
            "[DRY RUN] Would upload {} as \"{}\" ({})",
            request.video_path.display(),
            request.title,
            request.privacy
        );
        progress(1.0);
        let key = format!("{}|{}", request.video_path.display(), request.title);
        let video_id = format!("dryrun-{}", &hashing::hash_str(&key)[..11]);
        Ok(UploadResult {
            video_url: format!("https://example.invalid/watch?v={video_id}"),
            video_id,
        })
    }
}

/// Result of [`publish_episode`].
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    /// `true` when the episode already had a video and `force` was not set.
    pub skipped: bool,
    pub video_id: String,
    pub video_url: Option<String>,
    pub job_id: Option<PublishJobId>,
    pub report: Option<SafetyReport>,
}

/// Run the safety checks for an episode without publishing.
pub fn run_safety_checks(
    conn: &Connection,
    config: &Config,
    episode_id: EpisodeId,
) -> Result<SafetyReport> {
    let episode = episodes::require_episode(conn, episode_id)?;
    let ctx = SafetyContext {
        conn,
        config,
        episode: &episode,
        republish: false,
    };
    Ok(SafetyPipeline::standard().run(&ctx))
}

/// Publish an approved episode's rendered video.
///
/// An episode that already has a video id is skipped unless `force` is set;
/// a forced publish uploads again under a new job. Failing safety checks
/// abort before any publish job is created.
pub fn publish_episode(
    conn: &Connection,
    config: &Config,
    workspace: &EpisodeWorkspace,
    uploader: &dyn Uploader,
    force: bool,
) -> Result<PublishOutcome> {
    let episode = episodes::require_episode(conn, workspace.episode_id())?;

    if let Some(video_id) = episode.youtube_video_id.as_ref().filter(|_| !force) {
        tracing::info!("Episode {} already published as {video_id}; skipping", episode.id);
        return Ok(PublishOutcome {
            skipped: true,
            video_id: video_id.clone(),
            video_url: episode.youtube_url.clone(),
            job_id: None,
            report: None,
        });
    }

    let ctx = SafetyContext {
        conn,
        config,
        episode: &episode,
        republish: force && episode.status == EpisodeStatus::Published,
    };
    let report = SafetyPipeline::standard().run(&ctx);
    report.ensure_passed()?;

    let request = UploadRequest {
        video_path: render_output(workspace),
        title: episode.title.clone(),
        description: episode.description.clone(),
        tags: episode.tags.clone(),
        category: config.publish.category.clone(),
        language: config.publish.language.clone(),
        privacy: config.publish.privacy.clone(),
        thumbnail_path: thumbnail(workspace),
    };

    let job = publish_jobs::create_job(conn, episode.id)?;
    publish_jobs::mark_uploading(conn, job.id)?;
    tracing::info!("Uploading episode {} (job {})", episode.id, job.id);

    let progress = |fraction: f64| {
        tracing::debug!("Upload {}: {:.0}%", job.id, fraction * 100.0);
    };
    let uploaded = match uploader.upload(&request, &progress) {
        Ok(u) => u,
        Err(e) => {
            tracing::error!("Upload failed for episode {}: {e}", episode.id);
            let message = e.to_string();
            publish_jobs::mark_failed(conn, job.id, &message)?;
            episodes::set_error(conn, episode.id, &format!("publish: {message}"))?;
            return Err(e);
        }
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;
    publish_jobs::mark_published(&tx, job.id, &uploaded.video_id, &uploaded.video_url)?;
    episodes::mark_published(&tx, episode.id, &uploaded.video_id, &uploaded.video_url)?;
    tx.commit().map_err(|e| Error::database(e.to_string()))?;

    tracing::info!("Published episode {} as {}", episode.id, uploaded.video_url);
    Ok(PublishOutcome {
        skipped: false,
        video_id: uploaded.video_id,
        video_url: Some(uploaded.video_url),
        job_id: Some(job.id),
        report: Some(report),
    })
}

fn render_output(workspace: &EpisodeWorkspace) -> PathBuf {
    workspace.stage_file(Stage::Render, render::VIDEO_FILE)
}

/// First chapter image, if images were generated.
fn thumbnail(workspace: &EpisodeWorkspace) -> Option<PathBuf> {
    let dir = workspace.stage_dir(Stage::Images);
    images::read_manifest(&dir.join(images::MANIFEST_FILE))
        .ok()
        .and_then(|m| m.images.into_iter().next())
        .map(|img| dir.join(img.file))
        .filter(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_run_is_deterministic() {
        let request = UploadRequest {
            video_path: PathBuf::from("/data/video.mp4"),
            title: "Pilot".into(),
            description: "d".into(),
            tags: vec!["t".into()],
            category: "27".into(),
            language: "en".into(),
            privacy: "private".into(),
            thumbnail_path: None,
        };
        let seen = std::cell::Cell::new(0.0);
        let a = DryRunUploader.upload(&request, &|f| seen.set(f)).unwrap();
        let b = DryRunUploader.upload(&request, &|_| {}).unwrap();
        assert_eq!(a, b);
        assert!(a.video_id.starts_with("dryrun-"));
        assert!(a.video_url.ends_with(&a.video_id));
        assert!((seen.get() - 1.0).abs() < f64::EPSILON);
    }
}
