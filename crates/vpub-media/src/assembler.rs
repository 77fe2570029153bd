//! Slideshow assembly: fetch images, write a thumbnail, encode a video.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageFormat};
use reqwest::Client;
use tokio::sync::watch;
use tracing::{debug, info};
use url::Url;
use vpub_models::Job;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Browser-like agent; some image hosts refuse unknown clients.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/41.0.2227.0 Safari/537.36";

/// Image sequence pattern read by the encoder.
pub const FRAME_PATTERN: &str = "image-%03d.png";

/// Local files produced for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMedia {
    pub video: PathBuf,
    pub thumbnail: PathBuf,
}

/// Turns a job's image URLs into a local video and thumbnail.
#[async_trait]
pub trait MediaAssembler: Send + Sync {
    /// Build the media for `job` inside `workspace`.
    async fn assemble(&self, job: &Job, workspace: &Path) -> MediaResult<AssembledMedia>;
}

/// Slideshow encoding parameters.
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Seconds each image stays on screen
    pub frame_seconds: u32,
    /// Output height; width follows the aspect ratio
    pub output_height: u32,
    pub crf: u8,
    pub preset: String,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    /// JPEG quality of the thumbnail (1-100)
    pub thumbnail_quality: u8,
    /// Closing image appended after the job's frames
    pub end_card: Option<PathBuf>,
    /// How many times the closing frame is repeated
    pub end_card_repeats: u32,
    pub user_agent: String,
    /// Per-image download timeout
    pub fetch_timeout: Duration,
    /// Encoder timeout in seconds
    pub ffmpeg_timeout_secs: u64,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            frame_seconds: 7,
            output_height: 720,
            crf: 18,
            preset: "slow".to_string(),
            thumbnail_width: 1280,
            thumbnail_height: 720,
            thumbnail_quality: 95,
            end_card: None,
            end_card_repeats: 2,
            user_agent: BROWSER_USER_AGENT.to_string(),
            fetch_timeout: Duration::from_secs(30),
            ffmpeg_timeout_secs: 1800,
        }
    }
}

impl AssemblerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            end_card: std::env::var("VPUB_END_CARD").ok().map(PathBuf::from),
            fetch_timeout: Duration::from_secs(
                std::env::var("VPUB_FETCH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            ffmpeg_timeout_secs: std::env::var("VPUB_FFMPEG_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.ffmpeg_timeout_secs),
            ..defaults
        }
    }
}

/// Path of frame `index` inside `dir`.
pub fn frame_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("image-{:03}.png", index))
}

/// Resize to exactly `width`x`height`, drop alpha and save as JPEG.
pub fn write_thumbnail(
    image: &DynamicImage,
    path: &Path,
    width: u32,
    height: u32,
    quality: u8,
) -> MediaResult<()> {
    let rgb = image
        .resize_exact(width, height, FilterType::Lanczos3)
        .to_rgb8();

    let mut writer = std::io::BufWriter::new(std::fs::File::create(path)?);
    JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100)).encode(
        rgb.as_raw(),
        width,
        height,
        ColorType::Rgb8,
    )?;
    writer.flush()?;
    Ok(())
}

/// [`MediaAssembler`] that renders the job's images as a slideshow.
pub struct SlideshowAssembler {
    http: Client,
    config: AssemblerConfig,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl SlideshowAssembler {
    pub fn new(config: AssemblerConfig) -> MediaResult<Self> {
        let http = Client::builder()
            .timeout(config.fetch_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| MediaError::internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            cancel_rx: None,
        })
    }

    /// Set cancellation signal for the encoder.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    async fn download(&self, url: &Url) -> MediaResult<Vec<u8>> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| MediaError::download_failed(url.as_str(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::download_failed(
                url.as_str(),
                format!("HTTP {}", status.as_u16()),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MediaError::download_failed(url.as_str(), e.to_string()))?;
        Ok(bytes.to_vec())
    }

    /// Fetch every image, write the thumbnail and the numbered frames.
    ///
    /// Returns the number of frame files written, closing frames included.
    pub async fn write_frames(&self, job: &Job, dir: &Path) -> MediaResult<usize> {
        if job.image_urls.is_empty() {
            return Err(MediaError::NoImages);
        }

        let thumbnail = dir.join("thumbnail.jpg");

        for (index, url) in job.image_urls.iter().enumerate() {
            debug!(job_id = %job.id, url = %url, "Downloading image");
            let bytes = self.download(url).await?;

            let frame = frame_path(dir, index);
            let thumbnail = (index == 0).then(|| thumbnail.clone());
            let (width, height, quality) = (
                self.config.thumbnail_width,
                self.config.thumbnail_height,
                self.config.thumbnail_quality,
            );

            tokio::task::spawn_blocking(move || -> MediaResult<()> {
                let image = image::load_from_memory(&bytes)?;
                if let Some(path) = thumbnail {
                    write_thumbnail(&image, &path, width, height, quality)?;
                }
                image.save_with_format(&frame, ImageFormat::Png)?;
                Ok(())
            })
            .await
            .map_err(|e| MediaError::internal(format!("image task failed: {}", e)))??;
        }

        let mut count = job.image_urls.len();
        let closing = match &self.config.end_card {
            Some(end_card) => {
                if !tokio::fs::try_exists(end_card).await? {
                    return Err(MediaError::FileNotFound(end_card.clone()));
                }
                end_card.clone()
            }
            None => frame_path(dir, count - 1),
        };

        for _ in 0..self.config.end_card_repeats {
            tokio::fs::copy(&closing, frame_path(dir, count)).await?;
            count += 1;
        }

        Ok(count)
    }

    /// Encoder invocation for the frames in `dir`.
    pub fn encode_command(&self, dir: &Path) -> FfmpegCommand {
        FfmpegCommand::new(dir.join(FRAME_PATTERN), dir.join("output.mp4"))
            .frame_duration(self.config.frame_seconds)
            .video_codec("libx264")
            .preset(self.config.preset.clone())
            .crf(self.config.crf)
            .pixel_format("yuv420p")
            .video_filter(format!("scale=-2:{}", self.config.output_height))
    }
}

#[async_trait]
impl MediaAssembler for SlideshowAssembler {
    async fn assemble(&self, job: &Job, workspace: &Path) -> MediaResult<AssembledMedia> {
        let frames = self.write_frames(job, workspace).await?;

        let cmd = self.encode_command(workspace);
        let mut runner = FfmpegRunner::new().with_timeout(self.config.ffmpeg_timeout_secs);
        if let Some(cancel_rx) = &self.cancel_rx {
            runner = runner.with_cancel(cancel_rx.clone());
        }

        info!(job_id = %job.id, title = %job.title, frames, "Starting to create video");
        runner.run(&cmd).await?;

        let video = cmd.output().to_path_buf();
        let size = tokio::fs::metadata(&video)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if size == 0 {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg produced no output",
                None,
                None,
            ));
        }

        info!(job_id = %job.id, bytes = size, "Video created (not uploaded yet)");
        Ok(AssembledMedia {
            video,
            thumbnail: workspace.join("thumbnail.jpg"),
        })
    }
}
