//! GDAS analysis download with retry and integrity checks.
//!
//! - Streams to a `.partial` file next to the destination
//! - Verifies Content-Length and the GRIB magic before the final rename
//! - Retries with exponential backoff

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::Client;
use tensor_prep::PressureLevels;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

/// Top-level directory created under the download directory.
pub const DATA_DIR_NAME: &str = "noaa-gfs-bdp-pds-data";

const S3_BASE_URL: &str = "https://noaa-gfs-bdp-pds.s3.amazonaws.com";
const NOMADS_BASE_URL: &str = "https://nomads.ncep.noaa.gov/cgi-bin/filter_fnl.pl";

/// Where GDAS analyses are fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadSource {
    /// NOAA open data bucket (full file).
    S3,
    /// NOMADS grib filter (only the required variables and levels).
    Nomads,
}

impl FromStr for DownloadSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "s3" => Ok(DownloadSource::S3),
            "nomads" => Ok(DownloadSource::Nomads),
            other => bail!("unknown download source '{}' (expected s3 or nomads)", other),
        }
    }
}

impl fmt::Display for DownloadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadSource::S3 => f.write_str("s3"),
            DownloadSource::Nomads => f.write_str("nomads"),
        }
    }
}

/// One analysis file to fetch.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub analysis_time: DateTime<Utc>,
    pub source: DownloadSource,
    pub levels: PressureLevels,
}

impl DownloadRequest {
    fn date(&self) -> String {
        self.analysis_time.format("%Y%m%d").to_string()
    }

    fn hour(&self) -> String {
        self.analysis_time.format("%H").to_string()
    }

    pub fn file_name(&self) -> String {
        format!("gdas.t{}z.pgrb2.0p25.f000", self.hour())
    }

    /// `<download_dir>/noaa-gfs-bdp-pds-data/YYYYMMDD/HH/gdas.tHHz.pgrb2.0p25.f000`
    pub fn local_path(&self, download_dir: &Path) -> PathBuf {
        download_dir
            .join(DATA_DIR_NAME)
            .join(self.date())
            .join(self.hour())
            .join(self.file_name())
    }

    pub fn url(&self, config: &DownloadConfig) -> String {
        match self.source {
            DownloadSource::S3 => format!(
                "{}/gdas.{}/{}/atmos/{}",
                config.s3_base_url.trim_end_matches('/'),
                self.date(),
                self.hour(),
                self.file_name()
            ),
            DownloadSource::Nomads => {
                let mut url = format!(
                    "{}?dir=%2Fgdas.{}%2F{}%2Fatmos&file={}",
                    config.nomads_base_url,
                    self.date(),
                    self.hour(),
                    self.file_name()
                );
                for var in ["HGT", "PRMSL", "SPFH", "TMP", "UGRD", "VGRD"] {
                    url.push_str(&format!("&var_{}=on", var));
                }
                for level in ["2_m_above_ground", "10_m_above_ground", "mean_sea_level"] {
                    url.push_str(&format!("&lev_{}=on", level));
                }
                for pressure in self.levels.levels() {
                    url.push_str(&format!("&lev_{}_mb=on", pressure));
                }
                url
            }
        }
    }
}

/// Configuration for the download manager.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial retry delay (doubles each retry)
    pub initial_retry_delay: Duration,
    /// Maximum retry delay
    pub max_retry_delay: Duration,
    /// HTTP request timeout
    pub request_timeout: Duration,
    pub s3_base_url: String,
    pub nomads_base_url: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_retry_delay: Duration::from_secs(2),
            max_retry_delay: Duration::from_secs(120),
            request_timeout: Duration::from_secs(1800), // full 0.25 degree file is ~500 MB
            s3_base_url: S3_BASE_URL.to_string(),
            nomads_base_url: NOMADS_BASE_URL.to_string(),
        }
    }
}

/// Downloads analysis files with retry support.
pub struct DownloadManager {
    client: Client,
    config: DownloadConfig,
}

impl DownloadManager {
    pub fn new(config: DownloadConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    /// Fetch `request` into `download_dir` and return the local path.
    ///
    /// An existing complete file is reused.
    #[instrument(skip(self, request), fields(source = %request.source, time = %request.analysis_time.format("%Y%m%d%H")))]
    pub async fn download(&self, request: &DownloadRequest, download_dir: &Path) -> Result<PathBuf> {
        let final_path = request.local_path(download_dir);
        let url = request.url(&self.config);

        if final_path.exists() && verify_grib(&final_path).await.is_ok() {
            info!(path = %final_path.display(), "File already exists, skipping download");
            return Ok(final_path);
        }

        let parent = final_path
            .parent()
            .ok_or_else(|| anyhow!("{} has no parent directory", final_path.display()))?;
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;

        let temp_path = parent.join(format!("{}.partial", request.file_name()));

        info!(url = %url, path = %final_path.display(), "Starting download");

        let mut retry_count = 0;
        let mut delay = self.config.initial_retry_delay;

        loop {
            let attempt = async {
                let bytes = self.fetch(&url, &temp_path).await?;
                verify_grib(&temp_path).await?;
                Ok::<u64, anyhow::Error>(bytes)
            }
            .await;

            match attempt {
                Ok(bytes) => {
                    // Fall back to copy+delete when rename crosses filesystems
                    if fs::rename(&temp_path, &final_path).await.is_err() {
                        fs::copy(&temp_path, &final_path).await?;
                        fs::remove_file(&temp_path).await?;
                    }

                    info!(path = %final_path.display(), bytes, "Download completed");
                    return Ok(final_path);
                }
                Err(e) => {
                    retry_count += 1;

                    if retry_count > self.config.max_retries {
                        fs::remove_file(&temp_path).await.ok();
                        return Err(anyhow!(
                            "Download of {} failed after {} attempts: {}",
                            url,
                            retry_count,
                            e
                        ));
                    }

                    warn!(
                        error = %e,
                        retry = retry_count,
                        max_retries = self.config.max_retries,
                        delay_secs = delay.as_secs(),
                        "Download failed, retrying"
                    );

                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, self.config.max_retry_delay);
                }
            }
        }
    }

    /// Stream `url` into `path`, replacing any previous content.
    async fn fetch(&self, url: &str, path: &Path) -> Result<u64> {
        let response = self.client.get(url).send().await.context("HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("HTTP error: {}", status);
        }
        let expected = response.content_length();

        let mut file = File::create(path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;

        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Error reading response chunk")?;
            file.write_all(&chunk).await.context("Error writing to file")?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;

        if let Some(expected) = expected {
            if written != expected {
                bail!(
                    "Download size mismatch: expected {} bytes, got {}",
                    expected,
                    written
                );
            }
        }

        debug!(bytes = written, "Response body written");
        Ok(written)
    }
}

/// Fail unless `path` starts with the GRIB indicator.
pub async fn verify_grib(path: &Path) -> Result<()> {
    let mut file = File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)
        .await
        .with_context(|| format!("{} is empty or truncated", path.display()))?;
    if &magic != b"GRIB" {
        bail!("{} is not a GRIB file", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn request(source: DownloadSource) -> DownloadRequest {
        DownloadRequest {
            analysis_time: Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap(),
            source,
            levels: PressureLevels::L13,
        }
    }

    /// Serve `body` with `status` to every connection.
    async fn serve(status: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let body = body.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let head = format!(
                        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        status,
                        body.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{}", addr)
    }

    fn config(base: &str) -> DownloadConfig {
        DownloadConfig {
            max_retries: 1,
            initial_retry_delay: Duration::from_millis(10),
            max_retry_delay: Duration::from_millis(20),
            request_timeout: Duration::from_secs(10),
            s3_base_url: base.to_string(),
            nomads_base_url: format!("{}/filter", base),
        }
    }

    #[test]
    fn test_s3_url() {
        let url = request(DownloadSource::S3).url(&DownloadConfig::default());
        assert_eq!(
            url,
            "https://noaa-gfs-bdp-pds.s3.amazonaws.com/gdas.20240115/06/atmos/gdas.t06z.pgrb2.0p25.f000"
        );
    }

    #[test]
    fn test_nomads_url_selects_levels() {
        let url = request(DownloadSource::Nomads).url(&DownloadConfig::default());
        assert!(url.starts_with("https://nomads.ncep.noaa.gov/cgi-bin/filter_fnl.pl?dir=%2Fgdas.20240115%2F06%2Fatmos"));
        assert!(url.contains("&var_PRMSL=on"));
        assert!(url.contains("&lev_mean_sea_level=on"));
        assert!(url.contains("&lev_1000_mb=on"));
        assert!(!url.contains("&lev_975_mb=on"));

        let mut req = request(DownloadSource::Nomads);
        req.levels = PressureLevels::L37;
        assert!(req.url(&DownloadConfig::default()).contains("&lev_975_mb=on"));
    }

    #[test]
    fn test_local_layout() {
        let path = request(DownloadSource::S3).local_path(Path::new("/data"));
        assert_eq!(
            path,
            PathBuf::from("/data/noaa-gfs-bdp-pds-data/20240115/06/gdas.t06z.pgrb2.0p25.f000")
        );
    }

    #[test]
    fn test_source_parsing() {
        assert_eq!("S3".parse::<DownloadSource>().unwrap(), DownloadSource::S3);
        assert_eq!("nomads".parse::<DownloadSource>().unwrap(), DownloadSource::Nomads);
        assert!("ftp".parse::<DownloadSource>().is_err());
    }

    #[tokio::test]
    async fn test_download_writes_complete_file() {
        let mut body = b"GRIB".to_vec();
        body.extend_from_slice(&[0u8; 1024]);
        let base = serve("200 OK", body.clone()).await;

        let dir = tempfile::tempdir().unwrap();
        let manager = DownloadManager::new(config(&base)).unwrap();
        let path = manager
            .download(&request(DownloadSource::S3), dir.path())
            .await
            .unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), body);
        assert!(!path.with_file_name("gdas.t06z.pgrb2.0p25.f000.partial").exists());
    }

    #[tokio::test]
    async fn test_http_error_fails_after_retries() {
        let base = serve("404 Not Found", b"missing".to_vec()).await;
        let dir = tempfile::tempdir().unwrap();
        let manager = DownloadManager::new(config(&base)).unwrap();
        let err = manager
            .download(&request(DownloadSource::S3), dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
        assert!(!request(DownloadSource::S3).local_path(dir.path()).exists());
    }

    #[tokio::test]
    async fn test_non_grib_body_rejected() {
        let base = serve("200 OK", b"<html>maintenance</html>".to_vec()).await;
        let dir = tempfile::tempdir().unwrap();
        let manager = DownloadManager::new(config(&base)).unwrap();
        let err = manager
            .download(&request(DownloadSource::Nomads), dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a GRIB file"));
    }

    #[test]
    fn test_verify_grib_on_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();
        assert!(tokio_test::block_on(verify_grib(&path)).is_err());
    }
}
