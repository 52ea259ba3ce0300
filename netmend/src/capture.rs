//! Running-configuration capture.
//!
//! `show running-config` output is framed by a start marker
//! (`Building configuration...` / `Current configuration : N bytes`) and the
//! bare device prompt that follows the last line. Only what lies between the
//! two is kept; if either is missing the capture fails and nothing is
//! written.

use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::channel::Session;
use crate::config::DeviceProfile;
use crate::driver::acquire_privileged;
use crate::error::{CaptureError, Result};
use crate::normalize::{CanonicalConfig, ConfigFile};
use crate::transport::Transport;

const START_MARKERS: [&str; 2] = ["Current configuration", "Building configuration"];

/// Which side of the comparison a capture is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureKind {
    /// The trusted baseline, taken before the wipe.
    Golden,
    /// The live configuration after re-initialization.
    Current,
}

impl CaptureKind {
    /// Artifact file name prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureKind::Golden => "golden",
            CaptureKind::Current => "current",
        }
    }
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The configuration body of one `show running-config`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCapture {
    /// Device the capture came from.
    pub device: String,
    /// Golden or current.
    pub kind: CaptureKind,
    /// Lines between the start marker and the closing prompt.
    pub body: Vec<String>,
}

impl RawCapture {
    /// The body as artifact text.
    pub fn text(&self) -> String {
        self.body.join("\n")
    }

    /// Normalize the body without touching the filesystem.
    pub fn canonical(&self) -> CanonicalConfig {
        CanonicalConfig::from_raw(&self.text())
    }
}

/// Cut the configuration body out of raw command output.
///
/// Scanning starts after a line containing a start marker and stops at the
/// first later line that, trimmed, is a single token ending in `#` and not a
/// comment: the device prompt.
pub fn extract_config_body(raw: &str) -> Result<Vec<String>> {
    let mut body = Vec::new();
    let mut started = false;

    for line in raw.split('\n') {
        let line = line.trim_end_matches('\r');
        if START_MARKERS.iter().any(|m| line.contains(m)) {
            started = true;
            continue;
        }
        if !started {
            continue;
        }
        if is_terminator(line) {
            return Ok(body);
        }
        body.push(line.to_string());
    }

    if started {
        Err(CaptureError::TerminatorNotFound { lines: body.len() }.into())
    } else {
        Err(CaptureError::StartMarkerNotFound { bytes: raw.len() }.into())
    }
}

fn is_terminator(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty()
        && trimmed.ends_with('#')
        && !trimmed.starts_with('!')
        && trimmed.split_whitespace().count() == 1
}

/// Capture the running configuration over `session`.
///
/// Reaches privileged mode, disables paging, then reads the output of
/// `show running-config` up to the profile's byte budget.
pub async fn capture_running_config<T: Transport>(
    session: &mut Session<T>,
    kind: CaptureKind,
    profile: &DeviceProfile,
) -> Result<RawCapture> {
    acquire_privileged(session, None).await?;

    let prompt = session.prompts().privileged.clone();
    let timeout = session.timing().read_timeout();

    session.send("terminal length 0").await?;
    session.read_until_match(&prompt, timeout).await?;

    session.send("show running-config").await?;
    let raw = session
        .read_budgeted(&prompt, profile.capture_read_bytes, timeout)
        .await?;
    debug!("[{}] captured {} bytes", session.device(), raw.len());

    let body = extract_config_body(&raw)?;
    info!(
        "[{}] {} configuration captured ({} lines)",
        session.device(),
        kind,
        body.len()
    );
    Ok(RawCapture {
        device: session.device().to_string(),
        kind,
        body,
    })
}

/// Directory holding the per-device capture artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Store artifacts under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Artifact directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<kind>_running_config_<device>.txt`
    pub fn path_for(&self, kind: CaptureKind, device: &str) -> PathBuf {
        self.dir
            .join(format!("{}_running_config_{}.txt", kind.as_str(), device))
    }

    /// Write a capture body verbatim.
    pub fn write(&self, capture: &RawCapture) -> Result<PathBuf> {
        let path = self.path_for(capture.kind, &capture.device);
        std::fs::create_dir_all(&self.dir).map_err(|source| CaptureError::Artifact {
            path: self.dir.clone(),
            source,
        })?;
        std::fs::write(&path, capture.text()).map_err(|source| CaptureError::Artifact {
            path: path.clone(),
            source,
        })?;
        debug!("wrote {}", path.display());
        Ok(path)
    }

    /// Normalize an artifact in place and return its canonical form.
    pub fn normalize(&self, kind: CaptureKind, device: &str) -> Result<CanonicalConfig> {
        let mut file = ConfigFile::open(self.path_for(kind, device))?;
        file.reduce_config();
        file.rewrite_file()?;
        Ok(file.canonical())
    }

    /// Write a capture, then read it back normalized.
    pub fn round_trip(&self, capture: &RawCapture) -> Result<CanonicalConfig> {
        self.write(capture)?;
        self.normalize(capture.kind, &capture.device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingProfile;
    use crate::transport::ScriptedTransport;

    const SHOW_RUN: &str = "show running-config\r\n\
Building configuration...\r\n\r\nCurrent configuration : 812 bytes\r\n!\r\nhostname Router1\r\n\
interface Ethernet0/0\r\n ip address 10.0.0.1 255.255.255.0\r\nend\r\n\r\nRouter1#";

    #[test]
    fn test_extract_between_markers() {
        let body = extract_config_body(SHOW_RUN).unwrap();
        assert_eq!(
            body,
            vec![
                "",
                "!",
                "hostname Router1",
                "interface Ethernet0/0",
                " ip address 10.0.0.1 255.255.255.0",
                "end",
                "",
            ]
        );
    }

    #[test]
    fn test_comment_and_multi_token_lines_do_not_terminate() {
        let raw = "Current configuration : 10 bytes\n! ends with #\nbanner motd #hi#\nR1#";
        let body = extract_config_body(raw).unwrap();
        assert_eq!(body, vec!["! ends with #", "banner motd #hi#"]);
    }

    #[test]
    fn test_missing_start_marker() {
        let err = extract_config_body("% Invalid input\r\nRouter#").unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Capture(CaptureError::StartMarkerNotFound { .. })
        ));
    }

    #[test]
    fn test_missing_terminator() {
        let err = extract_config_body("Building configuration...\nhostname R1\n").unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Capture(CaptureError::TerminatorNotFound { lines: 2 })
        ));
    }

    #[tokio::test]
    async fn test_capture_over_session() {
        let transport = ScriptedTransport::new()
            .with_default_reply("\r\nRouter1#")
            .reply_to("terminal length 0", "terminal length 0\r\nRouter1#")
            .reply_to("show running-config", SHOW_RUN);
        let log = transport.sent_log();
        let mut session = Session::from_transport(transport, "10.0.0.1", 5021)
            .with_device("R1")
            .with_timing(TimingProfile::immediate());

        let capture = capture_running_config(&mut session, CaptureKind::Golden, &DeviceProfile::immediate())
            .await
            .unwrap();
        assert_eq!(capture.device, "R1");
        assert!(capture.body.contains(&String::from("hostname Router1")));
        assert_eq!(
            log.commands(),
            vec!["terminal length 0", "show running-config"]
        );

        let canonical = capture.canonical();
        assert_eq!(canonical.lines()[0], "hostname Router1");
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_capture_failure_writes_nothing() {
        let transport = ScriptedTransport::new()
            .with_default_reply("\r\nRouter1#")
            .reply_to("show running-config", "show running-config\r\n% Invalid input\r\nRouter1#");
        let mut session = Session::from_transport(transport, "10.0.0.1", 5021)
            .with_timing(TimingProfile::immediate());

        let err = capture_running_config(&mut session, CaptureKind::Current, &DeviceProfile::immediate())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::Capture(_)));
        session.close().await.unwrap();
    }

    #[test]
    fn test_artifact_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("captures"));
        let capture = RawCapture {
            device: String::from("IOU1"),
            kind: CaptureKind::Golden,
            body: extract_config_body(SHOW_RUN).unwrap(),
        };

        let path = store.write(&capture).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "golden_running_config_IOU1.txt"
        );
        assert_eq!(std::fs::read_to_string(&path).unwrap(), capture.text());

        let canonical = store.normalize(CaptureKind::Golden, "IOU1").unwrap();
        assert_eq!(canonical, capture.canonical());
        // Rewritten in canonical form
        assert_eq!(std::fs::read_to_string(&path).unwrap(), canonical.to_text());
    }
}
