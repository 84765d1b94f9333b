//! External video playback delegate.
//!
//! Videos are handed to an external player binary and treated as opaque: the
//! loop polls for completion each tick and ends the item on whichever comes
//! first, natural exit or the configured duration ceiling. A launch failure
//! or nonzero exit is a warning and a skip, never fatal.

use std::io;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};

use anyhow::{Result, bail};
use tracing::{debug, info, warn};

use crate::config::Configuration;

/// A fully resolved delegate invocation, kept separate from process spawning
/// so flag selection stays unit-testable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl DelegateSpec {
    fn new(program: &str, args: &[&str], media: &Path) -> Self {
        let mut args: Vec<String> = args.iter().map(|a| (*a).to_string()).collect();
        args.push(media.to_string_lossy().into_owned());
        Self {
            program: program.to_string(),
            args,
        }
    }
}

/// Candidate invocations in order of preference. OMXPlayer first for
/// hardware-accelerated decode on the Pi, then VLC as the portable fallback.
pub fn delegate_candidates(cfg: &Configuration, media: &Path) -> Vec<DelegateSpec> {
    let mut candidates = Vec::new();
    if cfg.raspberry_pi.use_omxplayer && cfg.hardware_acceleration {
        candidates.push(DelegateSpec::new(
            "omxplayer",
            &[
                "--no-osd",
                "--no-keys",
                "--aspect-mode",
                "letterbox",
                "--vol",
                "0",
            ],
            media,
        ));
    }
    if cfg.raspberry_pi.use_vlc {
        let mut args = vec!["--intf", "dummy", "--no-audio"];
        if cfg.fullscreen {
            args.push("--fullscreen");
        }
        args.push("--play-and-exit");
        candidates.push(DelegateSpec::new("cvlc", &args, media));
    }
    candidates
}

/// A running external player process. At most one is outstanding at a time.
#[derive(Debug)]
pub struct Delegate {
    child: Child,
    program: String,
}

impl Delegate {
    /// Launch a single candidate invocation.
    pub fn launch(spec: &DelegateSpec) -> io::Result<Self> {
        let child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        debug!(program = %spec.program, pid = child.id(), "video delegate launched");
        Ok(Self {
            child,
            program: spec.program.clone(),
        })
    }

    /// Non-blocking completion poll. `Some(status)` once the delegate has
    /// exited; the exit status is informational only.
    pub fn try_finished(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Terminate and reap the delegate. Used on quit and when the duration
    /// ceiling expires before natural exit. Asks politely first and kills
    /// only if the player ignores the request.
    pub fn terminate(&mut self) {
        match self.child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) => {}
            Err(err) => {
                warn!(program = %self.program, "delegate status poll failed: {err}");
            }
        }
        if self.request_exit() {
            debug!(program = %self.program, "video delegate terminated");
            return;
        }
        if let Err(err) = self.child.kill() {
            warn!(program = %self.program, "failed to terminate delegate: {err}");
        }
        let _ = self.child.wait();
        debug!(program = %self.program, "video delegate killed");
    }

    /// Send SIGTERM and give the player a short grace period to exit.
    /// Returns true once the child has been reaped.
    #[cfg(unix)]
    fn request_exit(&mut self) -> bool {
        let pid = self.child.id() as libc::pid_t;
        if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
            return false;
        }
        for _ in 0..Self::GRACE_POLLS {
            if matches!(self.child.try_wait(), Ok(Some(_))) {
                return true;
            }
            std::thread::sleep(Self::GRACE_STEP);
        }
        false
    }

    #[cfg(not(unix))]
    fn request_exit(&mut self) -> bool {
        false
    }

    #[cfg(unix)]
    const GRACE_POLLS: u32 = 10;
    #[cfg(unix)]
    const GRACE_STEP: std::time::Duration = std::time::Duration::from_millis(50);

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Drop for Delegate {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Try each enabled delegate in order until one launches.
pub fn spawn_delegate(cfg: &Configuration, media: &Path) -> Result<Delegate> {
    let candidates = delegate_candidates(cfg, media);
    if candidates.is_empty() {
        bail!("no video delegate is enabled in the configuration");
    }
    for spec in &candidates {
        match Delegate::launch(spec) {
            Ok(delegate) => {
                info!(program = %spec.program, media = %media.display(), "playing video");
                return Ok(delegate);
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(program = %spec.program, "video player not installed; trying next");
            }
            Err(err) => {
                warn!(program = %spec.program, "video player failed to launch: {err}");
            }
        }
    }
    bail!("no enabled video player could be launched for {}", media.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn media() -> PathBuf {
        PathBuf::from("/ads/clip.mp4")
    }

    #[test]
    fn omxplayer_is_preferred_with_hardware_acceleration() {
        let cfg = Configuration::default();
        let candidates = delegate_candidates(&cfg, &media());
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].program, "omxplayer");
        assert!(candidates[0].args.contains(&"--no-osd".to_string()));
        assert!(candidates[0].args.contains(&"--no-keys".to_string()));
        assert_eq!(candidates[0].args.last().unwrap(), "/ads/clip.mp4");
        assert_eq!(candidates[1].program, "cvlc");
    }

    #[test]
    fn disabling_hardware_acceleration_skips_omxplayer() {
        let cfg = Configuration {
            hardware_acceleration: false,
            ..Configuration::default()
        };
        let candidates = delegate_candidates(&cfg, &media());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].program, "cvlc");
    }

    #[test]
    fn fullscreen_flag_reaches_vlc() {
        let mut cfg = Configuration::default();
        cfg.fullscreen = false;
        let candidates = delegate_candidates(&cfg, &media());
        let vlc = candidates.iter().find(|c| c.program == "cvlc").unwrap();
        assert!(!vlc.args.contains(&"--fullscreen".to_string()));
        assert!(vlc.args.contains(&"--play-and-exit".to_string()));
    }

    #[test]
    fn all_delegates_disabled_yields_no_candidates() {
        let mut cfg = Configuration::default();
        cfg.raspberry_pi.use_omxplayer = false;
        cfg.raspberry_pi.use_vlc = false;
        assert!(delegate_candidates(&cfg, &media()).is_empty());
        assert!(spawn_delegate(&cfg, &media()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn natural_exit_is_observed_by_polling() {
        let spec = DelegateSpec {
            program: "true".to_string(),
            args: Vec::new(),
        };
        let mut delegate = Delegate::launch(&spec).unwrap();
        let status = loop {
            if let Some(status) = delegate.try_finished().unwrap() {
                break status;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        };
        assert!(status.success());
    }

    #[cfg(unix)]
    #[test]
    fn terminate_reaps_a_long_running_delegate() {
        let spec = DelegateSpec {
            program: "sleep".to_string(),
            args: vec!["30".to_string()],
        };
        let mut delegate = Delegate::launch(&spec).unwrap();
        delegate.terminate();
        // Terminated delegates report an exit status immediately.
        assert!(delegate.try_finished().unwrap().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn terminate_kills_a_delegate_that_ignores_the_exit_request() {
        let spec = DelegateSpec {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), r#"trap "" TERM; sleep 30"#.to_string()],
        };
        let mut delegate = Delegate::launch(&spec).unwrap();
        // Let the shell install its trap before asking it to exit.
        std::thread::sleep(std::time::Duration::from_millis(200));
        delegate.terminate();
        assert!(delegate.try_finished().unwrap().is_some());
    }
}
