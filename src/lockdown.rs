//! Scoped GPU clock lockdown
//!
//! A [`LockdownScope`] pins the device to a fixed operating point for the
//! lifetime of a benchmark batch and restores it exactly once, whether the
//! scope is released explicitly, dropped during unwinding, or torn down by
//! the signal handler through [`release_live_scopes`].

use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Lockdown errors
#[derive(Debug, Error)]
pub enum LockdownError {
    /// Another scope is live; carries the holder's device
    #[error("lockdown already held for device {0}")]
    AlreadyHeld(String),

    /// The control command could not be started
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The control command exited unsuccessfully
    #[error("{command} exited with {status:?}: {stderr}")]
    Command {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    /// The control command printed something unexpected
    #[error("unexpected output from {command}: {output:?}")]
    Parse { command: String, output: String },
}

/// Pins and restores a device operating point
pub trait ClockControl: Send + Sync {
    /// Device this control acts on
    fn device(&self) -> &str;

    /// Pin the operating point
    fn pin(&self) -> Result<(), LockdownError>;

    /// Return the device to its default operating point
    fn restore(&self) -> Result<(), LockdownError>;
}

/// [`ClockControl`] backed by `nvidia-smi`
#[derive(Debug, Clone)]
pub struct NvidiaSmi {
    device: String,
    index: u32,
}

impl NvidiaSmi {
    /// Control for a device string such as `cuda`, `cuda:1` or `1`
    pub fn for_device(device: &str) -> Self {
        Self {
            device: device.to_string(),
            index: device_index(device),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, LockdownError> {
        let index = self.index.to_string();
        let command = format!("nvidia-smi -i {} {}", index, args.join(" "));
        tracing::debug!(%command, "running clock control");

        let output = Command::new("nvidia-smi")
            .arg("-i")
            .arg(&index)
            .args(args)
            .output()
            .map_err(|source| LockdownError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(LockdownError::Command {
                command,
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn max_sm_clock(&self) -> Result<u32, LockdownError> {
        let output = self.run(&["--query-gpu=clocks.max.sm", "--format=csv,noheader,nounits"])?;
        parse_clock(&output).ok_or_else(|| LockdownError::Parse {
            command: "nvidia-smi --query-gpu=clocks.max.sm".to_string(),
            output,
        })
    }
}

impl ClockControl for NvidiaSmi {
    fn device(&self) -> &str {
        &self.device
    }

    fn pin(&self) -> Result<(), LockdownError> {
        self.run(&["-pm", "1"])?;
        let clock = self.max_sm_clock()?;
        self.run(&["-lgc", &format!("{clock},{clock}")])?;
        tracing::info!(device = %self.device, clock_mhz = clock, "locked graphics clocks");
        Ok(())
    }

    fn restore(&self) -> Result<(), LockdownError> {
        let reset = self.run(&["-rgc"]);
        let persistence = self.run(&["-pm", "0"]);
        reset?;
        persistence?;
        tracing::info!(device = %self.device, "restored graphics clocks");
        Ok(())
    }
}

/// Whether `device` names a GPU that `nvidia-smi` can pin
pub fn is_gpu_device(device: &str) -> bool {
    let device = device.trim();
    device.starts_with("cuda") || device.parse::<u32>().is_ok()
}

/// GPU index of a device string; anything without an index maps to 0
pub fn device_index(device: &str) -> u32 {
    device
        .rsplit(':')
        .next()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

fn parse_clock(output: &str) -> Option<u32> {
    output.lines().next()?.trim().parse().ok()
}

struct Held {
    control: Arc<dyn ClockControl>,
    released: AtomicBool,
}

impl Held {
    fn release(&self) -> Result<(), LockdownError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.control.restore()
    }
}

static LIVE: Mutex<Vec<Arc<Held>>> = Mutex::new(Vec::new());

fn live() -> std::sync::MutexGuard<'static, Vec<Arc<Held>>> {
    LIVE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn unregister(held: &Arc<Held>) {
    live().retain(|h| !Arc::ptr_eq(h, held));
}

/// An acquired (or disabled) lockdown
pub struct LockdownScope {
    held: Option<Arc<Held>>,
}

impl LockdownScope {
    /// A scope that does nothing
    pub fn disabled() -> Self {
        Self { held: None }
    }

    /// Pin the device behind `control` if `enabled`.
    ///
    /// At most one scope is live per process: fails with
    /// [`LockdownError::AlreadyHeld`] while any other scope is held, whatever
    /// its device. When pinning fails, a restore is attempted before the
    /// error is returned.
    pub fn acquire(enabled: bool, control: Arc<dyn ClockControl>) -> Result<Self, LockdownError> {
        if !enabled {
            return Ok(Self::disabled());
        }

        let held = Arc::new(Held {
            control,
            released: AtomicBool::new(false),
        });
        {
            let mut live = live();
            if let Some(holder) = live.first() {
                return Err(LockdownError::AlreadyHeld(holder.control.device().to_string()));
            }
            live.push(held.clone());
        }

        if let Err(e) = held.control.pin() {
            tracing::error!(device = held.control.device(), error = %e, "failed to pin clocks");
            unregister(&held);
            if let Err(restore) = held.release() {
                tracing::warn!(error = %restore, "best-effort restore failed");
            }
            return Err(e);
        }
        Ok(Self { held: Some(held) })
    }

    /// Whether this scope holds a device
    pub fn is_active(&self) -> bool {
        self.held.is_some()
    }

    /// Restore the device now, surfacing any error
    pub fn release(&mut self) -> Result<(), LockdownError> {
        match self.held.take() {
            Some(held) => {
                unregister(&held);
                held.release()
            }
            None => Ok(()),
        }
    }
}

impl Drop for LockdownScope {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "failed to release gpu lockdown");
        }
    }
}

/// Release every live scope in the process, returning how many were released.
///
/// Meant for termination paths where destructors will not run.
pub fn release_live_scopes() -> usize {
    let held: Vec<Arc<Held>> = live().drain(..).collect();
    for h in &held {
        if let Err(e) = h.release() {
            tracing::warn!(device = h.control.device(), error = %e, "failed to release gpu lockdown");
        }
    }
    held.len()
}
