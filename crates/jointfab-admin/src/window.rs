//! Time-boxed commissioning windows for joining the shared fabric.

use std::time::{Duration, Instant};

use jointfab_types::{FabricIndex, VendorId};

use crate::error::WindowError;

pub const MIN_PBKDF_ITERATIONS: u32 = 1000;
pub const MAX_PBKDF_ITERATIONS: u32 = 100_000;
pub const MIN_PBKDF_SALT_LENGTH: usize = 16;
pub const MAX_PBKDF_SALT_LENGTH: usize = 32;
pub const MAX_DISCRIMINATOR: u16 = 0xFFF;
/// Serialized passcode verifier: w0 (32 bytes) then L (65 bytes).
pub const VERIFIER_LENGTH: usize = 97;

pub const DEFAULT_MIN_COMMISSIONING_TIMEOUT: Duration = Duration::from_secs(180);
pub const DEFAULT_MAX_COMMISSIONING_TIMEOUT: Duration = Duration::from_secs(900);

/// Parameters of a joint commissioning window request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JointWindowParams {
    pub timeout: Duration,
    pub discriminator: u16,
    pub verifier: Vec<u8>,
    pub iterations: u32,
    pub salt: Vec<u8>,
}

/// An open window.
#[derive(Debug, Clone)]
pub struct OpenWindow {
    pub deadline: Instant,
    pub discriminator: u16,
    pub iterations: u32,
    pub salt: Vec<u8>,
    pub verifier: [u8; VERIFIER_LENGTH],
    /// Fabric of the administrator that opened the window.
    pub fabric_index: FabricIndex,
    pub vendor_id: VendorId,
}

/// Tracks at most one open commissioning window.
#[derive(Debug)]
pub struct CommissioningWindowManager {
    min_timeout: Duration,
    max_timeout: Duration,
    window: Option<OpenWindow>,
}

impl Default for CommissioningWindowManager {
    fn default() -> Self {
        Self::new(
            DEFAULT_MIN_COMMISSIONING_TIMEOUT,
            DEFAULT_MAX_COMMISSIONING_TIMEOUT,
        )
    }
}

impl CommissioningWindowManager {
    pub fn new(min_timeout: Duration, max_timeout: Duration) -> Self {
        Self {
            min_timeout,
            max_timeout,
            window: None,
        }
    }

    pub fn min_commissioning_timeout(&self) -> Duration {
        self.min_timeout
    }

    pub fn max_commissioning_timeout(&self) -> Duration {
        self.max_timeout
    }

    pub fn is_commissioning_window_open(&self) -> bool {
        self.window.is_some()
    }

    pub fn window(&self) -> Option<&OpenWindow> {
        self.window.as_ref()
    }

    /// Validates `params` and opens a window on behalf of `fabric_index`.
    ///
    /// Checks run in a fixed order: busy, iterations, salt, timeout,
    /// discriminator, verifier. The first failing check is reported.
    pub fn open_joint_commissioning_window(
        &mut self,
        params: JointWindowParams,
        fabric_index: FabricIndex,
        vendor_id: VendorId,
        now: Instant,
    ) -> Result<&OpenWindow, WindowError> {
        if self.window.is_some() {
            return Err(WindowError::AlreadyOpen);
        }
        if !(MIN_PBKDF_ITERATIONS..=MAX_PBKDF_ITERATIONS).contains(&params.iterations) {
            return Err(WindowError::Iterations(params.iterations));
        }
        if !(MIN_PBKDF_SALT_LENGTH..=MAX_PBKDF_SALT_LENGTH).contains(&params.salt.len()) {
            return Err(WindowError::SaltLength(params.salt.len()));
        }
        if params.timeout > self.max_timeout || params.timeout < self.min_timeout {
            return Err(WindowError::Timeout {
                secs: params.timeout.as_secs(),
                min: self.min_timeout.as_secs(),
                max: self.max_timeout.as_secs(),
            });
        }
        if params.discriminator > MAX_DISCRIMINATOR {
            return Err(WindowError::Discriminator(params.discriminator));
        }
        let verifier: [u8; VERIFIER_LENGTH] = params
            .verifier
            .as_slice()
            .try_into()
            .map_err(|_| WindowError::Verifier(params.verifier.len()))?;

        tracing::info!(
            fabric_index = fabric_index.get(),
            vendor_id = %vendor_id,
            discriminator = params.discriminator,
            timeout_secs = params.timeout.as_secs(),
            "joint commissioning window opened"
        );
        Ok(self.window.insert(OpenWindow {
            deadline: now + params.timeout,
            discriminator: params.discriminator,
            iterations: params.iterations,
            salt: params.salt,
            verifier,
            fabric_index,
            vendor_id,
        }))
    }

    pub fn close_commissioning_window(&mut self) {
        if self.window.take().is_some() {
            tracing::info!("commissioning window closed");
        }
    }

    /// Closes the window once its deadline has passed. Returns `true` if it
    /// closed.
    pub fn expire_if_elapsed(&mut self, now: Instant) -> bool {
        match &self.window {
            Some(window) if now >= window.deadline => {
                tracing::info!(
                    discriminator = window.discriminator,
                    "commissioning window timed out"
                );
                self.window = None;
                true
            }
            _ => false,
        }
    }
}
