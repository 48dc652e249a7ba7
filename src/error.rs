//! Error taxonomy for the audio engine.
//!
//! Backend failures and missing resources are ordinary values that callers
//! can log and recover from. Broken accounting is not: see
//! [`invariant_violation`].

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, AudioError>;

/// Failure code reported by an [`AudioDevice`](crate::backend::AudioDevice).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceErrorCode {
    /// Buffer memory was reclaimed and must be restored and rewritten
    BufferLost,
    InvalidCall,
    InvalidParam,
    OutOfMemory,
    Unsupported,
    NoDriver,
    /// Any other backend-specific code
    Generic(i32),
}

impl DeviceErrorCode {
    /// Human readable text for the code, used when logging failed calls.
    pub fn describe(&self) -> String {
        match self {
            DeviceErrorCode::BufferLost => "the buffer memory has been lost".to_string(),
            DeviceErrorCode::InvalidCall => "the call is not valid in the current state".to_string(),
            DeviceErrorCode::InvalidParam => "an invalid parameter was passed".to_string(),
            DeviceErrorCode::OutOfMemory => "not enough memory to complete the request".to_string(),
            DeviceErrorCode::Unsupported => "the function is not supported".to_string(),
            DeviceErrorCode::NoDriver => "no sound driver is available".to_string(),
            DeviceErrorCode::Generic(code) => format!("device error code {code:#x}"),
        }
    }
}

/// Error returned by the device backend.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
#[error("{}", .code.describe())]
pub struct DeviceError {
    pub code: DeviceErrorCode,
}

impl DeviceError {
    pub fn new(code: DeviceErrorCode) -> Self {
        Self { code }
    }

    pub fn is_lost(&self) -> bool {
        self.code == DeviceErrorCode::BufferLost
    }
}

impl From<DeviceErrorCode> for DeviceError {
    fn from(code: DeviceErrorCode) -> Self {
        Self::new(code)
    }
}

/// Error types for engine operations
#[derive(Error, Debug)]
pub enum AudioError {
    /// A backend call returned a failure code
    #[error("{method} failed: {source}")]
    DeviceCall {
        method: &'static str,
        #[source]
        source: DeviceError,
    },

    /// The operation needs a resource that is absent or of the wrong kind
    #[error("resource not ready: {0}")]
    ResourceNotReady(String),

    /// The compressed-audio decoder or container parser failed
    #[error("decoder error: {0:#}")]
    Decoder(anyhow::Error),

    /// Rejected configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AudioError {
    /// Wraps a device failure and logs it the way every failed backend call is
    /// reported.
    pub fn device(method: &'static str, source: DeviceError) -> Self {
        warn!("{method} failed: {source}");
        AudioError::DeviceCall { method, source }
    }

    pub fn not_ready(what: impl Into<String>) -> Self {
        let what = what.into();
        warn!("Resource not ready: {what}");
        AudioError::ResourceNotReady(what)
    }

    pub fn is_device_lost(&self) -> bool {
        matches!(self, AudioError::DeviceCall { source, .. } if source.is_lost())
    }
}

/// Extension for tagging raw device results with the method that produced
/// them.
pub trait DeviceResultExt<T> {
    fn call(self, method: &'static str) -> Result<T>;
}

impl<T> DeviceResultExt<T> for std::result::Result<T, DeviceError> {
    fn call(self, method: &'static str) -> Result<T> {
        self.map_err(|e| AudioError::device(method, e))
    }
}

/// Aborts on a broken engine invariant (leaked buffer binding, unsupported
/// effects flag, exhausted duplicate cap). These indicate logic errors, so
/// there is nothing to recover.
#[track_caller]
pub fn invariant_violation(msg: impl AsRef<str>) -> ! {
    let msg = msg.as_ref();
    error!("Audio invariant violated: {msg}");
    panic!("audio invariant violated: {msg}");
}
