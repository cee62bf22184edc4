//! Hierarchical meter model and the pipeline's meter profile.
//!
//! A meter is submitted once per activation. The meter service assigns a
//! cell id immediately and signals completion later, exactly once, through
//! a [`MeterCompletion`] channel. Nothing that references the meter may be
//! built before that completion has been observed.

use olt_types::DeviceId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::services::ApplicationId;

/// Meter cell identifier assigned by the meter service.
///
/// OpenFlow meter ids are 32 bits wide, so any id fits the low half of the
/// write-metadata register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeterId(u32);

impl MeterId {
    pub const fn new(id: u32) -> Self {
        MeterId(id)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for MeterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Unit of band rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterUnit {
    /// Kilobits per second; burst sizes are in kilobits.
    #[default]
    KbPerSec,
    /// Packets per second; burst sizes are in packets.
    PktsPerSec,
}

/// Action taken on traffic exceeding a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandType {
    #[default]
    Drop,
    Remark,
}

/// One rate/burst threshold of a meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Band {
    /// Rate in the meter's unit.
    pub rate: u64,
    /// Burst tolerance in the meter's unit.
    pub burst_size: u64,
    #[serde(default)]
    pub band_type: BandType,
}

impl Band {
    /// Creates a drop band.
    pub const fn drop(rate: u64, burst_size: u64) -> Self {
        Self {
            rate,
            burst_size,
            band_type: BandType::Drop,
        }
    }
}

/// Device-independent meter description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterProfile {
    pub unit: MeterUnit,
    /// Whether bands carry burst sizes.
    pub burst: bool,
    pub bands: Vec<Band>,
}

impl Default for MeterProfile {
    /// The shared FTTB meter: a 100 Mbps / 5 Mbit band, a 300 Mbps / 10 Mbit
    /// band and a 100 Mbps band with no burst tolerance, all dropping.
    fn default() -> Self {
        Self {
            unit: MeterUnit::KbPerSec,
            burst: true,
            bands: vec![
                Band::drop(100_000, 5_000),
                Band::drop(300_000, 10_000),
                Band::drop(100_000, 0),
            ],
        }
    }
}

/// A meter submission addressed to one device on behalf of one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterRequest {
    pub device_id: DeviceId,
    pub app_id: ApplicationId,
    pub unit: MeterUnit,
    pub burst: bool,
    pub bands: Vec<Band>,
}

impl MeterRequest {
    /// Builds the request for `profile` on `device_id`.
    pub fn from_profile(profile: &MeterProfile, device_id: DeviceId, app_id: ApplicationId) -> Self {
        Self {
            device_id,
            app_id,
            unit: profile.unit,
            burst: profile.burst,
            bands: profile.bands.clone(),
        }
    }
}

/// Installation state of a meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterState {
    #[default]
    Pending,
    Added,
    Failed,
}

/// A submitted meter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meter {
    pub id: MeterId,
    pub device_id: DeviceId,
    pub app_id: ApplicationId,
    pub unit: MeterUnit,
    pub bands: Vec<Band>,
    pub state: MeterState,
}

impl Meter {
    /// Creates a pending meter for `request` with an assigned cell id.
    pub fn pending(id: MeterId, request: &MeterRequest) -> Self {
        Self {
            id,
            device_id: request.device_id,
            app_id: request.app_id.clone(),
            unit: request.unit,
            bands: request.bands.clone(),
            state: MeterState::Pending,
        }
    }
}

/// Why a meter submission failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterFailReason {
    #[error("unknown device")]
    UnknownDevice,
    #[error("invalid meter")]
    InvalidMeter,
    #[error("out of meters")]
    OutOfMeters,
    #[error("out of bands")]
    OutOfBands,
    #[error("unsupported band type")]
    InvalidBand,
    #[error("timed out")]
    TimedOut,
    #[error("completion channel dropped")]
    CompletionDropped,
    #[error("unknown failure")]
    Unknown,
}

impl FromStr for MeterFailReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "unknown_device" => Ok(Self::UnknownDevice),
            "invalid_meter" => Ok(Self::InvalidMeter),
            "out_of_meters" => Ok(Self::OutOfMeters),
            "out_of_bands" => Ok(Self::OutOfBands),
            "invalid_band" => Ok(Self::InvalidBand),
            "timed_out" => Ok(Self::TimedOut),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown meter failure reason: {}", other)),
        }
    }
}

/// Outcome delivered once by the meter service.
pub type MeterOutcome = Result<(), MeterFailReason>;

/// Receiving half of a meter submission's completion signal.
pub type MeterCompletion = oneshot::Receiver<MeterOutcome>;

/// Sending half, held by the meter service until the device answers.
pub type MeterCompleter = oneshot::Sender<MeterOutcome>;

/// What [`MeterService::submit`](crate::services::MeterService::submit) hands back.
#[derive(Debug)]
pub struct MeterSubmission {
    /// The meter with its cell id already assigned.
    pub meter: Meter,
    pub completion: MeterCompletion,
}

/// Creates a linked completer/completion pair.
pub fn completion_channel() -> (MeterCompleter, MeterCompletion) {
    oneshot::channel()
}

/// Waits for the completion signal. A dropped sender counts as a failure.
pub async fn await_completion(completion: &mut MeterCompletion) -> MeterOutcome {
    match completion.await {
        Ok(outcome) => outcome,
        Err(_) => Err(MeterFailReason::CompletionDropped),
    }
}

/// Takes the outcome if the service has already answered.
///
/// Returns `None` while the completion is still outstanding.
pub fn try_take_completion(completion: &mut MeterCompletion) -> Option<MeterOutcome> {
    match completion.try_recv() {
        Ok(outcome) => Some(outcome),
        Err(TryRecvError::Empty) => None,
        Err(TryRecvError::Closed) => Some(Err(MeterFailReason::CompletionDropped)),
    }
}
