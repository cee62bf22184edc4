//! FTTB OLT pipeline fixture.
//!
//! Programs an OpenFlow access switch with a two-table pipeline for a
//! Fiber-to-the-Building deployment: DHCP trapping, DPU management/ANCP
//! switching and subscriber VLAN translation, all rate limited by one
//! hierarchical meter.
//!
//! - [`metadata`]: packing of the 64-bit write-metadata value
//! - [`meter`]: meter profile, request and single-shot completion
//! - [`flow`]: selectors, treatments and flow rules
//! - [`pipeline`]: the ten-rule set built for a meter id
//! - [`FttbPipeline`]: lifecycle coordinator (`Idle`, `MeterPending`, `Active`)
//! - [`sim`]: in-memory controller services
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fttb_pipeline::sim::*;
//! use fttb_pipeline::{FttbPipeline, PipelineConfig};
//!
//! let mut pipeline = FttbPipeline::new(
//!     PipelineConfig::default(),
//!     Arc::new(InMemoryApplicationRegistry::new()),
//!     Arc::new(InMemoryFlowRuleStore::new()),
//!     Arc::new(InMemoryMeterStore::new()),
//! )?;
//! pipeline.activate().await?;
//! ```

pub mod component;
pub mod config;
pub mod error;
pub mod flow;
pub mod lifecycle;
pub mod metadata;
pub mod meter;
pub mod pipeline;
pub mod services;
pub mod sim;

pub use component::Component;
pub use config::{MeterFailurePolicy, PipelineConfig};
pub use error::{ConfigError, PipelineError, PipelineResult};
pub use flow::{Criterion, FlowRule, FlowRuleKey, Instruction, TrafficSelector, TrafficTreatment};
pub use lifecycle::{FttbPipeline, LifecycleState, PipelineStats};
pub use metadata::{
    encode_forwarding, encode_service_key, try_encode_forwarding, try_encode_service_key,
    Metadata, MetadataError, MetadataFields, TechProfileId,
};
pub use meter::{Band, BandType, Meter, MeterFailReason, MeterId, MeterProfile, MeterRequest, MeterUnit};
pub use pipeline::{PipelineRules, RuleSetBuilder, RuleSlot};
pub use services::{ApplicationId, ApplicationService, FlowRuleService, MeterService};
