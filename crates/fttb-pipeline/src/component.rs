//! Host controller binding.
//!
//! The controller drives an application through three lifecycle signals.
//! [`Component`] is that contract; the daemon holds its application as a
//! `Box<dyn Component>` and forwards start, reconfigure and stop to it.

use async_trait::async_trait;

use crate::config::PipelineConfig;
use crate::error::PipelineResult;
use crate::lifecycle::FttbPipeline;

/// A controller application with an activate/modify/deactivate lifecycle.
///
/// # Example
///
/// ```ignore
/// use fttb_pipeline::Component;
///
/// async fn restart(component: &mut dyn Component) -> PipelineResult<()> {
///     component.deactivate().await?;
///     component.activate().await
/// }
/// ```
#[async_trait]
pub trait Component: Send + Sync {
    /// Returns the name of this component (for logging).
    fn name(&self) -> &str;

    /// Brings the component up. Resolves once its resources are installed.
    async fn activate(&mut self) -> PipelineResult<()>;

    /// Tears down everything [`activate`](Self::activate) installed.
    async fn deactivate(&mut self) -> PipelineResult<()>;

    /// Signals a configuration change, optionally carrying the new one.
    async fn modified(&mut self, config: Option<PipelineConfig>) -> PipelineResult<()>;
}

#[async_trait]
impl Component for FttbPipeline {
    fn name(&self) -> &str {
        &self.config().app_name
    }

    async fn activate(&mut self) -> PipelineResult<()> {
        FttbPipeline::activate(self).await
    }

    async fn deactivate(&mut self) -> PipelineResult<()> {
        FttbPipeline::deactivate(self)
    }

    async fn modified(&mut self, config: Option<PipelineConfig>) -> PipelineResult<()> {
        FttbPipeline::modified(self, config)
    }
}
