use super::{ParamStrategy, SecretStrategy, ServiceStrategy};
use crate::error::StageResult;
use crate::models::Service;
use crate::remote::{ParameterApi, SecretApi};
use std::sync::Arc;

/// Builds the strategy for a service from the configured remote clients
#[derive(Clone)]
pub struct StrategyFactory {
    parameters: Arc<dyn ParameterApi>,
    secrets: Arc<dyn SecretApi>,
}

impl StrategyFactory {
    pub fn new(parameters: Arc<dyn ParameterApi>, secrets: Arc<dyn SecretApi>) -> Self {
        Self {
            parameters,
            secrets,
        }
    }

    /// Factory whose two services share one client implementing both APIs
    pub fn from_remote<R>(remote: Arc<R>) -> Self
    where
        R: ParameterApi + SecretApi + 'static,
    {
        Self::new(remote.clone(), remote)
    }

    pub fn create(&self, service: Service) -> Box<dyn ServiceStrategy> {
        match service {
            Service::Parameter => Box::new(ParamStrategy::new(Arc::clone(&self.parameters))),
            Service::Secret => Box::new(SecretStrategy::new(Arc::clone(&self.secrets))),
        }
    }

    /// Strategy for a service tag sent by a front-end ("parameter", "secret", ...)
    pub fn create_from_tag(&self, tag: &str) -> StageResult<Box<dyn ServiceStrategy>> {
        Ok(self.create(tag.parse()?))
    }
}
