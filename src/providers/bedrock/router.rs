//! Region routing
//!
//! Chooses between a model's regional id and the cross-region inference
//! profile of the configured region's geography.

use crate::providers::bedrock::types::{AwsRegion, Geography};
use crate::providers::catalog::{ModelDescriptor, RoutingPolicy};
use crate::providers::ProviderError;
use std::sync::Arc;

/// Concrete model id to invoke
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationEndpoint {
    /// Inference profile id, e.g. `us.anthropic.claude-3-5-sonnet-20241022-v2:0`
    Profile(String),
    Direct(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTarget {
    pub descriptor: Arc<ModelDescriptor>,
    pub endpoint: InvocationEndpoint,
}

impl ResolvedTarget {
    /// The id passed to Bedrock as `modelId`
    pub fn model_id(&self) -> &str {
        match &self.endpoint {
            InvocationEndpoint::Profile(id) | InvocationEndpoint::Direct(id) => id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegionRouter {
    region: AwsRegion,
    geography: Option<Geography>,
}

impl RegionRouter {
    pub fn new(region: AwsRegion) -> Self {
        let geography = Geography::of_region(&region);
        Self { region, geography }
    }

    pub fn region(&self) -> &AwsRegion {
        &self.region
    }

    pub fn route(
        &self,
        descriptor: &Arc<ModelDescriptor>,
        cross_region: bool,
    ) -> Result<ResolvedTarget, ProviderError> {
        let model_id = descriptor.bedrock_model_id.as_ref();

        let endpoint = if cross_region {
            let geography = self
                .geography
                .filter(|geography| descriptor.has_profile_in(*geography))
                .ok_or_else(|| {
                    ProviderError::RoutingUnavailable(format!(
                        "Model `{}` has no cross-region inference profile for region {}",
                        descriptor.id, self.region
                    ))
                })?;
            InvocationEndpoint::Profile(format!("{}.{model_id}", geography.profile_prefix()))
        } else if descriptor.routing == RoutingPolicy::ProfileRequired {
            return Err(ProviderError::RoutingUnavailable(format!(
                "Model `{}` is only available through a cross-region inference profile, \
                 which is disabled",
                descriptor.id
            )));
        } else {
            InvocationEndpoint::Direct(model_id.to_string())
        };

        Ok(ResolvedTarget {
            descriptor: Arc::clone(descriptor),
            endpoint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ModelCatalog;

    fn router(region: &str) -> RegionRouter {
        RegionRouter::new(AwsRegion::try_new(region.to_string()).unwrap())
    }

    fn descriptor(id: &str) -> Arc<ModelDescriptor> {
        ModelCatalog::builtin().unwrap().resolve(id).unwrap()
    }

    #[test]
    fn cross_region_uses_geography_profile() {
        let target = router("us-east-1")
            .route(
                &descriptor("anthropic.claude-3-5-sonnet-20241022-v2:0"),
                true,
            )
            .unwrap();

        assert_eq!(
            target.endpoint,
            InvocationEndpoint::Profile("us.anthropic.claude-3-5-sonnet-20241022-v2:0".to_string())
        );
        assert_eq!(
            target.model_id(),
            "us.anthropic.claude-3-5-sonnet-20241022-v2:0"
        );
    }

    #[test]
    fn apac_regions_use_apac_prefix() {
        let target = router("ap-southeast-1")
            .route(&descriptor("anthropic.claude-3-haiku-20240307-v1:0"), true)
            .unwrap();
        assert_eq!(
            target.model_id(),
            "apac.anthropic.claude-3-haiku-20240307-v1:0"
        );
    }

    #[test]
    fn direct_routing_when_cross_region_disabled() {
        let target = router("us-east-1")
            .route(&descriptor("amazon.titan-text-express-v1"), false)
            .unwrap();
        assert_eq!(
            target.endpoint,
            InvocationEndpoint::Direct("amazon.titan-text-express-v1".to_string())
        );
    }

    #[test]
    fn missing_profile_for_geography_is_unavailable() {
        let result = router("eu-west-1").route(
            &descriptor("anthropic.claude-3-5-sonnet-20241022-v2:0"),
            true,
        );
        assert!(matches!(result, Err(ProviderError::RoutingUnavailable(_))));
    }

    #[test]
    fn profile_required_models_need_cross_region() {
        let result = router("us-east-1").route(
            &descriptor("anthropic.claude-3-7-sonnet-20250219-v1:0"),
            false,
        );
        assert!(matches!(result, Err(ProviderError::RoutingUnavailable(_))));
    }

    #[test]
    fn routing_is_deterministic() {
        let router = router("us-west-2");
        let model = descriptor("amazon.nova-pro-v1:0");
        let first = router.route(&model, true).unwrap();
        for _ in 0..10 {
            assert_eq!(router.route(&model, true).unwrap(), first);
        }
    }
}
