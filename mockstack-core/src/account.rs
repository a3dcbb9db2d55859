//! Account and region context for generated resource identifiers

/// Default account id used when none is configured
pub const DEFAULT_ACCOUNT_ID: &str = "000000000000";

/// Default region used when none is configured
pub const DEFAULT_REGION: &str = "us-east-1";

/// Account, region and public endpoint of a running emulator.
///
/// Services never invent these strings themselves; the composition root
/// builds one context and hands it to every service that needs to mint
/// URLs or ARNs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountContext {
    pub account_id: String,
    pub region: String,
    /// Base URL clients use to reach the emulator, without trailing slash
    pub endpoint: String,
}

impl AccountContext {
    pub fn new(
        account_id: impl Into<String>,
        region: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        let endpoint: String = endpoint.into();
        Self {
            account_id: account_id.into(),
            region: region.into(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    /// Build an ARN for a resource of `service` in this account/region
    pub fn arn(&self, service: &str, resource: &str) -> String {
        format!(
            "arn:aws:{}:{}:{}:{}",
            service, self.region, self.account_id, resource
        )
    }

    /// Build a URL of the form `{endpoint}/{account_id}/{resource}`
    pub fn resource_url(&self, resource: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.account_id, resource)
    }
}

impl Default for AccountContext {
    fn default() -> Self {
        Self::new(DEFAULT_ACCOUNT_ID, DEFAULT_REGION, "http://localhost:4566")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arn_format() {
        let ctx = AccountContext::new("123456789012", "eu-west-1", "http://localhost:4566");
        assert_eq!(
            ctx.arn("sqs", "orders"),
            "arn:aws:sqs:eu-west-1:123456789012:orders"
        );
    }

    #[test]
    fn test_resource_url_strips_trailing_slash() {
        let ctx = AccountContext::new("123456789012", "us-east-1", "http://example.test:9324/");
        assert_eq!(
            ctx.resource_url("orders"),
            "http://example.test:9324/123456789012/orders"
        );
    }
}
