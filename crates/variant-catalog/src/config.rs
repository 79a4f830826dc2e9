//! Configuration types for the query resolver.

/// Configuration for [`VariantCatalogQueryResolver`](crate::VariantCatalogQueryResolver).
///
/// # Example
///
/// ```rust
/// use variant_catalog::ResolverConfig;
///
/// let config = ResolverConfig::builder()
///     .with_default_cohort("INDEXED")
///     .with_phased_genotypes(false)
///     .build();
/// assert_eq!(config.default_cohort, "INDEXED");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Cohort holding every sample loaded into storage.
    pub default_cohort: String,
    /// Add phased equivalents to genotypes derived from a mode of inheritance.
    pub phased_genotypes: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_cohort: "ALL".to_string(),
            phased_genotypes: true,
        }
    }
}

impl ResolverConfig {
    /// Creates a new builder for ResolverConfig.
    pub fn builder() -> ResolverConfigBuilder {
        ResolverConfigBuilder::default()
    }
}

/// Builder for ResolverConfig.
#[derive(Debug, Clone, Default)]
pub struct ResolverConfigBuilder {
    config: ResolverConfig,
}

impl ResolverConfigBuilder {
    /// Sets the default cohort name.
    pub fn with_default_cohort(mut self, cohort: impl Into<String>) -> Self {
        self.config.default_cohort = cohort.into();
        self
    }

    /// Enables or disables phased genotype expansion.
    pub fn with_phased_genotypes(mut self, phased: bool) -> Self {
        self.config.phased_genotypes = phased;
        self
    }

    /// Builds the ResolverConfig.
    pub fn build(self) -> ResolverConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolver_config_default() {
        let config = ResolverConfig::default();
        assert_eq!(config.default_cohort, "ALL");
        assert!(config.phased_genotypes);
    }

    #[test]
    fn test_builder() {
        let config = ResolverConfig::builder().with_phased_genotypes(false).build();
        assert_eq!(config.default_cohort, "ALL");
        assert!(!config.phased_genotypes);
    }
}
