//! Product context collected from the user.

use serde::{Deserialize, Serialize};

use crate::errors::{CouncilError, CouncilResult};

/// Suggested values for [`ProductContext::product_type`].
pub const PRODUCT_TYPE_OPTIONS: &[&str] = &[
    "B2B SaaS Platform",
    "Consumer Mobile App",
    "Internal Enterprise Tool",
    "E-commerce Storefront",
    "Developer Tool / API",
    "Fintech Dashboard",
];

/// Suggested values for [`ProductContext::current_state`].
pub const CURRENT_STATE_OPTIONS: &[&str] = &[
    "MVP (0 to 1)",
    "Feature Iteration",
    "Legacy Refactor",
    "Bug Fix / Polish",
    "A/B Test Variant",
];

/// Everything the council is told about the product under review.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductContext {
    /// Who the product is for.
    #[serde(default)]
    pub target_audience: String,
    /// Lifecycle stage, e.g. one of [`CURRENT_STATE_OPTIONS`].
    #[serde(default)]
    pub current_state: String,
    /// What the team is trying to achieve.
    #[serde(default)]
    pub primary_goal: String,
    /// Kind of product, e.g. one of [`PRODUCT_TYPE_OPTIONS`].
    #[serde(default)]
    pub product_type: String,
    /// Screenshots as `data:<mime>;base64,<payload>` URIs, at most five.
    #[serde(default)]
    pub images: Vec<String>,
}

impl ProductContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the target audience.
    pub fn with_target_audience(mut self, value: impl Into<String>) -> Self {
        self.target_audience = value.into();
        self
    }

    /// Sets the current state.
    pub fn with_current_state(mut self, value: impl Into<String>) -> Self {
        self.current_state = value.into();
        self
    }

    /// Sets the primary goal.
    pub fn with_primary_goal(mut self, value: impl Into<String>) -> Self {
        self.primary_goal = value.into();
        self
    }

    /// Sets the product type.
    pub fn with_product_type(mut self, value: impl Into<String>) -> Self {
        self.product_type = value.into();
        self
    }

    /// Checks the fields a report cannot be written without.
    ///
    /// Target audience and primary goal are required; the remaining fields
    /// and the images are optional.
    pub fn validate(&self) -> CouncilResult<()> {
        if self.target_audience.trim().is_empty() {
            return Err(CouncilError::validation_field(
                "Target audience is required",
                "targetAudience",
            ));
        }

        if self.primary_goal.trim().is_empty() {
            return Err(CouncilError::validation_field(
                "Primary goal is required",
                "primaryGoal",
            ));
        }

        Ok(())
    }

    /// Returns true if [`validate`](Self::validate) would pass.
    pub fn is_ready(&self) -> bool {
        self.validate().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_audience_and_goal() {
        let context = ProductContext::new().with_primary_goal("Reduce churn by 5%");
        match context.validate() {
            Err(CouncilError::Validation { field, .. }) => {
                assert_eq!(field.as_deref(), Some("targetAudience"))
            }
            other => panic!("Expected Validation error, got {:?}", other),
        }

        let context = ProductContext::new().with_target_audience("Gen Z gamers");
        match context.validate() {
            Err(CouncilError::Validation { field, .. }) => {
                assert_eq!(field.as_deref(), Some("primaryGoal"))
            }
            other => panic!("Expected Validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_whitespace_only_fields_are_missing() {
        let context = ProductContext::new()
            .with_target_audience("  ")
            .with_primary_goal("Improve onboarding");
        assert!(!context.is_ready());
    }

    #[test]
    fn test_optional_fields_may_be_empty() {
        let context = ProductContext::new()
            .with_target_audience("Enterprise IT admins")
            .with_primary_goal("Improve onboarding completion");
        assert!(context.validate().is_ok());
    }

    #[test]
    fn test_context_uses_camel_case_on_the_wire() {
        let context = ProductContext::new()
            .with_target_audience("X")
            .with_current_state(CURRENT_STATE_OPTIONS[0])
            .with_product_type(PRODUCT_TYPE_OPTIONS[1]);

        let value = serde_json::to_value(&context).unwrap();
        assert_eq!(value["targetAudience"], "X");
        assert_eq!(value["currentState"], "MVP (0 to 1)");
        assert_eq!(value["productType"], "Consumer Mobile App");
        assert_eq!(value["images"], serde_json::json!([]));
    }
}
