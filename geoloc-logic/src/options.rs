use serde::{Deserialize, Serialize};

const DEFAULT_TIMEOUT_MS: u32 = 5000;
const DEFAULT_MAXIMUM_AGE_MS: u32 = 1000 * 60 * 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, specta::Type)]
#[serde(default, rename_all = "camelCase")]
/// Options handed to the platform location source when a watch starts. Missing keys are filled
/// in from [Default] when deserializing.
pub struct SubscriptionOptions {
    /// Max time to wait for a single fix, in milliseconds
    pub timeout: u32,
    /// Accept a fix cached by the platform up to this old, in milliseconds
    pub maximum_age: u32,
    /// Prefer a high accuracy fix (GPS) over a cheap one
    pub enable_high_accuracy: bool,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT_MS,
            maximum_age: DEFAULT_MAXIMUM_AGE_MS,
            enable_high_accuracy: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, specta::Type)]
#[serde(rename_all = "camelCase")]
/// User supplied options, every key that's set overrides the same key in the base options
pub struct PartialSubscriptionOptions {
    pub timeout: Option<u32>,
    pub maximum_age: Option<u32>,
    pub enable_high_accuracy: Option<bool>,
}

impl PartialSubscriptionOptions {
    pub fn merge_over(self, base: SubscriptionOptions) -> SubscriptionOptions {
        SubscriptionOptions {
            timeout: self.timeout.unwrap_or(base.timeout),
            maximum_age: self.maximum_age.unwrap_or(base.maximum_age),
            enable_high_accuracy: self.enable_high_accuracy.unwrap_or(base.enable_high_accuracy),
        }
    }

    pub fn merge_over_defaults(self) -> SubscriptionOptions {
        self.merge_over(SubscriptionOptions::default())
    }
}

impl From<PartialSubscriptionOptions> for SubscriptionOptions {
    fn from(partial: PartialSubscriptionOptions) -> Self {
        partial.merge_over_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = SubscriptionOptions::default();
        assert_eq!(opts.timeout, 5000);
        assert_eq!(opts.maximum_age, 300_000);
        assert!(opts.enable_high_accuracy);
    }

    #[test]
    fn test_empty_partial_is_defaults() {
        assert_eq!(
            PartialSubscriptionOptions::default().merge_over_defaults(),
            SubscriptionOptions::default()
        );
    }

    #[test]
    fn test_partial_overrides_only_set_keys() {
        let partial = PartialSubscriptionOptions {
            timeout: Some(1000),
            enable_high_accuracy: Some(false),
            ..Default::default()
        };

        let opts: SubscriptionOptions = partial.into();

        assert_eq!(opts.timeout, 1000);
        assert_eq!(opts.maximum_age, 300_000);
        assert!(!opts.enable_high_accuracy);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let opts: SubscriptionOptions =
            serde_json::from_str(r#"{ "maximumAge": 2000 }"#).expect("Failed to parse");

        assert_eq!(
            opts,
            SubscriptionOptions {
                maximum_age: 2000,
                ..Default::default()
            }
        );
    }
}
