//! Engine configuration.
//!
//! [`EngineConfig`] can be deserialized from (possibly partial) JSON. Fields that are missing are
//! taken from [`EngineConfig::default`]. Programmatic callers can do the same with
//! [`EngineConfigOverrides`] and [`EngineConfig::merged`].

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration of an [`Engine`][crate::engine::Engine].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Mirror the emitted coordinates horizontally (for selfie cameras).
    pub mirror_x: bool,
    /// Fraction of the frame on each side that is cut off in the emitted coordinates.
    ///
    /// With a padding of 0.1, a landmark at `[0.1, 0.1]` in the frame is reported at `[0, 0]`.
    pub padding: f32,
    /// Below this hand presence probability, the engine goes back to searching for a hand with the
    /// box model.
    pub min_hand_presence_probability_threshold: f32,
    /// Margin around the box model's detection, as a fraction of the palm length.
    pub box_slack: f32,
    /// Margin around the landmarks, as a fraction of the hand size.
    pub landmark_slack: f32,
    /// Emit landmarks in [`HandLandmark`][crate::landmark::HandLandmark] order instead of the
    /// model's native order.
    pub user_friendly_coordinate_order: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mirror_x: true,
            padding: 0.0,
            min_hand_presence_probability_threshold: 0.5,
            box_slack: 0.75,
            landmark_slack: 0.75,
            user_friendly_coordinate_order: true,
        }
    }
}

/// A partial [`EngineConfig`], where every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror_x: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_hand_presence_probability_threshold: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub box_slack: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landmark_slack: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_friendly_coordinate_order: Option<bool>,
}

impl EngineConfig {
    /// Creates a configuration from `overrides`, taking every field that is not set from the
    /// defaults.
    pub fn merged(overrides: &EngineConfigOverrides) -> Self {
        Self::default().with_overrides(overrides)
    }

    /// Replaces the fields that are set in `overrides`.
    #[must_use]
    pub fn with_overrides(self, overrides: &EngineConfigOverrides) -> Self {
        Self {
            mirror_x: overrides.mirror_x.unwrap_or(self.mirror_x),
            padding: overrides.padding.unwrap_or(self.padding),
            min_hand_presence_probability_threshold: overrides
                .min_hand_presence_probability_threshold
                .unwrap_or(self.min_hand_presence_probability_threshold),
            box_slack: overrides.box_slack.unwrap_or(self.box_slack),
            landmark_slack: overrides.landmark_slack.unwrap_or(self.landmark_slack),
            user_friendly_coordinate_order: overrides
                .user_friendly_coordinate_order
                .unwrap_or(self.user_friendly_coordinate_order),
        }
    }

    /// Parses and validates a JSON configuration object.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a JSON configuration file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = Self::from_json(&fs::read_to_string(path)?)?;
        log::debug!("loaded engine configuration from {}", path.display());
        Ok(config)
    }

    /// Checks that every value is in its valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..0.5).contains(&self.padding) {
            return Err(ConfigError::InvalidValue {
                field: "padding",
                reason: format!("{} is not in range 0.0 to 0.5 (exclusive)", self.padding),
            });
        }
        if !(0.0..=1.0).contains(&self.min_hand_presence_probability_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "minHandPresenceProbabilityThreshold",
                reason: format!(
                    "{} is not a probability",
                    self.min_hand_presence_probability_threshold
                ),
            });
        }
        for (field, slack) in [
            ("boxSlack", self.box_slack),
            ("landmarkSlack", self.landmark_slack),
        ] {
            if !(slack.is_finite() && slack >= 0.0) {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: format!("{slack} is not a non-negative number"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_defaults() {
        let config = EngineConfig::merged(&EngineConfigOverrides {
            padding: Some(0.1),
            ..Default::default()
        });
        assert_eq!(config.padding, 0.1);
        assert!(config.mirror_x);
        assert_eq!(config.min_hand_presence_probability_threshold, 0.5);
        assert_eq!(config.box_slack, 0.75);
        assert!(config.user_friendly_coordinate_order);
    }

    #[test]
    fn merge_never_overwrites() {
        let overrides = EngineConfigOverrides {
            mirror_x: Some(false),
            padding: Some(0.2),
            min_hand_presence_probability_threshold: Some(0.9),
            box_slack: Some(1.0),
            landmark_slack: Some(0.5),
            user_friendly_coordinate_order: Some(false),
        };
        let config = EngineConfig::merged(&overrides);
        assert_eq!(
            config,
            EngineConfig {
                mirror_x: false,
                padding: 0.2,
                min_hand_presence_probability_threshold: 0.9,
                box_slack: 1.0,
                landmark_slack: 0.5,
                user_friendly_coordinate_order: false,
            }
        );
        assert_eq!(EngineConfig::merged(&Default::default()), EngineConfig::default());
    }

    #[test]
    fn partial_json() {
        let config = EngineConfig::from_json(r#"{ "padding": 0.1 }"#).unwrap();
        assert_eq!(config.padding, 0.1);
        assert!(config.mirror_x);
        assert_eq!(config.min_hand_presence_probability_threshold, 0.5);

        let config = EngineConfig::from_json(r#"{ "mirrorX": false, "boxSlack": 1.5 }"#).unwrap();
        assert!(!config.mirror_x);
        assert_eq!(config.box_slack, 1.5);
        assert_eq!(config.padding, 0.0);

        let overrides: EngineConfigOverrides =
            serde_json::from_str(r#"{ "userFriendlyCoordinateOrder": false }"#).unwrap();
        assert_eq!(overrides.user_friendly_coordinate_order, Some(false));
        assert_eq!(overrides.padding, None);
        assert_eq!(
            serde_json::to_string(&overrides).unwrap(),
            r#"{"userFriendlyCoordinateOrder":false}"#
        );
    }

    #[test]
    fn invalid_values() {
        assert!(matches!(
            EngineConfig::from_json(r#"{ "padding": 0.5 }"#),
            Err(ConfigError::InvalidValue {
                field: "padding",
                ..
            })
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{ "minHandPresenceProbabilityThreshold": 1.5 }"#),
            Err(ConfigError::InvalidValue {
                field: "minHandPresenceProbabilityThreshold",
                ..
            })
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{ "landmarkSlack": -1 }"#),
            Err(ConfigError::InvalidValue {
                field: "landmarkSlack",
                ..
            })
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{ "padding": "wide" }"#),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EngineConfig::from_path("/nonexistent/handtrack.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
