//! Input validation for the prediction form, and a sanity check on the
//! price a prediction produced.

use serde::{Deserialize, Serialize};

use crate::error::ValidationErrors;
use crate::models::{Location, PropertyInput};

const MAX_AREA: f64 = 10_000.0;
const MAX_ROOMS: f64 = 10.0;
const MAX_AGE: f64 = 150.0;

/// Raw, possibly incomplete form values as submitted by a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyForm {
    pub area: Option<f64>,
    pub bedrooms: Option<f64>,
    pub bathrooms: Option<f64>,
    pub location: Option<String>,
    pub age: Option<f64>,
}

impl PropertyForm {
    /// Check every field and either build a [`PropertyInput`] or report one
    /// message per offending field.
    pub fn validate(&self) -> Result<PropertyInput, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let area = match self.area {
            None => {
                errors.add("area", "Area is required");
                None
            }
            Some(a) if !a.is_finite() || a <= 0.0 => {
                errors.add("area", "Please enter a valid positive number");
                None
            }
            Some(a) if a > MAX_AREA => {
                errors.add("area", "Area cannot exceed 10,000 sq ft");
                None
            }
            Some(a) => Some(a),
        };

        // Whole counts; fractional input is truncated.
        let bedrooms = match self.bedrooms.map(f64::trunc) {
            None => {
                errors.add("bedrooms", "Number of bedrooms is required");
                None
            }
            Some(b) if !b.is_finite() || b <= 0.0 => {
                errors.add("bedrooms", "Please enter a valid positive number");
                None
            }
            Some(b) if b > MAX_ROOMS => {
                errors.add("bedrooms", "Number of bedrooms cannot exceed 10");
                None
            }
            Some(b) => Some(b as u32),
        };

        let bathrooms = match self.bathrooms {
            None => {
                errors.add("bathrooms", "Number of bathrooms is required");
                None
            }
            Some(b) if !b.is_finite() || b <= 0.0 => {
                errors.add("bathrooms", "Please enter a valid positive number");
                None
            }
            Some(b) if b > MAX_ROOMS => {
                errors.add("bathrooms", "Number of bathrooms cannot exceed 10");
                None
            }
            Some(b) => Some(b),
        };

        let location = match self.location.as_deref().map(str::trim) {
            None | Some("") => {
                errors.add("location", "Location is required");
                None
            }
            Some(raw) => match raw.parse::<Location>() {
                Ok(loc) => Some(loc),
                Err(_) => {
                    errors.add("location", "Location must be Downtown, Suburban or Rural");
                    None
                }
            },
        };

        let age = match self.age.map(f64::trunc) {
            None => {
                errors.add("age", "Property age is required");
                None
            }
            Some(a) if !a.is_finite() || a < 0.0 => {
                errors.add("age", "Please enter a valid non-negative number");
                None
            }
            Some(a) if a > MAX_AGE => {
                errors.add("age", "Property age cannot exceed 150 years");
                None
            }
            Some(a) => Some(a as u32),
        };

        match (area, bedrooms, bathrooms, location, age) {
            (Some(area), Some(bedrooms), Some(bathrooms), Some(location), Some(age))
                if errors.is_empty() =>
            {
                PropertyInput::new(area, bedrooms, bathrooms, location, age).map_err(|msg| {
                    let mut errors = ValidationErrors::new();
                    errors.add("form", msg);
                    errors
                })
            }
            _ => Err(errors),
        }
    }
}

impl From<&PropertyInput> for PropertyForm {
    fn from(input: &PropertyInput) -> Self {
        Self {
            area: Some(input.area()),
            bedrooms: Some(f64::from(input.bedrooms())),
            bathrooms: Some(input.bathrooms()),
            location: Some(input.location().to_string()),
            age: Some(f64::from(input.age())),
        }
    }
}

/// Outcome of the plausibility check on a produced price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub is_valid: bool,
    pub message: String,
}

impl Assessment {
    fn flagged(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            message: message.into(),
        }
    }
}

fn max_price_per_sqft(location: Location) -> f64 {
    match location {
        Location::Downtown => 2000.0,
        Location::Suburban => 1000.0,
        Location::Rural => 500.0,
    }
}

/// Flag prices that are implausible for the described property. Rules are
/// checked in order and the first hit wins.
pub fn assess_prediction(price: i64, input: &PropertyInput) -> Assessment {
    if price <= 0 {
        return Assessment::flagged("The prediction appears to be invalid. Please try again.");
    }
    if input.age() > 50 && price > 2_000_000 {
        return Assessment::flagged("The prediction seems unusually high for an older property.");
    }
    if price < 50_000 {
        return Assessment::flagged(
            "The predicted price is unusually low. Consider checking your inputs.",
        );
    }
    if input.area() < 1000.0 && input.bedrooms() <= 2 && price > 1_000_000 {
        return Assessment::flagged("The prediction seems unusually high for a small property.");
    }

    let per_sqft = price as f64 / input.area();
    if per_sqft > max_price_per_sqft(input.location()) {
        return Assessment::flagged(format!(
            "The price per square foot ({per_sqft:.0}) is unusually high for this location."
        ));
    }

    Assessment {
        is_valid: true,
        message: "Prediction appears to be reasonable.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(area: f64, bedrooms: f64, bathrooms: f64, location: &str, age: f64) -> PropertyForm {
        PropertyForm {
            area: Some(area),
            bedrooms: Some(bedrooms),
            bathrooms: Some(bathrooms),
            location: Some(location.to_string()),
            age: Some(age),
        }
    }

    #[test]
    fn test_valid_form_builds_input() {
        let input = form(1500.0, 3.0, 2.0, "Suburban", 10.0).validate().unwrap();
        assert_eq!(input.area(), 1500.0);
        assert_eq!(input.bedrooms(), 3);
        assert_eq!(input.location(), Location::Suburban);
        assert_eq!(input.age(), 10);
    }

    #[test]
    fn test_new_construction_is_valid() {
        assert!(form(900.0, 1.0, 1.0, "Rural", 0.0).validate().is_ok());
    }

    #[test]
    fn test_empty_form_reports_every_field() {
        let errors = PropertyForm::default().validate().unwrap_err();
        assert_eq!(errors.fields.len(), 5);
        assert_eq!(errors.get("area"), Some("Area is required"));
        assert_eq!(errors.get("age"), Some("Property age is required"));
    }

    #[test]
    fn test_range_limits() {
        let errors = form(12_000.0, 11.0, 0.0, "Uptown", 151.0)
            .validate()
            .unwrap_err();
        assert_eq!(errors.get("area"), Some("Area cannot exceed 10,000 sq ft"));
        assert_eq!(
            errors.get("bedrooms"),
            Some("Number of bedrooms cannot exceed 10")
        );
        assert_eq!(
            errors.get("bathrooms"),
            Some("Please enter a valid positive number")
        );
        assert!(errors.get("location").is_some());
        assert_eq!(
            errors.get("age"),
            Some("Property age cannot exceed 150 years")
        );
    }

    #[test]
    fn test_single_bad_field_reports_only_that_field() {
        let errors = form(1500.0, 3.0, 2.0, "Suburban", -4.0)
            .validate()
            .unwrap_err();
        assert_eq!(errors.fields.len(), 1);
        assert!(errors.get("age").is_some());
    }

    #[test]
    fn test_assessment_rules() {
        let small = PropertyInput::new(800.0, 2, 1.0, Location::Downtown, 10).unwrap();
        let old = PropertyInput::new(5000.0, 5, 4.0, Location::Downtown, 80).unwrap();
        let rural = PropertyInput::new(1000.0, 3, 2.0, Location::Rural, 10).unwrap();

        assert!(!assess_prediction(0, &small).is_valid);
        assert!(!assess_prediction(2_500_000, &old).is_valid);
        assert!(!assess_prediction(40_000, &rural).is_valid);
        assert!(!assess_prediction(1_200_000, &small).is_valid);

        let flagged = assess_prediction(600_000, &rural);
        assert!(!flagged.is_valid);
        assert!(flagged.message.contains("(600)"));

        assert!(assess_prediction(300_000, &rural).is_valid);
    }
}
