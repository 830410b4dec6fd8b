use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Location {
    Downtown,
    Suburban,
    Rural,
}

impl Location {
    pub const ALL: [Location; 3] = [Location::Downtown, Location::Suburban, Location::Rural];

    pub fn as_str(&self) -> &'static str {
        match self {
            Location::Downtown => "Downtown",
            Location::Suburban => "Suburban",
            Location::Rural => "Rural",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Location {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Downtown" | "downtown" => Ok(Location::Downtown),
            "Suburban" | "suburban" => Ok(Location::Suburban),
            "Rural" | "rural" => Ok(Location::Rural),
            other => Err(format!("unknown location '{other}'")),
        }
    }
}

/// A validated property description. Build one through
/// [`crate::validate::PropertyForm::validate`] or [`PropertyInput::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyInput {
    area: f64,
    bedrooms: u32,
    bathrooms: f64,
    location: Location,
    age: u32,
}

impl PropertyInput {
    /// Checked constructor for the domain invariants (positive area,
    /// bedrooms and bathrooms). Range limits are the validator's concern.
    pub fn new(
        area: f64,
        bedrooms: u32,
        bathrooms: f64,
        location: Location,
        age: u32,
    ) -> Result<Self, String> {
        if !area.is_finite() || area <= 0.0 {
            return Err(format!("area must be positive, got {area}"));
        }
        if bedrooms == 0 {
            return Err("bedrooms must be positive".to_string());
        }
        if !bathrooms.is_finite() || bathrooms <= 0.0 {
            return Err(format!("bathrooms must be positive, got {bathrooms}"));
        }
        Ok(Self {
            area,
            bedrooms,
            bathrooms,
            location,
            age,
        })
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn bedrooms(&self) -> u32 {
        self.bedrooms
    }

    pub fn bathrooms(&self) -> f64 {
        self.bathrooms
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn age(&self) -> u32 {
        self.age
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_round_trips_through_str() {
        for loc in Location::ALL {
            assert_eq!(loc.as_str().parse::<Location>().unwrap(), loc);
        }
        assert_eq!("rural".parse::<Location>().unwrap(), Location::Rural);
        assert!("Uptown".parse::<Location>().is_err());
    }

    #[test]
    fn test_new_rejects_non_positive_fields() {
        assert!(PropertyInput::new(0.0, 3, 2.0, Location::Rural, 5).is_err());
        assert!(PropertyInput::new(1200.0, 0, 2.0, Location::Rural, 5).is_err());
        assert!(PropertyInput::new(1200.0, 3, -1.0, Location::Rural, 5).is_err());
        assert!(PropertyInput::new(f64::NAN, 3, 2.0, Location::Rural, 5).is_err());
        assert!(PropertyInput::new(1200.0, 3, 1.5, Location::Rural, 0).is_ok());
    }
}
