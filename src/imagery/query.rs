// src/imagery/query.rs

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use serde::Serialize;

pub const COLLECTION: &str = "COPERNICUS/S2_SR_HARMONIZED";
pub const CLOUD_PROPERTY: &str = "CLOUD_COVERAGE_ASSESSMENT";
pub const MAX_CLOUD: f64 = 20.0;
pub const MASK_BAND: &str = "QA60";
pub const BANDS: [&str; 3] = ["TCI_R", "TCI_G", "TCI_B"];
/// Radius of the square around each cluster point, metres.
pub const BUFFER_METRES: f64 = 1120.0;
pub const DIMENSIONS: u32 = 224;

const METRES_PER_DEGREE: f64 = 111_320.0;

/// Axis-aligned lon/lat box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Bounds {
    /// Square bounds of a `metres` buffer around (lon, lat).
    pub fn around(longitude: f64, latitude: f64, metres: f64) -> Result<Self> {
        if !(-180.0..=180.0).contains(&longitude) || !(-90.0..=90.0).contains(&latitude) {
            return Err(anyhow!("point ({}, {}) out of range", longitude, latitude));
        }
        let dlat = metres / METRES_PER_DEGREE;
        let dlon = metres / (METRES_PER_DEGREE * latitude.to_radians().cos().max(1e-6));
        Ok(Self {
            west: longitude - dlon,
            south: latitude - dlat,
            east: longitude + dlon,
            north: latitude + dlat,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloudFilter {
    pub property: &'static str,
    pub less_than: f64,
}

/// Pixels are kept where `band == 0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PixelMask {
    pub band: &'static str,
    pub equals: u32,
}

/// A median-composite thumbnail over one cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThumbnailRequest {
    pub collection: &'static str,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub region: Bounds,
    pub cloud: CloudFilter,
    pub mask: PixelMask,
    pub bands: [&'static str; 3],
    pub reducer: &'static str,
    pub dimensions: u32,
    pub format: &'static str,
    pub min: u32,
    pub max: u32,
}

impl ThumbnailRequest {
    /// Calendar-year composite around (lon, lat).
    pub fn for_point(year: i32, longitude: f64, latitude: f64) -> Result<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| anyhow!("invalid year {}", year))?;
        let end = NaiveDate::from_ymd_opt(year, 12, 31)
            .ok_or_else(|| anyhow!("invalid year {}", year))?;
        Ok(Self {
            collection: COLLECTION,
            start,
            end,
            region: Bounds::around(longitude, latitude, BUFFER_METRES)?,
            cloud: CloudFilter {
                property: CLOUD_PROPERTY,
                less_than: MAX_CLOUD,
            },
            mask: PixelMask {
                band: MASK_BAND,
                equals: 0,
            },
            bands: BANDS,
            reducer: "median",
            dimensions: DIMENSIONS,
            format: "png",
            min: 0,
            max: 255,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_square_in_metres() -> Result<()> {
        let b = Bounds::around(-77.03, -12.05, BUFFER_METRES)?;
        let half_lat = (b.north - b.south) / 2.0 * METRES_PER_DEGREE;
        assert!((half_lat - BUFFER_METRES).abs() < 1e-6);
        let half_lon =
            (b.east - b.west) / 2.0 * METRES_PER_DEGREE * (-12.05f64).to_radians().cos();
        assert!((half_lon - BUFFER_METRES).abs() < 1e-6);
        assert!(b.west < -77.03 && -77.03 < b.east);
        Ok(())
    }

    #[test]
    fn request_covers_the_survey_year() -> Result<()> {
        let req = ThumbnailRequest::for_point(2024, -77.03, -12.05)?;
        let json = serde_json::to_value(&req)?;
        assert_eq!(json["start"], "2024-01-01");
        assert_eq!(json["end"], "2024-12-31");
        assert_eq!(json["collection"], COLLECTION);
        assert_eq!(json["bands"][2], "TCI_B");
        assert_eq!(json["dimensions"], 224);
        assert_eq!(json["cloud"]["less_than"], 20.0);
        Ok(())
    }

    #[test]
    fn rejects_bad_coordinates() {
        assert!(ThumbnailRequest::for_point(2024, -200.0, 0.0).is_err());
        assert!(Bounds::around(0.0, 95.0, 10.0).is_err());
    }
}
