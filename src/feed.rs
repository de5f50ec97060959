//! GeoJSON feed transport and decoding.
//!
//! Both feeds are plain GeoJSON `FeatureCollection`s. The collection itself must parse,
//! but individual features are decoded one at a time so a single malformed record is
//! skipped instead of failing the whole feed.

use std::{collections::HashMap, fmt};

use bevy::prelude::*;
use reqwest::{
    StatusCode,
    blocking::Client,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub const USGS_ALL_WEEK_URL: &str =
    "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/all_week.geojson";

pub const PB2002_BOUNDARIES_URL: &str =
    "https://raw.githubusercontent.com/fraxen/tectonicplates/master/GeoJSON/PB2002_boundaries.json";

/// Endpoints of the two feeds loaded at startup.
#[derive(Resource, Clone, Debug)]
pub struct FeedConfig {
    pub earthquakes_url: String,
    pub tectonic_plates_url: String,
    /// Optional HTTP headers sent with both requests.
    pub headers: HashMap<String, String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        let mut headers = HashMap::new();
        headers.insert("User-Agent".to_string(), "bevy-quake-map/0.1".to_string());
        Self {
            earthquakes_url: USGS_ALL_WEEK_URL.to_string(),
            tectonic_plates_url: PB2002_BOUNDARIES_URL.to_string(),
            headers,
        }
    }
}

impl FeedConfig {
    pub fn url(&self, feed: FeedKind) -> &str {
        match feed {
            FeedKind::Earthquakes => &self.earthquakes_url,
            FeedKind::TectonicPlates => &self.tectonic_plates_url,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Earthquakes,
    TectonicPlates,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedKind::Earthquakes => f.write_str("earthquakes"),
            FeedKind::TectonicPlates => f.write_str("tectonic plates"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP request failed with status {0}")]
    HttpStatus(StatusCode),
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid header: {0}")]
    InvalidHeader(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Where feed documents come from.
pub trait FeedSource: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FeedError>;
}

/// Single blocking GET per call; no retry, no timeout beyond the client defaults.
pub struct HttpFeedSource {
    client: Client,
}

impl HttpFeedSource {
    pub fn new(headers: &HashMap<String, String>) -> Result<Self, FeedError> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| FeedError::InvalidHeader(format!("{name}: {err}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| FeedError::InvalidHeader(format!("{name}: {err}")))?;
            default_headers.insert(name, value);
        }
        let client = Client::builder().default_headers(default_headers).build()?;
        Ok(Self { client })
    }
}

impl FeedSource for HttpFeedSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FeedError> {
        let response = self.client.get(url).send()?;
        if !response.status().is_success() {
            return Err(FeedError::HttpStatus(response.status()));
        }
        Ok(response.bytes()?.to_vec())
    }
}

#[derive(Deserialize)]
struct RawCollection {
    features: Vec<Value>,
}

fn raw_features(bytes: &[u8]) -> Result<Vec<Value>, FeedError> {
    let collection: RawCollection = serde_json::from_slice(bytes)?;
    Ok(collection.features)
}

#[derive(Deserialize)]
struct QuakeGeometry {
    #[serde(default)]
    coordinates: Option<Vec<Option<f64>>>,
}

#[derive(Deserialize, Default)]
struct QuakeProperties {
    #[serde(default)]
    mag: Option<f64>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Deserialize)]
struct RawQuake {
    #[serde(default)]
    geometry: Option<QuakeGeometry>,
    #[serde(default)]
    properties: Option<QuakeProperties>,
}

/// One earthquake record from the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct QuakeFeature {
    /// `(longitude, latitude, depth)`; `None` when the feed gave no usable position.
    pub coordinates: Option<(f64, f64, f64)>,
    /// `None` when the feed reported no magnitude.
    pub magnitude: Option<f64>,
    pub title: String,
}

impl From<RawQuake> for QuakeFeature {
    fn from(raw: RawQuake) -> Self {
        let coordinates = raw
            .geometry
            .and_then(|geometry| geometry.coordinates)
            .and_then(|coords| match coords.as_slice() {
                [Some(lon), Some(lat), depth, ..] => Some((*lon, *lat, depth.unwrap_or(0.0))),
                [Some(lon), Some(lat)] => Some((*lon, *lat, 0.0)),
                _ => None,
            });
        let properties = raw.properties.unwrap_or_default();
        Self {
            coordinates,
            magnitude: properties.mag,
            title: properties.title.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuakeCollection {
    pub features: Vec<QuakeFeature>,
}

pub fn parse_earthquakes(bytes: &[u8]) -> Result<QuakeCollection, FeedError> {
    let features = raw_features(bytes)?
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<RawQuake>(value) {
            Ok(raw) => Some(QuakeFeature::from(raw)),
            Err(err) => {
                debug!("skipping malformed earthquake feature: {err}");
                None
            }
        })
        .collect();
    Ok(QuakeCollection { features })
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum RawGeometry {
    LineString { coordinates: Vec<Vec<f64>> },
    MultiLineString { coordinates: Vec<Vec<Vec<f64>>> },
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Vec<f64>>>> },
}

#[derive(Deserialize)]
struct RawPlateFeature {
    geometry: RawGeometry,
    #[serde(default)]
    properties: Option<HashMap<String, Value>>,
}

/// A single boundary line in lon/lat degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateBoundary {
    pub name: Option<String>,
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlateCollection {
    pub boundaries: Vec<PlateBoundary>,
}

fn line_points(positions: &[Vec<f64>]) -> Vec<(f64, f64)> {
    positions
        .iter()
        .filter_map(|pos| match pos.as_slice() {
            [lon, lat, ..] => Some((*lon, *lat)),
            _ => None,
        })
        .collect()
}

/// Splits every feature into drawable lines. Multi-geometries yield one line per part,
/// polygon rings are kept closed as given by the feed.
pub fn parse_plates(bytes: &[u8]) -> Result<PlateCollection, FeedError> {
    let mut boundaries = Vec::new();
    for value in raw_features(bytes)? {
        let feature = match serde_json::from_value::<RawPlateFeature>(value) {
            Ok(feature) => feature,
            Err(err) => {
                debug!("skipping unsupported plate feature: {err}");
                continue;
            }
        };
        let name = feature
            .properties
            .as_ref()
            .and_then(|p| p.get("Name"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let lines: Vec<Vec<(f64, f64)>> = match feature.geometry {
            RawGeometry::LineString { coordinates } => vec![line_points(&coordinates)],
            RawGeometry::MultiLineString { coordinates }
            | RawGeometry::Polygon { coordinates } => {
                coordinates.iter().map(|l| line_points(l)).collect()
            }
            RawGeometry::MultiPolygon { coordinates } => coordinates
                .iter()
                .flatten()
                .map(|ring| line_points(ring))
                .collect(),
        };
        boundaries.extend(
            lines
                .into_iter()
                .filter(|points| points.len() >= 2)
                .map(|points| PlateBoundary {
                    name: name.clone(),
                    points,
                }),
        );
    }
    Ok(PlateCollection { boundaries })
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAKES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature",
             "properties": {"mag": 4.6, "title": "M 4.6 - 10 km SW of Somewhere"},
             "geometry": {"type": "Point", "coordinates": [-120.5, 36.1, 12.3]}},
            {"type": "Feature",
             "properties": {"mag": 1.2, "title": "no position"},
             "geometry": null},
            {"type": "Feature",
             "properties": {"mag": null, "title": "M ? - unknown"},
             "geometry": {"type": "Point", "coordinates": [10.0, 20.0]}},
            {"type": "Feature",
             "properties": {"mag": 2.0, "title": "broken"},
             "geometry": {"type": "Point", "coordinates": "nope"}}
        ]
    }"#;

    #[test]
    fn earthquakes_keep_missing_positions_as_none() {
        let collection = parse_earthquakes(QUAKES.as_bytes()).unwrap();
        assert_eq!(collection.features.len(), 3);
        assert_eq!(
            collection.features[0].coordinates,
            Some((-120.5, 36.1, 12.3))
        );
        assert_eq!(collection.features[0].magnitude, Some(4.6));
        assert_eq!(collection.features[1].coordinates, None);
        assert_eq!(collection.features[2].coordinates, Some((10.0, 20.0, 0.0)));
        assert_eq!(collection.features[2].magnitude, None);
    }

    #[test]
    fn not_a_collection() {
        assert!(matches!(
            parse_earthquakes(br#"{"type": "Feature"}"#),
            Err(FeedError::Decode(_))
        ));
        assert!(matches!(
            parse_plates(b"<html>"),
            Err(FeedError::Decode(_))
        ));
    }

    #[test]
    fn plates_split_into_lines() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"Name": "AF-AN"},
                 "geometry": {"type": "LineString",
                              "coordinates": [[-0.4, -54.8], [0.0, -54.6], [1.2, -54.1]]}},
                {"type": "Feature", "properties": {},
                 "geometry": {"type": "MultiLineString",
                              "coordinates": [[[1.0, 2.0], [3.0, 4.0]], [[5.0, 6.0, 0.0], [7.0, 8.0, 0.0]]]}},
                {"type": "Feature", "properties": {},
                 "geometry": {"type": "Point", "coordinates": [1.0, 2.0]}},
                {"type": "Feature", "properties": {},
                 "geometry": {"type": "LineString", "coordinates": [[1.0, 2.0]]}}
            ]
        }"#;
        let plates = parse_plates(json.as_bytes()).unwrap();
        assert_eq!(plates.boundaries.len(), 3);
        assert_eq!(plates.boundaries[0].name.as_deref(), Some("AF-AN"));
        assert_eq!(plates.boundaries[0].points.len(), 3);
        assert_eq!(plates.boundaries[2].points, vec![(5.0, 6.0), (7.0, 8.0)]);
    }

    #[test]
    fn bad_header_is_a_config_error() {
        let mut headers = HashMap::new();
        headers.insert("User Agent".to_string(), "quake".to_string());
        assert!(matches!(
            HttpFeedSource::new(&headers),
            Err(FeedError::InvalidHeader(_))
        ));

        let mut headers = HashMap::new();
        headers.insert("User-Agent".to_string(), "line\nbreak".to_string());
        assert!(matches!(
            HttpFeedSource::new(&headers),
            Err(FeedError::InvalidHeader(_))
        ));
    }
}
