#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory spatial index for LSOA-to-ward attribution.
//!
//! Loads ward and LSOA polygons from `GeoJSON` feature collections, builds
//! an R-tree over the ward bounding boxes, and assigns each LSOA to the
//! ward whose polygon contains the LSOA's centroid.
//!
//! Wards are expected to tile the study area, but boundary files are not
//! always clean. When more than one ward contains a centroid the lowest
//! ward code wins, so the result never depends on file order. A centroid
//! lying exactly on a ward edge is contained by no polygon and the area is
//! reported as unmapped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use burglary_map_geography_models::{AreaWardMapping, Ward};
use geo::{BoundingRect as _, Centroid as _, Contains as _, MultiPolygon, Point};
use geojson::GeoJson;
use rstar::{AABB, RTree, RTreeObject};

/// Errors that can occur while loading boundaries or attributing areas.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// I/O error reading a boundary file.
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid `GeoJSON`.
    #[error("GeoJSON parse error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The document parsed, but is not a `FeatureCollection`.
    #[error("Expected a GeoJSON FeatureCollection")]
    NotFeatureCollection,

    /// A feature lacks the property that carries its code.
    #[error("Feature {index} is missing required field '{property}'")]
    MissingProperty {
        /// Position of the feature in the collection.
        index: usize,
        /// The property that was looked up.
        property: String,
    },

    /// A feature's geometry is missing, malformed, or not polygonal.
    #[error("Invalid geometry for boundary {code}: {message}")]
    Geometry {
        /// Code of the offending boundary.
        code: String,
        /// Description of what went wrong.
        message: String,
    },
}

/// A named polygon read from a boundary file.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    pub code: String,
    pub name: Option<String>,
    pub polygon: MultiPolygon<f64>,
}

impl Boundary {
    /// Geometric centroid of the polygon, `None` for zero-area geometry.
    #[must_use]
    pub fn centroid(&self) -> Option<Point<f64>> {
        self.polygon.centroid()
    }
}

/// Reads every feature of a `GeoJSON` boundary file.
///
/// # Errors
///
/// Returns [`SpatialError`] if the file cannot be read or any feature is
/// malformed. No partial result is produced.
pub fn load_boundaries(
    path: &Path,
    code_property: &str,
    name_property: Option<&str>,
) -> Result<Vec<Boundary>, SpatialError> {
    let contents = std::fs::read_to_string(path).map_err(|source| SpatialError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let boundaries = parse_boundaries(&contents, code_property, name_property)?;
    log::info!(
        "Loaded {} boundaries from {}",
        boundaries.len(),
        path.display()
    );
    Ok(boundaries)
}

/// Parses a `GeoJSON` `FeatureCollection` into boundaries.
///
/// # Errors
///
/// Returns [`SpatialError`] if the document is not a feature collection,
/// a feature lacks `code_property`, or a geometry is not a valid polygon.
pub fn parse_boundaries(
    geojson_str: &str,
    code_property: &str,
    name_property: Option<&str>,
) -> Result<Vec<Boundary>, SpatialError> {
    let GeoJson::FeatureCollection(collection) = geojson_str.parse::<GeoJson>()? else {
        return Err(SpatialError::NotFeatureCollection);
    };

    let mut boundaries = Vec::with_capacity(collection.features.len());

    for (index, feature) in collection.features.into_iter().enumerate() {
        let code = feature
            .property(code_property)
            .and_then(property_to_string)
            .filter(|code| !code.is_empty())
            .ok_or_else(|| SpatialError::MissingProperty {
                index,
                property: code_property.to_owned(),
            })?;
        let name = name_property
            .and_then(|p| feature.property(p))
            .and_then(property_to_string);

        let Some(geometry) = feature.geometry else {
            return Err(SpatialError::Geometry {
                code,
                message: "feature has no geometry".to_owned(),
            });
        };
        let polygon = to_multipolygon(geometry).map_err(|message| SpatialError::Geometry {
            code: code.clone(),
            message,
        })?;

        boundaries.push(Boundary {
            code,
            name,
            polygon,
        });
    }

    Ok(boundaries)
}

fn property_to_string(value: &geojson::JsonValue) -> Option<String> {
    match value {
        geojson::JsonValue::String(s) => Some(s.trim().to_owned()),
        geojson::JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Converts a `GeoJSON` geometry into a validated [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn to_multipolygon(geometry: geojson::Geometry) -> Result<MultiPolygon<f64>, String> {
    let geo_geom: geo::Geometry<f64> = geometry.try_into().map_err(|e| format!("{e}"))?;
    let multi_polygon = match geo_geom {
        geo::Geometry::MultiPolygon(mp) => mp,
        geo::Geometry::Polygon(p) => MultiPolygon(vec![p]),
        other => {
            return Err(format!(
                "expected Polygon or MultiPolygon, found {}",
                geometry_kind(&other)
            ));
        }
    };

    if multi_polygon.0.is_empty() {
        return Err("empty MultiPolygon".to_owned());
    }
    for polygon in &multi_polygon.0 {
        let ring = polygon.exterior();
        if ring.0.len() < 4 {
            return Err(format!(
                "exterior ring has {} positions, at least 4 required",
                ring.0.len()
            ));
        }
        if ring
            .0
            .iter()
            .chain(polygon.interiors().iter().flat_map(|r| r.0.iter()))
            .any(|c| !c.x.is_finite() || !c.y.is_finite())
        {
            return Err("non-finite coordinate".to_owned());
        }
    }

    Ok(multi_polygon)
}

const fn geometry_kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        _ => "a non-polygonal geometry",
    }
}

/// A ward polygon stored in the R-tree with its metadata.
struct WardEntry {
    ward: Ward,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for WardEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Pre-built spatial index over ward polygons.
///
/// Built once per run and shared read-only by every consumer.
pub struct WardIndex {
    wards: RTree<WardEntry>,
}

impl WardIndex {
    /// Builds the R-tree from loaded ward boundaries.
    #[must_use]
    pub fn new(wards: Vec<Boundary>) -> Self {
        let entries: Vec<WardEntry> = wards
            .into_iter()
            .map(|b| WardEntry {
                envelope: compute_envelope(&b.polygon),
                ward: Ward {
                    code: b.code,
                    name: b.name,
                },
                polygon: b.polygon,
            })
            .collect();
        log::info!("Built ward index over {} wards", entries.len());

        Self {
            wards: RTree::bulk_load(entries),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.wards.size()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.wards.size() == 0
    }

    /// Look up the ward containing a point.
    ///
    /// Overlapping wards resolve to the lowest code.
    #[must_use]
    pub fn lookup_ward(&self, lng: f64, lat: f64) -> Option<&Ward> {
        let point = Point::new(lng, lat);
        let query_env = AABB::from_point([lng, lat]);

        self.wards
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.contains(&point))
            .map(|entry| &entry.ward)
            .min_by(|a, b| a.code.cmp(&b.code))
    }
}

/// Assigns every area to the ward containing its polygon's centroid.
///
/// Areas are processed in code order and each code appears once in the
/// result. Areas whose centroid lies in no ward are listed in
/// [`AreaWardMapping::unmapped`].
///
/// # Errors
///
/// Returns [`SpatialError::Geometry`] if an area has no centroid
/// (zero-area geometry).
pub fn assign_areas(index: &WardIndex, areas: &[Boundary]) -> Result<AreaWardMapping, SpatialError> {
    let mut by_code: BTreeMap<&str, &Boundary> = BTreeMap::new();
    for area in areas {
        by_code.entry(area.code.as_str()).or_insert(area);
    }

    if index.is_empty() {
        log::warn!("No ward boundaries loaded; every area will be unmapped");
    }

    let mut mapping = AreaWardMapping::default();

    for (code, area) in by_code {
        let centroid = area.centroid().ok_or_else(|| SpatialError::Geometry {
            code: code.to_owned(),
            message: "polygon has no centroid".to_owned(),
        })?;

        match index.lookup_ward(centroid.x(), centroid.y()) {
            Some(ward) => {
                mapping.assigned.insert(code.to_owned(), ward.clone());
            }
            None => mapping.unmapped.push(code.to_owned()),
        }
    }

    log::info!(
        "Mapped {} areas to wards ({} unmapped)",
        mapping.mapped_count(),
        mapping.unmapped_count()
    );
    if mapping.unmapped_count() > 0 {
        log::warn!(
            "{} areas have no containing ward and are excluded from ward totals",
            mapping.unmapped_count()
        );
    }

    Ok(mapping)
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}
