//! AU Feature Extractor
//!
//! Pure geometry over the 68-point topology. Distances are divided by the
//! inter-ocular distance (36-45) so features are scale-free.

use serde::{Deserialize, Serialize};

use crate::types::{AuFeatureVector, AuId, AuMap, Point2D, EPSILON};

// ==================== Landmark indices ====================

const EYE_OUTER_R: usize = 36;
const EYE_INNER_R: usize = 39;
const EYE_INNER_L: usize = 42;
const EYE_OUTER_L: usize = 45;

const RIGHT_EYE: [usize; 6] = [36, 37, 38, 39, 40, 41];
const LEFT_EYE: [usize; 6] = [42, 43, 44, 45, 46, 47];

const BROW_OUTER_R: usize = 17;
const BROW_INNER_R: usize = 21;
const BROW_INNER_L: usize = 22;
const BROW_OUTER_L: usize = 26;

const NOSE_BRIDGE: usize = 27;
const NOSE_BASE: usize = 33;

const MOUTH_CORNER_R: usize = 48;
const MOUTH_CORNER_L: usize = 54;
const UPPER_LIP_TOP: usize = 51;
const LOWER_LIP_BOTTOM: usize = 57;
const INNER_UPPER: usize = 62;
const INNER_LOWER: usize = 66;

const CHIN: usize = 8;

/// Landmarks each AU feature reads; the AU is unavailable when any is missing.
pub fn required_landmarks(au: AuId) -> &'static [usize] {
    match au {
        AuId::Au1 => &[36, 45, 21, 22, 39, 42],
        AuId::Au2 => &[36, 45, 17, 26],
        AuId::Au4 => &[36, 45, 21, 22],
        AuId::Au5 | AuId::Au43 => &[36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47],
        AuId::Au6 => &[36, 45, 48, 54],
        AuId::Au7 => &[36, 39, 40, 41, 42, 45, 46, 47],
        AuId::Au9 => &[36, 45, 27, 33],
        AuId::Au10 => &[36, 45, 33, 51],
        AuId::Au12 | AuId::Au15 => &[48, 51, 54],
        AuId::Au14 | AuId::Au20 => &[36, 45, 48, 54],
        AuId::Au17 => &[36, 45, 57, 8],
        AuId::Au23 => &[36, 45, 51, 57, 62, 66],
        AuId::Au24 => &[36, 45, 51, 57],
        AuId::Au25 => &[36, 45, 62, 66],
        AuId::Au26 => &[36, 45, 33, 8],
        AuId::Au27 => &[48, 54, 62, 66],
    }
}

// ==================== Outputs ====================

/// Face geometry consumed by the geometric emotion source.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeometricFeatures {
    /// Mean brow-to-eye vertical gap
    pub eyebrow_height: f64,
    /// Mean eye aspect ratio
    pub eye_openness: f64,
    /// Outer mouth height over mouth width
    pub mouth_openness: f64,
    /// Lip midline minus corner height; positive when corners lift
    pub mouth_curvature: f64,
    pub nose_length: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EyeMetrics {
    pub left_ear: f64,
    pub right_ear: f64,
    pub mean_ear: f64,
}

impl EyeMetrics {
    pub fn asymmetry(&self) -> f64 {
        (self.left_ear - self.right_ear).abs()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameFeatures {
    pub aus: AuFeatureVector,
    pub geometric: Option<GeometricFeatures>,
    pub eyes: Option<EyeMetrics>,
}

impl FrameFeatures {
    pub fn unavailable() -> Self {
        Self {
            aus: AuMap::splat(None),
            geometric: None,
            eyes: None,
        }
    }
}

// ==================== Extraction ====================

/// Extracts every feature a frame supports.
pub fn extract(points: &[Point2D]) -> FrameFeatures {
    let Some(iod) = inter_ocular_distance(points) else {
        return FrameFeatures::unavailable();
    };

    let aus = AuMap::from_fn(|au| {
        let available = required_landmarks(au).iter().all(|&i| i < points.len());
        if !available {
            return None;
        }
        Some(au_feature(au, points, iod)).filter(|v| v.is_finite())
    });

    FrameFeatures {
        aus,
        geometric: geometric_features(points, iod),
        eyes: eye_metrics(points),
    }
}

/// AU features only; see [`extract`].
pub fn extract_au_features(points: &[Point2D]) -> AuFeatureVector {
    extract(points).aus
}

fn inter_ocular_distance(points: &[Point2D]) -> Option<f64> {
    let outer_r = points.get(EYE_OUTER_R)?;
    let outer_l = points.get(EYE_OUTER_L)?;
    let iod = outer_r.distance(outer_l);
    (iod.is_finite() && iod >= EPSILON).then_some(iod)
}

fn au_feature(au: AuId, p: &[Point2D], iod: f64) -> f64 {
    let dist = |a: usize, b: usize| p[a].distance(&p[b]) / iod;
    match au {
        AuId::Au1 => {
            let right = p[EYE_INNER_R].y - p[BROW_INNER_R].y;
            let left = p[EYE_INNER_L].y - p[BROW_INNER_L].y;
            (right + left) / 2.0 / iod
        }
        AuId::Au2 => {
            let right = p[EYE_OUTER_R].y - p[BROW_OUTER_R].y;
            let left = p[EYE_OUTER_L].y - p[BROW_OUTER_L].y;
            (right + left) / 2.0 / iod
        }
        AuId::Au4 => dist(BROW_INNER_R, BROW_INNER_L),
        AuId::Au5 | AuId::Au43 => {
            let right = eye_aspect_ratio(p, &RIGHT_EYE).unwrap_or(f64::NAN);
            let left = eye_aspect_ratio(p, &LEFT_EYE).unwrap_or(f64::NAN);
            (right + left) / 2.0
        }
        AuId::Au6 => (dist(EYE_OUTER_R, MOUTH_CORNER_R) + dist(EYE_OUTER_L, MOUTH_CORNER_L)) / 2.0,
        AuId::Au7 => (lower_lid_depth(p, &RIGHT_EYE) + lower_lid_depth(p, &LEFT_EYE)) / 2.0,
        AuId::Au9 => dist(NOSE_BRIDGE, NOSE_BASE),
        AuId::Au10 => dist(NOSE_BASE, UPPER_LIP_TOP),
        AuId::Au12 | AuId::Au15 => corner_descent_angle(p),
        AuId::Au14 | AuId::Au20 => dist(MOUTH_CORNER_R, MOUTH_CORNER_L),
        AuId::Au17 => dist(LOWER_LIP_BOTTOM, CHIN),
        AuId::Au23 => (dist(UPPER_LIP_TOP, INNER_UPPER) + dist(LOWER_LIP_BOTTOM, INNER_LOWER)) / 2.0,
        AuId::Au24 => dist(UPPER_LIP_TOP, LOWER_LIP_BOTTOM),
        AuId::Au25 => dist(INNER_UPPER, INNER_LOWER),
        AuId::Au26 => dist(NOSE_BASE, CHIN),
        AuId::Au27 => {
            let width = p[MOUTH_CORNER_R].distance(&p[MOUTH_CORNER_L]);
            if width < EPSILON {
                f64::NAN
            } else {
                p[INNER_UPPER].distance(&p[INNER_LOWER]) / width
            }
        }
    }
}

/// `(|p2-p6| + |p3-p5|) / (2|p1-p4|)`
fn eye_aspect_ratio(p: &[Point2D], eye: &[usize; 6]) -> Option<f64> {
    if eye.iter().any(|&i| i >= p.len()) {
        return None;
    }
    let vertical1 = p[eye[1]].distance(&p[eye[5]]);
    let vertical2 = p[eye[2]].distance(&p[eye[4]]);
    let horizontal = p[eye[0]].distance(&p[eye[3]]);
    if horizontal < 1e-3 {
        return None;
    }
    Some((vertical1 + vertical2) / (2.0 * horizontal))
}

/// Depth of the lower lid below the eye-corner line, over eye width.
fn lower_lid_depth(p: &[Point2D], eye: &[usize; 6]) -> f64 {
    let corner_line = (p[eye[0]].y + p[eye[3]].y) / 2.0;
    let lower_lid = (p[eye[4]].y + p[eye[5]].y) / 2.0;
    let width = p[eye[0]].distance(&p[eye[3]]);
    if width < EPSILON {
        return f64::NAN;
    }
    (lower_lid - corner_line) / width
}

/// Mean angle (radians) of the mouth corners below the upper-lip midpoint.
fn corner_descent_angle(p: &[Point2D]) -> f64 {
    let anchor = p[UPPER_LIP_TOP];
    let angle = |corner: Point2D| (corner.y - anchor.y).atan2((corner.x - anchor.x).abs());
    (angle(p[MOUTH_CORNER_R]) + angle(p[MOUTH_CORNER_L])) / 2.0
}

fn geometric_features(p: &[Point2D], iod: f64) -> Option<GeometricFeatures> {
    if p.len() <= INNER_LOWER {
        return None;
    }
    let mean_y = |range: std::ops::RangeInclusive<usize>| {
        let n = range.clone().count() as f64;
        range.map(|i| p[i].y).sum::<f64>() / n
    };
    let eyebrow_height = (mean_y(36..=47) - mean_y(17..=26)) / iod;

    let eye_openness = match (eye_aspect_ratio(p, &RIGHT_EYE), eye_aspect_ratio(p, &LEFT_EYE)) {
        (Some(r), Some(l)) => (r + l) / 2.0,
        _ => return None,
    };

    let width = p[MOUTH_CORNER_R].distance(&p[MOUTH_CORNER_L]);
    if width < EPSILON {
        return None;
    }
    let mouth_openness = p[UPPER_LIP_TOP].distance(&p[LOWER_LIP_BOTTOM]) / width;

    let lip_mid = (p[UPPER_LIP_TOP].y + p[LOWER_LIP_BOTTOM].y) / 2.0;
    let corners = (p[MOUTH_CORNER_R].y + p[MOUTH_CORNER_L].y) / 2.0;
    let mouth_curvature = (lip_mid - corners) / iod;

    let nose_length = p[NOSE_BRIDGE].distance(&p[NOSE_BASE]) / iod;

    let features = GeometricFeatures {
        eyebrow_height,
        eye_openness,
        mouth_openness,
        mouth_curvature,
        nose_length,
    };
    let finite = [eyebrow_height, eye_openness, mouth_openness, mouth_curvature, nose_length]
        .iter()
        .all(|v| v.is_finite());
    finite.then_some(features)
}

fn eye_metrics(p: &[Point2D]) -> Option<EyeMetrics> {
    let right_ear = eye_aspect_ratio(p, &RIGHT_EYE)?;
    let left_ear = eye_aspect_ratio(p, &LEFT_EYE)?;
    if !(left_ear.is_finite() && right_ear.is_finite()) {
        return None;
    }
    Some(EyeMetrics {
        left_ear,
        right_ear,
        mean_ear: (left_ear + right_ear) / 2.0,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Symmetric frontal face used across the crate's tests.
    pub(crate) fn neutral_face() -> Vec<Point2D> {
        let coords: [(f64, f64); 68] = [
            (40.0, 100.0), (41.0, 115.0), (43.0, 130.0), (46.0, 145.0), (51.0, 160.0),
            (59.0, 173.0), (69.0, 184.0), (84.0, 193.0), (100.0, 196.0), (116.0, 193.0),
            (131.0, 184.0), (141.0, 173.0), (149.0, 160.0), (154.0, 145.0), (157.0, 130.0),
            (159.0, 115.0), (160.0, 100.0),
            (50.0, 80.0), (58.0, 76.0), (66.0, 75.0), (74.0, 76.0), (82.0, 78.0),
            (118.0, 78.0), (126.0, 76.0), (134.0, 75.0), (142.0, 76.0), (150.0, 80.0),
            (100.0, 100.0), (100.0, 110.0), (100.0, 120.0), (100.0, 130.0),
            (90.0, 138.0), (95.0, 140.0), (100.0, 141.0), (105.0, 140.0), (110.0, 138.0),
            (55.0, 100.0), (63.0, 96.0), (72.0, 96.0), (80.0, 100.0), (72.0, 104.0), (63.0, 104.0),
            (120.0, 100.0), (128.0, 96.0), (137.0, 96.0), (145.0, 100.0), (137.0, 104.0), (128.0, 104.0),
            (80.0, 165.0), (87.0, 160.0), (94.0, 158.0), (100.0, 159.0), (106.0, 158.0), (113.0, 160.0),
            (120.0, 165.0), (113.0, 172.0), (106.0, 175.0), (100.0, 176.0), (94.0, 175.0), (87.0, 172.0),
            (84.0, 165.0), (92.0, 164.0), (100.0, 164.0), (108.0, 164.0), (116.0, 165.0),
            (108.0, 167.0), (100.0, 167.0), (92.0, 167.0),
        ];
        coords.iter().map(|&(x, y)| Point2D::new(x, y)).collect()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_neutral_face_features() {
        let aus = extract_au_features(&neutral_face());
        assert!(approx(aus[AuId::Au1].unwrap(), 22.0 / 90.0));
        assert!(approx(aus[AuId::Au4].unwrap(), 36.0 / 90.0));
        assert!(approx(aus[AuId::Au5].unwrap(), 0.32));
        assert_eq!(aus[AuId::Au5], aus[AuId::Au43]);
        assert!(approx(aus[AuId::Au9].unwrap(), 41.0 / 90.0));
        assert!(approx(aus[AuId::Au12].unwrap(), 0.3f64.atan()));
        assert!(approx(aus[AuId::Au27].unwrap(), 3.0 / 40.0));
    }

    #[test]
    fn test_scale_invariance() {
        let face = neutral_face();
        let scaled: Vec<Point2D> = face.iter().map(|p| Point2D::new(p.x * 2.5, p.y * 2.5)).collect();
        let a = extract_au_features(&face);
        let b = extract_au_features(&scaled);
        for au in AuId::ALL {
            assert!(approx(a[au].unwrap(), b[au].unwrap()), "{au:?}");
        }
    }

    #[test]
    fn test_short_landmark_set_marks_mouth_unavailable() {
        let face = neutral_face();
        let aus = extract_au_features(&face[..48]);
        assert!(aus[AuId::Au1].is_some());
        assert!(aus[AuId::Au5].is_some());
        assert!(aus[AuId::Au12].is_none());
        assert!(aus[AuId::Au25].is_none());
    }

    #[test]
    fn test_degenerate_inter_ocular_distance() {
        let mut face = neutral_face();
        face[45] = face[36];
        let features = extract(&face);
        assert!(features.aus.values().all(Option::is_none));
        assert!(features.geometric.is_none());
    }

    #[test]
    fn test_geometric_features_of_neutral_face() {
        let geo = extract(&neutral_face()).geometric.unwrap();
        assert!(approx(geo.eyebrow_height, 23.0 / 90.0));
        assert!(approx(geo.eye_openness, 0.32));
        assert!(approx(geo.mouth_openness, 17.0 / 40.0));
        assert!(approx(geo.mouth_curvature, 2.5 / 90.0));
    }

    #[test]
    fn test_eye_metrics_closed_eye() {
        let mut face = neutral_face();
        for i in [37, 38, 40, 41, 43, 44, 46, 47] {
            face[i].y = 100.0;
        }
        let eyes = extract(&face).eyes.unwrap();
        assert!(eyes.mean_ear < 1e-9);
        assert_eq!(eyes.asymmetry(), 0.0);
    }

    #[test]
    fn test_corner_drop_raises_descent_angle() {
        let mut face = neutral_face();
        face[48].y += 1.8;
        face[54].y += 1.8;
        let base = extract_au_features(&neutral_face());
        let sad = extract_au_features(&face);
        assert!(sad[AuId::Au15].unwrap() > base[AuId::Au15].unwrap());
    }
}
