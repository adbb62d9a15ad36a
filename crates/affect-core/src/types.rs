//! Common Types and Constants
//!
//! Closed enumerations (action units, emotions) and the landmark and
//! distribution types shared by every stage of the pipeline.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::ops::{Index, IndexMut};

// ==================== Constants ====================

/// Numerical stability epsilon
pub const EPSILON: f64 = 1e-10;

/// Number of points in the canonical facial topology
pub const LANDMARK_COUNT: usize = 68;

/// Upper bound of the AU intensity scale
pub const MAX_INTENSITY: f64 = 5.0;

/// Number of tracked action units
pub const AU_COUNT: usize = 19;

/// Number of emotion labels
pub const EMOTION_COUNT: usize = 8;

// ==================== Landmarks ====================

/// 2D landmark in image coordinates (y grows downwards)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn distance(&self, other: &Point2D) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    #[inline]
    pub fn midpoint(&self, other: &Point2D) -> Point2D {
        Point2D::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// One frame of landmark geometry from the external localizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkFrame {
    pub points: Vec<Point2D>,
    /// Monotonic capture time in milliseconds
    pub timestamp_ms: f64,
}

impl LandmarkFrame {
    pub fn new(points: Vec<Point2D>, timestamp_ms: f64) -> Self {
        Self {
            points,
            timestamp_ms,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.points.len() >= LANDMARK_COUNT
    }
}

// ==================== Action Units ====================

/// Direction of geometric change that counts as an activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Increase,
    Decrease,
    Either,
}

impl Polarity {
    /// Projects a signed deviation onto this polarity.
    #[inline]
    pub fn project(self, deviation: f64) -> f64 {
        match self {
            Polarity::Increase => deviation,
            Polarity::Decrease => -deviation,
            Polarity::Either => deviation.abs(),
        }
    }
}

/// FACS action units tracked by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AuId {
    #[serde(rename = "AU1")]
    Au1,
    #[serde(rename = "AU2")]
    Au2,
    #[serde(rename = "AU4")]
    Au4,
    #[serde(rename = "AU5")]
    Au5,
    #[serde(rename = "AU6")]
    Au6,
    #[serde(rename = "AU7")]
    Au7,
    #[serde(rename = "AU9")]
    Au9,
    #[serde(rename = "AU10")]
    Au10,
    #[serde(rename = "AU12")]
    Au12,
    #[serde(rename = "AU14")]
    Au14,
    #[serde(rename = "AU15")]
    Au15,
    #[serde(rename = "AU17")]
    Au17,
    #[serde(rename = "AU20")]
    Au20,
    #[serde(rename = "AU23")]
    Au23,
    #[serde(rename = "AU24")]
    Au24,
    #[serde(rename = "AU25")]
    Au25,
    #[serde(rename = "AU26")]
    Au26,
    #[serde(rename = "AU27")]
    Au27,
    #[serde(rename = "AU43")]
    Au43,
}

impl AuId {
    pub const ALL: [AuId; AU_COUNT] = [
        AuId::Au1,
        AuId::Au2,
        AuId::Au4,
        AuId::Au5,
        AuId::Au6,
        AuId::Au7,
        AuId::Au9,
        AuId::Au10,
        AuId::Au12,
        AuId::Au14,
        AuId::Au15,
        AuId::Au17,
        AuId::Au20,
        AuId::Au23,
        AuId::Au24,
        AuId::Au25,
        AuId::Au26,
        AuId::Au27,
        AuId::Au43,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuId::Au1 => "AU1",
            AuId::Au2 => "AU2",
            AuId::Au4 => "AU4",
            AuId::Au5 => "AU5",
            AuId::Au6 => "AU6",
            AuId::Au7 => "AU7",
            AuId::Au9 => "AU9",
            AuId::Au10 => "AU10",
            AuId::Au12 => "AU12",
            AuId::Au14 => "AU14",
            AuId::Au15 => "AU15",
            AuId::Au17 => "AU17",
            AuId::Au20 => "AU20",
            AuId::Au23 => "AU23",
            AuId::Au24 => "AU24",
            AuId::Au25 => "AU25",
            AuId::Au26 => "AU26",
            AuId::Au27 => "AU27",
            AuId::Au43 => "AU43",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.trim().to_ascii_uppercase();
        AuId::ALL.iter().copied().find(|au| au.as_str() == upper)
    }

    pub fn facs_name(self) -> &'static str {
        match self {
            AuId::Au1 => "Inner Brow Raiser",
            AuId::Au2 => "Outer Brow Raiser",
            AuId::Au4 => "Brow Lowerer",
            AuId::Au5 => "Upper Lid Raiser",
            AuId::Au6 => "Cheek Raiser",
            AuId::Au7 => "Lid Tightener",
            AuId::Au9 => "Nose Wrinkler",
            AuId::Au10 => "Upper Lip Raiser",
            AuId::Au12 => "Lip Corner Puller",
            AuId::Au14 => "Dimpler",
            AuId::Au15 => "Lip Corner Depressor",
            AuId::Au17 => "Chin Raiser",
            AuId::Au20 => "Lip Stretcher",
            AuId::Au23 => "Lip Tightener",
            AuId::Au24 => "Lip Pressor",
            AuId::Au25 => "Lips Part",
            AuId::Au26 => "Jaw Drop",
            AuId::Au27 => "Mouth Stretch",
            AuId::Au43 => "Eyes Closed",
        }
    }

    /// Direction of the landmark feature that corresponds to the muscle action.
    pub fn polarity(self) -> Polarity {
        match self {
            AuId::Au1 | AuId::Au2 | AuId::Au5 | AuId::Au15 | AuId::Au20 => Polarity::Increase,
            AuId::Au25 | AuId::Au26 | AuId::Au27 => Polarity::Increase,
            AuId::Au4 | AuId::Au6 | AuId::Au7 | AuId::Au9 | AuId::Au10 => Polarity::Decrease,
            AuId::Au12 | AuId::Au14 | AuId::Au17 | AuId::Au23 | AuId::Au24 => Polarity::Decrease,
            AuId::Au43 => Polarity::Decrease,
        }
    }

    /// Emotion an isolated burst of this AU is attributed to.
    pub fn associated_emotion(self) -> Option<Emotion> {
        match self {
            AuId::Au1 | AuId::Au15 | AuId::Au17 => Some(Emotion::Sad),
            AuId::Au2 | AuId::Au5 | AuId::Au26 => Some(Emotion::Surprise),
            AuId::Au4 | AuId::Au7 | AuId::Au23 => Some(Emotion::Angry),
            AuId::Au6 | AuId::Au12 => Some(Emotion::Happy),
            AuId::Au9 | AuId::Au10 => Some(Emotion::Disgust),
            AuId::Au20 | AuId::Au27 => Some(Emotion::Fear),
            AuId::Au14 => Some(Emotion::Contempt),
            AuId::Au24 | AuId::Au25 | AuId::Au43 => None,
        }
    }
}

/// Fixed-size table indexed by [`AuId`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuMap<T>([T; AU_COUNT]);

impl<T> AuMap<T> {
    pub fn from_fn(mut f: impl FnMut(AuId) -> T) -> Self {
        AuMap(std::array::from_fn(|i| f(AuId::ALL[i])))
    }

    pub fn iter(&self) -> impl Iterator<Item = (AuId, &T)> {
        AuId::ALL.iter().copied().zip(self.0.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (AuId, &mut T)> {
        AuId::ALL.iter().copied().zip(self.0.iter_mut())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.0.iter()
    }

    pub fn map<U>(&self, mut f: impl FnMut(AuId, &T) -> U) -> AuMap<U> {
        AuMap::from_fn(|au| f(au, &self.0[au.index()]))
    }
}

impl<T: Clone> AuMap<T> {
    pub fn splat(value: T) -> Self {
        AuMap::from_fn(|_| value.clone())
    }
}

impl<T: Default> Default for AuMap<T> {
    fn default() -> Self {
        AuMap::from_fn(|_| T::default())
    }
}

impl<T> Index<AuId> for AuMap<T> {
    type Output = T;

    fn index(&self, au: AuId) -> &T {
        &self.0[au.index()]
    }
}

impl<T> IndexMut<AuId> for AuMap<T> {
    fn index_mut(&mut self, au: AuId) -> &mut T {
        &mut self.0[au.index()]
    }
}

impl<T: Serialize> Serialize for AuMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(AU_COUNT))?;
        for (au, value) in self.iter() {
            map.serialize_entry(au.as_str(), value)?;
        }
        map.end()
    }
}

/// Per-AU geometric feature; `None` marks the AU unavailable for the frame.
pub type AuFeatureVector = AuMap<Option<f64>>;

// ==================== Emotions ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    #[default]
    Neutral,
    Happy,
    Sad,
    Angry,
    Fear,
    Surprise,
    Disgust,
    Contempt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Valence {
    Positive,
    Negative,
    Neutral,
}

impl Emotion {
    pub const ALL: [Emotion; EMOTION_COUNT] = [
        Emotion::Neutral,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Fear,
        Emotion::Surprise,
        Emotion::Disgust,
        Emotion::Contempt,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Fear => "fear",
            Emotion::Surprise => "surprise",
            Emotion::Disgust => "disgust",
            Emotion::Contempt => "contempt",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "neutral" => Some(Emotion::Neutral),
            "happy" => Some(Emotion::Happy),
            "sad" => Some(Emotion::Sad),
            "angry" => Some(Emotion::Angry),
            "fear" => Some(Emotion::Fear),
            "surprise" => Some(Emotion::Surprise),
            "disgust" => Some(Emotion::Disgust),
            "contempt" => Some(Emotion::Contempt),
            _ => None,
        }
    }

    pub fn valence(self) -> Valence {
        match self {
            Emotion::Happy | Emotion::Surprise => Valence::Positive,
            Emotion::Sad | Emotion::Angry | Emotion::Fear | Emotion::Disgust => Valence::Negative,
            Emotion::Neutral | Emotion::Contempt => Valence::Neutral,
        }
    }

    /// Signed affect polarity used for long-term trend regression.
    pub fn polarity(self) -> f64 {
        match self {
            Emotion::Happy => 1.0,
            Emotion::Surprise => 0.5,
            Emotion::Neutral => 0.0,
            Emotion::Fear => -0.3,
            Emotion::Contempt => -0.4,
            Emotion::Disgust => -0.5,
            Emotion::Angry => -0.7,
            Emotion::Sad => -1.0,
        }
    }

    pub fn is_negative(self) -> bool {
        self.valence() == Valence::Negative
    }
}

/// Probability distribution over [`Emotion::ALL`]; always normalized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmotionDistribution([f64; EMOTION_COUNT]);

impl EmotionDistribution {
    pub fn uniform() -> Self {
        Self([1.0 / EMOTION_COUNT as f64; EMOTION_COUNT])
    }

    pub fn one_hot(emotion: Emotion) -> Self {
        let mut probs = [0.0; EMOTION_COUNT];
        probs[emotion.index()] = 1.0;
        Self(probs)
    }

    /// Normalizes raw non-negative scores. Negative or non-finite scores count
    /// as zero; an all-zero score vector yields the uniform distribution.
    pub fn from_scores(scores: [f64; EMOTION_COUNT]) -> Self {
        let cleaned = scores.map(|s| if s.is_finite() && s > 0.0 { s } else { 0.0 });
        let total: f64 = cleaned.iter().sum();
        if total <= EPSILON {
            return Self::uniform();
        }
        Self(cleaned.map(|s| s / total))
    }

    #[inline]
    pub fn get(&self, emotion: Emotion) -> f64 {
        self.0[emotion.index()]
    }

    pub fn as_array(&self) -> &[f64; EMOTION_COUNT] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Emotion, f64)> + '_ {
        Emotion::ALL.iter().copied().zip(self.0.iter().copied())
    }

    /// Most probable label; ties resolve to the earlier label in [`Emotion::ALL`].
    pub fn top(&self) -> (Emotion, f64) {
        let mut best = (Emotion::Neutral, f64::NEG_INFINITY);
        for (emotion, p) in self.iter() {
            if p > best.1 {
                best = (emotion, p);
            }
        }
        best
    }

    pub fn entropy(&self) -> f64 {
        self.0
            .iter()
            .filter(|p| **p > EPSILON)
            .map(|p| -p * p.ln())
            .sum()
    }

    /// Entropy divided by its maximum `ln(N)`, in [0, 1].
    pub fn normalized_entropy(&self) -> f64 {
        (self.entropy() / (EMOTION_COUNT as f64).ln()).clamp(0.0, 1.0)
    }

    /// Adds `amount` to one label's probability and renormalizes.
    pub fn boosted(&self, emotion: Emotion, amount: f64) -> Self {
        let mut scores = self.0;
        scores[emotion.index()] = (scores[emotion.index()] + amount).min(1.0);
        Self::from_scores(scores)
    }

    /// Scales each label by a per-label weight and renormalizes.
    pub fn reweighted(&self, weights: &[f64; EMOTION_COUNT]) -> Self {
        let mut scores = self.0;
        for (s, w) in scores.iter_mut().zip(weights.iter()) {
            *s *= w;
        }
        Self::from_scores(scores)
    }
}

impl Default for EmotionDistribution {
    fn default() -> Self {
        Self::uniform()
    }
}

impl Serialize for EmotionDistribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(EMOTION_COUNT))?;
        for (emotion, p) in self.iter() {
            map.serialize_entry(emotion.as_str(), &p)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_au_parse_roundtrip() {
        for au in AuId::ALL {
            assert_eq!(AuId::parse(au.as_str()), Some(au));
        }
        assert_eq!(AuId::parse("au12"), Some(AuId::Au12));
        assert_eq!(AuId::parse("AU3"), None);
    }

    #[test]
    fn test_au_index_matches_order() {
        for (i, au) in AuId::ALL.iter().enumerate() {
            assert_eq!(au.index(), i);
        }
    }

    #[test]
    fn test_polarity_projection() {
        assert_eq!(Polarity::Increase.project(0.2), 0.2);
        assert_eq!(Polarity::Decrease.project(0.2), -0.2);
        assert_eq!(Polarity::Either.project(-0.2), 0.2);
    }

    #[test]
    fn test_distribution_from_zero_scores_is_uniform() {
        let dist = EmotionDistribution::from_scores([0.0; EMOTION_COUNT]);
        assert_eq!(dist, EmotionDistribution::uniform());
    }

    #[test]
    fn test_distribution_ignores_negative_and_nan() {
        let mut scores = [0.0; EMOTION_COUNT];
        scores[Emotion::Sad.index()] = 2.0;
        scores[Emotion::Happy.index()] = -1.0;
        scores[Emotion::Fear.index()] = f64::NAN;
        let dist = EmotionDistribution::from_scores(scores);
        assert!((dist.get(Emotion::Sad) - 1.0).abs() < 1e-12);
        assert_eq!(dist.get(Emotion::Happy), 0.0);
    }

    #[test]
    fn test_entropy_bounds() {
        assert!(EmotionDistribution::one_hot(Emotion::Sad).normalized_entropy() < 1e-9);
        assert!((EmotionDistribution::uniform().normalized_entropy() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_top_tie_prefers_earlier_label() {
        let (emotion, _) = EmotionDistribution::uniform().top();
        assert_eq!(emotion, Emotion::Neutral);
    }

    #[test]
    fn test_contempt_is_neutral_valence() {
        assert_eq!(Emotion::Contempt.valence(), Valence::Neutral);
        assert!(Emotion::Sad.is_negative());
        assert!(!Emotion::Surprise.is_negative());
    }
}
