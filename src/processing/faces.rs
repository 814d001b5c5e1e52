//! Viola-Jones face detection over boosted Haar cascades.
//!
//! Cascades are read from the XML layout written by OpenCV's
//! `opencv_traincascade` (the `haarcascade_frontalface_*.xml` files), limited
//! to upright HAAR features.

use std::path::Path;

use anyhow::{Context, bail, ensure};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contrast::equalize_histogram;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::integral_image::{integral_image, integral_squared_image};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};

use super::color::grayscale;

const STAGE_EPS: f32 = 1e-5;
const GROUP_EPS: f32 = 0.2;
const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Multi-scale search parameters.
pub struct FaceDetectParams {
    /// Pyramid step between scales; values at or below 1 are bumped to 1.01.
    pub scale_factor: f32,
    /// A group must have more than this many raw hits to count as a face.
    pub min_neighbors: usize,
    /// Smallest face edge in pixels; 0 accepts the bare cascade window.
    pub min_size: u32,
    /// Largest face edge in pixels; 0 means unbounded.
    pub max_size: u32,
}

impl Default for FaceDetectParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 3,
            min_size: 0,
            max_size: 0,
        }
    }
}

/// Axis-aligned face box in source image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }
}

#[derive(Debug, Clone)]
struct WeightedRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    weight: f64,
}

#[derive(Debug, Clone)]
struct HaarFeature {
    rects: Vec<WeightedRect>,
}

#[derive(Debug, Clone)]
struct TreeNode {
    left: i32,
    right: i32,
    feature: usize,
    threshold: f32,
}

#[derive(Debug, Clone)]
struct WeakClassifier {
    nodes: Vec<TreeNode>,
    leaves: Vec<f32>,
}

#[derive(Debug, Clone)]
struct Stage {
    threshold: f32,
    classifiers: Vec<WeakClassifier>,
}

#[derive(Debug, Clone)]
pub struct HaarCascade {
    window: (u32, u32),
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
}

// Serde mirror of the cascade XML. Unknown elements (stageParams,
// featureParams, maxWeakCount, ...) are skipped.

#[derive(Deserialize)]
struct StorageXml {
    cascade: CascadeXml,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CascadeXml {
    feature_type: String,
    width: u32,
    height: u32,
    stages: ListXml<StageXml>,
    features: ListXml<FeatureXml>,
}

#[derive(Deserialize)]
struct ListXml<T> {
    #[serde(rename = "_", default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StageXml {
    stage_threshold: f32,
    weak_classifiers: ListXml<WeakXml>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WeakXml {
    internal_nodes: String,
    leaf_values: String,
}

#[derive(Deserialize)]
struct FeatureXml {
    rects: ListXml<String>,
    #[serde(default)]
    tilted: Option<u8>,
}

fn parse_numbers<T>(text: &str, what: &str) -> anyhow::Result<Vec<T>>
where
    T: std::str::FromStr,
{
    text.split_whitespace()
        .map(|tok| {
            tok.parse::<T>()
                .map_err(|_| anyhow::anyhow!("invalid number {:?} in {}", tok, what))
        })
        .collect()
}

impl HaarCascade {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let xml = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read cascade {}", path.display()))?;
        Self::from_xml_str(&xml).with_context(|| format!("invalid cascade {}", path.display()))
    }

    pub fn from_xml_str(xml: &str) -> anyhow::Result<Self> {
        let storage: StorageXml = quick_xml::de::from_str(xml)
            .context("expected an <opencv_storage><cascade> document")?;
        let cascade = storage.cascade;

        if !cascade.feature_type.trim().eq_ignore_ascii_case("HAAR") {
            bail!("unsupported feature type {:?}", cascade.feature_type.trim());
        }
        ensure!(
            cascade.width >= 3 && cascade.height >= 3,
            "cascade window {}x{} is too small",
            cascade.width,
            cascade.height
        );

        let features = cascade
            .features
            .items
            .iter()
            .enumerate()
            .map(|(idx, f)| parse_feature(idx, f, cascade.width, cascade.height))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let stages = cascade
            .stages
            .items
            .iter()
            .enumerate()
            .map(|(idx, s)| parse_stage(idx, s, features.len()))
            .collect::<anyhow::Result<Vec<_>>>()?;
        ensure!(!stages.is_empty(), "cascade has no stages");

        Ok(Self {
            window: (cascade.width, cascade.height),
            stages,
            features,
        })
    }

    pub fn window(&self) -> (u32, u32) {
        self.window
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Runs the cascade over an image pyramid and groups overlapping hits.
    pub fn detect(&self, gray: &GrayImage, params: &FaceDetectParams) -> Vec<FaceBox> {
        let (win_w, win_h) = self.window;
        let (img_w, img_h) = gray.dimensions();
        let step_factor = params.scale_factor.max(1.01);

        let mut candidates = Vec::new();
        let mut factor = 1.0f32;
        loop {
            let scaled_w = (img_w as f32 / factor).round() as u32;
            let scaled_h = (img_h as f32 / factor).round() as u32;
            let face_w = (win_w as f32 * factor).round() as u32;
            let face_h = (win_h as f32 * factor).round() as u32;
            if scaled_w < win_w || scaled_h < win_h {
                break;
            }
            if params.max_size > 0 && (face_w > params.max_size || face_h > params.max_size) {
                break;
            }

            if face_w >= params.min_size && face_h >= params.min_size {
                let scaled = if scaled_w == img_w && scaled_h == img_h {
                    gray.clone()
                } else {
                    imageops::resize(gray, scaled_w, scaled_h, FilterType::Triangle)
                };
                self.scan(&scaled, factor, (face_w, face_h), &mut candidates);
            }
            factor *= step_factor;
        }

        tracing::debug!(candidates = candidates.len(), "cascade scan finished");
        group_rectangles(&candidates, params.min_neighbors, GROUP_EPS)
    }

    fn scan(&self, img: &GrayImage, factor: f32, face: (u32, u32), out: &mut Vec<FaceBox>) {
        let (win_w, win_h) = self.window;
        let sum = integral_image::<_, u64>(img);
        let sq_sum = integral_squared_image::<_, u64>(img);
        let step = if factor > 2.0 { 1 } else { 2 };

        for y in (0..=img.height() - win_h).step_by(step) {
            for x in (0..=img.width() - win_w).step_by(step) {
                if self.accepts(&sum, &sq_sum, x, y) {
                    out.push(FaceBox {
                        x: (x as f32 * factor).round() as u32,
                        y: (y as f32 * factor).round() as u32,
                        width: face.0,
                        height: face.1,
                    });
                }
            }
        }
    }

    fn accepts(&self, sum: &Integral, sq_sum: &Integral, x: u32, y: u32) -> bool {
        let (win_w, win_h) = self.window;
        let (nw, nh) = (win_w - 2, win_h - 2);
        let area = (nw * nh) as f64;
        let s = rect_sum(sum, x + 1, y + 1, nw, nh);
        let sq = rect_sum(sq_sum, x + 1, y + 1, nw, nh);
        let variance = area * sq - s * s;
        let norm = if variance > 0.0 { variance.sqrt() } else { 1.0 };

        for stage in &self.stages {
            let mut total = 0.0f32;
            for weak in &stage.classifiers {
                let mut idx = 0i32;
                let leaf = loop {
                    let node = &weak.nodes[idx as usize];
                    let value = self.features[node.feature].evaluate(sum, x, y) / norm;
                    idx = if (value as f32) < node.threshold {
                        node.left
                    } else {
                        node.right
                    };
                    if idx <= 0 {
                        break weak.leaves[(-idx) as usize];
                    }
                };
                total += leaf;
            }
            if total < stage.threshold - STAGE_EPS {
                return false;
            }
        }
        true
    }
}

type Integral = image::ImageBuffer<Luma<u64>, Vec<u64>>;

/// Sum of the source pixels in `[x, x+w) x [y, y+h)`.
fn rect_sum(ii: &Integral, x: u32, y: u32, w: u32, h: u32) -> f64 {
    let at = |px: u32, py: u32| ii.get_pixel(px, py)[0] as f64;
    at(x + w, y + h) - at(x, y + h) - at(x + w, y) + at(x, y)
}

impl HaarFeature {
    fn evaluate(&self, ii: &Integral, x: u32, y: u32) -> f64 {
        self.rects
            .iter()
            .map(|r| rect_sum(ii, x + r.x, y + r.y, r.width, r.height) * r.weight)
            .sum()
    }
}

fn parse_feature(
    idx: usize,
    feature: &FeatureXml,
    win_w: u32,
    win_h: u32,
) -> anyhow::Result<HaarFeature> {
    if feature.tilted.unwrap_or(0) != 0 {
        bail!("feature {} is tilted; only upright Haar features are supported", idx);
    }
    let rects = feature
        .rects
        .items
        .iter()
        .map(|text| -> anyhow::Result<WeightedRect> {
            let v: Vec<f64> = parse_numbers(text, "feature rect")?;
            ensure!(v.len() == 5, "feature {} rect needs 5 values, got {}", idx, v.len());
            let [x, y, w, h] = [v[0], v[1], v[2], v[3]].map(|n| n.max(0.0) as u32);
            ensure!(
                x + w <= win_w && y + h <= win_h,
                "feature {} rect exceeds the {}x{} window",
                idx,
                win_w,
                win_h
            );
            Ok(WeightedRect {
                x,
                y,
                width: w,
                height: h,
                weight: v[4],
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    ensure!(!rects.is_empty(), "feature {} has no rects", idx);
    Ok(HaarFeature { rects })
}

fn parse_stage(idx: usize, stage: &StageXml, feature_count: usize) -> anyhow::Result<Stage> {
    let classifiers = stage
        .weak_classifiers
        .items
        .iter()
        .map(|weak| -> anyhow::Result<WeakClassifier> {
            let tokens: Vec<&str> = weak.internal_nodes.split_whitespace().collect();
            ensure!(
                !tokens.is_empty() && tokens.len() % 4 == 0,
                "stage {} internalNodes must hold groups of 4 values",
                idx
            );
            let nodes = tokens
                .chunks(4)
                .map(|n| -> anyhow::Result<TreeNode> {
                    let node = TreeNode {
                        left: n[0].parse()?,
                        right: n[1].parse()?,
                        feature: n[2].parse()?,
                        threshold: n[3].parse()?,
                    };
                    Ok(node)
                })
                .collect::<anyhow::Result<Vec<_>>>()
                .with_context(|| format!("stage {} has a malformed tree node", idx))?;
            let leaves: Vec<f32> = parse_numbers(&weak.leaf_values, "leafValues")?;

            for node in &nodes {
                ensure!(
                    node.feature < feature_count,
                    "stage {} references missing feature {}",
                    idx,
                    node.feature
                );
                for child in [node.left, node.right] {
                    let in_range = if child > 0 {
                        (child as usize) < nodes.len()
                    } else {
                        ((-child) as usize) < leaves.len()
                    };
                    ensure!(in_range, "stage {} has a dangling tree branch {}", idx, child);
                }
            }
            Ok(WeakClassifier { nodes, leaves })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Stage {
        threshold: stage.stage_threshold,
        classifiers,
    })
}

fn similar(a: &FaceBox, b: &FaceBox, eps: f32) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f32 * 0.5;
    let close = |p: u32, q: u32| (p as f32 - q as f32).abs() <= delta;
    close(a.x, b.x)
        && close(a.y, b.y)
        && close(a.x + a.width, b.x + b.width)
        && close(a.y + a.height, b.y + b.height)
}

fn find_root(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Clusters similar boxes and returns the average of every cluster with more
/// than `min_neighbors` members.
pub fn group_rectangles(boxes: &[FaceBox], min_neighbors: usize, eps: f32) -> Vec<FaceBox> {
    let n = boxes.len();
    let mut parent: Vec<usize> = (0..n).collect();
    for i in 0..n {
        for j in (i + 1)..n {
            if similar(&boxes[i], &boxes[j], eps) {
                let (ri, rj) = (find_root(&mut parent, i), find_root(&mut parent, j));
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    // (sum x, sum y, sum w, sum h, count) per root, in first-seen order.
    let mut clusters: Vec<(usize, [u64; 4], usize)> = Vec::new();
    for (i, b) in boxes.iter().enumerate() {
        let root = find_root(&mut parent, i);
        let slot = match clusters.iter().position(|c| c.0 == root) {
            Some(slot) => slot,
            None => {
                clusters.push((root, [0; 4], 0));
                clusters.len() - 1
            }
        };
        let entry = &mut clusters[slot];
        entry.1[0] += b.x as u64;
        entry.1[1] += b.y as u64;
        entry.1[2] += b.width as u64;
        entry.1[3] += b.height as u64;
        entry.2 += 1;
    }

    clusters
        .into_iter()
        .filter(|(_, _, count)| *count > min_neighbors)
        .map(|(_, sums, count)| {
            let avg = |s: u64| (s as f64 / count as f64).round() as u32;
            FaceBox {
                x: avg(sums[0]),
                y: avg(sums[1]),
                width: avg(sums[2]),
                height: avg(sums[3]),
            }
        })
        .collect()
}

/// Equalized grayscale detection over an RGB image.
pub fn detect_faces(
    img: &RgbImage,
    cascade: &HaarCascade,
    params: &FaceDetectParams,
) -> Vec<FaceBox> {
    let gray = equalize_histogram(&grayscale(img));
    cascade.detect(&gray, params)
}

/// Draws a 2 px box per face over a copy of `img`.
pub fn draw_faces(img: &RgbImage, faces: &[FaceBox]) -> RgbImage {
    let mut out = img.clone();
    for face in faces.iter().filter(|f| f.width > 0 && f.height > 0) {
        let rect = Rect::at(face.x as i32, face.y as i32).of_size(face.width, face.height);
        draw_hollow_rect_mut(&mut out, rect, BOX_COLOR);
        if face.width > 2 && face.height > 2 {
            let inner =
                Rect::at(face.x as i32 + 1, face.y as i32 + 1).of_size(face.width - 2, face.height - 2);
            draw_hollow_rect_mut(&mut out, inner, BOX_COLOR);
        }
    }
    out
}
