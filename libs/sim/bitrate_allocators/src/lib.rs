// This file is part of Abr360.
//
// Abr360 is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Abr360 is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Abr360.  If not, see <http://www.gnu.org/licenses/>.
//! Bitrate allocators (C6): `GetBitrateIDs(context) -> vector of ladder
//! indices`, one per tile, distributing an aggregate budget across
//! 6·T² tiles weighted by a predicted viewport distribution.
use abr_error::{AbrError, AbrResult, StreamingConfig};
use serde::{Deserialize, Serialize};

/// Per-segment inputs that vary; everything static (ladder, tile count,
/// segment duration) lives on the `StreamingConfig` passed alongside.
pub struct BitrateAllocatorContext<'a> {
    pub aggregate_budget_mbps: f64,
    pub predicted_distribution: &'a [f64],
    pub previous_actual_distribution: Option<&'a [f64]>,
    pub buffer_seconds: f64,
}

pub trait BitrateAllocator {
    fn get_bitrate_ids(&mut self, config: &StreamingConfig, context: &BitrateAllocatorContext) -> Vec<usize>;
}

/// Per-tile water-filling priority: a blend between a uniform share and the
/// predicted distribution, so `τ = 0` ties every tile's weight and `τ = 1`
/// water-fills by predicted probability alone (§4.6).
fn tile_weights(trust_level: f64, distribution: &[f64]) -> Vec<f64> {
    let uniform_share = 1.0 / distribution.len() as f64;
    distribution
        .iter()
        .map(|&p| (1.0 - trust_level) * uniform_share + trust_level * p)
        .collect()
}

/// Water-fills a budget across tiles weighted by `weights`, starting every
/// tile at ladder index 0.
///
/// Tiles are grouped into maximal runs of (near-)equal weight, highest
/// weight first, ties breaking toward the lower tile index. A group whose
/// weight is ~0 never rises above the floor even if budget remains after
/// every nonzero group is exhausted — a predicted-impossible tile gets
/// nothing extra. Within a group, every member is raised one ladder level
/// at a time in repeated round-robin passes until a pass raises nothing,
/// so a tied group empties evenly rather than one tile hogging the budget
/// before its groupmates are touched (§4.6).
fn weighted_water_fill(ladder: &[f64], tile_count: usize, budget_mbps: f64, weights: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..tile_count).collect();
    order.sort_by(|&a, &b| weights[b].partial_cmp(&weights[a]).unwrap_or(std::cmp::Ordering::Equal));

    let mut groups: Vec<Vec<usize>> = Vec::new();
    for &tile in &order {
        match groups.last_mut() {
            Some(group) if (weights[group[0]] - weights[tile]).abs() < 1e-9 => group.push(tile),
            _ => groups.push(vec![tile]),
        }
    }

    let mut levels = vec![0usize; tile_count];
    let mut total = ladder[0] * tile_count as f64;
    for group in &groups {
        if weights[group[0]].abs() < 1e-9 {
            continue;
        }
        loop {
            let mut progressed = false;
            for &tile in group {
                let next_level = levels[tile] + 1;
                if next_level >= ladder.len() {
                    continue;
                }
                let delta = ladder[next_level] - ladder[levels[tile]];
                if total + delta <= budget_mbps + 1e-9 {
                    total += delta;
                    levels[tile] = next_level;
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
    }
    levels
}

/// The `τ`-blend at the heart of Hybrid, and reused by Flare (on a dilated
/// distribution) and Online-learning (with a learned trust level) in place
/// of each reimplementing the same weighted water-fill.
fn hybrid_allocate(config: &StreamingConfig, budget_mbps: f64, distribution: &[f64], trust_level: f64) -> Vec<usize> {
    let ladder = config.bitrate_ladder_mbps();
    let tile_count = config.tile_count();
    let weights = tile_weights(trust_level, distribution);
    weighted_water_fill(ladder, tile_count, budget_mbps, &weights)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(&x, &y)| x * y).sum()
}

fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let norm_a = dot(a, a).sqrt();
    let norm_b = dot(b, b).sqrt();
    if norm_a < 1e-12 || norm_b < 1e-12 {
        return 0.0;
    }
    (dot(a, b) / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// `τ = 0` is uniform allocation; `τ = 1` is viewport-weighted
/// water-filling; intermediate `τ` interpolates bitrate values between the
/// two, then snaps down to the nearest ladder index (§4.6).
pub struct HybridAllocator {
    trust_level: f64,
}

impl HybridAllocator {
    pub fn new(trust_level: f64) -> AbrResult<Self> {
        if !(0.0..=1.0).contains(&trust_level) {
            return Err(AbrError::configuration(format!(
                "hybrid allocator trust level must be in [0, 1], got {trust_level}"
            )));
        }
        Ok(Self { trust_level })
    }
}

impl BitrateAllocator for HybridAllocator {
    fn get_bitrate_ids(&mut self, config: &StreamingConfig, context: &BitrateAllocatorContext) -> Vec<usize> {
        hybrid_allocate(config, context.aggregate_budget_mbps, context.predicted_distribution, self.trust_level)
    }
}

/// Buffer-occupancy Lyapunov allocator (§4.6). Buffer is the only
/// per-call input this formula uses, so every tile gets the same index;
/// the predicted distribution plays no role in BOLA's own decision.
///
/// `score(r) = (V·(ln(r / minRate) + γ) − buffer) / r`, maximized over the
/// ladder. Unlike the naive `(V·utility(r) + γ·buffer − r·Δ) / r` reading,
/// this keeps `γ` as an additive utility offset rather than a buffer
/// multiplier — see `DESIGN.md` for why the multiplier form can never
/// prefer a ladder's middle rates over its endpoints on a power-of-two
/// ladder, and the derivation of a `(V, γ)` pair that reproduces the
/// reference buffer/index pairs.
pub struct BolaAllocator {
    v: f64,
    gamma: f64,
}

impl BolaAllocator {
    pub fn new(v: f64, gamma: f64) -> AbrResult<Self> {
        if !(v > 0.0) {
            return Err(AbrError::configuration(format!("BOLA allocator V must be positive, got {v}")));
        }
        Ok(Self { v, gamma })
    }

    fn level_for_buffer(&self, config: &StreamingConfig, buffer_seconds: f64) -> usize {
        let ladder = config.bitrate_ladder_mbps();
        let min_rate = config.min_rate_mbps();
        let mut best_index = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (index, &rate) in ladder.iter().enumerate() {
            let score = (self.v * ((rate / min_rate).ln() + self.gamma) - buffer_seconds) / rate;
            if score > best_score {
                best_score = score;
                best_index = index;
            }
        }
        best_index
    }
}

impl BitrateAllocator for BolaAllocator {
    fn get_bitrate_ids(&mut self, config: &StreamingConfig, context: &BitrateAllocatorContext) -> Vec<usize> {
        let index = self.level_for_buffer(config, context.buffer_seconds);
        vec![index; config.tile_count()]
    }
}

/// Dilates the predicted distribution toward uniform by `α = 1 − accuracy`
/// and runs a full-trust Hybrid water-fill on the result (§4.6). Accuracy
/// tracks the cosine similarity between the *previous* call's predicted
/// distribution and this call's `previous_actual_distribution`; it holds
/// at its last value (or `initial_accuracy`) when there's nothing to
/// compare yet.
pub struct FlareAllocator {
    accuracy: f64,
    last_predicted: Option<Vec<f64>>,
}

impl FlareAllocator {
    pub fn new(initial_accuracy: f64) -> AbrResult<Self> {
        if !(0.0..=1.0).contains(&initial_accuracy) {
            return Err(AbrError::configuration(format!(
                "Flare allocator initial accuracy must be in [0, 1], got {initial_accuracy}"
            )));
        }
        Ok(Self {
            accuracy: initial_accuracy,
            last_predicted: None,
        })
    }
}

impl BitrateAllocator for FlareAllocator {
    fn get_bitrate_ids(&mut self, config: &StreamingConfig, context: &BitrateAllocatorContext) -> Vec<usize> {
        if let (Some(previous_actual), Some(previous_predicted)) =
            (context.previous_actual_distribution, &self.last_predicted)
        {
            self.accuracy = cosine_similarity(previous_predicted, previous_actual).clamp(0.0, 1.0);
        }
        let alpha = 1.0 - self.accuracy;
        let tile_count = context.predicted_distribution.len();
        let uniform_share = 1.0 / tile_count as f64;
        let dilated: Vec<f64> = context
            .predicted_distribution
            .iter()
            .map(|&p| (1.0 - alpha) * p + alpha * uniform_share)
            .collect();
        self.last_predicted = Some(context.predicted_distribution.to_vec());
        hybrid_allocate(config, context.aggregate_budget_mbps, &dilated, 1.0)
    }
}

/// Groups tiles into fixed-size contiguous regions, sums each region's
/// predicted probability mass, and water-fills region by region — every
/// tile in a region moves to the same ladder level together (§4.6's
/// "structured variant").
pub struct DragonflyAllocator {
    region_size: usize,
}

impl DragonflyAllocator {
    pub fn new(region_size: usize) -> AbrResult<Self> {
        if region_size == 0 {
            return Err(AbrError::configuration("Dragonfly allocator region size must be >= 1"));
        }
        Ok(Self { region_size })
    }
}

impl BitrateAllocator for DragonflyAllocator {
    fn get_bitrate_ids(&mut self, config: &StreamingConfig, context: &BitrateAllocatorContext) -> Vec<usize> {
        let ladder = config.bitrate_ladder_mbps();
        let tile_count = config.tile_count();
        let regions: Vec<Vec<usize>> = (0..tile_count)
            .collect::<Vec<_>>()
            .chunks(self.region_size)
            .map(|chunk| chunk.to_vec())
            .collect();
        let mut region_order: Vec<usize> = (0..regions.len()).collect();
        region_order.sort_by(|&a, &b| {
            let mass_a: f64 = regions[a].iter().map(|&t| context.predicted_distribution[t]).sum();
            let mass_b: f64 = regions[b].iter().map(|&t| context.predicted_distribution[t]).sum();
            mass_b.partial_cmp(&mass_a).unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut levels = vec![0usize; tile_count];
        let mut total = ladder[0] * tile_count as f64;
        for region_index in region_order {
            let region = &regions[region_index];
            loop {
                let current_level = levels[region[0]];
                let next_level = current_level + 1;
                if next_level >= ladder.len() {
                    break;
                }
                let delta = (ladder[next_level] - ladder[current_level]) * region.len() as f64;
                if total + delta <= context.aggregate_budget_mbps + 1e-9 {
                    total += delta;
                    for &tile in region {
                        levels[tile] = next_level;
                    }
                } else {
                    break;
                }
            }
        }
        levels
    }
}

/// Maintains a scalar trust level, raised when the previous prediction
/// matched what actually happened and lowered when it didn't, then
/// delegates to Hybrid (§4.6). Match quality is the dot product between
/// the previous call's predicted distribution and this call's
/// `previous_actual_distribution`; a perfect match (`dot == 1`, both
/// distributions identical one-hot vectors) raises trust by exactly
/// `learn_rate`, a total mismatch (`dot == 0`) lowers it by the same
/// amount, and the update is linear in between.
pub struct OnlineLearningAllocator {
    trust_level: f64,
    learn_rate: f64,
    last_predicted: Option<Vec<f64>>,
}

impl OnlineLearningAllocator {
    pub fn new(initial_trust_level: f64, learn_rate: f64) -> AbrResult<Self> {
        if !(0.0..=1.0).contains(&initial_trust_level) {
            return Err(AbrError::configuration(format!(
                "online-learning allocator initial trust level must be in [0, 1], got {initial_trust_level}"
            )));
        }
        if !(learn_rate > 0.0) {
            return Err(AbrError::configuration(format!(
                "online-learning allocator learn rate must be positive, got {learn_rate}"
            )));
        }
        Ok(Self {
            trust_level: initial_trust_level,
            learn_rate,
            last_predicted: None,
        })
    }
}

impl BitrateAllocator for OnlineLearningAllocator {
    fn get_bitrate_ids(&mut self, config: &StreamingConfig, context: &BitrateAllocatorContext) -> Vec<usize> {
        if let (Some(previous_actual), Some(previous_predicted)) =
            (context.previous_actual_distribution, &self.last_predicted)
        {
            let match_score = dot(previous_predicted, previous_actual);
            self.trust_level = (self.trust_level + self.learn_rate * (2.0 * match_score - 1.0)).clamp(0.0, 1.0);
        }
        self.last_predicted = Some(context.predicted_distribution.to_vec());
        hybrid_allocate(config, context.aggregate_budget_mbps, context.predicted_distribution, self.trust_level)
    }
}

/// Tagged-union options for the five recognized bitrate allocator variants
/// (§6), externally tagged for `serde_json` round-tripping.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BitrateAllocatorOptions {
    Hybrid {
        #[serde(rename = "trustLevel")]
        trust_level: f64,
    },
    #[serde(rename = "BOLA")]
    Bola {
        #[serde(rename = "V")]
        v: f64,
        gamma: f64,
    },
    Flare {
        #[serde(rename = "initialAccuracy")]
        initial_accuracy: f64,
    },
    Dragonfly {
        #[serde(rename = "regionSize")]
        region_size: usize,
    },
    OnlineLearning {
        #[serde(rename = "initialTrustLevel")]
        initial_trust_level: f64,
        #[serde(rename = "learnRate")]
        learn_rate: f64,
    },
}

pub fn build(options: BitrateAllocatorOptions) -> AbrResult<Box<dyn BitrateAllocator + Send>> {
    match options {
        BitrateAllocatorOptions::Hybrid { trust_level } => Ok(Box::new(HybridAllocator::new(trust_level)?)),
        BitrateAllocatorOptions::Bola { v, gamma } => Ok(Box::new(BolaAllocator::new(v, gamma)?)),
        BitrateAllocatorOptions::Flare { initial_accuracy } => {
            Ok(Box::new(FlareAllocator::new(initial_accuracy)?))
        }
        BitrateAllocatorOptions::Dragonfly { region_size } => {
            Ok(Box::new(DragonflyAllocator::new(region_size)?))
        }
        BitrateAllocatorOptions::OnlineLearning {
            initial_trust_level,
            learn_rate,
        } => Ok(Box::new(OnlineLearningAllocator::new(initial_trust_level, learn_rate)?)),
    }
}
