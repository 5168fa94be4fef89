use std::collections::{HashSet, VecDeque};

use crate::config::SubmersionConfig;
use crate::math::{approach, Vec2};
use crate::oracle::{TileCoord, TileOracle};

const DEPTH_SNAP_EPSILON: f32 = 1e-3;
const NEIGHBOURS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Per-tick submersion reading. Rebuilt every tick, never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubmersionSample {
    pub in_water: bool,
    /// Freshly computed eased depth from the latest tile sample.
    pub raw_depth: f32,
    /// `raw_depth` smoothed across ticks.
    pub depth: f32,
    pub speed_multiplier: f32,
    pub sink_offset_px: f32,
    pub animation_time_scale: f32,
}

impl SubmersionSample {
    pub fn dry() -> Self {
        Self {
            in_water: false,
            raw_depth: 0.0,
            depth: 0.0,
            speed_multiplier: 1.0,
            sink_offset_px: 0.0,
            animation_time_scale: 1.0,
        }
    }
}

/// Distance in tile units from `foot` to the center of the nearest non-water
/// tile reachable within `radius` 4-connected steps of the foot tile.
pub fn nearest_dry_distance(oracle: &dyn TileOracle, foot: Vec2, radius: i32) -> Option<f32> {
    let start = oracle.world_to_tile(foot.x, foot.y)?;
    let size = oracle.tile_size();
    if size.width <= 0.0 || size.height <= 0.0 {
        return None;
    }

    let mut visited: HashSet<TileCoord> = HashSet::new();
    let mut queue: VecDeque<(TileCoord, i32)> = VecDeque::new();
    visited.insert(start);
    queue.push_back((start, 0));
    let mut best: Option<f32> = None;

    while let Some((tile, steps)) = queue.pop_front() {
        if steps >= radius {
            continue;
        }
        for (dc, dr) in NEIGHBOURS {
            let next = TileCoord {
                col: tile.col + dc,
                row: tile.row + dr,
            };
            if !visited.insert(next) {
                continue;
            }
            if oracle.is_water_tile(next) {
                queue.push_back((next, steps + 1));
                continue;
            }
            let center = oracle.tile_center(next);
            let dx = (center.x - foot.x) / size.width;
            let dy = (center.y - foot.y) / size.height;
            let distance = (dx * dx + dy * dy).sqrt();
            best = Some(best.map_or(distance, |current| current.min(distance)));
        }
    }
    best
}

/// Quadratic ease so the first tile of water reads as shallow.
pub fn eased_depth(distance_tiles: f32, max_depth: f32) -> f32 {
    let raw = (distance_tiles - 0.5).max(0.0);
    (raw * raw / max_depth).min(max_depth)
}

pub fn search_radius(config: &SubmersionConfig) -> i32 {
    config.max_depth.ceil() as i32 + 2
}

/// Eased depth at `foot`: 0 on dry ground, `max_depth` when no shore lies
/// within the search bound.
pub fn raw_depth_at(oracle: &dyn TileOracle, foot: Vec2, config: &SubmersionConfig) -> f32 {
    let Some(tile) = oracle.world_to_tile(foot.x, foot.y) else {
        return 0.0;
    };
    if !oracle.is_water_tile(tile) {
        return 0.0;
    }
    match nearest_dry_distance(oracle, foot, search_radius(config)) {
        Some(distance) => eased_depth(distance, config.max_depth),
        None => config.max_depth,
    }
}

fn slowdown_ratio(config: &SubmersionConfig, depth: f32) -> f32 {
    if depth <= config.slowdown_start {
        return 0.0;
    }
    let span = config.max_depth - config.slowdown_start;
    if span <= 0.0 {
        return 1.0;
    }
    ((depth - config.slowdown_start) / span).clamp(0.0, 1.0)
}

pub fn speed_multiplier(config: &SubmersionConfig, depth: f32) -> f32 {
    let ratio = slowdown_ratio(config, depth);
    if ratio <= 0.0 {
        return 1.0;
    }
    if ratio >= 1.0 {
        return config.min_speed_multiplier;
    }
    1.0 - ratio * (1.0 - config.min_speed_multiplier)
}

pub fn sink_offset(config: &SubmersionConfig, depth: f32) -> f32 {
    slowdown_ratio(config, depth) * config.max_sink_px
}

/// Depth/flow sampler for one moving entity.
#[derive(Debug, Default)]
pub struct DepthFlowSampler {
    last_sample_ms: Option<f64>,
    in_water: bool,
    target_depth: f32,
    depth: f32,
}

impl DepthFlowSampler {
    pub fn in_water(&self) -> bool {
        self.in_water
    }

    pub fn depth(&self) -> f32 {
        self.depth
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn update(
        &mut self,
        now_ms: f64,
        foot: Vec2,
        oracle: Option<&dyn TileOracle>,
        config: &SubmersionConfig,
    ) -> SubmersionSample {
        let due = match self.last_sample_ms {
            None => true,
            Some(last) => now_ms - last >= config.sample_interval_ms,
        };
        if due {
            self.last_sample_ms = Some(now_ms);
            match oracle {
                Some(oracle) => {
                    let raw = raw_depth_at(oracle, foot, config);
                    self.in_water = oracle
                        .world_to_tile(foot.x, foot.y)
                        .map(|tile| oracle.is_water_tile(tile))
                        .unwrap_or(false);
                    self.target_depth = if self.in_water { raw } else { 0.0 };
                }
                None => {
                    self.in_water = false;
                    self.target_depth = 0.0;
                }
            }
        }

        self.depth = approach(self.depth, self.target_depth, config.depth_smoothing);
        if (self.depth - self.target_depth).abs() < DEPTH_SNAP_EPSILON {
            self.depth = self.target_depth;
        }

        let multiplier = speed_multiplier(config, self.depth);
        SubmersionSample {
            in_water: self.in_water,
            raw_depth: self.target_depth,
            depth: self.depth,
            speed_multiplier: multiplier,
            sink_offset_px: sink_offset(config, self.depth),
            animation_time_scale: multiplier,
        }
    }
}
