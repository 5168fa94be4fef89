use std::cmp::Ordering;

use crate::config::DepthConfig;
use crate::math::Vec2;
use crate::oracle::OcclusionOracle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DepthSource {
    Ground,
    Occluded { layer_depth: f32 },
    AboveElevated { layer_depth: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawDepth {
    pub depth: f32,
    pub source: DepthSource,
}

pub fn foot_depth_offset(config: &DepthConfig, foot_y: f32) -> f32 {
    foot_y * config.foot_y_scale
}

/// Draw depth for a visual whose ground contact point is `foot`.
/// Recomputed every tick; never cached.
pub fn compute_draw_depth(
    config: &DepthConfig,
    foot: Vec2,
    occlusion: Option<&dyn OcclusionOracle>,
) -> DrawDepth {
    let offset = foot_depth_offset(config, foot.y);
    let ground = DrawDepth {
        depth: config.base_depth + offset,
        source: DepthSource::Ground,
    };
    let Some(oracle) = occlusion else {
        return ground;
    };

    let tags = oracle.region_tags_at(foot.x, foot.y, config.occlusion_tolerance_px);
    if !tags.is_empty() {
        if let Some(layer_depth) = oracle.base_depth_for_tags(&tags) {
            return DrawDepth {
                depth: layer_depth - config.occluded_offset + offset,
                source: DepthSource::Occluded { layer_depth },
            };
        }
    }

    match oracle.max_elevated_layer_depth() {
        Some(layer_depth) => {
            let above = layer_depth + config.elevated_front_offset + offset;
            if above > ground.depth {
                DrawDepth {
                    depth: above,
                    source: DepthSource::AboveElevated { layer_depth },
                }
            } else {
                ground
            }
        }
        None => ground,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawKey {
    pub depth: f32,
    pub spawn_order: u64,
}

impl DrawKey {
    pub fn cmp_back_to_front(&self, other: &DrawKey) -> Ordering {
        self.depth
            .total_cmp(&other.depth)
            .then_with(|| self.spawn_order.cmp(&other.spawn_order))
    }
}

/// Sorts back to front. Equal depths fall back to spawn order so two
/// entities standing on the same row never swap between frames.
pub fn sort_draw_order<T, F>(items: &mut [T], key: F)
where
    F: Fn(&T) -> DrawKey,
{
    items.sort_by(|left, right| key(left).cmp_back_to_front(&key(right)));
}
