use std::collections::HashMap;

use image::{Rgba, RgbaImage};
use sha2::{Digest, Sha256};

pub const PARTICLE_TEXTURE_SIZE_PX: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tint {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Tint {
    pub const WHITE: Tint = Tint {
        r: 255,
        g: 255,
        b: 255,
    };

    /// Stable color for an identity. Channels are lifted into the upper half
    /// of the range so particles stay readable on dark ground.
    pub fn from_identity(identity: &str) -> Tint {
        let digest = Sha256::digest(identity.as_bytes());
        Tint {
            r: 128 | (digest[0] >> 1),
            g: 128 | (digest[1] >> 1),
            b: 128 | (digest[2] >> 1),
        }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Per-identity tints and their particle textures, computed once and shared
/// by every entity the owner composes. Entries are never evicted: a peer that
/// leaves and rejoins reuses its tint, and the cache grows with the number of
/// distinct identities seen.
#[derive(Debug, Default)]
pub struct TintCache {
    tints: HashMap<String, Tint>,
    textures: HashMap<Tint, RgbaImage>,
}

impl TintCache {
    pub fn tint_for(&mut self, identity: &str) -> Tint {
        if let Some(tint) = self.tints.get(identity) {
            return *tint;
        }
        let tint = Tint::from_identity(identity);
        self.tints.insert(identity.to_string(), tint);
        self.textures
            .entry(tint)
            .or_insert_with(|| build_particle_texture(tint));
        tint
    }

    pub fn texture_for(&self, tint: Tint) -> Option<&RgbaImage> {
        self.textures.get(&tint)
    }

    pub fn identity_count(&self) -> usize {
        self.tints.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}

fn build_particle_texture(tint: Tint) -> RgbaImage {
    let size = PARTICLE_TEXTURE_SIZE_PX;
    let center = (size as f32 - 1.0) * 0.5;
    let radius = size as f32 * 0.5;
    RgbaImage::from_fn(size, size, |x, y| {
        let dx = x as f32 - center;
        let dy = y as f32 - center;
        let falloff = 1.0 - ((dx * dx + dy * dy).sqrt() / radius).min(1.0);
        let alpha = (falloff * 255.0).round() as u8;
        Rgba([tint.r, tint.g, tint.b, alpha])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_tint_is_stable_and_bright() {
        let first = Tint::from_identity("session-abc");
        let second = Tint::from_identity("session-abc");
        assert_eq!(first, second);
        assert!(first.r >= 128 && first.g >= 128 && first.b >= 128);
        assert_eq!(first.to_hex().len(), 7);
    }

    #[test]
    fn cache_computes_each_identity_once() {
        let mut cache = TintCache::default();
        let tint = cache.tint_for("a");
        assert_eq!(cache.tint_for("a"), tint);
        cache.tint_for("b");
        assert_eq!(cache.identity_count(), 2);
        assert!(cache.texture_count() >= 1);

        let texture = cache.texture_for(tint).expect("texture");
        assert_eq!(texture.width(), PARTICLE_TEXTURE_SIZE_PX);
        let corner = texture.get_pixel(0, 0);
        let middle = texture.get_pixel(PARTICLE_TEXTURE_SIZE_PX / 2, PARTICLE_TEXTURE_SIZE_PX / 2);
        assert!(middle[3] > corner[3]);
        assert_eq!(middle[0], tint.r);
    }
}
