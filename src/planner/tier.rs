use crate::domain::{Preset, Tier};

pub(crate) struct TierResolution {
    pub tier: Tier,
    pub used_fallback: bool,
}

/// Pick the effective tier: the requested one when the preset defines it,
/// otherwise the first populated tier in balanced -> fast -> high order.
/// Presets without any tier table (copy/remux/lossless) keep the requested
/// tier without counting as a fallback.
pub(crate) fn resolve_tier(preset: &Preset, requested: Tier) -> TierResolution {
    if preset.video.tiers.is_empty() && preset.audio.tiers.is_empty() {
        return TierResolution {
            tier: requested,
            used_fallback: false,
        };
    }

    let has_tier = |tier: Tier| {
        preset.video.tiers.contains_key(&tier) || preset.audio.tiers.contains_key(&tier)
    };

    if has_tier(requested) {
        return TierResolution {
            tier: requested,
            used_fallback: false,
        };
    }

    for candidate in Tier::FALLBACK_ORDER {
        if has_tier(candidate) {
            return TierResolution {
                tier: candidate,
                used_fallback: true,
            };
        }
    }

    TierResolution {
        tier: requested,
        used_fallback: false,
    }
}
