//! Where things live under the cache root.
//!
//! ```text
//! <env>/manifest.json
//! <env>/selections.json
//! <env>/segments/<hh>/<hex>-<occ>.<fmt>
//! <env>/sfx/<clip_id>/<hex>-<occ>-v<n>.<fmt>
//! <env>/music/<clip_id>/<hex>-<occ>-v<n>.<fmt>
//! ```

use narrate_core::hash::Hash256;
use narrate_core::manifest::UnitKind;

pub fn manifest_path(env: &str) -> String {
    format!("{env}/manifest.json")
}

pub fn selections_path(env: &str) -> String {
    format!("{env}/selections.json")
}

pub fn segment_path(env: &str, key: &Hash256, occurrence: u32, format: &str) -> String {
    format!(
        "{env}/{}/{}/{}-{occurrence}.{format}",
        UnitKind::Speech.dir(),
        key.shard(),
        key.to_hex()
    )
}

/// Directory holding every variant ever generated for one clip.
pub fn clip_prefix(env: &str, kind: UnitKind, clip_id: &str) -> String {
    format!("{env}/{}/{clip_id}/", kind.dir())
}

pub fn clip_path(
    env: &str,
    kind: UnitKind,
    clip_id: &str,
    key: &Hash256,
    occurrence: u32,
    variant: usize,
    format: &str,
) -> String {
    format!(
        "{}{}-{occurrence}-v{variant}.{format}",
        clip_prefix(env, kind, clip_id),
        key.to_hex()
    )
}

/// Variant index encoded in a clip file name (`...-v3.wav` → 3).
pub fn variant_of(path: &str) -> Option<usize> {
    let stem = path.rsplit('/').next()?;
    let stem = stem.split_once('.').map_or(stem, |(s, _)| s);
    stem.rsplit_once("-v")?.1.parse().ok()
}

#[cfg(test)]
mod tests {
    use narrate_core::hash::hash_str;

    use super::*;

    #[test]
    fn paths_follow_the_layout() {
        let key = hash_str("hello");
        let hex = key.to_hex();
        assert_eq!(manifest_path("dev"), "dev/manifest.json");
        assert_eq!(
            segment_path("dev", &key, 0, "wav"),
            format!("dev/segments/{}/{hex}-0.wav", &hex[..2])
        );
        let clip = clip_path("prod", UnitKind::Music, "bed", &key, 1, 2, "wav");
        assert_eq!(clip, format!("prod/music/bed/{hex}-1-v2.wav"));
        assert!(clip.starts_with(&clip_prefix("prod", UnitKind::Music, "bed")));
        assert_eq!(variant_of(&clip), Some(2));
        assert_eq!(variant_of("dev/manifest.json"), None);
    }
}
