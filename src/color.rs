use colorous::Gradient;
use eframe::egui;

/// Continuous rainbow sampled per cluster index.
const CLUSTER_GRADIENT: Gradient = colorous::RAINBOW;

/// Fixed color for unclustered records (cluster id -1).
pub const UNCLUSTERED_COLOR: u32 = pack_rgba8(0, 0, 0, 255);

pub const fn pack_rgba8(r: u8, g: u8, b: u8, a: u8) -> u32 {
    (r as u32) | ((g as u32) << 8) | ((b as u32) << 16) | ((a as u32) << 24)
}

pub const fn with_alpha(color: u32, a: u8) -> u32 {
    (color & 0x00ff_ffff) | ((a as u32) << 24)
}

/// Deterministic cluster color: sentinel for negative ids, otherwise the
/// gradient at cluster_id / cluster_count. A count of zero falls back to the
/// sentinel so an id-only lookup never panics.
pub fn cluster_color(cluster_id: i32, cluster_count: usize) -> u32 {
    if cluster_id < 0 || cluster_count == 0 {
        return UNCLUSTERED_COLOR;
    }
    let t = (cluster_id as f64 / cluster_count as f64).clamp(0.0, 1.0);
    let c = CLUSTER_GRADIENT.eval_continuous(t);
    pack_rgba8(c.r, c.g, c.b, 255)
}

pub fn color32(c: u32) -> egui::Color32 {
    egui::Color32::from_rgba_unmultiplied(
        (c & 0xff) as u8,
        ((c >> 8) & 0xff) as u8,
        ((c >> 16) & 0xff) as u8,
        ((c >> 24) & 0xff) as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_id_is_sentinel() {
        assert_eq!(cluster_color(-1, 0), UNCLUSTERED_COLOR);
        assert_eq!(cluster_color(-1, 1), UNCLUSTERED_COLOR);
        assert_eq!(cluster_color(-1, 17), UNCLUSTERED_COLOR);
    }

    #[test]
    fn zero_count_is_sentinel() {
        assert_eq!(cluster_color(0, 0), UNCLUSTERED_COLOR);
        assert_eq!(cluster_color(5, 0), UNCLUSTERED_COLOR);
    }

    #[test]
    fn deterministic_and_distinct_from_sentinel() {
        for id in 0..8 {
            let a = cluster_color(id, 8);
            let b = cluster_color(id, 8);
            assert_eq!(a, b);
            assert_ne!(a, UNCLUSTERED_COLOR);
        }
    }

    #[test]
    fn neighboring_clusters_differ() {
        assert_ne!(cluster_color(0, 4), cluster_color(1, 4));
        assert_ne!(cluster_color(1, 4), cluster_color(2, 4));
    }

    #[test]
    fn alpha_override_keeps_rgb() {
        let c = cluster_color(2, 5);
        let dimmed = with_alpha(c, 40);
        assert_eq!(dimmed & 0x00ff_ffff, c & 0x00ff_ffff);
        assert_eq!(dimmed >> 24, 40);
    }
}
