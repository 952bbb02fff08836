#[derive(Clone, Copy, Debug)]
pub struct MapCamera {
    pub center: [f32; 2],
    /// Pixels per world unit. Larger = zoom in.
    pub pixels_per_unit: f32,
}

impl Default for MapCamera {
    fn default() -> Self {
        Self {
            center: [0.0, 0.0],
            pixels_per_unit: 1.0,
        }
    }
}

impl MapCamera {
    pub fn fit_bbox(&mut self, bbox: [f32; 4], viewport_px: [f32; 2], padding_frac: f32) {
        let [min_x, min_y, max_x, max_y] = bbox;
        self.center = [0.5 * (min_x + max_x), 0.5 * (min_y + max_y)];

        let w = (max_x - min_x).max(1e-6);
        let h = (max_y - min_y).max(1e-6);

        let fill = padding_frac.clamp(0.05, 0.95);
        let sx = (viewport_px[0] * fill) / w;
        let sy = (viewport_px[1] * fill) / h;
        self.pixels_per_unit = sx.min(sy).clamp(1e-9, 1e9);
    }

    pub fn pan_by_pixels(&mut self, delta_px: [f32; 2]) {
        self.center[0] -= delta_px[0] / self.pixels_per_unit;
        self.center[1] -= delta_px[1] / self.pixels_per_unit;
    }

    pub fn zoom_at_viewport_pixel(
        &mut self,
        mouse_px: [f32; 2],
        viewport_px: [f32; 2],
        zoom_factor: f32,
    ) {
        let old_ppu = self.pixels_per_unit;
        let new_ppu = (old_ppu * zoom_factor).clamp(1e-9, 1e9);

        // Keep the world point under the cursor stable:
        // world = center + (mouse - viewport/2)/ppu
        let before_x = self.center[0] + (mouse_px[0] - 0.5 * viewport_px[0]) / old_ppu;
        let before_y = self.center[1] + (mouse_px[1] - 0.5 * viewport_px[1]) / old_ppu;

        self.pixels_per_unit = new_ppu;

        self.center = [
            before_x - (mouse_px[0] - 0.5 * viewport_px[0]) / new_ppu,
            before_y - (mouse_px[1] - 0.5 * viewport_px[1]) / new_ppu,
        ];
    }

    pub fn world_to_screen(&self, world: [f32; 2], viewport_px: [f32; 2]) -> [f32; 2] {
        [
            0.5 * viewport_px[0] + (world[0] - self.center[0]) * self.pixels_per_unit,
            0.5 * viewport_px[1] + (world[1] - self.center[1]) * self.pixels_per_unit,
        ]
    }
}

#[derive(Clone, Copy, Debug)]
pub struct OrbitCamera {
    /// Rotation around the vertical axis, radians.
    pub yaw: f32,
    /// Elevation, radians, clamped short of the poles.
    pub pitch: f32,
    /// Eye distance from the cloud center, world units.
    pub distance: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            distance: 5.0,
        }
    }
}

impl OrbitCamera {
    const PITCH_LIMIT: f32 = 1.55;

    pub fn orbit_by_pixels(&mut self, delta_px: [f32; 2]) {
        self.yaw += delta_px[0] * 0.01;
        self.pitch = (self.pitch + delta_px[1] * 0.01)
            .clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT);
    }

    pub fn zoom_by(&mut self, factor: f32) {
        self.distance = (self.distance / factor.max(1e-3)).clamp(0.5, 100.0);
    }

    pub fn advance(&mut self, dt_sec: f32, rad_per_sec: f32) {
        self.yaw += dt_sec * rad_per_sec;
        if self.yaw.abs() > std::f32::consts::TAU {
            self.yaw %= std::f32::consts::TAU;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_bbox_centers_and_fills() {
        let mut cam = MapCamera::default();
        cam.fit_bbox([0.0, 0.0, 10.0, 20.0], [100.0, 100.0], 0.9);
        assert_eq!(cam.center, [5.0, 10.0]);
        assert!((cam.pixels_per_unit - 4.5).abs() < 1e-4);
    }

    #[test]
    fn zoom_keeps_cursor_point_fixed() {
        let mut cam = MapCamera {
            center: [3.0, -2.0],
            pixels_per_unit: 2.0,
        };
        let viewport = [200.0, 100.0];
        let mouse = [150.0, 25.0];
        let before_x = cam.center[0] + (mouse[0] - 100.0) / cam.pixels_per_unit;
        let before_y = cam.center[1] + (mouse[1] - 50.0) / cam.pixels_per_unit;
        cam.zoom_at_viewport_pixel(mouse, viewport, 1.5);
        let after_x = cam.center[0] + (mouse[0] - 100.0) / cam.pixels_per_unit;
        let after_y = cam.center[1] + (mouse[1] - 50.0) / cam.pixels_per_unit;
        assert!((before_x - after_x).abs() < 1e-4);
        assert!((before_y - after_y).abs() < 1e-4);
    }

    #[test]
    fn orbit_pitch_is_clamped() {
        let mut cam = OrbitCamera::default();
        cam.orbit_by_pixels([0.0, 10_000.0]);
        assert!(cam.pitch <= OrbitCamera::PITCH_LIMIT);
        cam.orbit_by_pixels([0.0, -20_000.0]);
        assert!(cam.pitch >= -OrbitCamera::PITCH_LIMIT);
    }

    #[test]
    fn zoom_by_clamps_distance() {
        let mut cam = OrbitCamera::default();
        cam.zoom_by(1000.0);
        assert!(cam.distance >= 0.5);
        cam.zoom_by(1e-6);
        assert!(cam.distance <= 100.0);
    }
}
