use std::collections::BTreeMap;

use eframe::egui;

use crate::{
    camera::MapCamera,
    color::{cluster_color, color32, with_alpha},
    data::Dataset,
    panel::SelectionState,
};

/// Initial view center when a dataset has no geo records (Lausanne).
pub const DEFAULT_CENTER: [f64; 2] = [46.5191, 6.5668];
/// Ground radius of one journal marker, meters.
pub const MARKER_RADIUS_M: f64 = 5000.0;

const EARTH_RADIUS_M: f64 = 6_378_137.0;
const MAX_LAT_DEG: f64 = 85.05113;
const DIM_ALPHA: u8 = 48;

#[derive(Clone, Debug)]
pub struct Marker {
    pub cluster_id: i32,
    pub name: String,
    /// Mercator meters, y grows southward so north is up on screen.
    pub world: [f32; 2],
    pub radius_world: f32,
}

/// Spherical Web Mercator, y negated for screen space.
pub fn mercator(lat_deg: f64, lon_deg: f64) -> [f64; 2] {
    let lat = lat_deg.clamp(-MAX_LAT_DEG, MAX_LAT_DEG).to_radians();
    let x = EARTH_RADIUS_M * lon_deg.to_radians();
    let y = -EARTH_RADIUS_M * (std::f64::consts::FRAC_PI_4 + 0.5 * lat).tan().ln();
    [x, y]
}

fn inverse_mercator(world: [f64; 2]) -> [f64; 2] {
    let lon = (world[0] / EARTH_RADIUS_M).to_degrees();
    let lat = (2.0 * (-world[1] / EARTH_RADIUS_M).exp().atan() - std::f64::consts::FRAC_PI_2)
        .to_degrees();
    [lat, lon]
}

/// One circle per record with a geo pair; records without one are skipped.
/// The ground radius is stretched by the mercator latitude factor so circles
/// keep their real-world size.
pub fn build_markers(ds: &Dataset) -> Vec<Marker> {
    ds.records
        .iter()
        .filter_map(|r| {
            let [lat, lon] = r.geo?;
            let world = mercator(lat, lon);
            let stretch = 1.0 / lat.to_radians().cos().max(1e-6);
            Some(Marker {
                cluster_id: r.cluster_id,
                name: r.name.clone(),
                world: [world[0] as f32, world[1] as f32],
                radius_world: (MARKER_RADIUS_M * stretch) as f32,
            })
        })
        .collect()
}

pub struct MapView {
    pub camera: MapCamera,
    pub layer_visible: BTreeMap<i32, bool>,
    markers: Vec<Marker>,
    fitted: bool,
}

impl Default for MapView {
    fn default() -> Self {
        Self {
            camera: MapCamera::default(),
            layer_visible: BTreeMap::new(),
            markers: Vec::new(),
            fitted: false,
        }
    }
}

impl MapView {
    pub fn set_dataset(&mut self, ds: &Dataset) {
        self.markers = build_markers(ds);
        self.layer_visible = ds
            .clusters
            .iter()
            .map(|c| (c.cluster_id, true))
            .collect();
        self.fitted = false;
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    fn fit(&mut self, ds: &Dataset, viewport_px: [f32; 2]) {
        if let Some([min_lat, min_lon, max_lat, max_lon]) = ds.geo_bounds() {
            let a = mercator(max_lat, min_lon);
            let b = mercator(min_lat, max_lon);
            self.camera.fit_bbox(
                [a[0] as f32, a[1] as f32, b[0] as f32, b[1] as f32],
                viewport_px,
                0.8,
            );
            // A single marker produces a degenerate bbox; back off to a
            // city-scale zoom.
            if self.camera.pixels_per_unit > 0.01 {
                self.camera.pixels_per_unit = 0.01;
            }
        } else {
            let c = mercator(DEFAULT_CENTER[0], DEFAULT_CENTER[1]);
            self.camera.center = [c[0] as f32, c[1] as f32];
            self.camera.pixels_per_unit = 0.005;
        }
    }

    pub fn ui(
        &mut self,
        ui: &mut egui::Ui,
        ctx: &egui::Context,
        ds: &Dataset,
        selection: &SelectionState,
    ) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), egui::Sense::drag());
        let painter = ui.painter_at(rect);
        let dark = ui.visuals().dark_mode;
        let paper = if dark {
            egui::Color32::from_rgb(24, 26, 30)
        } else {
            egui::Color32::from_rgb(244, 241, 234)
        };
        painter.rect_filled(rect, 0.0, paper);

        let ppp = ctx.pixels_per_point();
        let viewport_px = [rect.width() * ppp, rect.height() * ppp];
        if !self.fitted && viewport_px[0] > 0.0 {
            self.fit(ds, viewport_px);
            self.fitted = true;
        }

        if response.dragged() {
            let delta = response.drag_delta();
            self.camera.pan_by_pixels([delta.x * ppp, delta.y * ppp]);
        }
        if response.hovered() {
            let scroll = ctx.input(|i| i.smooth_scroll_delta.y);
            if scroll.abs() > 0.0 {
                let zoom_factor = (1.0 + scroll * 0.0015).clamp(0.8, 1.25);
                let mouse = ctx.input(|i| i.pointer.hover_pos()).unwrap_or(rect.center());
                let local = mouse - rect.min;
                self.camera.zoom_at_viewport_pixel(
                    [local.x * ppp, local.y * ppp],
                    viewport_px,
                    zoom_factor,
                );
            }
        }

        self.draw_graticule(&painter, rect, viewport_px, ppp, dark);

        // Markers, cluster color per marker, dimmed while another cluster is
        // selected.
        let mut hovered: Option<(usize, egui::Pos2)> = None;
        let pointer = response.hover_pos();
        for (i, m) in self.markers.iter().enumerate() {
            if !self.layer_visible.get(&m.cluster_id).copied().unwrap_or(true) {
                continue;
            }
            let screen_px = self
                .camera
                .world_to_screen(m.world, viewport_px);
            let pos = rect.min + egui::vec2(screen_px[0] / ppp, screen_px[1] / ppp);
            if !rect.expand(40.0).contains(pos) {
                continue;
            }
            let radius = (m.radius_world * self.camera.pixels_per_unit / ppp).clamp(2.5, 48.0);

            let selected_here = selection.is_selected(m.cluster_id);
            let alpha = if selection.selected().is_some() && !selected_here {
                DIM_ALPHA
            } else {
                230
            };
            let packed = with_alpha(cluster_color(m.cluster_id, ds.cluster_count), alpha);
            painter.circle_filled(pos, radius, color32(packed));
            if selected_here {
                painter.circle_stroke(
                    pos,
                    radius + 1.5,
                    egui::Stroke::new(1.5, ui.visuals().strong_text_color()),
                );
            }

            if let Some(p) = pointer {
                if p.distance(pos) <= radius.max(4.0) {
                    hovered = Some((i, pos));
                }
            }
        }

        if let Some((i, pos)) = hovered {
            let m = &self.markers[i];
            let galley = painter.layout_no_wrap(
                m.name.clone(),
                egui::FontId::proportional(13.0),
                ui.visuals().strong_text_color(),
            );
            let anchor = pos + egui::vec2(10.0, -10.0 - galley.size().y);
            let bg = egui::Rect::from_min_size(anchor, galley.size()).expand(5.0);
            painter.rect_filled(bg, 4.0, ui.visuals().extreme_bg_color);
            painter.rect_stroke(
                bg,
                4.0,
                ui.visuals().window_stroke,
                egui::StrokeKind::Outside,
            );
            painter.galley(anchor, galley, ui.visuals().strong_text_color());
        }
    }

    fn draw_graticule(
        &self,
        painter: &egui::Painter,
        rect: egui::Rect,
        viewport_px: [f32; 2],
        ppp: f32,
        dark: bool,
    ) {
        let line_color = if dark {
            egui::Color32::from_gray(50)
        } else {
            egui::Color32::from_gray(210)
        };
        let stroke = egui::Stroke::new(1.0, line_color);

        // View corners in lat/lon.
        let half_w = 0.5 * viewport_px[0] / self.camera.pixels_per_unit;
        let half_h = 0.5 * viewport_px[1] / self.camera.pixels_per_unit;
        let [lat_hi, lon_lo] = inverse_mercator([
            (self.camera.center[0] - half_w) as f64,
            (self.camera.center[1] - half_h) as f64,
        ]);
        let [lat_lo, lon_hi] = inverse_mercator([
            (self.camera.center[0] + half_w) as f64,
            (self.camera.center[1] + half_h) as f64,
        ]);

        // Pick the degree step that keeps lines at least ~80 px apart.
        let steps = [0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0];
        let span = (lon_hi - lon_lo).abs().max(1e-9);
        let px_per_deg = rect.width() as f64 / span;
        let step = steps
            .into_iter()
            .find(|s| s * px_per_deg >= 80.0)
            .unwrap_or(20.0);

        let to_pos = |lat: f64, lon: f64| {
            let w = mercator(lat, lon);
            let s = self
                .camera
                .world_to_screen([w[0] as f32, w[1] as f32], viewport_px);
            rect.min + egui::vec2(s[0] / ppp, s[1] / ppp)
        };

        let mut lon = (lon_lo / step).floor() * step;
        while lon <= lon_hi + step {
            let a = to_pos(lat_hi, lon);
            let b = to_pos(lat_lo, lon);
            painter.line_segment([a, b], stroke);
            lon += step;
        }
        let mut lat = (lat_lo / step).floor() * step;
        while lat <= lat_hi + step {
            let a = to_pos(lat, lon_lo);
            let b = to_pos(lat, lon_hi);
            painter.line_segment([a, b], stroke);
            lat += step;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{LoadReport, Record};

    fn dataset(records: Vec<Record>) -> Dataset {
        let clusters = crate::data::build_clusters(&records, &[]);
        let groups = crate::data::group_by_cluster(&records);
        let cluster_count = crate::data::cluster_count(&groups);
        Dataset {
            records,
            clusters,
            cluster_count,
            report: LoadReport::default(),
        }
    }

    fn rec(cluster_id: i32, geo: Option<[f64; 2]>) -> Record {
        Record {
            cluster_id,
            name: "Gazette".to_string(),
            position: None,
            geo,
        }
    }

    #[test]
    fn records_without_geo_yield_no_markers() {
        let ds = dataset(vec![rec(0, None)]);
        assert!(build_markers(&ds).is_empty());
    }

    #[test]
    fn markers_keep_cluster_and_name() {
        let ds = dataset(vec![
            rec(0, Some([46.5, 6.6])),
            rec(1, None),
            rec(-1, Some([47.0, 7.0])),
        ]);
        let markers = build_markers(&ds);
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].cluster_id, 0);
        assert_eq!(markers[1].cluster_id, -1);
        assert_eq!(markers[0].name, "Gazette");
    }

    #[test]
    fn mercator_is_north_up() {
        let north = mercator(47.0, 7.0);
        let south = mercator(46.0, 7.0);
        assert!(north[1] < south[1]);
        let east = mercator(46.0, 8.0);
        assert!(east[0] > south[0]);
    }

    #[test]
    fn inverse_mercator_round_trips() {
        let w = mercator(46.5191, 6.5668);
        let [lat, lon] = inverse_mercator(w);
        assert!((lat - 46.5191).abs() < 1e-9);
        assert!((lon - 6.5668).abs() < 1e-9);
    }

    #[test]
    fn marker_radius_grows_with_latitude() {
        let ds = dataset(vec![
            rec(0, Some([0.0, 0.0])),
            rec(0, Some([60.0, 0.0])),
        ]);
        let markers = build_markers(&ds);
        assert!(markers[1].radius_world > markers[0].radius_world);
    }
}
