use crate::{
    camera::OrbitCamera,
    color::{cluster_color, color32, with_alpha},
    data::{self, Dataset},
    map::MapView,
    panel::{journal_table, speaker_table, SelectionState, TableModel},
    render::{PointCloudGpu, SharedRender, Uniforms},
};
use anyhow::Context as _;
use eframe::egui;
use egui_wgpu::{wgpu, CallbackTrait};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Matches the point size of the original scene (2 px, no size attenuation).
const POINT_RADIUS_DEFAULT_PX: f32 = 2.0;
const FOV_Y_DEG: f32 = 75.0;
const CLOUD_SCALE: f32 = 2.0;
const DIM_ALPHA: u8 = 48;
const AUTO_ORBIT_RAD_PER_SEC: f32 = 0.25;
const REFRESH_CAP_HZ: f32 = 60.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ViewMode {
    Cloud3d,
    Map2d,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UiTheme {
    Dark,
    Light,
}

pub struct PressvizApp {
    dataset: Option<Arc<Dataset>>,
    dataset_path: Option<PathBuf>,

    view: ViewMode,
    orbit: OrbitCamera,
    auto_orbit: bool,
    map: MapView,

    selection: SelectionState,

    // Render plumbing
    shared: Arc<SharedRender>,
    positions: Arc<Vec<f32>>,
    positions_id: u64,
    colors_rgba8: Arc<Vec<u32>>,
    colors_id: u64,
    point_clusters: Vec<i32>,
    cloud_center: [f32; 3],
    cloud_norm_scale: f32,
    id_gen: u64,

    // UI/view settings
    ui_theme: UiTheme,
    background_color: egui::Color32,
    point_radius_px: f32,
    show_stats: bool,
    frame_ms_avg: f32,
    adapter_label: String,

    output_dir: PathBuf,

    open_path: String,
    status: Option<String>,
    last_error: Option<String>,
}

impl PressvizApp {
    pub fn new(cc: &eframe::CreationContext<'_>, initial_dataset: Option<PathBuf>) -> Self {
        let rs = cc
            .wgpu_render_state
            .as_ref()
            .expect("eframe must be built with the wgpu renderer");
        let target_format = rs.target_format;
        let adapter_info = rs.adapter.get_info();
        let adapter_label = format!(
            "{} ({:?}, {:?})",
            adapter_info.name, adapter_info.device_type, adapter_info.backend
        );

        let output_dir = std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("output");

        let mut app = Self {
            dataset: None,
            dataset_path: None,

            view: ViewMode::Cloud3d,
            orbit: OrbitCamera::default(),
            auto_orbit: true,
            map: MapView::default(),

            selection: SelectionState::default(),

            shared: Arc::new(SharedRender::new(target_format)),
            positions: Arc::new(Vec::new()),
            positions_id: 0,
            colors_rgba8: Arc::new(Vec::new()),
            colors_id: 0,
            point_clusters: Vec::new(),
            cloud_center: [0.0; 3],
            cloud_norm_scale: 1.0,
            id_gen: 1,

            ui_theme: UiTheme::Dark,
            background_color: egui::Color32::from_rgb(12, 12, 16),
            point_radius_px: POINT_RADIUS_DEFAULT_PX,
            show_stats: false,
            frame_ms_avg: 0.0,
            adapter_label,

            output_dir,

            open_path: String::new(),
            status: None,
            last_error: None,
        };

        if let Some(path) = initial_dataset {
            if let Err(e) = app.load_dataset(&path) {
                let msg = format!("Load failed: {e:#}");
                eprintln!("{msg}");
                app.last_error = Some(msg);
            }
        }
        app
    }

    fn next_id(&mut self) -> u64 {
        self.id_gen += 1;
        self.id_gen
    }

    fn load_dataset(&mut self, path: &Path) -> anyhow::Result<()> {
        let ds = Dataset::load(path).with_context(|| format!("load {}", path.display()))?;

        for issue in &ds.report.issues {
            eprintln!("{}:{}: {}", path.display(), issue.line, issue.reason);
        }

        let (positions, point_clusters) = ds.cloud_positions();
        let (center, norm_scale) = ds.cloud_transform();

        self.selection.clear();
        self.map.set_dataset(&ds);
        self.positions = Arc::new(positions);
        self.positions_id = self.next_id();
        self.point_clusters = point_clusters;
        self.cloud_center = center;
        self.cloud_norm_scale = norm_scale;
        self.orbit = OrbitCamera::default();

        self.status = Some(ds.report.summary());
        self.last_error = None;
        self.dataset_path = Some(path.to_path_buf());
        self.open_path = path.display().to_string();
        self.dataset = Some(Arc::new(ds));
        self.recompute_colors();
        Ok(())
    }

    fn open_dataset_dialog(&mut self) {
        let dialog = rfd::FileDialog::new()
            .add_filter("csv", &["csv"])
            .set_title("Select record CSV");
        if let Some(path) = dialog.pick_file() {
            if let Err(e) = self.load_dataset(&path) {
                let msg = format!("Load failed: {e:#}");
                eprintln!("{msg}");
                self.last_error = Some(msg);
            }
        }
    }

    fn generate_demo_dataset(&mut self) {
        let mut rng = rand::rng();
        match data::write_demo_dataset(&self.output_dir, &mut rng) {
            Ok(path) => {
                if let Err(e) = self.load_dataset(&path) {
                    let msg = format!("Load failed: {e:#}");
                    eprintln!("{msg}");
                    self.last_error = Some(msg);
                }
            }
            Err(e) => {
                let msg = format!("Demo dataset failed: {e:#}");
                eprintln!("{msg}");
                self.last_error = Some(msg);
            }
        }
    }

    /// Per-point colors from cluster ids. While a cluster is selected every
    /// other cluster is dimmed instead of hidden.
    fn recompute_colors(&mut self) {
        let Some(ds) = self.dataset.as_ref() else {
            self.colors_rgba8 = Arc::new(Vec::new());
            self.colors_id = self.next_id();
            return;
        };
        let selected = self.selection.selected();
        let colors: Vec<u32> = self
            .point_clusters
            .iter()
            .map(|&id| {
                let base = cluster_color(id, ds.cluster_count);
                match selected {
                    Some(sel) if sel != id => with_alpha(base, DIM_ALPHA),
                    _ => base,
                }
            })
            .collect();
        self.colors_rgba8 = Arc::new(colors);
        self.colors_id = self.next_id();
    }

    fn toggle_cluster(&mut self, cluster_id: i32) {
        // Any select/deselect transition invalidates the highlight colors.
        let events = self.selection.toggle(cluster_id);
        if !events.is_empty() {
            self.recompute_colors();
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        for file in dropped {
            let Some(path) = file.path else { continue };
            let is_csv = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                .unwrap_or(false);
            if !is_csv {
                self.status = Some("Drop a .csv record file.".to_string());
                continue;
            }
            if let Err(e) = self.load_dataset(&path) {
                let msg = format!("Load failed: {e:#}");
                eprintln!("{msg}");
                self.last_error = Some(msg);
            }
            break;
        }
    }

    fn handle_screenshot_events(&mut self, ctx: &egui::Context) {
        let images: Vec<Arc<egui::ColorImage>> = ctx.input(|i| {
            i.raw
                .events
                .iter()
                .filter_map(|e| match e {
                    egui::Event::Screenshot { image, .. } => Some(image.clone()),
                    _ => None,
                })
                .collect()
        });
        for image in images {
            let stamp = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            let path = self.output_dir.join(format!("pressviz_{stamp}.png"));
            match save_color_image_png(&image, &path) {
                Ok(()) => self.status = Some(format!("Saved {}", path.display())),
                Err(e) => {
                    let msg = format!("Screenshot failed: {e:#}");
                    eprintln!("{msg}");
                    self.last_error = Some(msg);
                }
            }
        }
    }

    fn visuals_for_theme(theme: UiTheme) -> egui::Visuals {
        match theme {
            UiTheme::Dark => egui::Visuals::dark(),
            UiTheme::Light => egui::Visuals::light(),
        }
    }

    fn ui_left_panel(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.heading("pressviz");
        ui.label("Clustered newspaper explorer");

        ui.separator();
        ui.label("Dataset");
        ui.horizontal(|ui| {
            if ui.button("Open CSV...").clicked() {
                self.open_dataset_dialog();
            }
            if ui.button("Demo dataset").clicked() {
                self.generate_demo_dataset();
            }
        });
        ui.label("Or drop a .csv anywhere in the window.");
        ui.horizontal(|ui| {
            ui.add(
                egui::TextEdit::singleline(&mut self.open_path).hint_text("path/to/records.csv"),
            );
            if ui.button("Load").clicked() && !self.open_path.is_empty() {
                let path = PathBuf::from(self.open_path.clone());
                if let Err(e) = self.load_dataset(&path) {
                    let msg = format!("Load failed: {e:#}");
                    eprintln!("{msg}");
                    self.last_error = Some(msg);
                }
            }
        });
        if let Some(path) = self.dataset_path.as_ref() {
            ui.label(
                egui::RichText::new(path.display().to_string())
                    .small()
                    .weak(),
            );
        }
        if let Some(status) = self.status.as_ref() {
            ui.label(status);
        }
        if let Some(err) = self.last_error.as_ref() {
            ui.colored_label(egui::Color32::from_rgb(230, 110, 100), err);
        }

        ui.separator();
        ui.label("View");
        ui.horizontal(|ui| {
            ui.selectable_value(&mut self.view, ViewMode::Cloud3d, "3D clusters");
            ui.selectable_value(&mut self.view, ViewMode::Map2d, "Map");
        });

        match self.view {
            ViewMode::Cloud3d => {
                ui.checkbox(&mut self.auto_orbit, "Auto orbit");
                ui.horizontal(|ui| {
                    ui.label("Point radius");
                    ui.add(
                        egui::Slider::new(&mut self.point_radius_px, 1.0..=8.0).suffix(" px"),
                    );
                });
                if ui.button("Reset view").clicked() {
                    self.orbit = OrbitCamera::default();
                }
            }
            ViewMode::Map2d => {
                if let Some(ds) = self.dataset.clone() {
                    egui::CollapsingHeader::new("Layers")
                        .default_open(true)
                        .show(ui, |ui| {
                            for cluster in &ds.clusters {
                                if let Some(visible) =
                                    self.map.layer_visible.get_mut(&cluster.cluster_id)
                                {
                                    ui.checkbox(visible, &cluster.name);
                                }
                            }
                        });
                    ui.label(format!("{} markers", self.map.marker_count()));
                } else {
                    ui.label("No dataset loaded.");
                }
            }
        }

        ui.separator();
        ui.label("Appearance");
        ui.horizontal(|ui| {
            ui.selectable_value(&mut self.ui_theme, UiTheme::Dark, "Dark");
            ui.selectable_value(&mut self.ui_theme, UiTheme::Light, "Light");
        });
        ui.horizontal(|ui| {
            ui.label("Background");
            ui.color_edit_button_srgba(&mut self.background_color);
        });
        ui.checkbox(&mut self.show_stats, "Show stats");

        ui.separator();
        if ui.button("Save screenshot").clicked() {
            ctx.send_viewport_cmd(egui::ViewportCommand::Screenshot(Default::default()));
        }
    }

    fn ui_cluster_panel(&mut self, ui: &mut egui::Ui) {
        let Some(ds) = self.dataset.clone() else {
            ui.heading("Clusters");
            ui.label("Load a dataset to list clusters.");
            return;
        };

        ui.heading("Clusters");
        ui.label("Click a cluster to highlight it; click again to clear.");
        ui.add_space(4.0);

        for cluster in &ds.clusters {
            let fill = color32(cluster_color(cluster.cluster_id, ds.cluster_count));
            let selected = self.selection.is_selected(cluster.cluster_id);
            let label = format!("{} ({})", cluster.name, cluster.members.len());
            let mut button = egui::Button::new(
                egui::RichText::new(label).color(contrast_color(fill)),
            )
            .fill(fill)
            .min_size(egui::vec2(ui.available_width(), 0.0));
            if selected {
                button = button.stroke(egui::Stroke::new(
                    2.0,
                    ui.visuals().strong_text_color(),
                ));
            }
            if ui.add(button).clicked() {
                self.toggle_cluster(cluster.cluster_id);
            }
        }

        // Detail pane, only while something is selected.
        if let Some(selected) = self.selection.selected() {
            if let Some(cluster) = ds.cluster(selected) {
                ui.separator();
                ui.strong(&cluster.name);
                if !cluster.journals.is_empty() {
                    draw_table(ui, &journal_table(&cluster.journals));
                }
                if !cluster.speakers.is_empty() {
                    draw_table(ui, &speaker_table(&cluster.speakers));
                }
                if cluster.journals.is_empty() && cluster.speakers.is_empty() {
                    ui.label("No sidecar details for this cluster.");
                }
            }
        }
    }

    fn ui_viewport(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), egui::Sense::drag());
        ui.painter().rect_filled(rect, 0.0, self.background_color);

        // Interactions
        if response.dragged() {
            let delta = response.drag_delta();
            self.orbit.orbit_by_pixels([delta.x, delta.y]);
        }
        if response.hovered() {
            let scroll = ctx.input(|i| i.smooth_scroll_delta.y);
            if scroll.abs() > 0.0 {
                let factor = (1.0 + scroll * 0.0015).clamp(0.8, 1.25);
                self.orbit.zoom_by(factor);
            }
        }
        if self.auto_orbit {
            let dt = ctx.input(|i| i.stable_dt).min(0.1);
            self.orbit.advance(dt, AUTO_ORBIT_RAD_PER_SEC);
        }

        if self.show_stats {
            let dt = ctx.input(|i| i.unstable_dt);
            if dt > 0.0 {
                let ms = dt * 1000.0;
                if self.frame_ms_avg <= 0.0 {
                    self.frame_ms_avg = ms;
                } else {
                    self.frame_ms_avg = self.frame_ms_avg * 0.9 + ms * 0.1;
                }
            }
            let fps = if self.frame_ms_avg > 0.0 {
                1000.0 / self.frame_ms_avg
            } else {
                0.0
            };
            let label = format!(
                "{} | {:.1} fps | {} points",
                self.adapter_label,
                fps,
                self.point_clusters.len()
            );
            ui.painter().text(
                rect.right_top() + egui::vec2(-6.0, 6.0),
                egui::Align2::RIGHT_TOP,
                label,
                egui::FontId::proportional(12.0),
                contrast_color(self.background_color),
            );
        }

        let ppp = ctx.pixels_per_point();
        let viewport_px = [rect.width() * ppp, rect.height() * ppp];

        let uniforms = Uniforms {
            viewport_px,
            point_radius_px: self.point_radius_px * ppp,
            distance: self.orbit.distance,
            yaw: self.orbit.yaw,
            pitch: self.orbit.pitch,
            fov_y_rad: FOV_Y_DEG.to_radians(),
            scale: self.cloud_norm_scale * CLOUD_SCALE,
            center: self.cloud_center,
            _pad: 0.0,
        };

        {
            let mut p = self.shared.params.lock();
            p.positions_id = self.positions_id;
            p.positions = self.positions.clone();
            p.colors_id = self.colors_id;
            p.colors_rgba8 = self.colors_rgba8.clone();
            p.uniforms = uniforms;
        }

        let cb = PointCloudCallback {
            shared: self.shared.clone(),
        };
        ui.painter()
            .add(egui_wgpu::Callback::new_paint_callback(rect, cb));

        if self.positions.is_empty() {
            ui.painter().text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                "No spatial records loaded",
                egui::FontId::proportional(14.0),
                contrast_color(self.background_color),
            );
        }

        // Keep repainting only while the cloud is animating.
        if self.auto_orbit {
            ctx.request_repaint_after(std::time::Duration::from_secs_f32(
                1.0 / REFRESH_CAP_HZ,
            ));
        }
    }
}

impl eframe::App for PressvizApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.set_visuals(Self::visuals_for_theme(self.ui_theme));
        self.handle_dropped_files(ctx);
        self.handle_screenshot_events(ctx);

        egui::SidePanel::left("controls")
            .resizable(true)
            .default_width(260.0)
            .max_width(420.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical()
                    .auto_shrink([false; 2])
                    .show(ui, |ui| {
                        self.ui_left_panel(ui, ctx);
                    });
            });

        egui::SidePanel::right("clusters")
            .resizable(true)
            .default_width(300.0)
            .max_width(480.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical()
                    .auto_shrink([false; 2])
                    .show(ui, |ui| {
                        self.ui_cluster_panel(ui);
                    });
            });

        egui::CentralPanel::default().show(ctx, |ui| match self.view {
            ViewMode::Cloud3d => self.ui_viewport(ui, ctx),
            ViewMode::Map2d => {
                if let Some(ds) = self.dataset.clone() {
                    self.map.ui(ui, ctx, &ds, &self.selection);
                } else {
                    ui.centered_and_justified(|ui| {
                        ui.label("Load a dataset to see the map.");
                    });
                }
            }
        });
    }
}

struct PointCloudCallback {
    shared: Arc<SharedRender>,
}

impl CallbackTrait for PointCloudCallback {
    fn prepare(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        _screen_descriptor: &egui_wgpu::ScreenDescriptor,
        _egui_encoder: &mut wgpu::CommandEncoder,
        callback_resources: &mut egui_wgpu::CallbackResources,
    ) -> Vec<wgpu::CommandBuffer> {
        if callback_resources.get::<PointCloudGpu>().is_none() {
            let target_format = self.shared.params.lock().target_format;
            callback_resources.insert(PointCloudGpu::new(device, target_format));
        }
        let gpu = callback_resources.get_mut::<PointCloudGpu>().unwrap();

        let p = self.shared.params.lock();
        if p.positions.is_empty() || p.colors_rgba8.is_empty() {
            gpu.n_points = 0;
            return Vec::new();
        }
        gpu.prepare(
            device,
            queue,
            p.target_format,
            p.positions_id,
            &p.positions,
            p.colors_id,
            &p.colors_rgba8,
            p.uniforms,
        );
        Vec::new()
    }

    fn paint(
        &self,
        _info: egui::PaintCallbackInfo,
        render_pass: &mut wgpu::RenderPass<'static>,
        callback_resources: &egui_wgpu::CallbackResources,
    ) {
        let Some(gpu) = callback_resources.get::<PointCloudGpu>() else {
            return;
        };
        gpu.paint(render_pass);
    }
}

fn draw_table(ui: &mut egui::Ui, table: &TableModel) {
    ui.add_space(6.0);
    ui.strong(&table.title);
    egui::Grid::new(&table.title)
        .striped(true)
        .min_col_width(24.0)
        .show(ui, |ui| {
            for column in &table.columns {
                ui.label(egui::RichText::new(column).strong());
            }
            ui.end_row();
            for row in &table.rows {
                for cell in row {
                    ui.label(cell);
                }
                ui.end_row();
            }
        });
}

// Minimal PNG save for egui::ColorImage
fn save_color_image_png(img: &egui::ColorImage, path: &Path) -> anyhow::Result<()> {
    use image::ImageEncoder;

    let w = img.size[0] as u32;
    let h = img.size[1] as u32;
    let mut rgba = Vec::with_capacity((w * h * 4) as usize);
    for p in &img.pixels {
        rgba.extend_from_slice(&[p.r(), p.g(), p.b(), p.a()]);
    }

    std::fs::create_dir_all(path.parent().unwrap_or(Path::new(".")))?;
    let encoder = image::codecs::png::PngEncoder::new(std::fs::File::create(path)?);
    encoder.write_image(&rgba, w, h, image::ColorType::Rgba8.into())?;
    Ok(())
}

fn contrast_color(bg: egui::Color32) -> egui::Color32 {
    let luma = 0.2126 * bg.r() as f32 + 0.7152 * bg.g() as f32 + 0.0722 * bg.b() as f32;
    if luma > 140.0 {
        egui::Color32::BLACK
    } else {
        egui::Color32::WHITE
    }
}
