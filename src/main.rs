mod app;
mod camera;
mod color;
mod data;
mod map;
mod panel;
mod render;

use std::path::PathBuf;

fn main() -> eframe::Result<()> {
    let initial_dataset = std::env::args().nth(1).map(PathBuf::from);

    let native_options = eframe::NativeOptions {
        renderer: eframe::Renderer::Wgpu,
        viewport: eframe::egui::ViewportBuilder::default()
            .with_title("pressviz")
            .with_inner_size([1280.0, 820.0]),
        ..Default::default()
    };

    eframe::run_native(
        "pressviz",
        native_options,
        Box::new(move |cc| Ok(Box::new(app::PressvizApp::new(cc, initial_dataset)))),
    )
}
