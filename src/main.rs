use chatboard::gui::frontend::BoardApp;

use eframe::egui;

fn main() -> eframe::Result {
    env_logger::init();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1300.0, 710.0])
            // Provide sensible bounds so the UI stays usable on small screens
            .with_min_inner_size([760.0, 480.0])
            .with_resizable(true),
        ..Default::default()
    };
    eframe::run_native(
        "ChatBoard",
        options,
        Box::new(|_cc| Ok(Box::new(BoardApp::new()) as Box<dyn eframe::App>)),
    )
}
