//! The overlay window
//!
//! Owns the [`OverlayController`] and drives it from the eframe event loop:
//! placement is retried until the monitor size is known, a finished drag
//! and the newest pending mode are applied once per frame, and the next
//! repaint is scheduled for the earliest animation deadline.

use std::time::{Duration, Instant};

use eframe::egui;

use super::surface::EguiSurface;
use crate::audio::{AudioMonitor, MonitorStatus};
use crate::config::WindowConfig;
use crate::mode::{Mode, ModeReceiver};
use crate::overlay::{ImageFileLoader, OverlayController, Point};
use crate::session::Session;

/// How often placement is retried before the monitor size is known
const PLACEMENT_RETRY: Duration = Duration::from_millis(50);

/// Window options for the overlay
pub fn native_options(window: &WindowConfig) -> eframe::NativeOptions {
    if window.click_through && window.draggable {
        tracing::warn!("Dragging requires mouse input; click-through disabled");
    }

    eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Anilay")
            .with_inner_size([1.0, 1.0])
            .with_decorations(false)
            .with_resizable(false)
            .with_taskbar(false)
            .with_transparent(window.transparent)
            .with_window_level(if window.always_on_top {
                egui::WindowLevel::AlwaysOnTop
            } else {
                egui::WindowLevel::Normal
            })
            .with_mouse_passthrough(window.click_through && !window.draggable),
        ..Default::default()
    }
}

pub struct OverlayApp {
    controller: OverlayController<EguiSurface, ImageFileLoader>,
    receiver: ModeReceiver,
    monitor: Option<AudioMonitor>,
    draggable: bool,
    dragging: bool,
    capture_lost_logged: bool,
}

impl OverlayApp {
    pub fn new(ctx: &egui::Context, session: Session) -> Self {
        let Session {
            config,
            receiver,
            monitor,
        } = session;

        let waker_ctx = ctx.clone();
        receiver.set_waker(move || waker_ctx.request_repaint());

        Self {
            controller: OverlayController::new(
                EguiSurface::new(ctx.clone()),
                ImageFileLoader,
                config.profiles,
            ),
            receiver,
            monitor: Some(monitor),
            draggable: config.window.draggable,
            dragging: false,
            capture_lost_logged: false,
        }
    }

    /// Newest pending mode, if any
    fn pending_mode(&mut self) -> Option<Mode> {
        let mode = self.receiver.try_recv();

        if self.receiver.is_closed() && !self.capture_lost_logged {
            self.capture_lost_logged = true;
            match self.monitor.as_ref().map(AudioMonitor::status) {
                Some(MonitorStatus::Failed(e)) => {
                    tracing::error!("Audio capture stopped ({}), keeping current image", e)
                }
                _ => tracing::info!("Audio capture ended"),
            }
        }
        mode
    }

    /// Where the window was dropped, once a drag ends
    fn finished_drag(&mut self, ctx: &egui::Context) -> Option<Point> {
        if !self.dragging {
            return None;
        }
        if ctx.input(|i| i.pointer.any_down()) {
            // Keep ticking so the release is seen promptly
            ctx.request_repaint();
            return None;
        }
        self.dragging = false;

        ctx.input(|i| i.viewport().outer_rect)
            .map(|rect| self.controller.surface().point_to_pixels(rect.min))
    }

    fn draw(&mut self, ctx: &egui::Context) {
        let surface = self.controller.surface();
        let texture = surface.texture().map(|t| t.id()).zip(surface.texture_size_points());

        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                let Some((id, size)) = texture else {
                    return;
                };
                let response = ui.add(
                    egui::Image::new(egui::load::SizedTexture::new(id, size))
                        .sense(egui::Sense::drag()),
                );

                if self.draggable && response.drag_started() {
                    ui.ctx().send_viewport_cmd(egui::ViewportCommand::StartDrag);
                    self.dragging = true;
                }
            });
    }
}

impl eframe::App for OverlayApp {
    fn clear_color(&self, _visuals: &egui::Visuals) -> [f32; 4] {
        [0.0, 0.0, 0.0, 0.0]
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();

        if !self.controller.place_initial(now) {
            ctx.request_repaint_after(PLACEMENT_RETRY);
            return;
        }

        let dropped_at = self.finished_drag(ctx);
        let pending = self.pending_mode();
        let next_deadline = self.controller.advance(dropped_at, pending.as_ref(), now);

        self.draw(ctx);

        if let Some(deadline) = next_deadline {
            ctx.request_repaint_after(deadline.saturating_duration_since(now));
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        tracing::info!("Shutting down");
        self.controller.shutdown();
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }
    }
}
