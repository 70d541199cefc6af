use eframe::egui;

use crate::render::{DrawCommand, Layer, PianoRollRenderer, Pos, Rgba};

fn color(c: Rgba) -> egui::Color32 {
    egui::Color32::from_rgba_unmultiplied(c.0, c.1, c.2, c.3)
}

/// Replays draw commands with `origin` as the screen position of (0, 0).
pub fn paint_layer(painter: &egui::Painter, commands: &[DrawCommand], origin: egui::Pos2) {
    let at = |p: Pos| origin + egui::vec2(p.x, p.y);

    for command in commands {
        match command {
            DrawCommand::Rect {
                rect,
                corner_radius,
                fill,
                stroke,
            } => {
                let screen = egui::Rect::from_min_size(
                    at(Pos::new(rect.x, rect.y)),
                    egui::vec2(rect.width, rect.height),
                );
                painter.rect_filled(screen, *corner_radius, color(*fill));
                if let Some((width, stroke_color)) = stroke {
                    painter.rect_stroke(
                        screen,
                        *corner_radius,
                        egui::Stroke::new(*width, color(*stroke_color)),
                        egui::StrokeKind::Inside,
                    );
                }
            }
            DrawCommand::Line {
                from,
                to,
                width,
                color: c,
            } => {
                painter.line_segment([at(*from), at(*to)], egui::Stroke::new(*width, color(*c)));
            }
            DrawCommand::Polyline {
                points,
                width,
                color: c,
            } => {
                let points: Vec<egui::Pos2> = points.iter().map(|p| at(*p)).collect();
                painter.add(egui::Shape::line(
                    points,
                    egui::Stroke::new(*width, color(*c)),
                ));
            }
            DrawCommand::Circle {
                center,
                radius,
                fill,
            } => {
                painter.circle_filled(at(*center), *radius, color(*fill));
            }
            DrawCommand::Text {
                pos,
                text,
                size,
                color: c,
            } => {
                painter.text(
                    at(*pos),
                    egui::Align2::CENTER_CENTER,
                    text,
                    egui::FontId::proportional(*size),
                    color(*c),
                );
            }
        }
    }
}

/// Paints every layer of the roll into `viewport`, back to front.
pub fn paint_roll(painter: &egui::Painter, renderer: &PianoRollRenderer, viewport: egui::Rect) {
    let pinned = viewport.min;
    let content = viewport.min - egui::vec2(renderer.scroll_offset(), 0.0);
    for layer in Layer::ALL {
        let origin = if layer.is_pinned() { pinned } else { content };
        paint_layer(painter, renderer.layer(layer), origin);
    }
}
