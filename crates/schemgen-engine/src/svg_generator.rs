//! SVG preview of a placed and routed sheet.

use crate::labels::Justify;
use crate::layout::Layout;
use crate::router::Routing;
use anyhow::{Context, Result};
use schemgen_netlist::geometry::Point;
use std::path::Path;
use svg::node::element::{Circle, Line, Polyline, Rectangle, Text};
use svg::Document;

const FALLBACK_COLOR: &str = "red";

/// Build the preview document.
pub fn render(layout: &Layout, routing: &Routing) -> Document {
    let (width, height) = layout.paper.size();
    let mut document = Document::new()
        .set("width", format!("{width}mm"))
        .set("height", format!("{height}mm"))
        .set("viewBox", (0, 0, width as u32, height as u32))
        .add(
            Rectangle::new()
                .set("width", width)
                .set("height", height)
                .set("fill", "white")
                .set("stroke", "gray")
                .set("stroke-width", 0.5),
        );

    // --- Parts ---
    for inst in &layout.instances {
        let body = inst.body_rect();
        document = document
            .add(
                Rectangle::new()
                    .set("x", body.min.x)
                    .set("y", body.min.y)
                    .set("width", body.width())
                    .set("height", body.height())
                    .set("fill", "lightyellow")
                    .set("stroke", "darkred")
                    .set("stroke-width", 0.25),
            )
            .add(
                Text::new()
                    .set("x", body.min.x)
                    .set("y", body.min.y - 1.0)
                    .set("font-size", "2px")
                    .add(svg::node::Text::new(format!(
                        "{} {}",
                        inst.designator, inst.value
                    ))),
            );
    }

    // --- Wires ---
    for wire in routing.wires.iter().chain(&routing.leads) {
        document = document.add(line(wire.start, wire.end, "darkgreen", 0.25));
    }
    for (net, path) in routing.fallbacks() {
        let points: Vec<String> = path.iter().map(|p| format!("{},{}", p.x, p.y)).collect();
        document = document.add(
            Polyline::new()
                .set("points", points.join(" "))
                .set("fill", "none")
                .set("stroke", FALLBACK_COLOR)
                .set("stroke-width", 0.35)
                .set("stroke-dasharray", "1,0.5")
                .set("data-net", net),
        );
    }
    for junction in &routing.junctions {
        document = document.add(
            Circle::new()
                .set("cx", junction.x)
                .set("cy", junction.y)
                .set("r", 0.5)
                .set("fill", "darkgreen"),
        );
    }

    // --- Labels and no-connect flags ---
    for label in &routing.labels {
        let anchor = match label.justify {
            Justify::Left => "start",
            Justify::Right => "end",
        };
        // Rotation 180 reads left to right, like KiCad draws it.
        let angle = match label.rotation {
            270 => -90,
            _ => 0,
        };
        document = document.add(
            Text::new()
                .set("x", label.position.x)
                .set("y", label.position.y)
                .set("font-size", "1.27px")
                .set("text-anchor", anchor)
                .set(
                    "transform",
                    format!("rotate({angle} {} {})", label.position.x, label.position.y),
                )
                .add(svg::node::Text::new(label.text.clone())),
        );
    }
    for flag in &routing.no_connects {
        let p = flag.position;
        document = document
            .add(line(p.offset(-0.6, -0.6), p.offset(0.6, 0.6), "blue", 0.2))
            .add(line(p.offset(-0.6, 0.6), p.offset(0.6, -0.6), "blue", 0.2));
    }

    document
}

/// Generates an SVG document from a layout and saves it.
pub fn run(layout: &Layout, routing: &Routing, output_path: &Path) -> Result<()> {
    let document = render(layout, routing);
    svg::save(output_path, &document)
        .with_context(|| format!("Failed to save SVG to {}", output_path.display()))?;
    Ok(())
}

fn line(a: Point, b: Point, stroke: &str, width: f64) -> Line {
    Line::new()
        .set("x1", a.x)
        .set("y1", a.y)
        .set("x2", b.x)
        .set("y2", b.y)
        .set("stroke", stroke)
        .set("stroke-width", width)
}
