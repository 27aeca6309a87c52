//! Force-Directed Placer
//!
//! Places part instances on the sheet grid. Parts pull toward the parts they
//! share nets with and push away from every other part; a weak pull toward
//! the common centroid keeps unconnected parts from drifting off. The result
//! is snapped to the grid, legalized so no two keep-out areas overlap, and
//! local decoupling parts are packed in rows below the main layout.
//!
//! Nothing here is random: the initial grid, the iteration order and the
//! legalization search are all fixed, so identical inputs give identical
//! layouts.

use crate::labels::NetLabel;
use crate::layout::{Layout, Paper};
use schemgen_netlist::geometry::{snap_point, to_schematic_space, Point, Rect, Transform};
use schemgen_netlist::{
    compare_designators, Diagnostics, PartInstance, PinLabel, PinModel, PinRef, Warning,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Configuration for the force-directed placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlacerConfig {
    /// Grid pitch every part origin is snapped to
    pub grid: f64,
    /// Minimum spacing between the keep-out areas of two parts
    pub clearance: f64,
    /// Iteration cap for the force simulation
    pub max_iterations: usize,
    /// The simulation stops once no part wants to move further than this
    pub convergence_threshold: f64,
    /// Repulsion constant, divided by the gap between two parts
    pub repulsion: f64,
    /// Attraction constant, multiplied by the gap along a net edge
    pub attraction: f64,
    /// Pull toward the centroid of all parts
    pub gravity: f64,
    /// Largest move per iteration; cools linearly to zero
    pub step_cap: f64,
    /// Vertical gap between the main layout and the decoupling rows
    pub decoupling_gap: f64,
    /// Empty border kept around the drawing
    pub sheet_margin: f64,
    /// Extra edge weight between a part and the part it belongs to
    pub group_affinity: f64,
}

impl Default for PlacerConfig {
    fn default() -> Self {
        Self {
            grid: 2.54,
            clearance: 5.08,
            max_iterations: 500,
            convergence_threshold: 0.05,
            repulsion: 5.0,
            attraction: 0.05,
            gravity: 0.01,
            step_cap: 10.0,
            decoupling_gap: 10.16,
            sheet_margin: 25.4,
            group_affinity: 1.0,
        }
    }
}

/// Rings of grid positions searched around a part before it is moved past
/// the edge of the layout.
const LEGALIZE_RINGS: i32 = 64;

/// Gaps below this count as touching when computing repulsion.
const MIN_GAP: f64 = 1.0;

/// Place `instances` using the default force-directed placer.
pub fn place(
    instances: Vec<PartInstance>,
    model: &PinModel,
    config: &PlacerConfig,
    diagnostics: &mut Diagnostics,
) -> Layout {
    ForceDirectedPlacer::new(model, config.clone()).run(instances, diagnostics)
}

pub struct ForceDirectedPlacer<'a> {
    model: &'a PinModel,
    config: PlacerConfig,
}

/// Per-instance state during placement.
struct Node {
    /// Keep-out area relative to the instance origin.
    keepout: Rect,
    decoupling: bool,
}

impl<'a> ForceDirectedPlacer<'a> {
    pub fn new(model: &'a PinModel, config: PlacerConfig) -> Self {
        Self { model, config }
    }

    pub fn run(&self, mut instances: Vec<PartInstance>, diagnostics: &mut Diagnostics) -> Layout {
        let nodes: Vec<Node> = instances
            .iter()
            .map(|inst| Node {
                keepout: keepout(inst, self.model, self.config.clearance),
                decoupling: inst.category.is_decoupling(),
            })
            .collect();

        let mut main: Vec<usize> = (0..nodes.len()).filter(|&i| !nodes[i].decoupling).collect();
        main.sort_by(|&a, &b| {
            let (a, b) = (&instances[a].designator, &instances[b].designator);
            class_rank(a)
                .cmp(&class_rank(b))
                .then_with(|| compare_designators(a, b))
        });

        let mut origins = vec![Point::default(); nodes.len()];
        let (iterations, converged) =
            self.simulate(&instances, &nodes, &main, &mut origins, diagnostics);

        for &i in &main {
            origins[i] = snap_point(origins[i], self.config.grid);
        }
        let mut placed = self.legalize(&nodes, &main, &mut origins);
        let main_extents = placed.iter().copied().reduce(|a, b| a.union(&b));
        placed.extend(self.pack_decoupling(&instances, &nodes, &mut origins, main_extents));

        let extents = match placed.iter().copied().reduce(|a, b| a.union(&b)) {
            Some(extents) => extents,
            None => {
                let corner = Point::new(self.config.sheet_margin, self.config.sheet_margin);
                return Layout {
                    instances,
                    extents: Rect::from_corners(corner, corner),
                    paper: Paper::A4,
                    iterations,
                    converged,
                };
            }
        };

        let dx = snap_up(self.config.sheet_margin - extents.min.x, self.config.grid);
        let dy = snap_up(self.config.sheet_margin - extents.min.y, self.config.grid);
        for (inst, origin) in instances.iter_mut().zip(&origins) {
            inst.transform.position = origin.offset(dx, dy);
        }
        let extents = extents.translate(dx, dy);
        let paper = Paper::fitting(
            extents.max.x + self.config.sheet_margin,
            extents.max.y + self.config.sheet_margin,
        );

        log::info!(
            "placed {} parts ({} decoupling) on {paper}, extents {} to {}",
            instances.len(),
            nodes.iter().filter(|n| n.decoupling).count(),
            extents.min,
            extents.max
        );

        Layout {
            instances,
            extents,
            paper,
            iterations,
            converged,
        }
    }

    /// Run the force simulation over the `main` parts, writing unsnapped
    /// origins. Returns the iteration count and whether it converged.
    fn simulate(
        &self,
        instances: &[PartInstance],
        nodes: &[Node],
        main: &[usize],
        origins: &mut [Point],
        diagnostics: &mut Diagnostics,
    ) -> (usize, bool) {
        let mut centers = self.initial_centers(nodes, main);
        if main.len() < 2 {
            for (k, &i) in main.iter().enumerate() {
                let c = nodes[i].keepout.center();
                origins[i] = Point::new(centers[k].x - c.x, centers[k].y - c.y);
            }
            return (0, true);
        }

        let sizes: Vec<(f64, f64)> = main
            .iter()
            .map(|&i| (nodes[i].keepout.width(), nodes[i].keepout.height()))
            .collect();
        let edges = self.edges(instances, main);
        log::debug!("simulating {} parts with {} net edges", main.len(), edges.len());

        let mut residual = f64::INFINITY;
        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.config.max_iterations {
            let forces = self.calculate_forces(&centers, &sizes, &edges);
            residual = forces.iter().map(|(x, y)| x.hypot(*y)).fold(0.0, f64::max);
            if residual < self.config.convergence_threshold {
                converged = true;
                break;
            }

            let cooling = 1.0 - iterations as f64 / self.config.max_iterations as f64;
            let cap = self.config.step_cap * cooling.max(0.01);
            for (center, (fx, fy)) in centers.iter_mut().zip(forces) {
                let length = fx.hypot(fy);
                let scale = if length > cap { cap / length } else { 1.0 };
                *center = center.offset(fx * scale, fy * scale);
            }
            iterations += 1;
        }

        if converged {
            log::debug!("placement converged after {iterations} iterations");
        } else {
            diagnostics.warn(Warning::PlacementNotConverged {
                iterations,
                residual,
            });
        }

        for (k, &i) in main.iter().enumerate() {
            let c = nodes[i].keepout.center();
            origins[i] = Point::new(centers[k].x - c.x, centers[k].y - c.y);
        }
        (iterations, converged)
    }

    /// Keep-out centers on a square grid, in `main` order. Each cell is as
    /// large as the largest keep-out, so the start has no overlaps.
    fn initial_centers(&self, nodes: &[Node], main: &[usize]) -> Vec<Point> {
        let cell_w = main.iter().map(|&i| nodes[i].keepout.width()).fold(0.0, f64::max);
        let cell_h = main.iter().map(|&i| nodes[i].keepout.height()).fold(0.0, f64::max);
        let columns = (main.len() as f64).sqrt().ceil().max(1.0) as usize;
        (0..main.len())
            .map(|k| {
                let (row, col) = (k / columns, k % columns);
                Point::new(col as f64 * cell_w, row as f64 * cell_h)
            })
            .collect()
    }

    /// Net edges between simulated parts as `(a, b, weight)` with indices
    /// into `main`. A net touching `n` parts adds `1 / (n - 1)` to each of
    /// its pairs, so large nets pull less per pair.
    fn edges(&self, instances: &[PartInstance], main: &[usize]) -> Vec<(usize, usize, f64)> {
        let slot: HashMap<&str, usize> = main
            .iter()
            .enumerate()
            .map(|(k, &i)| (instances[i].designator.as_str(), k))
            .collect();

        let mut weights: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for (_, members) in self.model.nets() {
            let parts: Vec<usize> = members
                .iter()
                .filter_map(|pin| slot.get(pin.designator.as_str()).copied())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            if parts.len() < 2 {
                continue;
            }
            let weight = 1.0 / (parts.len() - 1) as f64;
            for (n, &a) in parts.iter().enumerate() {
                for &b in &parts[n + 1..] {
                    *weights.entry((a, b)).or_default() += weight;
                }
            }
        }

        for (k, &i) in main.iter().enumerate() {
            let Some(parent) = &instances[i].belongs_to else {
                continue;
            };
            let parent_slot = main
                .iter()
                .position(|&j| j != i && instances[j].part_id == *parent);
            if let Some(p) = parent_slot {
                *weights.entry((k.min(p), k.max(p))).or_default() += self.config.group_affinity;
            }
        }

        weights.into_iter().map(|((a, b), w)| (a, b, w)).collect()
    }

    fn calculate_forces(
        &self,
        centers: &[Point],
        sizes: &[(f64, f64)],
        edges: &[(usize, usize, f64)],
    ) -> Vec<(f64, f64)> {
        let n = centers.len();
        let mut forces = vec![(0.0, 0.0); n];

        for i in 0..n {
            for j in (i + 1)..n {
                let (ux, uy) = unit_between(centers[i], centers[j]);
                let push = self.config.repulsion / gap(centers, sizes, i, j).max(MIN_GAP);
                forces[i].0 += ux * push;
                forces[i].1 += uy * push;
                forces[j].0 -= ux * push;
                forces[j].1 -= uy * push;
            }
        }

        for &(a, b, weight) in edges {
            let (ux, uy) = unit_between(centers[a], centers[b]);
            let pull = self.config.attraction * weight * gap(centers, sizes, a, b).max(0.0);
            forces[a].0 -= ux * pull;
            forces[a].1 -= uy * pull;
            forces[b].0 += ux * pull;
            forces[b].1 += uy * pull;
        }

        let cx = centers.iter().map(|c| c.x).sum::<f64>() / n as f64;
        let cy = centers.iter().map(|c| c.y).sum::<f64>() / n as f64;
        for (force, c) in forces.iter_mut().zip(centers) {
            force.0 += self.config.gravity * (cx - c.x);
            force.1 += self.config.gravity * (cy - c.y);
        }

        forces
    }

    /// Resolve overlaps among the snapped `main` parts, in `main` order.
    /// Returns the final keep-out rectangles.
    fn legalize(&self, nodes: &[Node], main: &[usize], origins: &mut [Point]) -> Vec<Rect> {
        let grid = self.config.grid;
        let mut placed: Vec<Rect> = Vec::with_capacity(main.len());
        let mut moved = 0;

        for &i in main {
            let keepout = nodes[i].keepout;
            let free = |origin: Point| {
                let rect = keepout.translate(origin.x, origin.y);
                placed.iter().all(|p| !p.intersects(&rect))
            };

            if !free(origins[i]) {
                moved += 1;
                let start = origins[i];
                let nearest = (1..=LEGALIZE_RINGS).find_map(|ring| {
                    ring_offsets(ring)
                        .into_iter()
                        .map(|(dx, dy)| start.offset(dx as f64 * grid, dy as f64 * grid))
                        .find(|candidate| free(*candidate))
                });
                origins[i] = match nearest {
                    Some(origin) => origin,
                    None => {
                        // Right of everything placed so far.
                        let right = placed.iter().map(|r| r.max.x).fold(f64::MIN, f64::max);
                        Point::new(snap_up(right - keepout.min.x, grid), start.y)
                    }
                };
            }
            placed.push(keepout.translate(origins[i].x, origins[i].y));
        }

        if moved > 0 {
            log::debug!("legalization moved {moved} parts");
        }
        placed
    }

    /// Pack decoupling parts left to right in rows below `main_extents`,
    /// grouped by the part they belong to.
    fn pack_decoupling(
        &self,
        instances: &[PartInstance],
        nodes: &[Node],
        origins: &mut [Point],
        main_extents: Option<Rect>,
    ) -> Vec<Rect> {
        let grid = self.config.grid;
        let owner_designator = |inst: &PartInstance| -> String {
            inst.belongs_to
                .as_ref()
                .and_then(|parent| instances.iter().find(|i| &i.part_id == parent))
                .map(|parent| parent.designator.clone())
                .unwrap_or_else(|| inst.designator.clone())
        };

        let mut order: Vec<usize> = (0..nodes.len()).filter(|&i| nodes[i].decoupling).collect();
        if order.is_empty() {
            return Vec::new();
        }
        order.sort_by(|&a, &b| {
            compare_designators(&owner_designator(&instances[a]), &owner_designator(&instances[b]))
                .then_with(|| compare_designators(&instances[a].designator, &instances[b].designator))
        });

        let widest = order.iter().map(|&i| nodes[i].keepout.width()).fold(0.0, f64::max);
        let (left, top, row_limit) = match main_extents {
            Some(e) => (e.min.x, e.max.y + self.config.decoupling_gap, e.width().max(4.0 * widest)),
            None => (0.0, 0.0, 4.0 * widest),
        };

        let mut placed = Vec::with_capacity(order.len());
        let (mut cursor, mut row_top, mut row_height) = (left, top, 0.0_f64);
        for i in order {
            let keepout = nodes[i].keepout;
            if cursor > left && cursor + keepout.width() > left + row_limit {
                row_top += row_height;
                cursor = left;
                row_height = 0.0;
            }
            let origin = Point::new(
                snap_up(cursor - keepout.min.x, grid),
                snap_up(row_top - keepout.min.y, grid),
            );
            let rect = keepout.translate(origin.x, origin.y);
            cursor = rect.max.x;
            row_height = row_height.max(rect.max.y - row_top);
            origins[i] = origin;
            placed.push(rect);
        }
        placed
    }
}

/// Area a part needs relative to its origin: body, pins and the labels its
/// pins will carry, grown by half the clearance on every side.
pub fn keepout(inst: &PartInstance, model: &PinModel, clearance: f64) -> Rect {
    let at_origin = Transform {
        position: Point::default(),
        ..inst.transform
    };
    let mut area = at_origin.apply_to_bounds(&inst.symbol.bounds);
    for pin in inst.pins() {
        let text = match model.label_for(&inst.designator, &pin.number) {
            Some(PinLabel::NoConnect { .. }) => continue,
            Some(label) => label.text().to_string(),
            None => format!("{}_{}", inst.designator, pin.number),
        };
        let label = NetLabel::at_pin(
            text,
            PinRef::new(&inst.designator, &pin.number),
            to_schematic_space((pin.x, pin.y), &at_origin),
            at_origin.apply_to_rotation(pin.rotation),
        );
        area = area.union(&label.extent());
    }
    area.inflate(clearance / 2.0)
}

/// Integrated circuits first, then connectors, then discrete
/// semiconductors and crystals, then everything else.
fn class_rank(designator: &str) -> u8 {
    let prefix: String = designator
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    match prefix.as_str() {
        "U" | "IC" => 0,
        "J" | "P" | "CN" | "CON" => 1,
        "Q" | "D" | "LED" | "Y" | "X" | "SW" => 2,
        _ => 3,
    }
}

/// Unit vector from `b` toward `a`. Coincident points separate along X.
fn unit_between(a: Point, b: Point) -> (f64, f64) {
    let (dx, dy) = (a.x - b.x, a.y - b.y);
    let distance = dx.hypot(dy);
    if distance < 1e-9 {
        (-1.0, 0.0)
    } else {
        (dx / distance, dy / distance)
    }
}

/// Separation between the keep-outs of parts `i` and `j`, negative when
/// they overlap.
fn gap(centers: &[Point], sizes: &[(f64, f64)], i: usize, j: usize) -> f64 {
    let gx = (centers[i].x - centers[j].x).abs() - (sizes[i].0 + sizes[j].0) / 2.0;
    let gy = (centers[i].y - centers[j].y).abs() - (sizes[i].1 + sizes[j].1) / 2.0;
    gx.max(gy)
}

/// Grid offsets at Chebyshev distance `ring`, nearest (Manhattan) first.
fn ring_offsets(ring: i32) -> Vec<(i32, i32)> {
    let mut offsets: Vec<(i32, i32)> = (-ring..=ring)
        .flat_map(|dx| (-ring..=ring).map(move |dy| (dx, dy)))
        .filter(|(dx, dy)| dx.abs().max(dy.abs()) == ring)
        .collect();
    offsets.sort_by_key(|&(dx, dy)| (dx.abs() + dy.abs(), dy, dx));
    offsets
}

/// Next grid line at or above `value`.
fn snap_up(value: f64, pitch: f64) -> f64 {
    (value / pitch - 1e-9).ceil() * pitch
}
